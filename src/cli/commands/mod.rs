use anyhow::Result;

pub mod config;
pub mod gateway;
pub mod init;
pub mod run;
pub mod status;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}
