// Protocol Gateway - minimal JSON-RPC 2.0 over newline-delimited streams
//
// Enough of a handshake for an external status viewer to attach: it offers
// no tools and exposes no mutation.

use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::shutdown::ShutdownListener;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Response to one request line
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub body: Value,
    /// The request asked the session to end
    pub shutdown: bool,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    ShutdownRequested,
    EndOfInput,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct ProtocolGateway {
    name: String,
    version: String,
}

impl Default for ProtocolGateway {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
    }
}

impl ProtocolGateway {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    /// Answer one request line. Blank lines get no response.
    pub fn handle_line(&self, line: &str) -> Option<GatewayResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let request: Value = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Unparseable request");
                return Some(error_response(Value::Null, PARSE_ERROR, &format!("Parse error: {e}")));
            }
        };

        let Some(request) = request.as_object() else {
            return Some(error_response(Value::Null, INVALID_REQUEST, "Invalid request"));
        };

        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request.get("method").and_then(Value::as_str);
        debug!(method = ?method, id = %id, "Request received");

        let response = match method {
            Some("initialize") => result_response(
                id,
                json!({
                    "serverInfo": {"name": self.name, "version": self.version},
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                }),
            ),
            Some("list_tools") => result_response(id, json!([])),
            Some("shutdown") => GatewayResponse {
                shutdown: true,
                ..result_response(id, Value::Bool(true))
            },
            Some(other) => error_response(id, METHOD_NOT_FOUND, &format!("Method {other} not found")),
            None => error_response(id, METHOD_NOT_FOUND, "Method not found"),
        };
        Some(response)
    }

    /// Serve requests until `shutdown`, end of input or interrupt
    pub async fn serve<R, W>(
        &self,
        reader: R,
        mut writer: W,
        mut interrupt: ShutdownListener,
    ) -> Result<SessionEnd, GatewayError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(name = %self.name, "Protocol gateway serving");
        let mut lines = reader.lines();

        loop {
            let line = tokio::select! {
                _ = interrupt.wait() => return Ok(SessionEnd::Interrupted),
                line = lines.next_line() => line?,
            };

            let Some(line) = line else {
                info!("Protocol gateway input closed");
                return Ok(SessionEnd::EndOfInput);
            };

            let Some(response) = self.handle_line(&line) else {
                continue;
            };

            let mut encoded = serde_json::to_string(&response.body)?;
            encoded.push('\n');
            writer.write_all(encoded.as_bytes()).await?;
            writer.flush().await?;

            if response.shutdown {
                info!("Protocol gateway shutdown requested");
                return Ok(SessionEnd::ShutdownRequested);
            }
        }
    }
}

fn result_response(id: Value, result: Value) -> GatewayResponse {
    GatewayResponse {
        body: json!({"jsonrpc": "2.0", "id": id, "result": result}),
        shutdown: false,
    }
}

fn error_response(id: Value, code: i64, message: &str) -> GatewayResponse {
    GatewayResponse {
        body: json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}}),
        shutdown: false,
    }
}
