// Agent Runtime - identities, lifecycle, outbound link and the receive loop

pub mod handlers;
pub mod identity;
pub mod lifecycle;
pub mod link;
pub mod runtime;

pub use identity::{AgentIdentity, AgentStatus};
pub use lifecycle::LifecycleTracker;
pub use link::AgentLink;
pub use runtime::{AgentRuntime, DispatchError, Dispatched, MessageHandler, StopHandle, PHASE_COMPLETE};
