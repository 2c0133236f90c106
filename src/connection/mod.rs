//! Connection lifecycle
//!
//! State types, the reconnection state machine, the published status view,
//! and the supervisor task that ties them to a live session.

mod machine;
mod state;
mod status;
mod supervisor;

pub use machine::{ConnectionEvent, Effect, Lifecycle};
pub use state::{ConnectionState, ConnectionStatus, DisconnectReason, QrPayload};
pub use status::StatusHandle;
pub use supervisor::{READY_NOTICE, Supervisor, SupervisorHandle, SupervisorOptions};
