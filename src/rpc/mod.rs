//! Remote access to debug sessions.
//!
//! Messages are JSON documents framed with a `Content-Length` header. A connection carries
//! request/response pairs until a `listen_events` request turns it into an event stream.

pub mod client;
pub mod protocol;
pub mod server;
pub mod service;
pub mod transport;

pub use client::{ClientOptions, DebuggerClient};
pub use protocol::{Code, Status};
pub use server::DebuggerServer;
pub use service::DebuggerService;
