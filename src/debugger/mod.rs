//! Debug sessions: a line stepping debugger for script sources.
//!
//! Each [`DebugSession`] owns a source, a breakpoint table, an event queue and an execution
//! thread. Control calls (`start`, `pause`, `resume`, `stop`) come from other threads and are
//! coordinated with the execution thread through a lock and a condition variable.

pub mod breakpoint;
pub mod error;
pub mod event;
pub mod output;
pub mod queue;
pub mod registry;
pub mod session;
mod tracer;

pub use breakpoint::Breakpoint;
pub use error::Error;
pub use event::Event;
pub use registry::SessionRegistry;
pub use session::{DebugSession, SessionId, DEFAULT_STACK_SIZE};
