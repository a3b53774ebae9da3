//! Shell commands.
//!
//! Client shell commands map onto debugger client calls, server shell commands control
//! a local debugger server.

pub mod parser;

use crate::debugger::Breakpoint;
use crate::rpc::client;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("malformed command: {0}")]
    Parsing(String),
    #[error("no session selected, create one with `create_session` or pick with `use`")]
    NoSession,
    #[error("read {0}: {1}")]
    Source(PathBuf, #[source] std::io::Error),
    #[error(transparent)]
    Client(#[from] client::Error),
}

pub type CommandResult<T> = Result<T, CommandError>;

/// Client shell command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateSession,
    /// Create a session and upload a file as its source.
    CreateFile(PathBuf),
    /// Create a session and upload inline text as its source.
    CreateData {
        label: String,
        text: String,
    },
    ListSessions,
    Use(String),
    SetSource(PathBuf),
    Start,
    Pause,
    Resume,
    Stop,
    AddBreakpoint(Breakpoint),
    RemoveBreakpoint(Breakpoint),
    SetBreakpoints(Vec<Breakpoint>),
    GetBreakpoints,
    Listen,
    StopListen,
    Help(Option<String>),
    Exit,
}

/// Server shell command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServerCommand {
    Start,
    Stop,
    Status,
    Help,
    Exit,
}
