use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Observable fact about a debug session.
///
/// Events of one session are delivered in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    LineChanged { filename: String, lineno: u32 },
    Started,
    Paused,
    Resumed,
    Finished { status: String },
    Stdout { message: String },
    Stderr { message: String },
}

impl Event {
    /// True for the last event of an execution run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Finished { .. })
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::LineChanged { filename, lineno } => write!(f, "line changed: {filename}:{lineno}"),
            Event::Started => f.write_str("started"),
            Event::Paused => f.write_str("paused"),
            Event::Resumed => f.write_str("resumed"),
            Event::Finished { status } => write!(f, "finished: {status}"),
            Event::Stdout { message } => write!(f, "stdout: {}", message.trim_end_matches('\n')),
            Event::Stderr { message } => write!(f, "stderr: {}", message.trim_end_matches('\n')),
        }
    }
}
