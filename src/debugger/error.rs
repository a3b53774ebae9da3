use crate::debugger::breakpoint::Breakpoint;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- session state errors --------------------------------------
    #[error("session already running")]
    AlreadyRunning,
    #[error("session not running")]
    NotRunning,
    #[error("session already paused")]
    AlreadyPaused,
    #[error("session not paused")]
    NotPaused,
    #[error("session is stopping")]
    Stopping,

    // --------------------------------- breakpoint errors -----------------------------------------
    #[error("source \"{0}\" is not registered in session")]
    UnknownSource(String),
    #[error("no executable statement at {0}")]
    NotExecutable(Breakpoint),
    #[error("breakpoint {0} not found")]
    BreakpointNotFound(Breakpoint),

    // --------------------------------- system errors ---------------------------------------------
    #[error("spawn execution thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "debugger", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}
