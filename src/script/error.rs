use crate::script::linecache::LineCache;
use pyo3::prelude::*;
use std::fmt::Write as _;

/// Compilation failure of a debuggee source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} ({filename}, line {lineno})")]
pub struct SyntaxError {
    /// Error class name, `SyntaxError`, `IndentationError`, `TabError` and so on.
    pub kind: String,
    pub message: String,
    pub filename: String,
    pub lineno: u32,
}

impl SyntaxError {
    /// Convert error raised by `compile()`.
    pub(super) fn from_py(py: Python<'_>, err: &PyErr, filename: &str) -> Self {
        let value = err.value(py);
        let kind = type_name(py, err);
        let message = value
            .getattr("msg")
            .and_then(|msg| msg.extract::<String>())
            .unwrap_or_else(|_| value.to_string());
        let lineno = value
            .getattr("lineno")
            .and_then(|lineno| lineno.extract::<Option<u32>>())
            .ok()
            .flatten()
            .unwrap_or(1);
        Self {
            kind,
            message,
            filename: filename.to_string(),
            lineno,
        }
    }

    /// Render error in a traceback-like form, using a line cache for the offending line.
    pub fn format(&self, cache: &LineCache) -> String {
        let mut out = format!("  File \"{}\", line {}\n", self.filename, self.lineno);
        if let Some(line) = cache.getline(&self.filename, self.lineno) {
            _ = writeln!(out, "    {}", line.trim());
        }
        _ = writeln!(out, "{}: {}", self.kind, self.message);
        out
    }
}

/// Single entry of exception traceback.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEntry {
    pub filename: String,
    pub function: String,
    pub lineno: u32,
}

/// An exception that escapes the executed program.
#[derive(Debug, Clone)]
pub struct Exception {
    pub kind: String,
    pub message: String,
    /// Stack at the raise point, outermost frame first.
    pub traceback: Vec<TraceEntry>,
}

impl std::fmt::Display for Exception {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for Exception {}

impl Exception {
    pub(super) fn from_py(py: Python<'_>, err: &PyErr) -> Self {
        let message = err
            .value(py)
            .str()
            .map(|s| s.to_string())
            .unwrap_or_default();
        let traceback = crate::muted_error!(extract_traceback(py, err), "extract traceback:")
            .unwrap_or_default();
        Self {
            kind: type_name(py, err),
            message,
            traceback,
        }
    }

    /// Frame where exception was raised.
    pub fn origin(&self) -> Option<&TraceEntry> {
        self.traceback.last()
    }

    pub fn format_traceback(&self, cache: &LineCache) -> String {
        let mut out = String::from("Traceback (most recent call last):\n");
        for entry in &self.traceback {
            _ = writeln!(
                out,
                "  File \"{}\", line {}, in {}",
                entry.filename, entry.lineno, entry.function
            );
            if let Some(line) = cache.getline(&entry.filename, entry.lineno) {
                _ = writeln!(out, "    {}", line.trim());
            }
        }
        _ = writeln!(out, "{self}");
        out
    }
}

fn type_name(py: Python<'_>, err: &PyErr) -> String {
    err.get_type(py)
        .getattr("__name__")
        .and_then(|name| name.extract::<String>())
        .unwrap_or_else(|_| "Exception".to_string())
}

fn extract_traceback(py: Python<'_>, err: &PyErr) -> PyResult<Vec<TraceEntry>> {
    let Some(tb) = err.traceback(py) else {
        return Ok(vec![]);
    };
    let summary = py
        .import("traceback")?
        .call_method1("extract_tb", (tb,))?;

    summary
        .try_iter()?
        .map(|frame| {
            let frame = frame?;
            Ok(TraceEntry {
                filename: frame.getattr("filename")?.extract()?,
                function: frame.getattr("name")?.extract()?,
                lineno: frame
                    .getattr("lineno")?
                    .extract::<Option<u32>>()?
                    .unwrap_or_default(),
            })
        })
        .collect()
}

/// Result of an unsuccessful run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Exception(#[from] Exception),
    #[error("execution stopped by tracer")]
    Quit,
    /// Interpreter failure not caused by debuggee code.
    #[error("interpreter error: {0}")]
    Internal(String),
}
