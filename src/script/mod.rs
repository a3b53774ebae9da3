//! Debuggee execution: Python sources run by an embedded interpreter.
//!
//! Sources are compiled up front, then executed with a per thread trace function that reports
//! every executed line to a [`Tracer`]. This is the only place in the crate where user supplied
//! code is evaluated.

pub mod error;
pub mod linecache;
mod streams;

pub use error::{Exception, RunError, SyntaxError, TraceEntry};
pub use linecache::{normalize_filename, LineCache};
pub use streams::{StreamKind, Streams};

use pyo3::exceptions::PyBaseException;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use streams::{ActiveStreams, Redirection};

pyo3::create_exception!(
    specter,
    DebuggerQuit,
    PyBaseException,
    "Unwinds a debuggee when its session is stopped."
);

/// Tracer decision after observing a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceControl {
    Continue,
    /// Unwind the whole run.
    Quit,
}

/// Execution position reported to a tracer.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub filename: &'a str,
    pub function: &'a str,
    pub lineno: u32,
}

/// Observer of program execution.
///
/// Callbacks run on the execution thread with the interpreter lock released,
/// so a tracer may block.
pub trait Tracer {
    /// Called before a line is executed.
    fn on_line(&mut self, frame: &Frame) -> TraceControl;

    /// Called once with an exception that escapes the program.
    fn on_exception(&mut self, _exception: &Exception) {}
}

pub type SharedTracer = Arc<Mutex<dyn Tracer + Send>>;

/// Interpreter trace function, see `sys.settrace`.
#[pyclass(frozen, module = "specter")]
struct TraceHook {
    tracer: SharedTracer,
}

#[pymethods]
impl TraceHook {
    fn __call__<'py>(
        slf: Bound<'py, Self>,
        frame: Bound<'py, PyAny>,
        event: &str,
        _arg: Bound<'py, PyAny>,
    ) -> PyResult<Bound<'py, PyAny>> {
        if event == "line" {
            let code = frame.getattr("f_code")?;
            let filename: String = code.getattr("co_filename")?.extract()?;
            let function: String = code.getattr("co_name")?.extract()?;
            let lineno: u32 = frame.getattr("f_lineno")?.extract()?;

            let tracer = &slf.get().tracer;
            let control = slf.py().allow_threads(|| {
                tracer.lock().unwrap().on_line(&Frame {
                    filename: &filename,
                    function: &function,
                    lineno,
                })
            });
            if control == TraceControl::Quit {
                return Err(DebuggerQuit::new_err("session stopped"));
            }
        }
        // keep tracing inside this frame
        Ok(slf.into_any())
    }
}

/// Compiled debuggee source.
#[derive(Debug)]
pub struct Program {
    filename: String,
    source: String,
    code: Py<PyAny>,
}

impl Program {
    /// Compile the whole source text.
    pub fn compile(source: &str, filename: &str) -> Result<Self, SyntaxError> {
        Python::with_gil(|py| {
            let code = py
                .import("builtins")
                .and_then(|builtins| builtins.call_method1("compile", (source, filename, "exec")))
                .map_err(|e| SyntaxError::from_py(py, &e, filename))?;
            Ok(Self {
                filename: filename.to_string(),
                source: source.to_string(),
                code: code.unbind(),
            })
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Lines where a statement or an `except` clause starts.
    pub fn executable_lines(&self) -> BTreeSet<u32> {
        Python::with_gil(|py| {
            crate::muted_error!(statement_lines(py, &self.source, &self.filename), "collect statement lines:")
                .unwrap_or_default()
        })
    }

    /// Run the program as `__main__`, reporting executed lines to the tracer.
    ///
    /// Program output goes to `streams`, they are flushed before the tracer sees an exception.
    pub fn run(&self, tracer: SharedTracer, streams: Streams) -> Result<(), RunError> {
        Python::with_gil(|py| {
            let internal = |e: PyErr| RunError::Internal(e.to_string());
            let builtins = py.import("builtins").map_err(internal)?;
            let sys = py.import("sys").map_err(internal)?;
            let globals = main_globals(py, &builtins, &self.filename).map_err(internal)?;
            let hook = Bound::new(
                py,
                TraceHook {
                    tracer: tracer.clone(),
                },
            )
            .map_err(internal)?;

            let active = ActiveStreams::activate(streams);
            let redirection = Redirection::install(py).map_err(internal)?;
            sys.call_method1("settrace", (hook,)).map_err(internal)?;
            let result = builtins.call_method1("exec", (self.code.bind(py), &globals));
            sys.call_method1("settrace", (py.None(),)).map_err(internal)?;
            active.flush();
            drop(redirection);
            globals.clear();

            match result {
                Ok(_) => Ok(()),
                Err(e) if e.is_instance_of::<DebuggerQuit>(py) => Err(RunError::Quit),
                Err(e) => {
                    let exception = Exception::from_py(py, &e);
                    py.allow_threads(|| tracer.lock().unwrap().on_exception(&exception));
                    Err(RunError::Exception(exception))
                }
            }
        })
    }
}

fn main_globals<'py>(
    py: Python<'py>,
    builtins: &Bound<'py, PyModule>,
    filename: &str,
) -> PyResult<Bound<'py, PyDict>> {
    let globals = PyDict::new(py);
    globals.set_item("__name__", "__main__")?;
    globals.set_item("__file__", filename)?;
    globals.set_item("__builtins__", builtins)?;
    Ok(globals)
}

fn statement_lines(py: Python<'_>, source: &str, filename: &str) -> PyResult<BTreeSet<u32>> {
    let ast = py.import("ast")?;
    let stmt = ast.getattr("stmt")?;
    let handler = ast.getattr("excepthandler")?;
    let tree = ast.call_method1("parse", (source, filename))?;

    let mut lines = BTreeSet::new();
    for node in ast.call_method1("walk", (tree,))?.try_iter()? {
        let node = node?;
        if node.is_instance(&stmt)? || node.is_instance(&handler)? {
            lines.insert(node.getattr("lineno")?.extract::<u32>()?);
        }
    }
    Ok(lines)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[derive(Default)]
    struct Recorder {
        lines: Vec<u32>,
        quit_at: Option<u32>,
        exceptions: Vec<String>,
    }

    impl Tracer for Recorder {
        fn on_line(&mut self, frame: &Frame) -> TraceControl {
            self.lines.push(frame.lineno);
            if Some(frame.lineno) == self.quit_at {
                TraceControl::Quit
            } else {
                TraceControl::Continue
            }
        }

        fn on_exception(&mut self, exception: &Exception) {
            self.exceptions.push(exception.to_string());
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn run(source: &str, recorder: Recorder) -> (Arc<Mutex<Recorder>>, Result<(), RunError>, String, String) {
        let program = Program::compile(source, "m.py").unwrap();
        let recorder = Arc::new(Mutex::new(recorder));
        let (out, err) = (SharedBuf::default(), SharedBuf::default());
        let result = program.run(
            recorder.clone(),
            Streams {
                stdout: Box::new(out.clone()),
                stderr: Box::new(err.clone()),
            },
        );
        (recorder, result, out.text(), err.text())
    }

    #[test]
    fn test_executable_lines() {
        let program = Program::compile(
            "# header\nx = 1\n\nif x:\n    y = 2\nelse:\n    y = 3\ntry:\n    pass\nexcept ValueError:\n    pass\n",
            "m.py",
        )
        .unwrap();
        assert_eq!(
            program.executable_lines().into_iter().collect::<Vec<_>>(),
            vec![2, 4, 5, 7, 8, 9, 10, 11]
        );
    }

    #[test]
    fn test_syntax_error_display() {
        let err = Program::compile("x = 1\ny = (\n", "m.py").unwrap_err();
        assert_eq!(err.kind, "SyntaxError");
        assert_eq!(err.lineno, 2);
        assert_eq!(err.to_string(), "'(' was never closed (m.py, line 2)");

        let mut cache = LineCache::new();
        cache.register("m.py", "x = 1\ny = (\n");
        assert_eq!(
            err.format(&cache),
            "  File \"m.py\", line 2\n    y = (\nSyntaxError: '(' was never closed\n"
        );
    }

    #[test]
    fn test_lines_and_output() {
        let source = "def f(v):\n    return v * 2\nprint(f(2), end='')\nimport sys\nsys.stderr.write('e\\n')\n";
        let (recorder, result, out, err) = run(source, Recorder::default());
        assert!(result.is_ok());
        assert_eq!(recorder.lock().unwrap().lines, vec![1, 3, 2, 4, 5]);
        assert_eq!(out, "4");
        assert_eq!(err, "e\n");
    }

    #[test]
    fn test_traceback_format() {
        let source = "def f():\n    return 1 / 0\nf()\n";
        let (recorder, result, _, _) = run(source, Recorder::default());
        let Err(RunError::Exception(exception)) = result else {
            panic!("expected exception");
        };
        assert_eq!(
            recorder.lock().unwrap().exceptions,
            vec!["ZeroDivisionError: division by zero".to_string()]
        );

        let mut cache = LineCache::new();
        cache.register("m.py", source);
        assert_eq!(
            exception.format_traceback(&cache),
            "Traceback (most recent call last):\n  \
             File \"m.py\", line 3, in <module>\n    f()\n  \
             File \"m.py\", line 2, in f\n    return 1 / 0\n\
             ZeroDivisionError: division by zero\n"
        );
    }

    #[test]
    fn test_quit_is_not_caught_by_except_exception() {
        let source = "try:\n    x = 1\nexcept Exception:\n    pass\ny = 2\n";
        let recorder = Recorder {
            quit_at: Some(2),
            ..Recorder::default()
        };
        let (recorder, result, _, _) = run(source, recorder);
        assert!(matches!(result, Err(RunError::Quit)));
        let recorder = recorder.lock().unwrap();
        assert_eq!(recorder.lines.last(), Some(&2));
        assert!(!recorder.lines.contains(&5));
        assert!(recorder.exceptions.is_empty());
    }

    #[test]
    fn test_rebound_stdout_does_not_outlive_run() {
        let (_, result, out, _) = run(
            "import sys, io\nsys.stdout = io.StringIO()\nprint('hidden')\n",
            Recorder::default(),
        );
        assert!(result.is_ok());
        assert_eq!(out, "");

        let (_, result, out, _) = run("print('visible')\n", Recorder::default());
        assert!(result.is_ok());
        assert_eq!(out, "visible\n");
    }

    #[test]
    fn test_huge_allocation_raises() {
        let (_, result, _, _) = run("x = [0] * 100000000000000\n", Recorder::default());
        let Err(RunError::Exception(exception)) = result else {
            panic!("expected exception");
        };
        assert_eq!(exception.kind, "MemoryError");
    }
}
