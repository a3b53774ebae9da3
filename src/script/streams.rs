//! Redirection of interpreter `sys.stdout`/`sys.stderr` into per run writers.
//!
//! Interpreter streams are process wide, so for the duration of runs they are replaced with
//! proxies that dispatch every write to the writers of the run executing on the current thread.
//! Sessions on different threads never see each other's output.

use pyo3::exceptions::PyOSError;
use pyo3::prelude::*;
use std::cell::RefCell;
use std::io::{self, Write};
use std::sync::Mutex;

/// Program output destinations.
pub struct Streams {
    pub stdout: Box<dyn Write>,
    pub stderr: Box<dyn Write>,
}

impl Streams {
    fn get(&mut self, kind: StreamKind) -> &mut dyn Write {
        match kind {
            StreamKind::Stdout => self.stdout.as_mut(),
            StreamKind::Stderr => self.stderr.as_mut(),
        }
    }

    fn flush(&mut self) {
        crate::weak_error!(self.stdout.flush(), "flush stdout:");
        crate::weak_error!(self.stderr.flush(), "flush stderr:");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

thread_local! {
    static ACTIVE: RefCell<Option<Streams>> = const { RefCell::new(None) };
}

/// Writers of a run stay active on the current thread until guard is dropped,
/// then they are flushed.
pub(super) struct ActiveStreams(());

impl ActiveStreams {
    pub(super) fn activate(streams: Streams) -> Self {
        ACTIVE.with(|active| *active.borrow_mut() = Some(streams));
        Self(())
    }

    pub(super) fn flush(&self) {
        ACTIVE.with(|active| {
            if let Some(streams) = active.borrow_mut().as_mut() {
                streams.flush();
            }
        });
    }
}

impl Drop for ActiveStreams {
    fn drop(&mut self) {
        if let Some(mut streams) = ACTIVE.with(|active| active.borrow_mut().take()) {
            streams.flush();
        }
    }
}

fn with_writer<T>(kind: StreamKind, f: impl FnOnce(&mut dyn Write) -> io::Result<T>) -> io::Result<T> {
    ACTIVE.with(|active| match active.borrow_mut().as_mut() {
        Some(streams) => f(streams.get(kind)),
        // writes from threads that do not run a program go to the process streams
        None => match kind {
            StreamKind::Stdout => f(&mut io::stdout()),
            StreamKind::Stderr => f(&mut io::stderr()),
        },
    })
}

#[pyclass(frozen, module = "specter")]
struct OutputProxy {
    kind: StreamKind,
}

#[pymethods]
impl OutputProxy {
    fn write(&self, text: &str) -> PyResult<usize> {
        with_writer(self.kind, |w| w.write_all(text.as_bytes()))
            .map_err(|e| PyOSError::new_err(e.to_string()))?;
        Ok(text.chars().count())
    }

    fn flush(&self) -> PyResult<()> {
        with_writer(self.kind, |w| w.flush()).map_err(|e| PyOSError::new_err(e.to_string()))
    }

    fn isatty(&self) -> bool {
        false
    }

    fn writable(&self) -> bool {
        true
    }

    #[getter]
    fn encoding(&self) -> &'static str {
        "utf-8"
    }
}

/// Process streams saved by the first of concurrently active runs.
struct Redirect {
    active: usize,
    saved: Option<(Py<PyAny>, Py<PyAny>)>,
}

// only touched with the interpreter lock held
static REDIRECT: Mutex<Redirect> = Mutex::new(Redirect {
    active: 0,
    saved: None,
});

fn proxies(py: Python<'_>) -> PyResult<(Bound<'_, OutputProxy>, Bound<'_, OutputProxy>)> {
    Ok((
        Bound::new(py, OutputProxy { kind: StreamKind::Stdout })?,
        Bound::new(py, OutputProxy { kind: StreamKind::Stderr })?,
    ))
}

fn set_streams<'py>(
    sys: &Bound<'py, PyModule>,
    stdout: impl IntoPyObject<'py>,
    stderr: impl IntoPyObject<'py>,
) -> PyResult<()> {
    sys.setattr("stdout", stdout)?;
    sys.setattr("stderr", stderr)
}

/// `sys.stdout` and `sys.stderr` point to dispatching proxies while at least one run is active.
///
/// Every run sets the proxies again, so a debuggee that rebinds the streams affects only
/// itself. When the last active run ends the saved process streams are put back.
pub(super) struct Redirection(());

impl Redirection {
    pub(super) fn install(py: Python<'_>) -> PyResult<Self> {
        let sys = py.import("sys")?;
        let (stdout, stderr) = proxies(py)?;
        // replaced objects are released after the lock, their finalizers may run python code
        let replaced = (sys.getattr("stdout")?, sys.getattr("stderr")?);
        {
            let mut redirect = REDIRECT.lock().unwrap();
            if redirect.active == 0 {
                redirect.saved = Some((replaced.0.clone().unbind(), replaced.1.clone().unbind()));
            }
            set_streams(&sys, stdout, stderr)?;
            redirect.active += 1;
        }
        drop(replaced);
        Ok(Self(()))
    }

    fn restore(py: Python<'_>) -> PyResult<()> {
        let sys = py.import("sys")?;
        let (stdout, stderr) = proxies(py)?;
        let replaced = (sys.getattr("stdout")?, sys.getattr("stderr")?);
        let saved = {
            let mut redirect = REDIRECT.lock().unwrap();
            redirect.active = redirect.active.saturating_sub(1);
            if redirect.active > 0 {
                set_streams(&sys, stdout, stderr)?;
                None
            } else {
                let saved = redirect.saved.take();
                if let Some((stdout, stderr)) = &saved {
                    set_streams(&sys, stdout.bind(py), stderr.bind(py))?;
                }
                saved
            }
        };
        drop((replaced, saved));
        Ok(())
    }
}

impl Drop for Redirection {
    fn drop(&mut self) {
        Python::with_gil(|py| {
            crate::weak_error!(Self::restore(py), "restore interpreter streams:");
        });
    }
}
