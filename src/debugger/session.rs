use crate::debugger::breakpoint::{Breakpoint, BreakpointTable};
use crate::debugger::error::Error;
use crate::debugger::event::Event;
use crate::debugger::output::OutputCapture;
use crate::debugger::queue::EventQueue;
use crate::debugger::tracer::SessionTracer;
use crate::script::{normalize_filename, LineCache, Program, RunError, StreamKind, Streams};
use std::any::Any;
use std::fmt::{Display, Formatter};
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use uuid::Uuid;

/// Execution thread stack size used when nothing else is configured.
pub const DEFAULT_STACK_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Terminal statuses of an execution run.
pub mod status {
    pub const SUCCESS: &str = "success";
    pub const STOPPED: &str = "stopped";
    pub const NO_SOURCE: &str = "error: no source set";

    pub fn error(message: impl std::fmt::Display) -> String {
        format!("error: {message}")
    }
}

/// Source that can not be run, reported by every run attempt.
#[derive(Debug, Clone)]
struct Unrunnable {
    stderr: String,
    status: String,
}

#[derive(Debug)]
struct Source {
    filename: String,
    program: Result<Arc<Program>, Unrunnable>,
}

/// Decode and compile a source once, registering it in line cache.
fn prepare(filename: &str, bytes: &[u8], cache: &mut LineCache) -> Result<Arc<Program>, Unrunnable> {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            cache.register(filename, &String::from_utf8_lossy(bytes));
            let message = format!("UnicodeDecodeError: {e}");
            return Err(Unrunnable {
                stderr: format!("{message}\n"),
                status: status::error(message),
            });
        }
    };

    match Program::compile(text, filename) {
        Ok(program) => {
            cache.register_program(&program);
            Ok(Arc::new(program))
        }
        Err(e) => {
            cache.register_plain(filename, text);
            Err(Unrunnable {
                stderr: e.format(cache),
                status: status::error(format!("{}: {e}", e.kind)),
            })
        }
    }
}

#[derive(Debug, Default)]
pub(super) struct SourceState {
    source: Option<Source>,
    pub(super) cache: LineCache,
    pub(super) breakpoints: BreakpointTable,
}

/// Run flags, guarded by a single lock together with the pause gate.
#[derive(Debug, Default)]
pub(super) struct Control {
    pub(super) running: bool,
    pub(super) paused: bool,
    /// Stop request, observed by tracer on every line and on every wake up.
    pub(super) quit: bool,
    /// `Finished` of the last run is emitted, its thread is about to exit.
    pub(super) finished: bool,
}

/// Lifecycle of a single debuggee.
///
/// Program runs on a dedicated execution thread, while control calls come from any other thread.
/// State machine: `Idle -> Running -> (Paused <-> Running) -> Finished`, `stop` is reachable
/// from both `Running` and `Paused`.
pub struct DebugSession {
    id: SessionId,
    pub(super) source: Mutex<SourceState>,
    pub(super) control: Mutex<Control>,
    pub(super) gate: Condvar,
    pub(super) events: Arc<EventQueue>,
    /// Execution thread of the last run, lock serializes `start` calls.
    worker: Mutex<Option<JoinHandle<()>>>,
    stack_size: usize,
}

impl DebugSession {
    pub fn new(stack_size: usize) -> Self {
        Self {
            id: SessionId::new(),
            source: Mutex::default(),
            control: Mutex::default(),
            gate: Condvar::new(),
            events: Arc::new(EventQueue::new()),
            worker: Mutex::default(),
            stack_size,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Compile source for the next runs and register it in session line cache.
    ///
    /// Decode and compile errors are kept and reported when the session starts, lines of such
    /// a source stay addressable. Breakpoints that do not point to an executable line of
    /// the new source are dropped.
    pub fn set_source(&self, filename: &str, bytes: Vec<u8>) {
        let filename = normalize_filename(filename).to_string();
        let mut cache = LineCache::new();
        let program = prepare(&filename, &bytes, &mut cache);

        let mut state = self.source.lock().unwrap();
        let dropped = state.breakpoints.retain_valid(&cache);
        if !dropped.is_empty() {
            log::debug!(target: "debugger", "session {}: breakpoints dropped with old source: {dropped:?}", self.id);
        }
        state.cache = cache;
        log::debug!(target: "debugger", "session {}: source {filename} set ({} bytes)", self.id, bytes.len());
        state.source = Some(Source { filename, program });
    }

    pub fn source_filename(&self) -> Option<String> {
        let state = self.source.lock().unwrap();
        state.source.as_ref().map(|s| s.filename.clone())
    }

    pub fn is_running(&self) -> bool {
        self.control.lock().unwrap().running
    }

    pub fn is_paused(&self) -> bool {
        self.control.lock().unwrap().paused
    }

    /// Start program execution on a new thread, return without waiting for it.
    ///
    /// A stopped session can not be started until its previous run emits `Finished`.
    pub fn start(self: &Arc<Self>) -> Result<(), Error> {
        let mut worker = self.worker.lock().unwrap();
        {
            let control = self.control.lock().unwrap();
            if control.running {
                return Err(Error::AlreadyRunning);
            }
            if worker.is_some() && !control.finished {
                return Err(Error::Stopping);
            }
        }

        // previous run already emit `Finished`, its thread is gone or about to be
        if let Some(previous) = worker.take() {
            _ = previous.join();
        }

        {
            let mut control = self.control.lock().unwrap();
            *control = Control {
                running: true,
                ..Control::default()
            };
            self.events.push(Event::Started);
        }

        let session = self.clone();
        let spawn_result = thread::Builder::new()
            .name(format!("session-{}", self.id))
            .stack_size(self.stack_size)
            .spawn(move || session.run_debugger());

        match spawn_result {
            Ok(handle) => {
                *worker = Some(handle);
                log::info!(target: "debugger", "session {}: started", self.id);
                Ok(())
            }
            Err(e) => {
                let status = status::error(format!("spawn execution thread: {e}"));
                self.finish(status);
                Err(Error::Spawn(e))
            }
        }
    }

    pub fn pause(&self) -> Result<(), Error> {
        let mut control = self.control.lock().unwrap();
        if !control.running {
            return Err(Error::NotRunning);
        }
        if control.paused {
            return Err(Error::AlreadyPaused);
        }
        control.paused = true;
        self.events.push(Event::Paused);
        Ok(())
    }

    pub fn resume(&self) -> Result<(), Error> {
        let mut control = self.control.lock().unwrap();
        if !control.running {
            return Err(Error::NotRunning);
        }
        if !control.paused {
            return Err(Error::NotPaused);
        }
        control.paused = false;
        self.events.push(Event::Resumed);
        self.gate.notify_all();
        Ok(())
    }

    /// Request execution termination, works both for running and paused session.
    pub fn stop(&self) -> Result<(), Error> {
        let mut control = self.control.lock().unwrap();
        if !control.running {
            return Err(Error::NotRunning);
        }
        control.quit = true;
        control.paused = false;
        control.running = false;
        self.gate.notify_all();
        log::info!(target: "debugger", "session {}: stop requested", self.id);
        Ok(())
    }

    pub fn add_breakpoint(&self, filename: &str, lineno: u32) -> Result<(), Error> {
        let mut state = self.source.lock().unwrap();
        let state = &mut *state;
        state
            .breakpoints
            .add(Breakpoint::new(filename, lineno), &state.cache)
    }

    pub fn remove_breakpoint(&self, filename: &str, lineno: u32) -> Result<(), Error> {
        self.source
            .lock()
            .unwrap()
            .breakpoints
            .remove(&Breakpoint::new(filename, lineno))
    }

    /// Replace all breakpoints, on failure the old set stays in place.
    pub fn set_breakpoints(&self, breakpoints: Vec<Breakpoint>) -> Result<(), Error> {
        let mut state = self.source.lock().unwrap();
        let state = &mut *state;
        state.breakpoints.replace(breakpoints, &state.cache)
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.source.lock().unwrap().breakpoints.snapshot()
    }

    /// Take next event, waiting up to `timeout` for it.
    pub fn get_event(&self, timeout: Duration) -> Option<Event> {
        self.events.pop_timeout(timeout)
    }

    /// Execution thread body, never fails: every problem becomes an event.
    fn run_debugger(self: &Arc<Self>) {
        let status = match panic::catch_unwind(AssertUnwindSafe(|| self.execute())) {
            Ok(status) => status,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!(target: "debugger", "session {}: execution thread panic: {message}", self.id);
                self.events.push(Event::Stderr {
                    message: format!("internal error: {message}\n"),
                });
                status::error(format!("internal error: {message}"))
            }
        };
        self.finish(status);
    }

    fn finish(&self, status: String) {
        let mut control = self.control.lock().unwrap();
        log::info!(target: "debugger", "session {}: finished with status \"{status}\"", self.id);
        self.events.push(Event::Finished { status });
        control.running = false;
        control.paused = false;
        control.finished = true;
    }

    fn execute(self: &Arc<Self>) -> String {
        let (filename, program) = {
            let state = self.source.lock().unwrap();
            match &state.source {
                Some(source) => (source.filename.clone(), source.program.clone()),
                None => {
                    self.events.push(Event::Stderr {
                        message: "No source set for session".to_string(),
                    });
                    return status::NO_SOURCE.to_string();
                }
            }
        };
        let program = match program {
            Ok(program) => program,
            Err(unrunnable) => {
                self.events.push(Event::Stderr {
                    message: unrunnable.stderr,
                });
                return unrunnable.status;
            }
        };

        let tracer = Arc::new(Mutex::new(SessionTracer::new(self.clone(), &filename)));
        let result = program.run(
            tracer.clone(),
            Streams {
                stdout: Box::new(OutputCapture::new(self.events.clone(), StreamKind::Stdout)),
                stderr: Box::new(OutputCapture::new(self.events.clone(), StreamKind::Stderr)),
            },
        );

        match result {
            Ok(()) if self.control.lock().unwrap().quit => status::STOPPED.to_string(),
            Ok(()) => status::SUCCESS.to_string(),
            Err(RunError::Quit) => status::STOPPED.to_string(),
            Err(RunError::Exception(exception)) => {
                if !tracer.lock().unwrap().exception_reported {
                    self.events.push(Event::Stderr {
                        message: format!("{exception}\n"),
                    });
                }
                status::error(exception)
            }
            Err(e @ RunError::Internal(_)) => {
                log::error!(target: "debugger", "session {}: {e}", self.id);
                self.events.push(Event::Stderr {
                    message: format!("{e}\n"),
                });
                status::error(e)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
