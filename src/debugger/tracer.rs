use crate::debugger::event::Event;
use crate::debugger::session::DebugSession;
use crate::script::{normalize_filename, Exception, Frame, TraceControl, Tracer};
use std::sync::Arc;

/// Line tracer bound to a single session.
///
/// Reports positions inside the session source, stops at breakpoints and
/// blocks execution while the session is paused.
pub(super) struct SessionTracer {
    session: Arc<DebugSession>,
    filename: String,
    /// Set when an unhandled exception was reported as a `Stderr` event.
    pub(super) exception_reported: bool,
}

impl SessionTracer {
    pub(super) fn new(session: Arc<DebugSession>, filename: &str) -> Self {
        Self {
            session,
            filename: normalize_filename(filename).to_string(),
            exception_reported: false,
        }
    }

    fn is_own(&self, filename: &str) -> bool {
        normalize_filename(filename) == self.filename
    }
}

impl Tracer for SessionTracer {
    fn on_line(&mut self, frame: &Frame) -> TraceControl {
        if !self.is_own(frame.filename) {
            return TraceControl::Continue;
        }

        self.session.events.push(Event::LineChanged {
            filename: self.filename.clone(),
            lineno: frame.lineno,
        });
        let at_breakpoint = self
            .session
            .source
            .lock()
            .unwrap()
            .breakpoints
            .contains(&self.filename, frame.lineno);

        let mut control = self.session.control.lock().unwrap();
        if at_breakpoint && !control.paused && !control.quit {
            log::debug!(target: "debugger", "session {}: breakpoint hit at {}:{}", self.session.id(), self.filename, frame.lineno);
            control.paused = true;
            self.session.events.push(Event::Paused);
        }
        while control.paused && !control.quit {
            control = self.session.gate.wait(control).unwrap();
        }

        if control.quit {
            TraceControl::Quit
        } else {
            TraceControl::Continue
        }
    }

    fn on_exception(&mut self, exception: &Exception) {
        let Some(origin) = exception.origin() else {
            return;
        };
        if !self.is_own(&origin.filename) {
            return;
        }
        let message = exception.format_traceback(&self.session.source.lock().unwrap().cache);
        self.session.events.push(Event::Stderr { message });
        self.exception_reported = true;
    }
}
