//! Debugger service: validates calls and delegates them to sessions.

use crate::debugger::{self, Breakpoint, DebugSession, Event, SessionId, SessionRegistry};
use crate::rpc::protocol::{
    BreakpointArgs, BreakpointsBody, Command, SessionArgs, SessionBody, SessionListBody,
    SetBreakpointsArgs, SetSourceArgs, Status,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

const SESSION_NOT_FOUND: &str = "Session not found";

/// Consumer side of an event stream.
pub trait StreamContext {
    /// False when the consumer disconnected or stream must end for another reason.
    fn is_active(&self) -> bool;

    fn send(&mut self, event: Event) -> anyhow::Result<()>;
}

/// Events of a single session, pulled with a bounded wait so that a gone consumer is noticed.
pub struct EventStream {
    session: Arc<DebugSession>,
    poll_interval: Duration,
}

impl EventStream {
    /// Forward session events to consumer until it goes inactive or a send fails.
    pub fn run(self, ctx: &mut dyn StreamContext) {
        let id = self.session.id();
        log::debug!(target: "rpc", "session {id}: event stream opened");
        while ctx.is_active() {
            let Some(event) = self.session.get_event(self.poll_interval) else {
                continue;
            };
            if let Err(e) = ctx.send(event) {
                log::debug!(target: "rpc", "session {id}: event stream send error: {e:#}");
                break;
            }
        }
        log::debug!(target: "rpc", "session {id}: event stream closed");
    }
}

pub struct DebuggerService {
    registry: SessionRegistry,
    poll_interval: Duration,
}

fn state_status(err: debugger::Error) -> Status {
    match err {
        debugger::Error::AlreadyRunning => Status::failed_precondition("Session already running"),
        debugger::Error::NotRunning => Status::failed_precondition("Session not running"),
        debugger::Error::AlreadyPaused => Status::failed_precondition("Session already paused"),
        debugger::Error::NotPaused => Status::failed_precondition("Session not paused"),
        debugger::Error::Stopping => Status::failed_precondition("Session is stopping"),
        debugger::Error::Spawn(_) => Status::internal(err.to_string()),
        other => Status::failed_precondition(other.to_string()),
    }
}

fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, Status> {
    serde_json::from_value(arguments)
        .map_err(|e| Status::invalid_argument(format!("malformed arguments: {e}")))
}

fn body<T: Serialize>(body: T) -> Result<Option<Value>, Status> {
    serde_json::to_value(body)
        .map(Some)
        .map_err(|e| Status::internal(e.to_string()))
}

impl DebuggerService {
    pub fn new(registry: SessionRegistry, poll_interval: Duration) -> Self {
        Self {
            registry,
            poll_interval,
        }
    }

    fn session(&self, id: &str) -> Result<Arc<DebugSession>, Status> {
        self.registry
            .get(id)
            .ok_or_else(|| Status::not_found(SESSION_NOT_FOUND))
    }

    pub fn create_session(&self) -> SessionId {
        self.registry.create().id()
    }

    pub fn list_sessions(&self) -> Vec<SessionId> {
        self.registry.list()
    }

    pub fn set_source(&self, id: &str, filename: &str, source: Vec<u8>) -> Result<(), Status> {
        self.session(id)?.set_source(filename, source);
        Ok(())
    }

    pub fn start(&self, id: &str) -> Result<(), Status> {
        self.session(id)?.start().map_err(state_status)
    }

    pub fn pause(&self, id: &str) -> Result<(), Status> {
        self.session(id)?.pause().map_err(state_status)
    }

    pub fn resume(&self, id: &str) -> Result<(), Status> {
        self.session(id)?.resume().map_err(state_status)
    }

    pub fn stop(&self, id: &str) -> Result<(), Status> {
        self.session(id)?.stop().map_err(state_status)
    }

    pub fn add_breakpoint(&self, id: &str, filename: &str, lineno: u32) -> Result<(), Status> {
        let session = self.session(id)?;
        crate::muted_error!(session.add_breakpoint(filename, lineno), "add breakpoint:")
            .ok_or_else(|| Status::failed_precondition("Cannot add breakpoint"))
    }

    pub fn remove_breakpoint(&self, id: &str, filename: &str, lineno: u32) -> Result<(), Status> {
        let session = self.session(id)?;
        crate::muted_error!(session.remove_breakpoint(filename, lineno), "remove breakpoint:")
            .ok_or_else(|| Status::failed_precondition("Cannot remove breakpoint"))
    }

    pub fn set_breakpoints(&self, id: &str, breakpoints: Vec<Breakpoint>) -> Result<(), Status> {
        let session = self.session(id)?;
        crate::muted_error!(session.set_breakpoints(breakpoints), "set breakpoints:")
            .ok_or_else(|| Status::failed_precondition("Cannot add breakpoint"))
    }

    pub fn get_breakpoints(&self, id: &str) -> Result<Vec<Breakpoint>, Status> {
        Ok(self.session(id)?.breakpoints())
    }

    /// Open an event stream, fails if session is unknown.
    pub fn listen_events(&self, id: &str) -> Result<EventStream, Status> {
        Ok(EventStream {
            session: self.session(id)?,
            poll_interval: self.poll_interval,
        })
    }

    /// Dispatch an unary call, event streams are opened with [`DebuggerService::listen_events`].
    pub fn handle(&self, command: Command, arguments: Value) -> Result<Option<Value>, Status> {
        match command {
            Command::CreateSession => body(SessionBody {
                session_id: self.create_session().to_string(),
            }),
            Command::ListSessions => body(SessionListBody {
                session_ids: self
                    .list_sessions()
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            }),
            Command::SetSource => {
                let args: SetSourceArgs = parse_args(arguments)?;
                self.set_source(&args.session_id, &args.filename, args.source)
                    .map(|_| None)
            }
            Command::Start => {
                let args: SessionArgs = parse_args(arguments)?;
                self.start(&args.session_id).map(|_| None)
            }
            Command::Pause => {
                let args: SessionArgs = parse_args(arguments)?;
                self.pause(&args.session_id).map(|_| None)
            }
            Command::Resume => {
                let args: SessionArgs = parse_args(arguments)?;
                self.resume(&args.session_id).map(|_| None)
            }
            Command::Stop => {
                let args: SessionArgs = parse_args(arguments)?;
                self.stop(&args.session_id).map(|_| None)
            }
            Command::AddBreakpoint => {
                let args: BreakpointArgs = parse_args(arguments)?;
                self.add_breakpoint(&args.session_id, &args.filename, args.lineno)
                    .map(|_| None)
            }
            Command::RemoveBreakpoint => {
                let args: BreakpointArgs = parse_args(arguments)?;
                self.remove_breakpoint(&args.session_id, &args.filename, args.lineno)
                    .map(|_| None)
            }
            Command::SetBreakpoints => {
                let args: SetBreakpointsArgs = parse_args(arguments)?;
                self.set_breakpoints(&args.session_id, args.breakpoints)
                    .map(|_| None)
            }
            Command::GetBreakpoints => {
                let args: SessionArgs = parse_args(arguments)?;
                body(BreakpointsBody {
                    breakpoints: self.get_breakpoints(&args.session_id)?,
                })
            }
            Command::ListenEvents => Err(Status::invalid_argument(
                "listen_events requires a dedicated connection",
            )),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::debugger::DEFAULT_STACK_SIZE;
    use crate::rpc::protocol::Code;
    use serde_json::json;
    use std::time::Instant;

    fn service() -> DebuggerService {
        DebuggerService::new(
            SessionRegistry::new(DEFAULT_STACK_SIZE),
            Duration::from_millis(50),
        )
    }

    struct Collect {
        events: Vec<Event>,
        deadline: Instant,
    }

    impl StreamContext for Collect {
        fn is_active(&self) -> bool {
            Instant::now() < self.deadline && !self.events.last().is_some_and(Event::is_terminal)
        }

        fn send(&mut self, event: Event) -> anyhow::Result<()> {
            self.events.push(event);
            Ok(())
        }
    }

    #[test]
    fn test_unknown_session() {
        let service = service();
        let unknown = SessionId::new().to_string();
        for result in [
            service.start(&unknown),
            service.pause(&unknown),
            service.resume(&unknown),
            service.stop(&unknown),
            service.set_source(&unknown, "a.py", vec![]),
            service.add_breakpoint(&unknown, "a.py", 1),
        ] {
            assert_eq!(result, Err(Status::not_found("Session not found")));
        }
        assert!(service.listen_events("garbage").is_err());
    }

    #[test]
    fn test_state_preconditions() {
        let service = service();
        let id = service.create_session().to_string();
        service
            .set_source(&id, "a.py", b"x = 1\ny = 2\n".to_vec())
            .unwrap();

        assert_eq!(
            service.pause(&id),
            Err(Status::failed_precondition("Session not running"))
        );
        assert_eq!(
            service.resume(&id),
            Err(Status::failed_precondition("Session not running"))
        );
        assert_eq!(
            service.stop(&id),
            Err(Status::failed_precondition("Session not running"))
        );

        service.add_breakpoint(&id, "a.py", 1).unwrap();
        assert_eq!(
            service.add_breakpoint(&id, "a.py", 10),
            Err(Status::failed_precondition("Cannot add breakpoint"))
        );
        assert_eq!(
            service.remove_breakpoint(&id, "a.py", 2),
            Err(Status::failed_precondition("Cannot remove breakpoint"))
        );

        service.start(&id).unwrap();
        assert_eq!(
            service.start(&id),
            Err(Status::failed_precondition("Session already running"))
        );
        service.stop(&id).unwrap();
    }

    #[test]
    fn test_event_stream() {
        let service = service();
        let id = service.create_session().to_string();
        service
            .set_source(&id, "a.py", b"print('hi')\n".to_vec())
            .unwrap();
        service.start(&id).unwrap();

        let mut ctx = Collect {
            events: vec![],
            deadline: Instant::now() + Duration::from_secs(5),
        };
        service.listen_events(&id).unwrap().run(&mut ctx);
        assert_eq!(
            ctx.events,
            vec![
                Event::Started,
                Event::LineChanged {
                    filename: "a.py".to_string(),
                    lineno: 1
                },
                Event::Stdout {
                    message: "hi\n".to_string()
                },
                Event::Finished {
                    status: "success".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_dispatch() {
        let service = service();
        let body = service
            .handle(Command::CreateSession, Value::Null)
            .unwrap()
            .unwrap();
        let id = body["session_id"].as_str().unwrap().to_string();

        let list = service
            .handle(Command::ListSessions, Value::Null)
            .unwrap()
            .unwrap();
        assert_eq!(list, json!({"session_ids": [id]}));

        service
            .handle(
                Command::SetSource,
                json!({"session_id": id, "filename": "m.py", "source": b"a = 1\n"}),
            )
            .unwrap();
        service
            .handle(
                Command::AddBreakpoint,
                json!({"session_id": id, "filename": "m.py", "lineno": 1}),
            )
            .unwrap();
        let breakpoints = service
            .handle(Command::GetBreakpoints, json!({"session_id": id}))
            .unwrap()
            .unwrap();
        assert_eq!(
            breakpoints,
            json!({"breakpoints": [{"filename": "m.py", "lineno": 1}]})
        );

        let err = service
            .handle(Command::Start, json!({"id": id}))
            .unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
        let err = service
            .handle(Command::ListenEvents, json!({"session_id": id}))
            .unwrap_err();
        assert_eq!(err.code, Code::InvalidArgument);
    }
}
