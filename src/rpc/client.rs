//! Debugger client: one method per call plus a background event listener.

use crate::debugger::{Breakpoint, Event};
use crate::rpc::protocol::{
    BreakpointArgs, BreakpointsBody, Command, EventMessage, Request, Response, SessionArgs,
    SessionBody, SessionListBody, SetBreakpointsArgs, SetSourceArgs, Status, EVENT, REQUEST,
    RESPONSE,
};
use crate::rpc::transport::{is_closed, TcpTransport, Transport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Status(#[from] Status),
    #[error("transport error: {0:#}")]
    Transport(#[from] anyhow::Error),
    #[error("unexpected server message: {0}")]
    Protocol(String),
    #[error("already listening for session {0}")]
    AlreadyListening(String),
}

#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    /// A request that gets no answer within this time fails with a transport error.
    pub request_timeout: Duration,
    /// Upper bound for waiting on a listener thread when it is stopped.
    pub listener_join_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(10),
            listener_join_timeout: Duration::from_secs(2),
        }
    }
}

pub type ErrorCallback = Box<dyn FnOnce(anyhow::Error) + Send>;

struct Listener {
    session_id: String,
    stop: Arc<AtomicBool>,
    socket: TcpStream,
    done: mpsc::Receiver<()>,
    thread: JoinHandle<()>,
}

impl Listener {
    fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Client of a debugger server.
pub struct DebuggerClient {
    addr: SocketAddr,
    options: ClientOptions,
    transport: TcpTransport,
    seq: i64,
    listener: Option<Listener>,
}

fn resolve(addr: impl ToSocketAddrs) -> anyhow::Result<SocketAddr> {
    addr.to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("address resolves to nothing"))
}

/// Send a request and wait for its response.
fn call(
    transport: &mut TcpTransport,
    seq: i64,
    command: Command,
    arguments: Value,
) -> Result<Option<Value>, Error> {
    let request = Request {
        seq,
        r#type: REQUEST.to_string(),
        command: command.to_string(),
        arguments,
    };
    transport.write_message(&serde_json::to_value(request).map_err(anyhow::Error::from)?)?;

    loop {
        let message = transport.read_message()?;
        match message.get("type").and_then(Value::as_str) {
            Some(RESPONSE) => {}
            Some(EVENT) => continue,
            other => return Err(Error::Protocol(format!("message type {other:?}"))),
        }
        let response: Response =
            serde_json::from_value(message).map_err(|e| Error::Protocol(e.to_string()))?;
        if response.request_seq != seq {
            log::debug!(target: "rpc", "skip response to request #{}", response.request_seq);
            continue;
        }
        return Ok(response.into_result()?);
    }
}

fn decode<T: DeserializeOwned>(body: Option<Value>) -> Result<T, Error> {
    let body = body.ok_or_else(|| Error::Protocol("response without body".to_string()))?;
    serde_json::from_value(body).map_err(|e| Error::Protocol(e.to_string()))
}

fn args(arguments: impl Serialize) -> Result<Value, Error> {
    serde_json::to_value(arguments).map_err(|e| Error::Transport(e.into()))
}

impl DebuggerClient {
    pub fn connect(addr: impl ToSocketAddrs, options: ClientOptions) -> Result<Self, Error> {
        let addr = resolve(addr)?;
        let transport = TcpTransport::connect(addr, options.connect_timeout)?;
        transport
            .set_timeouts(Some(options.request_timeout))
            .map_err(anyhow::Error::from)?;
        log::debug!(target: "rpc", "connected to {addr}");
        Ok(Self {
            addr,
            options,
            transport,
            seq: 0,
            listener: None,
        })
    }

    fn call(&mut self, command: Command, arguments: Value) -> Result<Option<Value>, Error> {
        self.seq += 1;
        call(&mut self.transport, self.seq, command, arguments)
    }

    fn session_call(&mut self, command: Command, session_id: &str) -> Result<(), Error> {
        let arguments = args(SessionArgs {
            session_id: session_id.to_string(),
        })?;
        self.call(command, arguments).map(|_| ())
    }

    pub fn create_session(&mut self) -> Result<String, Error> {
        let body: SessionBody = decode(self.call(Command::CreateSession, Value::Null)?)?;
        Ok(body.session_id)
    }

    pub fn list_sessions(&mut self) -> Result<Vec<String>, Error> {
        let body: SessionListBody = decode(self.call(Command::ListSessions, Value::Null)?)?;
        Ok(body.session_ids)
    }

    pub fn set_source(&mut self, session_id: &str, filename: &str, source: Vec<u8>) -> Result<(), Error> {
        let arguments = args(SetSourceArgs {
            session_id: session_id.to_string(),
            filename: filename.to_string(),
            source,
        })?;
        self.call(Command::SetSource, arguments).map(|_| ())
    }

    pub fn start(&mut self, session_id: &str) -> Result<(), Error> {
        self.session_call(Command::Start, session_id)
    }

    pub fn pause(&mut self, session_id: &str) -> Result<(), Error> {
        self.session_call(Command::Pause, session_id)
    }

    pub fn resume(&mut self, session_id: &str) -> Result<(), Error> {
        self.session_call(Command::Resume, session_id)
    }

    pub fn stop(&mut self, session_id: &str) -> Result<(), Error> {
        self.session_call(Command::Stop, session_id)
    }

    pub fn add_breakpoint(&mut self, session_id: &str, filename: &str, lineno: u32) -> Result<(), Error> {
        let arguments = args(BreakpointArgs {
            session_id: session_id.to_string(),
            filename: filename.to_string(),
            lineno,
        })?;
        self.call(Command::AddBreakpoint, arguments).map(|_| ())
    }

    pub fn remove_breakpoint(&mut self, session_id: &str, filename: &str, lineno: u32) -> Result<(), Error> {
        let arguments = args(BreakpointArgs {
            session_id: session_id.to_string(),
            filename: filename.to_string(),
            lineno,
        })?;
        self.call(Command::RemoveBreakpoint, arguments).map(|_| ())
    }

    pub fn set_breakpoints(&mut self, session_id: &str, breakpoints: Vec<Breakpoint>) -> Result<(), Error> {
        let arguments = args(SetBreakpointsArgs {
            session_id: session_id.to_string(),
            breakpoints,
        })?;
        self.call(Command::SetBreakpoints, arguments).map(|_| ())
    }

    pub fn get_breakpoints(&mut self, session_id: &str) -> Result<Vec<Breakpoint>, Error> {
        let arguments = args(SessionArgs {
            session_id: session_id.to_string(),
        })?;
        let body: BreakpointsBody = decode(self.call(Command::GetBreakpoints, arguments)?)?;
        Ok(body.breakpoints)
    }

    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(|l| !l.is_finished())
    }

    /// Session of active listener.
    pub fn listening_session(&self) -> Option<&str> {
        self.listener
            .as_ref()
            .filter(|l| !l.is_finished())
            .map(|l| l.session_id.as_str())
    }

    /// Subscribe to session events.
    ///
    /// Subscription is confirmed synchronously, then `on_event` is called for each event on
    /// a dedicated thread. Transport errors end the listener, `on_error` is called
    /// for them unless listener was stopped by [`DebuggerClient::stop_listening`].
    pub fn listen_events(
        &mut self,
        session_id: &str,
        mut on_event: impl FnMut(Event) + Send + 'static,
        on_error: Option<ErrorCallback>,
    ) -> Result<(), Error> {
        if let Some(listener) = &self.listener {
            if !listener.is_finished() {
                return Err(Error::AlreadyListening(listener.session_id.clone()));
            }
        }
        if let Some(finished) = self.listener.take() {
            _ = finished.thread.join();
        }

        let mut transport = TcpTransport::connect(self.addr, self.options.connect_timeout)?;
        transport
            .set_timeouts(Some(self.options.request_timeout))
            .map_err(anyhow::Error::from)?;
        let arguments = args(SessionArgs {
            session_id: session_id.to_string(),
        })?;
        call(&mut transport, 1, Command::ListenEvents, arguments)?;
        // events may be arbitrarily far apart
        transport.set_timeouts(None).map_err(anyhow::Error::from)?;

        let socket = transport.shutdown_handle().map_err(anyhow::Error::from)?;
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done) = mpsc::channel();

        let thread = {
            let stop = stop.clone();
            let session_id = session_id.to_string();
            thread::Builder::new()
                .name(format!("listener-{session_id}"))
                .spawn(move || {
                    match listen_loop(&mut transport, &stop, &mut on_event) {
                        Ok(()) => {
                            log::debug!(target: "rpc", "listener for {session_id} finished");
                        }
                        Err(e) if stop.load(Ordering::SeqCst) => {
                            log::debug!(target: "rpc", "listener for {session_id} stopped: {e:#}");
                        }
                        Err(e) if is_closed(&e) => {
                            log::debug!(target: "rpc", "event stream for {session_id} closed by server");
                        }
                        Err(e) => {
                            log::debug!(target: "rpc", "listener for {session_id} failed: {e:#}");
                            if let Some(on_error) = on_error {
                                on_error(e);
                            }
                        }
                    }
                    _ = done_tx.send(());
                })
                .map_err(anyhow::Error::from)?
        };

        self.listener = Some(Listener {
            session_id: session_id.to_string(),
            stop,
            socket,
            done,
            thread,
        });
        Ok(())
    }

    /// Stop the listener, waiting a bounded time for its thread.
    ///
    /// Return false if there was no listener or its thread did not finish in time.
    pub fn stop_listening(&mut self) -> bool {
        let Some(listener) = self.listener.take() else {
            return false;
        };
        listener.stop.store(true, Ordering::SeqCst);
        _ = listener.socket.shutdown(Shutdown::Both);

        match listener.done.recv_timeout(self.options.listener_join_timeout) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                _ = listener.thread.join();
                true
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                log::warn!(target: "rpc", "listener for session {} did not stop in time", listener.session_id);
                false
            }
        }
    }

    /// Stop listening and close the control connection.
    pub fn close(mut self) {
        self.stop_listening();
        self.transport.shutdown();
    }
}

impl Drop for DebuggerClient {
    fn drop(&mut self) {
        if self.listener.is_some() {
            self.stop_listening();
        }
    }
}

fn listen_loop(
    transport: &mut TcpTransport,
    stop: &AtomicBool,
    on_event: &mut impl FnMut(Event),
) -> anyhow::Result<()> {
    loop {
        let message = transport.read_message()?;
        if stop.load(Ordering::SeqCst) {
            return Ok(());
        }
        if message.get("type").and_then(Value::as_str) != Some(EVENT) {
            log::debug!(target: "rpc", "listener skip non event message");
            continue;
        }
        let message: EventMessage = serde_json::from_value(message)?;
        on_event(message.event);
    }
}
