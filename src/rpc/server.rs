//! Debugger server: binds the service to a TCP endpoint.

use crate::rpc::protocol::{Command, EventMessage, Request, Response, Status, REQUEST};
use crate::rpc::service::{DebuggerService, StreamContext};
use crate::rpc::transport::{is_closed, TcpTransport, Transport};
use crate::debugger::Event;
use anyhow::{anyhow, Context};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Open connections, shut down together with the server.
#[derive(Default)]
struct Connections {
    next_id: AtomicU64,
    streams: Mutex<HashMap<u64, TcpStream>>,
}

impl Connections {
    fn register(&self, stream: &TcpStream) -> io::Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.streams.lock().unwrap().insert(id, stream.try_clone()?);
        Ok(id)
    }

    fn release(&self, id: u64) {
        self.streams.lock().unwrap().remove(&id);
    }

    fn shutdown_all(&self) {
        for (_, stream) in self.streams.lock().unwrap().drain() {
            _ = stream.shutdown(Shutdown::Both);
        }
    }
}

struct Serving {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    connections: Arc<Connections>,
    accept_thread: JoinHandle<()>,
}

pub struct DebuggerServer {
    service: Arc<DebuggerService>,
    address: String,
    workers: usize,
    serving: Option<Serving>,
}

impl DebuggerServer {
    /// Create a stopped server, `address` is a `host:port` pair.
    pub fn new(service: Arc<DebuggerService>, address: impl Into<String>, workers: usize) -> Self {
        Self {
            service,
            address: address.into(),
            workers: workers.max(1),
            serving: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.serving.is_some()
    }

    /// Bound address of running server.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.serving.as_ref().map(|s| s.local_addr)
    }

    /// Bind endpoint and start accepting connections in background.
    pub fn start(&mut self) -> anyhow::Result<SocketAddr> {
        if self.serving.is_some() {
            return Err(anyhow!("server already started"));
        }

        let listener = TcpListener::bind(&self.address)
            .with_context(|| format!("bind {}", self.address))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|idx| format!("rpc-worker-{idx}"))
            .panic_handler(|_| log::error!(target: "rpc", "connection handler panic"))
            .build()
            .context("build worker pool")?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let connections = Arc::new(Connections::default());

        let accept_thread = {
            let service = self.service.clone();
            let shutdown = shutdown.clone();
            let connections = connections.clone();
            thread::Builder::new()
                .name("rpc-accept".to_string())
                .spawn(move || accept_loop(listener, pool, service, shutdown, connections))?
        };

        log::info!(target: "rpc", "server listening on {local_addr}");
        self.serving = Some(Serving {
            local_addr,
            shutdown,
            connections,
            accept_thread,
        });
        Ok(local_addr)
    }

    /// Stop accepting connections, close open ones and wait for the accept thread.
    pub fn stop(&mut self) -> anyhow::Result<()> {
        let serving = self
            .serving
            .take()
            .ok_or_else(|| anyhow!("server not started"))?;
        serving.shutdown.store(true, Ordering::SeqCst);
        serving.connections.shutdown_all();
        serving
            .accept_thread
            .join()
            .map_err(|_| anyhow!("accept thread panic"))?;
        log::info!(target: "rpc", "server on {} stopped", serving.local_addr);
        Ok(())
    }
}

impl Drop for DebuggerServer {
    fn drop(&mut self) {
        if self.serving.is_some() {
            crate::weak_error!(self.stop(), "stop server:");
        }
    }
}

fn accept_loop(
    listener: TcpListener,
    pool: rayon::ThreadPool,
    service: Arc<DebuggerService>,
    shutdown: Arc<AtomicBool>,
    connections: Arc<Connections>,
) {
    while !shutdown.load(Ordering::SeqCst) {
        let (stream, peer) = match listener.accept() {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
            Err(e) => {
                log::warn!(target: "rpc", "accept failed: {e:#}");
                thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
        };
        log::debug!(target: "rpc", "client connected: {peer}");

        let Some(conn_id) = crate::weak_error!(
            stream
                .set_nonblocking(false)
                .and_then(|_| connections.register(&stream)),
            "register connection:"
        ) else {
            continue;
        };

        let service = service.clone();
        let shutdown = shutdown.clone();
        let connections = connections.clone();
        pool.spawn(move || {
            if let Err(e) = serve_connection(&service, stream, &shutdown) {
                log::warn!(target: "rpc", "connection {peer} failed: {e:#}");
            }
            connections.release(conn_id);
            log::debug!(target: "rpc", "client disconnected: {peer}");
        });
    }
    // connections accepted after shutdown flag was set
    connections.shutdown_all();
}

/// Server side of a single connection.
struct Connection {
    transport: TcpTransport,
    seq: i64,
}

impl Connection {
    fn next_seq(&mut self) -> i64 {
        self.seq += 1;
        self.seq
    }

    fn respond(
        &mut self,
        request_seq: i64,
        command: &str,
        result: Result<Option<Value>, Status>,
    ) -> anyhow::Result<()> {
        let seq = self.next_seq();
        let response = Response::new(seq, request_seq, command, result);
        self.transport.write_message(&serde_json::to_value(response)?)
    }
}

struct ConnectionStream<'a> {
    connection: &'a mut Connection,
    shutdown: &'a AtomicBool,
}

impl StreamContext for ConnectionStream<'_> {
    fn is_active(&self) -> bool {
        !self.shutdown.load(Ordering::SeqCst) && self.connection.transport.peer_alive()
    }

    fn send(&mut self, event: Event) -> anyhow::Result<()> {
        let seq = self.connection.next_seq();
        let message = serde_json::to_value(EventMessage::new(seq, event))?;
        self.connection.transport.write_message(&message)
    }
}

fn serve_connection(
    service: &DebuggerService,
    stream: TcpStream,
    shutdown: &AtomicBool,
) -> anyhow::Result<()> {
    let mut connection = Connection {
        transport: TcpTransport::new(stream)?,
        seq: 0,
    };

    loop {
        let message = match connection.transport.read_message() {
            Ok(message) => message,
            Err(e) if is_closed(&e) || shutdown.load(Ordering::SeqCst) => return Ok(()),
            Err(e) => return Err(e),
        };

        let request: Request = match serde_json::from_value(message) {
            Ok(request) => request,
            Err(e) => {
                connection.respond(0, "", Err(Status::invalid_argument(format!("malformed request: {e}"))))?;
                continue;
            }
        };
        if request.r#type != REQUEST {
            connection.respond(
                request.seq,
                &request.command,
                Err(Status::invalid_argument(format!("unexpected message type: {}", request.r#type))),
            )?;
            continue;
        }

        log::debug!(target: "rpc", "request #{}: {}", request.seq, request.command);
        let command = match request.command.parse::<Command>() {
            Ok(command) => command,
            Err(_) => {
                let status = Status::invalid_argument(format!("unknown command: {}", request.command));
                connection.respond(request.seq, &request.command, Err(status))?;
                continue;
            }
        };

        if command == Command::ListenEvents {
            let stream = request
                .arguments
                .get("session_id")
                .and_then(Value::as_str)
                .ok_or_else(|| Status::invalid_argument("missing session_id"))
                .and_then(|id| service.listen_events(id));
            return match stream {
                Ok(stream) => {
                    connection.respond(request.seq, &request.command, Ok(None))?;
                    stream.run(&mut ConnectionStream {
                        connection: &mut connection,
                        shutdown,
                    });
                    Ok(())
                }
                Err(status) => connection.respond(request.seq, &request.command, Err(status)),
            };
        }

        let result = service.handle(command, request.arguments);
        if let Err(status) = &result {
            log::debug!(target: "rpc", "request #{} failed: {status}", request.seq);
        }
        connection.respond(request.seq, &request.command, result)?;
    }
}
