//! Message transport: Content-Length framed JSON over TCP.

use anyhow::anyhow;
use serde_json::Value;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

/// Largest accepted message payload.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Peer closed the connection between messages.
#[derive(Debug, thiserror::Error)]
#[error("connection closed")]
pub struct ConnectionClosed;

/// True if error means a regular connection close.
pub fn is_closed(err: &anyhow::Error) -> bool {
    err.is::<ConnectionClosed>()
}

/// Trait for message transport.
pub trait Transport: Send {
    /// Read a single message (with Content-Length framing).
    fn read_message(&mut self) -> anyhow::Result<Value>;

    /// Write a single message (with Content-Length framing).
    fn write_message(&mut self, message: &Value) -> anyhow::Result<()>;
}

pub fn read_frame(reader: &mut impl BufRead) -> anyhow::Result<Value> {
    let mut content_length: Option<usize> = None;
    let mut header_seen = false;
    loop {
        let mut line = String::new();
        let read_n = reader.read_line(&mut line)?;
        if read_n == 0 {
            if header_seen {
                return Err(anyhow!("connection closed inside message header"));
            }
            return Err(ConnectionClosed.into());
        }
        header_seen = true;
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        if let Some(v) = line.strip_prefix("Content-Length:") {
            content_length = Some(v.trim().parse()?);
        }
    }

    let len = content_length.ok_or_else(|| anyhow!("Missing Content-Length header"))?;
    if len > MAX_FRAME_SIZE {
        return Err(anyhow!(
            "message of {len} bytes exceeds limit of {MAX_FRAME_SIZE} bytes"
        ));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    let msg: Value = serde_json::from_slice(&buf)?;
    Ok(msg)
}

pub fn write_frame(writer: &mut impl Write, message: &Value) -> anyhow::Result<()> {
    let payload = serde_json::to_vec(message)?;
    write!(writer, "Content-Length: {}\r\n\r\n", payload.len())?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// TCP-based transport, used by both server and client side.
pub struct TcpTransport {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> anyhow::Result<Self> {
        stream.set_nodelay(true)?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { stream, reader })
    }

    /// Connect to a server, retrying refused connections until `timeout` expires.
    pub fn connect(addr: SocketAddr, timeout: Duration) -> anyhow::Result<Self> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match TcpStream::connect_timeout(&addr, remaining.max(Duration::from_millis(10))) {
                Ok(stream) => return Self::new(stream),
                Err(e) if Instant::now() < deadline => {
                    log::debug!(target: "rpc", "connect to {addr}: {e}, retry");
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(anyhow!("connect to {addr}: {e}")),
            }
        }
    }

    /// Handle of underlying socket, may be used to shutdown transport from another thread.
    pub fn shutdown_handle(&self) -> io::Result<TcpStream> {
        self.stream.try_clone()
    }

    pub fn shutdown(&self) {
        _ = self.stream.shutdown(Shutdown::Both);
    }

    /// Bound blocking reads and writes, `None` means no limit.
    pub fn set_timeouts(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)?;
        self.stream.set_write_timeout(timeout)
    }

    /// Check peer without blocking, false if peer closed connection or socket is broken.
    pub fn peer_alive(&self) -> bool {
        if self.stream.set_nonblocking(true).is_err() {
            return false;
        }
        let mut buf = [0u8; 1];
        let alive = match self.stream.peek(&mut buf) {
            Ok(0) => false,
            Ok(_) => true,
            Err(e) => e.kind() == io::ErrorKind::WouldBlock,
        };
        _ = self.stream.set_nonblocking(false);
        alive
    }
}

impl Transport for TcpTransport {
    fn read_message(&mut self) -> anyhow::Result<Value> {
        read_frame(&mut self.reader)
    }

    fn write_message(&mut self, message: &Value) -> anyhow::Result<()> {
        write_frame(&mut self.stream, message)
    }
}
