use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::command;
use super::context::ServerContext;
use crate::protocol::{Response, MAX_REQUEST_SIZE};

/// An accepted connection waiting for, or owned by, a worker
#[derive(Debug)]
pub struct ClientTask {
    pub id: Uuid,
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub accepted_at: Instant,
}

impl ClientTask {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream,
            peer,
            accepted_at: Instant::now(),
        }
    }
}

/// Why a session ended without a transport error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    PeerClosed,
    IdleTimeout,
    Shutdown,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::PeerClosed => f.write_str("peer closed connection"),
            SessionEnd::IdleTimeout => f.write_str("idle timeout"),
            SessionEnd::Shutdown => f.write_str("server shutting down"),
        }
    }
}

/// Serve one connection until it ends, then release it
pub fn serve(ctx: &ServerContext, task: ClientTask) {
    let ClientTask {
        id,
        stream,
        peer,
        accepted_at,
    } = task;
    debug!(
        "Client {} waited {:?} for a worker",
        peer,
        accepted_at.elapsed()
    );

    if let Err(e) = ctx.clients().register(id, &stream, peer) {
        warn!("Failed to register client {}: {}", peer, e);
        return;
    }

    match run_session(ctx, &stream) {
        Ok(reason) => info!("Client {} disconnected ({})", peer, reason),
        Err(e) => warn!("Connection error for client {}: {}", peer, e),
    }

    ctx.clients().unregister(&id);
    let _ = stream.shutdown(Shutdown::Both);
}

fn run_session(ctx: &ServerContext, stream: &TcpStream) -> io::Result<SessionEnd> {
    let config = ctx.config();
    stream.set_read_timeout(Some(config.poll_interval))?;

    let mut reader = LineReader::new(stream);
    let mut writer = stream;
    let mut last_activity = Instant::now();

    loop {
        let response = match reader.next_line()? {
            Incoming::Line(line) => {
                last_activity = Instant::now();
                ctx.wait_while_paused();
                command::dispatch(ctx, &line)
            }
            Incoming::TooLarge => {
                last_activity = Instant::now();
                debug!("Discarding request over {} bytes", MAX_REQUEST_SIZE);
                Some(Response::TooLarge)
            }
            Incoming::Idle => {
                if ctx.is_shutting_down() {
                    return Ok(SessionEnd::Shutdown);
                }
                if config
                    .idle_timeout
                    .is_some_and(|timeout| last_activity.elapsed() >= timeout)
                {
                    return Ok(SessionEnd::IdleTimeout);
                }
                continue;
            }
            Incoming::Closed if ctx.is_shutting_down() => return Ok(SessionEnd::Shutdown),
            Incoming::Closed => return Ok(SessionEnd::PeerClosed),
        };

        if let Some(response) = response {
            writer.write_all(response.to_line().as_bytes())?;
        }
        if ctx.is_shutting_down() {
            return Ok(SessionEnd::Shutdown);
        }
    }
}

/// Result of one attempt to read a request line
#[derive(Debug, PartialEq, Eq)]
enum Incoming {
    /// A complete line without its terminator
    Line(String),
    /// A line over the size limit; the rest of it is skipped
    TooLarge,
    /// The read timed out before a full line arrived
    Idle,
    Closed,
}

/// Reads newline-terminated lines of bounded length
///
/// Partial lines survive read timeouts, so a slow sender is not cut off.
struct LineReader<R> {
    reader: BufReader<R>,
    line: Vec<u8>,
    discarding: bool,
}

impl<R: Read> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            line: Vec::new(),
            discarding: false,
        }
    }

    fn next_line(&mut self) -> io::Result<Incoming> {
        loop {
            let available = match self.reader.fill_buf() {
                Ok(available) => available,
                Err(e) if is_timeout(&e) => return Ok(Incoming::Idle),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Ok(Incoming::Closed);
            }

            let newline = available.iter().position(|&byte| byte == b'\n');
            let chunk_len = newline.unwrap_or(available.len());
            let consumed = newline.map_or(chunk_len, |at| at + 1);

            if self.discarding {
                self.reader.consume(consumed);
                if newline.is_some() {
                    self.discarding = false;
                }
                continue;
            }

            if self.line.len() + chunk_len > MAX_REQUEST_SIZE {
                self.line.clear();
                self.discarding = newline.is_none();
                self.reader.consume(consumed);
                return Ok(Incoming::TooLarge);
            }

            self.line.extend_from_slice(&available[..chunk_len]);
            self.reader.consume(consumed);

            if newline.is_some() {
                if self.line.last() == Some(&b'\r') {
                    self.line.pop();
                }
                let line = String::from_utf8_lossy(&self.line).into_owned();
                self.line.clear();
                return Ok(Incoming::Line(line));
            }
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
