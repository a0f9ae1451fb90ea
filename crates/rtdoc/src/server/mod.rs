//! TCP frontend: accept loop, worker pool and shutdown
//!
//! One thread accepts connections and pushes them onto a [`WorkQueue`]; a
//! fixed [`ThreadPool`] claims them and runs each session to completion.

pub mod clients;
pub mod command;
pub mod config;
pub mod connection;
pub mod context;
pub mod pool;
pub mod queue;
#[cfg(unix)]
pub mod signal;

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::document::DocumentStore;
use crate::RtdocResult;

pub use clients::ClientRegistry;
pub use config::{OomPolicy, ServerConfig, DEFAULT_PORT};
pub use connection::ClientTask;
pub use context::ServerContext;
pub use pool::ThreadPool;
pub use queue::WorkQueue;

/// How long the shutdown handle waits when poking the accept loop awake
const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// A bound document server, ready to run
pub struct Server {
    listener: TcpListener,
    context: Arc<ServerContext>,
    queue: Arc<WorkQueue<ClientTask>>,
}

impl Server {
    /// Validate the configuration and bind the listening socket
    pub fn bind(config: ServerConfig, store: Arc<DocumentStore>) -> RtdocResult<Self> {
        config.validate()?;
        let listener = TcpListener::bind(config.socket_addr()?)?;
        info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            context: Arc::new(ServerContext::new(config, store)),
            queue: Arc::new(WorkQueue::new()),
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> RtdocResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Get a handle that stops the server from another thread
    pub fn shutdown_handle(&self) -> RtdocResult<ShutdownHandle> {
        Ok(ShutdownHandle {
            context: self.context.clone(),
            queue: self.queue.clone(),
            wake_addr: wake_addr(self.local_addr()?),
        })
    }

    /// Serve connections until shut down
    ///
    /// Returns after every worker has finished its current session.
    pub fn run(self) -> RtdocResult<()> {
        let Server {
            listener,
            context,
            queue,
        } = self;
        let config = context.config();

        if config.debug {
            spawn_change_audit(context.store())?;
        }

        let pool = {
            let context = context.clone();
            ThreadPool::spawn(config.max_clients, queue.clone(), move |worker, task| {
                debug!("Worker {} claimed client {}", worker, task.peer);
                connection::serve(&context, task);
            })?
        };
        info!("Started {} workers", pool.size());

        for incoming in listener.incoming() {
            if context.is_shutting_down() {
                break;
            }
            match incoming {
                Ok(stream) => {
                    let peer = match stream.peer_addr() {
                        Ok(peer) => peer,
                        Err(e) => {
                            warn!("Dropping connection without peer address: {}", e);
                            continue;
                        }
                    };
                    debug!("Accepted connection from {}", peer);
                    if queue.push(ClientTask::new(stream, peer)).is_err() {
                        break;
                    }
                }
                Err(e) => error!("Failed to accept connection: {}", e),
            }
        }

        drop(listener);
        let pending = queue.close();
        if !pending.is_empty() {
            info!("Dropping {} connections still waiting for a worker", pending.len());
        }
        context.clients().shutdown_all();
        pool.join();

        info!("Server stopped");
        Ok(())
    }
}

/// Stops a running [`Server`]
#[derive(Clone)]
pub struct ShutdownHandle {
    context: Arc<ServerContext>,
    queue: Arc<WorkQueue<ClientTask>>,
    wake_addr: SocketAddr,
}

impl ShutdownHandle {
    /// Begin shutdown; safe to call more than once
    ///
    /// Workers finish the command they are executing, close their socket and
    /// exit. Connections not yet claimed by a worker are dropped.
    pub fn shutdown(&self) {
        if !self.context.begin_shutdown() {
            return;
        }
        info!("Shutting down");
        self.queue.close();
        self.context.clients().shutdown_all();

        // Unblock the accept loop with a throwaway connection
        if let Err(e) = TcpStream::connect_timeout(&self.wake_addr, WAKE_TIMEOUT) {
            debug!("Wake-up connection to {} failed: {}", self.wake_addr, e);
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.context.is_shutting_down()
    }
}

/// Address to connect to in order to reach a listener bound to `local`
fn wake_addr(local: SocketAddr) -> SocketAddr {
    match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), local.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), local.port())
        }
        _ => local,
    }
}

/// Log every store change as a JSON line until the store is dropped
fn spawn_change_audit(store: &DocumentStore) -> RtdocResult<()> {
    let mut changes = store.subscribe_to_changes();
    thread::Builder::new()
        .name("rtdoc-audit".to_string())
        .spawn(move || loop {
            match changes.blocking_recv() {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => debug!(target: "rtdoc::audit", "{}", line),
                    Err(e) => warn!("Failed to encode change event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Change audit skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        })?;
    Ok(())
}
