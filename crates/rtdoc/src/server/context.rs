use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::clients::ClientRegistry;
use super::config::ServerConfig;
use crate::document::DocumentStore;

/// State shared by the accept loop and every worker
///
/// Built once when the server is bound and handed to each worker by
/// reference; nothing here is process-global.
pub struct ServerContext {
    store: Arc<DocumentStore>,
    clients: ClientRegistry,
    config: ServerConfig,
    shutting_down: AtomicBool,
    paused_until: Mutex<Option<Instant>>,
}

impl ServerContext {
    pub fn new(config: ServerConfig, store: Arc<DocumentStore>) -> Self {
        Self {
            store,
            clients: ClientRegistry::new(),
            config,
            shutting_down: AtomicBool::new(false),
            paused_until: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Mark the server as shutting down
    ///
    /// Returns true for the call that actually flipped the flag.
    pub fn begin_shutdown(&self) -> bool {
        !self.shutting_down.swap(true, Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Hold back command dispatch on every connection for `duration`
    ///
    /// Overlapping pauses extend to the latest deadline.
    pub fn pause(&self, duration: Duration) {
        let until = Instant::now() + duration;
        let mut paused_until = self
            .paused_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if paused_until.map_or(true, |current| current < until) {
            *paused_until = Some(until);
        }
        tracing::info!("Pausing clients for {:?}", duration);
    }

    /// Time left in the current pause, if any
    pub fn pause_remaining(&self) -> Option<Duration> {
        let paused_until = *self
            .paused_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        paused_until
            .and_then(|until| until.checked_duration_since(Instant::now()))
            .filter(|remaining| !remaining.is_zero())
    }

    /// Block until any pause has expired or the server starts shutting down
    pub fn wait_while_paused(&self) {
        while let Some(remaining) = self.pause_remaining() {
            if self.is_shutting_down() {
                return;
            }
            thread::sleep(remaining.min(self.config.poll_interval));
        }
    }
}
