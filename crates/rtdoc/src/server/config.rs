use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use crate::document::{AbortOnExhaustion, MemoryBudget, RejectOnExhaustion};
use crate::{RtdocError, RtdocResult};

/// Port the server listens on when none is given
pub const DEFAULT_PORT: u16 = 7890;

/// Policy applied when the memory limit is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OomPolicy {
    #[default]
    Abort,
    Reject,
}

/// Configuration for the document server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host or address to bind
    pub host: String,
    /// Port to bind; 0 picks an ephemeral port
    pub port: u16,
    /// Number of worker threads, which caps the number of clients served at once
    pub max_clients: usize,
    /// File to append logs to; stdout when unset
    pub log_file: Option<PathBuf>,
    /// Debug verbosity
    pub debug: bool,
    /// Close connections that stay idle longer than this
    pub idle_timeout: Option<Duration>,
    /// How often a blocked read wakes up to check for shutdown and deadlines
    pub poll_interval: Duration,
    /// Byte ceiling for stored documents
    pub memory_limit: Option<usize>,
    pub oom_policy: OomPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_clients: 8,
            log_file: None,
            debug: false,
            idle_timeout: None,
            poll_interval: Duration::from_millis(200),
            memory_limit: None,
            oom_policy: OomPolicy::Abort,
        }
    }
}

impl ServerConfig {
    /// Check the values that would otherwise fail later at runtime
    pub fn validate(&self) -> RtdocResult<()> {
        if self.max_clients == 0 {
            return Err(RtdocError::Config(
                "max clients must be at least 1".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(RtdocError::Config(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        if self.idle_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(RtdocError::Config(
                "idle timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the configured host and port to a socket address
    pub fn socket_addr(&self) -> RtdocResult<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| RtdocError::Config(format!("cannot resolve host '{}'", self.host)))
    }

    /// Build the memory budget described by this configuration
    pub fn memory_budget(&self) -> MemoryBudget {
        match (self.memory_limit, self.oom_policy) {
            (None, _) => MemoryBudget::unlimited(),
            (Some(limit), OomPolicy::Abort) => MemoryBudget::with_limit(limit, AbortOnExhaustion),
            (Some(limit), OomPolicy::Reject) => MemoryBudget::with_limit(limit, RejectOnExhaustion),
        }
    }
}
