use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::thread::{self, JoinHandle};
use tracing::info;

use super::ShutdownHandle;
use crate::{RtdocError, RtdocResult};

/// Shut the server down on the first SIGINT or SIGTERM
///
/// The listener runs on its own thread for the life of the process.
pub fn install_shutdown_listener(handle: ShutdownHandle) -> RtdocResult<JoinHandle<()>> {
    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| RtdocError::Shutdown(format!("failed to install signal handlers: {e}")))?;

    let listener = thread::Builder::new()
        .name("rtdoc-signals".to_string())
        .spawn(move || {
            if let Some(signal) = signals.forever().next() {
                info!(signal, "shutdown signal received");
                handle.shutdown();
            }
        })?;
    Ok(listener)
}
