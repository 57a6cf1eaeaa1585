//! Signal handling for graceful shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Install signal handlers for graceful shutdown.
///
/// Returns an `Arc<AtomicBool>` that is set to `true` when SIGINT or SIGTERM
/// is received. The reactor checks the flag between polls, drains, and
/// persists the disk index before exiting.
pub fn install_signal_handler() -> Arc<AtomicBool> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();

    ctrlc::set_handler(move || {
        if shutdown_flag.swap(true, Ordering::SeqCst) {
            // Second signal - force exit
            tracing::warn!("received second signal, forcing immediate exit");
            std::process::exit(1);
        }
        tracing::info!("received shutdown signal, draining...");
    })
    .expect("failed to set signal handler");

    shutdown
}
