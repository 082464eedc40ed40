//! Process-wide runtime state.
//!
//! - `SHUTDOWN`: Has shutdown been requested? (Ctrl+C or SIGTERM received)

use std::sync::atomic::{AtomicBool, Ordering};

/// Shutdown has been requested (Ctrl+C or SIGTERM received)
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Setup the global Ctrl+C / SIGTERM handler. Call once at program start.
///
/// The handler only raises the shutdown flag. An in-flight poll cycle always
/// runs to completion; the ticker notices the flag before the next cycle.
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        if !SHUTDOWN.swap(true, Ordering::SeqCst) {
            crate::log!("warden"; "shutdown requested, finishing current cycle...");
        }
    })
    .map_err(|e| anyhow::anyhow!("failed to set shutdown handler: {}", e))
}

/// The flag raised by the shutdown handler, for waits that poll it.
pub fn shutdown_flag() -> &'static AtomicBool {
    &SHUTDOWN
}
