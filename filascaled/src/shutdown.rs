//! Shutdown handling for graceful daemon termination
//!
//! Stops the poll task between ticks so the device is never left with a
//! half-written request, then reports what the session saw.

use tracing::info;

use crate::supervisor::SupervisorHandle;

/// Stop polling and close the serial session.
///
/// Waits for an in-flight tick to finish; a tick is bounded by the read
/// timeout times the retry ceiling plus the reset delays.
pub async fn stop_monitoring(handle: SupervisorHandle) {
    info!("Stopping FilaScale monitor...");
    let state = handle.state();
    handle.stop().await;

    let state = state.read().await;
    info!(
        "Monitor stopped: {} status updates, {} failed polls",
        state.polls, state.failures
    );
    if let Some(latest) = &state.latest {
        info!(
            "Last status: spool {} at {:.0} g, {:.1} %RH",
            latest.spool_id, latest.weight, latest.humidity
        );
    }
}
