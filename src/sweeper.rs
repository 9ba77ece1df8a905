use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use crate::state::SharedState;

/// Spawn the periodic entitlement sweep. A zero interval disables it.
pub fn spawn(
    state: SharedState,
    shutdown: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    let interval = state.config.sweep_interval;
    if interval.is_zero() {
        tracing::info!("Entitlement sweeper disabled");
        return None;
    }
    Some(tokio::spawn(run(state, interval, shutdown)))
}

/// Sweep every `interval` until shutdown is signaled.
pub async fn run(state: SharedState, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    tracing::info!("Entitlement sweeper started (every {}s)", interval.as_secs());

    loop {
        if *shutdown.borrow() {
            break;
        }

        match state.entitlements.sweep_expired(Utc::now()).await {
            Ok(0) => {}
            Ok(swept) => tracing::debug!("Entitlement sweep covered {swept} tenant(s)"),
            Err(e) => tracing::error!("Entitlement sweep error: {e}"),
        }

        // Stale limiter windows
        state.action_limiter.cleanup();
        state.login_limiter.cleanup(Duration::from_secs(15 * 60));

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {}
        }
    }

    tracing::info!("Entitlement sweeper stopped");
}
