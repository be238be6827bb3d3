use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::{server, AppState};

/// Periodic scan loop. Overlapping runs are rejected by the shared
/// in-flight guard, so a slow scrape never piles up.
pub async fn run(state: AppState) {
    let period = Duration::from_secs(state.config.scan_interval_minutes.max(1) * 60);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; the boot scan already covered it.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match server::run_scan(&state).await {
            Ok(outcome) if outcome.skipped => {
                info!("scheduled scan skipped: already running");
            }
            Ok(outcome) => {
                info!(
                    "scheduled scan stored {} matches",
                    outcome.count.unwrap_or(0)
                );
            }
            Err(err) => error!("scheduled scan failed: {err:#}"),
        }
    }
}
