//! Background sweep for generations that never finished.
//!
//! A record left in `generating` (process crash, hung inference call) is moved
//! to `error` once it is older than the configured timeout. `error` is
//! recoverable, so the next confirmed-payment signal retries it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, warn};
use uuid::Uuid;

use crate::store::PlanStore;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Room left between the generation deadline and the lapse threshold for the
/// final commit and for clock skew against the database.
const COMMIT_MARGIN: Duration = Duration::from_secs(120);

/// How long a single generation may run before the generator gives up on it.
/// Always strictly shorter than `timeout`, so the sweep only ever lapses
/// records whose generation is no longer running.
pub fn generation_deadline(timeout: chrono::Duration) -> Duration {
    let timeout = timeout.to_std().unwrap_or_default();
    timeout
        .checked_sub(COMMIT_MARGIN)
        .filter(|deadline| !deadline.is_zero())
        .unwrap_or(timeout / 2)
}

/// Lapses every record stuck in `generating` for longer than `timeout`.
pub async fn sweep_stale_generations(
    store: &dyn PlanStore,
    timeout: chrono::Duration,
) -> anyhow::Result<Vec<Uuid>> {
    let lapsed = store.lapse_stale_generations(Utc::now() - timeout).await?;
    for plan_id in &lapsed {
        warn!(plan_id = %plan_id, "Generation timed out, plan moved to error");
    }
    Ok(lapsed)
}

/// Runs the sweep once a minute for the lifetime of the process.
pub fn spawn_generation_watchdog(
    store: Arc<dyn PlanStore>,
    timeout: chrono::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            if let Err(e) = sweep_stale_generations(store.as_ref(), timeout).await {
                error!("Generation watchdog sweep failed: {e:?}");
            }
        }
    })
}
