//! Background auto-resolver.
//!
//! Wagers never expire on their own; callers resolve them on demand. When
//! enabled, this task periodically sweeps ACTIVE wagers whose window has
//! closed and resolves them through the normal `resolve_wager` path.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::game::{GameEngine, Resolution};
use crate::types::GameError;

/// Outcome of one sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub resolved: Vec<Resolution>,
    pub failed: usize,
}

/// Resolve every wager due at the current time.
///
/// Wagers resolved concurrently by a caller in the meantime are skipped.
pub async fn sweep_due(engine: &GameEngine) -> Result<SweepReport, GameError> {
    let due = engine
        .store()
        .due_wagers(Utc::now())
        .await
        .map_err(GameError::storage)?;

    let mut report = SweepReport::default();
    for wager in due {
        match engine.resolve_wager(&wager.id).await {
            Ok(res) => report.resolved.push(res),
            Err(GameError::InvalidState { .. }) => {
                debug!(wager_id = %wager.id, "Already resolved by a caller");
            }
            Err(e) => {
                warn!(wager_id = %wager.id, error = %e, "Auto-resolve failed");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

/// Spawn the sweep loop. It exits when `shutdown` flips to `true`.
pub fn spawn_auto_resolver(
    engine: Arc<GameEngine>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs_f64(), "Auto-resolver started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match sweep_due(&engine).await {
                        Ok(report) if !report.resolved.is_empty() || report.failed > 0 => {
                            info!(
                                resolved = report.resolved.len(),
                                failed = report.failed,
                                "Auto-resolve sweep"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Auto-resolve sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Auto-resolver stopped");
    })
}
