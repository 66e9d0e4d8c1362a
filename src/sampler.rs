//! Engine tick: collect → derive → publish → record, on one fixed-cadence
//! timer shared by every session. Ticks are strictly sequential; a slow
//! collection delays the next tick instead of racing it, and a failed or
//! timed-out collection skips the tick entirely.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::metrics::collect_snapshot;
use crate::rates::derive;
use crate::state::AppState;
use crate::types::RawCounterSnapshot;

pub fn spawn_engine(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(state.config.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Single-writer state: only this task touches the previous
        // snapshot, and history writes finish before the next tick starts.
        let mut previous: Option<RawCounterSnapshot> = None;

        loop {
            ticker.tick().await;

            let snapshot = match timeout(state.config.sample_timeout, collect_snapshot(&state)).await
            {
                Ok(Ok(s)) => s,
                Ok(Err(e)) => {
                    warn!("tick skipped: {e}");
                    continue;
                }
                Err(_) => {
                    warn!(
                        "tick skipped: {}",
                        ProviderError::Timeout(state.config.sample_timeout)
                    );
                    continue;
                }
            };

            let sample = Arc::new(derive(previous.as_ref(), &snapshot));
            previous = Some(snapshot);

            debug!(
                cpu = sample.cpu.load,
                mem = sample.memory.used_percent,
                "sample published"
            );
            // Receivers may all be gone (no viewers); that is fine.
            let _ = state.sample_tx.send(Some(sample.clone()));

            let mut history = state.history.lock().await;
            history.record(&sample);
        }
    })
}
