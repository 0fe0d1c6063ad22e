//! Periodic session reaper.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::engine::AclEngine;

/// Spawn a task that runs `AclEngine::reap_tick` every `reap_interval`.
///
/// Must be called from within a tokio runtime. Abort the returned handle to
/// stop reaping. Time is read from the runtime clock, so a paused runtime
/// drives the reaper deterministically.
pub fn spawn_reaper(engine: Arc<AclEngine>) -> JoinHandle<()> {
    let period = engine.options().reap_interval;
    tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(?period, "session reaper started");
        loop {
            ticker.tick().await;
            engine.reap_tick(Instant::now().into_std());
        }
    })
}
