//! Fixed-period background workers.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Runs `tick` every `period` until `cancel` fires.
///
/// The first run happens one period after start. A slow tick delays the
/// next one instead of bunching missed runs together.
pub(crate) fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;
        info!(worker = name, period_ms = period.as_millis(), "worker started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    debug!(worker = name, "tick");
                    tick().await;
                }
            }
        }
        info!(worker = name, "worker stopped");
    })
}
