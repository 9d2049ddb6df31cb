//! Fixed-interval background jobs with an explicit stop signal.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::signal::ShutdownToken;

/// A job run every `period` until stopped. The first run happens one period
/// after spawning.
pub struct PeriodicTask {
    name: &'static str,
    token: ShutdownToken,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn_with_token(name, period, ShutdownToken::new(), job)
    }

    /// Like [`spawn`](Self::spawn), stopping when `token` is cancelled.
    pub fn spawn_with_token<F, Fut>(name: &'static str, period: Duration, token: ShutdownToken, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let stop = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        debug!("Running {}", name);
                        job().await;
                    }
                }
            }
            debug!("{} stopped", name);
        });

        Self { name, token, handle }
    }

    /// Signal the task to stop and wait for it. A run in progress completes
    /// first.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!("{} ended abnormally: {}", self.name, e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
