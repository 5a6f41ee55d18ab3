use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Case-wide deadline.
///
/// Arming spawns a timer task that cancels a token once the deadline passes.
/// Anything awaiting [`Watchdog::expired`] is woken at that point; disarming
/// stops the timer so the token is never cancelled.
pub struct Watchdog {
    token: CancellationToken,
    timer: JoinHandle<()>,
}

impl Watchdog {
    /// Arms a watchdog that fires `after` from now.
    pub fn arm(after: Duration) -> Self {
        let deadline = Instant::now() + after;
        let token = CancellationToken::new();
        let fire = token.clone();
        let timer = tokio::spawn(async move {
            sleep_until(deadline).await;
            warn!("watchdog expired after {:?}", after);
            fire.cancel();
        });
        debug!("watchdog armed for {:?}", after);
        Self { token, timer }
    }

    /// Resolves once the deadline has passed.
    pub async fn expired(&self) {
        self.token.cancelled().await
    }

    /// Stops the timer. Returns whether the deadline had already fired.
    pub fn disarm(self) -> bool {
        self.timer.abort();
        let fired = self.token.is_cancelled();
        debug!("watchdog disarmed (fired: {})", fired);
        fired
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.timer.abort();
    }
}
