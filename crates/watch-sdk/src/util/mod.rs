//! Utilities: tokens, polling waits and the one-shot resource loader.

pub mod loader;

use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::domain::WatchError;

pub use loader::{LoadSlots, LoadState, ResourceLoader};
pub use watch_bus::token::{generate_id, token};

/// Default predicate polling period for [`wait`].
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default deadline for [`wait`].
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Poll `predicate` every `poll_interval` until it holds or `timeout` expires.
///
/// The first check happens one interval after the call. Returns the elapsed
/// time on success and [`WatchError::Timeout`] otherwise; whichever side
/// loses the race is dropped with its timer.
pub async fn wait<P>(
    mut predicate: P,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<Duration, WatchError>
where
    P: FnMut() -> bool,
{
    let start = Instant::now();
    let poll_interval = poll_interval.max(Duration::from_millis(1));

    let poll = async {
        let mut ticker = time::interval_at(start + poll_interval, poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if predicate() {
                return start.elapsed();
            }
        }
    };

    time::timeout(timeout, poll)
        .await
        .map_err(|_| WatchError::Timeout {
            elapsed: start.elapsed(),
        })
}
