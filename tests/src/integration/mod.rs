//! Cross-client integration tests.

pub mod flows;
pub mod lifecycle;

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::Arc;
    use std::time::Duration;

    use watch_sdk::{wait, MemoryRelay, MemoryStore, WatchClient, WatchConfig};

    /// Fast drain interval so flows settle quickly in real time.
    pub const WATCH_TIME: Duration = Duration::from_millis(20);

    pub const POLL: Duration = Duration::from_millis(5);

    pub const DEADLINE: Duration = Duration::from_secs(3);

    pub fn config() -> WatchConfig {
        WatchConfig::new("it-app")
            .with_watch_time(WATCH_TIME)
            .with_sync_timeout(Duration::from_millis(500))
    }

    pub fn client(relay: &MemoryRelay) -> WatchClient {
        WatchClient::init(config(), &MemoryStore::new(), Arc::new(relay.clone()))
            .expect("client init")
    }

    /// Poll `condition` until it holds, panicking after the deadline.
    pub async fn eventually<P: FnMut() -> bool>(condition: P) {
        wait(condition, POLL, DEADLINE)
            .await
            .expect("condition not reached before deadline");
    }
}
