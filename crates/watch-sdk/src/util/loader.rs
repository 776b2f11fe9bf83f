//! One-shot external resource loader.
//!
//! Each URL is fetched at most once. Callers arriving while a fetch is in
//! flight poll until it settles instead of fetching again.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{wait, DEFAULT_WAIT_TIMEOUT};
use crate::domain::WatchError;
use crate::ports::ResourceFetcher;

/// Target used when the caller names none.
pub const DEFAULT_TARGET: &str = "root";

/// Polling period used while another caller is loading the same URL.
pub const DEFAULT_LOADER_POLL: Duration = Duration::from_millis(17);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Loaded,
}

/// Shared load bookkeeping. A fetcher may hold a clone to release URLs it
/// no longer serves.
#[derive(Clone, Default)]
pub struct LoadSlots {
    inner: Arc<Mutex<HashMap<String, LoadState>>>,
}

impl LoadSlots {
    fn key(url: &str) -> String {
        hex::encode(url)
    }

    #[must_use]
    pub fn state(&self, url: &str) -> Option<LoadState> {
        self.inner.lock().get(&Self::key(url)).copied()
    }

    /// Drop the record for `url` so the next install fetches it again.
    pub fn forget(&self, url: &str) -> Option<LoadState> {
        let previous = self.inner.lock().remove(&Self::key(url));
        if previous.is_some() {
            debug!(url = %url, "Resource forgotten");
        }
        previous
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

/// Idempotent loader keyed by an opaque encoding of the URL.
pub struct ResourceLoader {
    fetcher: Arc<dyn ResourceFetcher>,
    slots: LoadSlots,
    wait_timeout: Duration,
}

impl ResourceLoader {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self::with_slots(fetcher, LoadSlots::default())
    }

    /// Loader recording into `slots`, typically shared with the fetcher.
    pub fn with_slots(fetcher: Arc<dyn ResourceFetcher>, slots: LoadSlots) -> Self {
        Self {
            fetcher,
            slots,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    /// Bound on how long a caller waits for someone else's fetch.
    #[must_use]
    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    #[must_use]
    pub fn state(&self, url: &str) -> Option<LoadState> {
        self.slots.state(url)
    }

    pub fn forget(&self, url: &str) -> Option<LoadState> {
        self.slots.forget(url)
    }

    #[must_use]
    pub fn slots(&self) -> &LoadSlots {
        &self.slots
    }

    /// Load `url` into `target` unless it is already loaded or loading.
    pub async fn install(
        &self,
        url: &str,
        target: Option<&str>,
        poll_interval: Option<Duration>,
    ) -> Result<(), WatchError> {
        if url.trim().is_empty() {
            warn!(url = %url, "Invalid resource url");
            return Err(WatchError::InvalidResource(url.to_string()));
        }

        let key = LoadSlots::key(url);
        let existing = {
            let mut slots = self.slots.inner.lock();
            let existing = slots.get(&key).copied();
            if existing.is_none() {
                slots.insert(key.clone(), LoadState::Loading);
            }
            existing
        };

        match existing {
            Some(LoadState::Loaded) => {
                debug!(url = %url, "Resource already loaded");
                return Ok(());
            }
            Some(LoadState::Loading) => {
                debug!(url = %url, "Resource loading elsewhere, waiting");
                let slots = self.slots.inner.clone();
                let watched = key.clone();
                wait(
                    move || slots.lock().get(&watched) != Some(&LoadState::Loading),
                    poll_interval.unwrap_or(DEFAULT_LOADER_POLL),
                    self.wait_timeout,
                )
                .await?;

                return match self.slots.inner.lock().get(&key) {
                    Some(LoadState::Loaded) => Ok(()),
                    _ => Err(WatchError::ResourceFailed(url.to_string())),
                };
            }
            None => {}
        }

        let mut guard = LoadingGuard {
            slots: &self.slots,
            key: &key,
            armed: true,
        };

        let target = target.unwrap_or(DEFAULT_TARGET);
        match self.fetcher.fetch(url, target).await {
            Ok(()) => {
                guard.armed = false;
                self.slots.inner.lock().insert(key.clone(), LoadState::Loaded);
                info!(url = %url, target = %target, "Resource loaded");
                Ok(())
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Resource failed to load");
                Err(e)
            }
        }
    }
}

/// Clears a `Loading` slot if the fetch fails or is cancelled.
struct LoadingGuard<'a> {
    slots: &'a LoadSlots,
    key: &'a str,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.slots.inner.lock().remove(self.key);
        }
    }
}
