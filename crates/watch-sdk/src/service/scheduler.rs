//! # Watch Scheduler
//!
//! Buffers the latest value per index and periodically drains the fresh ones
//! through `@watch:sync`.
//!
//! ## Drain step
//!
//! 1. Stopped → clear the loop flag, fire `@watch:break`, end the loop.
//! 2. Paused → no traffic; the loop sleeps one interval.
//! 3. Active → fire one sync request per entry updated within the last
//!    interval, then await all acknowledgements together. Each request is
//!    bounded by the sync timeout; failures leave the entry's status as it was
//!    and never abort the cycle.
//!
//! The loop is a single task (`sleep` between steps), so its cadence is
//! interval + drain time. `stop` is observed at the next step.

use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::task::Poll;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};
use watch_bus::{token, EventBus};
use watch_telemetry::{
    time_histogram, BUFFERED_ENTRIES, DRAIN_CYCLES, SYNC_DURATION, SYNC_REQUESTS, WATCH_UPDATES,
};

use crate::config::WatchConfig;
use crate::domain::channels::{
    HEARTBEAT_INDEX, WATCH_BREAK, WATCH_NEXT, WATCH_PAUSE, WATCH_RESUME, WATCH_START, WATCH_STOP,
    WATCH_SYNC, WATCH_UPDATE,
};
use crate::domain::{
    DrainOutcome, SchedulerPhase, SchedulerState, SyncRequest, WatchEntry, WatchError, WatchEvent,
};

/// Listener id used for every scheduler registration.
pub const SCHEDULER_LISTENER: &str = "watch-scheduler";

/// Length of the heartbeat token emitted on resume.
const HEARTBEAT_LENGTH: usize = 8;

struct Core {
    state: SchedulerState,
    entries: BTreeMap<String, WatchEntry>,
    /// A drain loop task is alive.
    looping: bool,
}

struct Shared {
    bus: Arc<EventBus<WatchEvent>>,
    interval: Duration,
    sync_timeout: Duration,
    evict_after: Option<Duration>,
    core: Mutex<Core>,
}

/// Push pipeline state machine. Cheap to clone.
#[derive(Clone)]
pub struct WatchScheduler {
    shared: Arc<Shared>,
}

impl WatchScheduler {
    pub fn new(bus: Arc<EventBus<WatchEvent>>, config: &WatchConfig) -> Self {
        let evict_after = config
            .evict_after_cycles
            .map(|cycles| config.watch_time.saturating_mul(cycles));

        Self {
            shared: Arc::new(Shared {
                bus,
                interval: config.watch_time,
                sync_timeout: config.sync_timeout,
                evict_after,
                core: Mutex::new(Core {
                    state: SchedulerState::default(),
                    entries: BTreeMap::new(),
                    looping: false,
                }),
            }),
        }
    }

    /// Bind the scheduler to its bus channels.
    ///
    /// Listeners hold a weak reference, so the bus never keeps a dropped
    /// scheduler alive.
    pub fn install(&self) {
        self.on(WATCH_START, |s, _| s.start());
        self.on(WATCH_STOP, |s, _| s.stop());
        self.on(WATCH_PAUSE, |s, _| s.pause());
        self.on(WATCH_RESUME, |s, _| s.resume());
        self.on(WATCH_NEXT, |s, _| s.kick());
        self.on(WATCH_UPDATE, |s, event| {
            if let WatchEvent::Update { index, data } = event {
                s.update(index, data.clone());
            }
        });
    }

    fn on<F>(&self, channel: &str, handler: F)
    where
        F: Fn(&WatchScheduler, &WatchEvent) + Send + Sync + 'static,
    {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        self.shared
            .bus
            .subscribe_with_id(channel, SCHEDULER_LISTENER, move |event: &WatchEvent| {
                if let Some(shared) = weak.upgrade() {
                    handler(&WatchScheduler { shared }, event);
                }
            });
    }

    /// Enter the running state and kick the drain loop.
    pub fn start(&self) {
        self.shared.core.lock().state.started = true;
        info!("Watch scheduler started");
        self.shared.bus.fire(WATCH_NEXT, &WatchEvent::Signal);
    }

    /// Leave the running state. The loop exits at its next step.
    pub fn stop(&self) {
        self.shared.core.lock().state.started = false;
        info!("Watch scheduler stopping");
    }

    pub fn pause(&self) {
        self.shared.core.lock().state.paused = true;
        info!("Watch scheduler paused");
    }

    /// Lift the pause gate and emit a heartbeat under the reserved index.
    ///
    /// Also restarts the drain loop if it is not alive, e.g. when `start`
    /// ran outside an async runtime.
    pub fn resume(&self) {
        self.shared.core.lock().state.paused = false;
        info!("Watch scheduler resumed");
        self.shared.bus.fire(
            WATCH_UPDATE,
            &WatchEvent::update(HEARTBEAT_INDEX, token(HEARTBEAT_LENGTH, 32)),
        );
        self.kick();
    }

    /// Stop the scheduler and wait until the drain loop has exited.
    ///
    /// Fails with [`WatchError::Bus`] if the bus is disposed before the
    /// loop's `@watch:break` can be observed.
    pub async fn halt(&self) -> Result<(), WatchError> {
        if !self.is_looping() {
            self.stop();
            return Ok(());
        }

        let broke = self.shared.bus.until(WATCH_BREAK);
        tokio::pin!(broke);
        // First poll registers the one-shot listener before the stop lands.
        let registered = futures::poll!(broke.as_mut());
        self.stop();

        match registered {
            Poll::Ready(result) => {
                result?;
            }
            Poll::Pending => {
                if self.is_looping() {
                    broke.await?;
                }
            }
        }
        debug!("Watch scheduler halted");
        Ok(())
    }

    /// Buffer `data` for `index`. Returns false when dropped (not active).
    pub fn update(&self, index: &str, data: Value) -> bool {
        let now = Instant::now();
        let mut core = self.shared.core.lock();

        if !core.state.accepts_updates() {
            drop(core);
            WATCH_UPDATES.with_label_values(&["dropped"]).inc();
            debug!(index = %index, "Watch update dropped (scheduler not active)");
            return false;
        }

        match core.entries.get_mut(index) {
            Some(entry) => entry.touch(data, now),
            None => {
                core.entries
                    .insert(index.to_string(), WatchEntry::new(index, data, now));
            }
        }
        BUFFERED_ENTRIES.set(core.entries.len() as f64);
        drop(core);

        WATCH_UPDATES.with_label_values(&["accepted"]).inc();
        trace!(index = %index, "Watch update buffered");
        true
    }

    /// Spawn the drain loop unless one is alive or the scheduler is stopped.
    fn kick(&self) {
        let handle = {
            let mut core = self.shared.core.lock();
            if core.looping || !core.state.started {
                return;
            }
            let Ok(handle) = Handle::try_current() else {
                drop(core);
                warn!("No async runtime, drain loop not started");
                return;
            };
            core.looping = true;
            handle
        };

        let scheduler = self.clone();
        handle.spawn(async move { scheduler.run().await });
    }

    async fn run(self) {
        debug!(interval = ?self.shared.interval, "Drain loop started");
        loop {
            if self.drain_once().await == DrainOutcome::Stopped {
                break;
            }
            time::sleep(self.shared.interval).await;
        }
        debug!("Drain loop exited");
    }

    /// Execute one drain step.
    pub async fn drain_once(&self) -> DrainOutcome {
        let now = Instant::now();
        let interval = self.shared.interval;

        let fresh: Vec<(String, Value)> = {
            let mut core = self.shared.core.lock();
            if !core.state.started {
                core.looping = false;
                drop(core);
                info!("Watch scheduler stopped");
                self.shared.bus.fire(WATCH_BREAK, &WatchEvent::Signal);
                return self.record(DrainOutcome::Stopped);
            }
            if core.state.paused {
                drop(core);
                debug!("Watch scheduler on pause");
                return self.record(DrainOutcome::Paused);
            }
            core.entries
                .values()
                .filter(|entry| entry.is_fresh(now, interval))
                .map(|entry| (entry.index.clone(), entry.data.clone()))
                .collect()
        };

        // Fan out: every request is issued before any is awaited.
        let mut pending = Vec::with_capacity(fresh.len());
        for (index, data) in fresh {
            let (request, ack) = SyncRequest::new(index.clone(), data);
            if self.shared.bus.fire(WATCH_SYNC, &WatchEvent::Sync(request)) == 0 {
                trace!(index = %index, "No sync listener");
            }
            pending.push((index, ack));
        }

        let issued = pending.len();
        let timer = (issued > 0).then(|| time_histogram!(SYNC_DURATION));
        let sync_timeout = self.shared.sync_timeout;

        let results = join_all(pending.into_iter().map(|(index, ack)| async move {
            let result = match time::timeout(sync_timeout, ack).await {
                Ok(Ok(status)) => Ok(status),
                Ok(Err(_)) => Err("request dropped without acknowledgement".to_string()),
                Err(_) => Err(format!("no acknowledgement within {sync_timeout:?}")),
            };
            (index, result)
        }))
        .await;
        drop(timer);

        let mut acknowledged = 0;
        let mut failures = Vec::new();
        {
            let mut core = self.shared.core.lock();
            for (index, result) in results {
                match result {
                    Ok(status) => {
                        acknowledged += 1;
                        if let Some(entry) = core.entries.get_mut(&index) {
                            entry.status = Some(status);
                        }
                    }
                    Err(reason) => failures.push(WatchError::SyncFailed { index, reason }),
                }
            }

            if let Some(limit) = self.shared.evict_after {
                let now = Instant::now();
                let before = core.entries.len();
                core.entries.retain(|_, entry| entry.idle_for(now) <= limit);
                let evicted = before - core.entries.len();
                if evicted > 0 {
                    debug!(evicted, "Idle watch entries evicted");
                }
            }
            BUFFERED_ENTRIES.set(core.entries.len() as f64);
        }

        for failure in &failures {
            warn!(error = %failure, "Sync request failed");
        }

        let failed = failures.len();
        SYNC_REQUESTS
            .with_label_values(&["acknowledged"])
            .inc_by(acknowledged as f64);
        SYNC_REQUESTS
            .with_label_values(&["failed"])
            .inc_by(failed as f64);

        self.record(DrainOutcome::Synced {
            issued,
            acknowledged,
            failed,
        })
    }

    fn record(&self, outcome: DrainOutcome) -> DrainOutcome {
        DRAIN_CYCLES.with_label_values(&[outcome.label()]).inc();
        outcome
    }

    #[must_use]
    pub fn phase(&self) -> SchedulerPhase {
        self.shared.core.lock().state.phase()
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.shared.core.lock().state
    }

    /// Snapshot of the buffered entry for `index`.
    #[must_use]
    pub fn entry(&self, index: &str) -> Option<WatchEntry> {
        self.shared.core.lock().entries.get(index).cloned()
    }

    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.shared.core.lock().entries.len()
    }

    /// Whether a drain loop task is alive.
    #[must_use]
    pub fn is_looping(&self) -> bool {
        self.shared.core.lock().looping
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.shared.interval
    }
}
