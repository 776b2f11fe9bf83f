//! Scheduler state machine.
//!
//! ```text
//!            start                  pause
//! [STOPPED] ───────→ [ACTIVE] ─────────────→ [PAUSED]
//!     ↑                  │   ←─────────────      │
//!     │                  │       resume          │
//!     └──────── stop ────┴───────────────────────┘
//! ```
//!
//! `started` and `paused` are independent: a stopped scheduler remembers
//! whether it is paused, so a later `start` lands in the right phase.

/// Observable phase derived from the two flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Stopped,
    Active,
    Paused,
}

/// Lifecycle and liveness flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerState {
    /// Lifecycle switch (start/stop).
    pub started: bool,
    /// Liveness gate (online/offline, pause/resume).
    pub paused: bool,
}

impl Default for SchedulerState {
    /// Stopped and paused: nothing flows until started and online.
    fn default() -> Self {
        Self {
            started: false,
            paused: true,
        }
    }
}

impl SchedulerState {
    #[must_use]
    pub fn phase(&self) -> SchedulerPhase {
        match (self.started, self.paused) {
            (false, _) => SchedulerPhase::Stopped,
            (true, true) => SchedulerPhase::Paused,
            (true, false) => SchedulerPhase::Active,
        }
    }

    /// Updates are buffered only while running and not paused.
    #[must_use]
    pub fn accepts_updates(&self) -> bool {
        self.phase() == SchedulerPhase::Active
    }
}

/// Result of one drain step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Stopped state observed; the loop ends.
    Stopped,
    /// Paused; no sync traffic this cycle.
    Paused,
    /// Fresh entries were synced.
    Synced {
        issued: usize,
        acknowledged: usize,
        failed: usize,
    },
}

impl DrainOutcome {
    /// Metric label.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Paused => "paused",
            Self::Synced { .. } => "synced",
        }
    }
}
