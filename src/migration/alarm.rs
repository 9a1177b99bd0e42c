//! Deadline-based alarms owned by the migration manager.
//!
//! Alarms never fire on their own: the owner polls
//! [`AlarmSet::next_deadline`] and hands expired alarms back to the manager.
//! Firing one alarm never disarms another.

use std::fmt;
use std::time::{Duration, Instant};

/// The three alarms a manager owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmKind {
    /// No alternate network; close when it fires.
    WaitForNewNetwork,
    /// Deferred write-error evaluation.
    RunPendingCallbacks,
    /// Retry returning to the default network.
    MigrateBack,
}

impl AlarmKind {
    /// Firing order when several alarms expire together.
    pub const ALL: [AlarmKind; 3] = [
        AlarmKind::RunPendingCallbacks,
        AlarmKind::MigrateBack,
        AlarmKind::WaitForNewNetwork,
    ];
}

impl fmt::Display for AlarmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlarmKind::WaitForNewNetwork => "wait_for_new_network",
            AlarmKind::RunPendingCallbacks => "run_pending_callbacks",
            AlarmKind::MigrateBack => "migrate_back",
        })
    }
}

/// A single one-shot alarm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Alarm {
    deadline: Option<Instant>,
}

impl Alarm {
    /// Create a disarmed alarm.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) to fire at `deadline`.
    pub fn set(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    /// Arm to fire `delay` after `now`.
    pub fn arm(&mut self, now: Instant, delay: Duration) {
        self.set(now + delay);
    }

    /// Disarm.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Check if armed.
    pub fn is_set(&self) -> bool {
        self.deadline.is_some()
    }

    /// Current deadline, if armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarm and report whether the alarm was due at `now`.
    pub fn take_if_expired(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// The manager's alarms.
#[derive(Debug, Clone, Default)]
pub struct AlarmSet {
    wait_for_new_network: Alarm,
    run_pending_callbacks: Alarm,
    migrate_back: Alarm,
}

impl AlarmSet {
    /// Create with every alarm disarmed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow an alarm.
    pub fn get(&self, kind: AlarmKind) -> &Alarm {
        match kind {
            AlarmKind::WaitForNewNetwork => &self.wait_for_new_network,
            AlarmKind::RunPendingCallbacks => &self.run_pending_callbacks,
            AlarmKind::MigrateBack => &self.migrate_back,
        }
    }

    /// Mutably borrow an alarm.
    pub fn get_mut(&mut self, kind: AlarmKind) -> &mut Alarm {
        match kind {
            AlarmKind::WaitForNewNetwork => &mut self.wait_for_new_network,
            AlarmKind::RunPendingCallbacks => &mut self.run_pending_callbacks,
            AlarmKind::MigrateBack => &mut self.migrate_back,
        }
    }

    /// Earliest armed deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        AlarmKind::ALL
            .iter()
            .filter_map(|kind| self.get(*kind).deadline())
            .min()
    }

    /// Disarm everything.
    pub fn cancel_all(&mut self) {
        for kind in AlarmKind::ALL {
            self.get_mut(kind).cancel();
        }
    }
}
