//! Returning to the default network.
//!
//! After a forced migration away from the default network the manager keeps
//! probing back toward it. Each retry re-resolves the default network's
//! context through the factory and claims a fresh peer connection ID. Failed
//! returns back off exponentially from the failed attempt's start time:
//! 1s, 2s, 4s and so on. A backoff longer than the non-default budget drains
//! the session instead.

use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::core::constants::MIGRATE_BACK_INITIAL_DELAY;
use crate::core::{MigrationError, MigrationSession, PathContextFactory, PathValidator};

use super::alarm::AlarmKind;
use super::cause::MigrationCause;
use super::manager::MigrationManager;
use super::probe::ProbeKind;

/// Delay before retry number `retry` (zero based).
pub(super) fn migrate_back_delay(retry: u32) -> Duration {
    MIGRATE_BACK_INITIAL_DELAY.saturating_mul(2u32.saturating_pow(retry))
}

impl<S, F, V> MigrationManager<S, F, V>
where
    S: MigrationSession,
    F: PathContextFactory,
    V: PathValidator,
{
    pub(super) fn on_migrate_back_alarm(&mut self, now: Instant) {
        if !self.default_network.is_valid() {
            // Rescheduled by the next made-default signal.
            debug!("default network gone, not migrating back");
            return;
        }
        if self.current_network == self.default_network {
            self.retry_migrate_back_count = 0;
            return;
        }
        if let Some(attempt) = &self.attempt {
            if attempt.kind == ProbeKind::Return {
                return;
            }
            debug!(probe = %attempt.probe, "probe in flight, deferring migrate-back");
            self.alarms
                .get_mut(AlarmKind::MigrateBack)
                .arm(now, MIGRATE_BACK_INITIAL_DELAY);
            return;
        }
        if self.session.has_pending_path_validation() {
            debug!("session validating a path, deferring migrate-back");
            self.alarms
                .get_mut(AlarmKind::MigrateBack)
                .arm(now, MIGRATE_BACK_INITIAL_DELAY);
            return;
        }
        if self.idle_period_exceeded(now) {
            self.close(MigrationError::IdleTimeout {
                cause: MigrationCause::MadeDefault,
            });
            return;
        }

        debug!(
            network = %self.default_network,
            retry = self.retry_migrate_back_count,
            "migrating back to default network"
        );
        let peer = self.session.peer_address();
        self.start_probe(
            ProbeKind::Return,
            MigrationCause::MadeDefault,
            self.default_network,
            peer,
            now,
        );
    }

    /// Schedule the next return attempt after a failed one.
    ///
    /// Idle timeout is checked first; otherwise a delay beyond the
    /// non-default budget drains the session.
    pub(super) fn schedule_migrate_back_retry(&mut self, started_at: Instant, now: Instant) {
        if self.idle_period_exceeded(now) {
            self.close(MigrationError::IdleTimeout {
                cause: MigrationCause::MadeDefault,
            });
            return;
        }

        let delay = migrate_back_delay(self.retry_migrate_back_count);
        self.retry_migrate_back_count = self.retry_migrate_back_count.saturating_add(1);
        if delay > self.config.max_time_on_non_default_network {
            info!(
                network = %self.current_network,
                default = %self.default_network,
                "too long on non-default network, draining session"
            );
            self.session.start_draining();
            return;
        }

        trace!(delay = ?delay, retry = self.retry_migrate_back_count, "rescheduling migrate-back");
        self.alarms
            .get_mut(AlarmKind::MigrateBack)
            .set(started_at + delay);
    }
}
