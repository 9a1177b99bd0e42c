//! The connection migration state machine.
//!
//! Implements trigger handling and eligibility. The path validation lifecycle
//! lives in `probe.rs`, return-to-default scheduling in `migrate_back.rs`.
//!
//! The manager is sans-IO. Every entry point takes the current time, alarms
//! are deadlines the owner polls through [`MigrationManager::next_alarm_deadline`],
//! and asynchronous factory/validator completions come back through
//! [`MigrationManager::on_path_context_created`] and
//! [`MigrationManager::on_path_validation_result`].

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::core::{MigrationError, MigrationSession, PathContextFactory, PathValidator};

use super::alarm::{AlarmKind, AlarmSet};
use super::cause::MigrationCause;
use super::config::MigrationConfig;
use super::counters::MigrationCounters;
use super::network::{NetworkHandle, ProbeId};
use super::probe::{Attempt, ProbeKind};
use super::stats::MigrationStats;

/// Observable manager state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationPhase {
    /// On a working path, nothing in flight.
    Stable,
    /// No alternate network; waiting for one to connect.
    AwaitingNetwork,
    /// Probing an alternate network.
    ValidatingAlternate,
    /// Probing the default network to return to it.
    ValidatingReturn,
    /// Probing a new local port on the current network.
    ValidatingPort,
    /// Probing the server's preferred address.
    ValidatingPreferredAddress,
    /// Connection closed by a migration failure. Terminal.
    Closing,
}

/// Per-connection migration manager.
///
/// Owns the policy, counters, alarms and the single in-flight attempt, and
/// drives the session, path context factory and path validator.
#[derive(Debug)]
pub struct MigrationManager<S, F, V> {
    pub(super) config: MigrationConfig,
    pub(super) session: S,
    pub(super) factory: F,
    pub(super) validator: V,

    pub(super) current_network: NetworkHandle,
    pub(super) default_network: NetworkHandle,

    /// At most one outstanding creation request or validation.
    pub(super) attempt: Option<Attempt>,
    /// Latest write error reported.
    pub(super) write_error: Option<i32>,
    /// Write error not yet evaluated; consumed when `RunPendingCallbacks` fires.
    pub(super) pending_write_error: Option<i32>,
    /// Cause that put us in `AwaitingNetwork`.
    pub(super) wait_cause: Option<MigrationCause>,
    pub(super) retry_migrate_back_count: u32,
    pub(super) next_probe_id: u64,
    pub(super) preferred_address_used: bool,

    pub(super) counters: MigrationCounters,
    pub(super) alarms: AlarmSet,
    pub(super) stats: MigrationStats,
    pub(super) close_error: Option<MigrationError>,
}

impl<S, F, V> MigrationManager<S, F, V>
where
    S: MigrationSession,
    F: PathContextFactory,
    V: PathValidator,
{
    /// Create a manager for a connection established on `network`, which is
    /// also the initial default network.
    pub fn new(
        config: MigrationConfig,
        network: NetworkHandle,
        session: S,
        factory: F,
        validator: V,
    ) -> Self {
        Self {
            config,
            session,
            factory,
            validator,
            current_network: network,
            default_network: network,
            attempt: None,
            write_error: None,
            pending_write_error: None,
            wait_cause: None,
            retry_migrate_back_count: 0,
            next_probe_id: 0,
            preferred_address_used: false,
            counters: MigrationCounters::new(),
            alarms: AlarmSet::new(),
            stats: MigrationStats::default(),
            close_error: None,
        }
    }

    // =========================================================================
    // Triggers
    // =========================================================================

    /// A network went away.
    pub fn on_network_disconnected(&mut self, network: NetworkHandle, now: Instant) {
        if self.is_closed() {
            return;
        }
        if network == self.default_network {
            debug!(network = %network, "default network disconnected");
            self.default_network = NetworkHandle::INVALID;
        }
        if !self.config.migrate_on_network_change {
            debug!(network = %network, "migration on network change disabled, ignoring disconnect");
            return;
        }
        if network != self.current_network {
            debug!(network = %network, current = %self.current_network, "disconnected network is not current");
            return;
        }
        if let Some(attempt) = &self.attempt {
            if attempt.network != network {
                debug!(probe = %attempt.probe, "probe in flight, ignoring disconnect");
                return;
            }
            // The probe targets the network that just went away.
            self.cancel_attempt();
        }
        self.migrate_network_immediately(MigrationCause::Disconnected, now);
    }

    /// A network became available.
    pub fn on_network_connected(&mut self, network: NetworkHandle, now: Instant) {
        if self.is_closed() {
            return;
        }
        if !self.alarms.get(AlarmKind::WaitForNewNetwork).is_set() {
            debug!(network = %network, "not waiting for a network, ignoring connect");
            return;
        }
        if network == self.current_network || self.attempt.is_some() {
            debug!(network = %network, "connected network not usable yet");
            return;
        }

        let cause = self.wait_cause.take().unwrap_or(MigrationCause::Disconnected);
        self.alarms.get_mut(AlarmKind::WaitForNewNetwork).cancel();
        debug!(network = %network, cause = %cause, "new network connected while waiting");

        if let Err(err) = self.check_session_eligibility(cause, now) {
            self.close(err);
            return;
        }
        let peer = self.session.peer_address();
        self.start_probe(ProbeKind::Alternate, cause, network, peer, now);
    }

    /// The platform designated a new default network.
    pub fn on_network_made_default(&mut self, network: NetworkHandle, now: Instant) {
        if self.is_closed() {
            return;
        }
        if network == self.default_network {
            debug!(network = %network, "duplicate made-default signal");
            return;
        }
        info!(network = %network, previous = %self.default_network, "new default network");
        self.default_network = network;
        self.counters.reset_for_new_default();

        if !self.config.migrate_on_network_change {
            return;
        }
        self.retry_migrate_back_count = 0;
        if network == self.current_network {
            self.alarms.get_mut(AlarmKind::MigrateBack).cancel();
            return;
        }
        if let Some(attempt) = &self.attempt {
            if attempt.network == network {
                debug!(probe = %attempt.probe, network = %network, "already probing new default network");
                return;
            }
            debug!(probe = %attempt.probe, "superseding probe toward another network");
            self.cancel_attempt();
            self.resume_pending_write_error(now);
        }
        trace!(network = %network, "arming migrate-back");
        self.alarms
            .get_mut(AlarmKind::MigrateBack)
            .arm(now, Duration::ZERO);
    }

    /// The current path is deteriorating.
    pub fn on_path_degrading(&mut self, now: Instant) {
        if self.is_closed() {
            return;
        }
        if let Some(attempt) = &self.attempt {
            debug!(probe = %attempt.probe, "probe in flight, ignoring path degrading");
            return;
        }
        if !self.session.is_handshake_confirmed() {
            debug!("handshake not confirmed, ignoring path degrading");
            return;
        }

        let cause = MigrationCause::PathDegrading;
        if self.config.migrate_on_network_change {
            if !self.config.migrate_early_on_path_degrading {
                return;
            }
            let alternate = self.session.find_alternate_network(self.current_network);
            if !alternate.is_valid() {
                debug!("no alternate network for path degrading");
                return;
            }
            if alternate != self.default_network
                && !self
                    .counters
                    .path_degrading_budget_available(self.config.max_migrations_on_path_degrading)
            {
                debug!(
                    count = self.counters.path_degrading_to_non_default(),
                    "path degrading budget exhausted"
                );
                return;
            }
            if !self.may_migrate_on_degrading(cause, now) {
                return;
            }
            let peer = self.session.peer_address();
            self.start_probe(ProbeKind::Alternate, cause, alternate, peer, now);
        } else if self.config.allow_port_migration {
            if !self
                .counters
                .port_budget_available(self.config.max_port_migrations)
            {
                debug!(count = self.counters.port_migrations(), "port migration budget exhausted");
                return;
            }
            if !self.may_migrate_on_degrading(cause, now) {
                return;
            }
            let peer = self.session.peer_address();
            self.start_probe(ProbeKind::Port, cause, self.current_network, peer, now);
        }
    }

    /// A packet write failed.
    ///
    /// Evaluation is deferred to the `RunPendingCallbacks` alarm so the
    /// failing writer is never re-entered. Returns `true` if an attempt was
    /// scheduled; `false` if one is already pending (the error code is
    /// recorded, latest wins) or the peer disabled migration (the close is
    /// still deferred to the alarm).
    ///
    /// A write error during a probe with another cause is held until that
    /// probe ends: a committed path replaces the failing writer, anything
    /// else re-arms the evaluation.
    pub fn maybe_start_migrate_session_on_write_error(
        &mut self,
        error_code: i32,
        now: Instant,
    ) -> bool {
        self.stats.write_errors += 1;
        if self.is_closed() {
            return false;
        }
        self.write_error = Some(error_code);
        if self.alarms.get(AlarmKind::RunPendingCallbacks).is_set() {
            debug!(error_code, "write error coalesced into pending evaluation");
            self.pending_write_error = Some(error_code);
            return false;
        }
        if let Some(attempt) = &self.attempt {
            if attempt.cause == MigrationCause::WriteError {
                debug!(probe = %attempt.probe, error_code, "write error coalesced into pending attempt");
            } else {
                debug!(probe = %attempt.probe, error_code, "write error held until probe completes");
                self.pending_write_error = Some(error_code);
            }
            return false;
        }

        self.pending_write_error = Some(error_code);
        trace!(error_code, "deferring write error evaluation");
        self.alarms
            .get_mut(AlarmKind::RunPendingCallbacks)
            .arm(now, Duration::ZERO);
        !self.session.peer_disabled_active_migration()
    }

    /// The server advertised a preferred address. Honoured once, after the
    /// handshake is confirmed.
    pub fn on_server_preferred_address(&mut self, address: SocketAddr, now: Instant) {
        if self.is_closed() || self.preferred_address_used {
            return;
        }
        if !self.session.is_handshake_confirmed() {
            debug!(address = %address, "handshake not confirmed, ignoring preferred address");
            return;
        }
        if let Some(attempt) = &self.attempt {
            debug!(probe = %attempt.probe, "probe in flight, ignoring preferred address");
            return;
        }
        self.preferred_address_used = true;
        self.start_probe(
            ProbeKind::PreferredAddress,
            MigrationCause::ServerPreferredAddress,
            self.current_network,
            address,
            now,
        );
    }

    // =========================================================================
    // Alarms
    // =========================================================================

    /// Earliest armed alarm deadline.
    pub fn next_alarm_deadline(&self) -> Option<Instant> {
        self.alarms.next_deadline()
    }

    /// Fire every alarm due at `now`.
    pub fn on_alarm(&mut self, now: Instant) {
        for kind in AlarmKind::ALL {
            if self.is_closed() {
                break;
            }
            if !self.alarms.get_mut(kind).take_if_expired(now) {
                continue;
            }
            trace!(alarm = %kind, "alarm fired");
            match kind {
                AlarmKind::RunPendingCallbacks => self.on_write_error_alarm(now),
                AlarmKind::MigrateBack => self.on_migrate_back_alarm(now),
                AlarmKind::WaitForNewNetwork => self.on_wait_for_new_network_alarm(),
            }
        }
    }

    fn on_write_error_alarm(&mut self, now: Instant) {
        if let Some(attempt) = &self.attempt {
            debug!(probe = %attempt.probe, "probe in flight, holding write error evaluation");
            return;
        }
        let Some(error_code) = self.pending_write_error.take() else {
            return;
        };
        let cause = MigrationCause::WriteError;

        if !self.config.migrate_on_network_change {
            self.close(MigrationError::WriteErrorMigrationDisabled { error_code });
            return;
        }
        if let Err(err) = self.check_session_eligibility(cause, now) {
            self.close(err);
            return;
        }
        if self
            .counters
            .write_error_budget_exhausted(self.config.max_migrations_on_write_error)
        {
            self.close(MigrationError::TooManyWriteErrorMigrations { error_code });
            return;
        }
        self.migrate_to_alternate_or_wait(cause, now);
    }

    fn on_wait_for_new_network_alarm(&mut self) {
        let cause = self.wait_cause.take().unwrap_or(MigrationCause::Disconnected);
        self.close(MigrationError::NoNewNetwork { cause });
    }

    // =========================================================================
    // Eligibility
    // =========================================================================

    fn migrate_network_immediately(&mut self, cause: MigrationCause, now: Instant) {
        if let Err(err) = self.check_session_eligibility(cause, now) {
            self.close(err);
            return;
        }
        self.migrate_to_alternate_or_wait(cause, now);
    }

    fn migrate_to_alternate_or_wait(&mut self, cause: MigrationCause, now: Instant) {
        let alternate = self.session.find_alternate_network(self.current_network);
        if !alternate.is_valid() {
            self.wait_for_new_network(cause, now);
            return;
        }
        let peer = self.session.peer_address();
        self.start_probe(ProbeKind::Alternate, cause, alternate, peer, now);
    }

    /// Fatal checks shared by every forced migration.
    pub(super) fn check_session_eligibility(
        &self,
        cause: MigrationCause,
        now: Instant,
    ) -> Result<(), MigrationError> {
        if !self.session.has_active_migratable_streams() {
            if !self.config.migrate_idle_sessions {
                return Err(MigrationError::NoMigratableStreams { cause });
            }
            if self.idle_period_exceeded(now) {
                return Err(MigrationError::IdleTimeout { cause });
            }
        }
        if self.session.peer_disabled_active_migration() {
            return Err(MigrationError::DisabledByConfig { cause });
        }
        Ok(())
    }

    /// Path degrading is advisory: refusals are silent except idle timeout.
    fn may_migrate_on_degrading(&mut self, cause: MigrationCause, now: Instant) -> bool {
        match self.check_session_eligibility(cause, now) {
            Ok(()) => true,
            Err(err @ MigrationError::IdleTimeout { .. }) => {
                self.close(err);
                false
            }
            Err(err) => {
                debug!(reason = %err, "not migrating on path degrading");
                false
            }
        }
    }

    pub(super) fn idle_period_exceeded(&self, now: Instant) -> bool {
        !self.session.has_active_migratable_streams()
            && self.session.time_since_last_stream_close(now) >= self.config.idle_migration_period
    }

    /// Re-arm the write-error evaluation held back by a probe that ended
    /// without a committed path.
    pub(super) fn resume_pending_write_error(&mut self, now: Instant) {
        let Some(error_code) = self.pending_write_error else {
            return;
        };
        if self.is_closed() || self.attempt.is_some() {
            return;
        }
        debug!(error_code, "resuming held write error");
        self.alarms
            .get_mut(AlarmKind::RunPendingCallbacks)
            .arm(now, Duration::ZERO);
    }

    pub(super) fn wait_for_new_network(&mut self, cause: MigrationCause, now: Instant) {
        if self.alarms.get(AlarmKind::WaitForNewNetwork).is_set() {
            debug!(cause = %cause, "already waiting for a new network");
            return;
        }
        debug!(cause = %cause, timeout = ?self.config.wait_for_new_network_timeout, "no alternate network, waiting");
        self.session.on_no_new_network_for_migration();
        self.wait_cause = Some(cause);
        self.alarms
            .get_mut(AlarmKind::WaitForNewNetwork)
            .arm(now, self.config.wait_for_new_network_timeout);
    }

    pub(super) fn close(&mut self, error: MigrationError) {
        if self.close_error.is_some() {
            return;
        }
        let code = error.close_code();
        info!(code = %code, cause = %error.cause(), reason = %error, "closing connection");
        self.session
            .on_connection_to_be_closed_due_to_migration_error(error.cause(), code);
        self.session.close_connection(code, &error.to_string());
        self.alarms.cancel_all();
        self.wait_cause = None;
        self.pending_write_error = None;
        if let Some(attempt) = self.attempt.take() {
            self.abandon(attempt);
        }
        self.close_error = Some(error);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current manager state.
    pub fn phase(&self) -> MigrationPhase {
        if self.is_closed() {
            return MigrationPhase::Closing;
        }
        if let Some(attempt) = &self.attempt {
            return match attempt.kind {
                ProbeKind::Alternate => MigrationPhase::ValidatingAlternate,
                ProbeKind::Return => MigrationPhase::ValidatingReturn,
                ProbeKind::Port => MigrationPhase::ValidatingPort,
                ProbeKind::PreferredAddress => MigrationPhase::ValidatingPreferredAddress,
            };
        }
        if self.alarms.get(AlarmKind::WaitForNewNetwork).is_set() {
            return MigrationPhase::AwaitingNetwork;
        }
        MigrationPhase::Stable
    }

    /// Network of the active path.
    pub fn current_network(&self) -> NetworkHandle {
        self.current_network
    }

    /// Designated default network; [`NetworkHandle::INVALID`] while none.
    pub fn default_network(&self) -> NetworkHandle {
        self.default_network
    }

    /// The in-flight probe, if any.
    pub fn in_flight_probe(&self) -> Option<(ProbeId, ProbeKind)> {
        self.attempt
            .as_ref()
            .map(|attempt| (attempt.probe, attempt.kind))
    }

    /// Latest reported write error.
    pub fn last_write_error(&self) -> Option<i32> {
        self.write_error
    }

    /// Retry budgets.
    pub fn counters(&self) -> &MigrationCounters {
        &self.counters
    }

    /// Alarms.
    pub fn alarms(&self) -> &AlarmSet {
        &self.alarms
    }

    /// Statistics.
    pub fn stats(&self) -> &MigrationStats {
        &self.stats
    }

    /// Policy.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Check if the connection was closed by a migration failure.
    pub fn is_closed(&self) -> bool {
        self.close_error.is_some()
    }

    /// Why the connection was closed.
    pub fn close_error(&self) -> Option<&MigrationError> {
        self.close_error.as_ref()
    }

    /// The owning session.
    pub fn session(&self) -> &S {
        &self.session
    }

    /// The owning session, mutably.
    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// The path context factory.
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// The path context factory, mutably.
    pub fn factory_mut(&mut self) -> &mut F {
        &mut self.factory
    }

    /// The path validator.
    pub fn validator(&self) -> &V {
        &self.validator
    }

    /// The path validator, mutably.
    pub fn validator_mut(&mut self) -> &mut V {
        &mut self.validator
    }

    /// Consume the manager and return its collaborators.
    pub fn into_parts(self) -> (S, F, V) {
        (self.session, self.factory, self.validator)
    }
}
