//! Path validation lifecycle shared by every probe kind.
//!
//! 1. Ask the factory for a context (same-stack or deferred).
//! 2. Claim an unused peer connection ID, notify the session, start validation.
//! 3. Commit on success, or clean up and maybe reschedule on failure.

use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use crate::core::constants::MIGRATE_BACK_INITIAL_DELAY;
use crate::core::{
    MigrationError, MigrationSession, PathContextError, PathContextFactory, PathValidator,
};

use super::alarm::AlarmKind;
use super::cause::MigrationCause;
use super::manager::MigrationManager;
use super::network::{
    CreationOutcome, NetworkHandle, PathContextRequest, PathValidationContext, ProbeId,
};

/// What a probe is trying to achieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    /// Move to another network.
    Alternate,
    /// Return to the default network.
    Return,
    /// New local port on the same network.
    Port,
    /// Adopt the server's preferred address on the same network.
    PreferredAddress,
}

impl ProbeKind {
    /// Check if a committed probe of this kind changes the network.
    pub fn changes_network(self) -> bool {
        matches!(self, ProbeKind::Alternate | ProbeKind::Return)
    }

    /// Check if the factory must bind a fresh local port.
    pub fn needs_new_local_port(self) -> bool {
        matches!(self, ProbeKind::Port | ProbeKind::PreferredAddress)
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProbeKind::Alternate => "alternate",
            ProbeKind::Return => "return",
            ProbeKind::Port => "port",
            ProbeKind::PreferredAddress => "preferred_address",
        })
    }
}

/// The single in-flight attempt.
#[derive(Debug)]
pub(super) struct Attempt {
    pub(super) probe: ProbeId,
    pub(super) kind: ProbeKind,
    pub(super) cause: MigrationCause,
    pub(super) network: NetworkHandle,
    /// Backoff anchor for return probes.
    pub(super) started_at: Instant,
    /// `None` while the factory is still creating it.
    pub(super) context: Option<PathValidationContext>,
}

impl<S, F, V> MigrationManager<S, F, V>
where
    S: MigrationSession,
    F: PathContextFactory,
    V: PathValidator,
{
    pub(super) fn start_probe(
        &mut self,
        kind: ProbeKind,
        cause: MigrationCause,
        network: NetworkHandle,
        peer_address: SocketAddr,
        now: Instant,
    ) {
        let probe = ProbeId(self.next_probe_id);
        self.next_probe_id += 1;
        self.stats.probes_started += 1;
        let self_address = self.session.self_address();

        debug!(
            probe = %probe,
            kind = %kind,
            cause = %cause,
            network = %network,
            local = %self_address,
            peer = %peer_address,
            "requesting path context"
        );
        self.attempt = Some(Attempt {
            probe,
            kind,
            cause,
            network,
            started_at: now,
            context: None,
        });

        let request = PathContextRequest {
            probe,
            network,
            self_address,
            peer_address,
            new_local_port: kind.needs_new_local_port(),
        };
        match self.factory.create_path_context(request) {
            CreationOutcome::Ready(result) => self.finish_creation(result, now),
            CreationOutcome::Pending => trace!(probe = %probe, "path context creation pending"),
        }
    }

    /// Deferred completion of a factory request.
    ///
    /// Completions for a probe that is no longer in flight are dropped.
    pub fn on_path_context_created(
        &mut self,
        probe: ProbeId,
        result: Result<PathValidationContext, PathContextError>,
        now: Instant,
    ) {
        let creating = self
            .attempt
            .as_ref()
            .is_some_and(|attempt| attempt.probe == probe && attempt.context.is_none());
        if !creating {
            debug!(probe = %probe, "stale path context completion");
            return;
        }
        self.finish_creation(result, now);
    }

    /// Completion of a path validation started through [`PathValidator`].
    ///
    /// Results for a probe that is no longer in flight are dropped.
    pub fn on_path_validation_result(&mut self, probe: ProbeId, success: bool, now: Instant) {
        let Some(mut attempt) = self
            .attempt
            .take_if(|attempt| attempt.probe == probe && attempt.context.is_some())
        else {
            debug!(probe = %probe, success, "stale path validation result");
            return;
        };
        let Some(context) = attempt.context.take() else {
            return;
        };
        if success {
            self.commit(attempt, context, now);
        } else {
            self.on_validation_failed(attempt, context, now);
        }
    }

    fn finish_creation(
        &mut self,
        result: Result<PathValidationContext, PathContextError>,
        now: Instant,
    ) {
        match result {
            Ok(context) => self.start_validation(context, now),
            Err(err) => self.on_probe_start_failed(&err, now),
        }
    }

    fn start_validation(&mut self, mut context: PathValidationContext, now: Instant) {
        let Some(connection_id) = self.session.peer_connection_ids().claim_for_probe() else {
            self.on_probe_start_failed(&"no unused peer connection id", now);
            return;
        };
        context.set_peer_connection_id(connection_id);

        let Some(attempt) = self.attempt.as_mut() else {
            return;
        };
        let probe = attempt.probe;
        debug!(
            probe = %probe,
            self_address = %context.self_address(),
            peer = %context.peer_address(),
            connection_id = %connection_id,
            "starting path validation"
        );
        self.session.prepare_for_probing_on_path(&context);
        self.validator.start_validation(probe, &context);
        attempt.context = Some(context);
    }

    fn on_probe_start_failed(&mut self, reason: &dyn fmt::Display, now: Instant) {
        let Some(attempt) = self.attempt.take() else {
            return;
        };
        self.stats.context_failures += 1;
        warn!(
            probe = %attempt.probe,
            kind = %attempt.kind,
            cause = %attempt.cause,
            network = %attempt.network,
            reason = %reason,
            "failed to create path context"
        );

        if attempt.cause.waits_for_network_on_failure() {
            self.wait_for_new_network(attempt.cause, now);
            return;
        }
        if attempt.kind == ProbeKind::Return {
            self.schedule_migrate_back_retry(attempt.started_at, now);
        }
        self.resume_pending_write_error(now);
    }

    fn commit(&mut self, attempt: Attempt, context: PathValidationContext, now: Instant) {
        let network_change =
            attempt.kind.changes_network() && context.network() != self.current_network;
        if network_change {
            self.session.reset_non_migratable_streams();
        }
        if !self.session.prepare_for_migration_to_path(&context) {
            self.session
                .peer_connection_ids()
                .retire_peer_issued_connection_ids_no_longer_on_path();
            self.close(MigrationError::SessionRefused {
                cause: attempt.cause,
            });
            return;
        }

        let previous = self.current_network;
        let previous_address = self.session.self_address();
        self.current_network = context.network();
        // The failing writer is replaced by the committed path.
        self.pending_write_error = None;
        self.session.peer_connection_ids().on_path_migrated();

        let on_default = self.current_network == self.default_network;
        match attempt.kind {
            ProbeKind::Alternate | ProbeKind::Return => {
                if !on_default {
                    match attempt.cause {
                        MigrationCause::WriteError => self.counters.record_write_error_migration(),
                        MigrationCause::PathDegrading => {
                            self.counters.record_path_degrading_migration()
                        }
                        _ => {}
                    }
                }
                if network_change {
                    self.stats.network_migrations += 1;
                }
                if on_default && attempt.kind == ProbeKind::Return {
                    self.stats.migrations_back_to_default += 1;
                }
            }
            ProbeKind::Port => {
                self.counters.record_port_migration();
                self.stats.port_migrations += 1;
            }
            ProbeKind::PreferredAddress => {
                self.stats.preferred_address_migrations += 1;
            }
        }

        info!(
            probe = %attempt.probe,
            kind = %attempt.kind,
            cause = %attempt.cause,
            from = %previous,
            to = %self.current_network,
            from_address = %previous_address,
            self_address = %context.self_address(),
            peer = %context.peer_address(),
            "migrated to validated path"
        );
        self.session.on_migration_to_path_done(context, true);

        if self.alarms.get(AlarmKind::WaitForNewNetwork).is_set() {
            self.alarms.get_mut(AlarmKind::WaitForNewNetwork).cancel();
            self.wait_cause = None;
        }
        if attempt.kind.changes_network() {
            if on_default || !self.default_network.is_valid() {
                self.alarms.get_mut(AlarmKind::MigrateBack).cancel();
                self.retry_migrate_back_count = 0;
            } else if attempt.kind == ProbeKind::Alternate {
                self.retry_migrate_back_count = 0;
                trace!(delay = ?MIGRATE_BACK_INITIAL_DELAY, "arming migrate-back");
                self.alarms
                    .get_mut(AlarmKind::MigrateBack)
                    .arm(now, MIGRATE_BACK_INITIAL_DELAY);
            }
        }
    }

    fn on_validation_failed(
        &mut self,
        attempt: Attempt,
        context: PathValidationContext,
        now: Instant,
    ) {
        self.stats.validation_failures += 1;
        warn!(
            probe = %attempt.probe,
            kind = %attempt.kind,
            cause = %attempt.cause,
            network = %attempt.network,
            "path validation failed"
        );
        self.session
            .peer_connection_ids()
            .retire_peer_issued_connection_ids_no_longer_on_path();
        self.session.on_migration_to_path_done(context, false);

        if attempt.kind == ProbeKind::Return {
            self.schedule_migrate_back_retry(attempt.started_at, now);
        }
        self.resume_pending_write_error(now);
    }

    /// Drop the in-flight attempt without a result.
    pub(super) fn cancel_attempt(&mut self) {
        if let Some(attempt) = self.attempt.take() {
            self.abandon(attempt);
        }
    }

    pub(super) fn abandon(&mut self, mut attempt: Attempt) {
        debug!(probe = %attempt.probe, kind = %attempt.kind, "abandoning probe");
        match attempt.context.take() {
            Some(context) => {
                self.validator.cancel_validation(attempt.probe);
                self.session
                    .peer_connection_ids()
                    .retire_peer_issued_connection_ids_no_longer_on_path();
                self.session.on_migration_to_path_done(context, false);
            }
            None => self.factory.cancel_request(attempt.probe),
        }
    }
}
