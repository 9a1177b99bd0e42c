//! Collaborator traits for the migration manager.
//!
//! The manager drives these interfaces and is generic over their
//! implementations. Client and server sessions implement
//! [`MigrationSession`] differently; the manager does not care which.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::error::CloseCode;
use crate::migration::{
    CreationOutcome, MigrationCause, NetworkHandle, PathContextRequest, PathValidationContext,
    PeerConnectionIdPool, ProbeId,
};

/// Packet writer bound to one network.
pub trait PacketWriter: fmt::Debug + Send {
    /// Local address the writer sends from.
    fn local_address(&self) -> SocketAddr;

    /// Write one packet to `peer`.
    fn write_packet(&mut self, buf: &[u8], peer: SocketAddr) -> io::Result<usize>;
}

/// Platform-specific constructor of path validation contexts.
///
/// May complete on the same stack ([`CreationOutcome::Ready`]) or later
/// through [`MigrationManager::on_path_context_created`] quoting
/// `request.probe`.
///
/// [`MigrationManager::on_path_context_created`]: crate::migration::MigrationManager::on_path_context_created
pub trait PathContextFactory {
    /// Create a context for `request.network` / `request.peer_address`.
    fn create_path_context(&mut self, request: PathContextRequest) -> CreationOutcome;

    /// Abandon an outstanding asynchronous request.
    fn cancel_request(&mut self, probe: ProbeId) {
        let _ = probe;
    }
}

/// Wire-level path validation (PATH_CHALLENGE / PATH_RESPONSE).
///
/// Completion is reported through
/// [`MigrationManager::on_path_validation_result`](crate::migration::MigrationManager::on_path_validation_result).
pub trait PathValidator {
    /// Start validating the path described by `context`.
    fn start_validation(&mut self, probe: ProbeId, context: &PathValidationContext);

    /// Stop retrying the validation for `probe`. No completion follows.
    fn cancel_validation(&mut self, probe: ProbeId);
}

/// The owning transport session.
pub trait MigrationSession {
    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Check if any open stream survives a path change.
    fn has_active_migratable_streams(&self) -> bool;

    /// Time since the last stream closed.
    fn time_since_last_stream_close(&self, now: Instant) -> Duration;

    /// Check if the connection runs a path validation the manager did not start.
    fn has_pending_path_validation(&self) -> bool;

    /// Check if the handshake is confirmed.
    fn is_handshake_confirmed(&self) -> bool;

    /// Check if the peer disabled active migration in its transport parameters.
    fn peer_disabled_active_migration(&self) -> bool;

    /// Local address of the active path.
    fn self_address(&self) -> SocketAddr;

    /// Peer address of the active path.
    fn peer_address(&self) -> SocketAddr;

    /// Best network other than `current`, or [`NetworkHandle::INVALID`].
    fn find_alternate_network(&self, current: NetworkHandle) -> NetworkHandle;

    /// Connection IDs the peer issued to us.
    fn peer_connection_ids(&mut self) -> &mut PeerConnectionIdPool;

    // ---------------------------------------------------------------------
    // Notifications
    // ---------------------------------------------------------------------

    /// No alternate network exists; the manager is waiting for one.
    fn on_no_new_network_for_migration(&mut self);

    /// A probe is about to be sent on `context`.
    fn prepare_for_probing_on_path(&mut self, context: &PathValidationContext);

    /// A validated path is about to become active. Returning `false` aborts
    /// the migration and closes the connection.
    fn prepare_for_migration_to_path(&mut self, context: &PathValidationContext) -> bool;

    /// Probe finished. On success the session takes ownership of the
    /// context's writer and addresses; on failure it drops the context.
    fn on_migration_to_path_done(&mut self, context: PathValidationContext, success: bool);

    /// The connection is about to be closed by a migration failure.
    fn on_connection_to_be_closed_due_to_migration_error(
        &mut self,
        cause: MigrationCause,
        code: CloseCode,
    );

    /// Reset streams that cannot survive a network change.
    fn reset_non_migratable_streams(&mut self);

    /// Close the connection.
    fn close_connection(&mut self, code: CloseCode, reason: &str);

    /// Stop accepting new streams and drain.
    fn start_draining(&mut self);
}
