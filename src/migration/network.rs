//! Network handles and path validation contexts.

use std::fmt;
use std::net::SocketAddr;

use crate::core::PacketWriter;

use super::cid::ConnectionId;

/// Opaque handle to a local network (interface or route).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkHandle(i64);

impl NetworkHandle {
    /// Sentinel meaning "unknown" or "none".
    pub const INVALID: NetworkHandle = NetworkHandle(-1);

    /// Wrap a platform network handle.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw platform value.
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Check if this handle names a real network.
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl Default for NetworkHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for NetworkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "net#{}", self.0)
        } else {
            f.write_str("net#invalid")
        }
    }
}

/// Identifier of a factory request; doubles as the probe id once the
/// context exists, so both completions route back to the same attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProbeId(pub(crate) u64);

impl ProbeId {
    /// Raw value, for logging.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "probe#{}", self.0)
    }
}

/// Request for a path validation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathContextRequest {
    /// Id to quote back in an asynchronous completion.
    pub probe: ProbeId,
    /// Network the writer must be bound to.
    pub network: NetworkHandle,
    /// Local address of the active path when the probe started.
    pub self_address: SocketAddr,
    /// Peer address to probe.
    pub peer_address: SocketAddr,
    /// Bind a fresh local port even though the network is unchanged.
    pub new_local_port: bool,
}

/// Self address, peer address and writer bound to one network.
///
/// Owned by the in-flight probe until validation completes, then handed to
/// the session (success) or dropped (failure).
pub struct PathValidationContext {
    self_address: SocketAddr,
    peer_address: SocketAddr,
    network: NetworkHandle,
    writer: Box<dyn PacketWriter>,
    peer_connection_id: Option<ConnectionId>,
}

impl PathValidationContext {
    /// Create a context for a writer bound to `network`.
    pub fn new(
        self_address: SocketAddr,
        peer_address: SocketAddr,
        network: NetworkHandle,
        writer: Box<dyn PacketWriter>,
    ) -> Self {
        Self {
            self_address,
            peer_address,
            network,
            writer,
            peer_connection_id: None,
        }
    }

    /// Local address of the path.
    pub fn self_address(&self) -> SocketAddr {
        self.self_address
    }

    /// Peer address of the path.
    pub fn peer_address(&self) -> SocketAddr {
        self.peer_address
    }

    /// Network the writer is bound to.
    pub fn network(&self) -> NetworkHandle {
        self.network
    }

    /// Writer bound to the path.
    pub fn writer(&self) -> &dyn PacketWriter {
        self.writer.as_ref()
    }

    /// Mutable writer bound to the path.
    pub fn writer_mut(&mut self) -> &mut dyn PacketWriter {
        self.writer.as_mut()
    }

    /// Take ownership of the writer.
    pub fn into_writer(self) -> Box<dyn PacketWriter> {
        self.writer
    }

    /// Peer-issued connection ID used on this path, once claimed.
    pub fn peer_connection_id(&self) -> Option<&ConnectionId> {
        self.peer_connection_id.as_ref()
    }

    pub(crate) fn set_peer_connection_id(&mut self, id: ConnectionId) {
        self.peer_connection_id = Some(id);
    }
}

impl fmt::Debug for PathValidationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathValidationContext")
            .field("self_address", &self.self_address)
            .field("peer_address", &self.peer_address)
            .field("network", &self.network)
            .field("peer_connection_id", &self.peer_connection_id)
            .finish_non_exhaustive()
    }
}

/// Result of asking the factory for a context.
#[derive(Debug)]
pub enum CreationOutcome {
    /// Completed on the same stack.
    Ready(Result<PathValidationContext, crate::core::PathContextError>),
    /// Completion will arrive through
    /// [`MigrationManager::on_path_context_created`](super::MigrationManager::on_path_context_created).
    Pending,
}
