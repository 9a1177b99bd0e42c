//! Peer-issued connection IDs.
//!
//! Each new path is probed with a connection ID the peer has never seen on
//! any other path, so an observer cannot link the old and new paths. Once a
//! path is abandoned its ID is retired.

use std::collections::VecDeque;
use std::fmt;

use rand::RngCore;
use thiserror::Error;

use crate::core::constants::{
    DEFAULT_ACTIVE_CONNECTION_ID_LIMIT, MAX_CONNECTION_ID_LEN, MIN_CONNECTION_ID_LEN,
    STATELESS_RESET_TOKEN_SIZE,
};

/// Stateless reset token bound to a connection ID.
pub type StatelessResetToken = [u8; STATELESS_RESET_TOKEN_SIZE];

/// Connection ID errors. Every variant is a peer protocol violation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionIdError {
    /// Connection ID length outside 1..=20.
    #[error("connection id length {0} out of range")]
    LengthOutOfRange(usize),

    /// Retire Prior To exceeds the frame's own sequence number.
    #[error("retire prior to {retire_prior_to} exceeds sequence {sequence}")]
    RetirePriorToAboveSequence {
        /// Frame sequence number.
        sequence: u64,
        /// Frame retire prior to.
        retire_prior_to: u64,
    },

    /// Sequence number reused for a different connection ID.
    #[error("sequence {0} reused for a different connection id")]
    ConflictingSequence(u64),

    /// Connection ID reissued under a different sequence number.
    #[error("connection id reissued with sequence {0}")]
    ReusedConnectionId(u64),

    /// Peer issued more IDs than our active connection ID limit.
    #[error("active connection id limit {0} exceeded")]
    LimitExceeded(usize),
}

/// A QUIC connection ID (1 to 20 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    bytes: [u8; MAX_CONNECTION_ID_LEN],
    len: u8,
}

impl ConnectionId {
    /// Create from raw bytes.
    pub fn new(bytes: &[u8]) -> Result<Self, ConnectionIdError> {
        if !(MIN_CONNECTION_ID_LEN..=MAX_CONNECTION_ID_LEN).contains(&bytes.len()) {
            return Err(ConnectionIdError::LengthOutOfRange(bytes.len()));
        }
        let mut buf = [0u8; MAX_CONNECTION_ID_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self {
            bytes: buf,
            len: bytes.len() as u8,
        })
    }

    /// Generate a random connection ID of `len` bytes (clamped to 1..=20).
    pub fn random(len: usize) -> Self {
        let len = len.clamp(MIN_CONNECTION_ID_LEN, MAX_CONNECTION_ID_LEN);
        let mut bytes = [0u8; MAX_CONNECTION_ID_LEN];
        rand::thread_rng().fill_bytes(&mut bytes[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }

    /// ID bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// ID length in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Always false; zero-length IDs cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.as_bytes() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self)
    }
}

/// Decoded NEW_CONNECTION_ID frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConnectionIdFrame {
    /// Sequence number assigned by the peer.
    pub sequence: u64,
    /// Peer asks us to retire every ID below this sequence.
    pub retire_prior_to: u64,
    /// The new connection ID.
    pub connection_id: ConnectionId,
    /// Token the peer will use in a stateless reset for this ID.
    pub stateless_reset_token: StatelessResetToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PeerIdEntry {
    sequence: u64,
    id: ConnectionId,
    reset_token: StatelessResetToken,
}

/// Pool of connection IDs issued to us by the peer.
///
/// Tracks the ID in use on the active path, at most one ID claimed by an
/// in-flight probe, and the unused remainder. Retired sequence numbers are
/// queued for RETIRE_CONNECTION_ID frames.
#[derive(Debug, Clone)]
pub struct PeerConnectionIdPool {
    active: PeerIdEntry,
    probing: Option<PeerIdEntry>,
    unused: VecDeque<PeerIdEntry>,
    retire_prior_to: u64,
    limit: usize,
    pending_retirements: Vec<u64>,
}

impl PeerConnectionIdPool {
    /// Create a pool around the handshake connection ID (sequence 0).
    pub fn new(initial: ConnectionId) -> Self {
        Self::with_limit(initial, DEFAULT_ACTIVE_CONNECTION_ID_LIMIT)
    }

    /// Create a pool with a custom active connection ID limit.
    pub fn with_limit(initial: ConnectionId, limit: usize) -> Self {
        Self {
            active: PeerIdEntry {
                sequence: 0,
                id: initial,
                reset_token: [0; STATELESS_RESET_TOKEN_SIZE],
            },
            probing: None,
            unused: VecDeque::new(),
            retire_prior_to: 0,
            limit: limit.max(1),
            pending_retirements: Vec::new(),
        }
    }

    /// ID in use on the active path.
    pub fn active(&self) -> ConnectionId {
        self.active.id
    }

    /// ID claimed by the in-flight probe.
    pub fn probing(&self) -> Option<ConnectionId> {
        self.probing.as_ref().map(|entry| entry.id)
    }

    /// Number of IDs available for new paths.
    pub fn unused_count(&self) -> usize {
        self.unused.len()
    }

    /// Check if a new path can be probed.
    pub fn has_unused(&self) -> bool {
        !self.unused.is_empty()
    }

    /// Process a NEW_CONNECTION_ID frame.
    pub fn on_new_connection_id_frame(
        &mut self,
        frame: NewConnectionIdFrame,
    ) -> Result<(), ConnectionIdError> {
        if frame.retire_prior_to > frame.sequence {
            return Err(ConnectionIdError::RetirePriorToAboveSequence {
                sequence: frame.sequence,
                retire_prior_to: frame.retire_prior_to,
            });
        }

        if let Some(known) = self.find(frame.sequence) {
            if known.id == frame.connection_id && known.reset_token == frame.stateless_reset_token
            {
                return Ok(());
            }
            return Err(ConnectionIdError::ConflictingSequence(frame.sequence));
        }
        if self.entries().any(|entry| entry.id == frame.connection_id) {
            return Err(ConnectionIdError::ReusedConnectionId(frame.sequence));
        }

        if frame.retire_prior_to > self.retire_prior_to {
            self.retire_prior_to = frame.retire_prior_to;
            self.apply_retire_prior_to();
        }

        if frame.sequence < self.retire_prior_to {
            // Already retired by an earlier frame.
            self.pending_retirements.push(frame.sequence);
            return Ok(());
        }

        if self.entries().count() >= self.limit {
            return Err(ConnectionIdError::LimitExceeded(self.limit));
        }

        let entry = PeerIdEntry {
            sequence: frame.sequence,
            id: frame.connection_id,
            reset_token: frame.stateless_reset_token,
        };
        let pos = self
            .unused
            .iter()
            .position(|e| e.sequence > entry.sequence)
            .unwrap_or(self.unused.len());
        self.unused.insert(pos, entry);

        if self.active.sequence < self.retire_prior_to {
            self.replace_active();
        }
        Ok(())
    }

    /// Hand the lowest unused ID to a new probe.
    ///
    /// Returns `None` when the peer has not supplied a spare ID.
    pub fn claim_for_probe(&mut self) -> Option<ConnectionId> {
        if let Some(stale) = self.probing.take() {
            self.pending_retirements.push(stale.sequence);
        }
        let entry = self.unused.pop_front()?;
        let id = entry.id;
        self.probing = Some(entry);
        Some(id)
    }

    /// The probed path became the active path.
    ///
    /// The ID of the abandoned path is retired. Returns `false` if no probe
    /// held an ID.
    pub fn on_path_migrated(&mut self) -> bool {
        let Some(next) = self.probing.take() else {
            return false;
        };
        let previous = std::mem::replace(&mut self.active, next);
        self.pending_retirements.push(previous.sequence);
        true
    }

    /// Retire every ID that was put on the wire but is not on the active path.
    pub fn retire_peer_issued_connection_ids_no_longer_on_path(&mut self) {
        if let Some(entry) = self.probing.take() {
            self.pending_retirements.push(entry.sequence);
        }
    }

    /// Sequence numbers to send in RETIRE_CONNECTION_ID frames.
    pub fn drain_retirements(&mut self) -> Vec<u64> {
        std::mem::take(&mut self.pending_retirements)
    }

    /// Check if `token` matches a stateless reset for any ID we hold.
    pub fn is_stateless_reset(&self, token: &StatelessResetToken) -> bool {
        self.entries()
            .any(|entry| entry.sequence != 0 && &entry.reset_token == token)
    }

    fn entries(&self) -> impl Iterator<Item = &PeerIdEntry> {
        std::iter::once(&self.active)
            .chain(self.probing.iter())
            .chain(self.unused.iter())
    }

    fn find(&self, sequence: u64) -> Option<&PeerIdEntry> {
        self.entries().find(|entry| entry.sequence == sequence)
    }

    fn apply_retire_prior_to(&mut self) {
        let threshold = self.retire_prior_to;
        let retirements = &mut self.pending_retirements;
        self.unused.retain(|entry| {
            if entry.sequence < threshold {
                retirements.push(entry.sequence);
                false
            } else {
                true
            }
        });
        if let Some(entry) = self.probing.take_if(|entry| entry.sequence < threshold) {
            self.pending_retirements.push(entry.sequence);
        }
    }

    fn replace_active(&mut self) {
        if let Some(next) = self.unused.pop_front() {
            let previous = std::mem::replace(&mut self.active, next);
            self.pending_retirements.push(previous.sequence);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(byte: u8) -> ConnectionId {
        ConnectionId::new(&[byte; 8]).unwrap()
    }

    fn frame(sequence: u64, retire_prior_to: u64, byte: u8) -> NewConnectionIdFrame {
        NewConnectionIdFrame {
            sequence,
            retire_prior_to,
            connection_id: cid(byte),
            stateless_reset_token: [byte; STATELESS_RESET_TOKEN_SIZE],
        }
    }

    #[test]
    fn test_connection_id_length_bounds() {
        assert_eq!(
            ConnectionId::new(&[]),
            Err(ConnectionIdError::LengthOutOfRange(0))
        );
        assert_eq!(
            ConnectionId::new(&[0u8; 21]),
            Err(ConnectionIdError::LengthOutOfRange(21))
        );
        assert_eq!(ConnectionId::new(&[1u8; 20]).unwrap().len(), 20);
    }

    #[test]
    fn test_connection_id_display_is_hex() {
        let id = ConnectionId::new(&hex::decode("deadbeef").unwrap()).unwrap();
        assert_eq!(id.to_string(), "deadbeef");
        assert_eq!(hex::encode(id.as_bytes()), "deadbeef");
    }

    #[test]
    fn test_random_ids_differ() {
        let a = ConnectionId::random(8);
        let b = ConnectionId::random(8);
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
        assert_eq!(ConnectionId::random(64).len(), MAX_CONNECTION_ID_LEN);
    }

    #[test]
    fn test_claim_and_migrate_retires_old_path() {
        let mut pool = PeerConnectionIdPool::new(cid(0));
        pool.on_new_connection_id_frame(frame(1, 0, 1)).unwrap();
        pool.on_new_connection_id_frame(frame(2, 0, 2)).unwrap();

        assert_eq!(pool.claim_for_probe(), Some(cid(1)));
        assert_eq!(pool.probing(), Some(cid(1)));
        assert!(pool.on_path_migrated());

        assert_eq!(pool.active(), cid(1));
        assert_eq!(pool.drain_retirements(), vec![0]);
        assert_eq!(pool.unused_count(), 1);
    }

    #[test]
    fn test_failed_probe_retires_probe_id() {
        let mut pool = PeerConnectionIdPool::new(cid(0));
        pool.on_new_connection_id_frame(frame(1, 0, 1)).unwrap();

        pool.claim_for_probe();
        pool.retire_peer_issued_connection_ids_no_longer_on_path();

        assert_eq!(pool.active(), cid(0));
        assert_eq!(pool.probing(), None);
        assert_eq!(pool.drain_retirements(), vec![1]);
        assert!(!pool.has_unused());
        assert_eq!(pool.claim_for_probe(), None);
    }

    #[test]
    fn test_retire_prior_to_replaces_active() {
        let mut pool = PeerConnectionIdPool::new(cid(0));
        pool.on_new_connection_id_frame(frame(1, 0, 1)).unwrap();
        pool.on_new_connection_id_frame(frame(2, 2, 2)).unwrap();

        assert_eq!(pool.active(), cid(2));
        let mut retired = pool.drain_retirements();
        retired.sort_unstable();
        assert_eq!(retired, vec![0, 1]);
    }

    #[test]
    fn test_frame_validation() {
        let mut pool = PeerConnectionIdPool::new(cid(0));

        assert_eq!(
            pool.on_new_connection_id_frame(frame(1, 2, 1)),
            Err(ConnectionIdError::RetirePriorToAboveSequence {
                sequence: 1,
                retire_prior_to: 2
            })
        );

        pool.on_new_connection_id_frame(frame(1, 0, 1)).unwrap();
        // Retransmission is idempotent.
        pool.on_new_connection_id_frame(frame(1, 0, 1)).unwrap();
        assert_eq!(
            pool.on_new_connection_id_frame(frame(1, 0, 9)),
            Err(ConnectionIdError::ConflictingSequence(1))
        );
        assert_eq!(
            pool.on_new_connection_id_frame(frame(5, 0, 1)),
            Err(ConnectionIdError::ReusedConnectionId(5))
        );
    }

    #[test]
    fn test_active_limit() {
        let mut pool = PeerConnectionIdPool::with_limit(cid(0), 2);
        pool.on_new_connection_id_frame(frame(1, 0, 1)).unwrap();
        assert_eq!(
            pool.on_new_connection_id_frame(frame(2, 0, 2)),
            Err(ConnectionIdError::LimitExceeded(2))
        );
    }

    #[test]
    fn test_stateless_reset_lookup() {
        let mut pool = PeerConnectionIdPool::new(cid(0));
        pool.on_new_connection_id_frame(frame(1, 0, 7)).unwrap();
        assert!(pool.is_stateless_reset(&[7; STATELESS_RESET_TOKEN_SIZE]));
        assert!(!pool.is_stateless_reset(&[0; STATELESS_RESET_TOKEN_SIZE]));
    }
}
