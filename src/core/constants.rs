//! Reference migration policy and wire constants.
//!
//! Timing values follow the reference client policy. Close code values are
//! stable on the wire.

use std::time::Duration;

// =============================================================================
// TIMERS
// =============================================================================

/// How long to wait for a new network after the current one disconnects
/// with no alternate available.
pub const WAIT_FOR_NEW_NETWORK_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay before the first attempt to return to the default network.
pub const MIGRATE_BACK_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on the migrate-back retry delay. Once the next backoff would
/// exceed this, the session is drained instead of retried.
pub const MAX_TIME_ON_NON_DEFAULT_NETWORK: Duration = Duration::from_secs(128);

/// Default time since the last stream closed after which an idle session is
/// closed rather than migrated.
pub const DEFAULT_IDLE_MIGRATION_PERIOD: Duration = Duration::from_secs(30);

// =============================================================================
// RETRY BUDGETS
// =============================================================================

/// Port migrations allowed on path degrading.
pub const MAX_PORT_MIGRATIONS_ON_PATH_DEGRADING: u32 = 4;

/// Default write-error migrations to a non-default network per default network.
pub const DEFAULT_MAX_MIGRATIONS_ON_WRITE_ERROR: u32 = 5;

/// Default path-degrading migrations to a non-default network per default network.
pub const DEFAULT_MAX_MIGRATIONS_ON_PATH_DEGRADING: u32 = 5;

// =============================================================================
// CONNECTION IDS
// =============================================================================

/// Shortest connection ID a peer may issue.
pub const MIN_CONNECTION_ID_LEN: usize = 1;

/// Longest connection ID a peer may issue.
pub const MAX_CONNECTION_ID_LEN: usize = 20;

/// Connection IDs we are willing to hold from the peer at once.
pub const DEFAULT_ACTIVE_CONNECTION_ID_LIMIT: usize = 4;

/// Stateless reset token size.
pub const STATELESS_RESET_TOKEN_SIZE: usize = 16;

// =============================================================================
// CLOSE CODES
// =============================================================================

/// Connection had no migratable streams and idle migration is disabled.
pub const CLOSE_MIGRATION_DISABLED_NO_MIGRATABLE_STREAMS: u64 = 0x50;

/// Idle session exceeded the idle migration period.
pub const CLOSE_NETWORK_IDLE_TIMEOUT: u64 = 0x19;

/// Peer disabled active migration during the handshake.
pub const CLOSE_MIGRATION_DISABLED_BY_CONFIG: u64 = 0x63;

/// No new network appeared within the wait timeout.
pub const CLOSE_CONNECTION_MIGRATION_NO_NEW_NETWORK: u64 = 0x53;

/// Packet write failed and could not be recovered by migration.
pub const CLOSE_PACKET_WRITE_ERROR: u64 = 0x1b;

/// Session refused to complete a validated migration.
pub const CLOSE_MIGRATION_INTERNAL_ERROR: u64 = 0x64;
