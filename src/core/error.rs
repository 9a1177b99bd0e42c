//! Error types for NOMAD Roam.
//!
//! Fatal migration outcomes always close the connection with a stable
//! [`CloseCode`] and a cause-qualified reason string. Transient probe
//! failures ([`PathContextError`]) never reach the application.

use std::fmt;
use std::io;

use thiserror::Error;

use super::constants;
use crate::migration::MigrationCause;

/// Stable connection close codes emitted by the migration subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// Session was idle and idle migration is disabled.
    MigrationDisabledNoMigratableStreams,
    /// Idle session exceeded the idle migration period.
    NetworkIdleTimeout,
    /// Peer disabled active migration.
    MigrationDisabledByConfig,
    /// No new network appeared in time.
    ConnectionMigrationNoNewNetwork,
    /// Unrecoverable packet write error.
    PacketWriteError,
    /// Session refused a validated migration.
    MigrationInternalError,
}

impl CloseCode {
    /// Numeric value carried in the CONNECTION_CLOSE frame.
    pub fn as_u64(self) -> u64 {
        match self {
            CloseCode::MigrationDisabledNoMigratableStreams => {
                constants::CLOSE_MIGRATION_DISABLED_NO_MIGRATABLE_STREAMS
            }
            CloseCode::NetworkIdleTimeout => constants::CLOSE_NETWORK_IDLE_TIMEOUT,
            CloseCode::MigrationDisabledByConfig => constants::CLOSE_MIGRATION_DISABLED_BY_CONFIG,
            CloseCode::ConnectionMigrationNoNewNetwork => {
                constants::CLOSE_CONNECTION_MIGRATION_NO_NEW_NETWORK
            }
            CloseCode::PacketWriteError => constants::CLOSE_PACKET_WRITE_ERROR,
            CloseCode::MigrationInternalError => constants::CLOSE_MIGRATION_INTERNAL_ERROR,
        }
    }

    /// Upper-snake name used in logs and close reasons.
    pub fn name(self) -> &'static str {
        match self {
            CloseCode::MigrationDisabledNoMigratableStreams => {
                "MIGRATION_DISABLED_NO_MIGRATABLE_STREAMS"
            }
            CloseCode::NetworkIdleTimeout => "NETWORK_IDLE_TIMEOUT",
            CloseCode::MigrationDisabledByConfig => "MIGRATION_DISABLED_BY_CONFIG",
            CloseCode::ConnectionMigrationNoNewNetwork => "CONNECTION_MIGRATION_NO_NEW_NETWORK",
            CloseCode::PacketWriteError => "PACKET_WRITE_ERROR",
            CloseCode::MigrationInternalError => "MIGRATION_INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fatal migration outcomes.
///
/// `Display` is the reason string sent with the close.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MigrationError {
    /// Session has no migratable streams and idle migration is disabled.
    #[error("migration disabled: no migratable streams (cause: {cause})")]
    NoMigratableStreams {
        /// What triggered the attempt.
        cause: MigrationCause,
    },

    /// Idle session exceeded the idle migration period.
    #[error("idle session exceeds idle migration period (cause: {cause})")]
    IdleTimeout {
        /// What triggered the attempt.
        cause: MigrationCause,
    },

    /// Peer disabled active migration during the handshake.
    #[error("migration disabled by config (cause: {cause})")]
    DisabledByConfig {
        /// What triggered the attempt.
        cause: MigrationCause,
    },

    /// No new network appeared within the wait timeout.
    #[error("migration for cause {cause} timed out without a new network")]
    NoNewNetwork {
        /// What triggered the attempt.
        cause: MigrationCause,
    },

    /// Write-error retry budget exhausted for the current default network.
    #[error("too many migrations for write error for the same network (error code {error_code})")]
    TooManyWriteErrorMigrations {
        /// Last recorded write error.
        error_code: i32,
    },

    /// Write failed and migration on network change is disabled.
    #[error("write error {error_code} and migration on network change is disabled")]
    WriteErrorMigrationDisabled {
        /// Last recorded write error.
        error_code: i32,
    },

    /// Session refused to complete a validated migration.
    #[error("session refused to migrate to validated path (cause: {cause})")]
    SessionRefused {
        /// What triggered the attempt.
        cause: MigrationCause,
    },
}

impl MigrationError {
    /// Close code sent to the peer.
    pub fn close_code(&self) -> CloseCode {
        match self {
            MigrationError::NoMigratableStreams { .. } => {
                CloseCode::MigrationDisabledNoMigratableStreams
            }
            MigrationError::IdleTimeout { .. } => CloseCode::NetworkIdleTimeout,
            MigrationError::DisabledByConfig { .. } => CloseCode::MigrationDisabledByConfig,
            MigrationError::NoNewNetwork { .. } => CloseCode::ConnectionMigrationNoNewNetwork,
            MigrationError::TooManyWriteErrorMigrations { .. }
            | MigrationError::WriteErrorMigrationDisabled { .. } => CloseCode::PacketWriteError,
            MigrationError::SessionRefused { .. } => CloseCode::MigrationInternalError,
        }
    }

    /// Trigger that led to the close.
    pub fn cause(&self) -> MigrationCause {
        match self {
            MigrationError::NoMigratableStreams { cause }
            | MigrationError::IdleTimeout { cause }
            | MigrationError::DisabledByConfig { cause }
            | MigrationError::NoNewNetwork { cause }
            | MigrationError::SessionRefused { cause } => *cause,
            MigrationError::TooManyWriteErrorMigrations { .. }
            | MigrationError::WriteErrorMigrationDisabled { .. } => MigrationCause::WriteError,
        }
    }

    /// Check if migration was refused by policy (config, idleness, peer option).
    pub fn is_policy_refusal(&self) -> bool {
        matches!(
            self,
            MigrationError::NoMigratableStreams { .. }
                | MigrationError::IdleTimeout { .. }
                | MigrationError::DisabledByConfig { .. }
                | MigrationError::WriteErrorMigrationDisabled { .. }
        )
    }

    /// Check if a retry budget ran out.
    pub fn is_budget_exhausted(&self) -> bool {
        matches!(
            self,
            MigrationError::TooManyWriteErrorMigrations { .. } | MigrationError::NoNewNetwork { .. }
        )
    }

    /// Check if a collaborator violated its contract.
    pub fn is_internal(&self) -> bool {
        matches!(self, MigrationError::SessionRefused { .. })
    }
}

/// Failures creating a path validation context.
///
/// Always transient: recovered by waiting, retrying or abandoning the probe.
#[derive(Debug, Error)]
pub enum PathContextError {
    /// No route to the peer over the requested network.
    #[error("no route to peer over network {0}")]
    NoRoute(crate::migration::NetworkHandle),

    /// Socket for the network could not be created.
    #[error("socket creation failed: {0}")]
    SocketCreation(#[from] io::Error),

    /// Network disappeared while the context was being created.
    #[error("network unavailable")]
    Unavailable,
}

/// Configuration validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Idle migration enabled with a zero idle period.
    #[error("idle migration enabled with a zero idle migration period")]
    ZeroIdleMigrationPeriod,

    /// Port migration enabled with no port migrations allowed.
    #[error("port migration enabled with a zero port migration cap")]
    ZeroPortMigrationCap,

    /// Wait-for-network timeout must be non-zero.
    #[error("wait for new network timeout must be non-zero")]
    ZeroWaitTimeout,
}
