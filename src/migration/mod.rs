//! Connection migration.
//!
//! [`MigrationManager`] consumes network signals (disconnect, connect,
//! made-default, path degrading, write error) and moves the connection to a
//! validated path, or closes it with a specific [`MigrationError`].
//!
//! [`MigrationError`]: crate::core::MigrationError

mod alarm;
mod cause;
mod cid;
mod config;
mod counters;
mod manager;
mod migrate_back;
mod network;
mod probe;
mod stats;

pub use alarm::{Alarm, AlarmKind, AlarmSet};
pub use cause::MigrationCause;
pub use cid::{
    ConnectionId, ConnectionIdError, NewConnectionIdFrame, PeerConnectionIdPool,
    StatelessResetToken,
};
pub use config::MigrationConfig;
pub use counters::MigrationCounters;
pub use manager::{MigrationManager, MigrationPhase};
pub use network::{
    CreationOutcome, NetworkHandle, PathContextRequest, PathValidationContext, ProbeId,
};
pub use probe::ProbeKind;
pub use stats::MigrationStats;
