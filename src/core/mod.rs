//! Core constants, errors and collaborator traits.
//!
//! Everything here is independent of the migration state machine and may be
//! used by session implementations directly.

pub mod constants;
mod error;
mod traits;

pub use error::{CloseCode, ConfigError, MigrationError, PathContextError};
pub use traits::{MigrationSession, PacketWriter, PathContextFactory, PathValidator};
