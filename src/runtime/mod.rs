//! Async driver for the migration manager.
//!
//! The manager itself never sleeps or spawns. [`MigrationDriver`] runs it on
//! a tokio task: platform network signals and collaborator completions are
//! sent through a [`MigrationHandle`], and alarms fire on the tokio clock.

mod driver;

pub use driver::{DriverStopped, MigrationDriver, MigrationEvent, MigrationHandle};
