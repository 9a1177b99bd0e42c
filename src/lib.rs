//! # NOMAD Roam
//!
//! Connection migration for QUIC-style transports.
//!
//! Keeps a live connection usable while the underlying network path changes:
//! Wi-Fi to cellular handover, rebinding, degraded paths, or a failed send.
//! Every candidate path is validated before it is used, and every new path
//! gets a fresh peer-issued connection ID so the old and new paths cannot be
//! linked by an observer.
//!
//! ## Feature Flags
//!
//! - `runtime` (default): tokio driver owning a manager
//!
//! ## Modules
//!
//! - [`core`]: Constants, error types and collaborator traits (always included)
//! - [`migration`]: The migration state machine and its data types
//! - [`runtime`]: Async driver (requires `runtime` feature)
//!
//! ## Example Usage
//!
//! ```rust
//! use std::time::Instant;
//!
//! use nomad_roam::prelude::*;
//!
//! fn on_wifi_lost<S, F, V>(manager: &mut MigrationManager<S, F, V>, wifi: NetworkHandle)
//! where
//!     S: MigrationSession,
//!     F: PathContextFactory,
//!     V: PathValidator,
//! {
//!     manager.on_network_disconnected(wifi, Instant::now());
//!     if let Some(err) = manager.close_error() {
//!         eprintln!("connection closed: {err} ({})", err.close_code());
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Migration state machine
pub mod migration;

// Async driver (feature-gated)
#[cfg(feature = "runtime")]
#[cfg_attr(docsrs, doc(cfg(feature = "runtime")))]
pub mod runtime;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core traits and types
    pub use crate::core::*;

    pub use crate::migration::{
        CreationOutcome, MigrationCause, MigrationConfig, MigrationManager, MigrationPhase,
        MigrationStats, NetworkHandle, PathContextRequest, PathValidationContext, ProbeId,
        ProbeKind,
    };

    // Driver types (when enabled)
    #[cfg(feature = "runtime")]
    pub use crate::runtime::{MigrationDriver, MigrationEvent, MigrationHandle};
}

// Re-export commonly used items at crate root
pub use crate::core::{CloseCode, MigrationError};
pub use crate::migration::{MigrationConfig, MigrationManager, NetworkHandle};

#[cfg(feature = "runtime")]
pub use crate::runtime::{MigrationDriver, MigrationHandle};
