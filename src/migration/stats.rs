//! Migration statistics.

/// Counters describing a connection's migration history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationStats {
    /// Path context requests issued to the factory.
    pub probes_started: u64,
    /// Path context creations that failed.
    pub context_failures: u64,
    /// Validations that failed.
    pub validation_failures: u64,
    /// Migrations committed to a different network.
    pub network_migrations: u64,
    /// Migrations committed to a new local port on the same network.
    pub port_migrations: u64,
    /// Returns to the default network.
    pub migrations_back_to_default: u64,
    /// Server preferred addresses adopted.
    pub preferred_address_migrations: u64,
    /// Write errors reported (including coalesced ones).
    pub write_errors: u64,
}

impl MigrationStats {
    /// Total committed migrations of any kind.
    pub fn total_migrations(&self) -> u64 {
        self.network_migrations + self.port_migrations + self.preferred_address_migrations
    }

    /// Probes that ended without a committed migration.
    pub fn failed_probes(&self) -> u64 {
        self.context_failures + self.validation_failures
    }
}
