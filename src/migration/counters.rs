//! Retry budgets.
//!
//! Non-default migration counters are scoped to the current default network
//! and reset whenever a new default is designated. The port migration counter
//! lives for the whole connection.

/// Per-default-network attempt counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationCounters {
    /// Write-error migrations to a non-default network since the last default change.
    write_error_to_non_default: u32,
    /// Path-degrading migrations to a non-default network since the last default change.
    path_degrading_to_non_default: u32,
    /// Port migrations over the connection lifetime.
    port_migrations: u32,
}

impl MigrationCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write-error migrations since the last default change.
    pub fn write_error_to_non_default(&self) -> u32 {
        self.write_error_to_non_default
    }

    /// Path-degrading migrations since the last default change.
    pub fn path_degrading_to_non_default(&self) -> u32 {
        self.path_degrading_to_non_default
    }

    /// Port migrations used.
    pub fn port_migrations(&self) -> u32 {
        self.port_migrations
    }

    /// Check if the write-error budget is spent.
    pub fn write_error_budget_exhausted(&self, max: u32) -> bool {
        self.write_error_to_non_default >= max
    }

    /// Check if another path-degrading migration is allowed.
    pub fn path_degrading_budget_available(&self, max: u32) -> bool {
        self.path_degrading_to_non_default < max
    }

    /// Check if another port migration is allowed.
    pub fn port_budget_available(&self, max: u32) -> bool {
        self.port_migrations < max
    }

    /// Record a committed write-error migration to a non-default network.
    pub fn record_write_error_migration(&mut self) {
        self.write_error_to_non_default = self.write_error_to_non_default.saturating_add(1);
    }

    /// Record a committed path-degrading migration to a non-default network.
    pub fn record_path_degrading_migration(&mut self) {
        self.path_degrading_to_non_default = self.path_degrading_to_non_default.saturating_add(1);
    }

    /// Record a committed port migration.
    pub fn record_port_migration(&mut self) {
        self.port_migrations = self.port_migrations.saturating_add(1);
    }

    /// A new default network was designated.
    pub fn reset_for_new_default(&mut self) {
        self.write_error_to_non_default = 0;
        self.path_degrading_to_non_default = 0;
    }
}
