//! Per-connection migration policy.

use std::time::Duration;

use crate::core::{ConfigError, constants};

/// Migration policy, set once from negotiated options.
///
/// Immutable once handed to a [`MigrationManager`](super::MigrationManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationConfig {
    /// Allow migration triggered by disconnect / made-default signals.
    pub migrate_on_network_change: bool,

    /// Allow proactive migration on a path-degrading signal.
    pub migrate_early_on_path_degrading: bool,

    /// When network-change migration is off, allow same-network port rebinding.
    pub allow_port_migration: bool,

    /// Allow migrating a session with no active migratable stream.
    pub migrate_idle_sessions: bool,

    /// Idle sessions quiet for at least this long are closed, not migrated.
    pub idle_migration_period: Duration,

    /// Write-error migrations to a non-default network per default network.
    pub max_migrations_on_write_error: u32,

    /// Path-degrading migrations to a non-default network per default network.
    pub max_migrations_on_path_degrading: u32,

    /// Port migrations allowed over the connection lifetime.
    pub max_port_migrations: u32,

    /// How long to wait for a new network before closing.
    pub wait_for_new_network_timeout: Duration,

    /// Largest migrate-back retry delay before the session is drained.
    pub max_time_on_non_default_network: Duration,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrate_on_network_change: true,
            migrate_early_on_path_degrading: true,
            allow_port_migration: true,
            migrate_idle_sessions: false,
            idle_migration_period: constants::DEFAULT_IDLE_MIGRATION_PERIOD,
            max_migrations_on_write_error: constants::DEFAULT_MAX_MIGRATIONS_ON_WRITE_ERROR,
            max_migrations_on_path_degrading: constants::DEFAULT_MAX_MIGRATIONS_ON_PATH_DEGRADING,
            max_port_migrations: constants::MAX_PORT_MIGRATIONS_ON_PATH_DEGRADING,
            wait_for_new_network_timeout: constants::WAIT_FOR_NEW_NETWORK_TIMEOUT,
            max_time_on_non_default_network: constants::MAX_TIME_ON_NON_DEFAULT_NETWORK,
        }
    }
}

impl MigrationConfig {
    /// Create a config with the reference policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable migration on network change.
    pub fn with_migrate_on_network_change(mut self, enable: bool) -> Self {
        self.migrate_on_network_change = enable;
        self
    }

    /// Enable or disable early migration on path degrading.
    pub fn with_migrate_early_on_path_degrading(mut self, enable: bool) -> Self {
        self.migrate_early_on_path_degrading = enable;
        self
    }

    /// Enable or disable port migration.
    pub fn with_port_migration(mut self, enable: bool) -> Self {
        self.allow_port_migration = enable;
        self
    }

    /// Allow idle sessions to migrate, closing them once quiet for `period`.
    pub fn with_idle_migration(mut self, enable: bool, period: Duration) -> Self {
        self.migrate_idle_sessions = enable;
        self.idle_migration_period = period;
        self
    }

    /// Set the write-error retry budget.
    pub fn with_max_migrations_on_write_error(mut self, max: u32) -> Self {
        self.max_migrations_on_write_error = max;
        self
    }

    /// Set the path-degrading retry budget.
    pub fn with_max_migrations_on_path_degrading(mut self, max: u32) -> Self {
        self.max_migrations_on_path_degrading = max;
        self
    }

    /// Set the port migration cap.
    pub fn with_max_port_migrations(mut self, max: u32) -> Self {
        self.max_port_migrations = max;
        self
    }

    /// Set the wait-for-new-network timeout.
    pub fn with_wait_for_new_network_timeout(mut self, timeout: Duration) -> Self {
        self.wait_for_new_network_timeout = timeout;
        self
    }

    /// Set the largest migrate-back retry delay before draining.
    pub fn with_max_time_on_non_default_network(mut self, max: Duration) -> Self {
        self.max_time_on_non_default_network = max;
        self
    }

    /// Check the policy for contradictory settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.migrate_idle_sessions && self.idle_migration_period.is_zero() {
            return Err(ConfigError::ZeroIdleMigrationPeriod);
        }
        if self.allow_port_migration && self.max_port_migrations == 0 {
            return Err(ConfigError::ZeroPortMigrationCap);
        }
        if self.wait_for_new_network_timeout.is_zero() {
            return Err(ConfigError::ZeroWaitTimeout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_policy() {
        let config = MigrationConfig::default();
        assert!(config.migrate_on_network_change);
        assert!(!config.migrate_idle_sessions);
        assert_eq!(config.max_port_migrations, 4);
        assert_eq!(config.wait_for_new_network_timeout, Duration::from_secs(10));
        assert_eq!(
            config.max_time_on_non_default_network,
            Duration::from_secs(128)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = MigrationConfig::new()
            .with_migrate_on_network_change(false)
            .with_port_migration(true)
            .with_idle_migration(true, Duration::from_secs(5))
            .with_max_migrations_on_write_error(1);

        assert!(!config.migrate_on_network_change);
        assert!(config.migrate_idle_sessions);
        assert_eq!(config.idle_migration_period, Duration::from_secs(5));
        assert_eq!(config.max_migrations_on_write_error, 1);
    }

    #[test]
    fn test_validate_rejects_contradictions() {
        let config = MigrationConfig::new().with_idle_migration(true, Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroIdleMigrationPeriod));

        let config = MigrationConfig::new().with_max_port_migrations(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroPortMigrationCap));

        let config = MigrationConfig::new()
            .with_port_migration(false)
            .with_max_port_migrations(0);
        assert!(config.validate().is_ok());

        let config = MigrationConfig::new().with_wait_for_new_network_timeout(Duration::ZERO);
        assert_eq!(config.validate(), Err(ConfigError::ZeroWaitTimeout));
    }
}
