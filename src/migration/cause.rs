//! Migration causes.

use std::fmt;

/// What triggered a migration attempt.
///
/// Selects the counters and policies that apply, and qualifies close reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationCause {
    /// A packet write failed on the current path.
    WriteError,
    /// The current network disconnected.
    Disconnected,
    /// A network became the platform default.
    MadeDefault,
    /// The current path is degrading.
    PathDegrading,
    /// The server advertised a preferred address.
    ServerPreferredAddress,
}

impl MigrationCause {
    /// Short snake-case label used in logs and close reasons.
    pub fn as_str(self) -> &'static str {
        match self {
            MigrationCause::WriteError => "write_error",
            MigrationCause::Disconnected => "disconnected",
            MigrationCause::MadeDefault => "made_default",
            MigrationCause::PathDegrading => "path_degrading",
            MigrationCause::ServerPreferredAddress => "server_preferred_address",
        }
    }

    /// Check if a failed context creation for this cause falls back to
    /// waiting for a new network. Every other cause abandons the attempt.
    pub fn waits_for_network_on_failure(self) -> bool {
        self == MigrationCause::WriteError
    }
}

impl fmt::Display for MigrationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
