//! Tokio task driving a [`MigrationManager`].

use std::net::SocketAddr;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::core::{MigrationSession, PathContextError, PathContextFactory, PathValidator};
use crate::migration::{MigrationManager, NetworkHandle, PathValidationContext, ProbeId};

/// Input to a running driver.
#[derive(Debug)]
pub enum MigrationEvent {
    /// A network went away.
    NetworkDisconnected(NetworkHandle),
    /// A network became available.
    NetworkConnected(NetworkHandle),
    /// The platform designated a new default network.
    NetworkMadeDefault(NetworkHandle),
    /// The current path is deteriorating.
    PathDegrading,
    /// A packet write failed with this error code.
    WriteError(i32),
    /// The server advertised a preferred address.
    ServerPreferredAddress(SocketAddr),
    /// Deferred factory completion.
    PathContextCreated {
        /// Request id from [`PathContextRequest`](crate::migration::PathContextRequest).
        probe: ProbeId,
        /// Created context or failure.
        result: Result<PathValidationContext, PathContextError>,
    },
    /// Path validation finished.
    PathValidated {
        /// Probe id passed to [`PathValidator::start_validation`].
        probe: ProbeId,
        /// Whether the peer answered on the new path.
        success: bool,
    },
    /// Stop the driver and hand the manager back.
    Shutdown,
}

/// The driver is gone.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("migration driver stopped")]
pub struct DriverStopped;

/// Cloneable sender half for a [`MigrationDriver`].
#[derive(Debug, Clone)]
pub struct MigrationHandle {
    tx: mpsc::UnboundedSender<MigrationEvent>,
}

impl MigrationHandle {
    /// Create a handle and the receiver a driver consumes.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<MigrationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Send an event to the driver.
    pub fn send(&self, event: MigrationEvent) -> Result<(), DriverStopped> {
        self.tx.send(event).map_err(|_| DriverStopped)
    }

    /// Report a network disconnect.
    pub fn network_disconnected(&self, network: NetworkHandle) -> Result<(), DriverStopped> {
        self.send(MigrationEvent::NetworkDisconnected(network))
    }

    /// Report a network connect.
    pub fn network_connected(&self, network: NetworkHandle) -> Result<(), DriverStopped> {
        self.send(MigrationEvent::NetworkConnected(network))
    }

    /// Report a new default network.
    pub fn network_made_default(&self, network: NetworkHandle) -> Result<(), DriverStopped> {
        self.send(MigrationEvent::NetworkMadeDefault(network))
    }

    /// Report a degrading path.
    pub fn path_degrading(&self) -> Result<(), DriverStopped> {
        self.send(MigrationEvent::PathDegrading)
    }

    /// Report a packet write failure.
    pub fn write_error(&self, error_code: i32) -> Result<(), DriverStopped> {
        self.send(MigrationEvent::WriteError(error_code))
    }

    /// Report a server preferred address.
    pub fn server_preferred_address(&self, address: SocketAddr) -> Result<(), DriverStopped> {
        self.send(MigrationEvent::ServerPreferredAddress(address))
    }

    /// Complete a deferred factory request.
    pub fn path_context_created(
        &self,
        probe: ProbeId,
        result: Result<PathValidationContext, PathContextError>,
    ) -> Result<(), DriverStopped> {
        self.send(MigrationEvent::PathContextCreated { probe, result })
    }

    /// Complete a path validation.
    pub fn path_validated(&self, probe: ProbeId, success: bool) -> Result<(), DriverStopped> {
        self.send(MigrationEvent::PathValidated { probe, success })
    }

    /// Ask the driver to stop.
    pub fn shutdown(&self) -> Result<(), DriverStopped> {
        self.send(MigrationEvent::Shutdown)
    }

    /// Check if the driver has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Owns a manager, feeds it events and fires its alarms on the tokio clock.
///
/// [`run`](Self::run) returns the manager once the connection is closed by a
/// migration failure, [`MigrationEvent::Shutdown`] arrives, or every
/// [`MigrationHandle`] is dropped.
#[derive(Debug)]
pub struct MigrationDriver<S, F, V> {
    manager: MigrationManager<S, F, V>,
    events: mpsc::UnboundedReceiver<MigrationEvent>,
}

impl<S, F, V> MigrationDriver<S, F, V>
where
    S: MigrationSession,
    F: PathContextFactory,
    V: PathValidator,
{
    /// Wrap `manager` with a fresh channel.
    pub fn new(manager: MigrationManager<S, F, V>) -> (Self, MigrationHandle) {
        let (handle, events) = MigrationHandle::channel();
        (Self { manager, events }, handle)
    }

    /// Wrap `manager` around a receiver from [`MigrationHandle::channel`].
    ///
    /// Lets collaborators hold a handle before the manager exists.
    pub fn with_receiver(
        manager: MigrationManager<S, F, V>,
        events: mpsc::UnboundedReceiver<MigrationEvent>,
    ) -> Self {
        Self { manager, events }
    }

    /// The driven manager.
    pub fn manager(&self) -> &MigrationManager<S, F, V> {
        &self.manager
    }

    /// Run until closed, shut down, or orphaned.
    pub async fn run(mut self) -> MigrationManager<S, F, V> {
        while !self.manager.is_closed() {
            let deadline = self.manager.next_alarm_deadline().map(Instant::from_std);

            tokio::select! {
                event = self.events.recv() => {
                    match event {
                        Some(MigrationEvent::Shutdown) => {
                            debug!("migration driver shut down");
                            break;
                        }
                        Some(event) => self.dispatch(event),
                        None => {
                            debug!("all migration handles dropped");
                            break;
                        }
                    }
                }
                _ = async {
                    match deadline {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    let now = Instant::now().into_std();
                    trace!("migration alarm due");
                    self.manager.on_alarm(now);
                }
            }
        }
        self.manager
    }

    fn dispatch(&mut self, event: MigrationEvent) {
        let now = Instant::now().into_std();
        match event {
            MigrationEvent::NetworkDisconnected(network) => {
                self.manager.on_network_disconnected(network, now)
            }
            MigrationEvent::NetworkConnected(network) => {
                self.manager.on_network_connected(network, now)
            }
            MigrationEvent::NetworkMadeDefault(network) => {
                self.manager.on_network_made_default(network, now)
            }
            MigrationEvent::PathDegrading => self.manager.on_path_degrading(now),
            MigrationEvent::WriteError(error_code) => {
                self.manager
                    .maybe_start_migrate_session_on_write_error(error_code, now);
            }
            MigrationEvent::ServerPreferredAddress(address) => {
                self.manager.on_server_preferred_address(address, now)
            }
            MigrationEvent::PathContextCreated { probe, result } => {
                self.manager.on_path_context_created(probe, result, now)
            }
            MigrationEvent::PathValidated { probe, success } => {
                self.manager.on_path_validation_result(probe, success, now)
            }
            MigrationEvent::Shutdown => {}
        }
    }
}
