//! Driver tests on a paused tokio clock.

#![cfg(feature = "runtime")]

mod common;

use std::time::Duration;

use nomad_roam::core::{MigrationError, PathValidator};
use nomad_roam::migration::{
    MigrationCause, MigrationConfig, MigrationManager, PathValidationContext, ProbeId, ProbeKind,
};
use nomad_roam::runtime::{DriverStopped, MigrationDriver, MigrationHandle};

use common::*;

/// Validator that answers every challenge through the driver's channel.
#[derive(Debug)]
struct LoopbackValidator {
    handle: MigrationHandle,
    started: Vec<ProbeId>,
}

impl PathValidator for LoopbackValidator {
    fn start_validation(&mut self, probe: ProbeId, _context: &PathValidationContext) {
        self.started.push(probe);
        self.handle.path_validated(probe, true).unwrap();
    }

    fn cancel_validation(&mut self, _probe: ProbeId) {}
}

type LoopbackManager = MigrationManager<MockSession, MockFactory, LoopbackValidator>;

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

fn loopback_driver(
    session: MockSession,
) -> (
    MigrationDriver<MockSession, MockFactory, LoopbackValidator>,
    MigrationHandle,
) {
    let (handle, events) = MigrationHandle::channel();
    let validator = LoopbackValidator {
        handle: handle.clone(),
        started: Vec::new(),
    };
    let manager: LoopbackManager = MigrationManager::new(
        MigrationConfig::default(),
        WIFI,
        session,
        MockFactory::new(FactoryMode::Sync),
        validator,
    );
    (MigrationDriver::with_receiver(manager, events), handle)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn test_driver_migrates_on_disconnect() {
    let (driver, handle) = loopback_driver(MockSession::new(now()));
    let task = tokio::spawn(driver.run());

    handle.network_disconnected(WIFI).unwrap();
    settle().await;
    handle.shutdown().unwrap();

    let manager = task.await.unwrap();
    assert_eq!(manager.current_network(), CELLULAR);
    assert_eq!(manager.validator().started.len(), 1);
    assert!(!manager.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_driver_write_error_runs_on_next_turn() {
    let (driver, handle) = loopback_driver(MockSession::new(now()));
    let task = tokio::spawn(driver.run());

    handle.write_error(-104).unwrap();
    handle.write_error(-105).unwrap();
    settle().await;
    handle.shutdown().unwrap();

    let manager = task.await.unwrap();
    assert_eq!(manager.factory().requests.len(), 1);
    assert_eq!(manager.last_write_error(), Some(-105));
    assert_eq!(manager.current_network(), CELLULAR);
}

#[tokio::test(start_paused = true)]
async fn test_driver_closes_when_no_network_appears() {
    let start = tokio::time::Instant::now();
    let mut session = MockSession::new(now());
    session.alternate = WIFI;
    let (driver, handle) = loopback_driver(session);
    let task = tokio::spawn(driver.run());

    handle.network_disconnected(WIFI).unwrap();

    // The driver stops by itself once the wait alarm closes the connection.
    let manager = task.await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(10));
    assert_eq!(
        manager.close_error(),
        Some(&MigrationError::NoNewNetwork {
            cause: MigrationCause::Disconnected
        })
    );
    assert_eq!(handle.path_degrading(), Err(DriverStopped));
    assert!(handle.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_driver_migrates_back_on_alarm() {
    let (driver, handle) = loopback_driver(MockSession::new(now()));
    let task = tokio::spawn(driver.run());

    handle.path_degrading().unwrap();
    settle().await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    handle.shutdown().unwrap();

    let manager = task.await.unwrap();
    assert_eq!(manager.current_network(), WIFI);
    assert_eq!(manager.stats().network_migrations, 2);
    assert_eq!(manager.stats().migrations_back_to_default, 1);
    assert_eq!(manager.in_flight_probe().map(|(_, kind)| kind), None::<ProbeKind>);
    assert_eq!(manager.next_alarm_deadline(), None);
}

#[tokio::test(start_paused = true)]
async fn test_driver_stops_when_handles_dropped() {
    let manager = manager(MigrationConfig::default(), now());
    let (driver, handle) = MigrationDriver::new(manager);
    let task = tokio::spawn(driver.run());

    drop(handle);

    let manager = task.await.unwrap();
    assert!(!manager.is_closed());
    assert_eq!(manager.current_network(), WIFI);
}
