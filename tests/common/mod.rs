//! Recording collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use nomad_roam::core::{
    CloseCode, MigrationSession, PacketWriter, PathContextError, PathContextFactory,
    PathValidator,
};
use nomad_roam::migration::{
    ConnectionId, CreationOutcome, MigrationCause, MigrationConfig, MigrationManager,
    NetworkHandle, NewConnectionIdFrame, PathContextRequest, PathValidationContext,
    PeerConnectionIdPool, ProbeId,
};

pub const WIFI: NetworkHandle = NetworkHandle::new(1);
pub const CELLULAR: NetworkHandle = NetworkHandle::new(2);
pub const ETHERNET: NetworkHandle = NetworkHandle::new(3);

pub const PEER_PORT: u16 = 443;

pub fn peer_address() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7)), PEER_PORT)
}

pub fn preferred_address() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 99)), PEER_PORT)
}

/// Local address the mock factory hands out for `network` / `port`.
pub fn local_address(network: NetworkHandle, port: u16) -> SocketAddr {
    SocketAddr::new(
        IpAddr::V4(Ipv4Addr::new(10, 0, network.raw() as u8, 2)),
        port,
    )
}

pub fn connection_id(byte: u8) -> ConnectionId {
    ConnectionId::new(&[byte; 8]).unwrap()
}

// =============================================================================
// Writer
// =============================================================================

#[derive(Debug)]
pub struct MockWriter {
    pub local: SocketAddr,
    pub sent: Vec<(Vec<u8>, SocketAddr)>,
}

impl PacketWriter for MockWriter {
    fn local_address(&self) -> SocketAddr {
        self.local
    }

    fn write_packet(&mut self, buf: &[u8], peer: SocketAddr) -> io::Result<usize> {
        self.sent.push((buf.to_vec(), peer));
        Ok(buf.len())
    }
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    NoNewNetwork,
    PrepareForProbing(NetworkHandle),
    PrepareForMigration(NetworkHandle),
    MigrationDone {
        network: NetworkHandle,
        self_address: SocketAddr,
        peer_address: SocketAddr,
        success: bool,
    },
    ToBeClosed(MigrationCause, CloseCode),
    ResetNonMigratableStreams,
    Closed(CloseCode, String),
    StartDraining,
}

#[derive(Debug)]
pub struct MockSession {
    pub active_streams: bool,
    pub last_stream_close: Instant,
    pub pending_path_validation: bool,
    pub handshake_confirmed: bool,
    pub peer_disabled_migration: bool,
    pub refuse_migration: bool,
    pub alternate: NetworkHandle,
    pub self_address: SocketAddr,
    pub peer_address: SocketAddr,
    pub writer_local: Option<SocketAddr>,
    pub cids: PeerConnectionIdPool,
    pub events: Vec<SessionEvent>,
}

impl MockSession {
    pub fn new(now: Instant) -> Self {
        let mut cids = PeerConnectionIdPool::with_limit(connection_id(0), 32);
        for sequence in 1..=16u8 {
            cids.on_new_connection_id_frame(NewConnectionIdFrame {
                sequence: u64::from(sequence),
                retire_prior_to: 0,
                connection_id: connection_id(sequence),
                stateless_reset_token: [sequence; 16],
            })
            .unwrap();
        }
        Self {
            active_streams: true,
            last_stream_close: now,
            pending_path_validation: false,
            handshake_confirmed: true,
            peer_disabled_migration: false,
            refuse_migration: false,
            alternate: CELLULAR,
            self_address: local_address(WIFI, 5000),
            peer_address: peer_address(),
            writer_local: None,
            cids,
            events: Vec::new(),
        }
    }

    pub fn count(&self, event: &SessionEvent) -> usize {
        self.events.iter().filter(|e| *e == event).count()
    }

    pub fn migrations(&self, success: bool) -> Vec<NetworkHandle> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::MigrationDone {
                    network,
                    success: s,
                    ..
                } if *s == success => Some(*network),
                _ => None,
            })
            .collect()
    }

    pub fn closed_with(&self) -> Option<(CloseCode, String)> {
        self.events.iter().find_map(|e| match e {
            SessionEvent::Closed(code, reason) => Some((*code, reason.clone())),
            _ => None,
        })
    }
}

impl MigrationSession for MockSession {
    fn has_active_migratable_streams(&self) -> bool {
        self.active_streams
    }

    fn time_since_last_stream_close(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_stream_close)
    }

    fn has_pending_path_validation(&self) -> bool {
        self.pending_path_validation
    }

    fn is_handshake_confirmed(&self) -> bool {
        self.handshake_confirmed
    }

    fn peer_disabled_active_migration(&self) -> bool {
        self.peer_disabled_migration
    }

    fn self_address(&self) -> SocketAddr {
        self.self_address
    }

    fn peer_address(&self) -> SocketAddr {
        self.peer_address
    }

    fn find_alternate_network(&self, current: NetworkHandle) -> NetworkHandle {
        if self.alternate == current {
            NetworkHandle::INVALID
        } else {
            self.alternate
        }
    }

    fn peer_connection_ids(&mut self) -> &mut PeerConnectionIdPool {
        &mut self.cids
    }

    fn on_no_new_network_for_migration(&mut self) {
        self.events.push(SessionEvent::NoNewNetwork);
    }

    fn prepare_for_probing_on_path(&mut self, context: &PathValidationContext) {
        self.events
            .push(SessionEvent::PrepareForProbing(context.network()));
    }

    fn prepare_for_migration_to_path(&mut self, context: &PathValidationContext) -> bool {
        self.events
            .push(SessionEvent::PrepareForMigration(context.network()));
        !self.refuse_migration
    }

    fn on_migration_to_path_done(&mut self, context: PathValidationContext, success: bool) {
        self.events.push(SessionEvent::MigrationDone {
            network: context.network(),
            self_address: context.self_address(),
            peer_address: context.peer_address(),
            success,
        });
        if success {
            self.self_address = context.self_address();
            self.peer_address = context.peer_address();
            self.writer_local = Some(context.into_writer().local_address());
        }
    }

    fn on_connection_to_be_closed_due_to_migration_error(
        &mut self,
        cause: MigrationCause,
        code: CloseCode,
    ) {
        self.events.push(SessionEvent::ToBeClosed(cause, code));
    }

    fn reset_non_migratable_streams(&mut self) {
        self.events.push(SessionEvent::ResetNonMigratableStreams);
    }

    fn close_connection(&mut self, code: CloseCode, reason: &str) {
        self.events
            .push(SessionEvent::Closed(code, reason.to_string()));
    }

    fn start_draining(&mut self) {
        self.events.push(SessionEvent::StartDraining);
    }
}

// =============================================================================
// Factory
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryMode {
    /// Complete on the same stack.
    Sync,
    /// Return `Pending`; the test completes the request.
    Async,
}

#[derive(Debug)]
pub struct MockFactory {
    pub mode: FactoryMode,
    pub unreachable: HashSet<NetworkHandle>,
    pub requests: Vec<PathContextRequest>,
    pub cancelled: Vec<ProbeId>,
    next_port: u16,
}

impl MockFactory {
    pub fn new(mode: FactoryMode) -> Self {
        Self {
            mode,
            unreachable: HashSet::new(),
            requests: Vec::new(),
            cancelled: Vec::new(),
            next_port: 6000,
        }
    }

    /// Build the context a request would produce. Each call binds a new port.
    pub fn build(
        &mut self,
        request: &PathContextRequest,
    ) -> Result<PathValidationContext, PathContextError> {
        if self.unreachable.contains(&request.network) {
            return Err(PathContextError::NoRoute(request.network));
        }
        let port = self.next_port;
        self.next_port += 1;
        let local = local_address(request.network, port);
        Ok(PathValidationContext::new(
            local,
            request.peer_address,
            request.network,
            Box::new(MockWriter {
                local,
                sent: Vec::new(),
            }),
        ))
    }

    pub fn last_request(&self) -> PathContextRequest {
        *self.requests.last().unwrap()
    }
}

impl PathContextFactory for MockFactory {
    fn create_path_context(&mut self, request: PathContextRequest) -> CreationOutcome {
        self.requests.push(request);
        match self.mode {
            FactoryMode::Sync => CreationOutcome::Ready(self.build(&request)),
            FactoryMode::Async => CreationOutcome::Pending,
        }
    }

    fn cancel_request(&mut self, probe: ProbeId) {
        self.cancelled.push(probe);
    }
}

// =============================================================================
// Validator
// =============================================================================

#[derive(Debug, Default)]
pub struct MockValidator {
    pub started: Vec<(ProbeId, NetworkHandle, SocketAddr)>,
    pub cancelled: Vec<ProbeId>,
}

impl PathValidator for MockValidator {
    fn start_validation(&mut self, probe: ProbeId, context: &PathValidationContext) {
        assert!(
            context.peer_connection_id().is_some(),
            "probe started without a fresh connection id"
        );
        self.started
            .push((probe, context.network(), context.self_address()));
    }

    fn cancel_validation(&mut self, probe: ProbeId) {
        self.cancelled.push(probe);
    }
}

// =============================================================================
// Helpers
// =============================================================================

pub type Manager = MigrationManager<MockSession, MockFactory, MockValidator>;

pub fn manager(config: MigrationConfig, now: Instant) -> Manager {
    manager_with(config, FactoryMode::Sync, now)
}

pub fn manager_with(config: MigrationConfig, mode: FactoryMode, now: Instant) -> Manager {
    MigrationManager::new(
        config,
        WIFI,
        MockSession::new(now),
        MockFactory::new(mode),
        MockValidator::default(),
    )
}

/// Id of the in-flight probe.
pub fn probe(manager: &Manager) -> ProbeId {
    manager.in_flight_probe().expect("no probe in flight").0
}

/// Succeed the in-flight validation.
pub fn validate(manager: &mut Manager, now: Instant) {
    let id = probe(manager);
    manager.on_path_validation_result(id, true, now);
}

/// Fail the in-flight validation.
pub fn fail(manager: &mut Manager, now: Instant) {
    let id = probe(manager);
    manager.on_path_validation_result(id, false, now);
}

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}
