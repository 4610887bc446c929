//! tests/common/harness.rs
#![allow(dead_code)]

use async_trait::async_trait;
use ble_central::{
    AdapterError, AdapterProvider, BleClient, Config, ConnectionState, DeviceId, Error,
    LinkSession, PeripheralDevice, RadioAdapter,
    adapter::{AdapterResult, Advertisement, AdvertisementStream},
    message::{ConnectedDeviceMessage, ScanResultMessage, ScanSettings},
    registry::StateChange,
};
use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc, Once,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::{Notify, broadcast, mpsc, oneshot};

/// MTU every mock link comes up with.
pub const LINK_MTU: u16 = 23;

/// Initializes tracing for tests, ensuring it's only done once.
pub fn init_tracing() {
    static TRACING_INIT: Once = Once::new();
    TRACING_INIT.call_once(|| {
        let filter =
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ble_central=debug".to_string());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .init();
    });
}

/// Awaits `fut`, failing the test instead of hanging forever.
pub async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out waiting for the client")
}

// ---------------------------------------------------------------------------
// Scriptable radio
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum ConnectBehavior {
    /// The link comes up as soon as it is requested.
    Immediate,
    /// The test decides through a `PendingConnect`.
    Gated,
    Fail(AdapterError),
}

#[derive(Debug, Clone)]
pub enum MtuBehavior {
    Grant,
    Fail(AdapterError),
    Hang,
}

#[derive(Debug, Clone)]
struct DeviceScript {
    name: Option<String>,
    connect: ConnectBehavior,
    mtu: MtuBehavior,
}

/// A gated link request waiting for the test to answer it.
pub struct PendingConnect {
    pub device: DeviceId,
    pub auto_connect: bool,
    respond: oneshot::Sender<AdapterResult<()>>,
}

impl PendingConnect {
    /// Brings the link up. Returns `false` if the attempt was already dropped.
    pub fn succeed(self) -> bool {
        self.respond.send(Ok(())).is_ok()
    }

    pub fn fail(self, error: AdapterError) -> bool {
        self.respond.send(Err(error)).is_ok()
    }

    /// Resolves once the client has dropped the establish request.
    pub async fn abandoned(&mut self) {
        within(self.respond.closed()).await;
    }
}

/// A `disconnect` call observed by the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    pub device: DeviceId,
    pub session: u64,
}

struct MockState {
    devices: Mutex<HashMap<DeviceId, DeviceScript>>,
    links: Mutex<HashMap<DeviceId, Arc<Notify>>>,
    supports_mtu: AtomicBool,
    acquire_fails: AtomicBool,
    scan_fails: AtomicBool,
    acquisitions: AtomicUsize,
    next_session: AtomicU64,
    pending_tx: mpsc::UnboundedSender<PendingConnect>,
    scan_tx: mpsc::UnboundedSender<mpsc::Sender<AdapterResult<Advertisement>>>,
    disconnect_tx: mpsc::UnboundedSender<Disconnect>,
}

pub struct MockPeripheral {
    id: DeviceId,
    name: Option<String>,
}

impl PeripheralDevice for MockPeripheral {
    fn id(&self) -> &DeviceId {
        &self.id
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }
}

pub struct MockSession {
    pub id: u64,
    pub device: DeviceId,
    mtu: u16,
    lost: Arc<Notify>,
}

#[async_trait]
impl LinkSession for MockSession {
    fn mtu(&self) -> u16 {
        self.mtu
    }

    async fn closed(&self) {
        self.lost.notified().await;
    }
}

pub struct MockAdapter {
    state: Arc<MockState>,
}

impl MockAdapter {
    fn script(&self, device: &DeviceId) -> Option<DeviceScript> {
        self.state.devices.lock().get(device).cloned()
    }

    fn open_session(&self, device: &DeviceId) -> MockSession {
        let lost = Arc::new(Notify::new());
        self.state.links.lock().insert(device.clone(), lost.clone());
        MockSession {
            id: self.state.next_session.fetch_add(1, Ordering::SeqCst) + 1,
            device: device.clone(),
            mtu: LINK_MTU,
            lost,
        }
    }
}

#[async_trait]
impl RadioAdapter for MockAdapter {
    type Peripheral = MockPeripheral;
    type Session = MockSession;

    async fn start_scan(&self, _settings: &ScanSettings) -> AdapterResult<AdvertisementStream> {
        if self.state.scan_fails.load(Ordering::SeqCst) {
            return Err(AdapterError::Unavailable("scanner busy".to_string()));
        }
        let (tx, rx) = mpsc::channel(16);
        let _ = self.state.scan_tx.send(tx);
        Ok(rx)
    }

    fn peripheral(&self, id: &DeviceId) -> Option<MockPeripheral> {
        self.script(id).map(|script| MockPeripheral {
            id: id.clone(),
            name: script.name,
        })
    }

    async fn establish_connection(
        &self,
        peripheral: &MockPeripheral,
        auto_connect: bool,
    ) -> AdapterResult<MockSession> {
        let script = self.script(&peripheral.id).ok_or(AdapterError::LinkLost)?;
        match script.connect {
            ConnectBehavior::Immediate => {}
            ConnectBehavior::Fail(e) => return Err(e),
            ConnectBehavior::Gated => {
                let (respond, outcome) = oneshot::channel();
                let _ = self.state.pending_tx.send(PendingConnect {
                    device: peripheral.id.clone(),
                    auto_connect,
                    respond,
                });
                outcome
                    .await
                    .map_err(|_| AdapterError::Platform("connect abandoned".to_string()))??;
            }
        }
        Ok(self.open_session(&peripheral.id))
    }

    fn supports_mtu_negotiation(&self) -> bool {
        self.state.supports_mtu.load(Ordering::SeqCst)
    }

    async fn negotiate_mtu(&self, session: &MockSession, mtu: u16) -> AdapterResult<u16> {
        let script = self.script(&session.device).ok_or(AdapterError::LinkLost)?;
        match script.mtu {
            MtuBehavior::Grant => Ok(mtu),
            MtuBehavior::Fail(e) => Err(e),
            MtuBehavior::Hang => std::future::pending::<AdapterResult<u16>>().await,
        }
    }

    async fn disconnect(&self, session: &MockSession) -> AdapterResult<()> {
        let _ = self.state.disconnect_tx.send(Disconnect {
            device: session.device.clone(),
            session: session.id,
        });
        Ok(())
    }
}

pub struct MockProvider {
    state: Arc<MockState>,
}

#[async_trait]
impl AdapterProvider for MockProvider {
    type Adapter = MockAdapter;

    async fn acquire(&self) -> AdapterResult<MockAdapter> {
        if self.state.acquire_fails.load(Ordering::SeqCst) {
            return Err(AdapterError::Unavailable("bluetooth is off".to_string()));
        }
        self.state.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(MockAdapter {
            state: self.state.clone(),
        })
    }
}

/// The test's side of the mock radio.
pub struct MockRadio {
    state: Arc<MockState>,
    pending_rx: mpsc::UnboundedReceiver<PendingConnect>,
    scan_rx: mpsc::UnboundedReceiver<mpsc::Sender<AdapterResult<Advertisement>>>,
    disconnect_rx: mpsc::UnboundedReceiver<Disconnect>,
}

impl MockRadio {
    pub fn new() -> (Self, MockProvider) {
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        let (scan_tx, scan_rx) = mpsc::unbounded_channel();
        let (disconnect_tx, disconnect_rx) = mpsc::unbounded_channel();
        let state = Arc::new(MockState {
            devices: Mutex::new(HashMap::new()),
            links: Mutex::new(HashMap::new()),
            supports_mtu: AtomicBool::new(true),
            acquire_fails: AtomicBool::new(false),
            scan_fails: AtomicBool::new(false),
            acquisitions: AtomicUsize::new(0),
            next_session: AtomicU64::new(0),
            pending_tx,
            scan_tx,
            disconnect_tx,
        });
        let radio = Self {
            state: state.clone(),
            pending_rx,
            scan_rx,
            disconnect_rx,
        };
        (radio, MockProvider { state })
    }

    pub fn add_device(
        &self,
        id: &str,
        name: Option<&str>,
        connect: ConnectBehavior,
        mtu: MtuBehavior,
    ) {
        self.state.devices.lock().insert(
            DeviceId::from(id),
            DeviceScript {
                name: name.map(str::to_string),
                connect,
                mtu,
            },
        );
    }

    /// A device that connects at once and grants any MTU.
    pub fn add_ready_device(&self, id: &str) {
        self.add_device(id, None, ConnectBehavior::Immediate, MtuBehavior::Grant);
    }

    pub fn set_mtu_support(&self, supported: bool) {
        self.state.supports_mtu.store(supported, Ordering::SeqCst);
    }

    pub fn fail_acquire(&self, fail: bool) {
        self.state.acquire_fails.store(fail, Ordering::SeqCst);
    }

    pub fn fail_scans(&self, fail: bool) {
        self.state.scan_fails.store(fail, Ordering::SeqCst);
    }

    pub fn acquisitions(&self) -> usize {
        self.state.acquisitions.load(Ordering::SeqCst)
    }

    /// Simulates the platform dropping the most recent link to `id`.
    pub fn drop_link(&self, id: &str) -> bool {
        match self.state.links.lock().get(&DeviceId::from(id)) {
            Some(lost) => {
                lost.notify_one();
                true
            }
            None => false,
        }
    }

    pub async fn next_pending(&mut self) -> PendingConnect {
        within(self.pending_rx.recv())
            .await
            .expect("pending connect channel closed")
    }

    pub fn has_pending(&mut self) -> bool {
        !self.pending_rx.is_empty()
    }

    pub async fn next_scan(&mut self) -> ScanFeed {
        let tx = within(self.scan_rx.recv())
            .await
            .expect("scan channel closed");
        ScanFeed { tx }
    }

    pub fn has_scan(&mut self) -> bool {
        !self.scan_rx.is_empty()
    }

    pub async fn next_disconnect(&mut self) -> Disconnect {
        within(self.disconnect_rx.recv())
            .await
            .expect("disconnect channel closed")
    }

    pub fn has_disconnect(&mut self) -> bool {
        !self.disconnect_rx.is_empty()
    }
}

/// The adapter side of one scan subscription.
pub struct ScanFeed {
    tx: mpsc::Sender<AdapterResult<Advertisement>>,
}

impl ScanFeed {
    /// Emits an advertisement. Returns `false` once the subscription is gone.
    pub async fn advertise(&self, device: &str, rssi: i16) -> bool {
        let advertisement = Advertisement {
            device: DeviceId::from(device),
            name: Some(format!("sensor-{device}")),
            rssi,
            payload: Bytes::from_static(&[0x02, 0x01, 0x06]),
        };
        self.tx.send(Ok(advertisement)).await.is_ok()
    }

    pub async fn fail(&self, error: AdapterError) -> bool {
        self.tx.send(Err(error)).await.is_ok()
    }

    /// Resolves once the client has dropped the stream.
    pub async fn closed(&self) {
        within(self.tx.closed()).await;
    }
}

// ---------------------------------------------------------------------------
// Client construction
// ---------------------------------------------------------------------------

pub fn spawn_client(config: Config) -> (BleClient<MockProvider>, MockRadio) {
    init_tracing();
    let (radio, provider) = MockRadio::new();
    (BleClient::spawn(provider, config), radio)
}

/// A client that has already acquired its adapter.
pub async fn ready_client() -> (BleClient<MockProvider>, MockRadio) {
    ready_client_with(Config::default()).await
}

pub async fn ready_client_with(config: Config) -> (BleClient<MockProvider>, MockRadio) {
    let (client, radio) = spawn_client(config);
    client.create_client().await.unwrap();
    (client, radio)
}

pub fn connect_request(mac: &str, mtu: i32) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "macAddress": mac,
        "isAutoConnect": false,
        "requestMtu": mtu,
    }))
    .unwrap()
}

pub fn scan_settings() -> Vec<u8> {
    br#"{"scanMode":"lowLatency","serviceUuids":["180d"]}"#.to_vec()
}

pub async fn wait_for_state(
    events: &mut broadcast::Receiver<StateChange>,
    device: &DeviceId,
    state: ConnectionState,
) {
    within(async {
        loop {
            let change = events.recv().await.expect("state channel closed");
            if &change.device == device && change.to == state {
                return;
            }
        }
    })
    .await
}

// ---------------------------------------------------------------------------
// Callback watchers
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConnectOutcome {
    Connected(ConnectedDeviceMessage),
    Failed(Error),
}

/// Collects what a connect attempt reports. The channel closes once the
/// client has dropped both callbacks.
pub struct ConnectWatch {
    rx: mpsc::UnboundedReceiver<ConnectOutcome>,
}

pub fn connect_watch() -> (
    impl FnOnce(ConnectedDeviceMessage) + Send + 'static,
    impl FnOnce(Error) + Send + 'static,
    ConnectWatch,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let success_tx = tx.clone();
    let on_success = move |message: ConnectedDeviceMessage| {
        let _ = success_tx.send(ConnectOutcome::Connected(message));
    };
    let on_error = move |error: Error| {
        let _ = tx.send(ConnectOutcome::Failed(error));
    };
    (on_success, on_error, ConnectWatch { rx })
}

impl ConnectWatch {
    pub async fn next(&mut self) -> Option<ConnectOutcome> {
        within(self.rx.recv()).await
    }

    pub async fn connected(&mut self) -> ConnectedDeviceMessage {
        match self.next().await {
            Some(ConnectOutcome::Connected(message)) => message,
            other => panic!("expected a connection, got {other:?}"),
        }
    }

    pub async fn failed(&mut self) -> Error {
        match self.next().await {
            Some(ConnectOutcome::Failed(error)) => error,
            other => panic!("expected an error, got {other:?}"),
        }
    }

    /// Asserts nothing more will ever be reported.
    pub async fn assert_silent(&mut self) {
        let outcome = self.next().await;
        assert!(outcome.is_none(), "unexpected callback: {outcome:?}");
    }
}

#[derive(Debug)]
pub enum ScanEvent {
    Result(ScanResultMessage),
    Failed(Error),
}

pub struct ScanWatch {
    rx: mpsc::UnboundedReceiver<ScanEvent>,
}

pub fn scan_watch() -> (
    impl FnMut(ScanResultMessage) + Send + 'static,
    impl FnOnce(Error) + Send + 'static,
    ScanWatch,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let result_tx = tx.clone();
    let on_result = move |result: ScanResultMessage| {
        let _ = result_tx.send(ScanEvent::Result(result));
    };
    let on_error = move |error: Error| {
        let _ = tx.send(ScanEvent::Failed(error));
    };
    (on_result, on_error, ScanWatch { rx })
}

impl ScanWatch {
    pub async fn next(&mut self) -> Option<ScanEvent> {
        within(self.rx.recv()).await
    }

    pub async fn result(&mut self) -> ScanResultMessage {
        match self.next().await {
            Some(ScanEvent::Result(result)) => result,
            other => panic!("expected a scan result, got {other:?}"),
        }
    }

    pub async fn failed(&mut self) -> Error {
        match self.next().await {
            Some(ScanEvent::Failed(error)) => error,
            other => panic!("expected a scan error, got {other:?}"),
        }
    }

    pub async fn assert_silent(&mut self) {
        let event = self.next().await;
        assert!(event.is_none(), "unexpected scan event: {event:?}");
    }
}
