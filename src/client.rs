//! The user-facing API of the connection engine.
//!
//! `BleClient` is a cheap, cloneable handle to a background actor. Every
//! mutating operation is a command processed in order by that actor; the
//! read-only queries look at the shared pool and registry directly.
//!
//! 连接引擎面向用户的 API。
//!
//! `BleClient` 是指向后台 actor 的轻量、可克隆句柄。每个修改类操作都是由该 actor
//! 按顺序处理的命令；只读查询直接读取共享的连接池和注册表。

use crate::{
    adapter::{AdapterProvider, DeviceId, SessionOf},
    config::Config,
    connection::{ConnectionPool, ConnectionState},
    error::{Error, Result},
    message::{ConnectedDeviceMessage, ScanResultMessage},
    registry::{DeviceRegistry, StateChange},
    scan::ScanCoordinator,
};
use bytes::Bytes;
use command::ClientCommand;
use event_loop::ClientEventLoop;
use std::sync::Arc;
use tokio::sync::{
    broadcast,
    mpsc::{self, error::SendError},
    oneshot,
};
use tracing::info;

pub(crate) mod command;
pub(crate) mod event_loop;

/// A handle to the BLE client actor.
///
/// 指向 BLE 客户端 actor 的句柄。
pub struct BleClient<P: AdapterProvider> {
    command_tx: mpsc::Sender<ClientCommand>,
    pool: Arc<ConnectionPool<SessionOf<P>>>,
    registry: Arc<DeviceRegistry>,
}

impl<P: AdapterProvider> Clone for BleClient<P> {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            pool: self.pool.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<P: AdapterProvider> std::fmt::Debug for BleClient<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleClient")
            .field("connections", &self.pool.len())
            .field("tracked_devices", &self.registry.len())
            .finish()
    }
}

impl<P: AdapterProvider> BleClient<P> {
    /// Spawns the client actor on the current tokio runtime. The client
    /// starts uninitialized; call [`create_client`](Self::create_client)
    /// before scanning or connecting.
    ///
    /// 在当前 tokio 运行时上生成客户端 actor。客户端初始为未初始化状态；
    /// 扫描或连接之前请先调用 [`create_client`](Self::create_client)。
    pub fn spawn(provider: P, config: Config) -> Self {
        let (command_tx, command_rx) = mpsc::channel(config.client.command_channel_capacity.max(1));
        let pool = Arc::new(ConnectionPool::new());
        let registry = Arc::new(DeviceRegistry::new(config.client.state_event_capacity));

        let mut actor = ClientEventLoop {
            provider,
            adapter: None,
            scanner: ScanCoordinator::default(),
            pool: pool.clone(),
            registry: registry.clone(),
            config: Arc::new(config),
            next_attempt: 0,
            command_rx,
        };

        tokio::spawn(async move {
            actor.run().await;
        });
        info!("BLE client actor created and running");

        Self {
            command_tx,
            pool,
            registry,
        }
    }

    /// Acquires the radio adapter. Calling it again replaces the adapter
    /// handle without touching existing connections.
    ///
    /// 获取无线适配器。再次调用会替换适配器句柄，不影响已有连接。
    pub async fn create_client(&self) -> Result<()> {
        self.request(|response_tx| ClientCommand::CreateClient { response_tx })
            .await?
    }

    /// Stops the scan, releases every connection and attempt, clears the
    /// registry, and drops the adapter. Safe to call repeatedly.
    ///
    /// 停止扫描、释放所有连接和尝试、清空注册表并丢弃适配器。可以重复调用。
    pub async fn destroy_client(&self) -> Result<()> {
        self.request(|response_tx| ClientCommand::DestroyClient { response_tx })
            .await
    }

    pub async fn is_ready(&self) -> Result<bool> {
        self.request(|response_tx| ClientCommand::IsReady { response_tx })
            .await
    }

    /// Starts scanning with a JSON `ScanSettings` payload, replacing any
    /// running scan. Errors, including an invalid payload, arrive through
    /// `on_error`, after which the scan delivers nothing more.
    ///
    /// 使用 JSON 格式的 `ScanSettings` 载荷开始扫描，并替换正在运行的扫描。
    /// 错误（包括无效载荷）通过 `on_error` 送达，此后该扫描不再投递任何内容。
    pub async fn start_device_scan<R, E>(&self, payload: impl Into<Bytes>, on_result: R, on_error: E)
    where
        R: FnMut(ScanResultMessage) + Send + 'static,
        E: FnOnce(Error) + Send + 'static,
    {
        self.submit(ClientCommand::StartScan {
            payload: payload.into(),
            on_result: Box::new(on_result),
            on_error: Box::new(on_error),
        })
        .await;
    }

    /// Stops the active scan. Returns whether a scan was still running.
    ///
    /// 停止当前扫描。返回扫描是否仍在运行。
    pub async fn stop_device_scan(&self) -> Result<bool> {
        self.request(|response_tx| ClientCommand::StopScan { response_tx })
            .await
    }

    pub async fn is_scanning(&self) -> Result<bool> {
        self.request(|response_tx| ClientCommand::IsScanning { response_tx })
            .await
    }

    /// Connects to a device described by a JSON `ConnectionRequest` payload.
    ///
    /// Exactly one of the callbacks fires, unless a later request for the
    /// same device, [`cancel_device_connection`](Self::cancel_device_connection),
    /// or [`destroy_client`](Self::destroy_client) supersedes this attempt
    /// first, in which case neither does.
    ///
    /// 连接由 JSON 格式 `ConnectionRequest` 载荷描述的设备。
    ///
    /// 两个回调恰好触发其一，除非同一设备的后续请求、
    /// [`cancel_device_connection`](Self::cancel_device_connection) 或
    /// [`destroy_client`](Self::destroy_client) 先取代了此次尝试，此时两者都不会触发。
    pub async fn connect_to_device<S, E>(&self, payload: impl Into<Bytes>, on_success: S, on_error: E)
    where
        S: FnOnce(ConnectedDeviceMessage) + Send + 'static,
        E: FnOnce(Error) + Send + 'static,
    {
        self.submit(ClientCommand::Connect {
            payload: payload.into(),
            on_success: Box::new(on_success),
            on_error: Box::new(on_error),
        })
        .await;
    }

    /// Cancels the attempt for `device`, or disconnects it if it is ready.
    /// No callback of the cancelled attempt fires. Returns whether the pool
    /// held anything for the device.
    ///
    /// 取消 `device` 的连接尝试，若已就绪则断开连接。被取消尝试的回调不会触发。
    /// 返回连接池中是否持有该设备的条目。
    pub async fn cancel_device_connection(&self, device: &DeviceId) -> Result<bool> {
        let device = device.clone();
        self.request(|response_tx| ClientCommand::CancelConnection {
            device,
            response_tx,
        })
        .await?
    }

    /// Last-known state of `device`.
    ///
    /// `device` 最近已知的状态。
    pub fn connection_state(&self, device: &DeviceId) -> Option<ConnectionState> {
        self.registry.state(device)
    }

    /// The ready connection to `device`, if any.
    pub fn connection(&self, device: &DeviceId) -> Option<ConnectedDeviceMessage> {
        self.pool.handle(device).map(|handle| handle.to_message())
    }

    pub fn connected_devices(&self) -> Vec<DeviceId> {
        self.pool.connected_devices()
    }

    /// Subscribes to every recorded state transition.
    ///
    /// 订阅所有已记录的状态转换。
    pub fn subscribe_state_changes(&self) -> broadcast::Receiver<StateChange> {
        self.registry.subscribe()
    }

    async fn submit(&self, command: ClientCommand) {
        if let Err(SendError(command)) = self.command_tx.send(command).await {
            command.reject(Error::ChannelClosed);
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> ClientCommand,
    ) -> Result<T> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(make(response_tx))
            .await
            .map_err(|_| Error::ChannelClosed)?;
        response_rx.await.map_err(|_| Error::ChannelClosed)
    }
}
