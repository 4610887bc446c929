//! The client actor: owns the radio adapter and serializes every command.
//!
//! Because one task handles all commands in order, `DestroyClient` is atomic
//! with respect to scans and connects: they observe either the initialized
//! client or the torn-down one.
//!
//! 客户端 actor：持有无线适配器并串行处理所有命令。
//!
//! 由于所有命令都由同一任务按顺序处理，`DestroyClient` 相对于扫描和连接是原子的：
//! 它们看到的要么是已初始化的客户端，要么是已拆除的客户端。

use super::command::ClientCommand;
use crate::{
    adapter::{AdapterProvider, DeviceId, RadioAdapter, SessionOf},
    config::Config,
    connection::{
        AttemptToken, ConnectionPool, ConnectionState, OnConnected, supervisor::Supervisor,
    },
    error::{Error, OnError, Result},
    message::{ConnectionRequest, ScanSettings, WireMessage},
    registry::DeviceRegistry,
    scan::{OnScanResult, ScanCoordinator},
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, info};

/// The actor that owns the adapter handle and all engine state.
///
/// 持有适配器句柄和全部引擎状态的 actor。
pub(crate) struct ClientEventLoop<P: AdapterProvider> {
    pub(crate) provider: P,
    /// `None` until `CreateClient`, and again after `DestroyClient`.
    /// 在 `CreateClient` 之前以及 `DestroyClient` 之后为 `None`。
    pub(crate) adapter: Option<Arc<P::Adapter>>,
    pub(crate) scanner: ScanCoordinator,
    pub(crate) pool: Arc<ConnectionPool<SessionOf<P>>>,
    pub(crate) registry: Arc<DeviceRegistry>,
    pub(crate) config: Arc<Config>,
    pub(crate) next_attempt: u64,
    pub(crate) command_rx: mpsc::Receiver<ClientCommand>,
}

impl<P: AdapterProvider> ClientEventLoop<P> {
    /// Runs the actor until every handle has been dropped, then tears down.
    ///
    /// 运行 actor 直到所有句柄都被丢弃，然后执行拆除。
    pub(crate) async fn run(&mut self) {
        while let Some(command) = self.command_rx.recv().await {
            debug!(command = ?command, "Handling client command");
            self.handle_command(command).await;
        }
        self.shutdown();
        debug!("Client event loop stopped");
    }

    async fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::CreateClient { response_tx } => {
                let result = self.initialize().await;
                let _ = response_tx.send(result);
            }
            ClientCommand::DestroyClient { response_tx } => {
                self.shutdown();
                let _ = response_tx.send(());
            }
            ClientCommand::IsReady { response_tx } => {
                let _ = response_tx.send(self.adapter.is_some());
            }
            ClientCommand::StartScan {
                payload,
                on_result,
                on_error,
            } => self.start_scan(payload, on_result, on_error),
            ClientCommand::StopScan { response_tx } => {
                let _ = response_tx.send(self.scanner.stop());
            }
            ClientCommand::IsScanning { response_tx } => {
                let _ = response_tx.send(self.scanner.is_scanning());
            }
            ClientCommand::Connect {
                payload,
                on_success,
                on_error,
            } => self.connect(payload, on_success, on_error),
            ClientCommand::CancelConnection {
                device,
                response_tx,
            } => {
                let _ = response_tx.send(self.cancel_connection(&device));
            }
        }
    }

    /// Acquires the adapter. Re-initializing swaps the handle but leaves the
    /// pool untouched.
    ///
    /// 获取适配器。重新初始化会替换句柄，但不会改动连接池。
    async fn initialize(&mut self) -> Result<()> {
        let adapter = self
            .provider
            .acquire()
            .await
            .map_err(Error::AdapterUnavailable)?;
        if self.adapter.replace(Arc::new(adapter)).is_some() {
            info!("Radio adapter re-acquired, previous handle replaced");
        } else {
            info!("Radio adapter acquired");
        }
        Ok(())
    }

    /// Tears the client down in a fixed order: scan, pool, registry, adapter.
    ///
    /// 按固定顺序拆除客户端：扫描、连接池、注册表、适配器。
    fn shutdown(&mut self) {
        let scan_stopped = self.scanner.stop();
        let released = self.pool.clear();
        self.registry.clear();
        let had_adapter = self.adapter.take().is_some();
        info!(
            scan_stopped = scan_stopped,
            released = released,
            had_adapter = had_adapter,
            "Client destroyed"
        );
    }

    fn start_scan(&mut self, payload: Bytes, on_result: OnScanResult, on_error: OnError) {
        let Some(adapter) = self.adapter.clone() else {
            debug!("Scan requested before the client was created");
            on_error(Error::NotInitialized);
            return;
        };
        let settings = match ScanSettings::decode(&payload) {
            Ok(settings) => settings,
            Err(e) => {
                debug!(error = %e, "Rejecting scan settings");
                on_error(e);
                return;
            }
        };
        self.scanner.start(adapter, settings, on_result, on_error);
    }

    /// Validates a connect request and spawns its supervisor. Nothing is
    /// mutated unless the client is ready, the payload is valid, and the
    /// adapter knows the device.
    ///
    /// 校验连接请求并生成其监督任务。只有在客户端就绪、载荷有效且适配器认识该设备时才会改动状态。
    fn connect(&mut self, payload: Bytes, on_success: OnConnected, on_error: OnError) {
        let Some(adapter) = self.adapter.clone() else {
            debug!("Connect requested before the client was created");
            on_error(Error::NotInitialized);
            return;
        };
        let request = match ConnectionRequest::decode(&payload) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "Rejecting connection request");
                on_error(e);
                return;
            }
        };
        let device = request.device_id();
        let Some(peripheral) = adapter.peripheral(&device) else {
            debug!(device = %device, "Adapter does not know the device");
            on_error(Error::DeviceNotFound(device));
            return;
        };

        self.next_attempt += 1;
        let (token, cancel_rx) =
            AttemptToken::new(self.next_attempt, device.clone(), on_success, on_error);
        self.pool.replace_attempt(token.clone());
        self.registry.transition(&device, ConnectionState::Connecting);

        let deadline = self
            .config
            .connection
            .connect_timeout
            .map(|timeout| Instant::now() + timeout);
        let supervisor = Supervisor {
            adapter,
            pool: self.pool.clone(),
            registry: self.registry.clone(),
            token,
            cancel_rx,
            deadline,
        };
        tokio::spawn(supervisor.run(
            peripheral,
            request.is_auto_connect,
            request.requested_mtu(self.config.connection.max_mtu),
        ));
    }

    /// Releases whatever the pool holds for `device` without invoking any
    /// callback. Returns whether anything was held.
    ///
    /// 释放连接池中 `device` 的条目，不调用任何回调。返回是否存在条目。
    fn cancel_connection(&mut self, device: &DeviceId) -> Result<bool> {
        if self.adapter.is_none() {
            return Err(Error::NotInitialized);
        }
        match self.pool.remove(device) {
            Some(phase) => {
                self.registry
                    .transition(device, ConnectionState::Disconnected);
                info!(device = %device, phase = %phase, "Connection cancelled by caller");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
