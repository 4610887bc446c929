//! Commands sent from `BleClient` handles to the client actor.

use crate::{
    adapter::DeviceId,
    connection::OnConnected,
    error::{Error, OnError, Result},
    scan::OnScanResult,
};
use bytes::Bytes;
use std::fmt;
use tokio::sync::oneshot;

/// Commands sent to the `ClientEventLoop`.
///
/// Scan and connect commands carry the caller's callbacks and an undecoded
/// payload; the actor validates both before anything is mutated.
///
/// 发送到 `ClientEventLoop` 的命令。
///
/// 扫描和连接命令携带调用方的回调和未解码的载荷；actor 会在改动任何状态之前校验两者。
pub(crate) enum ClientCommand {
    /// Acquire (or re-acquire) the radio adapter.
    /// 获取（或重新获取）无线适配器。
    CreateClient {
        response_tx: oneshot::Sender<Result<()>>,
    },
    /// Stop scanning, release the pool, and drop the adapter.
    /// 停止扫描、释放连接池并丢弃适配器。
    DestroyClient { response_tx: oneshot::Sender<()> },
    IsReady { response_tx: oneshot::Sender<bool> },
    StartScan {
        payload: Bytes,
        on_result: OnScanResult,
        on_error: OnError,
    },
    StopScan { response_tx: oneshot::Sender<bool> },
    IsScanning { response_tx: oneshot::Sender<bool> },
    Connect {
        payload: Bytes,
        on_success: OnConnected,
        on_error: OnError,
    },
    /// Cancel an attempt or disconnect a ready device without callbacks.
    /// 取消尝试或断开已就绪设备，不触发回调。
    CancelConnection {
        device: DeviceId,
        response_tx: oneshot::Sender<Result<bool>>,
    },
}

impl ClientCommand {
    /// Fails a command that never reached the actor. Callback-carrying
    /// commands report through `on_error`; the others drop their responder,
    /// which the waiting handle observes as a closed channel.
    ///
    /// 使未到达 actor 的命令失败。携带回调的命令通过 `on_error` 报告；
    /// 其他命令丢弃其响应端，等待中的句柄会将其视为通道关闭。
    pub(crate) fn reject(self, error: Error) {
        match self {
            ClientCommand::StartScan { on_error, .. } | ClientCommand::Connect { on_error, .. } => {
                on_error(error)
            }
            _ => {}
        }
    }
}

impl fmt::Debug for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientCommand::CreateClient { .. } => f.write_str("CreateClient"),
            ClientCommand::DestroyClient { .. } => f.write_str("DestroyClient"),
            ClientCommand::IsReady { .. } => f.write_str("IsReady"),
            ClientCommand::StartScan { payload, .. } => f
                .debug_struct("StartScan")
                .field("payload_len", &payload.len())
                .finish(),
            ClientCommand::StopScan { .. } => f.write_str("StopScan"),
            ClientCommand::IsScanning { .. } => f.write_str("IsScanning"),
            ClientCommand::Connect { payload, .. } => f
                .debug_struct("Connect")
                .field("payload_len", &payload.len())
                .finish(),
            ClientCommand::CancelConnection { device, .. } => f
                .debug_struct("CancelConnection")
                .field("device", device)
                .finish(),
        }
    }
}
