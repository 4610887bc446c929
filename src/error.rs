//! 定义了库中所有可能的错误类型。
//! Defines all possible error types in the library.

use crate::{
    adapter::{AdapterError, DeviceId},
    connection::ConnectionState,
};
use thiserror::Error;

/// The primary error type for the BLE central engine.
/// BLE 中心引擎的主要错误类型。
#[derive(Debug, Error)]
pub enum Error {
    /// The operation was attempted before `create_client` or after `destroy_client`.
    /// 在 `create_client` 之前或 `destroy_client` 之后尝试了该操作。
    #[error("BLE client is not initialized")]
    NotInitialized,

    /// A request payload could not be decoded or failed validation.
    /// 请求载荷无法解码或未通过校验。
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The radio adapter does not know the requested peripheral.
    /// 无线适配器不认识所请求的外设。
    #[error("no device found for identifier {0}")]
    DeviceNotFound(DeviceId),

    /// The transport failed while connecting or negotiating the MTU.
    /// 传输层在连接或协商MTU期间失败。
    #[error("connection to {device} failed: {source}")]
    ConnectionFailed {
        device: DeviceId,
        #[source]
        source: AdapterError,
    },

    /// The connection deadline elapsed before the device became ready.
    /// 设备就绪前连接截止时间已到。
    #[error("connection to {device} timed out while {state}")]
    Timeout {
        device: DeviceId,
        state: ConnectionState,
    },

    /// The advertisement stream reported a failure and the scan was terminated.
    /// 广播流报告了失败，扫描已终止。
    #[error("device scan failed: {0}")]
    ScanFailed(#[source] AdapterError),

    /// The platform radio adapter could not be acquired.
    /// 无法获取平台无线适配器。
    #[error("radio adapter unavailable: {0}")]
    AdapterUnavailable(#[source] AdapterError),

    /// The client actor has stopped and no longer accepts commands.
    /// 客户端 actor 已停止，不再接受命令。
    #[error("Internal channel is broken")]
    ChannelClosed,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidArgument(err.to_string())
    }
}

/// A specialized `Result` type for this library.
/// 本库专用的 `Result` 类型。
pub type Result<T> = std::result::Result<T, Error>;

/// Callback receiving the single error that terminates an operation.
/// 接收终止某个操作的唯一错误的回调。
pub type OnError = Box<dyn FnOnce(Error) + Send>;
