//! Radio adapter abstraction for the platform BLE driver.
//!
//! This module is the boundary between the connection engine and whatever
//! native stack actually drives the radio. Everything here is asynchronous;
//! cancellation is expressed by dropping futures and stream receivers.
//!
//! 平台BLE驱动的无线适配器抽象。
//!
//! 此模块是连接引擎与实际驱动无线电的原生协议栈之间的边界。这里的一切都是异步的；
//! 取消通过丢弃 future 和流接收端来表达。

use crate::message::ScanSettings;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use thiserror::Error;
use tokio::sync::mpsc;

/// Stable identifier of a peripheral, usually its MAC-style address.
///
/// 外设的稳定标识符，通常是其MAC风格的地址。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

/// Errors reported by the platform radio driver.
///
/// 平台无线驱动报告的错误。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    /// The radio is off, missing or not permitted.
    /// 无线电已关闭、不存在或未获授权。
    #[error("radio unavailable: {0}")]
    Unavailable(String),

    /// The platform does not implement the requested operation.
    /// 平台未实现所请求的操作。
    #[error("operation not supported by the platform")]
    Unsupported,

    /// The link went down underneath an operation.
    /// 链路在操作进行中断开。
    #[error("link to the peripheral was lost")]
    LinkLost,

    /// Any other driver failure, carrying the platform's own description.
    /// 其他任何驱动故障，携带平台自身的描述。
    #[error("platform error: {0}")]
    Platform(String),
}

/// A specialized `Result` type for adapter operations.
/// 适配器操作专用的 `Result` 类型。
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// One raw advertisement observed by the radio.
///
/// 无线电观测到的一条原始广播。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// The advertising peripheral.
    /// 发出广播的外设。
    pub device: DeviceId,
    /// The advertised local name, if any.
    /// 广播的本地名称（如有）。
    pub name: Option<String>,
    /// Received signal strength in dBm.
    /// 接收信号强度（dBm）。
    pub rssi: i16,
    /// The raw advertisement payload.
    /// 原始广播载荷。
    pub payload: Bytes,
}

/// Stream of advertisement events for one scan subscription.
///
/// Dropping the receiver unsubscribes; the adapter must stop feeding it and
/// may stop the radio scan once no subscriber is left.
///
/// 一次扫描订阅的广播事件流。丢弃接收端即取消订阅。
pub type AdvertisementStream = mpsc::Receiver<AdapterResult<Advertisement>>;

/// A platform handle to a peripheral, resolved from a `DeviceId`.
pub trait PeripheralDevice: Send + Sync + 'static {
    fn id(&self) -> &DeviceId;

    fn name(&self) -> Option<String>;
}

/// An established logical link to a peripheral.
///
/// 与外设之间已建立的逻辑链路。
#[async_trait]
pub trait LinkSession: Send + Sync + 'static {
    /// The MTU currently in effect on this link.
    /// 该链路当前生效的MTU。
    fn mtu(&self) -> u16;

    /// Resolves when the platform tears the link down out of band.
    ///
    /// 当平台在带外拆除链路时完成。
    async fn closed(&self);
}

/// The platform radio adapter interface.
///
/// 平台无线适配器接口。
#[async_trait]
pub trait RadioAdapter: Send + Sync + 'static {
    type Peripheral: PeripheralDevice;
    type Session: LinkSession;

    /// Subscribes to advertisements matching `settings`.
    ///
    /// 订阅与 `settings` 匹配的广播。
    async fn start_scan(&self, settings: &ScanSettings) -> AdapterResult<AdvertisementStream>;

    /// Resolves an identifier to a peripheral handle, `None` if the adapter
    /// has never heard of it.
    ///
    /// 将标识符解析为外设句柄；若适配器不认识该设备则返回 `None`。
    fn peripheral(&self, id: &DeviceId) -> Option<Self::Peripheral>;

    /// Brings up a logical link. Dropping the returned future abandons the
    /// attempt at the platform level.
    ///
    /// 建立逻辑链路。丢弃返回的 future 即在平台层放弃该尝试。
    async fn establish_connection(
        &self,
        peripheral: &Self::Peripheral,
        auto_connect: bool,
    ) -> AdapterResult<Self::Session>;

    /// Whether `negotiate_mtu` is available on this platform.
    ///
    /// 此平台是否支持 `negotiate_mtu`。
    fn supports_mtu_negotiation(&self) -> bool;

    /// Asks the peer for `mtu` and returns what was granted.
    ///
    /// 向对端请求 `mtu` 并返回实际授予的值。
    async fn negotiate_mtu(&self, session: &Self::Session, mtu: u16) -> AdapterResult<u16>;

    /// Tears down an established link.
    ///
    /// 拆除已建立的链路。
    async fn disconnect(&self, session: &Self::Session) -> AdapterResult<()>;
}

/// Acquires the process-wide radio adapter on `create_client`.
///
/// 在 `create_client` 时获取进程级的无线适配器。
#[async_trait]
pub trait AdapterProvider: Send + Sync + 'static {
    type Adapter: RadioAdapter;

    async fn acquire(&self) -> AdapterResult<Self::Adapter>;
}

/// Session type reachable from a provider.
pub(crate) type SessionOf<P> = <<P as AdapterProvider>::Adapter as RadioAdapter>::Session;
