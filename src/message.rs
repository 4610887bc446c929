//! Wire messages exchanged with the calling application.
//!
//! Every public operation takes an opaque encoded payload; this module is the
//! only place that knows the encoding (JSON with camelCase fields).
//!
//! 与调用方应用交换的线上消息。
//!
//! 每个公共操作都接收不透明的编码载荷；只有此模块了解其编码（camelCase 字段的 JSON）。

use crate::{
    adapter::{Advertisement, DeviceId},
    error::{Error, Result},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Signal strength reported for a connection whose RSSI was never sampled.
///
/// 未采样RSSI的连接所报告的信号强度。
pub const RSSI_UNKNOWN: i32 = -1;

/// Encoding shared by every message crossing the public API.
///
/// 所有跨越公共API的消息共享的编码。
pub trait WireMessage: Serialize + DeserializeOwned {
    /// Decodes and validates a payload.
    ///
    /// 解码并校验载荷。
    fn decode(bytes: &[u8]) -> Result<Self> {
        let message: Self = serde_json::from_slice(bytes)?;
        message.validate()?;
        Ok(message)
    }

    fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Semantic checks beyond what the decoder enforces.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Radio duty cycle requested for a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanMode {
    Opportunistic,
    #[default]
    LowPower,
    Balanced,
    LowLatency,
}

/// Which advertisements the platform should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallbackType {
    #[default]
    AllMatches,
    FirstMatch,
    MatchLost,
}

/// Scan configuration supplied by the caller.
///
/// 调用方提供的扫描配置。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanSettings {
    pub scan_mode: ScanMode,
    pub callback_type: CallbackType,
    /// Only peripherals advertising one of these services are reported.
    /// An empty list disables service filtering.
    ///
    /// 只报告广播了其中某个服务的外设。空列表表示不按服务过滤。
    pub service_uuids: Vec<String>,
}

impl WireMessage for ScanSettings {
    fn validate(&self) -> Result<()> {
        match self.service_uuids.iter().find(|uuid| !is_valid_uuid(uuid)) {
            Some(bad) => Err(Error::InvalidArgument(format!(
                "malformed service UUID {bad:?}"
            ))),
            None => Ok(()),
        }
    }
}

/// Accepts 16-bit, 32-bit and 128-bit textual UUIDs.
fn is_valid_uuid(uuid: &str) -> bool {
    let is_hex = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit());
    match uuid.len() {
        4 | 8 => is_hex(uuid),
        36 => {
            let groups: Vec<&str> = uuid.split('-').collect();
            groups.len() == 5
                && groups
                    .iter()
                    .zip([8, 4, 4, 4, 12])
                    .all(|(group, len)| group.len() == len && is_hex(group))
        }
        _ => false,
    }
}

/// A request to connect to one peripheral.
///
/// 连接某个外设的请求。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    pub mac_address: String,
    #[serde(default)]
    pub is_auto_connect: bool,
    /// Absent, `null` or `<= 0` means "keep the link's default MTU".
    /// 缺省、`null` 或 `<= 0` 表示“保留链路的默认MTU”。
    #[serde(default)]
    pub request_mtu: Option<i32>,
}

impl ConnectionRequest {
    pub fn device_id(&self) -> DeviceId {
        DeviceId::new(self.mac_address.trim())
    }

    /// The MTU to negotiate, capped at `max_mtu`. `None` when negotiation
    /// should be skipped.
    ///
    /// 需要协商的MTU，上限为 `max_mtu`；若应跳过协商则为 `None`。
    pub fn requested_mtu(&self, max_mtu: u16) -> Option<u16> {
        self.request_mtu
            .filter(|mtu| *mtu > 0)
            .map(|mtu| u16::try_from(mtu).unwrap_or(u16::MAX).min(max_mtu))
    }
}

impl WireMessage for ConnectionRequest {
    fn validate(&self) -> Result<()> {
        if self.mac_address.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "connection request carries no device address".to_string(),
            ));
        }
        Ok(())
    }
}

/// Identity of a peripheral as reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BleDeviceMessage {
    pub mac_address: String,
    pub name: Option<String>,
}

/// One advertisement converted for delivery to the caller.
///
/// 转换后交付给调用方的一条广播。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResultMessage {
    pub device: BleDeviceMessage,
    pub rssi: i32,
    pub advertisement_data: Vec<u8>,
}

impl WireMessage for ScanResultMessage {}

impl From<Advertisement> for ScanResultMessage {
    fn from(advertisement: Advertisement) -> Self {
        Self {
            device: BleDeviceMessage {
                mac_address: advertisement.device.to_string(),
                name: advertisement.name,
            },
            rssi: i32::from(advertisement.rssi),
            advertisement_data: advertisement.payload.to_vec(),
        }
    }
}

/// Public representation of a ready connection.
///
/// 已就绪连接的公共表示。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedDeviceMessage {
    pub device: BleDeviceMessage,
    pub mtu: u16,
    pub rssi: i32,
}

impl WireMessage for ConnectedDeviceMessage {}
