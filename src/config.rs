//! 定义了客户端和连接的可配置参数。
//! Defines configurable parameters for the client and its connections.

use std::time::Duration;

/// The largest ATT MTU a BLE link can negotiate.
pub const MAX_ATT_MTU: u16 = 517;

/// A structure containing all configurable parameters of a `BleClient`.
///
/// 包含 `BleClient` 所有可配置参数的结构体。
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Connection establishment parameters.
    /// 连接建立相关参数。
    pub connection: ConnectionConfig,

    /// Actor and channel sizing parameters.
    /// Actor 和通道容量相关参数。
    pub client: ClientConfig,
}

/// Connection establishment parameters.
///
/// 连接建立相关参数。
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Deadline covering both `Connecting` and `MtuNegotiating`. `None` lets
    /// an attempt wait on the platform forever.
    ///
    /// 覆盖 `Connecting` 与 `MtuNegotiating` 两个阶段的截止时间。
    /// `None` 表示无限等待平台。
    pub connect_timeout: Option<Duration>,
    /// Larger MTU requests are capped to this value before negotiation.
    /// 更大的MTU请求在协商前会被截断为此值。
    pub max_mtu: u16,
}

/// Actor and channel sizing parameters.
///
/// Actor 和通道容量相关参数。
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Capacity of the command channel between handles and the client actor.
    /// 句柄与客户端 actor 之间命令通道的容量。
    pub command_channel_capacity: usize,
    /// Capacity of the broadcast channel carrying state changes. Slow
    /// subscribers observe `Lagged` instead of blocking the engine.
    ///
    /// 承载状态变化的广播通道容量。慢速订阅者会收到 `Lagged`，而不会阻塞引擎。
    pub state_event_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(30)),
            max_mtu: MAX_ATT_MTU,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            command_channel_capacity: 128,
            state_event_capacity: 64,
        }
    }
}
