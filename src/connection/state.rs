//! Defines the per-device connection state machine.
//!
//! 定义每个设备的连接状态机。

use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of one device's connection attempt.
/// 单个设备连接尝试的状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// The transport is bringing the link up.
    /// 传输层正在建立链路。
    Connecting,

    /// The link is up and the MTU exchange is in flight.
    /// 链路已建立，MTU交换进行中。
    MtuNegotiating,

    /// The connection is registered in the pool and usable.
    /// 连接已登记在池中，可以使用。
    Ready,

    /// The attempt failed, was cancelled, or the link went away.
    /// 尝试失败、被取消，或链路已断开。
    Disconnected,
}

impl ConnectionState {
    /// Validates a move within a single attempt. A fresh attempt may always
    /// restart at `Connecting`, whatever the previous attempt left behind.
    ///
    /// 校验单次尝试内的状态转换。新的尝试总可以从 `Connecting` 重新开始。
    pub fn can_advance_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (_, Connecting) => true,
            (Connecting, MtuNegotiating) => true,
            (Connecting, Ready) => true,
            (MtuNegotiating, Ready) => true,
            (Connecting | MtuNegotiating | Ready, Disconnected) => true,
            (Disconnected, Disconnected) => true,
            _ => false,
        }
    }

    /// Whether the device holds an attempt or handle in the pool.
    pub fn is_active(self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::MtuNegotiating => "MtuNegotiating",
            ConnectionState::Ready => "Ready",
            ConnectionState::Disconnected => "Disconnected",
        };
        f.write_str(name)
    }
}
