//! The handle stored in the pool for a ready connection.
//!
//! 池中为已就绪连接存放的句柄。

use super::AttemptToken;
use crate::{
    adapter::DeviceId,
    message::{BleDeviceMessage, ConnectedDeviceMessage, RSSI_UNKNOWN},
};
use std::{fmt, sync::Arc};

/// One established logical connection.
///
/// The handle shares its token with the supervisor task that owns the link,
/// so releasing the handle is what makes the supervisor disconnect.
///
/// 一个已建立的逻辑连接。
///
/// 句柄与拥有链路的监督任务共享令牌，因此释放句柄即会使监督任务断开连接。
pub struct ConnectionHandle<S> {
    device: DeviceId,
    name: Option<String>,
    mtu: u16,
    rssi: i32,
    session: Arc<S>,
    token: AttemptToken,
}

impl<S> Clone for ConnectionHandle<S> {
    fn clone(&self) -> Self {
        Self {
            device: self.device.clone(),
            name: self.name.clone(),
            mtu: self.mtu,
            rssi: self.rssi,
            session: self.session.clone(),
            token: self.token.clone(),
        }
    }
}

impl<S> fmt::Debug for ConnectionHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("device", &self.device)
            .field("name", &self.name)
            .field("mtu", &self.mtu)
            .field("rssi", &self.rssi)
            .field("attempt", &self.token.id())
            .finish()
    }
}

impl<S> ConnectionHandle<S> {
    /// RSSI is not sampled while connecting, so it starts as `RSSI_UNKNOWN`.
    pub(crate) fn new(
        device: DeviceId,
        name: Option<String>,
        mtu: u16,
        session: Arc<S>,
        token: AttemptToken,
    ) -> Self {
        Self {
            device,
            name,
            mtu,
            rssi: RSSI_UNKNOWN,
            session,
            token,
        }
    }

    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    pub fn rssi(&self) -> i32 {
        self.rssi
    }

    pub fn session(&self) -> &Arc<S> {
        &self.session
    }

    /// Public representation handed to the caller.
    ///
    /// 交给调用方的公共表示。
    pub fn to_message(&self) -> ConnectedDeviceMessage {
        ConnectedDeviceMessage {
            device: BleDeviceMessage {
                mac_address: self.device.to_string(),
                name: self.name.clone(),
            },
            mtu: self.mtu,
            rssi: self.rssi,
        }
    }

    pub(crate) fn token(&self) -> &AttemptToken {
        &self.token
    }
}
