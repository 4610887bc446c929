//! Last-known connection state per device, plus change notifications.
//!
//! 每个设备最近一次已知的连接状态，以及状态变化通知。

use crate::{adapter::DeviceId, connection::ConnectionState};
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// A recorded transition of one device.
///
/// 单个设备的一次已记录的状态转换。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub device: DeviceId,
    /// `None` the first time the device is seen.
    /// 首次见到该设备时为 `None`。
    pub from: Option<ConnectionState>,
    pub to: ConnectionState,
}

/// Mapping from device identifier to its last-known connection state.
///
/// 设备标识符到其最近已知连接状态的映射。
#[derive(Debug)]
pub struct DeviceRegistry {
    states: DashMap<DeviceId, ConnectionState>,
    events: broadcast::Sender<StateChange>,
}

impl DeviceRegistry {
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            states: DashMap::new(),
            events,
        }
    }

    /// Records `to` for `device` if the state machine allows it. Illegal
    /// moves are refused and logged; the previous state is kept.
    ///
    /// 若状态机允许，则为 `device` 记录 `to`。非法转换会被拒绝并记录日志，保留原状态。
    pub fn transition(&self, device: &DeviceId, to: ConnectionState) -> bool {
        let from = match self.states.entry(device.clone()) {
            Entry::Occupied(mut entry) => {
                let from = *entry.get();
                if !from.can_advance_to(to) {
                    warn!(device = %device, from = %from, to = %to, "Refusing invalid state transition");
                    return false;
                }
                entry.insert(to);
                Some(from)
            }
            Entry::Vacant(entry) => {
                entry.insert(to);
                None
            }
        };

        if from != Some(to) {
            trace!(device = %device, from = ?from, to = %to, "State transition recorded");
            // No subscribers is not an error.
            let _ = self.events.send(StateChange {
                device: device.clone(),
                from,
                to,
            });
        }
        true
    }

    pub fn state(&self, device: &DeviceId) -> Option<ConnectionState> {
        self.states.get(device).map(|state| *state)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    /// Forgets every device. Devices that were still active are reported as
    /// moving to `Disconnected` first.
    ///
    /// 忘记所有设备。仍处于活动状态的设备会先被报告为转入 `Disconnected`。
    pub fn clear(&self) {
        let devices: Vec<DeviceId> = self.states.iter().map(|e| e.key().clone()).collect();
        for device in devices {
            if let Some((device, from)) = self.states.remove(&device) {
                if from.is_active() {
                    let _ = self.events.send(StateChange {
                        device,
                        from: Some(from),
                        to: ConnectionState::Disconnected,
                    });
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
