//! Tracks every device that is connecting or connected.
//!
//! Each device maps to exactly one entry, either an in-flight attempt or a
//! ready handle, so the two phases can never coexist for the same key.
//! Whatever an operation displaces is cancelled, never silently dropped.
//!
//! 跟踪所有正在连接或已连接的设备。
//!
//! 每个设备只对应一个条目：要么是进行中的尝试，要么是已就绪的句柄，
//! 因此同一键的两个阶段永远不会共存。任何被替换的条目都会被取消，绝不会被悄悄丢弃。

use super::{AttemptToken, ConnectionHandle, ConnectionState};
use crate::adapter::DeviceId;
use dashmap::{DashMap, mapref::entry::Entry};
use tracing::{debug, info};

/// A pool slot for one device.
/// 单个设备的池槽位。
enum PoolEntry<S> {
    Connecting(AttemptToken),
    Connected(ConnectionHandle<S>),
}

impl<S> PoolEntry<S> {
    fn token(&self) -> &AttemptToken {
        match self {
            PoolEntry::Connecting(token) => token,
            PoolEntry::Connected(handle) => handle.token(),
        }
    }

    fn phase(&self) -> ConnectionState {
        match self {
            PoolEntry::Connecting(_) => ConnectionState::Connecting,
            PoolEntry::Connected(_) => ConnectionState::Ready,
        }
    }

    /// Cancels the attempt, or makes the supervisor disconnect a ready link.
    fn release(self) {
        self.token().cancel();
    }
}

/// The set of in-flight attempts and established handles, keyed by device.
///
/// 以设备为键的进行中尝试和已建立句柄的集合。
pub struct ConnectionPool<S> {
    entries: DashMap<DeviceId, PoolEntry<S>>,
}

impl<S> Default for ConnectionPool<S> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<S> ConnectionPool<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `handle` under `device`, overwriting whatever was there. A
    /// displaced attempt or handle from a different attempt is released.
    /// Supervisors publish through `promote`; this is the unconditional
    /// overwrite for handles already obtained from [`handle`](Self::handle).
    ///
    /// 将 `handle` 存放在 `device` 下，覆盖原有内容。来自其他尝试的被替换条目会被释放。
    pub fn put_handle(&self, device: DeviceId, handle: ConnectionHandle<S>) {
        let attempt = handle.token().id();
        let displaced = self.entries.insert(device.clone(), PoolEntry::Connected(handle));
        if let Some(old) = displaced {
            if old.token().id() != attempt {
                debug!(device = %device, displaced = old.token().id(), "Handle overwrote an entry from another attempt");
                old.release();
            }
        }
    }

    /// Installs a new attempt for its device, cancelling any attempt or
    /// handle it displaces. Lookups observe either the old entry or the new
    /// one, never both.
    ///
    /// 为设备安装新的尝试，并取消其替换的任何尝试或句柄。
    /// 查询只会看到旧条目或新条目之一，绝不会同时看到两者。
    pub(crate) fn replace_attempt(&self, token: AttemptToken) -> Option<ConnectionState> {
        let device = token.device().clone();
        let attempt = token.id();
        let displaced = self.entries.insert(device.clone(), PoolEntry::Connecting(token))?;
        let phase = displaced.phase();
        info!(
            device = %device,
            attempt = attempt,
            displaced = displaced.token().id(),
            displaced_phase = %phase,
            "Replacing existing connection entry"
        );
        displaced.release();
        Some(phase)
    }

    /// Turns the attempt that produced `handle` into a ready entry. Fails if
    /// that attempt is no longer the current one for the device.
    ///
    /// 将产生 `handle` 的尝试转为就绪条目。若该尝试已不是设备的当前尝试则失败。
    pub(crate) fn promote(&self, handle: ConnectionHandle<S>) -> bool {
        let attempt = handle.token().id();
        match self.entries.entry(handle.device().clone()) {
            Entry::Occupied(mut entry) => {
                let current =
                    matches!(entry.get(), PoolEntry::Connecting(token) if token.id() == attempt);
                if current {
                    entry.insert(PoolEntry::Connected(handle));
                }
                current
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Removes a failed attempt if it is still the current one.
    ///
    /// 若失败的尝试仍是当前尝试，则将其移除。
    pub(crate) fn discard_attempt(&self, device: &DeviceId, attempt: u64) -> bool {
        self.entries
            .remove_if(device, |_, entry| {
                matches!(entry, PoolEntry::Connecting(token) if token.id() == attempt)
            })
            .is_some()
    }

    /// Removes a ready handle whose link went away, if it is still current.
    ///
    /// 若链路已断开的就绪句柄仍是当前句柄，则将其移除。
    pub(crate) fn discard_handle(&self, device: &DeviceId, attempt: u64) -> bool {
        self.entries
            .remove_if(device, |_, entry| {
                matches!(entry, PoolEntry::Connected(handle) if handle.token().id() == attempt)
            })
            .is_some()
    }

    /// Removes and releases whatever is held for `device`, returning the
    /// phase it was in.
    ///
    /// 移除并释放 `device` 对应的条目，返回其所处阶段。
    pub(crate) fn remove(&self, device: &DeviceId) -> Option<ConnectionState> {
        let (_, entry) = self.entries.remove(device)?;
        let phase = entry.phase();
        entry.release();
        Some(phase)
    }

    /// Cancels every attempt and releases every handle. Returns how many
    /// entries were released.
    ///
    /// 取消所有尝试并释放所有句柄。返回被释放的条目数量。
    pub fn clear(&self) -> usize {
        // Entries are released outside the shard locks; supervisors take
        // their token lock before touching the map.
        let devices: Vec<DeviceId> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut released = 0;
        for device in devices {
            if let Some((_, entry)) = self.entries.remove(&device) {
                entry.release();
                released += 1;
            }
        }
        released
    }

    /// The ready handle for `device`, if any.
    pub fn handle(&self, device: &DeviceId) -> Option<ConnectionHandle<S>> {
        match self.entries.get(device)?.value() {
            PoolEntry::Connected(handle) => Some(handle.clone()),
            PoolEntry::Connecting(_) => None,
        }
    }

    pub fn is_connecting(&self, device: &DeviceId) -> bool {
        matches!(
            self.entries.get(device).as_deref(),
            Some(PoolEntry::Connecting(_))
        )
    }

    pub fn connected_devices(&self) -> Vec<DeviceId> {
        let mut devices: Vec<DeviceId> = self
            .entries
            .iter()
            .filter(|e| matches!(e.value(), PoolEntry::Connected(_)))
            .map(|e| e.key().clone())
            .collect();
        devices.sort();
        devices
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
