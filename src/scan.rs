//! Owns the single process-wide scan subscription.
//!
//! Starting a scan replaces the previous one. Advertisements are converted
//! and handed to the caller one by one with no buffering in between; the
//! callbacks live behind a lock that `stop` also takes, so no event from a
//! stopped scan can reach the caller once `stop` has returned.
//!
//! 持有进程内唯一的扫描订阅。
//!
//! 开始扫描会替换之前的扫描。广播被逐条转换并交给调用方，中间没有缓冲；
//! 回调位于 `stop` 也会获取的锁之后，因此 `stop` 返回后，已停止扫描的任何事件都无法到达调用方。

use crate::{
    adapter::RadioAdapter,
    error::{Error, OnError},
    message::{ScanResultMessage, ScanSettings},
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Callback receiving each scan result.
/// 接收每个扫描结果的回调。
pub type OnScanResult = Box<dyn FnMut(ScanResultMessage) + Send>;

struct ScanCallbacks {
    on_result: OnScanResult,
    on_error: OnError,
}

type SharedCallbacks = Arc<Mutex<Option<ScanCallbacks>>>;

/// One running scan.
struct ScanSubscription {
    id: u64,
    callbacks: SharedCallbacks,
    task: JoinHandle<()>,
}

impl ScanSubscription {
    fn is_live(&self) -> bool {
        !self.task.is_finished() && self.callbacks.lock().is_some()
    }

    /// Unregisters the callbacks first, then stops the pump. Dropping the
    /// pump drops the advertisement stream, which unsubscribes at the adapter.
    fn cancel(self) {
        *self.callbacks.lock() = None;
        self.task.abort();
    }
}

/// Enforces the single-scan policy and translates advertisement events.
///
/// 执行单一扫描策略并转换广播事件。
#[derive(Default)]
pub(crate) struct ScanCoordinator {
    active: Option<ScanSubscription>,
    next_id: u64,
}

impl ScanCoordinator {
    /// Starts a scan, cancelling the active one first.
    ///
    /// 开始扫描，会先取消当前活动的扫描。
    pub(crate) fn start<A: RadioAdapter>(
        &mut self,
        adapter: Arc<A>,
        settings: ScanSettings,
        on_result: OnScanResult,
        on_error: OnError,
    ) {
        if let Some(previous) = self.active.take() {
            info!(scan = previous.id, "Replacing active scan");
            previous.cancel();
        }

        self.next_id += 1;
        let id = self.next_id;
        let callbacks: SharedCallbacks = Arc::new(Mutex::new(Some(ScanCallbacks {
            on_result,
            on_error,
        })));
        let task = tokio::spawn(pump_advertisements(
            id,
            adapter,
            settings,
            callbacks.clone(),
        ));
        self.active = Some(ScanSubscription {
            id,
            callbacks,
            task,
        });
    }

    /// Cancels the active scan. Safe to call when nothing is running.
    ///
    /// 取消当前扫描。没有扫描在运行时调用也是安全的。
    pub(crate) fn stop(&mut self) -> bool {
        match self.active.take() {
            Some(subscription) => {
                let was_live = subscription.is_live();
                info!(scan = subscription.id, "Stopping scan");
                subscription.cancel();
                was_live
            }
            None => false,
        }
    }

    pub(crate) fn is_scanning(&self) -> bool {
        self.active.as_ref().is_some_and(ScanSubscription::is_live)
    }
}

/// Reports a terminal error once and unregisters the callbacks.
fn terminate(callbacks: &SharedCallbacks, error: Error) {
    let mut guard = callbacks.lock();
    if let Some(callbacks) = guard.take() {
        (callbacks.on_error)(error);
    }
}

/// Feeds one subscription's advertisements to its callbacks.
///
/// 将一个订阅的广播交给其回调。
async fn pump_advertisements<A: RadioAdapter>(
    id: u64,
    adapter: Arc<A>,
    settings: ScanSettings,
    callbacks: SharedCallbacks,
) {
    let mut stream = match adapter.start_scan(&settings).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(scan = id, error = %e, "Adapter refused to start scan");
            terminate(&callbacks, Error::ScanFailed(e));
            return;
        }
    };
    info!(scan = id, mode = ?settings.scan_mode, services = settings.service_uuids.len(), "Scan started");

    while let Some(event) = stream.recv().await {
        match event {
            Ok(advertisement) => {
                let mut guard = callbacks.lock();
                let Some(active) = guard.as_mut() else {
                    break;
                };
                (active.on_result)(ScanResultMessage::from(advertisement));
            }
            Err(e) => {
                warn!(scan = id, error = %e, "Advertisement stream failed");
                terminate(&callbacks, Error::ScanFailed(e));
                break;
            }
        }
    }
    debug!(scan = id, "Scan subscription ended");
}
