//! Cancellation token shared between the pool and a supervisor task.
//!
//! The token owns the caller's callbacks. Every delivery and every registry
//! write made on behalf of an attempt happens while holding the token's slot,
//! so once `cancel` returns nothing from that attempt can reach the caller.
//!
//! 池与监督任务之间共享的取消令牌。
//!
//! 令牌持有调用方的回调。代表某次尝试进行的每次回调交付和注册表写入都在持有令牌槽位时进行，
//! 因此 `cancel` 返回后，该尝试的任何结果都无法再到达调用方。

use crate::{
    adapter::DeviceId,
    error::{Error, OnError},
    message::ConnectedDeviceMessage,
};
use parking_lot::Mutex;
use std::{fmt, sync::Arc};
use tokio::sync::oneshot;

/// Callback receiving the ready connection.
/// 接收已就绪连接的回调。
pub(crate) type OnConnected = Box<dyn FnOnce(ConnectedDeviceMessage) + Send>;

struct Callbacks {
    on_success: OnConnected,
    on_error: OnError,
}

struct AttemptSlot {
    callbacks: Option<Callbacks>,
    cancel_tx: Option<oneshot::Sender<()>>,
    cancelled: bool,
}

/// Handle to one connection attempt and, once it succeeds, to the
/// supervisor task watching the resulting link.
///
/// 一次连接尝试的句柄；尝试成功后，也是监视所建立链路的监督任务的句柄。
#[derive(Clone)]
pub(crate) struct AttemptToken {
    id: u64,
    device: DeviceId,
    slot: Arc<Mutex<AttemptSlot>>,
}

impl fmt::Debug for AttemptToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptToken")
            .field("id", &self.id)
            .field("device", &self.device)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl AttemptToken {
    /// Creates a live token and the receiver its supervisor listens on.
    ///
    /// 创建一个存活的令牌，以及其监督任务监听的接收端。
    pub(crate) fn new(
        id: u64,
        device: DeviceId,
        on_success: OnConnected,
        on_error: OnError,
    ) -> (Self, oneshot::Receiver<()>) {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let slot = AttemptSlot {
            callbacks: Some(Callbacks {
                on_success,
                on_error,
            }),
            cancel_tx: Some(cancel_tx),
            cancelled: false,
        };
        let token = Self {
            id,
            device,
            slot: Arc::new(Mutex::new(slot)),
        };
        (token, cancel_rx)
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn device(&self) -> &DeviceId {
        &self.device
    }

    /// Cancels the attempt. Callbacks are dropped without being invoked and
    /// the supervisor is told to let go of the link. Returns `false` if the
    /// token was already cancelled.
    ///
    /// 取消该尝试。回调被丢弃而不调用，并通知监督任务释放链路。
    /// 若令牌已被取消则返回 `false`。
    pub(crate) fn cancel(&self) -> bool {
        let mut slot = self.slot.lock();
        if slot.cancelled {
            return false;
        }
        slot.cancelled = true;
        slot.callbacks = None;
        if let Some(cancel_tx) = slot.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
        true
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.slot.lock().cancelled
    }

    /// Runs `f` only if the token has not been cancelled. A concurrent
    /// `cancel` waits until `f` returns.
    ///
    /// 仅当令牌未被取消时运行 `f`。并发的 `cancel` 会等待 `f` 返回。
    pub(crate) fn while_live<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        let slot = self.slot.lock();
        if slot.cancelled {
            return None;
        }
        let result = f();
        drop(slot);
        Some(result)
    }

    /// Delivers success if the attempt is still live and `install` accepts
    /// the result. Returns whether the caller was notified.
    ///
    /// 若尝试仍存活且 `install` 接受结果，则交付成功回调。返回是否已通知调用方。
    pub(crate) fn succeed(
        &self,
        install: impl FnOnce() -> bool,
        message: ConnectedDeviceMessage,
    ) -> bool {
        let mut slot = self.slot.lock();
        if slot.cancelled {
            return false;
        }
        let Some(callbacks) = slot.callbacks.take() else {
            return false;
        };
        if !install() {
            return false;
        }
        (callbacks.on_success)(message);
        true
    }

    /// Delivers `error` if the attempt is still live and `discard` confirms
    /// it was still the current attempt for its device.
    ///
    /// 若尝试仍存活且 `discard` 确认它仍是该设备的当前尝试，则交付 `error`。
    pub(crate) fn fail(&self, discard: impl FnOnce() -> bool, error: Error) -> bool {
        let mut slot = self.slot.lock();
        if slot.cancelled {
            return false;
        }
        let Some(callbacks) = slot.callbacks.take() else {
            return false;
        };
        if !discard() {
            return false;
        }
        (callbacks.on_error)(error);
        true
    }
}
