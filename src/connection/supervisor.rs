//! The per-attempt task driving `Connecting → MtuNegotiating → Ready`.
//!
//! One supervisor is spawned per connection attempt. It owns the link once
//! the transport brings it up, and keeps owning it after `Ready` so that
//! releasing the pool entry, or the platform dropping the link, both end in
//! a consistent pool and registry.
//!
//! 驱动 `Connecting → MtuNegotiating → Ready` 的单次尝试任务。
//!
//! 每次连接尝试都会生成一个监督任务。传输层建立链路后由它持有链路，并在 `Ready`
//! 之后继续持有，使得释放池条目或平台断开链路最终都能让池和注册表保持一致。

use super::{AttemptToken, ConnectionHandle, ConnectionPool, ConnectionState};
use crate::{
    adapter::{LinkSession, PeripheralDevice, RadioAdapter},
    error::Error,
    registry::DeviceRegistry,
};
use std::{future::Future, sync::Arc};
use tokio::{sync::oneshot, time::Instant};
use tracing::{debug, info, warn};

/// How a bounded, cancellable step ended.
enum Phase<T> {
    Done(T),
    Cancelled,
    TimedOut,
}

/// Runs `fut` until it completes, the attempt is cancelled, or `deadline`
/// passes. Cancellation wins ties.
///
/// 运行 `fut`，直到其完成、尝试被取消或超过 `deadline`。同时就绪时取消优先。
async fn race<F: Future>(
    cancel_rx: &mut oneshot::Receiver<()>,
    deadline: Option<Instant>,
    fut: F,
) -> Phase<F::Output> {
    let bounded = async {
        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
            None => Some(fut.await),
        }
    };

    tokio::select! {
        biased;
        _ = cancel_rx => Phase::Cancelled,
        outcome = bounded => match outcome {
            Some(output) => Phase::Done(output),
            None => Phase::TimedOut,
        },
    }
}

/// Drives one connection attempt and supervises the resulting link.
///
/// 驱动一次连接尝试并监督所建立的链路。
pub(crate) struct Supervisor<A: RadioAdapter> {
    pub(crate) adapter: Arc<A>,
    pub(crate) pool: Arc<ConnectionPool<A::Session>>,
    pub(crate) registry: Arc<DeviceRegistry>,
    pub(crate) token: AttemptToken,
    pub(crate) cancel_rx: oneshot::Receiver<()>,
    /// Shared by `Connecting` and `MtuNegotiating`.
    pub(crate) deadline: Option<Instant>,
}

impl<A: RadioAdapter> Supervisor<A> {
    /// Runs the attempt to completion. Every outcome before `Ready` reports
    /// through the token exactly once, unless the attempt was cancelled.
    ///
    /// 运行该尝试直至结束。除非尝试被取消，`Ready` 之前的每种结果都恰好通过令牌报告一次。
    pub(crate) async fn run(
        mut self,
        peripheral: A::Peripheral,
        auto_connect: bool,
        requested_mtu: Option<u16>,
    ) {
        let adapter = self.adapter.clone();
        let device = self.token.device().clone();
        let attempt = self.token.id();
        debug!(device = %device, attempt = attempt, auto_connect = auto_connect, requested_mtu = ?requested_mtu, "Connection attempt started");

        // 1. Bring the link up.
        // 1. 建立链路。
        let establish = adapter.establish_connection(&peripheral, auto_connect);
        let session = match race(&mut self.cancel_rx, self.deadline, establish).await {
            Phase::Done(Ok(session)) => Arc::new(session),
            Phase::Done(Err(source)) => {
                self.fail(Error::ConnectionFailed {
                    device,
                    source,
                });
                return;
            }
            Phase::TimedOut => {
                self.fail(Error::Timeout {
                    device,
                    state: ConnectionState::Connecting,
                });
                return;
            }
            Phase::Cancelled => {
                debug!(device = %device, attempt = attempt, "Attempt cancelled while connecting");
                return;
            }
        };

        // 2. Negotiate the MTU when asked to and the platform can.
        // 2. 在被要求且平台支持时协商MTU。
        let mut mtu = session.mtu();
        if let Some(requested) = requested_mtu {
            if adapter.supports_mtu_negotiation() {
                self.record(ConnectionState::MtuNegotiating);
                let negotiate = adapter.negotiate_mtu(&session, requested);
                match race(&mut self.cancel_rx, self.deadline, negotiate).await {
                    Phase::Done(Ok(granted)) => {
                        debug!(device = %device, requested = requested, granted = granted, "MTU negotiated");
                        mtu = granted;
                    }
                    Phase::Done(Err(source)) => {
                        self.fail(Error::ConnectionFailed {
                            device,
                            source,
                        });
                        self.disconnect(&session).await;
                        return;
                    }
                    Phase::TimedOut => {
                        self.fail(Error::Timeout {
                            device,
                            state: ConnectionState::MtuNegotiating,
                        });
                        self.disconnect(&session).await;
                        return;
                    }
                    Phase::Cancelled => {
                        debug!(device = %device, attempt = attempt, "Attempt cancelled while negotiating MTU");
                        self.disconnect(&session).await;
                        return;
                    }
                }
            } else {
                debug!(device = %device, mtu = mtu, "MTU negotiation unsupported, keeping link MTU");
            }
        }

        // 3. Publish the handle and notify the caller.
        // 3. 发布句柄并通知调用方。
        let handle = ConnectionHandle::new(
            device.clone(),
            peripheral.name(),
            mtu,
            session.clone(),
            self.token.clone(),
        );
        let message = handle.to_message();
        let pool = &self.pool;
        let registry = &self.registry;
        let delivered = self.token.succeed(
            || {
                let installed = pool.promote(handle);
                if installed {
                    registry.transition(&device, ConnectionState::Ready);
                }
                installed
            },
            message,
        );
        if !delivered {
            debug!(device = %device, attempt = attempt, "Attempt superseded before it became ready");
            self.disconnect(&session).await;
            return;
        }
        info!(device = %device, attempt = attempt, mtu = mtu, "Device ready");

        // 4. Hold the link until it is released or the platform drops it.
        // 4. 持有链路，直到其被释放或平台断开链路。
        tokio::select! {
            _ = &mut self.cancel_rx => {
                debug!(device = %device, attempt = attempt, "Releasing ready connection");
                self.disconnect(&session).await;
            }
            _ = session.closed() => {
                let removed = self.token.while_live(|| {
                    let current = pool.discard_handle(&device, attempt);
                    if current {
                        registry.transition(&device, ConnectionState::Disconnected);
                    }
                    current
                });
                if removed == Some(true) {
                    warn!(device = %device, attempt = attempt, "Link lost out of band");
                }
            }
        }
    }

    /// Records a state for this attempt unless it has been cancelled.
    fn record(&self, state: ConnectionState) {
        self.token
            .while_live(|| self.registry.transition(self.token.device(), state));
    }

    /// Reports `error` to the caller if this is still the device's current
    /// attempt, and moves the device to `Disconnected`.
    ///
    /// 若这仍是设备的当前尝试，则向调用方报告 `error`，并将设备转为 `Disconnected`。
    fn fail(&self, error: Error) {
        let device = self.token.device();
        let attempt = self.token.id();
        let reason = error.to_string();
        let reported = self.token.fail(
            || {
                let current = self.pool.discard_attempt(device, attempt);
                if current {
                    self.registry
                        .transition(device, ConnectionState::Disconnected);
                }
                current
            },
            error,
        );
        if reported {
            warn!(device = %device, attempt = attempt, error = %reason, "Connection attempt failed");
        } else {
            debug!(device = %device, attempt = attempt, error = %reason, "Dropping failure of a superseded attempt");
        }
    }

    async fn disconnect(&self, session: &A::Session) {
        let device = self.token.device();
        match self.adapter.disconnect(session).await {
            Ok(()) => debug!(device = %device, "Link disconnected"),
            Err(e) => warn!(device = %device, error = %e, "Failed to disconnect link"),
        }
    }
}
