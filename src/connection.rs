//! Per-device connection lifecycle: the attempt/handle pool and the
//! supervisor task that drives each device through its state machine.
//!
//! 每个设备的连接生命周期：尝试/句柄池，以及驱动每个设备走完状态机的监督任务。

mod attempt;
pub mod handle;
pub mod pool;
pub mod state;
pub(crate) mod supervisor;

pub(crate) use attempt::{AttemptToken, OnConnected};
pub use handle::ConnectionHandle;
pub use pool::ConnectionPool;
pub use state::ConnectionState;
