#![deny(clippy::expect_used, clippy::unwrap_used)]

//! The root of the BLE central-role connection engine.
//! BLE 中心角色连接引擎的根。

pub mod adapter;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod registry;
pub mod scan;

pub use adapter::{AdapterError, AdapterProvider, DeviceId, LinkSession, PeripheralDevice, RadioAdapter};
pub use client::BleClient;
pub use config::Config;
pub use connection::{ConnectionHandle, ConnectionPool, ConnectionState};
pub use error::{Error, Result};
