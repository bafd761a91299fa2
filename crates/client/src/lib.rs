//! Realtime client for the LifeFlow hosted backend.
//!
//! Everything the application's live screens need: snapshot queries
//! reconciled with a change-feed subscription ([`live`]), presence
//! tracking ([`presence`]), append-only chat logs ([`chat`]), and the
//! floating-panel coordinator ([`panel`]). The backend itself is reached
//! through the [`service::DataService`] boundary; [`memory::MemoryService`]
//! provides an in-process implementation for tests and local fixtures,
//! [`remote::RemoteService`] the real HTTP + WebSocket transport.

pub mod chat;
pub mod client;
pub mod config;
pub mod error;
pub mod live;
pub mod memory;
pub mod panel;
pub mod presence;
pub mod remote;
pub mod retry;
pub mod service;
pub mod telemetry;

pub use client::LifeFlow;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use live::{LiveQuery, LiveQueryParams, LiveStatus};
pub use service::DataService;
