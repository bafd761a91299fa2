//! Remote implementation of the service boundary: snapshot and row CRUD
//! over HTTP, the change feed over a WebSocket.

mod http;
pub mod wire;
mod ws;

pub use http::RemoteService;
