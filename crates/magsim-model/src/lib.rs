//! Client side of the physics-model link.
//!
//! - [`protocol`]: request and reply messages, one JSON object per line
//! - [`table`]: parsing of `show lat` attribute tables
//! - [`link`]: byte streams and connectors
//! - [`client`]: the shared, mutex-guarded request/reply client
//! - [`fake`]: an in-process model for tests and offline runs

pub mod client;
pub mod fake;
pub mod link;
pub mod protocol;
pub mod table;

pub use client::ModelClient;
pub use fake::{FakeConnector, FakeElement, FakeModel};
pub use link::{ModelConnector, TcpConnector};
pub use protocol::{ModelReply, ModelRequest};
pub use table::LatticeRow;
