//! Core types and traits for the simulated magnet service.
//!
//! - [`error`]: the shared `SimError` enum and `SimResult` alias
//! - [`observable`]: watch-backed values with channel metadata
//! - [`channel`]: channel values and the `ChannelAccess` capability
//! - [`limits`]: timing defaults and payload limits

pub mod channel;
pub mod error;
pub mod limits;
pub mod observable;

pub use channel::{ChannelAccess, ChannelValue};
pub use error::{SimError, SimResult};
pub use observable::{Observable, ObservableMetadata};
