//! Error types shared by every magsim crate.
//!
//! `SimError` is the single error enum used across the library crates. Binary
//! and bootstrap glue wrap it in `anyhow` where extra context helps.
//!
//! ## Error Categories
//!
//! 1. **Configuration** - `Configuration`
//!    - Raised while loading settings, the device map, or building magnets
//!      (e.g. a quadrupole with zero length).
//!    - Permanent: fix the configuration and restart.
//!
//! 2. **Model channel** - `Io`, `ModelTimeout`, `ModelDisconnected`, `ModelProtocol`
//!    - Raised on the request/reply link to the physics model.
//!    - The client drops its connection after any of these so the next request
//!      starts from a clean request/reply pairing.
//!
//! 3. **Channel access** - `ChannelNotFound`, `ChannelReadOnly`, `InvalidChannelValue`
//!    - Raised by the channel adapter when an external write is rejected.
//!    - Nothing is changed when these are returned.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using [`SimError`].
pub type SimResult<T> = std::result::Result<T, SimError>;

/// Primary error type for the simulated magnet service.
#[derive(Error, Debug)]
pub enum SimError {
    /// Configuration parsed but is semantically invalid.
    ///
    /// # Example
    ///
    /// ```rust
    /// use magsim_core::error::SimError;
    ///
    /// fn validate_port(port: u16) -> Result<(), SimError> {
    ///     if port == 0 {
    ///         return Err(SimError::Configuration("model.port must be non-zero".into()));
    ///     }
    ///     Ok(())
    /// }
    /// ```
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// I/O failure on the model link or while reading configuration files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The model did not answer a request within the reply timeout.
    #[error("Model did not reply within {0:?}")]
    ModelTimeout(Duration),

    /// The model closed the connection before replying.
    #[error("Model connection closed")]
    ModelDisconnected,

    /// The model replied with something that is not a valid reply message.
    #[error("Model protocol error: {0}")]
    ModelProtocol(String),

    /// No channel with the given name is exposed.
    #[error("Unknown channel: {0}")]
    ChannelNotFound(String),

    /// The channel does not accept external writes.
    #[error("Channel '{0}' is read-only")]
    ChannelReadOnly(String),

    /// The written value has the wrong type or is not one of the allowed choices.
    #[error("Invalid value for channel '{channel}': {reason}")]
    InvalidChannelValue {
        /// Full channel name.
        channel: String,
        /// Why the value was rejected.
        reason: String,
    },
}

impl SimError {
    /// True when the error came from the model link itself.
    ///
    /// After such an error the request/reply pairing on the link can no longer
    /// be trusted.
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            SimError::Io(_)
                | SimError::ModelTimeout(_)
                | SimError::ModelDisconnected
                | SimError::ModelProtocol(_)
        )
    }
}

impl From<serde_json::Error> for SimError {
    fn from(err: serde_json::Error) -> Self {
        SimError::ModelProtocol(err.to_string())
    }
}
