//! Channel values and the channel access capability.
//!
//! A channel is a named value exposed to the outside world, such as
//! `QUAD:LI21:201:BDES`. Whatever serves channels to clients (a PV server,
//! the interactive console, tests) only needs [`ChannelAccess`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{SimError, SimResult};
use crate::observable::ObservableMetadata;

/// A value carried by a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelValue {
    /// Numeric channel (setpoints, readbacks).
    Float(f64),
    /// String or enum channel.
    Text(String),
}

impl ChannelValue {
    /// Interpret as a float, or explain why not.
    pub fn as_f64(&self, channel: &str) -> SimResult<f64> {
        match self {
            ChannelValue::Float(v) => Ok(*v),
            ChannelValue::Text(s) => s.trim().parse::<f64>().map_err(|_| {
                SimError::InvalidChannelValue {
                    channel: channel.to_string(),
                    reason: format!("expected a number, got {s:?}"),
                }
            }),
        }
    }

    /// Interpret as text. Floats are rendered with `Display`.
    pub fn into_text(self) -> String {
        match self {
            ChannelValue::Float(v) => v.to_string(),
            ChannelValue::Text(s) => s,
        }
    }

    /// Parse a raw console token: numbers become `Float`, anything else `Text`.
    pub fn parse_token(token: &str) -> Self {
        match token.parse::<f64>() {
            Ok(v) => ChannelValue::Float(v),
            Err(_) => ChannelValue::Text(token.to_string()),
        }
    }
}

impl fmt::Display for ChannelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelValue::Float(v) => write!(f, "{v}"),
            ChannelValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for ChannelValue {
    fn from(value: f64) -> Self {
        ChannelValue::Float(value)
    }
}

impl From<&str> for ChannelValue {
    fn from(value: &str) -> Self {
        ChannelValue::Text(value.to_string())
    }
}

impl From<String> for ChannelValue {
    fn from(value: String) -> Self {
        ChannelValue::Text(value)
    }
}

/// Read/write access to a group of named channels.
///
/// Reads are snapshots and never wait on an in-flight command. Writes are
/// forwarded to the owning device and complete once the device has processed
/// them; the returned value is the channel's value after the write.
#[async_trait]
pub trait ChannelAccess: Send + Sync {
    /// All channel names, sorted.
    fn channel_names(&self) -> Vec<String>;

    /// Current value of a channel.
    fn read(&self, name: &str) -> SimResult<ChannelValue>;

    /// Publish metadata for a channel.
    fn describe(&self, name: &str) -> SimResult<ObservableMetadata>;

    /// Handle an external write request.
    async fn write(&self, name: &str, value: ChannelValue) -> SimResult<ChannelValue>;
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_as_f64_accepts_numeric_text() {
        assert_eq!(ChannelValue::Float(1.5).as_f64("X").unwrap(), 1.5);
        assert_eq!(ChannelValue::from(" -0.25 ").as_f64("X").unwrap(), -0.25);
        assert!(ChannelValue::from("PERTURB").as_f64("X").is_err());
    }

    #[test]
    fn test_parse_token() {
        assert_eq!(ChannelValue::parse_token("0.003"), ChannelValue::Float(0.003));
        assert_eq!(
            ChannelValue::parse_token("TRIM"),
            ChannelValue::Text("TRIM".into())
        );
    }

    #[test]
    fn test_untagged_json() {
        let v: ChannelValue = serde_json::from_str("1.25").unwrap();
        assert_eq!(v, ChannelValue::Float(1.25));
        let v: ChannelValue = serde_json::from_str("\"Ready\"").unwrap();
        assert_eq!(v, ChannelValue::Text("Ready".into()));
    }
}
