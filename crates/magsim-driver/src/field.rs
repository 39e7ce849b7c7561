//! Per-device channel fields.

use std::fmt;
use std::str::FromStr;

use magsim_core::error::SimError;

/// One of the eight channels every magnet publishes as `<device>:<FIELD>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MagnetField {
    /// Desired setpoint.
    Bdes,
    /// Baseline setpoint.
    Bcon,
    /// Readback.
    Bact,
    /// Readback on read, setpoint-and-perturb on write.
    Bctrl,
    /// Control command.
    Ctrl,
    /// Abort request (reserved).
    Abort,
    /// Model element name.
    Madname,
    /// Status message (reserved).
    Statmsg,
}

impl MagnetField {
    /// Every field, in publication order.
    pub const ALL: [MagnetField; 8] = [
        MagnetField::Bdes,
        MagnetField::Bcon,
        MagnetField::Bact,
        MagnetField::Bctrl,
        MagnetField::Ctrl,
        MagnetField::Abort,
        MagnetField::Madname,
        MagnetField::Statmsg,
    ];

    /// Channel suffix.
    pub fn as_str(self) -> &'static str {
        match self {
            MagnetField::Bdes => "BDES",
            MagnetField::Bcon => "BCON",
            MagnetField::Bact => "BACT",
            MagnetField::Bctrl => "BCTRL",
            MagnetField::Ctrl => "CTRL",
            MagnetField::Abort => "ABORT",
            MagnetField::Madname => "MADNAME",
            MagnetField::Statmsg => "STATMSG",
        }
    }

    /// Full channel name for a device.
    pub fn channel_name(self, device_name: &str) -> String {
        format!("{device_name}:{}", self.as_str())
    }
}

impl fmt::Display for MagnetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MagnetField {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| SimError::ChannelNotFound(s.to_string()))
    }
}
