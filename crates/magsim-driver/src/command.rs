//! Magnet control commands.
//!
//! The CTRL channel is an enum of thirteen strings. Six of them move values
//! between the setpoint, baseline and readback slots; the remainder are
//! accepted and logged but do nothing on a simulated magnet.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A string that is not one of the CTRL choices.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown control command {0:?}")]
pub struct UnknownCommand(pub String);

/// A control command written to a magnet's CTRL channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CtrlCommand {
    /// Idle state. Writing it is a no-op.
    #[serde(rename = "Ready")]
    Ready,
    /// Move the readback to the setpoint after the settling delay.
    #[serde(rename = "TRIM")]
    Trim,
    /// Move the readback to the setpoint immediately.
    #[serde(rename = "PERTURB")]
    Perturb,
    /// Copy the baseline into the setpoint.
    #[serde(rename = "BCON_TO_BDES")]
    BconToBdes,
    /// Checkpoint the setpoint.
    #[serde(rename = "SAVE_BDES")]
    SaveBdes,
    /// Restore the checkpointed setpoint.
    #[serde(rename = "LOAD_BDES")]
    LoadBdes,
    /// Restore the setpoint as it was before its last write.
    #[serde(rename = "UNDO_BDES")]
    UndoBdes,
    /// Zero the power supply DAC.
    #[serde(rename = "DAC_ZERO")]
    DacZero,
    /// Calibrate.
    #[serde(rename = "CALB")]
    Calb,
    /// Standardize.
    #[serde(rename = "STDZ")]
    Stdz,
    /// Reset the power supply.
    #[serde(rename = "RESET")]
    Reset,
    /// Switch the power supply on.
    #[serde(rename = "TURN_ON")]
    TurnOn,
    /// Switch the power supply off.
    #[serde(rename = "TURN_OFF")]
    TurnOff,
}

impl CtrlCommand {
    /// Every command in CTRL enum order.
    pub const ALL: [CtrlCommand; 13] = [
        CtrlCommand::Ready,
        CtrlCommand::Trim,
        CtrlCommand::Perturb,
        CtrlCommand::BconToBdes,
        CtrlCommand::SaveBdes,
        CtrlCommand::LoadBdes,
        CtrlCommand::UndoBdes,
        CtrlCommand::DacZero,
        CtrlCommand::Calb,
        CtrlCommand::Stdz,
        CtrlCommand::Reset,
        CtrlCommand::TurnOn,
        CtrlCommand::TurnOff,
    ];

    /// Channel string for this command.
    pub fn as_str(self) -> &'static str {
        match self {
            CtrlCommand::Ready => "Ready",
            CtrlCommand::Trim => "TRIM",
            CtrlCommand::Perturb => "PERTURB",
            CtrlCommand::BconToBdes => "BCON_TO_BDES",
            CtrlCommand::SaveBdes => "SAVE_BDES",
            CtrlCommand::LoadBdes => "LOAD_BDES",
            CtrlCommand::UndoBdes => "UNDO_BDES",
            CtrlCommand::DacZero => "DAC_ZERO",
            CtrlCommand::Calb => "CALB",
            CtrlCommand::Stdz => "STDZ",
            CtrlCommand::Reset => "RESET",
            CtrlCommand::TurnOn => "TURN_ON",
            CtrlCommand::TurnOff => "TURN_OFF",
        }
    }

    /// All channel strings, in enum order.
    pub fn choices() -> Vec<&'static str> {
        Self::ALL.iter().map(|c| c.as_str()).collect()
    }

    /// Whether the command updates the readback and therefore the model.
    pub fn moves_readback(self) -> bool {
        matches!(self, CtrlCommand::Trim | CtrlCommand::Perturb)
    }
}

impl fmt::Display for CtrlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CtrlCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}
