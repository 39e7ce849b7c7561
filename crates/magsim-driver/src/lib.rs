//! Simulated accelerator magnets.
//!
//! - [`conversion`]: model units to control-system units, per family
//! - [`command`]: the CTRL command enum
//! - [`field`]: the channels each magnet publishes
//! - [`sync`]: the readback change callback
//! - [`magnet`]: the per-device state machine

pub mod command;
pub mod conversion;
pub mod field;
pub mod magnet;
pub mod sync;

pub use command::{CtrlCommand, UnknownCommand};
pub use conversion::MagnetType;
pub use field::MagnetField;
pub use magnet::{CommandOutcome, Magnet, MagnetOptions, MagnetSpec, SetpointMemory};
pub use sync::{Detached, MagnetSync, ReadbackChange};
