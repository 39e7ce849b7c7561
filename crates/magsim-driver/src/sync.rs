//! The readback change callback.
//!
//! A magnet does not know about the physics model. When PERTURB or TRIM moves
//! its readback it hands a [`ReadbackChange`] to whatever [`MagnetSync`] it was
//! built with and waits for it to finish.

use async_trait::async_trait;
use magsim_core::error::SimResult;

use crate::conversion::MagnetType;

/// A committed readback change on one device.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadbackChange {
    /// Control-system device name.
    pub device_name: String,
    /// Model element name.
    pub element_name: String,
    /// Magnet family.
    pub mag_type: MagnetType,
    /// Element length.
    pub length: f64,
    /// New readback, in control units.
    pub bact: f64,
}

impl ReadbackChange {
    /// Model attribute to update.
    pub fn model_attribute(&self) -> &'static str {
        self.mag_type.model_attribute()
    }

    /// New readback converted to model units.
    pub fn model_value(&self) -> f64 {
        self.mag_type.to_model(self.bact, self.length)
    }
}

/// Receives readback changes. Implementations must finish the model update
/// before returning.
#[async_trait]
pub trait MagnetSync: Send + Sync {
    /// Propagate a readback change.
    async fn readback_changed(&self, change: &ReadbackChange) -> SimResult<()>;
}

/// Sync target that drops every change.
#[derive(Debug, Clone, Copy, Default)]
pub struct Detached;

#[async_trait]
impl MagnetSync for Detached {
    async fn readback_changed(&self, _change: &ReadbackChange) -> SimResult<()> {
        Ok(())
    }
}
