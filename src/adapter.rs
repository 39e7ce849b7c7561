//! Channel access over the magnet service.
//!
//! Channel names are `<device>:<FIELD>`; the device part itself contains
//! colons, so the field is everything after the last one.

use std::sync::Arc;

use async_trait::async_trait;
use magsim_core::channel::{ChannelAccess, ChannelValue};
use magsim_core::error::{SimError, SimResult};
use magsim_core::observable::ObservableMetadata;
use magsim_driver::{CommandOutcome, Magnet, MagnetField};
use tracing::{debug, warn};

use crate::service::MagnetService;

/// Serves every magnet's channels.
#[derive(Debug, Clone)]
pub struct ServiceChannels {
    service: Arc<MagnetService>,
}

impl ServiceChannels {
    /// Channel view of `service`.
    pub fn new(service: Arc<MagnetService>) -> Self {
        Self { service }
    }

    /// The underlying service.
    pub fn service(&self) -> &Arc<MagnetService> {
        &self.service
    }

    fn resolve(&self, name: &str) -> SimResult<(&Arc<Magnet>, MagnetField)> {
        let not_found = || SimError::ChannelNotFound(name.to_string());
        let (device, suffix) = name.rsplit_once(':').ok_or_else(not_found)?;
        let field = suffix.parse::<MagnetField>().map_err(|_| not_found())?;
        let magnet = self.service.magnet(device).ok_or_else(not_found)?;
        Ok((magnet, field))
    }

    /// Apply a write and report what the magnet did along with the value the
    /// channel holds afterwards.
    pub async fn apply(
        &self,
        name: &str,
        value: ChannelValue,
    ) -> SimResult<(CommandOutcome, ChannelValue)> {
        let (magnet, field) = self.resolve(name)?;
        debug!(channel = name, %value, "Channel write");

        let outcome = magnet.write_field(field, value).await?;
        if let CommandOutcome::SyncFailed { bact, error } = &outcome {
            warn!(channel = name, bact, %error, "Readback changed but model update failed");
        }
        Ok((outcome, magnet.read_field(field)))
    }
}

#[async_trait]
impl ChannelAccess for ServiceChannels {
    fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .service
            .magnets()
            .flat_map(|magnet| {
                MagnetField::ALL
                    .into_iter()
                    .map(|field| field.channel_name(magnet.device_name()))
            })
            .collect();
        names.sort();
        names
    }

    fn read(&self, name: &str) -> SimResult<ChannelValue> {
        let (magnet, field) = self.resolve(name)?;
        Ok(magnet.read_field(field))
    }

    fn describe(&self, name: &str) -> SimResult<ObservableMetadata> {
        let (magnet, field) = self.resolve(name)?;
        Ok(magnet.field_metadata(field))
    }

    async fn write(&self, name: &str, value: ChannelValue) -> SimResult<ChannelValue> {
        self.apply(name, value).await.map(|(_, value)| value)
    }
}
