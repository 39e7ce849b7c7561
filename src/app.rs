//! Service startup: device map, model client, bootstrap.

use std::sync::Arc;

use anyhow::{Context, Result};
use magsim_model::{FakeModel, ModelClient};
use tracing::info;

use crate::config::Settings;
use crate::demo;
use crate::names::DeviceNames;
use crate::service::MagnetService;

/// Where the physics model lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelBackend {
    /// TCP connection to `model.host:model.port`.
    Remote,
    /// In-process model seeded with the demonstration lattice.
    Fake,
}

/// Load the device map named in the settings, or the built-in one.
pub fn device_names(settings: &Settings) -> Result<DeviceNames> {
    match &settings.magnets.device_map {
        Some(path) => DeviceNames::load(path)
            .with_context(|| format!("Failed to load device map {}", path.display())),
        None => {
            info!("No device map configured; using the built-in demonstration map");
            demo::device_names().context("Built-in device map is invalid")
        }
    }
}

/// Model client for the chosen backend.
pub fn model_client(settings: &Settings, backend: ModelBackend) -> Arc<ModelClient> {
    let client = match backend {
        ModelBackend::Remote => ModelClient::tcp(
            &settings.model.host,
            settings.model.port,
            settings.reply_timeout(),
        ),
        ModelBackend::Fake => {
            let model = FakeModel::new(demo::lattice());
            ModelClient::new(Arc::new(model.connector()), settings.reply_timeout())
        }
    };
    Arc::new(client)
}

/// Build the magnet service and bring it in step with the model.
pub async fn launch(settings: &Settings, backend: ModelBackend) -> Result<Arc<MagnetService>> {
    let names = device_names(settings)?;
    let client = model_client(settings, backend);
    let endpoint = client.endpoint();

    let service = MagnetService::bootstrap(client, &names, &settings.magnet_options())
        .await
        .with_context(|| format!("Failed to initialize magnets from model at {endpoint}"))?;

    Ok(Arc::new(service))
}
