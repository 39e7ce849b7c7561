//! The magnet service: one magnet per known device, all kept in step with
//! the physics model through a single shared client.
//!
//! # Bootstrap
//!
//! 1. Query the model for each family's attribute table.
//! 2. Keep rows whose element maps to a device of that family and convert the
//!    model value to a readback.
//! 3. Build a magnet for every known device of the four families. A device
//!    with no model row is skipped with a warning; a quadrupole or bend with
//!    zero length aborts the bootstrap.
//! 4. Switch the model to absolute field units.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use magsim_core::error::SimResult;
use magsim_driver::{Magnet, MagnetOptions, MagnetSpec, MagnetSync, MagnetType, ReadbackChange};
use magsim_model::ModelClient;
use tracing::{debug, info, warn};

use crate::names::DeviceNames;

/// Pushes readback changes into the physics model.
#[derive(Debug, Clone)]
pub struct ModelSync {
    client: Arc<ModelClient>,
}

impl ModelSync {
    /// Sync target backed by `client`.
    pub fn new(client: Arc<ModelClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MagnetSync for ModelSync {
    async fn readback_changed(&self, change: &ReadbackChange) -> SimResult<()> {
        self.client
            .push_element(
                &change.element_name,
                change.model_attribute(),
                change.model_value(),
            )
            .await?;
        Ok(())
    }
}

/// Initial state of one device as reported by the model.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ModelReadback {
    length: f64,
    bact: f64,
}

/// All magnets of the service.
#[derive(Debug)]
pub struct MagnetService {
    magnets: BTreeMap<String, Arc<Magnet>>,
    client: Arc<ModelClient>,
}

impl MagnetService {
    /// Build every magnet from the model's current lattice.
    pub async fn bootstrap(
        client: Arc<ModelClient>,
        names: &DeviceNames,
        options: &MagnetOptions,
    ) -> SimResult<Self> {
        info!(endpoint = %client.endpoint(), devices = names.len(), "Bootstrapping magnets from model");

        let readbacks = read_initial_values(&client, names).await?;
        let sync: Arc<dyn MagnetSync> = Arc::new(ModelSync::new(client.clone()));

        let mut magnets = BTreeMap::new();
        for device in names.devices() {
            if MagnetType::from_device_name(device).is_none() {
                continue;
            }
            let Some(readback) = readbacks.get(device) else {
                warn!(device, "No model row for magnet; skipping");
                continue;
            };
            let Some(element) = names.element_for_device(device) else {
                continue;
            };

            let spec = MagnetSpec::new(device, element, readback.length, readback.bact);
            let magnet = Magnet::new(spec, options, sync.clone())?;
            magnets.insert(device.to_string(), Arc::new(magnet));
        }

        client.use_absolute_field_basis().await?;
        info!(magnets = magnets.len(), "Initialization complete");

        Ok(Self { magnets, client })
    }

    /// Magnet by device name.
    pub fn magnet(&self, device_name: &str) -> Option<&Arc<Magnet>> {
        self.magnets.get(device_name)
    }

    /// Every magnet, sorted by device name.
    pub fn magnets(&self) -> impl Iterator<Item = &Arc<Magnet>> {
        self.magnets.values()
    }

    /// Number of magnets.
    pub fn len(&self) -> usize {
        self.magnets.len()
    }

    /// No magnets were built.
    pub fn is_empty(&self) -> bool {
        self.magnets.is_empty()
    }

    /// The shared model client.
    pub fn client(&self) -> &Arc<ModelClient> {
        &self.client
    }

    /// Close the model connection.
    pub async fn shutdown(&self) {
        self.client.disconnect().await;
    }
}

async fn read_initial_values(
    client: &ModelClient,
    names: &DeviceNames,
) -> SimResult<HashMap<String, ModelReadback>> {
    let mut readbacks = HashMap::new();

    for mag_type in MagnetType::ALL {
        let rows = client
            .query_lattice(mag_type.model_attribute(), mag_type.lattice_selection())
            .await?;

        for row in rows {
            let Some(device) = names.device_for_element(&row.element) else {
                continue;
            };
            if MagnetType::from_device_name(device) != Some(mag_type) {
                debug!(
                    element = %row.element,
                    device,
                    family = %mag_type,
                    "Element maps to a device of another family; ignoring row"
                );
                continue;
            }
            readbacks.insert(
                device.to_string(),
                ModelReadback {
                    length: row.length,
                    bact: mag_type.to_bact(row.value, row.length),
                },
            );
        }
    }

    Ok(readbacks)
}
