//! Device inventory: which control-system devices exist and which model
//! element each one corresponds to.
//!
//! The inventory is a two-column CSV file:
//!
//! ```text
//! # element,device
//! element,device
//! XC21101,XCOR:LI21:101
//! Q21201,QUAD:LI21:201
//! ```
//!
//! Element names are matched case-insensitively, since the model reports them
//! in its own case.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;

use magsim_core::error::{SimError, SimResult};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Record {
    element: String,
    device: String,
}

/// Bidirectional element/device name map.
#[derive(Debug, Clone, Default)]
pub struct DeviceNames {
    by_element: HashMap<String, String>,
    by_device: BTreeMap<String, String>,
}

impl DeviceNames {
    /// Build from `(element, device)` pairs.
    ///
    /// # Errors
    ///
    /// `SimError::Configuration` if an element or a device appears twice, or
    /// a name is empty.
    pub fn from_pairs<I, E, D>(pairs: I) -> SimResult<Self>
    where
        I: IntoIterator<Item = (E, D)>,
        E: Into<String>,
        D: Into<String>,
    {
        let mut names = Self::default();
        for (element, device) in pairs {
            names.insert(element.into(), device.into())?;
        }
        Ok(names)
    }

    /// Parse CSV with an `element,device` header. Lines starting with `#` are
    /// ignored.
    pub fn from_csv<R: Read>(reader: R) -> SimResult<Self> {
        let mut csv = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut names = Self::default();
        for record in csv.deserialize::<Record>() {
            let record = record
                .map_err(|e| SimError::Configuration(format!("device map: {e}")))?;
            names.insert(record.element, record.device)?;
        }
        Ok(names)
    }

    /// Load a CSV device map from disk.
    pub fn load(path: &Path) -> SimResult<Self> {
        let file = std::fs::File::open(path)?;
        let names = Self::from_csv(file)?;
        debug!(path = %path.display(), devices = names.len(), "Loaded device map");
        Ok(names)
    }

    fn insert(&mut self, element: String, device: String) -> SimResult<()> {
        if element.is_empty() || device.is_empty() {
            return Err(SimError::Configuration(format!(
                "device map: empty name in pair ({element:?}, {device:?})"
            )));
        }
        let key = element.to_ascii_uppercase();
        if self.by_element.contains_key(&key) {
            return Err(SimError::Configuration(format!(
                "device map: element {element} listed twice"
            )));
        }
        if self.by_device.contains_key(&device) {
            return Err(SimError::Configuration(format!(
                "device map: device {device} listed twice"
            )));
        }
        self.by_element.insert(key, device.clone());
        self.by_device.insert(device, element);
        Ok(())
    }

    /// Device for a model element, if the element is known.
    pub fn device_for_element(&self, element: &str) -> Option<&str> {
        self.by_element
            .get(&element.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// Model element for a device, if the device is known.
    pub fn element_for_device(&self, device: &str) -> Option<&str> {
        self.by_device.get(device).map(String::as_str)
    }

    /// Every known device, sorted.
    pub fn devices(&self) -> impl Iterator<Item = &str> {
        self.by_device.keys().map(String::as_str)
    }

    /// Number of devices.
    pub fn len(&self) -> usize {
        self.by_device.len()
    }

    /// No devices at all.
    pub fn is_empty(&self) -> bool {
        self.by_device.is_empty()
    }
}
