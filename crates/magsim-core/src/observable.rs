//! Observable channel values
//!
//! Reactive values built on `tokio::sync::watch` so that any number of
//! readers (console, tests, a future PV server) can snapshot or wait for
//! changes without touching the owner's locks.
//!
//! Each `Observable<T>` carries metadata describing how the value is exposed:
//! units, read-only flag, a dtype hint, display limits, precision and enum
//! choices.
//!
//! # Two write paths
//!
//! - [`Observable::set`] is the external path. It rejects writes to read-only
//!   observables and runs the validator.
//! - [`Observable::replace`] is the owner path. The device that owns the value
//!   uses it to publish state (for instance the BACT readback, which is
//!   read-only to everyone else).
//!
//! # Example
//!
//! ```rust
//! use magsim_core::observable::Observable;
//!
//! let bact = Observable::new("BACT", 0.0_f64)
//!     .with_units("kG")
//!     .with_display_limits(-0.006, 0.006)
//!     .read_only();
//!
//! assert!(bact.set(1.0).is_err());
//! bact.replace(0.002);
//! assert_eq!(bact.get(), 0.002);
//! ```

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{SimError, SimResult};

/// Validator callback type.
///
/// Returns a human-readable reason when the value is rejected.
pub type Validator<T> = Arc<dyn Fn(&T) -> Result<(), String> + Send + Sync>;

/// Shared state so that all clones of an observable see metadata updates.
///
/// Uses `parking_lot::RwLock` because metadata access never needs to await.
struct ObservableSharedState<T> {
    metadata: ObservableMetadata,
    validator: Option<Validator<T>>,
}

/// Metadata for an observable value.
///
/// Mirrors the descriptive fields a process-variable server publishes for a
/// channel (units, limits, precision, enum strings).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservableMetadata {
    /// Full channel name (e.g. `QUAD:LI21:201:BDES`).
    pub name: String,

    /// Human-readable description.
    pub description: Option<String>,

    /// Engineering units.
    pub units: Option<String>,

    /// Whether external writes are rejected.
    pub read_only: bool,

    /// Data type hint: `"float"`, `"enum"` or `"string"`.
    #[serde(default)]
    pub dtype: String,

    /// Lower display/control limit. Informational only.
    #[serde(default)]
    pub min_value: Option<f64>,

    /// Upper display/control limit. Informational only.
    #[serde(default)]
    pub max_value: Option<f64>,

    /// Number of decimal places clients should display.
    #[serde(default)]
    pub precision: Option<u8>,

    /// Allowed values for enum channels.
    #[serde(default)]
    pub enum_values: Vec<String>,
}

impl ObservableMetadata {
    fn named(name: String) -> Self {
        Self {
            name,
            description: None,
            units: None,
            read_only: false,
            dtype: String::new(),
            min_value: None,
            max_value: None,
            precision: None,
            enum_values: Vec::new(),
        }
    }
}

/// A thread-safe, observable value with change notifications.
pub struct Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    sender: watch::Sender<T>,
    shared: Arc<RwLock<ObservableSharedState<T>>>,
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.read();
        f.debug_struct("Observable")
            .field("metadata", &shared.metadata)
            .field("has_validator", &shared.validator.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new observable with an initial value.
    pub fn new(name: impl Into<String>, initial_value: T) -> Self {
        let (sender, _) = watch::channel(initial_value);
        Self {
            sender,
            shared: Arc::new(RwLock::new(ObservableSharedState {
                metadata: ObservableMetadata::named(name.into()),
                validator: None,
            })),
        }
    }

    /// Add a description.
    pub fn with_description(self, description: impl Into<String>) -> Self {
        self.shared.write().metadata.description = Some(description.into());
        self
    }

    /// Add engineering units.
    pub fn with_units(self, units: impl Into<String>) -> Self {
        self.shared.write().metadata.units = Some(units.into());
        self
    }

    /// Set the dtype hint.
    pub fn with_dtype(self, dtype: impl Into<String>) -> Self {
        self.shared.write().metadata.dtype = dtype.into();
        self
    }

    /// Reject external writes.
    pub fn read_only(self) -> Self {
        self.shared.write().metadata.read_only = true;
        self
    }

    /// Add a custom validator run by [`Observable::set`].
    pub fn with_validator<F>(self, validator: F) -> Self
    where
        F: Fn(&T) -> Result<(), String> + Send + Sync + 'static,
    {
        self.shared.write().validator = Some(Arc::new(validator));
        self
    }

    /// Current value (clone).
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Full channel name.
    pub fn name(&self) -> String {
        self.shared.read().metadata.name.clone()
    }

    /// Metadata snapshot.
    pub fn metadata(&self) -> ObservableMetadata {
        self.shared.read().metadata.clone()
    }

    /// Whether external writes are rejected.
    pub fn is_read_only(&self) -> bool {
        self.shared.read().metadata.read_only
    }

    /// Check a value against the read-only flag and the validator.
    pub fn validate(&self, value: &T) -> SimResult<()> {
        let guard = self.shared.read();
        if guard.metadata.read_only {
            return Err(SimError::ChannelReadOnly(guard.metadata.name.clone()));
        }
        if let Some(validator) = &guard.validator {
            validator(value).map_err(|reason| SimError::InvalidChannelValue {
                channel: guard.metadata.name.clone(),
                reason,
            })?;
        }
        Ok(())
    }

    /// External write: validate, then store and notify subscribers.
    pub fn set(&self, value: T) -> SimResult<()> {
        self.validate(&value)?;
        self.sender.send_replace(value);
        Ok(())
    }

    /// Owner write: store and notify without any checks. Returns the old value.
    pub fn replace(&self, value: T) -> T {
        self.sender.send_replace(value)
    }

    /// Subscribe to value changes.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Observable<f64> {
    /// Record display/control limits.
    ///
    /// These are hints published with the channel; writes outside them are
    /// still accepted.
    pub fn with_display_limits(self, min: f64, max: f64) -> Self {
        {
            let mut guard = self.shared.write();
            guard.metadata.min_value = Some(min);
            guard.metadata.max_value = Some(max);
            guard.metadata.dtype = "float".to_string();
        }
        self
    }

    /// Record the display precision.
    pub fn with_precision(self, precision: u8) -> Self {
        self.shared.write().metadata.precision = Some(precision);
        self
    }

    /// Reject NaN and infinities on external writes.
    pub fn finite_only(self) -> Self {
        self.with_validator(|value: &f64| {
            if value.is_finite() {
                Ok(())
            } else {
                Err(format!("value must be finite, got {value}"))
            }
        })
    }
}

impl Observable<String> {
    /// Restrict external writes to a fixed set of strings and publish them.
    pub fn with_choices<S: AsRef<str>>(self, choices: &[S]) -> Self {
        let choices: Vec<String> = choices.iter().map(|c| c.as_ref().to_string()).collect();
        {
            let mut guard = self.shared.write();
            guard.metadata.enum_values.clone_from(&choices);
            guard.metadata.dtype = "enum".to_string();
            guard.validator = Some(Arc::new(move |value: &String| {
                if choices.iter().any(|c| c == value) {
                    Ok(())
                } else {
                    Err(format!("{value:?} not in choices {choices:?}"))
                }
            }));
        }
        self
    }
}
