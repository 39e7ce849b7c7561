//! Simulated magnet device.
//!
//! A `Magnet` holds the three value slots of a real magnet (BDES setpoint,
//! BCON baseline, BACT readback) plus the small amount of memory the control
//! commands need, and runs the CTRL state machine over them.
//!
//! # Serialization
//!
//! Commands and setpoint writes on one magnet run one at a time behind an
//! async mutex held for the whole command, including the TRIM settling delay
//! and the model update. A second command on the same magnet waits; commands
//! on different magnets run independently. Reads never take the mutex: every
//! value lives in an [`Observable`] and a read is a snapshot.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use magsim_driver::{CtrlCommand, Detached, Magnet, MagnetOptions, MagnetSpec};
//!
//! # async fn demo() -> magsim_core::SimResult<()> {
//! let spec = MagnetSpec::new("QUAD:LI21:201", "Q21201", 0.108, -1.2);
//! let magnet = Magnet::new(spec, &MagnetOptions::default(), Arc::new(Detached))?;
//!
//! magnet.write_bdes(-1.5).await?;
//! magnet.execute(CtrlCommand::Perturb).await;
//! assert_eq!(magnet.bact(), -1.5);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use magsim_core::channel::ChannelValue;
use magsim_core::error::{SimError, SimResult};
use magsim_core::limits::{DEFAULT_CTRL_LIMIT, DEFAULT_PRECISION, DEFAULT_TRIM_SETTLE};
use magsim_core::observable::{Observable, ObservableMetadata};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::command::CtrlCommand;
use crate::conversion::MagnetType;
use crate::field::MagnetField;
use crate::sync::{MagnetSync, ReadbackChange};

const ABORT_CHOICES: [&str; 2] = ["Ready", "Abort"];

// =============================================================================
// Construction inputs
// =============================================================================

/// Identity and initial state of one magnet.
#[derive(Debug, Clone, PartialEq)]
pub struct MagnetSpec {
    /// Control-system device name, e.g. `QUAD:LI21:201`.
    pub device_name: String,
    /// Model element name, e.g. `Q21201`.
    pub element_name: String,
    /// Element length.
    pub length: f64,
    /// Initial readback; also seeds BDES and BCON.
    pub initial_bact: f64,
}

impl MagnetSpec {
    /// Convenience constructor.
    pub fn new(
        device_name: impl Into<String>,
        element_name: impl Into<String>,
        length: f64,
        initial_bact: f64,
    ) -> Self {
        Self {
            device_name: device_name.into(),
            element_name: element_name.into(),
            length,
            initial_bact,
        }
    }
}

/// Settings shared by every magnet in a service.
#[derive(Debug, Clone, PartialEq)]
pub struct MagnetOptions {
    /// Delay between a TRIM command and the readback following the setpoint.
    pub trim_settle: Duration,
    /// Symmetric control limit published on the float channels.
    pub ctrl_limit: f64,
    /// Display precision published on the float channels.
    pub precision: u8,
}

impl Default for MagnetOptions {
    fn default() -> Self {
        Self {
            trim_settle: DEFAULT_TRIM_SETTLE,
            ctrl_limit: DEFAULT_CTRL_LIMIT,
            precision: DEFAULT_PRECISION,
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// What a command or write did.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// Setpoint-side values changed. The model was not involved.
    Updated,
    /// The readback moved and the model accepted the change.
    Committed {
        /// New readback.
        bact: f64,
    },
    /// LOAD_BDES or UNDO_BDES with nothing recorded. Nothing changed.
    Skipped,
    /// The command has no simulated behavior. Nothing changed.
    Unsupported,
    /// The readback moved but the model update failed. The new readback is
    /// kept.
    SyncFailed {
        /// New readback.
        bact: f64,
        /// Why the model update failed.
        error: String,
    },
}

impl CommandOutcome {
    /// Whether the command reached the model successfully or did not need to.
    pub fn is_ok(&self) -> bool {
        !matches!(self, CommandOutcome::SyncFailed { .. })
    }
}

/// Values remembered between commands.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SetpointMemory {
    /// Set by SAVE_BDES, restored by LOAD_BDES.
    pub saved_bdes: Option<f64>,
    /// BDES as it was before its most recent write, restored by UNDO_BDES.
    pub bdes_for_undo: Option<f64>,
}

// =============================================================================
// Magnet
// =============================================================================

/// One simulated magnet.
pub struct Magnet {
    device_name: String,
    element_name: String,
    mag_type: MagnetType,
    length: f64,

    bdes: Observable<f64>,
    bcon: Observable<f64>,
    bact: Observable<f64>,
    ctrl: Observable<String>,
    abort: Observable<String>,
    madname: Observable<String>,
    statmsg: Observable<String>,

    memory: Mutex<SetpointMemory>,
    command_lock: tokio::sync::Mutex<()>,
    trim_settle: Duration,
    sync: Arc<dyn MagnetSync>,
}

impl std::fmt::Debug for Magnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Magnet")
            .field("device_name", &self.device_name)
            .field("element_name", &self.element_name)
            .field("mag_type", &self.mag_type)
            .field("length", &self.length)
            .field("bdes", &self.bdes.get())
            .field("bcon", &self.bcon.get())
            .field("bact", &self.bact.get())
            .field("memory", &*self.memory.lock())
            .finish_non_exhaustive()
    }
}

impl Magnet {
    /// Build a magnet, checking that its conversions are defined.
    ///
    /// # Errors
    ///
    /// `SimError::Configuration` when the device name does not start with a
    /// magnet family, when a quadrupole or bend has zero length, or when the
    /// length or initial readback is not finite.
    pub fn new(
        spec: MagnetSpec,
        options: &MagnetOptions,
        sync: Arc<dyn MagnetSync>,
    ) -> SimResult<Self> {
        let MagnetSpec {
            device_name,
            element_name,
            length,
            initial_bact,
        } = spec;

        let mag_type = MagnetType::from_device_name(&device_name).ok_or_else(|| {
            SimError::Configuration(format!("'{device_name}' is not a magnet device"))
        })?;
        if !length.is_finite() {
            return Err(SimError::Configuration(format!(
                "{device_name}: length {length} is not finite"
            )));
        }
        if mag_type.requires_length() && length == 0.0 {
            return Err(SimError::Configuration(format!(
                "{device_name}: {mag_type} conversions need a non-zero length"
            )));
        }
        if !initial_bact.is_finite() {
            return Err(SimError::Configuration(format!(
                "{device_name}: initial readback {initial_bact} is not finite"
            )));
        }

        let channel = |field: MagnetField| field.channel_name(&device_name);
        let float = |field: MagnetField, description: &str| {
            Observable::new(channel(field), initial_bact)
                .with_description(description)
                .with_units(mag_type.bact_units())
                .with_display_limits(-options.ctrl_limit, options.ctrl_limit)
                .with_precision(options.precision)
                .finite_only()
        };

        let bdes = float(MagnetField::Bdes, "Desired setpoint");
        let bcon = float(MagnetField::Bcon, "Baseline setpoint");
        let bact = float(MagnetField::Bact, "Readback").read_only();
        let ctrl = Observable::new(channel(MagnetField::Ctrl), CtrlCommand::Ready.to_string())
            .with_description("Control command")
            .with_choices(&CtrlCommand::choices());
        let abort = Observable::new(channel(MagnetField::Abort), ABORT_CHOICES[0].to_string())
            .with_description("Abort request (reserved)")
            .with_choices(&ABORT_CHOICES);
        let madname = Observable::new(channel(MagnetField::Madname), element_name.to_uppercase())
            .with_description("Model element name")
            .with_dtype("string")
            .read_only();
        let statmsg = Observable::new(channel(MagnetField::Statmsg), String::new())
            .with_description("Status message (reserved)")
            .with_dtype("string")
            .read_only();

        Ok(Self {
            device_name,
            element_name,
            mag_type,
            length,
            bdes,
            bcon,
            bact,
            ctrl,
            abort,
            madname,
            statmsg,
            memory: Mutex::new(SetpointMemory::default()),
            command_lock: tokio::sync::Mutex::new(()),
            trim_settle: options.trim_settle,
            sync,
        })
    }

    /// Control-system device name.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Model element name.
    pub fn element_name(&self) -> &str {
        &self.element_name
    }

    /// Magnet family.
    pub fn mag_type(&self) -> MagnetType {
        self.mag_type
    }

    /// Element length.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Current setpoint.
    pub fn bdes(&self) -> f64 {
        self.bdes.get()
    }

    /// Current baseline.
    pub fn bcon(&self) -> f64 {
        self.bcon.get()
    }

    /// Current readback.
    pub fn bact(&self) -> f64 {
        self.bact.get()
    }

    /// BCTRL reads back BACT.
    pub fn bctrl(&self) -> f64 {
        self.bact.get()
    }

    /// Last command written to CTRL.
    pub fn ctrl_state(&self) -> String {
        self.ctrl.get()
    }

    /// Saved and undo values.
    pub fn memory(&self) -> SetpointMemory {
        *self.memory.lock()
    }

    /// Readback observable, for subscribers that want change notifications.
    pub fn bact_observable(&self) -> &Observable<f64> {
        &self.bact
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// External write to BDES. Records the previous value for UNDO_BDES.
    pub async fn write_bdes(&self, value: f64) -> SimResult<CommandOutcome> {
        self.bdes.validate(&value)?;
        let _command = self.command_lock.lock().await;
        self.store_bdes(value);
        Ok(CommandOutcome::Updated)
    }

    /// External write to BCON.
    pub async fn write_bcon(&self, value: f64) -> SimResult<CommandOutcome> {
        self.bcon.validate(&value)?;
        let _command = self.command_lock.lock().await;
        self.bcon.replace(value);
        debug!(device = %self.device_name, bcon = value, "BCON updated");
        Ok(CommandOutcome::Updated)
    }

    /// External write to BCTRL: set BDES, then PERTURB, as one command.
    pub async fn write_bctrl(&self, value: f64) -> SimResult<CommandOutcome> {
        self.bdes.validate(&value)?;
        let _command = self.command_lock.lock().await;
        self.store_bdes(value);
        self.ctrl.replace(CtrlCommand::Perturb.to_string());
        Ok(self.commit_readback().await)
    }

    /// External write to ABORT. The value is stored; nothing else happens.
    pub fn write_abort(&self, value: String) -> SimResult<CommandOutcome> {
        self.abort.set(value)?;
        info!(device = %self.device_name, "ABORT has no simulated behavior");
        Ok(CommandOutcome::Updated)
    }

    /// Run a control command to completion.
    pub async fn execute(&self, command: CtrlCommand) -> CommandOutcome {
        let _command = self.command_lock.lock().await;
        self.ctrl.replace(command.to_string());
        debug!(device = %self.device_name, %command, "Executing control command");

        match command {
            CtrlCommand::Perturb => self.commit_readback().await,
            CtrlCommand::Trim => {
                tokio::time::sleep(self.trim_settle).await;
                self.commit_readback().await
            }
            CtrlCommand::BconToBdes => {
                self.store_bdes(self.bcon.get());
                CommandOutcome::Updated
            }
            CtrlCommand::SaveBdes => {
                self.memory.lock().saved_bdes = Some(self.bdes.get());
                CommandOutcome::Updated
            }
            CtrlCommand::LoadBdes => {
                let saved = self.memory.lock().saved_bdes;
                self.restore_bdes(saved)
            }
            CtrlCommand::UndoBdes => {
                let previous = self.memory.lock().bdes_for_undo;
                self.restore_bdes(previous)
            }
            CtrlCommand::Ready
            | CtrlCommand::DacZero
            | CtrlCommand::Calb
            | CtrlCommand::Stdz
            | CtrlCommand::Reset
            | CtrlCommand::TurnOn
            | CtrlCommand::TurnOff => {
                warn!(
                    device = %self.device_name,
                    %command,
                    "Control function not implemented for simulated magnets"
                );
                CommandOutcome::Unsupported
            }
        }
    }

    fn store_bdes(&self, value: f64) {
        let previous = self.bdes.replace(value);
        self.memory.lock().bdes_for_undo = Some(previous);
        debug!(device = %self.device_name, previous, bdes = value, "BDES updated");
    }

    fn restore_bdes(&self, value: Option<f64>) -> CommandOutcome {
        match value {
            Some(value) => {
                self.store_bdes(value);
                CommandOutcome::Updated
            }
            None => CommandOutcome::Skipped,
        }
    }

    /// BACT follows BDES, then the sync target is told. A failed sync leaves
    /// the new readback in place.
    async fn commit_readback(&self) -> CommandOutcome {
        let bact = self.bdes.get();
        self.bact.replace(bact);

        let change = ReadbackChange {
            device_name: self.device_name.clone(),
            element_name: self.element_name.clone(),
            mag_type: self.mag_type,
            length: self.length,
            bact,
        };
        match self.sync.readback_changed(&change).await {
            Ok(()) => CommandOutcome::Committed { bact },
            Err(err) => {
                error!(device = %self.device_name, bact, error = %err, "Model update failed");
                CommandOutcome::SyncFailed {
                    bact,
                    error: err.to_string(),
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Channel fields
    // -------------------------------------------------------------------------

    /// Snapshot of one channel field.
    pub fn read_field(&self, field: MagnetField) -> ChannelValue {
        match field {
            MagnetField::Bdes => self.bdes.get().into(),
            MagnetField::Bcon => self.bcon.get().into(),
            MagnetField::Bact => self.bact.get().into(),
            MagnetField::Bctrl => self.bctrl().into(),
            MagnetField::Ctrl => self.ctrl.get().into(),
            MagnetField::Abort => self.abort.get().into(),
            MagnetField::Madname => self.madname.get().into(),
            MagnetField::Statmsg => self.statmsg.get().into(),
        }
    }

    /// Published metadata of one channel field.
    pub fn field_metadata(&self, field: MagnetField) -> ObservableMetadata {
        match field {
            MagnetField::Bdes => self.bdes.metadata(),
            MagnetField::Bcon => self.bcon.metadata(),
            MagnetField::Bact => self.bact.metadata(),
            MagnetField::Bctrl => ObservableMetadata {
                name: MagnetField::Bctrl.channel_name(&self.device_name),
                description: Some("Readback; writes set BDES and PERTURB".to_string()),
                read_only: false,
                ..self.bact.metadata()
            },
            MagnetField::Ctrl => self.ctrl.metadata(),
            MagnetField::Abort => self.abort.metadata(),
            MagnetField::Madname => self.madname.metadata(),
            MagnetField::Statmsg => self.statmsg.metadata(),
        }
    }

    /// Route an external write to the right operation.
    ///
    /// # Errors
    ///
    /// Read-only fields, values of the wrong type, non-finite numbers and
    /// strings outside an enum's choices are rejected before anything changes.
    pub async fn write_field(
        &self,
        field: MagnetField,
        value: ChannelValue,
    ) -> SimResult<CommandOutcome> {
        match field {
            MagnetField::Bdes => self.write_bdes(value.as_f64(&self.bdes.name())?).await,
            MagnetField::Bcon => self.write_bcon(value.as_f64(&self.bcon.name())?).await,
            MagnetField::Bctrl => {
                let channel = MagnetField::Bctrl.channel_name(&self.device_name);
                self.write_bctrl(value.as_f64(&channel)?).await
            }
            MagnetField::Ctrl => {
                let text = value.into_text();
                self.ctrl.validate(&text)?;
                let command = text
                    .parse::<CtrlCommand>()
                    .map_err(|err| SimError::InvalidChannelValue {
                        channel: self.ctrl.name(),
                        reason: err.to_string(),
                    })?;
                Ok(self.execute(command).await)
            }
            MagnetField::Abort => self.write_abort(value.into_text()),
            MagnetField::Bact | MagnetField::Madname | MagnetField::Statmsg => {
                Err(SimError::ChannelReadOnly(field.channel_name(&self.device_name)))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::sync::Detached;
    use tracing_test::traced_test;

    fn quad() -> Magnet {
        Magnet::new(
            MagnetSpec::new("QUAD:LI21:201", "q21201", 0.108, -1.2),
            &MagnetOptions::default(),
            Arc::new(Detached),
        )
        .unwrap()
    }

    #[test]
    fn test_new_seeds_all_slots() {
        let magnet = quad();
        assert_eq!(magnet.bdes(), -1.2);
        assert_eq!(magnet.bcon(), -1.2);
        assert_eq!(magnet.bact(), -1.2);
        assert_eq!(magnet.mag_type(), MagnetType::Quad);
        assert_eq!(magnet.read_field(MagnetField::Madname), ChannelValue::from("Q21201"));
        assert_eq!(magnet.read_field(MagnetField::Statmsg), ChannelValue::from(""));
        assert_eq!(magnet.ctrl_state(), "Ready");
        assert_eq!(magnet.memory(), SetpointMemory::default());
    }

    #[test]
    fn test_zero_length_quad_and_bend_rejected() {
        for device in ["QUAD:LI21:201", "BEND:LI21:231"] {
            let err = Magnet::new(
                MagnetSpec::new(device, "E1", 0.0, 0.0),
                &MagnetOptions::default(),
                Arc::new(Detached),
            )
            .unwrap_err();
            assert!(matches!(err, SimError::Configuration(_)), "{device}: {err}");
        }
    }

    #[test]
    fn test_zero_length_corrector_accepted() {
        let magnet = Magnet::new(
            MagnetSpec::new("XCOR:LI21:101", "XC21101", 0.0, 0.001),
            &MagnetOptions::default(),
            Arc::new(Detached),
        )
        .unwrap();
        assert_eq!(magnet.length(), 0.0);
    }

    #[test]
    fn test_non_magnet_device_rejected() {
        let err = Magnet::new(
            MagnetSpec::new("BPMS:LI21:201", "BPM21201", 0.0, 0.0),
            &MagnetOptions::default(),
            Arc::new(Detached),
        )
        .unwrap_err();
        assert!(matches!(err, SimError::Configuration(_)));
    }

    #[test]
    fn test_float_metadata() {
        let meta = quad().field_metadata(MagnetField::Bact);
        assert_eq!(meta.name, "QUAD:LI21:201:BACT");
        assert_eq!(meta.min_value, Some(-0.006));
        assert_eq!(meta.max_value, Some(0.006));
        assert_eq!(meta.precision, Some(4));
        assert_eq!(meta.units.as_deref(), Some("kG"));
        assert!(meta.read_only);

        let bctrl = quad().field_metadata(MagnetField::Bctrl);
        assert_eq!(bctrl.name, "QUAD:LI21:201:BCTRL");
        assert!(!bctrl.read_only);
    }

    #[tokio::test]
    async fn test_undo_toggles_between_last_two_values() {
        let magnet = quad();
        magnet.write_bdes(1.0).await.unwrap();
        magnet.write_bdes(2.0).await.unwrap();

        assert_eq!(magnet.execute(CtrlCommand::UndoBdes).await, CommandOutcome::Updated);
        assert_eq!(magnet.bdes(), 1.0);
        assert_eq!(magnet.execute(CtrlCommand::UndoBdes).await, CommandOutcome::Updated);
        assert_eq!(magnet.bdes(), 2.0);
    }

    #[tokio::test]
    async fn test_load_restores_zero() {
        let magnet = quad();
        magnet.write_bdes(0.0).await.unwrap();
        magnet.execute(CtrlCommand::SaveBdes).await;
        magnet.write_bdes(0.004).await.unwrap();

        assert_eq!(magnet.execute(CtrlCommand::LoadBdes).await, CommandOutcome::Updated);
        assert_eq!(magnet.bdes(), 0.0);
    }

    #[tokio::test]
    async fn test_bcon_to_bdes_records_undo() {
        let magnet = quad();
        magnet.write_bcon(0.002).await.unwrap();
        magnet.execute(CtrlCommand::BconToBdes).await;
        assert_eq!(magnet.bdes(), 0.002);
        assert_eq!(magnet.memory().bdes_for_undo, Some(-1.2));
        assert_eq!(magnet.bact(), -1.2);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unimplemented_command_warns() {
        let magnet = quad();
        let outcome = magnet.execute(CtrlCommand::Stdz).await;
        assert_eq!(outcome, CommandOutcome::Unsupported);
        assert_eq!(magnet.ctrl_state(), "STDZ");
        assert!(logs_contain("not implemented"));
    }

    #[tokio::test]
    async fn test_write_field_rejections() {
        let magnet = quad();

        let err = magnet
            .write_field(MagnetField::Bact, ChannelValue::from(1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, SimError::ChannelReadOnly(ref name) if name == "QUAD:LI21:201:BACT"));

        let err = magnet
            .write_field(MagnetField::Bdes, "fast".into())
            .await
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidChannelValue { .. }));

        let err = magnet
            .write_field(MagnetField::Ctrl, "JIGGLE".into())
            .await
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidChannelValue { .. }));

        let err = magnet
            .write_field(MagnetField::Bdes, f64::NAN.into())
            .await
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidChannelValue { .. }));

        assert_eq!(magnet.bdes(), -1.2);
        assert_eq!(magnet.ctrl_state(), "Ready");
        assert_eq!(magnet.memory(), SetpointMemory::default());
    }

    #[tokio::test]
    async fn test_abort_is_stored_only() {
        let magnet = quad();
        magnet
            .write_field(MagnetField::Abort, "Abort".into())
            .await
            .unwrap();
        assert_eq!(magnet.read_field(MagnetField::Abort), ChannelValue::from("Abort"));
        assert_eq!(magnet.bact(), -1.2);
        assert!(magnet
            .write_field(MagnetField::Abort, "Halt".into())
            .await
            .is_err());
    }
}
