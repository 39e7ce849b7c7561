//! Behavior of the magnet control state machine against a recording sync
//! target.

#![allow(clippy::float_cmp)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use magsim_core::{SimError, SimResult};
use magsim_driver::{
    CommandOutcome, CtrlCommand, Magnet, MagnetOptions, MagnetSpec, MagnetSync, MagnetType,
    ReadbackChange,
};
use parking_lot::Mutex;

#[derive(Default)]
struct RecordingSync {
    changes: Mutex<Vec<ReadbackChange>>,
    fail: AtomicBool,
}

impl RecordingSync {
    fn changes(&self) -> Vec<ReadbackChange> {
        self.changes.lock().clone()
    }
}

#[async_trait]
impl MagnetSync for RecordingSync {
    async fn readback_changed(&self, change: &ReadbackChange) -> SimResult<()> {
        self.changes.lock().push(change.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(SimError::ModelDisconnected);
        }
        Ok(())
    }
}

fn magnet(device: &str, element: &str, length: f64, initial: f64) -> (Arc<Magnet>, Arc<RecordingSync>) {
    let sync = Arc::new(RecordingSync::default());
    let magnet = Magnet::new(
        MagnetSpec::new(device, element, length, initial),
        &MagnetOptions::default(),
        sync.clone(),
    )
    .unwrap();
    (Arc::new(magnet), sync)
}

fn corrector() -> (Arc<Magnet>, Arc<RecordingSync>) {
    magnet("XCOR:LI21:101", "XC21101", 0.0, 0.0)
}

#[tokio::test]
async fn test_perturb_moves_readback_and_notifies_once() {
    let (magnet, sync) = corrector();
    magnet.write_bdes(0.003).await.unwrap();
    assert!(sync.changes().is_empty());

    let outcome = magnet.execute(CtrlCommand::Perturb).await;
    assert_eq!(outcome, CommandOutcome::Committed { bact: 0.003 });
    assert_eq!(magnet.bact(), 0.003);

    let changes = sync.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].device_name, "XCOR:LI21:101");
    assert_eq!(changes[0].element_name, "XC21101");
    assert_eq!(changes[0].mag_type, MagnetType::Xcor);
    assert_eq!(changes[0].bact, 0.003);
    assert_eq!(changes[0].model_attribute(), "bl_hkick");
    assert_eq!(changes[0].model_value(), -0.003 / 10.0);
}

#[tokio::test]
async fn test_save_change_load_restores() {
    let (magnet, sync) = corrector();
    magnet.write_bdes(0.001).await.unwrap();
    magnet.execute(CtrlCommand::SaveBdes).await;
    magnet.write_bdes(0.005).await.unwrap();

    assert_eq!(magnet.execute(CtrlCommand::LoadBdes).await, CommandOutcome::Updated);
    assert_eq!(magnet.bdes(), 0.001);
    assert_eq!(magnet.bact(), 0.0);
    assert!(sync.changes().is_empty());
}

#[tokio::test]
async fn test_load_without_save_is_noop() {
    let (magnet, _) = corrector();
    magnet.write_bdes(0.002).await.unwrap();
    assert_eq!(magnet.execute(CtrlCommand::LoadBdes).await, CommandOutcome::Skipped);
    assert_eq!(magnet.bdes(), 0.002);
}

#[tokio::test]
async fn test_undo_without_prior_write_is_noop() {
    let (magnet, sync) = corrector();
    assert_eq!(magnet.execute(CtrlCommand::UndoBdes).await, CommandOutcome::Skipped);
    assert_eq!(magnet.bdes(), 0.0);
    assert_eq!(magnet.bact(), 0.0);
    assert!(sync.changes().is_empty());
}

#[tokio::test]
async fn test_undo_restores_previous_bdes() {
    let (magnet, _) = corrector();
    magnet.write_bdes(0.004).await.unwrap();
    assert_eq!(magnet.execute(CtrlCommand::UndoBdes).await, CommandOutcome::Updated);
    assert_eq!(magnet.bdes(), 0.0);
}

#[tokio::test]
async fn test_bctrl_write_is_bdes_plus_perturb() {
    let (magnet, sync) = magnet("QUAD:LI21:201", "Q21201", 0.5, 1.0);

    let outcome = magnet.write_bctrl(-2.0).await.unwrap();
    assert_eq!(outcome, CommandOutcome::Committed { bact: -2.0 });
    assert_eq!(magnet.bdes(), -2.0);
    assert_eq!(magnet.bact(), -2.0);
    assert_eq!(magnet.bctrl(), -2.0);
    assert_eq!(magnet.memory().bdes_for_undo, Some(1.0));
    assert_eq!(magnet.ctrl_state(), "PERTURB");

    let changes = sync.changes();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].model_value(), 2.0 / (10.0 * 0.5));
}

#[tokio::test(start_paused = true)]
async fn test_trim_defers_readback_by_settle_time() {
    let (magnet, sync) = corrector();
    magnet.write_bdes(0.003).await.unwrap();

    let trim = tokio::spawn({
        let magnet = magnet.clone();
        async move { magnet.execute(CtrlCommand::Trim).await }
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(magnet.bact(), 0.0);
    assert!(sync.changes().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(magnet.bact(), 0.003);
    assert_eq!(trim.await.unwrap(), CommandOutcome::Committed { bact: 0.003 });
    assert_eq!(sync.changes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_writes_wait_for_running_trim() {
    let (magnet, _) = corrector();
    magnet.write_bdes(0.003).await.unwrap();

    let trim = tokio::spawn({
        let magnet = magnet.clone();
        async move { magnet.execute(CtrlCommand::Trim).await }
    });
    tokio::task::yield_now().await;

    // Queued behind the TRIM; it must not change what the TRIM commits.
    magnet.write_bdes(0.005).await.unwrap();

    assert_eq!(trim.await.unwrap(), CommandOutcome::Committed { bact: 0.003 });
    assert_eq!(magnet.bact(), 0.003);
    assert_eq!(magnet.bdes(), 0.005);
}

#[tokio::test]
async fn test_unrecognized_commands_change_nothing() {
    let (magnet, sync) = magnet("BEND:LI21:231", "BX21", 2.0, 0.25);
    magnet.write_bcon(0.5).await.unwrap();

    for command in [
        CtrlCommand::Ready,
        CtrlCommand::DacZero,
        CtrlCommand::Calb,
        CtrlCommand::Stdz,
        CtrlCommand::Reset,
        CtrlCommand::TurnOn,
        CtrlCommand::TurnOff,
    ] {
        assert_eq!(magnet.execute(command).await, CommandOutcome::Unsupported);
        assert_eq!(magnet.ctrl_state(), command.as_str());
    }
    assert_eq!(magnet.bdes(), 0.25);
    assert_eq!(magnet.bcon(), 0.5);
    assert_eq!(magnet.bact(), 0.25);
    assert!(sync.changes().is_empty());
}

#[tokio::test]
async fn test_failed_sync_keeps_readback() {
    let (magnet, sync) = corrector();
    sync.fail.store(true, Ordering::SeqCst);
    magnet.write_bdes(0.002).await.unwrap();

    let outcome = magnet.execute(CtrlCommand::Perturb).await;
    assert!(matches!(outcome, CommandOutcome::SyncFailed { bact, .. } if bact == 0.002));
    assert!(!outcome.is_ok());
    assert_eq!(magnet.bact(), 0.002);
}
