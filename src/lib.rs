//! # magsim
//!
//! Simulated magnet control service. Every magnet in the device map publishes
//! a small group of channels (setpoints, readback, control command) and every
//! readback change is pushed to an external physics model, so that the model
//! always reflects what the simulated hardware is doing.
//!
//! ## Crate Structure
//!
//! - **`config`**: Layered settings (defaults, TOML file, environment).
//! - **`tracing_init`**: Subscriber setup for the binary.
//! - **`names`**: The element/device name map.
//! - **`service`**: Bootstrap from the model and the per-device magnets.
//! - **`adapter`**: Channel access over the service.
//! - **`console`**: Line-oriented console on top of any channel access.
//! - **`app`**: Startup glue used by the binary.
//! - **`demo`**: Built-in inventory and lattice for `--fake-model` runs.
//!
//! The magnet state machine lives in `magsim-driver`, the model protocol and
//! client in `magsim-model`, shared types in `magsim-core`.

pub mod adapter;
pub mod app;
pub mod config;
pub mod console;
pub mod demo;
pub mod names;
pub mod service;
pub mod tracing_init;

pub use adapter::ServiceChannels;
pub use app::{launch, ModelBackend};
pub use config::Settings;
pub use names::DeviceNames;
pub use service::{MagnetService, ModelSync};
