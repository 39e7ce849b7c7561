//! Shared defaults and hard limits.
//!
//! Centralizes the timing constants and payload limits used by the model
//! client, the magnet state machine and the configuration defaults.

use std::time::Duration;

// =============================================================================
// Timing
// =============================================================================

/// Settling delay applied by the TRIM command before the readback follows
/// the setpoint.
pub const DEFAULT_TRIM_SETTLE: Duration = Duration::from_millis(200);

/// Upper bound on a single model request/reply round trip.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Model endpoint
// =============================================================================

/// Default TCP port of the physics model command channel.
pub const DEFAULT_MODEL_PORT: u16 = 12312;

/// The model always runs on the local host.
pub const DEFAULT_MODEL_HOST: &str = "127.0.0.1";

// =============================================================================
// Channel display hints
// =============================================================================

/// Symmetric control limit published for setpoint and readback channels.
pub const DEFAULT_CTRL_LIMIT: f64 = 0.006;

/// Decimal places published for setpoint and readback channels.
pub const DEFAULT_PRECISION: u8 = 4;

// =============================================================================
// Size limits
// =============================================================================

/// Maximum accepted length of one reply line from the model (16 MB).
///
/// A full-lattice table for a large machine is a few hundred kilobytes; this
/// bound only stops a misbehaving peer from growing the buffer forever.
pub const MAX_REPLY_BYTES: usize = 16 * 1024 * 1024;
