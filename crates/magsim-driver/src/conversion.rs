//! Unit conversion between the physics model and the control system.
//!
//! The model speaks SI-style attributes (`bl_hkick` in T*m, `b1_gradient` in
//! T/m, `b_field` in T). The control system publishes BACT in kG*m for
//! correctors, kG for quadrupoles and GeV/c for bends, with the opposite sign
//! convention.
//!
//! The two bend constants are kept exactly as the machine uses them. They are
//! not algebraic inverses, so converting a bend value out and back does not
//! return the starting value.

use std::fmt;
use std::str::FromStr;

use magsim_core::error::SimError;
use serde::{Deserialize, Serialize};

/// Bend: model `b_field * length` to BACT.
pub const BEND_FIELD_TO_BACT: f64 = -0.11028748186;

/// Bend: BACT to model `b_field * length`.
pub const BACT_TO_BEND_FIELD: f64 = -9.06721219;

/// Corrector kick (T*m) to BACT (kG*m).
pub fn bl_kick_to_bact(bl_kick: f64) -> f64 {
    -bl_kick * 10.0
}

/// Corrector BACT (kG*m) to kick (T*m).
pub fn bact_to_bl_kick(bact: f64) -> f64 {
    -bact / 10.0
}

/// Quadrupole gradient (T/m) to integrated BACT (kG).
pub fn quad_gradient_to_bact(b1_gradient: f64, length: f64) -> f64 {
    -b1_gradient * 10.0 * length
}

/// Quadrupole BACT (kG) to gradient (T/m). Undefined for zero length.
pub fn quad_bact_to_gradient(bact: f64, length: f64) -> f64 {
    -bact / (10.0 * length)
}

/// Bend field (T) to BACT (GeV/c).
pub fn bend_field_to_bact(b_field: f64, length: f64) -> f64 {
    BEND_FIELD_TO_BACT * b_field * length
}

/// Bend BACT (GeV/c) to field (T). Undefined for zero length.
pub fn bend_bact_to_field(bact: f64, length: f64) -> f64 {
    BACT_TO_BEND_FIELD * bact / length
}

/// Magnet family, taken from the first `:`-separated field of the device name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MagnetType {
    /// Horizontal corrector.
    Xcor,
    /// Vertical corrector.
    Ycor,
    /// Quadrupole.
    Quad,
    /// Dipole bend.
    Bend,
}

impl MagnetType {
    /// Every family, in bootstrap query order.
    pub const ALL: [MagnetType; 4] = [
        MagnetType::Xcor,
        MagnetType::Ycor,
        MagnetType::Quad,
        MagnetType::Bend,
    ];

    /// Device-name prefix.
    pub fn prefix(self) -> &'static str {
        match self {
            MagnetType::Xcor => "XCOR",
            MagnetType::Ycor => "YCOR",
            MagnetType::Quad => "QUAD",
            MagnetType::Bend => "BEND",
        }
    }

    /// Family of a device such as `QUAD:LI21:201`. `None` for other devices.
    pub fn from_device_name(device_name: &str) -> Option<Self> {
        let prefix = device_name.split(':').next()?;
        prefix.parse().ok()
    }

    /// Model attribute holding this family's strength.
    pub fn model_attribute(self) -> &'static str {
        match self {
            MagnetType::Xcor => "bl_hkick",
            MagnetType::Ycor => "bl_vkick",
            MagnetType::Quad => "b1_gradient",
            MagnetType::Bend => "b_field",
        }
    }

    /// Lattice selection covering this family's elements.
    pub fn lattice_selection(self) -> &'static str {
        match self {
            MagnetType::Xcor => "Kicker::X*",
            MagnetType::Ycor => "Kicker::Y*",
            MagnetType::Quad => "Quadrupole::*",
            MagnetType::Bend => "Sbend::*",
        }
    }

    /// Engineering units of BACT for this family.
    pub fn bact_units(self) -> &'static str {
        match self {
            MagnetType::Xcor | MagnetType::Ycor => "kG-m",
            MagnetType::Quad => "kG",
            MagnetType::Bend => "GeV/c",
        }
    }

    /// Whether conversions divide by the element length.
    pub fn requires_length(self) -> bool {
        matches!(self, MagnetType::Quad | MagnetType::Bend)
    }

    /// Model attribute value to BACT.
    pub fn to_bact(self, model_value: f64, length: f64) -> f64 {
        match self {
            MagnetType::Xcor | MagnetType::Ycor => bl_kick_to_bact(model_value),
            MagnetType::Quad => quad_gradient_to_bact(model_value, length),
            MagnetType::Bend => bend_field_to_bact(model_value, length),
        }
    }

    /// BACT to model attribute value.
    pub fn to_model(self, bact: f64, length: f64) -> f64 {
        match self {
            MagnetType::Xcor | MagnetType::Ycor => bact_to_bl_kick(bact),
            MagnetType::Quad => quad_bact_to_gradient(bact, length),
            MagnetType::Bend => bend_bact_to_field(bact, length),
        }
    }
}

impl fmt::Display for MagnetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for MagnetType {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MagnetType::ALL
            .into_iter()
            .find(|t| t.prefix() == s)
            .ok_or_else(|| SimError::Configuration(format!("unknown magnet family '{s}'")))
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        let tolerance = 1e-12 * expected.abs().max(1.0);
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_corrector_round_trip() {
        for x in [0.003, -0.0057, 0.0, 1.25e-4, 5.0] {
            assert_close(bl_kick_to_bact(bact_to_bl_kick(x)), x);
        }
        assert_eq!(bl_kick_to_bact(0.5), -5.0);
    }

    #[test]
    fn test_quad_round_trip() {
        for length in [0.108, 0.5, 1.0, 3.25] {
            for x in [0.003, -2.4, 17.0] {
                assert_close(
                    quad_gradient_to_bact(quad_bact_to_gradient(x, length), length),
                    x,
                );
            }
        }
    }

    #[test]
    fn test_bend_constants_are_literal() {
        assert_eq!(BEND_FIELD_TO_BACT, -0.11028748186);
        assert_eq!(BACT_TO_BEND_FIELD, -9.06721219);
        assert_eq!(bend_field_to_bact(1.0, 1.0), -0.11028748186);
        assert_eq!(bend_bact_to_field(1.0, 1.0), -9.06721219);
    }

    #[test]
    fn test_bend_round_trip_is_not_identity() {
        assert_ne!(BEND_FIELD_TO_BACT * BACT_TO_BEND_FIELD, 1.0);
        let bact = 1.0;
        let back = bend_field_to_bact(bend_bact_to_field(bact, 2.0), 2.0);
        assert_ne!(back, bact);
        assert!((back - bact).abs() < 1e-8);
    }

    #[test]
    fn test_family_from_device_name() {
        assert_eq!(
            MagnetType::from_device_name("QUAD:LI21:201"),
            Some(MagnetType::Quad)
        );
        assert_eq!(
            MagnetType::from_device_name("XCOR:LI21:101"),
            Some(MagnetType::Xcor)
        );
        assert_eq!(MagnetType::from_device_name("BPMS:LI21:201"), None);
        assert_eq!(MagnetType::from_device_name(""), None);
    }

    #[test]
    fn test_family_attributes() {
        let attrs: Vec<_> = MagnetType::ALL
            .iter()
            .map(|t| (t.model_attribute(), t.lattice_selection()))
            .collect();
        assert_eq!(
            attrs,
            vec![
                ("bl_hkick", "Kicker::X*"),
                ("bl_vkick", "Kicker::Y*"),
                ("b1_gradient", "Quadrupole::*"),
                ("b_field", "Sbend::*"),
            ]
        );
        assert!(!MagnetType::Ycor.requires_length());
        assert!(MagnetType::Bend.requires_length());
    }
}
