//! Built-in demonstration inventory and lattice.
//!
//! A small slice of linac sector 21: two correctors per plane, three
//! quadrupoles and a bend, plus a BPM that the magnet service must ignore.
//! Used for `--fake-model` runs and when no device map is configured.

use magsim_core::error::SimResult;
use magsim_model::FakeElement;

use crate::names::DeviceNames;

const PAIRS: [(&str, &str); 9] = [
    ("XC21101", "XCOR:LI21:101"),
    ("XC21201", "XCOR:LI21:201"),
    ("YC21102", "YCOR:LI21:102"),
    ("YC21202", "YCOR:LI21:202"),
    ("Q21101", "QUAD:LI21:101"),
    ("Q21201", "QUAD:LI21:201"),
    ("Q21301", "QUAD:LI21:301"),
    ("BX21", "BEND:LI21:231"),
    ("BPM21201", "BPMS:LI21:201"),
];

/// Demonstration device map.
pub fn device_names() -> SimResult<DeviceNames> {
    DeviceNames::from_pairs(PAIRS)
}

/// Demonstration lattice, in beamline order.
pub fn lattice() -> Vec<FakeElement> {
    vec![
        FakeElement::new("XC21101", "Kicker", 2030.10, 0.0).with_attribute("bl_hkick", 1.2e-4),
        FakeElement::new("YC21102", "Kicker", 2030.35, 0.0).with_attribute("bl_vkick", -0.8e-4),
        FakeElement::new("Q21101", "Quadrupole", 2031.20, 0.108)
            .with_attribute("b1_gradient", 3.75),
        FakeElement::new("BPM21201", "Monitor", 2034.00, 0.0),
        FakeElement::new("Q21201", "Quadrupole", 2035.20, 0.108)
            .with_attribute("b1_gradient", -3.75),
        FakeElement::new("XC21201", "Kicker", 2036.10, 0.0),
        FakeElement::new("YC21202", "Kicker", 2036.35, 0.0).with_attribute("bl_vkick", 2.5e-5),
        FakeElement::new("BX21", "Sbend", 2040.00, 2.0).with_attribute("b_field", 0.35),
        FakeElement::new("Q21301", "Quadrupole", 2045.20, 0.108)
            .with_attribute("b1_gradient", 3.9),
        FakeElement::new("Q21401", "Quadrupole", 2050.20, 0.108)
            .with_attribute("b1_gradient", -3.9),
    ]
}
