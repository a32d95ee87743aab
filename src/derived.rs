//! Derived cell quantities needed by the formation and feedback routines.
//! These are simple stand-ins for the chemistry and cooling network: an
//! ideal monatomic gas of fixed mean molecular weight and a piecewise
//! power-law cooling curve.

use crate::error::Result;
use crate::grid::{CellState, FieldKind, Grid};
use crate::units::{Units, BOLTZMANN, PROTON_MASS};

/// Adiabatic index.
pub const GAMMA: f64 = 5.0 / 3.0;

/// Mean molecular weight of a neutral primordial gas.
pub const MU: f64 = 1.22;

/// Temperature floor in K.
pub const TEMPERATURE_FLOOR: f64 = 1.0;




/// Specific internal energy of a cell, in code units. The gas energy field
/// is used if the grid carries one (dual energy formalism).
pub fn internal_energy(cell: &CellState) -> f64 {
    match cell.gas_energy {
        Some(e) => e,
        None => {
            let v2: f64 = cell.velocity.iter().map(|v| v * v).sum();
            cell.total_energy - 0.5 * v2
        }
    }
}




/// Gas temperature in K.
pub fn temperature(cell: &CellState, units: &Units) -> f64 {
    let e = internal_energy(cell) * units.velocity * units.velocity;
    ((GAMMA - 1.0) * MU * PROTON_MASS * e / BOLTZMANN).max(TEMPERATURE_FLOOR)
}




/// Squared adiabatic sound speed in code units.
pub fn sound_speed_squared(cell: &CellState) -> f64 {
    (GAMMA * (GAMMA - 1.0) * internal_energy(cell)).max(0.0)
}




/// Cooling function in erg cm^3 / s.
pub fn cooling_function(temperature: f64) -> f64 {
    if temperature < 1e4 {
        1e-26 * (temperature / 1e4).powi(2)
    } else if temperature < 1e5 {
        1e-26 * (temperature / 1e4).powi(4)
    } else {
        let lines = 1e-22 * (temperature / 1e5).powf(-0.7);
        let bremsstrahlung = 2.3e-24 * (temperature / 1e7).sqrt();
        lines.max(bremsstrahlung)
    }
}




/// Cooling time in code units: thermal energy density over the volumetric
/// cooling rate.
pub fn cooling_time(cell: &CellState, units: &Units) -> f64 {
    let t = temperature(cell, units);
    let rho = cell.density * units.density;
    let n = rho / (MU * PROTON_MASS);
    let thermal = rho * internal_energy(cell) * units.velocity * units.velocity;
    let rate = n * n * cooling_function(t);

    if rate > 0.0 {
        thermal / rate / units.time
    } else {
        f64::INFINITY
    }
}




/// Evaluate a cell function over every cell of a grid, in row-major order.
pub fn compute_field<F>(grid: &Grid, f: F) -> Result<Vec<f64>>
where
    F: Fn(&CellState) -> f64
{
    grid.require_field(FieldKind::Density)?;
    grid.index_space()
        .iter()
        .map(|index| grid.read_cell(index).map(|cell| f(&cell)))
        .collect()
}
