use crate::error::{Error, Result};
use crate::grid::{CellState, Grid};




/// Cells keep at least this fraction of their density when gas is removed.
pub const MINIMUM_DENSITY_FRACTION: f64 = 0.1;




/**
 * What happens to each cell a source acts on. Densities are in code units;
 * `energy_density` is thermal energy per unit volume.
 */
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CellOperation {
    Subtract {
        density: f64,
    },
    Inject {
        density: f64,
        energy_density: f64,
        metal_fraction: f64,
        velocity: [f64; 3],
    },
}

impl CellOperation {

    /// The same operation with its densities multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        match *self {
            CellOperation::Subtract { density } => CellOperation::Subtract { density: density * factor },
            CellOperation::Inject { density, energy_density, metal_fraction, velocity } => CellOperation::Inject {
                density: density * factor,
                energy_density: energy_density * factor,
                metal_fraction,
                velocity,
            },
        }
    }
}




/// Mass and momentum density moved by one cell operation, and totals over
/// many.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Transfer {
    pub cells: usize,
    pub mass: f64,
    pub momentum: [f64; 3],
}

impl Transfer {
    pub fn add(&mut self, other: &Transfer) {
        self.cells += other.cells;
        self.mass += other.mass;
        for d in 0..3 {
            self.momentum[d] += other.momentum[d];
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.cells as f64, self.mass, self.momentum[0], self.momentum[1], self.momentum[2]]
    }

    pub fn from_slice(values: &[f64]) -> Self {
        Self {
            cells: values[0].round() as usize,
            mass: values[1],
            momentum: [values[2], values[3], values[4]],
        }
    }
}




/**
 * Remove gas from a cell. The density, metal and colour fields are scaled
 * by a common factor, leaving at least `MINIMUM_DENSITY_FRACTION` of the
 * density; velocities and specific energies are unchanged. Returns the
 * density and momentum density removed.
 */
pub fn subtract(cell: &mut CellState, density: f64) -> Result<Transfer> {
    if cell.density <= 0.0 || !cell.density.is_finite() {
        return Err(Error::NegativeMassDensity(cell.density))
    }
    let factor = (1.0 - density / cell.density).max(MINIMUM_DENSITY_FRACTION);
    let removed = cell.density * (1.0 - factor);

    cell.density *= factor;
    cell.metal = cell.metal.map(|m| m * factor);
    cell.colour = cell.colour.map(|c| c * factor);

    Ok(Transfer {
        cells: 1,
        mass: removed,
        momentum: [removed * cell.velocity[0], removed * cell.velocity[1], removed * cell.velocity[2]],
    })
}




/**
 * Add ejecta moving with `velocity` to a cell, together with thermal energy
 * and metals. Momentum and total energy are conserved. Returns the density
 * and momentum density added. A cell left without gas is not touched.
 */
pub fn inject(cell: &mut CellState, density: f64, energy_density: f64, metal_fraction: f64, velocity: [f64; 3]) -> Result<Transfer> {
    if cell.density < 0.0 || !cell.density.is_finite() {
        return Err(Error::NegativeMassDensity(cell.density))
    }
    let rho = cell.density;
    let new = rho + density;

    if new <= 0.0 {
        return Ok(Transfer::default())
    }
    let vp2: f64 = velocity.iter().map(|v| v * v).sum();

    for d in 0..3 {
        cell.velocity[d] = (rho * cell.velocity[d] + density * velocity[d]) / new;
    }
    cell.total_energy = (rho * cell.total_energy + energy_density + 0.5 * density * vp2) / new;
    cell.gas_energy = cell.gas_energy.map(|e| (rho * e + energy_density) / new);
    cell.metal = cell.metal.map(|m| m + density * metal_fraction);
    cell.density = new;

    Ok(Transfer {
        cells: 1,
        mass: density,
        momentum: [density * velocity[0], density * velocity[1], density * velocity[2]],
    })
}




/**
 * Apply an operation to the listed cells of a grid which the grid holds.
 * The returned totals are masses and momenta (density times cell volume).
 */
pub fn apply_to_grid(grid: &mut Grid, cells: &[(i64, i64, i64)], op: &CellOperation) -> Result<Transfer> {
    let mut total = Transfer::default();
    let volume = grid.cell_volume();
    let space = grid.index_space().clone();

    for &index in cells.iter().filter(|&&c| space.contains(c)) {
        let mut cell = grid.read_cell(index)?;
        let moved = match *op {
            CellOperation::Subtract { density } => subtract(&mut cell, density)?,
            CellOperation::Inject { density, energy_density, metal_fraction, velocity } => {
                inject(&mut cell, density, energy_density, metal_fraction, velocity)?
            }
        };
        grid.write_cell(index, &cell)?;
        total.add(&moved);
    }
    total.mass *= volume;
    total.momentum.iter_mut().for_each(|p| *p *= volume);
    Ok(total)
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;

    fn cell() -> CellState {
        CellState {
            density: 2.0,
            velocity: [1.0, -1.0, 0.5],
            total_energy: 3.0,
            gas_energy: Some(2.0),
            metal: Some(0.2),
            colour: Some(1.0),
        }
    }

    #[test]
    fn subtraction_scales_density_and_tracers_together() {
        let mut c = cell();
        let moved = subtract(&mut c, 0.5).unwrap();
        assert_eq!(c.density, 1.5);
        assert!((c.metal.unwrap() - 0.15).abs() < 1e-15);
        assert_eq!(c.colour, Some(0.75));
        assert_eq!(c.velocity, [1.0, -1.0, 0.5]);
        assert_eq!(c.total_energy, 3.0);
        assert_eq!(moved.mass, 0.5);
        assert_eq!(moved.momentum, [0.5, -0.5, 0.25]);
    }

    #[test]
    fn subtraction_leaves_a_density_floor() {
        let mut c = cell();
        let moved = subtract(&mut c, 10.0).unwrap();
        assert!((c.density - 0.2).abs() < 1e-15);
        assert!((moved.mass - 1.8).abs() < 1e-15);
    }

    #[test]
    fn subtraction_from_empty_cells_fails() {
        let mut c = cell();
        c.density = 0.0;
        assert!(matches!(subtract(&mut c, 1.0), Err(Error::NegativeMassDensity(_))));
    }

    #[test]
    fn injection_conserves_momentum_and_energy() {
        let mut c = cell();
        let before_momentum: Vec<f64> = c.velocity.iter().map(|v| v * c.density).collect();
        let before_energy = c.density * c.total_energy;
        let vp = [0.0, 2.0, 0.0];
        inject(&mut c, 1.0, 4.0, 0.1, vp).unwrap();

        assert_eq!(c.density, 3.0);
        for d in 0..3 {
            assert!((c.velocity[d] * c.density - (before_momentum[d] + vp[d])).abs() < 1e-12);
        }
        assert!((c.density * c.total_energy - (before_energy + 4.0 + 2.0)).abs() < 1e-12);
        assert!((c.metal.unwrap() - 0.3).abs() < 1e-15);
        assert!((c.gas_energy.unwrap() - 8.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn injection_without_mass_into_an_empty_cell_changes_nothing() {
        let mut c = cell();
        c.density = 0.0;
        let moved = inject(&mut c, 0.0, 4.0, 0.1, [0.0, 2.0, 0.0]).unwrap();

        assert_eq!(moved, Transfer::default());
        assert_eq!(c.density, 0.0);
        assert_eq!(c.velocity, [1.0, -1.0, 0.5]);
        assert_eq!(c.total_energy, 3.0);
        assert_eq!(c.gas_energy, Some(2.0));
    }
}
