use std::fmt;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::index_space::IndexSpace;
use crate::particle::ParticleRecord;




/// Identifier of a grid patch, unique within the hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridId(pub u64);

impl fmt::Display for GridId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}




/// Relation from a particle to the grid that owns it: the grid identifier
/// and the rank of the process holding the grid's data. It is resolved
/// through `Hierarchy::grid`, never dereferenced directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridRef {
    pub id: GridId,
    pub rank: usize,
}




/// The baryon fields a grid may carry. Velocities and energies are
/// specific (per unit mass); metal, colour and H2 fields are densities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Density,
    Velocity1,
    Velocity2,
    Velocity3,
    TotalEnergy,
    GasEnergy,
    Metal,
    Colour,
    H2I,
    DarkMatter,
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Density => "Density",
            FieldKind::Velocity1 => "x-velocity",
            FieldKind::Velocity2 => "y-velocity",
            FieldKind::Velocity3 => "z-velocity",
            FieldKind::TotalEnergy => "TotalEnergy",
            FieldKind::GasEnergy => "GasEnergy",
            FieldKind::Metal => "Metal_Density",
            FieldKind::Colour => "Colour",
            FieldKind::H2I => "H2I_Density",
            FieldKind::DarkMatter => "Dark_Matter_Density",
        }
    }
}




/**
 * The hydrodynamic state of a single cell, read out of and written back
 * into a grid's field arrays. Optional members are `None` when the grid
 * does not carry the field.
 */
#[derive(Clone, Debug, PartialEq)]
pub struct CellState {
    pub density: f64,
    pub velocity: [f64; 3],
    pub total_energy: f64,
    pub gas_energy: Option<f64>,
    pub metal: Option<f64>,
    pub colour: Option<f64>,
}




#[derive(Clone, Debug, Default)]
struct BaryonFields {
    kinds: Vec<FieldKind>,
    data: Vec<Vec<f64>>,
}




/**
 * A grid is a box-shaped patch of cells at one refinement level. Its index
 * space counts cells at that level from the lower corner of the unit
 * domain, so cell `(i, j, k)` spans `[i dx, (i + 1) dx)` on the first axis.
 *
 * Every process knows the extent of every grid, but only the owning
 * process holds field data; on other processes `fields` is `None`.
 */
#[derive(Clone, Debug)]
pub struct Grid {
    id: GridId,
    rank: usize,
    level: usize,
    space: IndexSpace,
    cell_width: f64,
    time: f64,
    dt: f64,
    fields: Option<BaryonFields>,
    pub(crate) particles: Vec<ParticleRecord>,
}




// ============================================================================
impl Grid {


    /**
     * Generate a grid without field data.
     */
    pub fn new(id: GridId, rank: usize, level: usize, space: IndexSpace, cell_width: f64) -> Self {
        Self {
            id,
            rank,
            level,
            space,
            cell_width,
            time: 0.0,
            dt: 0.0,
            fields: None,
            particles: Vec::new(),
        }
    }


    /**
     * Add a field, with values defined from a closure of the cell center.
     */
    pub fn with_field<F>(mut self, kind: FieldKind, f: F) -> Self
    where
        F: Fn([f64; 3]) -> f64
    {
        let data: Vec<f64> = self.space.iter().map(|index| f(self.cell_center(index))).collect();
        let fields = self.fields.get_or_insert_with(BaryonFields::default);

        match fields.kinds.iter().position(|k| *k == kind) {
            Some(n) => fields.data[n] = data,
            None => {
                fields.kinds.push(kind);
                fields.data.push(data);
            }
        }
        self
    }


    /**
     * Add the fields required by the particle routines: uniform density,
     * gas at rest, and uniform specific total and internal energy.
     */
    pub fn with_uniform_gas(self, density: f64, specific_energy: f64) -> Self {
        self.with_field(FieldKind::Density, |_| density)
            .with_field(FieldKind::Velocity1, |_| 0.0)
            .with_field(FieldKind::Velocity2, |_| 0.0)
            .with_field(FieldKind::Velocity3, |_| 0.0)
            .with_field(FieldKind::TotalEnergy, |_| specific_energy)
            .with_field(FieldKind::GasEnergy, |_| specific_energy)
    }


    pub fn with_time(mut self, time: f64, dt: f64) -> Self {
        self.time = time;
        self.dt = dt;
        self
    }


    pub fn id(&self) -> GridId {
        self.id
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn index_space(&self) -> &IndexSpace {
        &self.space
    }

    pub fn cell_width(&self) -> f64 {
        self.cell_width
    }

    pub fn cell_volume(&self) -> f64 {
        self.cell_width.powi(3)
    }

    pub fn num_cells(&self) -> usize {
        self.space.len()
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn set_time(&mut self, time: f64, dt: f64) {
        self.time = time;
        self.dt = dt;
    }

    pub fn grid_ref(&self) -> GridRef {
        GridRef { id: self.id, rank: self.rank }
    }


    /**
     * Whether this process holds the grid's data.
     */
    pub fn is_local(&self, rank: usize) -> bool {
        self.rank == rank && self.fields.is_some()
    }


    pub fn cell_center(&self, index: (i64, i64, i64)) -> [f64; 3] {
        let dx = self.cell_width;
        [(index.0 as f64 + 0.5) * dx, (index.1 as f64 + 0.5) * dx, (index.2 as f64 + 0.5) * dx]
    }


    /**
     * Return the index of the cell holding a point, if the point is inside
     * this grid.
     */
    pub fn cell_containing(&self, position: [f64; 3]) -> Option<(i64, i64, i64)> {
        let index = (
            (position[0] / self.cell_width).floor() as i64,
            (position[1] / self.cell_width).floor() as i64,
            (position[2] / self.cell_width).floor() as i64);

        if self.space.contains(index) {
            Some(index)
        } else {
            None
        }
    }


    pub fn contains_point(&self, position: [f64; 3]) -> bool {
        self.cell_containing(position).is_some()
    }


    /**
     * Return the position of a field in this grid's field list (the field
     * number), if the grid carries it.
     */
    pub fn field_number(&self, kind: FieldKind) -> Option<usize> {
        self.fields.as_ref().and_then(|f| f.kinds.iter().position(|k| *k == kind))
    }

    pub fn field(&self, kind: FieldKind) -> Option<&[f64]> {
        let n = self.field_number(kind)?;
        self.fields.as_ref().map(|f| f.data[n].as_slice())
    }

    pub fn field_mut(&mut self, kind: FieldKind) -> Option<&mut [f64]> {
        let n = self.field_number(kind)?;
        self.fields.as_mut().map(|f| f.data[n].as_mut_slice())
    }

    pub fn require_field(&self, kind: FieldKind) -> Result<&[f64]> {
        self.field(kind).ok_or(Error::MissingField(kind.name()))
    }


    /**
     * Read the hydrodynamic state of the cell at the given index. Fails if
     * the grid lacks density, velocity or total energy.
     */
    pub fn read_cell(&self, index: (i64, i64, i64)) -> Result<CellState> {
        let n = self.space.row_major_offset(index);
        let get = |kind| self.require_field(kind).map(|f| f[n]);
        let opt = |kind| self.field(kind).map(|f| f[n]);

        Ok(CellState {
            density: get(FieldKind::Density)?,
            velocity: [get(FieldKind::Velocity1)?, get(FieldKind::Velocity2)?, get(FieldKind::Velocity3)?],
            total_energy: get(FieldKind::TotalEnergy)?,
            gas_energy: opt(FieldKind::GasEnergy),
            metal: opt(FieldKind::Metal),
            colour: opt(FieldKind::Colour),
        })
    }


    /**
     * Write a cell state back into the field arrays. Optional members that
     * are `None` leave the corresponding field untouched.
     */
    pub fn write_cell(&mut self, index: (i64, i64, i64), cell: &CellState) -> Result<()> {
        let n = self.space.row_major_offset(index);
        let mut put = |kind: FieldKind, value: f64| -> Result<()> {
            let field = self.field_mut(kind).ok_or(Error::MissingField(kind.name()))?;
            field[n] = value;
            Ok(())
        };
        put(FieldKind::Density, cell.density)?;
        put(FieldKind::Velocity1, cell.velocity[0])?;
        put(FieldKind::Velocity2, cell.velocity[1])?;
        put(FieldKind::Velocity3, cell.velocity[2])?;
        put(FieldKind::TotalEnergy, cell.total_energy)?;

        if let Some(e) = cell.gas_energy {
            put(FieldKind::GasEnergy, e)?;
        }
        if let Some(m) = cell.metal {
            put(FieldKind::Metal, m)?;
        }
        if let Some(c) = cell.colour {
            put(FieldKind::Colour, c)?;
        }
        Ok(())
    }


    /**
     * Return the total gas mass on this grid, in code units.
     */
    pub fn total_mass(&self) -> Result<f64> {
        Ok(self.require_field(FieldKind::Density)?.iter().sum::<f64>() * self.cell_volume())
    }

    pub fn particles(&self) -> &[ParticleRecord] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut Vec<ParticleRecord> {
        &mut self.particles
    }


    /**
     * Remove dead particles (disabled or massless) from the resident list
     * and return them.
     */
    pub fn prune_particles(&mut self) -> Vec<ParticleRecord> {
        let (dead, alive): (Vec<_>, Vec<_>) = self.particles.drain(..).partition(|p| p.is_dead());
        self.particles = alive;
        dead
    }


    pub(crate) fn validate(&self) -> Result<()> {
        if self.space.is_empty() {
            return Err(Error::InvalidGrid(format!("grid {} has no cells", self.id)))
        }
        if let Some(fields) = &self.fields {
            for (kind, data) in fields.kinds.iter().zip(&fields.data) {
                if data.len() != self.space.len() {
                    return Err(Error::InvalidGrid(format!(
                        "field {} on grid {} has {} values for {} cells",
                        kind.name(), self.id, data.len(), self.space.len())))
                }
            }
        }
        Ok(())
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::index_space::range3d;

    fn grid() -> Grid {
        Grid::new(GridId(1), 0, 1, range3d(2..6, 0..4, 4..8), 0.125)
            .with_uniform_gas(1.0, 2.0)
            .with_field(FieldKind::Metal, |x| x[0])
    }

    #[test]
    fn cells_are_located_by_position() {
        let g = grid();
        assert!(g.contains_point([0.25, 0.0, 0.5]));
        assert!(!g.contains_point([0.75, 0.4, 0.6]));
        assert_eq!(g.cell_containing([0.3, 0.1, 0.6]), Some((2, 0, 4)));
        assert_eq!(g.cell_containing([0.8, 0.1, 0.6]), None);
        assert_eq!(g.cell_center((2, 0, 4)), [0.3125, 0.0625, 0.5625]);
    }

    #[test]
    fn fields_are_evaluated_at_cell_centers() {
        let g = grid();
        let cell = g.read_cell((3, 1, 5)).unwrap();
        assert_eq!(cell.density, 1.0);
        assert_eq!(cell.metal, Some(0.4375));
        assert_eq!(cell.colour, None);
        assert_eq!(g.field_number(FieldKind::Metal), Some(6));
        assert!((g.total_mass().unwrap() - 64.0 * 0.125f64.powi(3)).abs() < 1e-12);
    }

    #[test]
    fn written_cells_can_be_read_back() {
        let mut g = grid();
        let mut cell = g.read_cell((4, 2, 6)).unwrap();
        cell.density = 0.5;
        cell.velocity = [1.0, 2.0, 3.0];
        g.write_cell((4, 2, 6), &cell).unwrap();
        assert_eq!(g.read_cell((4, 2, 6)).unwrap(), cell);
        assert_eq!(g.read_cell((4, 2, 7)).unwrap().density, 1.0);
    }

    #[test]
    fn grids_without_data_report_missing_fields() {
        let g = Grid::new(GridId(2), 1, 0, range3d(0..2, 0..2, 0..2), 0.5);
        assert!(!g.is_local(1));
        assert!(matches!(g.read_cell((0, 0, 0)), Err(Error::MissingField("Density"))));
    }
}
