use crate::config::ParticleParameters;
use crate::derived;
use crate::error::{Error, Result};
use crate::grid::{FieldKind, Grid, GridId};
use crate::particle::{EnabledId, FeedbackFlag, ParticleIdAllocator, ParticleRecord, ParticleType};
use crate::units::Units;




/**
 * Declares which entries of a `FormationContext` a species needs. Only the
 * flagged entries are computed; the others stay absent and cannot be read.
 */
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FormationFlags {
    pub dark_matter_density: bool,
    pub h2_fraction: bool,
    pub cooling_time: bool,
    pub cooling_rate: bool,
    pub temperature: bool,
    pub total_metals: bool,
    pub unit_conversions: bool,
    pub data_field_numbers: bool,
}

impl FormationFlags {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            dark_matter_density: true,
            h2_fraction: true,
            cooling_time: true,
            cooling_rate: true,
            temperature: true,
            total_metals: true,
            unit_conversions: true,
            data_field_numbers: true,
        }
    }
}




/// Positions of the baryon fields in the grid's field list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldNumbers {
    pub density: usize,
    pub velocity: [usize; 3],
    pub total_energy: usize,
    pub gas_energy: Option<usize>,
    pub metal: Option<usize>,
    pub colour: Option<usize>,
}

impl FieldNumbers {
    fn of(grid: &Grid) -> Result<Self> {
        let required = |kind: FieldKind| grid.field_number(kind).ok_or(Error::MissingField(kind.name()));

        Ok(Self {
            density: required(FieldKind::Density)?,
            velocity: [
                required(FieldKind::Velocity1)?,
                required(FieldKind::Velocity2)?,
                required(FieldKind::Velocity3)?,
            ],
            total_energy: required(FieldKind::TotalEnergy)?,
            gas_energy: grid.field_number(FieldKind::GasEnergy),
            metal: grid.field_number(FieldKind::Metal),
            colour: grid.field_number(FieldKind::Colour),
        })
    }
}




/**
 * Scratch data handed to a species' formation routine for one grid and one
 * timestep: derived per-cell arrays, unit conversions and field numbers,
 * each present only if requested, plus the list of particles created so
 * far. The context borrows the run's identifier allocator for its
 * lifetime; dropping it (on success through `destroy`, or on an error
 * path) releases every scratch array.
 */
pub struct FormationContext<'a> {
    flags: FormationFlags,
    grid_id: GridId,
    level: usize,
    time: f64,
    dt: f64,
    cell_width: f64,
    enabled_id: EnabledId,
    params: &'a ParticleParameters,
    ids: &'a mut ParticleIdAllocator,
    units: Option<Units>,
    field_numbers: Option<FieldNumbers>,
    dark_matter_density: Option<Vec<f64>>,
    h2_fraction: Option<Vec<f64>>,
    cooling_time: Option<Vec<f64>>,
    cooling_rate: Option<Vec<f64>>,
    temperature: Option<Vec<f64>>,
    total_metals: Option<Vec<f64>>,
    capacity: usize,
    new_particles: Vec<ParticleRecord>,
}




// ============================================================================
impl<'a> FormationContext<'a> {

    /**
     * Populate a context for a grid held by this process. Entries are
     * computed only when flagged. Fails if a flagged entry needs a field
     * the grid does not carry.
     */
    pub fn construct(
        grid: &Grid,
        flags: FormationFlags,
        units: &Units,
        params: &'a ParticleParameters,
        ids: &'a mut ParticleIdAllocator,
        enabled_id: EnabledId,
        capacity: usize) -> Result<Self>
    {
        let density = grid.require_field(FieldKind::Density)?;

        let dark_matter_density = if flags.dark_matter_density {
            Some(grid.require_field(FieldKind::DarkMatter)?.to_vec())
        } else {
            None
        };

        let h2_fraction = if flags.h2_fraction {
            let h2 = grid.require_field(FieldKind::H2I)?;
            Some(h2.iter().zip(density).map(|(h, d)| if *d > 0.0 { h / d } else { 0.0 }).collect())
        } else {
            None
        };

        // Metal-free grids carry no metal field.
        let total_metals = if flags.total_metals {
            Some(grid.field(FieldKind::Metal).map_or_else(|| vec![0.0; density.len()], |m| m.to_vec()))
        } else {
            None
        };

        let temperature = if flags.temperature {
            Some(derived::compute_field(grid, |c| derived::temperature(c, units))?)
        } else {
            None
        };

        let cooling_rate = if flags.cooling_rate {
            Some(derived::compute_field(grid, |c| derived::cooling_function(derived::temperature(c, units)))?)
        } else {
            None
        };

        let cooling_time = if flags.cooling_time {
            Some(derived::compute_field(grid, |c| derived::cooling_time(c, units))?)
        } else {
            None
        };

        let field_numbers = if flags.data_field_numbers {
            Some(FieldNumbers::of(grid)?)
        } else {
            None
        };

        Ok(Self {
            flags,
            grid_id: grid.id(),
            level: grid.level(),
            time: grid.time(),
            dt: grid.dt(),
            cell_width: grid.cell_width(),
            enabled_id,
            params,
            ids,
            units: if flags.unit_conversions { Some(*units) } else { None },
            field_numbers,
            dark_matter_density,
            h2_fraction,
            cooling_time,
            cooling_rate,
            temperature,
            total_metals,
            capacity,
            new_particles: Vec::new(),
        })
    }


    /**
     * Release the scratch arrays and hand back the particles created
     * through this context.
     */
    pub fn destroy(self) -> Vec<ParticleRecord> {
        self.new_particles
    }


    /**
     * Create a particle at the current time on this context's grid. The
     * identifier comes from the run's allocator; the new particle is in
     * the `Formation` state until it is activated.
     */
    pub fn create_particle(&mut self, kind: ParticleType, position: [f64; 3], velocity: [f64; 3], mass: f64) -> Result<&mut ParticleRecord> {
        if self.new_particles.len() >= self.capacity {
            return Err(Error::CapacityOverflow { capacity: self.capacity })
        }
        let mut p = ParticleRecord::new(self.ids.next_id(), kind, self.enabled_id, position, velocity, mass);
        p.birth_time = self.time;
        p.level = self.level;
        p.grid_id = Some(self.grid_id);
        p.feedback_flag = FeedbackFlag::Formation;
        self.new_particles.push(p);

        let n = self.new_particles.len() - 1;
        Ok(&mut self.new_particles[n])
    }

    pub fn flags(&self) -> FormationFlags {
        self.flags
    }

    pub fn grid_id(&self) -> GridId {
        self.grid_id
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn cell_width(&self) -> f64 {
        self.cell_width
    }

    pub fn enabled_id(&self) -> EnabledId {
        self.enabled_id
    }

    pub fn params(&self) -> &ParticleParameters {
        self.params
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn new_particles(&self) -> &[ParticleRecord] {
        &self.new_particles
    }

    pub fn units(&self) -> Result<&Units> {
        self.units.as_ref().ok_or(Error::MissingFormationData("unit conversions"))
    }

    pub fn field_numbers(&self) -> Result<&FieldNumbers> {
        self.field_numbers.as_ref().ok_or(Error::MissingFormationData("data field numbers"))
    }

    pub fn dark_matter_density(&self) -> Result<&[f64]> {
        self.dark_matter_density.as_deref().ok_or(Error::MissingFormationData("dark matter density"))
    }

    pub fn h2_fraction(&self) -> Result<&[f64]> {
        self.h2_fraction.as_deref().ok_or(Error::MissingFormationData("H2 fraction"))
    }

    pub fn cooling_time(&self) -> Result<&[f64]> {
        self.cooling_time.as_deref().ok_or(Error::MissingFormationData("cooling time"))
    }

    pub fn cooling_rate(&self) -> Result<&[f64]> {
        self.cooling_rate.as_deref().ok_or(Error::MissingFormationData("cooling rate"))
    }

    pub fn temperature(&self) -> Result<&[f64]> {
        self.temperature.as_deref().ok_or(Error::MissingFormationData("temperature"))
    }

    pub fn total_metals(&self) -> Result<&[f64]> {
        self.total_metals.as_deref().ok_or(Error::MissingFormationData("total metals"))
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::index_space::range3d;

    fn grid() -> Grid {
        Grid::new(GridId(3), 0, 0, range3d(0..4, 0..4, 0..4), 0.25)
            .with_uniform_gas(1.0, 1.0)
            .with_time(2.0, 0.1)
    }

    #[test]
    fn only_flagged_entries_are_available() {
        let params = ParticleParameters::default();
        let mut ids = ParticleIdAllocator::new(0, 1).unwrap();
        let flags = FormationFlags { temperature: true, unit_conversions: true, ..FormationFlags::none() };
        let context = FormationContext::construct(&grid(), flags, &Units::cgs(), &params, &mut ids, EnabledId(0), 64).unwrap();

        assert_eq!(context.temperature().unwrap().len(), 64);
        assert!(context.units().is_ok());
        assert!(matches!(context.cooling_time(), Err(Error::MissingFormationData(_))));
        assert!(matches!(context.cooling_rate(), Err(Error::MissingFormationData(_))));
        assert!(matches!(context.field_numbers(), Err(Error::MissingFormationData(_))));
        assert!(matches!(context.dark_matter_density(), Err(Error::MissingFormationData(_))));
    }

    #[test]
    fn cooling_time_alone_leaves_everything_else_absent() {
        let params = ParticleParameters::default();
        let mut ids = ParticleIdAllocator::new(0, 1).unwrap();
        let flags = FormationFlags { cooling_time: true, ..FormationFlags::none() };
        let context = FormationContext::construct(&grid(), flags, &Units::cgs(), &params, &mut ids, EnabledId(0), 64).unwrap();

        assert_eq!(context.cooling_time().unwrap().len(), 64);
        assert!(matches!(context.units(), Err(Error::MissingFormationData(_))));
        assert!(matches!(context.field_numbers(), Err(Error::MissingFormationData(_))));
        assert!(matches!(context.dark_matter_density(), Err(Error::MissingFormationData(_))));
        assert!(matches!(context.h2_fraction(), Err(Error::MissingFormationData(_))));
        assert!(matches!(context.cooling_rate(), Err(Error::MissingFormationData(_))));
        assert!(matches!(context.temperature(), Err(Error::MissingFormationData(_))));
        assert!(matches!(context.total_metals(), Err(Error::MissingFormationData(_))));
    }

    #[test]
    fn cooling_rate_does_not_expose_the_temperature() {
        let params = ParticleParameters::default();
        let mut ids = ParticleIdAllocator::new(0, 1).unwrap();
        let flags = FormationFlags { cooling_rate: true, ..FormationFlags::none() };
        let grid = grid();
        let context = FormationContext::construct(&grid, flags, &Units::cgs(), &params, &mut ids, EnabledId(0), 64).unwrap();

        let cell = grid.read_cell((1, 2, 3)).unwrap();
        let expected = derived::cooling_function(derived::temperature(&cell, &Units::cgs()));
        assert_eq!(context.cooling_rate().unwrap()[grid.index_space().row_major_offset((1, 2, 3))], expected);
        assert!(matches!(context.temperature(), Err(Error::MissingFormationData(_))));
    }

    #[test]
    fn requesting_an_absent_field_fails() {
        let params = ParticleParameters::default();
        let mut ids = ParticleIdAllocator::new(0, 1).unwrap();
        let flags = FormationFlags { dark_matter_density: true, ..FormationFlags::none() };
        let result = FormationContext::construct(&grid(), flags, &Units::cgs(), &params, &mut ids, EnabledId(0), 64);
        assert!(matches!(result, Err(Error::MissingField("Dark_Matter_Density"))));
    }

    #[test]
    fn field_numbers_follow_the_grid() {
        let params = ParticleParameters::default();
        let mut ids = ParticleIdAllocator::new(0, 1).unwrap();
        let flags = FormationFlags { data_field_numbers: true, total_metals: true, ..FormationFlags::none() };
        let context = FormationContext::construct(&grid(), flags, &Units::cgs(), &params, &mut ids, EnabledId(0), 64).unwrap();
        let numbers = context.field_numbers().unwrap();
        assert_eq!(numbers.density, 0);
        assert_eq!(numbers.velocity, [1, 2, 3]);
        assert_eq!(numbers.gas_energy, Some(5));
        assert_eq!(numbers.metal, None);
        assert!(context.total_metals().unwrap().iter().all(|m| *m == 0.0));
    }

    #[test]
    fn creation_beyond_capacity_fails() {
        let params = ParticleParameters::default();
        let mut ids = ParticleIdAllocator::new(0, 1).unwrap();
        let mut context = FormationContext::construct(&grid(), FormationFlags::none(), &Units::cgs(), &params, &mut ids, EnabledId(1), 2).unwrap();

        context.create_particle(ParticleType::Star, [0.1; 3], [0.0; 3], 1.0).unwrap();
        context.create_particle(ParticleType::Star, [0.2; 3], [0.0; 3], 1.0).unwrap();
        assert!(matches!(
            context.create_particle(ParticleType::Star, [0.3; 3], [0.0; 3], 1.0),
            Err(Error::CapacityOverflow { capacity: 2 })));

        let created = context.destroy();
        assert_eq!(created.len(), 2);
        assert!(created[0].id() < created[1].id());
        assert!(created.iter().all(|p| p.enabled_id() == EnabledId(1)));
        assert!(created.iter().all(|p| p.birth_time() == 2.0 && p.feedback_flag() == FeedbackFlag::Formation));
        assert_eq!(ids.allocated(), 2);
    }
}
