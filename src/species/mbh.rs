use crate::config::{AccretionMode, ParticleParameters};
use crate::error::Result;
use crate::formation::{FormationContext, FormationFlags};
use crate::grid::Grid;
use crate::particle::{EnabledId, FeedbackFlag, ParticleType};
use crate::registry::{MassRemoval, ParticleSpecies};
use crate::units::{Units, YR};
use super::black_hole::estimate_bondi_rates;




/**
 * Massive black holes. Their accretion rate follows `MBHAccretion`: off,
 * Bondi-Hoyle, or a fixed rate in solar masses per year. The accreted gas
 * is removed from every cell within the accretion radius, which may span
 * several grids and levels.
 */
pub struct Mbh;




// ============================================================================
impl ParticleSpecies for Mbh {

    fn particle_type(&self) -> ParticleType {
        ParticleType::Mbh
    }

    fn describe_flags(&self) -> FormationFlags {
        FormationFlags::none()
    }

    fn evaluate_formation(&self, _grid: &Grid, _context: &mut FormationContext) -> Result<()> {
        Ok(())
    }

    fn evaluate_feedback(&self, grid: &mut Grid, id: EnabledId, units: &Units, params: &ParticleParameters) -> Result<()> {
        match params.mbh_accretion {
            AccretionMode::Off => Ok(()),
            AccretionMode::Bondi => estimate_bondi_rates(grid, id, units, params),
            AccretionMode::FixedRate => {
                let time = grid.time();
                let rate = params.mbh_accretion_fixed_rate / YR;

                for p in grid.particles_mut().iter_mut().filter(|p| p.enabled_id() == id && p.is_active()) {
                    p.record_accretion(rate, time);
                    p.set_feedback_flag(FeedbackFlag::Accretion);
                }
                Ok(())
            }
        }
    }

    fn mass_removal(&self, params: &ParticleParameters) -> Option<MassRemoval> {
        if params.mbh_accretion.is_on() {
            Some(MassRemoval::Sphere)
        } else {
            None
        }
    }

    fn is_radiation_source(&self) -> bool {
        true
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::grid::GridId;
    use crate::index_space::range3d;
    use crate::particle::{ParticleId, ParticleRecord};

    fn grid() -> Grid {
        let mut grid = Grid::new(GridId(0), 0, 0, range3d(0..2, 0..2, 0..2), 0.5)
            .with_uniform_gas(1.0, 1.0)
            .with_time(1.0, 0.1);
        grid.particles_mut().push(ParticleRecord::new(ParticleId(4), ParticleType::Mbh, EnabledId(0), [0.5; 3], [0.0; 3], 1e5));
        grid
    }

    #[test]
    fn fixed_rate_is_converted_to_per_second() {
        let params = ParticleParameters {
            mbh_accretion: AccretionMode::FixedRate,
            mbh_accretion_fixed_rate: 2.0,
            ..ParticleParameters::default()
        };
        let mut grid = grid();
        Mbh.evaluate_feedback(&mut grid, EnabledId(0), &Units::cgs(), &params).unwrap();
        assert_eq!(grid.particles()[0].last_accretion_rate(), 2.0 / YR);
        assert_eq!(Mbh.mass_removal(&params), Some(MassRemoval::Sphere));
    }

    #[test]
    fn accretion_off_leaves_particles_alone() {
        let params = ParticleParameters::default();
        let mut grid = grid();
        Mbh.evaluate_feedback(&mut grid, EnabledId(0), &Units::cgs(), &params).unwrap();
        assert!(grid.particles()[0].accretion().is_empty());
        assert_eq!(Mbh.mass_removal(&params), None);
    }
}
