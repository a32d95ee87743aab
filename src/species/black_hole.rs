use crate::config::ParticleParameters;
use crate::error::Result;
use crate::formation::{FormationContext, FormationFlags};
use crate::grid::Grid;
use crate::particle::{EnabledId, FeedbackFlag, ParticleType};
use crate::registry::{MassRemoval, ParticleSpecies};
use crate::units::Units;
use super::bondi_accretion_rate;




/**
 * Black holes accrete from the cell they sit in at the Eddington-limited
 * Bondi rate, and remove the accreted gas from that cell alone. They are
 * placed by the initial conditions and never form during a run.
 */
pub struct BlackHole;




// ============================================================================
impl ParticleSpecies for BlackHole {

    fn particle_type(&self) -> ParticleType {
        ParticleType::BlackHole
    }

    fn describe_flags(&self) -> FormationFlags {
        FormationFlags::none()
    }

    fn evaluate_formation(&self, _grid: &Grid, _context: &mut FormationContext) -> Result<()> {
        Ok(())
    }

    fn evaluate_feedback(&self, grid: &mut Grid, id: EnabledId, units: &Units, params: &ParticleParameters) -> Result<()> {
        estimate_bondi_rates(grid, id, units, params)
    }

    fn mass_removal(&self, _params: &ParticleParameters) -> Option<MassRemoval> {
        Some(MassRemoval::SingleCell)
    }

    fn is_radiation_source(&self) -> bool {
        true
    }
}




/**
 * Record the current Bondi rate of every active particle of the species
 * `id` on a grid, and switch it to the `Accretion` state.
 */
pub(crate) fn estimate_bondi_rates(grid: &mut Grid, id: EnabledId, units: &Units, params: &ParticleParameters) -> Result<()> {
    let time = grid.time();
    let mut rates = Vec::new();

    for p in grid.particles().iter().filter(|p| p.enabled_id() == id && p.is_active()) {
        let rate = match grid.cell_containing(p.position()) {
            Some(index) => {
                let cell = grid.read_cell(index)?;
                bondi_accretion_rate(&cell, p.mass(), p.velocity(), units, params.mbh_radiative_efficiency)
            }
            None => 0.0,
        };
        rates.push((p.id(), rate));
    }
    for p in grid.particles_mut().iter_mut() {
        if let Some((_, rate)) = rates.iter().find(|(id, _)| *id == p.id()) {
            p.record_accretion(*rate, time);
            p.set_feedback_flag(FeedbackFlag::Accretion);
        }
    }
    Ok(())
}
