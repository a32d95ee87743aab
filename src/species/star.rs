use crate::config::ParticleParameters;
use crate::error::Result;
use crate::formation::{FormationContext, FormationFlags};
use crate::grid::{FieldKind, Grid};
use crate::particle::{EnabledId, FeedbackFlag, ParticleType};
use crate::registry::ParticleSpecies;
use crate::units::{Units, GRAV_CONST, YR};




/**
 * Stars form in dense, cold, collapsing gas which cools faster than it
 * free-falls. A star lives for one dynamical time of its parent gas, then
 * goes supernova, returning a fraction of its mass to the gas along with
 * thermal energy and metals.
 */
pub struct Star;




struct Candidate {
    position: [f64; 3],
    velocity: [f64; 3],
    mass: f64,
    life_time: f64,
    metallicity: f64,
}




/**
 * Free-fall time of gas with the given code density, in code units.
 */
pub fn dynamical_time(density: f64, units: &Units) -> f64 {
    let rho = density * units.density;
    (3.0 * std::f64::consts::PI / (32.0 * GRAV_CONST * rho)).sqrt() / units.time
}




/**
 * Velocity divergence at an interior cell, by central differences. Cells
 * on the grid boundary have no divergence estimate.
 */
fn divergence(grid: &Grid, index: (i64, i64, i64)) -> Result<Option<f64>> {
    let space = grid.index_space();
    let (i, j, k) = index;
    let neighbors = [
        ((i + 1, j, k), (i - 1, j, k)),
        ((i, j + 1, k), (i, j - 1, k)),
        ((i, j, k + 1), (i, j, k - 1)),
    ];
    if neighbors.iter().any(|(hi, lo)| !space.contains(*hi) || !space.contains(*lo)) {
        return Ok(None)
    }
    let fields = [
        grid.require_field(FieldKind::Velocity1)?,
        grid.require_field(FieldKind::Velocity2)?,
        grid.require_field(FieldKind::Velocity3)?,
    ];
    let div = neighbors
        .iter()
        .zip(fields)
        .map(|((hi, lo), v)| v[space.row_major_offset(*hi)] - v[space.row_major_offset(*lo)])
        .sum::<f64>() / (2.0 * grid.cell_width());

    Ok(Some(div))
}




// ============================================================================
impl Star {

    fn candidates(&self, grid: &Grid, context: &FormationContext) -> Result<Vec<Candidate>> {
        let params = context.params();
        let units = context.units()?;
        let temperature = context.temperature()?;
        let cooling_time = context.cooling_time()?;
        let metals = context.total_metals()?;
        let density = grid.require_field(FieldKind::Density)?;
        let efficiency = params.star_maker_mass_efficiency.min(0.9);
        let minimum_lifetime = params.star_maker_minimum_dynamical_time * YR / units.time;
        let mut found = Vec::new();

        for (n, index) in grid.index_space().iter().enumerate() {
            let d = density[n];

            if d < params.star_maker_over_density_threshold || temperature[n] > params.star_maker_temperature_threshold {
                continue;
            }
            match divergence(grid, index)? {
                Some(div) if div < 0.0 => {}
                _ => continue,
            }
            let t_dyn = dynamical_time(d, units);

            if cooling_time[n] >= t_dyn {
                continue;
            }
            let mass = units.code_mass_to_solar(efficiency * d * grid.cell_volume());

            if mass < params.star_maker_minimum_mass {
                continue;
            }
            let cell = grid.read_cell(index)?;
            found.push(Candidate {
                position: grid.cell_center(index),
                velocity: cell.velocity,
                mass,
                life_time: t_dyn.max(minimum_lifetime),
                metallicity: metals[n] / d,
            });
        }
        Ok(found)
    }
}




// ============================================================================
impl ParticleSpecies for Star {

    fn particle_type(&self) -> ParticleType {
        ParticleType::Star
    }

    fn describe_flags(&self) -> FormationFlags {
        FormationFlags {
            temperature: true,
            cooling_time: true,
            total_metals: true,
            unit_conversions: true,
            data_field_numbers: true,
            ..FormationFlags::none()
        }
    }

    fn evaluate_formation(&self, grid: &Grid, context: &mut FormationContext) -> Result<()> {
        for c in self.candidates(grid, context)? {
            let star = context.create_particle(ParticleType::Star, c.position, c.velocity, c.mass)?;
            star.set_life_time(c.life_time);
            star.set_metallicity(c.metallicity);
        }
        Ok(())
    }

    fn evaluate_feedback(&self, grid: &mut Grid, id: EnabledId, _units: &Units, _params: &ParticleParameters) -> Result<()> {
        let time = grid.time();

        for p in grid.particles_mut().iter_mut().filter(|p| p.enabled_id() == id && p.is_active()) {
            p.activate_new_star(time);

            if p.feedback_flag() == FeedbackFlag::NoFeedback && time >= p.birth_time() + p.life_time() {
                p.set_feedback_flag(FeedbackFlag::Supernova);
            }
        }
        Ok(())
    }

    fn injects_feedback(&self) -> bool {
        true
    }
}
