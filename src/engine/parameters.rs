use serde::{Deserialize, Serialize};
use crate::config::ParticleParameters;
use crate::error::{Error, Result};
use crate::grid::GridRef;
use crate::hierarchy::Hierarchy;
use crate::particle::{EnabledId, ParticleId, ParticleRecord};
use crate::registry::MassRemoval;
use crate::units::{Units, MSUN, PC, TINY_NUMBER};
use super::sphere::Sphere;
use super::transfer::CellOperation;




#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackAction {
    Subtract(MassRemoval),
    Inject,
}




/**
 * Everything the engine needs to know about one particle's action on the
 * gas. Sources are built by the process owning the particle and gathered
 * onto every process, since the sphere may reach grids held elsewhere.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSource {
    pub particle: ParticleId,
    pub enabled_id: EnabledId,
    pub action: FeedbackAction,
    pub sphere: Sphere,
    pub velocity: [f64; 3],
    pub grid: Option<GridRef>,
    pub ejecta_density: f64,
    pub energy_density: f64,
    pub metal_fraction: f64,
}

impl FeedbackSource {
    pub fn operation(&self) -> CellOperation {
        match self.action {
            FeedbackAction::Subtract(_) => CellOperation::Subtract {
                density: self.ejecta_density,
            },
            FeedbackAction::Inject => CellOperation::Inject {
                density: self.ejecta_density,
                energy_density: self.energy_density,
                metal_fraction: self.metal_fraction,
                velocity: self.velocity,
            },
        }
    }
}




#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubtractionParameters {
    pub radius: f64,
    pub ejecta_density: f64,
}




#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeedbackParameters {
    pub radius: f64,
    pub ejecta_density: f64,
    pub energy_density: f64,
    pub metal_fraction: f64,
}




/// Volume in cm^3 of a sphere with a radius in code units.
fn physical_volume(radius: f64, units: &Units) -> f64 {
    4.0 / 3.0 * std::f64::consts::PI * (radius * units.length).powi(3)
}




/// Accretion radius in code units. `MBHAccretionRadius` is in parsecs when
/// positive, and counts cell widths at the particle's level when negative.
pub fn accretion_radius(hierarchy: &Hierarchy, particle: &ParticleRecord, params: &ParticleParameters, units: &Units) -> f64 {
    let r = params.mbh_accretion_radius;
    if r > 0.0 {
        r * PC / units.length
    } else {
        -r * hierarchy.cell_width(particle.level())
    }
}

pub fn feedback_radius(hierarchy: &Hierarchy, particle: &ParticleRecord, params: &ParticleParameters) -> f64 {
    params.star_feedback_radius_cells * hierarchy.cell_width(particle.level())
}




/**
 * Influence radius and ejecta density of an accreting particle. The ejecta
 * density is the mass accreted over `dt` at the last recorded rate, spread
 * over the sphere of `accretion_radius`, in code units.
 */
pub fn calculate_subtraction_parameters(
    hierarchy: &Hierarchy,
    particle: &ParticleRecord,
    dt: f64,
    params: &ParticleParameters,
    units: &Units) -> Result<SubtractionParameters>
{
    let radius = accretion_radius(hierarchy, particle, params, units);

    if !radius.is_finite() {
        return Err(Error::NonFiniteRadius(radius))
    }
    if radius <= TINY_NUMBER {
        return Ok(SubtractionParameters { radius, ejecta_density: 0.0 })
    }
    let mass = particle.last_accretion_rate() * dt * units.time * MSUN;
    let ejecta_density = mass / physical_volume(radius, units) / units.density;

    Ok(SubtractionParameters { radius, ejecta_density })
}




/**
 * Influence radius and ejecta of a supernova: the radius is
 * `StarFeedbackRadiusCells` cell widths at the particle's level; a fraction
 * `StarEjectaMassFraction` of the particle's mass is returned to the gas,
 * carrying `StarSupernovaEnergy` of thermal energy.
 */
pub fn calculate_feedback_parameters(
    hierarchy: &Hierarchy,
    particle: &ParticleRecord,
    params: &ParticleParameters,
    units: &Units) -> Result<FeedbackParameters>
{
    let radius = feedback_radius(hierarchy, particle, params);

    if !radius.is_finite() {
        return Err(Error::NonFiniteRadius(radius))
    }
    if radius <= TINY_NUMBER {
        return Ok(FeedbackParameters { radius, ejecta_density: 0.0, energy_density: 0.0, metal_fraction: 0.0 })
    }
    let volume = physical_volume(radius, units);
    let mass = params.star_ejecta_mass_fraction * particle.mass() * MSUN;

    Ok(FeedbackParameters {
        radius,
        ejecta_density: mass / volume / units.density,
        energy_density: units.energy_density_to_code(params.star_supernova_energy / volume),
        metal_fraction: params.star_ejecta_metal_fraction,
    })
}




/**
 * Density to remove from the cell hosting an accreting particle: the mass
 * accreted over `dt` at the last recorded rate, over the cell volume at the
 * particle's level.
 */
pub fn single_cell_density(hierarchy: &Hierarchy, particle: &ParticleRecord, dt: f64, units: &Units) -> f64 {
    let mass = units.solar_mass_to_code(particle.last_accretion_rate() * dt * units.time);
    mass / hierarchy.cell_width(particle.level()).powi(3)
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::particle::ParticleType;
    use crate::units::YR;

    fn units() -> Units {
        Units::from_box(1e3, 1e-24, 1e6 * YR)
    }

    fn accretor(level: usize) -> ParticleRecord {
        let mut p = ParticleRecord::new(ParticleId(0), ParticleType::Mbh, EnabledId(0), [0.5; 3], [0.0; 3], 1e6);
        p.level = level;
        p.record_accretion(1e-3 / YR, 0.0);
        p
    }

    #[test]
    fn radius_in_parsecs_or_cell_widths() {
        let h = Hierarchy::new(0, [16, 16, 16], 2).unwrap();
        let units = units();
        let mut params = ParticleParameters { mbh_accretion_radius: 10.0, ..ParticleParameters::default() };

        let s = calculate_subtraction_parameters(&h, &accretor(2), 0.1, &params, &units).unwrap();
        assert!((s.radius - 0.01).abs() < 1e-12);

        params.mbh_accretion_radius = -4.0;
        let s = calculate_subtraction_parameters(&h, &accretor(2), 0.1, &params, &units).unwrap();
        assert!((s.radius - 4.0 / 64.0).abs() < 1e-15);
    }

    #[test]
    fn ejecta_density_carries_the_accreted_mass() {
        let h = Hierarchy::new(0, [16, 16, 16], 2).unwrap();
        let units = units();
        let params = ParticleParameters { mbh_accretion_radius: -2.0, ..ParticleParameters::default() };
        let s = calculate_subtraction_parameters(&h, &accretor(1), 0.5, &params, &units).unwrap();

        let sphere = Sphere { center: [0.5; 3], radius: s.radius };
        let mass = units.code_mass_to_solar(s.ejecta_density * sphere.volume());
        let expected = 1e-3 / YR * 0.5 * units.time;
        assert!((mass / expected - 1.0).abs() < 1e-10);
    }

    #[test]
    fn non_finite_radius_is_an_error() {
        let h = Hierarchy::new(0, [16, 16, 16], 2).unwrap();
        let params = ParticleParameters { mbh_accretion_radius: f64::INFINITY, ..ParticleParameters::default() };
        assert!(matches!(
            calculate_subtraction_parameters(&h, &accretor(0), 0.1, &params, &units()),
            Err(Error::NonFiniteRadius(_))));
    }

    #[test]
    fn supernova_ejecta_carry_a_fraction_of_the_star() {
        let h = Hierarchy::new(0, [16, 16, 16], 2).unwrap();
        let units = units();
        let params = ParticleParameters { star_feedback_radius_cells: 2.0, ..ParticleParameters::default() };
        let star = ParticleRecord::new(ParticleId(1), ParticleType::Star, EnabledId(0), [0.5; 3], [0.0; 3], 1e4);
        let f = calculate_feedback_parameters(&h, &star, &params, &units).unwrap();

        assert!((f.radius - 0.125).abs() < 1e-15);
        let sphere = Sphere { center: [0.5; 3], radius: f.radius };
        let mass = units.code_mass_to_solar(f.ejecta_density * sphere.volume());
        assert!((mass / (0.25 * 1e4) - 1.0).abs() < 1e-10);
        assert!(f.energy_density > 0.0);
        assert_eq!(f.metal_fraction, params.star_ejecta_metal_fraction);
    }
}
