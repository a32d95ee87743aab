//! Built-in particle species. Each one implements `ParticleSpecies`;
//! `register_builtin` makes them known to a registry in a fixed order.

pub mod black_hole;
pub mod mbh;
pub mod star;

use crate::derived;
use crate::error::Result;
use crate::grid::CellState;
use crate::registry::SpeciesRegistry;
use crate::units::{Units, CLIGHT, GRAV_CONST, MSUN, PROTON_MASS, SIGMA_THOMSON};

pub use black_hole::BlackHole;
pub use mbh::Mbh;
pub use star::Star;




/// Register the built-in species: `Star`, `BlackHole`, then `MBH`.
pub fn register_builtin(registry: &mut SpeciesRegistry) -> Result<()> {
    registry.register("Star", Box::new(Star))?;
    registry.register("BlackHole", Box::new(BlackHole))?;
    registry.register("MBH", Box::new(Mbh))?;
    Ok(())
}




/// Eddington-limited Bondi-Hoyle accretion rate in solar masses per second,
/// for a particle of `mass` solar masses moving with `velocity` (code
/// units) through the gas in `cell`.
pub fn bondi_accretion_rate(cell: &CellState, mass: f64, velocity: [f64; 3], units: &Units, radiative_efficiency: f64) -> f64 {
    let m = mass * MSUN;
    let rho = cell.density * units.density;
    let v2: f64 = (0..3).map(|d| (velocity[d] - cell.velocity[d]).powi(2)).sum::<f64>() * units.velocity.powi(2);
    let c2 = derived::sound_speed_squared(cell) * units.velocity.powi(2);
    let denominator = (c2 + v2).powf(1.5);

    let bondi = if denominator > 0.0 {
        4.0 * std::f64::consts::PI * GRAV_CONST.powi(2) * m * m * rho / denominator
    } else {
        0.0
    };
    let eddington = 4.0 * std::f64::consts::PI * GRAV_CONST * m * PROTON_MASS
        / (radiative_efficiency * SIGMA_THOMSON * CLIGHT);

    bondi.min(eddington) / MSUN
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::particle::ParticleType;

    #[test]
    fn builtin_species_are_registered_in_order() {
        let mut registry = SpeciesRegistry::new();
        register_builtin(&mut registry).unwrap();
        assert_eq!(registry.count(), 3);
        assert!(registry.lookup("Star").is_some());
        assert_eq!(registry.by_type(ParticleType::Mbh).unwrap().name(), "MBH");
        assert!(register_builtin(&mut registry).is_err());
    }

    #[test]
    fn bondi_rate_is_eddington_limited() {
        let cell = CellState {
            density: 1e-24,
            velocity: [0.0; 3],
            total_energy: 1e10,
            gas_energy: None,
            metal: None,
            colour: None,
        };
        let units = Units::cgs();
        let small = bondi_accretion_rate(&cell, 1.0, [0.0; 3], &units, 0.1);
        let large = bondi_accretion_rate(&cell, 1e9, [0.0; 3], &units, 0.1);
        let moving = bondi_accretion_rate(&cell, 1.0, [1e7, 0.0, 0.0], &units, 0.1);
        let eddington = 4.0 * std::f64::consts::PI * GRAV_CONST * 1e9 * MSUN * PROTON_MASS
            / (0.1 * SIGMA_THOMSON * CLIGHT) / MSUN;
        assert!(small > 0.0);
        assert!(moving < small);
        assert!((large / eddington - 1.0).abs() < 1e-12);
    }
}
