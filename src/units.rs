use serde::{Deserialize, Serialize};




/// Parsec in cm.
pub const PC: f64 = 3.086e18;

/// Solar mass in g.
pub const MSUN: f64 = 1.989e33;

/// Proton mass in g.
pub const PROTON_MASS: f64 = 1.673e-24;

/// Newton's constant in cgs.
pub const GRAV_CONST: f64 = 6.673e-8;

/// Boltzmann's constant in cgs.
pub const BOLTZMANN: f64 = 1.3806e-16;

/// Thomson cross section in cm^2.
pub const SIGMA_THOMSON: f64 = 6.65e-25;

/// Speed of light in cm/s.
pub const CLIGHT: f64 = 2.998e10;

/// Year in s.
pub const YR: f64 = 3.1557e7;

/// Values below this are treated as zero.
pub const TINY_NUMBER: f64 = 1e-20;




#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]


/**
 * The unit system of a simulation: the cgs value of one code unit of
 * density, length, temperature, time and velocity. Instances are passed
 * explicitly to every routine that converts between code and physical
 * quantities.
 */
pub struct Units {
    pub density: f64,
    pub length: f64,
    pub temperature: f64,
    pub time: f64,
    pub velocity: f64,
}




// ============================================================================
impl Units {

    /**
     * Units where one code unit is one cgs unit.
     */
    pub fn cgs() -> Self {
        Self {
            density: 1.0,
            length: 1.0,
            temperature: 1.0,
            time: 1.0,
            velocity: 1.0,
        }
    }

    /**
     * Units of a box of the given comoving size (in parsecs), mean density
     * (in g/cm^3), and time unit (in s). Velocity is length over time.
     */
    pub fn from_box(box_size_pc: f64, density: f64, time: f64) -> Self {
        let length = box_size_pc * PC;
        Self {
            density,
            length,
            temperature: 1.0,
            time,
            velocity: length / time,
        }
    }

    pub fn mass(&self) -> f64 {
        self.density * self.length.powi(3)
    }

    /**
     * Convert a mass in code units to solar masses.
     */
    pub fn code_mass_to_solar(&self, mass: f64) -> f64 {
        mass * self.mass() / MSUN
    }

    /**
     * Convert a mass in solar masses to code units.
     */
    pub fn solar_mass_to_code(&self, mass: f64) -> f64 {
        mass * MSUN / self.mass()
    }

    /**
     * Convert an energy density in erg/cm^3 to code units.
     */
    pub fn energy_density_to_code(&self, energy_density: f64) -> f64 {
        energy_density / (self.density * self.velocity * self.velocity)
    }
}

impl Default for Units {
    fn default() -> Self {
        Self::cgs()
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn solar_mass_conversion_is_invertible() {
        let units = Units::from_box(1e3, 1e-24, 1e15);
        let m = units.solar_mass_to_code(42.0);
        assert!((units.code_mass_to_solar(m) - 42.0).abs() < 1e-10);
    }
}
