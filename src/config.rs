use std::str::FromStr;
use log::warn;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::units::{Units, BOLTZMANN, PROTON_MASS};




/// How MBH particles estimate their accretion rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccretionMode {
    Off,
    Bondi,
    FixedRate,
}

impl AccretionMode {
    fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(AccretionMode::Off),
            1 => Some(AccretionMode::Bondi),
            2 => Some(AccretionMode::FixedRate),
            _ => None,
        }
    }

    pub fn is_on(&self) -> bool {
        *self != AccretionMode::Off
    }
}




#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]


/**
 * Run-time parameters of the particle subsystem. Masses are in solar
 * masses, times in years, and energies in erg unless noted otherwise.
 */
pub struct ParticleParameters {

    /// Species to enable, in order.
    pub active_particle_types: Vec<String>,

    pub top_grid_dimensions: [usize; 3],
    pub refine_by: usize,
    pub maximum_refinement_level: usize,
    pub units: Units,

    pub mbh_accretion: AccretionMode,

    /// Positive: radius in parsecs. Negative: |value| cell widths at the
    /// particle's level.
    pub mbh_accretion_radius: f64,

    /// Solar masses per year, used when `mbh_accretion` is `FixedRate`.
    pub mbh_accretion_fixed_rate: f64,

    /// Radiative efficiency, for the Eddington cap.
    pub mbh_radiative_efficiency: f64,

    /// Density threshold for star formation, in code units.
    pub star_maker_over_density_threshold: f64,
    pub star_maker_minimum_mass: f64,
    pub star_maker_mass_efficiency: f64,
    pub star_maker_minimum_dynamical_time: f64,

    /// Gas hotter than this (K) does not form stars.
    pub star_maker_temperature_threshold: f64,

    pub star_feedback_radius_cells: f64,
    pub star_supernova_energy: f64,
    pub star_ejecta_mass_fraction: f64,
    pub star_ejecta_metal_fraction: f64,

    /// Separation in code length below which particles of the same kind
    /// merge. Zero disables merging.
    pub active_particle_merge_radius: f64,
}




// ============================================================================
impl Default for ParticleParameters {
    fn default() -> Self {
        Self {
            active_particle_types: Vec::new(),
            top_grid_dimensions: [16, 16, 16],
            refine_by: 2,
            maximum_refinement_level: 0,
            units: Units::cgs(),
            mbh_accretion: AccretionMode::Off,
            mbh_accretion_radius: -4.0,
            mbh_accretion_fixed_rate: 0.0,
            mbh_radiative_efficiency: 0.1,
            star_maker_over_density_threshold: 100.0,
            star_maker_minimum_mass: 1e3,
            star_maker_mass_efficiency: 1.0,
            star_maker_minimum_dynamical_time: 1e6,
            star_maker_temperature_threshold: 1.1e4,
            star_feedback_radius_cells: 1.0,
            star_supernova_energy: 1e51,
            star_ejecta_mass_fraction: 0.25,
            star_ejecta_metal_fraction: 0.02,
            active_particle_merge_radius: 0.0,
        }
    }
}




// ============================================================================
impl ParticleParameters {

    /**
     * Parse Enzo-style parameter text: one `Key = Value` assignment per
     * line, with `#` or `//` starting a comment. Vector values are given
     * as whitespace-separated components. `AppendActiveParticleType` may
     * appear any number of times. Unknown keys are skipped with a warning,
     * since parameter files describe the whole simulation.
     */
    pub fn parse(text: &str) -> Result<Self> {
        let mut params = Self::default();
        let mut units = UnitsSpec::default();

        for (n, raw) in text.lines().enumerate() {
            let line = n + 1;
            let content = strip_comment(raw).trim();

            if content.is_empty() {
                continue;
            }
            let (key, value) = content
                .split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .ok_or_else(|| Error::InvalidParameter { line, message: format!("expected Key = Value, got '{}'", content) })?;

            match key {
                "AppendActiveParticleType" => params.active_particle_types.push(value.to_string()),
                "TopGridDimensions" => params.top_grid_dimensions = parse_vector(value, line)?,
                "RefineBy" => params.refine_by = parse_scalar(value, line)?,
                "MaximumRefinementLevel" => params.maximum_refinement_level = parse_scalar(value, line)?,
                "DensityUnits" => units.density = Some(parse_scalar(value, line)?),
                "LengthUnits" => units.length = Some(parse_scalar(value, line)?),
                "TimeUnits" => units.time = Some(parse_scalar(value, line)?),
                "MBHAccretion" => {
                    let code: i64 = parse_scalar(value, line)?;
                    params.mbh_accretion = AccretionMode::from_code(code)
                        .ok_or_else(|| Error::InvalidParameter { line, message: format!("unknown MBHAccretion mode {}", code) })?;
                }
                "MBHAccretionRadius" => params.mbh_accretion_radius = parse_scalar(value, line)?,
                "MBHAccretionFixedRate" => params.mbh_accretion_fixed_rate = parse_scalar(value, line)?,
                "MBHRadiativeEfficiency" => params.mbh_radiative_efficiency = parse_scalar(value, line)?,
                "StarMakerOverDensityThreshold" => params.star_maker_over_density_threshold = parse_scalar(value, line)?,
                "StarMakerMinimumMass" => params.star_maker_minimum_mass = parse_scalar(value, line)?,
                "StarMakerMassEfficiency" => params.star_maker_mass_efficiency = parse_scalar(value, line)?,
                "StarMakerMinimumDynamicalTime" => params.star_maker_minimum_dynamical_time = parse_scalar(value, line)?,
                "StarMakerTemperatureThreshold" => params.star_maker_temperature_threshold = parse_scalar(value, line)?,
                "StarFeedbackRadiusCells" => params.star_feedback_radius_cells = parse_scalar(value, line)?,
                "StarSupernovaEnergy" => params.star_supernova_energy = parse_scalar(value, line)?,
                "StarEjectaMassFraction" => params.star_ejecta_mass_fraction = parse_scalar(value, line)?,
                "StarEjectaMetalFraction" => params.star_ejecta_metal_fraction = parse_scalar(value, line)?,
                "ActiveParticleMergeRadius" => params.active_particle_merge_radius = parse_scalar(value, line)?,
                _ => warn!("ignoring parameter {} on line {}", key, line),
            }
        }
        params.units = units.build(params.units);
        params.validate()?;
        Ok(params)
    }


    /**
     * Check the parameter combinations the particle routines rely on.
     */
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| Err(Error::InvalidParameter { line: 0, message });

        if self.refine_by < 2 {
            return fail(format!("RefineBy must be at least 2, got {}", self.refine_by))
        }
        if self.top_grid_dimensions.iter().any(|&n| n == 0) {
            return fail("TopGridDimensions must be positive".to_string())
        }
        if !self.mbh_accretion_radius.is_finite() || self.mbh_accretion_radius == 0.0 {
            return fail(format!("MBHAccretionRadius must be finite and nonzero, got {}", self.mbh_accretion_radius))
        }
        if !(0.0..=1.0).contains(&self.star_ejecta_mass_fraction) {
            return fail(format!("StarEjectaMassFraction must lie in [0, 1], got {}", self.star_ejecta_mass_fraction))
        }
        if !(0.0..=1.0).contains(&self.star_maker_mass_efficiency) {
            return fail(format!("StarMakerMassEfficiency must lie in [0, 1], got {}", self.star_maker_mass_efficiency))
        }
        Ok(())
    }
}




#[derive(Default)]
struct UnitsSpec {
    density: Option<f64>,
    length: Option<f64>,
    time: Option<f64>,
}

impl UnitsSpec {
    fn build(self, base: Units) -> Units {
        if self.density.is_none() && self.length.is_none() && self.time.is_none() {
            return base
        }
        let density = self.density.unwrap_or(base.density);
        let length = self.length.unwrap_or(base.length);
        let time = self.time.unwrap_or(base.time);
        let velocity = length / time;

        Units {
            density,
            length,
            time,
            velocity,
            temperature: PROTON_MASS * velocity * velocity / BOLTZMANN,
        }
    }
}




fn strip_comment(line: &str) -> &str {
    let end = [line.find('#'), line.find("//")]
        .iter()
        .flatten()
        .min()
        .cloned()
        .unwrap_or(line.len());
    &line[..end]
}

fn parse_scalar<T: FromStr>(value: &str, line: usize) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidParameter { line, message: format!("cannot parse '{}'", value) })
}

fn parse_vector<T: FromStr + Copy + Default>(value: &str, line: usize) -> Result<[T; 3]> {
    let parts: Vec<&str> = value.split_whitespace().collect();

    if parts.len() != 3 {
        return Err(Error::InvalidParameter { line, message: format!("expected three components, got '{}'", value) })
    }
    let mut result = [T::default(); 3];
    for (r, part) in result.iter_mut().zip(parts) {
        *r = parse_scalar(part, line)?;
    }
    Ok(result)
}
