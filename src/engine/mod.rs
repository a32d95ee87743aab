//! Localized transfer of mass, momentum and energy between particles and the
//! gas around them, across grid boundaries and refinement levels.
//!
//! Every process gathers the full list of sources, decides for each one
//! whether it acts on the current level, applies it to the grids it holds,
//! and then the per-source totals are summed over all processes so the
//! particle's owner can update it.

pub mod parameters;
pub mod sphere;
pub mod transfer;

use log::{debug, info};
use crate::config::ParticleParameters;
use crate::error::{Error, Result};
use crate::hierarchy::Hierarchy;
use crate::message::comm::Communicator;
use crate::message::util;
use crate::particle::{FeedbackFlag, ParticleRecord};
use crate::registry::{MassRemoval, SpeciesRegistry};
use crate::units::{Units, TINY_NUMBER};

use parameters::{FeedbackAction, FeedbackSource};
use sphere::{find_feedback_sphere, Sphere};
use transfer::Transfer;




#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The radius is vanishingly small, or not small compared with a root
    /// grid cell.
    DegenerateRadius,
    /// The grids of this level do not enclose the sphere.
    NotContained,
}




/// What to do with a sphere on a given level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedbackDecision {
    Skip(SkipReason),
    ApplyAtLevel,
    DeferToFinerLevel,
}




/**
 * Decide how a sphere acts on a level. The radius guard comes first; then
 * the sphere is applied on the coarsest level whose grids enclose it but
 * whose next finer level does not.
 *
 * Spheres are not wrapped across the periodic boundary of the domain. A
 * level whose lattice for the sphere reaches outside the unit cube does not
 * enclose it, so a particle near a face acts on a coarser level, in the
 * single cell holding it if need be.
 */
pub fn decide(hierarchy: &Hierarchy, level: usize, sphere: &Sphere) -> Result<FeedbackDecision> {
    if !sphere.radius.is_finite() {
        return Err(Error::NonFiniteRadius(sphere.radius))
    }
    if sphere.radius <= TINY_NUMBER || sphere.radius >= hierarchy.root_cell_width() / 2.0 {
        return Ok(FeedbackDecision::Skip(SkipReason::DegenerateRadius))
    }
    if !find_feedback_sphere(hierarchy, level, sphere).contained {
        return Ok(FeedbackDecision::Skip(SkipReason::NotContained))
    }
    if hierarchy.has_level(level + 1) && find_feedback_sphere(hierarchy, level + 1, sphere).contained {
        return Ok(FeedbackDecision::DeferToFinerLevel)
    }
    Ok(FeedbackDecision::ApplyAtLevel)
}




/**
 * Apply a source to every local grid on `level` and all finer levels. On
 * each level the source density is rescaled so that the lattice cells it
 * acts on carry exactly the sphere's total. The returned mass and momentum
 * are those moved on `level` itself; the cell count covers all levels.
 */
pub fn apply_sphere(hierarchy: &mut Hierarchy, level: usize, source: &FeedbackSource) -> Result<Transfer> {
    let rank = hierarchy.rank();
    let mut result = Transfer::default();

    for l in level..hierarchy.num_levels() {
        let search = find_feedback_sphere(hierarchy, l, &source.sphere);
        let op = source.operation().scaled(search.rescale(&source.sphere));

        for grid in hierarchy.grids_mut(l).iter_mut().filter(|g| g.is_local(rank)) {
            let moved = transfer::apply_to_grid(grid, &search.cells, &op)?;
            result.cells += moved.cells;

            if l == level {
                result.mass += moved.mass;
                for d in 0..3 {
                    result.momentum[d] += moved.momentum[d];
                }
            }
        }
    }
    Ok(result)
}




/**
 * Apply a source to the single cell holding the particle, if this process
 * holds the particle's grid.
 */
pub fn apply_single_cell(hierarchy: &mut Hierarchy, source: &FeedbackSource) -> Result<Transfer> {
    let gref = source.grid.ok_or_else(|| Error::InvalidGrid(format!("particle {} is not on a grid", source.particle)))?;

    if gref.rank != hierarchy.rank() {
        return Ok(Transfer::default())
    }
    let grid = hierarchy.grid_mut(gref.id).ok_or(Error::UnknownGrid(gref.id.0))?;
    let index = grid
        .cell_containing(source.sphere.center)
        .ok_or_else(|| Error::InvalidGrid(format!("particle {} has left grid {}", source.particle, gref.id)))?;

    transfer::apply_to_grid(grid, &[index], &source.operation())
}




/// Summary of one engine pass over a level.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineReport {
    pub sources: usize,
    pub applied: usize,
    pub deferred: usize,
    pub skipped: usize,
    pub cells_modified: usize,
    pub mass_accreted: f64,
    pub mass_ejected: f64,
    pub supernova_dt: f64,
}




/**
 * Removes accreted gas around accreting particles and injects supernova
 * ejecta around exploding stars. The engine remembers the time of its
 * previous pass, from which the supernova timestep is measured.
 */
#[derive(Clone, Debug, Default)]
pub struct AccretionFeedbackEngine {
    last_supernova_time: Option<f64>,
}




// ============================================================================
impl AccretionFeedbackEngine {

    pub fn new() -> Self {
        Self::default()
    }

    /// An engine continuing a run whose previous pass was at `time`.
    pub fn resume(last_supernova_time: Option<f64>) -> Self {
        Self { last_supernova_time }
    }

    pub fn reset(&mut self) {
        self.last_supernova_time = None;
    }

    pub fn last_supernova_time(&self) -> Option<f64> {
        self.last_supernova_time
    }


    /**
     * Build the sources for the particles this process holds. Particles of
     * species which are not enabled, which do not accrete under the current
     * parameters, or which have not recorded a positive accretion rate are
     * left out. Single-cell accretors act only on their own level.
     */
    pub fn collect_sources(
        &self,
        hierarchy: &Hierarchy,
        level: usize,
        registry: &SpeciesRegistry,
        params: &ParticleParameters,
        units: &Units) -> Result<Vec<FeedbackSource>>
    {
        let (_, dt) = hierarchy.level_time(level)?;
        let mut sources = Vec::new();

        for p in hierarchy.local_particles().filter(|p| p.is_active()) {
            let descriptor = match registry.by_enabled_id(p.enabled_id()) {
                Some(d) => d,
                None => continue,
            };
            let species = descriptor.species();
            let context = |radius: f64| move |e: Error| e.in_feedback(descriptor.name(), level, Some(radius));

            let source = if let Some(policy) = species.mass_removal(params) {
                if p.last_accretion_rate() < TINY_NUMBER {
                    continue;
                }
                match policy {
                    MassRemoval::SingleCell => {
                        if p.level() != level {
                            continue;
                        }
                        let density = parameters::single_cell_density(hierarchy, p, dt, units);
                        new_source(p, FeedbackAction::Subtract(policy), 0.0, density, 0.0, 0.0)
                    }
                    MassRemoval::Sphere => {
                        let radius = parameters::accretion_radius(hierarchy, p, params, units);
                        let s = parameters::calculate_subtraction_parameters(hierarchy, p, dt, params, units).map_err(context(radius))?;
                        new_source(p, FeedbackAction::Subtract(policy), s.radius, s.ejecta_density, 0.0, 0.0)
                    }
                }
            } else if species.injects_feedback() && p.feedback_flag() == FeedbackFlag::Supernova {
                let radius = parameters::feedback_radius(hierarchy, p, params);
                let f = parameters::calculate_feedback_parameters(hierarchy, p, params, units).map_err(context(radius))?;
                new_source(p, FeedbackAction::Inject, f.radius, f.ejecta_density, f.energy_density, f.metal_fraction)
            } else {
                continue;
            };
            sources.push(source);
        }
        Ok(sources)
    }


    /**
     * Run the engine on one level. This is a collective operation: every
     * process must call it for the same level, in the same order.
     */
    pub fn run<C: Communicator>(
        &mut self,
        hierarchy: &mut Hierarchy,
        level: usize,
        registry: &SpeciesRegistry,
        params: &ParticleParameters,
        units: &Units,
        comm: &C) -> Result<EngineReport>
    {
        let (time, _) = hierarchy.level_time(level)?;
        let supernova_dt = self.last_supernova_time.map_or(0.0, |t| time - t);
        self.last_supernova_time = Some(time);

        let local = self.collect_sources(hierarchy, level, registry, params, units)?;
        let mut sources = Vec::new();

        for bytes in comm.all_gather(util::encode(&local)?)? {
            sources.extend(util::decode::<Vec<FeedbackSource>>(&bytes)?);
        }
        sources.sort_by_key(|s| s.particle);

        let mut report = EngineReport { sources: sources.len(), supernova_dt, ..EngineReport::default() };

        if sources.is_empty() {
            return Ok(report)
        }
        let mut totals = Vec::with_capacity(5 * sources.len());

        for source in &sources {
            let name = registry.by_enabled_id(source.enabled_id).map_or("unknown", |d| d.name());
            let radius = match source.action {
                FeedbackAction::Subtract(MassRemoval::SingleCell) => None,
                _ => Some(source.sphere.radius),
            };
            let transfer = apply_source(hierarchy, level, source, &mut report)
                .map_err(|e| e.in_feedback(name, level, radius))?;
            totals.extend(transfer.to_vec());
        }
        let totals = comm.all_reduce_sum(&totals)?;

        for (source, chunk) in sources.iter().zip(totals.chunks(5)) {
            let moved = Transfer::from_slice(chunk);
            report.cells_modified += moved.cells;

            if moved.cells == 0 {
                continue;
            }
            if let Some(p) = hierarchy.find_particle_mut(source.particle) {
                let mass = units.code_mass_to_solar(moved.mass);
                match source.action {
                    FeedbackAction::Subtract(_) => {
                        let momentum = moved.momentum.map(|m| units.code_mass_to_solar(m));
                        p.accrete(mass, momentum);
                        report.mass_accreted += mass;
                    }
                    FeedbackAction::Inject => {
                        p.set_mass(p.mass() - mass);
                        p.set_feedback_flag(FeedbackFlag::Done);
                        report.mass_ejected += mass;
                    }
                }
            }
        }
        info!(
            "level {}: {} sources ({} applied, {} deferred, {} skipped), {} cells modified",
            level, report.sources, report.applied, report.deferred, report.skipped, report.cells_modified);
        Ok(report)
    }
}




fn new_source(p: &ParticleRecord, action: FeedbackAction, radius: f64, ejecta_density: f64, energy_density: f64, metal_fraction: f64) -> FeedbackSource {
    FeedbackSource {
        particle: p.id(),
        enabled_id: p.enabled_id(),
        action,
        sphere: Sphere { center: p.position(), radius },
        velocity: p.velocity(),
        grid: p.current_grid(),
        ejecta_density,
        energy_density,
        metal_fraction,
    }
}




fn apply_source(hierarchy: &mut Hierarchy, level: usize, source: &FeedbackSource, report: &mut EngineReport) -> Result<Transfer> {
    if source.action == FeedbackAction::Subtract(MassRemoval::SingleCell) {
        report.applied += 1;
        return apply_single_cell(hierarchy, source)
    }
    let decision = decide(hierarchy, level, &source.sphere)?;
    debug!("particle {} on level {}: {:?}", source.particle, level, decision);

    match decision {
        FeedbackDecision::Skip(_) => {
            report.skipped += 1;
            Ok(Transfer::default())
        }
        FeedbackDecision::DeferToFinerLevel => {
            report.deferred += 1;
            Ok(Transfer::default())
        }
        FeedbackDecision::ApplyAtLevel => {
            report.applied += 1;
            apply_sphere(hierarchy, level, source)
        }
    }
}
