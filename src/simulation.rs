use log::{debug, info};
use crate::checkpoint::Checkpoint;
use crate::config::ParticleParameters;
use crate::engine::transfer;
use crate::engine::{AccretionFeedbackEngine, EngineReport};
use crate::error::{Error, Result};
use crate::formation::FormationContext;
use crate::grid::Grid;
use crate::hierarchy::Hierarchy;
use crate::message::comm::Communicator;
use crate::migration;
use crate::particle::{self, ParticleId, ParticleIdAllocator, ParticleRecord};
use crate::registry::SpeciesRegistry;
use crate::species;
use crate::units::Units;




/// What happened to the particles of one level during one step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LevelReport {
    pub level: usize,
    pub formed: usize,
    pub engine: EngineReport,
    pub merged: usize,
    pub pruned: usize,
    pub migrated: usize,
}




/**
 * The run state of the particle subsystem on one process: the species
 * registry, the identifier allocator, the engine and its clock, and the
 * parameters and units everything is evaluated with. Nothing here is
 * global; a second context is an independent run.
 */
pub struct SimulationContext {
    registry: SpeciesRegistry,
    params: ParticleParameters,
    units: Units,
    ids: ParticleIdAllocator,
    engine: AccretionFeedbackEngine,
    rank: usize,
    size: usize,
}




// ============================================================================
impl SimulationContext {

    /**
     * Register the built-in species and enable those named in the
     * parameters, for process `rank` of a group of `size`.
     */
    pub fn new(params: ParticleParameters, rank: usize, size: usize) -> Result<Self> {
        let mut registry = SpeciesRegistry::new();
        species::register_builtin(&mut registry)?;
        Self::with_registry(registry, params, rank, size)
    }

    /// Use a registry to which further species were added before
    /// enabling.
    pub fn with_registry(mut registry: SpeciesRegistry, params: ParticleParameters, rank: usize, size: usize) -> Result<Self> {
        params.validate()?;
        registry.enable_from(&params)?;

        Ok(Self {
            registry,
            units: params.units,
            params,
            ids: ParticleIdAllocator::new(rank, size)?,
            engine: AccretionFeedbackEngine::new(),
            rank,
            size,
        })
    }

    pub fn registry(&self) -> &SpeciesRegistry {
        &self.registry
    }

    pub fn params(&self) -> &ParticleParameters {
        &self.params
    }

    pub fn units(&self) -> &Units {
        &self.units
    }

    pub fn engine(&self) -> &AccretionFeedbackEngine {
        &self.engine
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Hand out an identifier for a particle created outside formation,
    /// e.g. from initial conditions.
    pub fn next_particle_id(&mut self) -> ParticleId {
        self.ids.next_id()
    }

    /// Start over: forget the engine's clock and restart identifiers.
    pub fn reset(&mut self) {
        self.engine.reset();
        self.ids.restart();
    }


    /**
     * Run the formation routine of every enabled species on every grid of
     * `level` held by this process. The mass of each new particle is taken
     * from the cell it forms in. Returns the number of particles formed.
     */
    pub fn form_particles(&mut self, hierarchy: &mut Hierarchy, level: usize) -> Result<usize> {
        let rank = hierarchy.rank();
        let mut formed = 0;

        for descriptor in self.registry.enabled() {
            let species = descriptor.species();
            let enabled_id = descriptor
                .enabled_id()
                .ok_or_else(|| Error::UnknownSpecies(descriptor.name().to_string()))?;

            for grid in hierarchy.grids_mut(level).iter_mut().filter(|g| g.is_local(rank)) {
                let capacity = grid.num_cells();
                let mut context = FormationContext::construct(
                    grid,
                    species.describe_flags(),
                    &self.units,
                    &self.params,
                    &mut self.ids,
                    enabled_id,
                    capacity)?;
                species.evaluate_formation(grid, &mut context)?;

                let new_particles = context.destroy();
                if !new_particles.is_empty() {
                    debug!("{} new {} particles on grid {}", new_particles.len(), descriptor.name(), grid.id());
                }
                formed += new_particles.len();

                for mut p in new_particles {
                    remove_formed_mass(grid, &p, &self.units)?;
                    p.assign_grid(grid.grid_ref(), grid.level());
                    grid.particles_mut().push(p);
                }
            }
        }
        Ok(formed)
    }


    /// Let every enabled species update its particles on the local grids
    /// of `level`.
    pub fn species_feedback(&self, hierarchy: &mut Hierarchy, level: usize) -> Result<()> {
        let rank = hierarchy.rank();

        for descriptor in self.registry.enabled() {
            let enabled_id = descriptor
                .enabled_id()
                .ok_or_else(|| Error::UnknownSpecies(descriptor.name().to_string()))?;

            for grid in hierarchy.grids_mut(level).iter_mut().filter(|g| g.is_local(rank)) {
                descriptor
                    .species()
                    .evaluate_feedback(grid, enabled_id, &self.units, &self.params)
                    .map_err(|e| e.in_feedback(descriptor.name(), level, None))?;
            }
        }
        Ok(())
    }


    /**
     * Advance the particles of one level by its timestep: formation,
     * species feedback, the accretion / feedback engine, merging, pruning,
     * drift, and migration. The level's clock moves forward by one
     * timestep. Collective over the communicator.
     */
    pub fn step_level<C: Communicator>(&mut self, hierarchy: &mut Hierarchy, level: usize, comm: &C) -> Result<LevelReport> {
        let (time, dt) = hierarchy.level_time(level)?;
        let rank = hierarchy.rank();
        let mut report = LevelReport { level, ..LevelReport::default() };

        report.formed = self.form_particles(hierarchy, level)?;
        self.species_feedback(hierarchy, level)?;
        report.engine = self.engine.run(hierarchy, level, &self.registry, &self.params, &self.units, comm)?;

        let merge_radius = self.params.active_particle_merge_radius;

        for grid in hierarchy.grids_mut(level).iter_mut().filter(|g| g.is_local(rank)) {
            report.merged += particle::merge_close_pairs(grid.particles_mut(), merge_radius).len();
            report.pruned += grid.prune_particles().len();

            for p in grid.particles_mut() {
                p.drift(dt);
            }
        }
        report.migrated = migration::migrate(hierarchy, &self.registry, comm)?;
        hierarchy.set_level_time(level, time + dt, dt);

        info!(
            "level {} at t={:.4e}: {} formed, {} merged, {} pruned, {} received",
            level, time, report.formed, report.merged, report.pruned, report.migrated);
        Ok(report)
    }


    /// Step every level, coarse to fine.
    pub fn step<C: Communicator>(&mut self, hierarchy: &mut Hierarchy, comm: &C) -> Result<Vec<LevelReport>> {
        (0..hierarchy.num_levels())
            .map(|level| self.step_level(hierarchy, level, comm))
            .collect()
    }


    /// Identifiers of the local particles whose species emit radiation.
    pub fn radiation_sources(&self, hierarchy: &Hierarchy) -> Vec<ParticleId> {
        hierarchy
            .local_particles()
            .filter(|p| p.is_active())
            .filter(|p| self.registry.by_enabled_id(p.enabled_id()).map_or(false, |d| d.species().is_radiation_source()))
            .map(|p| p.id())
            .collect()
    }

    pub fn checkpoint(&self, hierarchy: &Hierarchy) -> Result<Checkpoint> {
        let (time, _) = hierarchy.level_time(0)?;
        Ok(Checkpoint::capture(hierarchy, time, self.engine.last_supernova_time()))
    }

    /// Resume from a checkpoint; returns the number of particles restored.
    pub fn restore(&mut self, hierarchy: &mut Hierarchy, checkpoint: Checkpoint) -> Result<usize> {
        self.engine = AccretionFeedbackEngine::resume(checkpoint.last_supernova_time);
        checkpoint.restore(hierarchy, &mut self.ids)
    }
}




fn remove_formed_mass(grid: &mut Grid, p: &ParticleRecord, units: &Units) -> Result<()> {
    let index = grid
        .cell_containing(p.position())
        .ok_or_else(|| Error::InvalidGrid(format!("particle {} formed outside grid {}", p.id(), grid.id())))?;
    let mut cell = grid.read_cell(index)?;
    transfer::subtract(&mut cell, units.solar_mass_to_code(p.mass()) / grid.cell_volume())?;
    grid.write_cell(index, &cell)
}
