use std::collections::HashMap;
use log::debug;
use crate::error::{Error, Result};
use crate::grid::{Grid, GridId, GridRef};
use crate::index_space::IndexSpace;
use crate::particle::{ParticleId, ParticleRecord};




/**
 * The grid hierarchy as seen by the particle routines: one list of grids
 * per refinement level (the level array), coarsest first. The domain is the
 * unit cube; the root level is covered by `root_dims` cells and each finer
 * level refines the previous one by `refine_by`.
 *
 * Grids are owned by the hierarchy. Particles refer to their grid by a
 * `GridRef`, which is resolved through the id lookup table maintained here,
 * so grids may be rebuilt on re-meshing while particles persist.
 */
pub struct Hierarchy {
    rank: usize,
    root_dims: [usize; 3],
    refine_by: usize,
    levels: Vec<Vec<Grid>>,
    index: HashMap<GridId, (usize, usize)>,
}




// ============================================================================
impl Hierarchy {

    pub fn new(rank: usize, root_dims: [usize; 3], refine_by: usize) -> Result<Self> {
        if refine_by < 2 {
            return Err(Error::InvalidGrid(format!("refinement factor must be at least 2, got {}", refine_by)))
        }
        if root_dims.iter().any(|&n| n == 0) {
            return Err(Error::InvalidGrid(format!("root grid {:?} has no cells", root_dims)))
        }
        Ok(Self {
            rank,
            root_dims,
            refine_by,
            levels: Vec::new(),
            index: HashMap::new(),
        })
    }

    /// Rank of this process.
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn root_dims(&self) -> [usize; 3] {
        self.root_dims
    }

    pub fn refine_by(&self) -> usize {
        self.refine_by
    }

    pub fn root_cell_width(&self) -> f64 {
        1.0 / self.root_dims[0] as f64
    }

    pub fn cell_width(&self, level: usize) -> f64 {
        self.root_cell_width() / (self.refine_by as f64).powi(level as i32)
    }

    /// Number of levels holding at least one grid slot.
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn grids(&self, level: usize) -> &[Grid] {
        match self.levels.get(level) {
            Some(grids) => grids.as_slice(),
            None => &[],
        }
    }

    pub fn grids_mut(&mut self, level: usize) -> &mut [Grid] {
        match self.levels.get_mut(level) {
            Some(grids) => grids.as_mut_slice(),
            None => &mut [],
        }
    }

    pub fn has_level(&self, level: usize) -> bool {
        !self.grids(level).is_empty()
    }


    /**
     * Insert a grid. Its cell width must match its level, its id must be
     * new, and it must not overlap another grid of its level.
     */
    pub fn add_grid(&mut self, grid: Grid) -> Result<GridRef> {
        grid.validate()?;

        let expected = self.cell_width(grid.level());
        if (grid.cell_width() - expected).abs() > 1e-12 * expected {
            return Err(Error::InvalidGrid(format!(
                "grid {} has cell width {} but level {} requires {}",
                grid.id(), grid.cell_width(), grid.level(), expected)))
        }
        if self.index.contains_key(&grid.id()) {
            return Err(Error::InvalidGrid(format!("grid id {} is already in use", grid.id())))
        }
        if let Some(other) = self.grids(grid.level()).iter().find(|g| g.index_space().intersect(grid.index_space()).is_some()) {
            return Err(Error::InvalidGrid(format!("grid {} overlaps grid {} on level {}", grid.id(), other.id(), grid.level())))
        }

        let level = grid.level();
        while self.levels.len() <= level {
            self.levels.push(Vec::new());
        }
        let gref = grid.grid_ref();
        self.index.insert(grid.id(), (level, self.levels[level].len()));
        self.levels[level].push(grid);
        Ok(gref)
    }


    /**
     * Build an empty grid at the given level covering the given index
     * space, with the level's cell width.
     */
    pub fn new_grid(&self, id: GridId, rank: usize, level: usize, space: IndexSpace) -> Grid {
        Grid::new(id, rank, level, space, self.cell_width(level))
    }

    pub fn grid(&self, id: GridId) -> Option<&Grid> {
        self.index.get(&id).map(|&(l, n)| &self.levels[l][n])
    }

    pub fn grid_mut(&mut self, id: GridId) -> Option<&mut Grid> {
        let (l, n) = *self.index.get(&id)?;
        Some(&mut self.levels[l][n])
    }


    /**
     * Return the finest grid containing a point.
     */
    pub fn locate(&self, position: [f64; 3]) -> Option<&Grid> {
        self.levels
            .iter()
            .rev()
            .flat_map(|level| level.iter())
            .find(|g| g.contains_point(position))
    }


    /**
     * Place a particle on the finest grid containing it. The grid must be
     * held by this process.
     */
    pub fn attach(&mut self, mut particle: ParticleRecord) -> Result<GridRef> {
        let (id, level, gref) = {
            let grid = self.locate(particle.position())
                .ok_or_else(|| Error::InvalidGrid(format!("no grid contains particle {}", particle.id())))?;
            (grid.id(), grid.level(), grid.grid_ref())
        };
        let rank = self.rank;
        let grid = self.grid_mut(id).ok_or(Error::UnknownGrid(id.0))?;

        if !grid.is_local(rank) {
            return Err(Error::InvalidGrid(format!("grid {} is not held by rank {}", id, rank)))
        }
        debug!("attach particle {} to grid {} on level {}", particle.id(), id, level);
        particle.assign_grid(gref, level);
        grid.particles.push(particle);
        Ok(gref)
    }


    /**
     * Verify that every resident particle refers to the grid holding it,
     * and that its level is that grid's level.
     */
    pub fn check_placement(&self) -> Result<()> {
        for grid in self.levels.iter().flatten() {
            for p in grid.particles() {
                if p.current_grid() != Some(grid.grid_ref()) || p.level() != grid.level() {
                    return Err(Error::InvalidGrid(format!(
                        "particle {} on level {} refers to {:?} but lives on grid {} (level {})",
                        p.id(), p.level(), p.current_grid(), grid.id(), grid.level())))
                }
            }
        }
        Ok(())
    }

    pub fn local_particles(&self) -> impl Iterator<Item = &ParticleRecord> {
        let rank = self.rank;
        self.levels
            .iter()
            .flatten()
            .filter(move |g| g.is_local(rank))
            .flat_map(|g| g.particles().iter())
    }

    pub fn find_particle_mut(&mut self, id: ParticleId) -> Option<&mut ParticleRecord> {
        self.levels
            .iter_mut()
            .flatten()
            .flat_map(|g| g.particles.iter_mut())
            .find(|p| p.id() == id)
    }


    /**
     * Return the time and timestep of a level.
     */
    pub fn level_time(&self, level: usize) -> Result<(f64, f64)> {
        self.grids(level)
            .first()
            .map(|g| (g.time(), g.dt()))
            .ok_or(Error::EmptyLevel(level))
    }

    pub fn set_level_time(&mut self, level: usize, time: f64, dt: f64) {
        for grid in self.grids_mut(level) {
            grid.set_time(time, dt)
        }
    }
}
