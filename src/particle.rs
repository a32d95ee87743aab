use std::collections::VecDeque;
use std::fmt;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::grid::{GridId, GridRef};




/// Capacity of a particle's accretion history, and of the fixed arrays in
/// a `ParticleBuffer`.
pub const MAX_ACCRETIONS: usize = 100;




/// Globally unique particle identifier. Identifiers are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticleId(pub u64);

impl fmt::Display for ParticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}




/// Dense, 0-based index of an enabled species.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnabledId(pub usize);




/// The physical kind of an active particle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ParticleType {
    Star,
    BlackHole,
    Mbh,
}




/// Where a particle is in its feedback lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackFlag {
    NoFeedback,
    Formation,
    Supernova,
    Accretion,
    Done,
}




/**
 * Allocates particle identifiers from a process-wide monotonic counter.
 * Process `rank` of `size` hands out `counter * size + rank`, so
 * identifiers are strictly increasing in creation order on each process and
 * distinct across processes.
 */
#[derive(Clone, Debug)]
pub struct ParticleIdAllocator {
    rank: u64,
    size: u64,
    counter: u64,
}

impl ParticleIdAllocator {
    pub fn new(rank: usize, size: usize) -> Result<Self> {
        if rank >= size {
            return Err(Error::InvalidRank { rank, size })
        }
        Ok(Self { rank: rank as u64, size: size as u64, counter: 0 })
    }

    /// Hand out identifiers from the start again.
    pub fn restart(&mut self) {
        self.counter = 0
    }

    pub fn next_id(&mut self) -> ParticleId {
        let id = ParticleId(self.counter * self.size + self.rank);
        self.counter += 1;
        id
    }

    /// Number of identifiers handed out so far.
    pub fn allocated(&self) -> u64 {
        self.counter
    }

    /// Skip past identifiers already in use, e.g. after a restart.
    pub fn advance_past(&mut self, id: ParticleId) {
        let counter = id.0 / self.size + 1;
        self.counter = self.counter.max(counter);
    }
}




/**
 * Bounded, time-ordered sequence of (accretion rate, time) pairs. When the
 * history is full, recording a new entry drops the oldest one.
 */
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccretionHistory {
    entries: VecDeque<(f64, f64)>,
}

impl AccretionHistory {
    pub fn new() -> Self {
        Self { entries: VecDeque::with_capacity(MAX_ACCRETIONS) }
    }

    pub fn record(&mut self, rate: f64, time: f64) {
        if self.entries.len() == MAX_ACCRETIONS {
            self.entries.pop_front();
        }
        self.entries.push_back((rate, time));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent accretion rate, or zero if nothing was recorded.
    pub fn last_rate(&self) -> f64 {
        self.entries.back().map_or(0.0, |e| e.0)
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &(f64, f64)> {
        self.entries.iter()
    }

    /// Interleave two histories by time, keeping the most recent entries.
    pub fn merged(&self, other: &Self) -> Self {
        let mut all: Vec<_> = self.entries.iter().chain(other.entries.iter()).cloned().collect();
        all.sort_by(|a, b| a.1.total_cmp(&b.1));
        let skip = all.len().saturating_sub(MAX_ACCRETIONS);
        Self { entries: all.into_iter().skip(skip).collect() }
    }
}




#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]


/**
 * The physical state of one active particle. Masses are in solar masses,
 * positions, velocities and times in code units.
 */
pub struct ParticleRecord {
    pub(crate) id: ParticleId,
    pub(crate) kind: ParticleType,
    pub(crate) enabled_id: EnabledId,
    pub(crate) position: [f64; 3],
    pub(crate) velocity: [f64; 3],
    pub(crate) delta_vel: [f64; 3],
    pub(crate) mass: f64,
    pub(crate) final_mass: f64,
    pub(crate) delta_mass: f64,
    pub(crate) birth_time: f64,
    pub(crate) life_time: f64,
    pub(crate) metallicity: f64,
    pub(crate) feedback_flag: FeedbackFlag,
    pub(crate) active: bool,
    pub(crate) level: usize,
    pub(crate) grid_id: Option<GridId>,
    pub(crate) current_grid: Option<GridRef>,
    pub(crate) accretion: AccretionHistory,
}




// ============================================================================
impl ParticleRecord {

    /**
     * Create a particle which is not yet placed on any grid. Species create
     * particles through `FormationContext::create_particle`, which also
     * assigns the identifier and the placement.
     */
    pub fn new(id: ParticleId, kind: ParticleType, enabled_id: EnabledId, position: [f64; 3], velocity: [f64; 3], mass: f64) -> Self {
        Self {
            id,
            kind,
            enabled_id,
            position,
            velocity,
            delta_vel: [0.0; 3],
            mass,
            final_mass: mass,
            delta_mass: 0.0,
            birth_time: 0.0,
            life_time: 0.0,
            metallicity: 0.0,
            feedback_flag: FeedbackFlag::NoFeedback,
            active: true,
            level: 0,
            grid_id: None,
            current_grid: None,
            accretion: AccretionHistory::new(),
        }
    }

    pub fn id(&self) -> ParticleId {
        self.id
    }

    pub fn kind(&self) -> ParticleType {
        self.kind
    }

    pub fn enabled_id(&self) -> EnabledId {
        self.enabled_id
    }

    pub fn position(&self) -> [f64; 3] {
        self.position
    }

    pub fn velocity(&self) -> [f64; 3] {
        self.velocity
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn delta_mass(&self) -> f64 {
        self.delta_mass
    }

    pub fn final_mass(&self) -> f64 {
        self.final_mass
    }

    pub fn birth_time(&self) -> f64 {
        self.birth_time
    }

    pub fn life_time(&self) -> f64 {
        self.life_time
    }

    pub fn metallicity(&self) -> f64 {
        self.metallicity
    }

    pub fn feedback_flag(&self) -> FeedbackFlag {
        self.feedback_flag
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn grid_id(&self) -> Option<GridId> {
        self.grid_id
    }

    pub fn current_grid(&self) -> Option<GridRef> {
        self.current_grid
    }

    pub fn accretion(&self) -> &AccretionHistory {
        &self.accretion
    }

    pub fn last_accretion_rate(&self) -> f64 {
        self.accretion.last_rate()
    }

    pub fn set_birth_time(&mut self, time: f64) {
        self.birth_time = time
    }

    pub fn set_life_time(&mut self, time: f64) {
        self.life_time = time
    }

    pub fn set_metallicity(&mut self, metallicity: f64) {
        self.metallicity = metallicity
    }

    pub fn set_feedback_flag(&mut self, flag: FeedbackFlag) {
        self.feedback_flag = flag
    }

    pub fn set_mass(&mut self, mass: f64) {
        self.mass = mass
    }

    pub fn add_mass(&mut self, dm: f64) {
        self.mass += dm
    }

    pub fn record_accretion(&mut self, rate: f64, time: f64) {
        self.accretion.record(rate, time)
    }

    /**
     * Place the particle on a grid. The level must be the grid's level;
     * `Hierarchy::attach` is the only caller that keeps the two consistent.
     */
    pub(crate) fn assign_grid(&mut self, grid: GridRef, level: usize) {
        self.grid_id = Some(grid.id);
        self.current_grid = Some(grid);
        self.level = level;
    }

    /// Forget the owning grid, e.g. before the particle is shipped to
    /// another process.
    pub(crate) fn detach(&mut self) {
        self.current_grid = None;
    }

    /**
     * Accrete mass (solar masses) carrying the given momentum (solar masses
     * times code velocity). Velocity changes so that momentum is conserved.
     */
    pub fn accrete(&mut self, mass: f64, momentum: [f64; 3]) {
        let total = self.mass + mass;
        if total > 0.0 {
            for dim in 0..3 {
                self.velocity[dim] = (self.mass * self.velocity[dim] + momentum[dim]) / total;
            }
        }
        self.mass = total;
        self.delta_mass = mass;
    }

    /// Queue a velocity change, applied by the next drift.
    pub fn kick(&mut self, delta_vel: [f64; 3]) {
        for dim in 0..3 {
            self.delta_vel[dim] += delta_vel[dim];
        }
    }

    /**
     * Apply pending kicks and move the particle by `dt`, wrapping the
     * position into the periodic unit domain.
     */
    pub fn drift(&mut self, dt: f64) {
        for dim in 0..3 {
            self.velocity[dim] += self.delta_vel[dim];
            self.delta_vel[dim] = 0.0;
            self.position[dim] = (self.position[dim] + self.velocity[dim] * dt).rem_euclid(1.0);
        }
    }

    pub fn separation2(&self, other: &Self) -> f64 {
        (0..3).map(|d| (self.position[d] - other.position[d]).powi(2)).sum()
    }

    pub fn separation(&self, other: &Self) -> f64 {
        self.separation2(other).sqrt()
    }

    pub fn relative_velocity2(&self, other: &Self) -> f64 {
        (0..3).map(|d| (self.velocity[d] - other.velocity[d]).powi(2)).sum()
    }

    /**
     * Two particles may merge if they are distinct, active, and of the same
     * kind.
     */
    pub fn mergeable(&self, other: &Self) -> bool {
        self.id != other.id && self.active && other.active && self.kind == other.kind
    }

    /**
     * Absorb another particle: mass-weighted position and velocity, summed
     * masses, the earlier birth time, and the merged accretion history. The
     * other particle is disabled.
     */
    pub fn merge(&mut self, other: &mut Self) {
        let total = self.mass + other.mass;

        if total > 0.0 {
            for dim in 0..3 {
                self.position[dim] = (self.mass * self.position[dim] + other.mass * other.position[dim]) / total;
                self.velocity[dim] = (self.mass * self.velocity[dim] + other.mass * other.velocity[dim]) / total;
            }
        }
        self.mass = total;
        self.final_mass += other.final_mass;
        self.birth_time = self.birth_time.min(other.birth_time);
        self.accretion = self.accretion.merged(&other.accretion);
        other.mass = 0.0;
        other.disable();
    }

    pub fn disable(&mut self) {
        self.active = false;
        self.feedback_flag = FeedbackFlag::Done;
    }

    /**
     * A newly formed star starts in the `Formation` state and switches to
     * `NoFeedback` once the simulation time has passed its birth time.
     */
    pub fn activate_new_star(&mut self, time: f64) {
        if self.feedback_flag == FeedbackFlag::Formation && time > self.birth_time {
            self.feedback_flag = FeedbackFlag::NoFeedback;
        }
    }

    /// A particle is dead when it is disabled or has lost all of its mass.
    pub fn is_dead(&self) -> bool {
        !self.active || self.mass <= 0.0
    }
}




/**
 * Merge every mergeable pair closer than `radius`. Survivors keep the
 * smaller identifier; absorbed particles are returned as disabled records.
 */
pub fn merge_close_pairs(particles: &mut Vec<ParticleRecord>, radius: f64) -> Vec<ParticleRecord> {
    if radius <= 0.0 {
        return Vec::new();
    }
    particles.sort_by_key(|p| p.id);

    for a in 0..particles.len() {
        for b in a + 1..particles.len() {
            let (head, tail) = particles.split_at_mut(b);
            let (pa, pb) = (&mut head[a], &mut tail[0]);

            if pa.mergeable(pb) && pa.separation(pb) < radius {
                pa.merge(pb);
            }
        }
    }
    let (alive, dead): (Vec<_>, Vec<_>) = particles.drain(..).partition(|p| p.is_active());
    *particles = alive;
    dead
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;

    fn particle(id: u64, position: [f64; 3], mass: f64) -> ParticleRecord {
        ParticleRecord::new(ParticleId(id), ParticleType::Star, EnabledId(0), position, [0.0; 3], mass)
    }

    #[test]
    fn identifiers_are_unique_and_increasing() {
        let mut ids = ParticleIdAllocator::new(0, 1).unwrap();
        let issued: Vec<_> = (0..100).map(|_| ids.next_id()).collect();
        assert!(issued.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ids.allocated(), 100);
    }

    #[test]
    fn identifiers_are_disjoint_across_ranks() {
        let mut a = ParticleIdAllocator::new(0, 3).unwrap();
        let mut b = ParticleIdAllocator::new(2, 3).unwrap();
        let ia: Vec<_> = (0..50).map(|_| a.next_id()).collect();
        let ib: Vec<_> = (0..50).map(|_| b.next_id()).collect();
        assert!(ia.iter().all(|id| !ib.contains(id)));
        assert!(ib.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn allocator_advances_past_restored_identifiers() {
        let mut ids = ParticleIdAllocator::new(1, 2).unwrap();
        ids.advance_past(ParticleId(41));
        assert!(ids.next_id() > ParticleId(41));
        ids.restart();
        assert_eq!(ids.next_id(), ParticleId(1));
    }

    #[test]
    fn ranks_outside_the_group_are_rejected() {
        assert!(matches!(ParticleIdAllocator::new(2, 2), Err(Error::InvalidRank { rank: 2, size: 2 })));
        assert!(matches!(ParticleIdAllocator::new(0, 0), Err(Error::InvalidRank { .. })));
    }

    #[test]
    fn history_drops_oldest_entries_when_full() {
        let mut history = AccretionHistory::new();
        for n in 0..(MAX_ACCRETIONS + 5) {
            history.record(n as f64, n as f64);
        }
        assert_eq!(history.len(), MAX_ACCRETIONS);
        assert_eq!(history.iter().next(), Some(&(5.0, 5.0)));
        assert_eq!(history.last_rate(), (MAX_ACCRETIONS + 4) as f64);
    }

    #[test]
    fn accretion_conserves_momentum() {
        let mut p = particle(0, [0.5; 3], 10.0);
        p.velocity = [1.0, 0.0, 0.0];
        p.accrete(10.0, [0.0, 20.0, 0.0]);
        assert_eq!(p.mass(), 20.0);
        assert_eq!(p.velocity(), [0.5, 1.0, 0.0]);
        assert_eq!(p.delta_mass(), 10.0);
    }

    #[test]
    fn pair_diagnostics() {
        let mut a = particle(0, [0.1, 0.2, 0.2], 1.0);
        let mut b = particle(1, [0.4, 0.6, 0.2], 1.0);
        a.velocity = [1.0, 0.0, 0.0];
        b.velocity = [0.0, 2.0, 0.0];
        assert!((a.separation(&b) - 0.5).abs() < 1e-12);
        assert_eq!(a.relative_velocity2(&b), 5.0);
        assert!(a.mergeable(&b));

        b.add_mass(-1.0);
        assert!(b.is_dead());
        b.disable();
        assert!(!a.mergeable(&b));
    }

    #[test]
    fn drift_applies_kicks_and_wraps() {
        let mut p = particle(0, [0.95, 0.5, 0.5], 1.0);
        p.kick([1.0, 0.0, 0.0]);
        p.drift(0.1);
        assert!((p.position()[0] - 0.05).abs() < 1e-12);
        assert_eq!(p.velocity()[0], 1.0);
    }

    #[test]
    fn close_pairs_are_merged_into_the_older_particle() {
        let mut particles = vec![
            particle(3, [0.50, 0.5, 0.5], 1.0),
            particle(1, [0.52, 0.5, 0.5], 3.0),
            particle(7, [0.90, 0.5, 0.5], 1.0),
        ];
        let dead = merge_close_pairs(&mut particles, 0.05);
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id(), ParticleId(3));
        assert_eq!(particles.len(), 2);
        assert_eq!(particles[0].id(), ParticleId(1));
        assert_eq!(particles[0].mass(), 4.0);
        assert!((particles[0].position()[0] - 0.515).abs() < 1e-12);
    }

    #[test]
    fn new_star_activates_after_birth() {
        let mut p = particle(0, [0.5; 3], 1.0);
        p.set_feedback_flag(FeedbackFlag::Formation);
        p.set_birth_time(1.0);
        p.activate_new_star(1.0);
        assert_eq!(p.feedback_flag(), FeedbackFlag::Formation);
        p.activate_new_star(1.5);
        assert_eq!(p.feedback_flag(), FeedbackFlag::NoFeedback);
    }
}
