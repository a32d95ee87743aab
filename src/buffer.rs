use serde::{Deserialize, Serialize};
use crate::error::Result;
use crate::grid::GridId;
use crate::message::util;
use crate::particle::{
    AccretionHistory,
    EnabledId,
    FeedbackFlag,
    ParticleId,
    ParticleRecord,
    ParticleType,
    MAX_ACCRETIONS,
};




#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]


/**
 * Flat, fixed-size snapshot of the transportable state of a particle. The
 * accretion history is stored oldest-first in two arrays of capacity
 * `MAX_ACCRETIONS`, with `naccretions` valid entries and zero padding. The
 * buffer holds no reference to any grid, so arrays of buffers can be shipped
 * between processes in a single message.
 */
pub struct ParticleBuffer {
    pub pos: [f64; 3],
    pub vel: [f64; 3],
    pub delta_vel: [f64; 3],
    pub naccretions: usize,
    #[serde(with = "fixed")]
    pub accretion_rate: [f64; MAX_ACCRETIONS],
    #[serde(with = "fixed")]
    pub accretion_time: [f64; MAX_ACCRETIONS],
    pub mass: f64,
    pub final_mass: f64,
    pub delta_mass: f64,
    pub birth_time: f64,
    pub life_time: f64,
    pub metallicity: f64,
    pub feedback_flag: FeedbackFlag,
    pub active: bool,
    pub identifier: u64,
    pub enabled_id: usize,
    pub level: usize,
    pub grid_id: Option<u64>,
    pub kind: ParticleType,
}




// ============================================================================
impl ParticleBuffer {

    /**
     * An empty buffer slot.
     */
    pub fn empty(kind: ParticleType) -> Self {
        Self {
            pos: [0.0; 3],
            vel: [0.0; 3],
            delta_vel: [0.0; 3],
            naccretions: 0,
            accretion_rate: [0.0; MAX_ACCRETIONS],
            accretion_time: [0.0; MAX_ACCRETIONS],
            mass: 0.0,
            final_mass: 0.0,
            delta_mass: 0.0,
            birth_time: 0.0,
            life_time: 0.0,
            metallicity: 0.0,
            feedback_flag: FeedbackFlag::NoFeedback,
            active: false,
            identifier: 0,
            enabled_id: 0,
            level: 0,
            grid_id: None,
            kind,
        }
    }

    /**
     * Allocate `count` empty buffer slots for particles of the given kind.
     */
    pub fn allocate(kind: ParticleType, count: usize) -> Vec<Self> {
        vec![Self::empty(kind); count]
    }

    /**
     * Copy the transportable state of a particle into this slot.
     */
    pub fn fill(&mut self, p: &ParticleRecord) {
        self.pos = p.position;
        self.vel = p.velocity;
        self.delta_vel = p.delta_vel;
        self.naccretions = p.accretion.len();
        self.accretion_rate = [0.0; MAX_ACCRETIONS];
        self.accretion_time = [0.0; MAX_ACCRETIONS];

        for (n, (rate, time)) in p.accretion.iter().enumerate() {
            self.accretion_rate[n] = *rate;
            self.accretion_time[n] = *time;
        }
        self.mass = p.mass;
        self.final_mass = p.final_mass;
        self.delta_mass = p.delta_mass;
        self.birth_time = p.birth_time;
        self.life_time = p.life_time;
        self.metallicity = p.metallicity;
        self.feedback_flag = p.feedback_flag;
        self.active = p.active;
        self.identifier = p.id.0;
        self.enabled_id = p.enabled_id.0;
        self.level = p.level;
        self.grid_id = p.grid_id.map(|g| g.0);
        self.kind = p.kind;
    }

    pub fn from_particle(p: &ParticleRecord) -> Self {
        let mut buffer = Self::empty(p.kind);
        buffer.fill(p);
        buffer
    }

    /**
     * Rebuild a particle. Its owning-grid relation is unset until the
     * receiving process attaches it to a grid.
     */
    pub fn to_particle(&self) -> ParticleRecord {
        let mut accretion = AccretionHistory::new();

        for n in 0..self.naccretions.min(MAX_ACCRETIONS) {
            accretion.record(self.accretion_rate[n], self.accretion_time[n]);
        }
        ParticleRecord {
            id: ParticleId(self.identifier),
            kind: self.kind,
            enabled_id: EnabledId(self.enabled_id),
            position: self.pos,
            velocity: self.vel,
            delta_vel: self.delta_vel,
            mass: self.mass,
            final_mass: self.final_mass,
            delta_mass: self.delta_mass,
            birth_time: self.birth_time,
            life_time: self.life_time,
            metallicity: self.metallicity,
            feedback_flag: self.feedback_flag,
            active: self.active,
            level: self.level,
            grid_id: self.grid_id.map(GridId),
            current_grid: None,
            accretion,
        }
    }
}




/**
 * Encode an array of buffers into one message.
 */
pub fn pack(buffers: &[ParticleBuffer]) -> Result<Vec<u8>> {
    util::encode(&buffers)
}




/**
 * Decode an array of buffers from a message produced by `pack`.
 */
pub fn unpack(bytes: &[u8]) -> Result<Vec<ParticleBuffer>> {
    util::decode(bytes)
}




/**
 * Serde adapter for the fixed-capacity history arrays, which are longer
 * than the arrays serde supports out of the box.
 */
mod fixed {
    use std::fmt;
    use serde::de::{Error, SeqAccess, Visitor};
    use serde::ser::SerializeTuple;
    use serde::{Deserializer, Serializer};
    use crate::particle::MAX_ACCRETIONS;

    pub fn serialize<S: Serializer>(values: &[f64; MAX_ACCRETIONS], serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(MAX_ACCRETIONS)?;
        for value in values {
            tuple.serialize_element(value)?;
        }
        tuple.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[f64; MAX_ACCRETIONS], D::Error> {
        struct ArrayVisitor;

        impl<'de> Visitor<'de> for ArrayVisitor {
            type Value = [f64; MAX_ACCRETIONS];

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "an array of {} numbers", MAX_ACCRETIONS)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut values = [0.0; MAX_ACCRETIONS];
                for (n, value) in values.iter_mut().enumerate() {
                    *value = seq.next_element()?.ok_or_else(|| A::Error::invalid_length(n, &self))?;
                }
                Ok(values)
            }
        }
        deserializer.deserialize_tuple(MAX_ACCRETIONS, ArrayVisitor)
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;
    use crate::grid::GridRef;

    fn particle() -> ParticleRecord {
        let mut p = ParticleRecord::new(
            ParticleId(12345),
            ParticleType::Mbh,
            EnabledId(2),
            [0.1, 0.2, 0.3],
            [-1.5, 2.5, 1e-7],
            1.0e6 + 1e-9);
        p.set_birth_time(0.25);
        p.set_life_time(1e3);
        p.set_metallicity(0.02);
        p.set_feedback_flag(FeedbackFlag::Accretion);
        p.kick([0.5, 0.0, -0.5]);
        p.accrete(1e-3, [0.0, 1e-3, 0.0]);
        for n in 0..37 {
            p.record_accretion(1e-8 * n as f64, 0.01 * n as f64);
        }
        p.assign_grid(GridRef { id: GridId(17), rank: 3 }, 4);
        p
    }

    #[test]
    fn buffer_round_trip_preserves_everything_but_the_grid() {
        let p = particle();
        let q = ParticleBuffer::from_particle(&p).to_particle();
        assert_eq!(q.current_grid(), None);
        assert_eq!(q.grid_id(), Some(GridId(17)));

        let mut expected = p.clone();
        expected.detach();
        assert_eq!(q, expected);
        assert_eq!(q.mass().to_bits(), p.mass().to_bits());
    }

    #[test]
    fn packed_buffers_survive_transport() {
        let mut p = particle();
        for n in 0..150 {
            p.record_accretion(n as f64, n as f64);
        }
        let buffers = vec![ParticleBuffer::from_particle(&p), ParticleBuffer::empty(ParticleType::Star)];
        let bytes = pack(&buffers).unwrap();
        let unpacked = unpack(&bytes).unwrap();
        assert_eq!(unpacked, buffers);
        assert_eq!(unpacked[0].naccretions, MAX_ACCRETIONS);
        assert_eq!(unpacked[0].accretion_rate[0], 50.0);
    }

    #[test]
    fn allocated_slots_are_empty() {
        let slots = ParticleBuffer::allocate(ParticleType::BlackHole, 3);
        assert_eq!(slots.len(), 3);
        assert!(slots.iter().all(|s| !s.active && s.naccretions == 0));
    }
}
