use std::io::{Read, Write};
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::hierarchy::Hierarchy;
use crate::particle::{ParticleIdAllocator, ParticleRecord};




/**
 * The particle state of one process at one instant, written as CBOR. Each
 * process writes and reads its own checkpoint; placements are rebuilt on
 * restore, so the grid layout may differ from the one that was saved.
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub time: f64,
    pub last_supernova_time: Option<f64>,
    pub particles: Vec<ParticleRecord>,
}




// ============================================================================
impl Checkpoint {

    pub fn capture(hierarchy: &Hierarchy, time: f64, last_supernova_time: Option<f64>) -> Self {
        Self {
            time,
            last_supernova_time,
            particles: hierarchy.local_particles().cloned().collect(),
        }
    }

    pub fn write<W: Write>(&self, writer: W) -> Result<()> {
        ciborium::ser::into_writer(self, writer).map_err(|e| Error::Checkpoint(format!("{:?}", e)))
    }

    pub fn read<R: Read>(reader: R) -> Result<Self> {
        ciborium::de::from_reader(reader).map_err(|e| Error::Checkpoint(format!("{:?}", e)))
    }


    /**
     * Attach the saved particles to the grids now holding their positions,
     * and move the identifier allocator past every restored identifier.
     * Returns the number of particles restored.
     */
    pub fn restore(self, hierarchy: &mut Hierarchy, ids: &mut ParticleIdAllocator) -> Result<usize> {
        let count = self.particles.len();

        for mut p in self.particles {
            ids.advance_past(p.id());
            p.detach();
            hierarchy.attach(p)?;
        }
        Ok(count)
    }
}
