use std::collections::BTreeMap;
use log::debug;
use crate::buffer::{self, ParticleBuffer};
use crate::error::{Error, Result};
use crate::hierarchy::Hierarchy;
use crate::message::comm::Communicator;
use crate::particle::{EnabledId, ParticleRecord};
use crate::registry::SpeciesRegistry;




/**
 * Move every particle which is no longer on the finest grid containing its
 * position. Particles whose new grid is held by this process are attached
 * to it directly; the others are detached and returned, to be shipped with
 * `exchange`.
 */
pub fn relocate(hierarchy: &mut Hierarchy) -> Result<Vec<ParticleRecord>> {
    let rank = hierarchy.rank();
    let mut resident = Vec::new();

    for level in 0..hierarchy.num_levels() {
        for grid in hierarchy.grids_mut(level).iter_mut().filter(|g| g.is_local(rank)) {
            resident.append(&mut grid.particles);
        }
    }
    let mut outgoing = Vec::new();

    for mut p in resident {
        let (gref, local) = hierarchy
            .locate(p.position())
            .map(|g| (g.grid_ref(), g.is_local(rank)))
            .ok_or_else(|| Error::InvalidGrid(format!("no grid contains particle {}", p.id())))?;

        if local {
            if p.current_grid() != Some(gref) {
                debug!("particle {} moves to grid {}", p.id(), gref.id);
            }
            hierarchy.attach(p)?;
        } else {
            debug!("particle {} leaves for grid {} on rank {}", p.id(), gref.id, gref.rank);
            p.detach();
            outgoing.push(p);
        }
    }
    Ok(outgoing)
}




/**
 * Ship particles to the processes holding their new grids, and attach the
 * particles received from every peer. Buffers come from the species owning
 * each particle. Each process sends exactly one
 * message to every other process, so this is a collective operation.
 * Returns the number of particles received.
 */
pub fn exchange<C: Communicator>(
    hierarchy: &mut Hierarchy,
    registry: &SpeciesRegistry,
    outgoing: Vec<ParticleRecord>,
    comm: &C) -> Result<usize>
{
    let rank = comm.rank();
    let mut by_destination: BTreeMap<usize, BTreeMap<EnabledId, Vec<ParticleRecord>>> = BTreeMap::new();

    for p in outgoing {
        let dest = hierarchy
            .locate(p.position())
            .map(|g| g.rank())
            .ok_or_else(|| Error::InvalidGrid(format!("no grid contains particle {}", p.id())))?;
        by_destination.entry(dest).or_default().entry(p.enabled_id()).or_default().push(p);
    }

    for peer in (0..comm.size()).filter(|&r| r != rank) {
        let mut buffers = Vec::new();

        for (id, particles) in by_destination.remove(&peer).unwrap_or_default() {
            let species = registry
                .by_enabled_id(id)
                .ok_or_else(|| Error::UnknownSpecies(format!("enabled species {}", id.0)))?
                .species();
            let mut slots = species.allocate_buffers(particles.len());

            for (slot, p) in slots.iter_mut().zip(&particles) {
                slot.fill(p);
            }
            buffers.extend(slots);
        }
        comm.send(peer, buffer::pack(&buffers)?);
    }

    let mut received = 0;
    for peer in (0..comm.size()).filter(|&r| r != rank) {
        let buffers: Vec<ParticleBuffer> = buffer::unpack(&comm.recv(peer))?;
        received += buffers.len();

        for b in buffers {
            hierarchy.attach(b.to_particle())?;
        }
    }
    Ok(received)
}




/// Relocate, then exchange.
pub fn migrate<C: Communicator>(hierarchy: &mut Hierarchy, registry: &SpeciesRegistry, comm: &C) -> Result<usize> {
    let outgoing = relocate(hierarchy)?;
    exchange(hierarchy, registry, outgoing, comm)
}
