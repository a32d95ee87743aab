//! Active particles for block-structured adaptive mesh refinement: stars,
//! black holes and other point masses which form from the gas, accrete it,
//! and return mass and energy to it. Particle species are plugged in
//! through the `ParticleSpecies` trait and a `SpeciesRegistry`; the
//! `AccretionFeedbackEngine` moves mass, momentum and energy between
//! particles and every grid cell within their influence radius, across grid
//! boundaries, refinement levels and processes, conserving the totals.
//!
//! The grid hierarchy, units and message passing layers included here are
//! the minimal versions the particle routines need.

pub mod buffer;
pub mod checkpoint;
pub mod config;
pub mod derived;
pub mod engine;
pub mod error;
pub mod formation;
pub mod grid;
pub mod hierarchy;
pub mod index_space;
pub mod message;
pub mod migration;
pub mod particle;
pub mod registry;
pub mod simulation;
pub mod species;
pub mod units;

pub use error::{Error, Result};
pub use simulation::{LevelReport, SimulationContext};
