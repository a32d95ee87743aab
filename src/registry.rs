use std::collections::HashMap;
use log::info;
use crate::buffer::ParticleBuffer;
use crate::config::ParticleParameters;
use crate::error::{Error, Result};
use crate::formation::{FormationContext, FormationFlags};
use crate::grid::Grid;
use crate::particle::{EnabledId, ParticleType};
use crate::units::Units;




/// How an accreting species takes its accreted mass out of the gas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MassRemoval {
    /// Only the cell hosting the particle.
    SingleCell,
    /// Every cell within the influence radius, across grids and levels.
    Sphere,
}




/**
 * The capability interface of a particle species. A physics module adds a
 * species by implementing this trait and registering an instance with the
 * `SpeciesRegistry`; the framework never needs to know the concrete type.
 */
pub trait ParticleSpecies: Send + Sync {

    /// The kind tag carried by every particle of this species.
    fn particle_type(&self) -> ParticleType;

    /// Which entries of the formation context the formation routine reads.
    fn describe_flags(&self) -> FormationFlags;

    /// Inspect a grid and create new particles through the context.
    fn evaluate_formation(&self, grid: &Grid, context: &mut FormationContext) -> Result<()>;

    /// Update this species' particles on a grid before the engine runs:
    /// estimate accretion rates, flag supernovae, and so on. The species
    /// owns the particles carrying enabled-ID `id`.
    fn evaluate_feedback(&self, grid: &mut Grid, id: EnabledId, units: &Units, params: &ParticleParameters) -> Result<()>;

    /// Reserve transport buffers for `count` particles of this species.
    fn allocate_buffers(&self, count: usize) -> Vec<ParticleBuffer> {
        ParticleBuffer::allocate(self.particle_type(), count)
    }

    /// The mass removal policy, if particles of this species accrete gas
    /// under the current parameters.
    fn mass_removal(&self, _params: &ParticleParameters) -> Option<MassRemoval> {
        None
    }

    /// Whether particles of this species inject supernova feedback.
    fn injects_feedback(&self) -> bool {
        false
    }

    fn is_radiation_source(&self) -> bool {
        false
    }
}




/// Registry entry for one species: its name, prototype, and enabled-ID.
pub struct SpeciesDescriptor {
    name: String,
    species: Box<dyn ParticleSpecies>,
    enabled_id: Option<EnabledId>,
}

impl SpeciesDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn species(&self) -> &dyn ParticleSpecies {
        self.species.as_ref()
    }

    pub fn enabled_id(&self) -> Option<EnabledId> {
        self.enabled_id
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled_id.is_some()
    }
}




/// Opaque reference to a registered species.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SpeciesHandle(usize);




/**
 * Name-keyed collection of the particle species known to a run. Species
 * are registered during initialization, then a subset is enabled from the
 * parameters. Enabled species receive dense identifiers in the order they
 * were enabled, starting from zero; the enabled count never decreases.
 */
#[derive(Default)]
pub struct SpeciesRegistry {
    descriptors: Vec<SpeciesDescriptor>,
    names: HashMap<String, SpeciesHandle>,
    enabled: Vec<SpeciesHandle>,
}




// ============================================================================
impl SpeciesRegistry {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, species: Box<dyn ParticleSpecies>) -> Result<SpeciesHandle> {
        if self.names.contains_key(name) {
            return Err(Error::DuplicateSpecies(name.to_string()))
        }
        let handle = SpeciesHandle(self.descriptors.len());
        self.descriptors.push(SpeciesDescriptor { name: name.to_string(), species, enabled_id: None });
        self.names.insert(name.to_string(), handle);
        Ok(handle)
    }

    pub fn enable(&mut self, handle: SpeciesHandle) -> Result<EnabledId> {
        let id = EnabledId(self.enabled.len());
        let descriptor = &mut self.descriptors[handle.0];

        if descriptor.enabled_id.is_some() {
            return Err(Error::SpeciesEnabledTwice(descriptor.name.clone()))
        }
        descriptor.enabled_id = Some(id);
        self.enabled.push(handle);
        info!("enabled particle species {} with id {}", descriptor.name, id.0);
        Ok(id)
    }

    pub fn enable_by_name(&mut self, name: &str) -> Result<EnabledId> {
        let handle = self.lookup(name).ok_or_else(|| Error::UnknownSpecies(name.to_string()))?;
        self.enable(handle)
    }

    pub fn lookup(&self, name: &str) -> Option<SpeciesHandle> {
        self.names.get(name).copied()
    }

    /// Number of registered species.
    pub fn count(&self) -> usize {
        self.descriptors.len()
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled.len()
    }

    pub fn descriptor(&self, handle: SpeciesHandle) -> &SpeciesDescriptor {
        &self.descriptors[handle.0]
    }

    /// Enabled species in enabled-ID order.
    pub fn enabled(&self) -> impl Iterator<Item = &SpeciesDescriptor> {
        self.enabled.iter().map(move |h| &self.descriptors[h.0])
    }

    pub fn by_enabled_id(&self, id: EnabledId) -> Option<&SpeciesDescriptor> {
        self.enabled.get(id.0).map(|h| &self.descriptors[h.0])
    }

    /// The first registered species of a kind. Several species may share a
    /// kind; particles are matched to their species by enabled-ID.
    pub fn by_type(&self, kind: ParticleType) -> Option<&SpeciesDescriptor> {
        self.descriptors.iter().find(|d| d.species.particle_type() == kind)
    }

    /// Enable every species named in the parameters, in order.
    pub fn enable_from(&mut self, params: &ParticleParameters) -> Result<()> {
        for name in &params.active_particle_types {
            self.enable_by_name(name)?;
        }
        Ok(())
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use super::*;

    struct Inert(ParticleType);

    impl ParticleSpecies for Inert {
        fn particle_type(&self) -> ParticleType {
            self.0
        }

        fn describe_flags(&self) -> FormationFlags {
            FormationFlags::none()
        }

        fn evaluate_formation(&self, _: &Grid, _: &mut FormationContext) -> Result<()> {
            Ok(())
        }

        fn evaluate_feedback(&self, _: &mut Grid, _: EnabledId, _: &Units, _: &ParticleParameters) -> Result<()> {
            Ok(())
        }
    }

    fn registry() -> SpeciesRegistry {
        let mut registry = SpeciesRegistry::new();
        registry.register("A", Box::new(Inert(ParticleType::Star))).unwrap();
        registry.register("B", Box::new(Inert(ParticleType::BlackHole))).unwrap();
        registry.register("C", Box::new(Inert(ParticleType::Mbh))).unwrap();
        registry
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = registry();
        assert!(matches!(
            registry.register("B", Box::new(Inert(ParticleType::Star))),
            Err(Error::DuplicateSpecies(_))));
        assert_eq!(registry.count(), 3);
    }

    #[test]
    fn enabled_ids_are_dense_in_enable_order() {
        let mut registry = registry();
        assert_eq!(registry.enable_by_name("C").unwrap(), EnabledId(0));
        assert_eq!(registry.enable_by_name("A").unwrap(), EnabledId(1));
        assert_eq!(registry.enabled_count(), 2);

        let names: Vec<_> = registry.enabled().map(|d| d.name().to_string()).collect();
        assert_eq!(names, vec!["C", "A"]);
        assert_eq!(registry.by_enabled_id(EnabledId(1)).unwrap().name(), "A");
        assert!(!registry.descriptor(registry.lookup("B").unwrap()).is_enabled());
    }

    #[test]
    fn enabling_twice_fails() {
        let mut registry = registry();
        registry.enable_by_name("B").unwrap();
        assert!(matches!(registry.enable_by_name("B"), Err(Error::SpeciesEnabledTwice(_))));
        assert_eq!(registry.enabled_count(), 1);
        assert!(matches!(registry.enable_by_name("D"), Err(Error::UnknownSpecies(_))));
    }

    #[test]
    fn default_buffers_carry_the_species_type() {
        let registry = registry();
        let d = registry.by_type(ParticleType::Mbh).unwrap();
        assert_eq!(d.name(), "C");
        let buffers = d.species().allocate_buffers(4);
        assert!(buffers.iter().all(|b| b.kind == ParticleType::Mbh));
        assert_eq!(d.species().mass_removal(&ParticleParameters::default()), None);
    }

    #[test]
    fn species_sharing_a_kind_are_told_apart_by_enabled_id() {
        let mut registry = registry();
        registry.register("D", Box::new(Inert(ParticleType::Mbh))).unwrap();
        assert_eq!(registry.enable_by_name("D").unwrap(), EnabledId(0));
        assert_eq!(registry.enable_by_name("C").unwrap(), EnabledId(1));
        assert_eq!(registry.by_enabled_id(EnabledId(0)).unwrap().name(), "D");
        assert_eq!(registry.by_enabled_id(EnabledId(1)).unwrap().name(), "C");
        assert!(registry.by_enabled_id(EnabledId(2)).is_none());
    }
}
