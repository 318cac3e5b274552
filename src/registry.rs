use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::migrators::{Migrator, UseBuildTools, UseMamba};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown migrator: {0}")]
    UnknownMigrator(String),
}

/// Maps stable migrator names to their implementations.
///
/// The registry only fixes which migrators exist; execution order is given
/// explicitly by the caller when the pipeline is built.
pub struct MigratorRegistry {
    migrators: HashMap<&'static str, Arc<dyn Migrator>>,
}

impl MigratorRegistry {
    pub fn empty() -> Self {
        Self {
            migrators: HashMap::new(),
        }
    }

    /// The registry with every known migrator. New migrators are added here.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(UseBuildTools));
        registry.register(Arc::new(UseMamba));
        registry
    }

    /// Registers a migrator under its name. Two migrators sharing a name is
    /// a programming error, caught the moment the registry is built.
    pub fn register(&mut self, migrator: Arc<dyn Migrator>) {
        let name = migrator.name();
        let previous = self.migrators.insert(name, migrator);
        assert!(previous.is_none(), "migrator {name} registered twice");
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Migrator>, RegistryError> {
        self.migrators
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownMigrator(name.to_string()))
    }

    /// Resolves names into migrators, preserving the requested order.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<Arc<dyn Migrator>>, RegistryError> {
        names.iter().map(|name| self.get(name)).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.migrators.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for MigratorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_contents() {
        let registry = MigratorRegistry::builtin();
        assert_eq!(registry.names(), vec!["use_build_tools", "use_mamba"]);
    }

    #[test]
    fn test_unknown_migrator_lookup_fails() {
        let registry = MigratorRegistry::builtin();
        assert!(matches!(
            registry.get("use_pixi"),
            Err(RegistryError::UnknownMigrator(name)) if name == "use_pixi"
        ));
    }

    #[test]
    fn test_resolve_preserves_requested_order() {
        let registry = MigratorRegistry::builtin();
        let migrators = registry
            .resolve(&["use_mamba".to_string(), "use_build_tools".to_string()])
            .unwrap();
        assert_eq!(migrators[0].name(), "use_mamba");
        assert_eq!(migrators[1].name(), "use_build_tools");
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_registration_panics() {
        let mut registry = MigratorRegistry::builtin();
        registry.register(Arc::new(UseMamba));
    }
}
