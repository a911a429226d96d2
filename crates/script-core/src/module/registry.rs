//! Registros de módulos y de compatibilidad de schemas.
//!
//! El catálogo es un objeto explícito, propiedad del engine, con método de
//! invalidación también explícito; no hay estado global perezoso.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use script_domain::ArtifactKind;

use super::contract::{Module, ModuleSpec};

/// Catálogo de módulos disponibles para las recetas.
#[derive(Default)]
pub struct ModuleRegistry {
    entries: BTreeMap<String, Arc<dyn Module>>,
    /// Specs cacheadas para el validador (reconstruibles con `invalidate`).
    cached_specs: BTreeMap<String, ModuleSpec>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Arc<dyn Module>) {
        let id = module.id().to_string();
        self.cached_specs.insert(id.clone(), module.spec());
        self.entries.insert(id, module);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Module>> {
        self.entries.get(id).cloned()
    }

    pub fn spec(&self, id: &str) -> Option<&ModuleSpec> {
        self.cached_specs.get(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Reconstruye la cache de specs desde las implementaciones registradas.
    pub fn invalidate(&mut self) {
        self.cached_specs = self.entries
                                .iter()
                                .map(|(id, m)| (id.clone(), m.spec()))
                                .collect();
    }
}

/// Compatibilidad entre tipos de artifact: igualdad exacta más aliases
/// declarados (simétricos).
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    aliases: BTreeMap<String, BTreeSet<String>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_alias(&mut self, a: &ArtifactKind, b: &ArtifactKind) {
        self.aliases
            .entry(a.as_str().to_string())
            .or_default()
            .insert(b.as_str().to_string());
        self.aliases
            .entry(b.as_str().to_string())
            .or_default()
            .insert(a.as_str().to_string());
    }

    pub fn compatible(&self, produced: &ArtifactKind, consumed: &ArtifactKind) -> bool {
        if produced == consumed {
            return true;
        }
        self.aliases
            .get(produced.as_str())
            .map(|set| set.contains(consumed.as_str()))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::contract::{ModuleContext, ModuleInputs, ModuleRunResult};
    use serde_json::Value;

    struct NullModule;
    impl Module for NullModule {
        fn id(&self) -> &str {
            "null"
        }
        fn spec(&self) -> ModuleSpec {
            ModuleSpec { input_schemas: vec![],
                         output_schemas: vec![ArtifactKind::SceneIndex] }
        }
        fn run(&self, _inputs: &ModuleInputs, _params: &Value, _ctx: &ModuleContext) -> ModuleRunResult {
            ModuleRunResult::Success { artifacts: vec![], cost: None }
        }
    }

    #[test]
    fn registry_caches_specs_and_invalidates_explicitly() {
        let mut reg = ModuleRegistry::new();
        reg.register(Arc::new(NullModule));
        assert!(reg.contains("null"));
        assert_eq!(reg.spec("null").map(|s| s.output_schemas.clone()),
                   Some(vec![ArtifactKind::SceneIndex]));
        reg.invalidate();
        assert!(reg.spec("null").is_some(), "invalidate reconstruye, no borra");
    }

    #[test]
    fn schema_compatibility_is_exact_or_aliased() {
        let mut schemas = SchemaRegistry::new();
        assert!(schemas.compatible(&ArtifactKind::Scene, &ArtifactKind::Scene));
        assert!(!schemas.compatible(&ArtifactKind::Scene, &ArtifactKind::SceneIndex));
        schemas.register_alias(&ArtifactKind::Custom("beat_sheet".into()), &ArtifactKind::SceneIndex);
        assert!(schemas.compatible(&ArtifactKind::Custom("beat_sheet".into()), &ArtifactKind::SceneIndex));
        assert!(schemas.compatible(&ArtifactKind::SceneIndex, &ArtifactKind::Custom("beat_sheet".into())));
    }
}
