//! Registro estándar de módulos del pipeline de guiones.

use std::sync::Arc;

use script_core::{ModuleRegistry, SchemaRegistry};

use crate::modules::{ExtractScenesModule, IngestModule, NormalizeModule, ProjectConfigModule};

/// Catálogo con los módulos de este crate ya registrados.
pub fn standard_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register(Arc::new(IngestModule::new()));
    registry.register(Arc::new(NormalizeModule::new()));
    registry.register(Arc::new(ExtractScenesModule::new()));
    registry.register(Arc::new(ProjectConfigModule::new()));
    registry
}

/// Compatibilidad de schemas del pipeline estándar (sin aliases extra).
pub fn standard_schemas() -> SchemaRegistry {
    SchemaRegistry::new()
}
