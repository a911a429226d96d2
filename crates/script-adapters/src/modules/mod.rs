//! Módulos concretos del pipeline de guiones.

mod ingest;
mod normalize;
mod project_config;
mod scenes;

pub use ingest::IngestModule;
pub use normalize::NormalizeModule;
pub use project_config::ProjectConfigModule;
pub use scenes::ExtractScenesModule;

use script_core::ModuleInputs;
use script_domain::Artifact;

/// Primer input disponible, sin importar la clave con que el stage lo cableó.
pub(crate) fn primary_input(inputs: &ModuleInputs) -> Option<&Artifact> {
    inputs.values().next().and_then(|v| v.single())
}
