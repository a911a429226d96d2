//! Frontera de módulos: el colaborador externo del motor.
//!
//! Un módulo es una función de `(inputs, params, context)` a
//! `(artifacts, cost)`; puede pedir una pausa (checkpoint) o fallar. El
//! motor no conoce nada más de su interior: ni prompts, ni parsing de
//! respuestas de modelo.

mod contract;
mod registry;

pub use contract::{ArtifactDraft, InputValue, Module, ModuleContext, ModuleInputs, ModuleRunResult, ModuleSpec};
pub use registry::{ModuleRegistry, SchemaRegistry};
