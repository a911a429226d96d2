//! Contrato de ejecución de módulos.
//!
//! `ModuleContext` es una struct explícita con campos nombrados (incluido el
//! callback de streaming): lo que un módulo puede legítimamente usar es
//! visible en compilación, no un dict arbitrario.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use script_domain::{Artifact, ArtifactKind, ArtifactMetadata, CostData};

use crate::errors::ModuleError;

/// Schemas declarados por un módulo (tipos de artifact que consume/produce).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpec {
    pub input_schemas: Vec<ArtifactKind>,
    pub output_schemas: Vec<ArtifactKind>,
}

/// Valor de input resuelto para una clave: un artifact (`needs`) o la lista
/// a través de entidades (`needs_all`).
#[derive(Debug, Clone)]
pub enum InputValue {
    Single(Artifact),
    Many(Vec<Artifact>),
}

impl InputValue {
    pub fn single(&self) -> Option<&Artifact> {
        match self {
            InputValue::Single(a) => Some(a),
            InputValue::Many(list) => list.first(),
        }
    }

    pub fn many(&self) -> &[Artifact] {
        match self {
            InputValue::Single(a) => std::slice::from_ref(a),
            InputValue::Many(list) => list,
        }
    }
}

/// Inputs por clave declarada (id de stage upstream o clave de store_input).
pub type ModuleInputs = BTreeMap<String, InputValue>;

/// Artifact propuesto por un módulo; el store le asigna versión y ruta.
#[derive(Debug, Clone)]
pub struct ArtifactDraft {
    pub artifact_type: ArtifactKind,
    pub entity_id: Option<String>,
    pub data: Value,
    pub metadata: ArtifactMetadata,
}

/// Contexto entregado a `Module::run`. Clonable para poder cruzar el hilo
/// del timeout por intento.
#[derive(Clone)]
pub struct ModuleContext {
    pub project_dir: PathBuf,
    pub run_id: String,
    pub stage_id: String,
    pub runtime_params: Value,
    /// Callback opcional para anunciar resultados parciales en streaming.
    pub announce_artifact: Option<Arc<dyn Fn(&ArtifactDraft) + Send + Sync>>,
}

impl ModuleContext {
    pub fn announce(&self, draft: &ArtifactDraft) {
        if let Some(cb) = &self.announce_artifact {
            cb(draft);
        }
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
         .field("project_dir", &self.project_dir)
         .field("run_id", &self.run_id)
         .field("stage_id", &self.stage_id)
         .field("runtime_params", &self.runtime_params)
         .field("announce_artifact", &self.announce_artifact.is_some())
         .finish()
    }
}

/// Resultado abstracto de ejecutar un módulo.
#[derive(Debug)]
pub enum ModuleRunResult {
    Success {
        artifacts: Vec<ArtifactDraft>,
        cost: Option<CostData>,
    },
    /// Checkpoint: el stage queda `paused` esperando input externo.
    Pause { reason: String },
    Failure { error: ModuleError },
}

/// Unidad de procesamiento enchufable. Implementaciones deben ser puras
/// respecto a `(inputs, params, context)`; `Send + Sync` porque cada intento
/// corre en un hilo de trabajo con timeout.
pub trait Module: Send + Sync {
    /// Identificador estable del módulo dentro del registro.
    fn id(&self) -> &str;

    /// Schemas de entrada/salida declarados (los usa el validador).
    fn spec(&self) -> ModuleSpec;

    fn run(&self, inputs: &ModuleInputs, params: &Value, ctx: &ModuleContext) -> ModuleRunResult;
}
