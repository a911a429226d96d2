//! Errores del core y clasificación transitorio/terminal.
//!
//! Taxonomía (ver política de propagación en el engine):
//! - `ValidationError`: receta inválida; fatal antes de tocar storage.
//! - `StoreError`: persistencia de artifacts/grafo; incluye la violación de
//!   inmutabilidad (duplicar una versión es un bug o una carrera, nunca un
//!   estado legítimo).
//! - `ModuleError`: fallo reportado por un módulo; `Transient` entra al ciclo
//!   de retry/backoff/fallback, `Terminal` corta el stage y sus dependientes.
//! - `EngineError`: paraguas del driver; un run con stages fallidos NO es un
//!   `EngineError` (el estado por stage queda en `RunState`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use script_domain::DomainError;

/// Error de validación de receta. Siempre fatal antes de ejecutar.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ValidationError {
    #[error("recipe has no stages")]
    EmptyRecipe,
    #[error("duplicate stage id '{stage}'")]
    DuplicateStage { stage: String },
    #[error("unknown module '{module}' in stage '{stage}'")]
    UnknownModule { stage: String, module: String },
    #[error("stage '{stage}' references unknown stage '{reference}'")]
    UnknownStageRef { stage: String, reference: String },
    #[error("schema mismatch: stage '{consumer}' declares no input compatible with any output of '{producer}'")]
    SchemaMismatch { consumer: String, producer: String },
    #[error("ambiguous wiring in stage '{stage}': '{upstream}' appears both as data dependency and store input")]
    AmbiguousWiring { stage: String, upstream: String },
    #[error("dependency cycle: {cycle}")]
    CycleDetected { cycle: String },
}

/// Error de la capa de persistencia (artifacts, grafo, run state, eventos).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Intento de escribir dos veces la misma versión. Inalcanzable bajo el
    /// lock por proyecto; se guarda el guard igualmente.
    #[error("immutability violation: artifact version already exists at {path}")]
    ImmutabilityViolation { path: String },
    #[error("artifact not found: {key}")]
    NotFound { key: String },
    #[error("invalid artifact: {0}")]
    Invalid(String),
    #[error("io: {0}")]
    Io(String),
    #[error("serialization: {0}")]
    Serde(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serde(e.to_string())
    }
}

impl From<DomainError> for StoreError {
    fn from(e: DomainError) -> Self {
        StoreError::Invalid(e.to_string())
    }
}

/// Fallo reportado por un módulo al ejecutar un stage.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleError {
    /// Señal transitoria del proveedor (rate limit, overload, 5xx, timeout).
    #[error("transient: {0}")]
    Transient(String),
    /// Fallo no recuperable para este stage.
    #[error("terminal: {0}")]
    Terminal(String),
}

/// Clasificación usada por la política de retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Terminal,
}

/// Clasifica un `ModuleError` para el ciclo retry/backoff/fallback.
pub fn classify_error(error: &ModuleError) -> ErrorClass {
    match error {
        ModuleError::Transient(_) => ErrorClass::Transient,
        ModuleError::Terminal(_) => ErrorClass::Terminal,
    }
}

/// Clasifica el mensaje crudo de un proveedor externo. Útil para módulos que
/// sólo disponen del texto del error.
pub fn classify_provider_message(message: &str) -> ErrorClass {
    let m = message.to_ascii_lowercase();
    let transient = ["rate limit", "429", "overloaded", "overload", "timeout", "timed out", "503", "502", "500",
                     "unavailable"];
    if transient.iter().any(|needle| m.contains(needle)) {
        ErrorClass::Transient
    } else {
        ErrorClass::Terminal
    }
}

/// Error paraguas del driver engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("missing required input '{key}' for stage '{stage_id}'")]
    MissingInput { stage_id: String, key: String },
    #[error("unknown start_from stage '{0}'")]
    UnknownStartStage(String),
    #[error("internal: {0}")]
    Internal(String),
}
