// error.rs
use thiserror::Error;

/// Error del dominio para los tipos de valor del pipeline (artifacts y
/// recetas). No cubre errores de ejecución del motor; esos viven en el core.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Error de validación: {0}")]
    ValidationError(String),

    #[error("Error de serialización: {0}")]
    SerializationError(String),

    #[error("Error en IO: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::SerializationError(e.to_string())
    }
}

impl From<serde_yaml::Error> for DomainError {
    fn from(e: serde_yaml::Error) -> Self {
        DomainError::SerializationError(e.to_string())
    }
}
