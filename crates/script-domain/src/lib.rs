// script-domain library entry point
pub mod artifact;
pub mod error;
pub mod recipe;

pub use artifact::{Artifact, ArtifactKind, ArtifactMetadata, ArtifactRef, CostData, Health, ProvenanceSource};
pub use error::DomainError;
pub use recipe::{Recipe, RecipeStage, ResilienceConfig};

/// Etiqueta de entidad usada cuando un artifact pertenece al proyecto entero
/// (sin `entity_id`). Participa en rutas de almacenamiento y claves del grafo.
pub const PROJECT_ENTITY: &str = "__project__";
