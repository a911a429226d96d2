//! Artifact store versionado y sus traits de almacenamiento.
//!
//! El store es el único lugar que asigna números de versión y el único
//! punto de entrada a la mutación del grafo de dependencias; ambos pasos
//! ocurren bajo el mismo lock por proyecto.

mod artifact_store;
mod diff;
mod storage;

pub use artifact_store::ArtifactStore;
pub use diff::{diff_values, DiffEntry, DiffKind};
pub use storage::{ArtifactStorage, GraphStore, InMemoryArtifactStorage, InMemoryGraphStore};
