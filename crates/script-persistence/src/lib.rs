//! Implementaciones de filesystem de los traits de persistencia del core.
//!
//! Objetivo del crate:
//! - Backend durable en JSON plano con paridad 1:1 respecto a los backends
//!   en memoria de `script-core` (mismo comportamiento observable).
//! - Layout persistido:
//!   - `<project>/artifacts/<type>/<entity|__project__>/v<N>.json`
//!     (+ `v<N>.d/<sidecar>` para bible entries)
//!   - `<project>/graph/dependency_graph.json`
//!   - `<project>/output/runs/<run_id>/run_state.json`
//!   - `<project>/output/runs/<run_id>/pipeline_events.jsonl` (append-only)
//! - La exclusión entre escritores la da el lock por proyecto del
//!   `ArtifactStore`; este crate añade el guard físico (`create_new`) que
//!   convierte cualquier carrera restante en `ImmutabilityViolation`.

mod fs;
mod paths;

pub use fs::{FsArtifactStorage, FsEventLog, FsGraphStore, FsRunStateStore};
pub use paths::ProjectLayout;

use script_core::{ArtifactStore, StoreError};
use std::path::Path;

/// Abre el store de artifacts de un proyecto con backends de filesystem.
pub fn open_project_store(project_dir: &Path)
                          -> Result<ArtifactStore<FsArtifactStorage, FsGraphStore>, StoreError> {
    let layout = ProjectLayout::new(project_dir);
    ArtifactStore::open(FsArtifactStorage::new(layout.clone()), FsGraphStore::new(layout))
}
