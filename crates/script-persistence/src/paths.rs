//! Layout de rutas de un proyecto en disco.

use std::path::{Path, PathBuf};

use script_domain::{ArtifactKind, PROJECT_ENTITY};

/// Resuelve todas las rutas persistidas a partir del directorio de proyecto.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entity_dir(&self, kind: &ArtifactKind, entity: Option<&str>) -> PathBuf {
        self.root
            .join("artifacts")
            .join(kind.as_str())
            .join(entity.unwrap_or(PROJECT_ENTITY))
    }

    pub fn version_file(&self, kind: &ArtifactKind, entity: Option<&str>, version: u32) -> PathBuf {
        self.entity_dir(kind, entity).join(format!("v{version}.json"))
    }

    pub fn sidecar_dir(&self, kind: &ArtifactKind, entity: Option<&str>, version: u32) -> PathBuf {
        self.entity_dir(kind, entity).join(format!("v{version}.d"))
    }

    pub fn graph_file(&self) -> PathBuf {
        self.root.join(script_core::constants::GRAPH_FILE)
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join("output").join("runs").join(run_id)
    }

    pub fn run_state_file(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(script_core::constants::RUN_STATE_FILE)
    }

    pub fn events_file(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join(script_core::constants::EVENTS_FILE)
    }
}
