//! Backends de filesystem para los traits del core.
//!
//! Decisiones de durabilidad:
//! - Versiones de artifact se crean con `create_new`: si el archivo ya
//!   existe la escritura falla con `ImmutabilityViolation` en lugar de
//!   pisar contenido (guard físico ante carreras entre procesos).
//! - Documentos que se reescriben (grafo, run state) van vía archivo
//!   temporal + rename para no dejar JSON truncado si el proceso muere.
//! - El log de eventos es sólo append de líneas JSON completas.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::Path;

use chrono::Utc;
use log::{debug, warn};

use script_core::graph::DependencyGraph;
use script_core::{ArtifactStorage, EventSink, GraphStore, RunEvent, RunEventKind, RunState, RunStateStore, StoreError};
use script_domain::ArtifactKind;

use crate::paths::ProjectLayout;

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Key-value versionado sobre el layout `artifacts/<type>/<entity>/v<N>.json`.
pub struct FsArtifactStorage {
    layout: ProjectLayout,
}

impl FsArtifactStorage {
    pub fn new(layout: ProjectLayout) -> Self {
        Self { layout }
    }

    fn version_of(name: &str) -> Option<u32> {
        name.strip_prefix('v')?.strip_suffix(".json")?.parse().ok()
    }
}

impl ArtifactStorage for FsArtifactStorage {
    fn locate(&self, kind: &ArtifactKind, entity: Option<&str>, version: u32) -> String {
        self.layout
            .version_file(kind, entity, version)
            .to_string_lossy()
            .into_owned()
    }

    fn write_version(&mut self,
                     kind: &ArtifactKind,
                     entity: Option<&str>,
                     version: u32,
                     bytes: &[u8])
                     -> Result<String, StoreError> {
        let path = self.layout.version_file(kind, entity, version);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::ImmutabilityViolation { path: path.to_string_lossy().into_owned() });
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(bytes)?;
        debug!("wrote {}", path.display());
        Ok(path.to_string_lossy().into_owned())
    }

    fn read_version(&self, kind: &ArtifactKind, entity: Option<&str>, version: u32) -> Result<Vec<u8>, StoreError> {
        let path = self.layout.version_file(kind, entity, version);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound { key: path.to_string_lossy().into_owned() })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn versions(&self, kind: &ArtifactKind, entity: Option<&str>) -> Result<Vec<u32>, StoreError> {
        let dir = self.layout.entity_dir(kind, entity);
        let mut out: Vec<u32> = Vec::new();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if let Some(v) = Self::version_of(&entry.file_name().to_string_lossy()) {
                out.push(v);
            }
        }
        out.sort_unstable();
        Ok(out)
    }

    fn entities(&self, kind: &ArtifactKind) -> Result<Vec<Option<String>>, StoreError> {
        let dir = self.layout.entity_dir(kind, None);
        let type_dir = dir.parent().map(|p| p.to_path_buf()).unwrap_or(dir);
        let mut out: Vec<Option<String>> = Vec::new();
        let entries = match fs::read_dir(&type_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == script_domain::PROJECT_ENTITY {
                out.push(None);
            } else {
                out.push(Some(name));
            }
        }
        out.sort();
        Ok(out)
    }

    fn write_sidecar(&mut self,
                     kind: &ArtifactKind,
                     entity: Option<&str>,
                     version: u32,
                     name: &str,
                     bytes: &[u8])
                     -> Result<String, StoreError> {
        let dir = self.layout.sidecar_dir(kind, entity, version);
        fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        fs::write(&path, bytes)?;
        Ok(path.to_string_lossy().into_owned())
    }

    fn read_sidecar(&self,
                    kind: &ArtifactKind,
                    entity: Option<&str>,
                    version: u32,
                    name: &str)
                    -> Result<Vec<u8>, StoreError> {
        let path = self.layout.sidecar_dir(kind, entity, version).join(name);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound { key: path.to_string_lossy().into_owned() })
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Grafo de dependencias como documento único, reescrito tras cada mutación
/// (el ciclo read-modify-write completo ocurre bajo el lock del store).
pub struct FsGraphStore {
    layout: ProjectLayout,
}

impl FsGraphStore {
    pub fn new(layout: ProjectLayout) -> Self {
        Self { layout }
    }
}

impl GraphStore for FsGraphStore {
    fn load(&mut self) -> Result<DependencyGraph, StoreError> {
        let path = self.layout.graph_file();
        match fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(DependencyGraph::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&mut self, graph: &DependencyGraph) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(graph)?;
        write_atomic(&self.layout.graph_file(), &bytes)
    }
}

/// Estado de run como documento por `run_id`.
pub struct FsRunStateStore {
    layout: ProjectLayout,
}

impl FsRunStateStore {
    pub fn new(layout: ProjectLayout) -> Self {
        Self { layout }
    }
}

impl RunStateStore for FsRunStateStore {
    fn save(&mut self, state: &RunState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.layout.run_state_file(&state.run_id), &bytes)
    }

    fn load(&self, run_id: &str) -> Result<Option<RunState>, StoreError> {
        let path = self.layout.run_state_file(run_id);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Log de eventos en JSON lines, sólo append.
pub struct FsEventLog {
    layout: ProjectLayout,
    /// seq siguiente por run, sembrado contando líneas existentes.
    next_seq: HashMap<String, u64>,
}

impl FsEventLog {
    pub fn new(layout: ProjectLayout) -> Self {
        Self { layout,
               next_seq: HashMap::new() }
    }

    fn seed_seq(&mut self, run_id: &str) -> Result<u64, StoreError> {
        if let Some(seq) = self.next_seq.get(run_id) {
            return Ok(*seq);
        }
        let path = self.layout.events_file(run_id);
        let count = match fs::File::open(&path) {
            Ok(file) => BufReader::new(file).lines().count() as u64,
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        self.next_seq.insert(run_id.to_string(), count);
        Ok(count)
    }
}

impl EventSink for FsEventLog {
    fn append_kind(&mut self, run_id: &str, kind: RunEventKind) -> Result<RunEvent, StoreError> {
        let seq = self.seed_seq(run_id)?;
        let event = RunEvent { seq,
                               run_id: run_id.to_string(),
                               kind,
                               ts: Utc::now() };
        let path = self.layout.events_file(run_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let line = serde_json::to_string(&event)?;
        writeln!(file, "{line}")?;
        self.next_seq.insert(run_id.to_string(), seq + 1);
        Ok(event)
    }

    fn list(&self, run_id: &str) -> Result<Vec<RunEvent>, StoreError> {
        let path = self.layout.events_file(run_id);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut out = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunEvent>(&line) {
                Ok(ev) => out.push(ev),
                Err(e) => warn!("skipping malformed event line in {}: {e}", path.display()),
            }
        }
        Ok(out)
    }
}
