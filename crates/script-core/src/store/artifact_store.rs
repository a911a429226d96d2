//! `ArtifactStore`: persistencia versionada + bookkeeping de dependencias.
//!
//! Invariantes que este tipo garantiza:
//! - Asignación de versión `max(existentes) + 1` y escritura ocurren bajo el
//!   mismo lock por proyecto que la mutación del grafo (register + propagate
//!   + persistencia del grafo): una sola unidad read-modify-write.
//! - Un artifact escrito nunca se reescribe ni se borra; el guard de
//!   inmutabilidad del backend convierte cualquier carrera en error visible.

use std::sync::Mutex;

use log::debug;
use serde_json::{json, Value};

use script_domain::{Artifact, ArtifactKind, ArtifactMetadata, ArtifactRef, Health};

use crate::errors::StoreError;
use crate::graph::DependencyGraph;
use crate::hashing::hash_value;
use crate::store::diff::{diff_values, DiffEntry};
use crate::store::storage::{ArtifactStorage, GraphStore};

struct StoreInner<S, G> {
    storage: S,
    graph_store: G,
    graph: DependencyGraph,
}

/// Store versionado de artifacts de un proyecto.
pub struct ArtifactStore<S: ArtifactStorage, G: GraphStore> {
    inner: Mutex<StoreInner<S, G>>,
}

impl<S: ArtifactStorage, G: GraphStore> ArtifactStore<S, G> {
    /// Abre el store cargando el grafo persistido (vacío si es la primera
    /// vez).
    pub fn open(storage: S, mut graph_store: G) -> Result<Self, StoreError> {
        let graph = graph_store.load()?;
        Ok(Self { inner: Mutex::new(StoreInner { storage,
                                                 graph_store,
                                                 graph }) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, StoreInner<S, G>>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Io("project lock poisoned".to_string()))
    }

    /// Persiste una versión nueva de `(kind, entity)` y actualiza el grafo.
    ///
    /// Secuencia completa bajo el lock: asignar `next_version`, guard de
    /// inmutabilidad, escribir `{metadata (ref adjunta), data}`, registrar
    /// lineage en el grafo, propagar staleness para la versión nueva,
    /// persistir el grafo. Devuelve la ref recién creada.
    pub fn save_artifact(&self,
                         kind: &ArtifactKind,
                         entity: Option<&str>,
                         data: Value,
                         metadata: ArtifactMetadata)
                         -> Result<ArtifactRef, StoreError> {
        self.save_with_sidecars(kind, entity, data, metadata, &[])
    }

    /// Modo "bible entry": manifiesto pequeño + archivos sidecar con nombre,
    /// bajo la misma disciplina de versionado e inmutabilidad.
    pub fn save_bible_entry(&self,
                            entity: &str,
                            mut manifest: Value,
                            metadata: ArtifactMetadata,
                            sidecars: &[(String, Vec<u8>)])
                            -> Result<ArtifactRef, StoreError> {
        if let Value::Object(map) = &mut manifest {
            let names: Vec<Value> = sidecars.iter().map(|(n, _)| json!(n)).collect();
            map.insert("files".to_string(), Value::Array(names));
        }
        self.save_with_sidecars(&ArtifactKind::BibleEntry, Some(entity), manifest, metadata, sidecars)
    }

    fn save_with_sidecars(&self,
                          kind: &ArtifactKind,
                          entity: Option<&str>,
                          data: Value,
                          mut metadata: ArtifactMetadata,
                          sidecars: &[(String, Vec<u8>)])
                          -> Result<ArtifactRef, StoreError> {
        metadata.validate()?;
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        let versions = inner.storage.versions(kind, entity)?;
        let next = versions.last().copied().unwrap_or(0) + 1;
        let lineage = metadata.lineage.clone();

        metadata.annotations
                .insert("payload_hash".to_string(), json!(hash_value(&data)));
        let artifact_ref = ArtifactRef::new(kind.clone(),
                                            entity.map(|e| e.to_string()),
                                            next,
                                            inner.storage.locate(kind, entity, next));
        metadata.artifact_ref = Some(artifact_ref.clone());

        let artifact = Artifact::new(metadata, data);
        let bytes = serde_json::to_vec_pretty(&artifact)?;
        inner.storage.write_version(kind, entity, next, &bytes)?;
        for (name, content) in sidecars {
            inner.storage.write_sidecar(kind, entity, next, name, content)?;
        }

        inner.graph.register_artifact(&artifact_ref, &lineage);
        let marked = inner.graph.propagate_stale_for_new_version(&artifact_ref);
        if !marked.is_empty() {
            debug!("save {} invalidated {} downstream node(s)", artifact_ref, marked.len());
        }
        inner.graph_store.save(&inner.graph)?;
        Ok(artifact_ref)
    }

    /// Lee y deserializa una versión concreta.
    pub fn load_artifact(&self, artifact_ref: &ArtifactRef) -> Result<Artifact, StoreError> {
        let guard = self.lock()?;
        let bytes = guard.storage.read_version(&artifact_ref.artifact_type,
                                               artifact_ref.entity_id.as_deref(),
                                               artifact_ref.version)?;
        let artifact: Artifact = serde_json::from_slice(&bytes)?;
        Ok(artifact)
    }

    /// Lee un sidecar de una bible entry ya persistida.
    pub fn load_sidecar(&self, artifact_ref: &ArtifactRef, name: &str) -> Result<Vec<u8>, StoreError> {
        let guard = self.lock()?;
        guard.storage.read_sidecar(&artifact_ref.artifact_type,
                                   artifact_ref.entity_id.as_deref(),
                                   artifact_ref.version,
                                   name)
    }

    /// Refs de todas las versiones de `(kind, entity)`, ascendente.
    pub fn list_versions(&self, kind: &ArtifactKind, entity: Option<&str>) -> Result<Vec<ArtifactRef>, StoreError> {
        let guard = self.lock()?;
        let versions = guard.storage.versions(kind, entity)?;
        Ok(versions.into_iter()
                   .map(|v| ArtifactRef::new(kind.clone(),
                                             entity.map(|e| e.to_string()),
                                             v,
                                             guard.storage.locate(kind, entity, v)))
                   .collect())
    }

    /// Ref de la versión más alta, si existe alguna.
    pub fn latest(&self, kind: &ArtifactKind, entity: Option<&str>) -> Result<Option<ArtifactRef>, StoreError> {
        Ok(self.list_versions(kind, entity)?.pop())
    }

    pub fn list_entities(&self, kind: &ArtifactKind) -> Result<Vec<Option<String>>, StoreError> {
        self.lock()?.storage.entities(kind)
    }

    /// Diff estructural entre los payloads de dos versiones.
    pub fn diff_versions(&self, a: &ArtifactRef, b: &ArtifactRef) -> Result<Vec<DiffEntry>, StoreError> {
        let old = self.load_artifact(a)?;
        let new = self.load_artifact(b)?;
        Ok(diff_values(&old.data, &new.data))
    }

    // --- consultas y mutaciones de salud sobre el grafo ---

    pub fn health(&self, artifact_ref: &ArtifactRef) -> Result<Option<Health>, StoreError> {
        Ok(self.lock()?.graph.get_health(artifact_ref))
    }

    /// Cambio de salud explícito (confirmación humana o stale manual);
    /// persiste el grafo. Devuelve false si el nodo no existe.
    pub fn set_health(&self, artifact_ref: &ArtifactRef, health: Health) -> Result<bool, StoreError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let changed = inner.graph.set_health(artifact_ref, health);
        if changed {
            inner.graph_store.save(&inner.graph)?;
        }
        Ok(changed)
    }

    pub fn stale(&self) -> Result<Vec<ArtifactRef>, StoreError> {
        Ok(self.lock()?.graph.get_stale())
    }

    pub fn dependencies(&self, artifact_ref: &ArtifactRef) -> Result<Vec<ArtifactRef>, StoreError> {
        Ok(self.lock()?.graph.get_dependencies(artifact_ref))
    }

    pub fn dependents(&self, artifact_ref: &ArtifactRef) -> Result<Vec<ArtifactRef>, StoreError> {
        Ok(self.lock()?.graph.get_dependents(artifact_ref))
    }

    /// Copia del grafo para inspección (tests, tooling).
    pub fn graph_snapshot(&self) -> Result<DependencyGraph, StoreError> {
        Ok(self.lock()?.graph.clone())
    }
}
