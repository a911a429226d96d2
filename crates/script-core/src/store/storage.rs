//! Traits de almacenamiento y backends en memoria.
//!
//! El motor habla con el disco a través de dos interfaces mínimas:
//! - `ArtifactStorage`: key-value versionado por `(tipo, entidad)` con
//!   versiones monotónicas por clave y archivos sidecar con nombre.
//! - `GraphStore`: documento único con el grafo de dependencias, leído al
//!   abrir el proyecto y reescrito tras cada mutación.
//!
//! Los backends en memoria viven aquí para tests y para el modo efímero;
//! los de filesystem están en `script-persistence` con paridad 1:1.

use std::collections::{BTreeMap, HashMap};

use script_domain::{ArtifactKind, PROJECT_ENTITY};

use crate::errors::StoreError;
use crate::graph::DependencyGraph;

/// Key-value versionado para payloads de artifacts.
///
/// Contrato:
/// - `write_version` falla con `ImmutabilityViolation` si la versión ya
///   existe (guard ante carreras; inalcanzable bajo el lock del store).
/// - `versions` devuelve orden ascendente sin huecos si sólo se escribió a
///   través del store.
pub trait ArtifactStorage {
    /// Ruta/clave determinista de una versión (exista o no).
    fn locate(&self, kind: &ArtifactKind, entity: Option<&str>, version: u32) -> String;
    fn write_version(&mut self,
                     kind: &ArtifactKind,
                     entity: Option<&str>,
                     version: u32,
                     bytes: &[u8])
                     -> Result<String, StoreError>;
    fn read_version(&self, kind: &ArtifactKind, entity: Option<&str>, version: u32) -> Result<Vec<u8>, StoreError>;
    fn versions(&self, kind: &ArtifactKind, entity: Option<&str>) -> Result<Vec<u32>, StoreError>;
    fn entities(&self, kind: &ArtifactKind) -> Result<Vec<Option<String>>, StoreError>;
    /// Archivo sidecar con nombre junto a una versión (modo bible entry).
    fn write_sidecar(&mut self,
                     kind: &ArtifactKind,
                     entity: Option<&str>,
                     version: u32,
                     name: &str,
                     bytes: &[u8])
                     -> Result<String, StoreError>;
    fn read_sidecar(&self,
                    kind: &ArtifactKind,
                    entity: Option<&str>,
                    version: u32,
                    name: &str)
                    -> Result<Vec<u8>, StoreError>;
}

/// Documento persistido del grafo de dependencias.
pub trait GraphStore {
    fn load(&mut self) -> Result<DependencyGraph, StoreError>;
    fn save(&mut self, graph: &DependencyGraph) -> Result<(), StoreError>;
}

fn entity_label(entity: Option<&str>) -> String {
    entity.unwrap_or(PROJECT_ENTITY).to_string()
}

/// Backend de artifacts en memoria.
#[derive(Default)]
pub struct InMemoryArtifactStorage {
    versions: HashMap<(String, String), BTreeMap<u32, Vec<u8>>>,
    sidecars: HashMap<(String, String, u32, String), Vec<u8>>,
}

impl InMemoryArtifactStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(kind: &ArtifactKind, entity: Option<&str>) -> (String, String) {
        (kind.as_str().to_string(), entity_label(entity))
    }
}

impl ArtifactStorage for InMemoryArtifactStorage {
    fn locate(&self, kind: &ArtifactKind, entity: Option<&str>, version: u32) -> String {
        format!("mem://artifacts/{}/{}/v{}.json", kind.as_str(), entity_label(entity), version)
    }

    fn write_version(&mut self,
                     kind: &ArtifactKind,
                     entity: Option<&str>,
                     version: u32,
                     bytes: &[u8])
                     -> Result<String, StoreError> {
        let path = self.locate(kind, entity, version);
        let slot = self.versions.entry(Self::key(kind, entity)).or_default();
        if slot.contains_key(&version) {
            return Err(StoreError::ImmutabilityViolation { path });
        }
        slot.insert(version, bytes.to_vec());
        Ok(path)
    }

    fn read_version(&self, kind: &ArtifactKind, entity: Option<&str>, version: u32) -> Result<Vec<u8>, StoreError> {
        self.versions
            .get(&Self::key(kind, entity))
            .and_then(|slot| slot.get(&version))
            .cloned()
            .ok_or_else(|| StoreError::NotFound { key: self.locate(kind, entity, version) })
    }

    fn versions(&self, kind: &ArtifactKind, entity: Option<&str>) -> Result<Vec<u32>, StoreError> {
        Ok(self.versions
               .get(&Self::key(kind, entity))
               .map(|slot| slot.keys().copied().collect())
               .unwrap_or_default())
    }

    fn entities(&self, kind: &ArtifactKind) -> Result<Vec<Option<String>>, StoreError> {
        let kind_str = kind.as_str();
        let mut out: Vec<Option<String>> = self.versions
                                               .keys()
                                               .filter(|(k, _)| k == kind_str)
                                               .map(|(_, e)| {
                                                   if e == PROJECT_ENTITY {
                                                       None
                                                   } else {
                                                       Some(e.clone())
                                                   }
                                               })
                                               .collect();
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
        let path = format!("mem://artifacts/{}/{}/v{}.d/{}", kind.as_str(), entity_label(entity), version, name);
        self.sidecars
            .insert((kind.as_str().to_string(), entity_label(entity), version, name.to_string()),
                    bytes.to_vec());
        Ok(path)
    }

    fn read_sidecar(&self,
                    kind: &ArtifactKind,
                    entity: Option<&str>,
                    version: u32,
                    name: &str)
                    -> Result<Vec<u8>, StoreError> {
        self.sidecars
            .get(&(kind.as_str().to_string(), entity_label(entity), version, name.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound { key: format!("{}/{}/v{}.d/{}",
                                                               kind.as_str(),
                                                               entity_label(entity),
                                                               version,
                                                               name) })
    }
}

/// Grafo en memoria (sin durabilidad).
#[derive(Default)]
pub struct InMemoryGraphStore {
    graph: DependencyGraph,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GraphStore for InMemoryGraphStore {
    fn load(&mut self) -> Result<DependencyGraph, StoreError> {
        Ok(self.graph.clone())
    }

    fn save(&mut self, graph: &DependencyGraph) -> Result<(), StoreError> {
        self.graph = graph.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_version_guards_duplicates() {
        let mut st = InMemoryArtifactStorage::new();
        let kind = ArtifactKind::SceneIndex;
        st.write_version(&kind, None, 1, b"a").expect("first write");
        let err = st.write_version(&kind, None, 1, b"b").expect_err("duplicate must fail");
        assert!(matches!(err, StoreError::ImmutabilityViolation { .. }));
    }

    #[test]
    fn entities_distinguishes_project_sentinel() {
        let mut st = InMemoryArtifactStorage::new();
        let kind = ArtifactKind::Scene;
        st.write_version(&kind, Some("s2"), 1, b"{}").unwrap();
        st.write_version(&kind, Some("s1"), 1, b"{}").unwrap();
        st.write_version(&ArtifactKind::SceneIndex, None, 1, b"{}").unwrap();
        assert_eq!(st.entities(&kind).unwrap(),
                   vec![Some("s1".to_string()), Some("s2".to_string())]);
        assert_eq!(st.entities(&ArtifactKind::SceneIndex).unwrap(), vec![None]);
    }
}
