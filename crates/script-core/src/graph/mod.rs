//! Grafo de dependencias persistente sobre versiones de artifacts.
//!
//! Rol en el pipeline:
//! - Cada `save_artifact` registra un nodo por versión y las aristas que
//!   declara su `lineage` (upstream) con la relación inversa (downstream).
//! - Al aparecer una versión nueva, la propagación de staleness marca como
//!   `stale` lo alcanzable desde el downstream de la versión anterior.
//! - La regla de no-contaminación entre hermanos está en
//!   `propagate_stale_for_new_version`: es corrección requerida, no una
//!   optimización.
//!
//! Todas las mutaciones (register + propagate) deben ejecutarse como una
//! unidad atómica bajo el lock por proyecto; eso lo garantiza el
//! `ArtifactStore`, dueño del grafo.

mod node;

pub use node::GraphNode;

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use script_domain::{ArtifactRef, Health};

/// Grafo completo: un nodo por versión de artifact jamás producida.
///
/// `BTreeMap` para que la serialización a disco sea determinista.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: BTreeMap<String, GraphNode>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, key: &str) -> Option<&GraphNode> {
        self.nodes.get(key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Registra una versión nueva y sus aristas de lineage.
    ///
    /// Crea el nodo si no existe (health = valid); crea nodos placeholder
    /// para upstream refs aún desconocidas; agrega la ref al `downstream` de
    /// cada upstream. Idempotente respecto a aristas repetidas.
    pub fn register_artifact(&mut self, artifact_ref: &ArtifactRef, upstream_refs: &[ArtifactRef]) {
        let key = artifact_ref.key();
        self.nodes
            .entry(key.clone())
            .or_insert_with(|| GraphNode::new(artifact_ref.clone()));

        for up in upstream_refs {
            let up_key = up.key();
            let up_node = self.nodes
                              .entry(up_key.clone())
                              .or_insert_with(|| GraphNode::new(up.clone()));
            if !up_node.downstream.contains(&key) {
                up_node.downstream.push(key.clone());
            }
            if let Some(node) = self.nodes.get_mut(&key) {
                if !node.upstream.contains(&up_key) {
                    node.upstream.push(up_key);
                }
            }
        }
    }

    /// Máxima versión conocida por `(tipo, entidad)` en todo el grafo.
    fn latest_versions(&self) -> BTreeMap<(String, String), u32> {
        let mut latest: BTreeMap<(String, String), u32> = BTreeMap::new();
        for node in self.nodes.values() {
            let k = (node.artifact_ref.artifact_type.as_str().to_string(),
                     node.artifact_ref.entity_label().to_string());
            let entry = latest.entry(k).or_insert(0);
            if node.artifact_ref.version > *entry {
                *entry = node.artifact_ref.version;
            }
        }
        latest
    }

    /// Propaga staleness tras registrar `new_ref`.
    ///
    /// BFS desde el downstream de la versión anterior (`version - 1`),
    /// sembrando el set de visitados con la versión recién creada para que
    /// nunca se marque a sí misma. Invariante de no-contaminación: si un
    /// nodo visitado ya tiene una versión estrictamente más nueva en el
    /// grafo, su downstream NO se encola: ese downstream fue reconstruido
    /// a partir del hermano más nuevo y marcarlo sería incorrecto.
    ///
    /// Devuelve los refs marcados `stale`, en orden de visita.
    pub fn propagate_stale_for_new_version(&mut self, new_ref: &ArtifactRef) -> Vec<ArtifactRef> {
        if new_ref.version <= 1 {
            return Vec::new();
        }
        let previous = ArtifactRef::new(new_ref.artifact_type.clone(),
                                        new_ref.entity_id.clone(),
                                        new_ref.version - 1,
                                        String::new());
        let previous_key = previous.key();
        let seeds: Vec<String> = match self.nodes.get(&previous_key) {
            Some(node) => node.downstream.clone(),
            None => return Vec::new(),
        };

        let latest = self.latest_versions();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(new_ref.key());

        let mut queue: VecDeque<String> = seeds.into();
        let mut marked: Vec<ArtifactRef> = Vec::new();

        while let Some(key) = queue.pop_front() {
            if !visited.insert(key.clone()) {
                continue;
            }
            let Some(node) = self.nodes.get_mut(&key) else { continue };
            node.health = Health::Stale;
            marked.push(node.artifact_ref.clone());

            let pair = (node.artifact_ref.artifact_type.as_str().to_string(),
                        node.artifact_ref.entity_label().to_string());
            let newer_sibling = latest.get(&pair).copied().unwrap_or(0) > node.artifact_ref.version;
            if !newer_sibling {
                for down in &node.downstream {
                    queue.push_back(down.clone());
                }
            }
        }
        marked
    }

    /// Refs upstream directas de `artifact_ref` (vacío si el nodo no existe).
    pub fn get_dependencies(&self, artifact_ref: &ArtifactRef) -> Vec<ArtifactRef> {
        self.refs_of(artifact_ref, |n| &n.upstream)
    }

    /// Refs downstream directas de `artifact_ref`.
    pub fn get_dependents(&self, artifact_ref: &ArtifactRef) -> Vec<ArtifactRef> {
        self.refs_of(artifact_ref, |n| &n.downstream)
    }

    fn refs_of<'a>(&'a self, artifact_ref: &ArtifactRef, pick: impl Fn(&'a GraphNode) -> &'a Vec<String>) -> Vec<ArtifactRef> {
        let Some(node) = self.nodes.get(&artifact_ref.key()) else {
            return Vec::new();
        };
        pick(node).iter()
                  .filter_map(|k| self.nodes.get(k))
                  .map(|n| n.artifact_ref.clone())
                  .collect()
    }

    /// Todos los nodos actualmente en salud `stale`, en orden de clave.
    pub fn get_stale(&self) -> Vec<ArtifactRef> {
        self.nodes
            .values()
            .filter(|n| n.health == Health::Stale)
            .map(|n| n.artifact_ref.clone())
            .collect()
    }

    pub fn get_health(&self, artifact_ref: &ArtifactRef) -> Option<Health> {
        self.nodes.get(&artifact_ref.key()).map(|n| n.health)
    }

    /// Cambia la salud de un nodo (confirmación explícita o marcado manual).
    /// Devuelve false si el nodo no existe.
    pub fn set_health(&mut self, artifact_ref: &ArtifactRef, health: Health) -> bool {
        match self.nodes.get_mut(&artifact_ref.key()) {
            Some(node) => {
                node.health = health;
                true
            }
            None => false,
        }
    }
}
