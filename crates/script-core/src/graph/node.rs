use serde::{Deserialize, Serialize};

use script_domain::{ArtifactRef, Health};

/// Un nodo por versión de artifact.
///
/// Invariantes:
/// - `upstream`/`downstream` sólo contienen claves de nodos existentes.
/// - `downstream` es la inversa del `upstream` de algún otro nodo.
/// - Después de creado, sólo `health` muta (propagación o confirmación).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    #[serde(rename = "ref")]
    pub artifact_ref: ArtifactRef,
    #[serde(default)]
    pub upstream: Vec<String>,
    #[serde(default)]
    pub downstream: Vec<String>,
    pub health: Health,
}

impl GraphNode {
    pub fn new(artifact_ref: ArtifactRef) -> Self {
        Self { artifact_ref,
               upstream: Vec::new(),
               downstream: Vec::new(),
               health: Health::Valid }
    }
}
