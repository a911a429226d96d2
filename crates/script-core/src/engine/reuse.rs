//! Decisión reuse vs. recompute para un stage.
//!
//! Un stage se marca `skipped_reused` sólo si:
//! - ningún upstream que consumiría está en salud `stale`;
//! - cada tipo de output declarado por su módulo ya tiene versiones
//!   producidas por este stage (última versión por entidad);
//! - ninguno de esos outputs está `stale`;
//! - el lineage registrado de cada output coincide exactamente con las refs
//!   upstream que el stage consumiría ahora.
//!
//! Cualquier upstream `stale` descalifica el reuse; en el resto de casos se
//! reutiliza la última versión coincidente.

use std::collections::BTreeSet;

use script_domain::{Artifact, ArtifactKind, ArtifactRef, Health};

use crate::errors::StoreError;
use crate::store::{ArtifactStorage, ArtifactStore, GraphStore};

/// Últimas versiones producidas por `stage_id` para los tipos declarados.
pub(crate) fn stage_outputs<S: ArtifactStorage, G: GraphStore>(store: &ArtifactStore<S, G>,
                                                              stage_id: &str,
                                                              output_schemas: &[ArtifactKind])
                                                              -> Result<Vec<(ArtifactRef, Artifact)>, StoreError> {
    let mut found: Vec<(ArtifactRef, Artifact)> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    for kind in output_schemas {
        for entity in store.list_entities(kind)? {
            let Some(latest) = store.latest(kind, entity.as_deref())? else {
                continue;
            };
            if !seen.insert(latest.key()) {
                continue;
            }
            let artifact = store.load_artifact(&latest)?;
            let produced_here = artifact.metadata
                                        .annotations
                                        .get("stage_id")
                                        .and_then(|v| v.as_str())
                                        == Some(stage_id);
            if produced_here {
                found.push((latest, artifact));
            }
        }
    }
    Ok(found)
}

/// Evalúa el reuse. Devuelve las refs a copiar hacia adelante, o `None` si
/// el stage debe recomputarse.
pub(crate) fn check_reuse<S: ArtifactStorage, G: GraphStore>(store: &ArtifactStore<S, G>,
                                                            stage_id: &str,
                                                            output_schemas: &[ArtifactKind],
                                                            consumed: &[ArtifactRef])
                                                            -> Result<Option<Vec<ArtifactRef>>, StoreError> {
    for upstream in consumed {
        if store.health(upstream)? == Some(Health::Stale) {
            return Ok(None);
        }
    }
    let consumed_keys: BTreeSet<String> = consumed.iter().map(|r| r.key()).collect();

    let outputs = stage_outputs(store, stage_id, output_schemas)?;
    if outputs.is_empty() {
        return Ok(None);
    }
    // cada tipo declarado debe tener al menos un output previo
    for kind in output_schemas {
        if !outputs.iter().any(|(r, _)| &r.artifact_type == kind) {
            return Ok(None);
        }
    }

    for (artifact_ref, artifact) in &outputs {
        if store.health(artifact_ref)? == Some(Health::Stale) {
            return Ok(None);
        }
        let lineage_keys: BTreeSet<String> = artifact.metadata.lineage.iter().map(|r| r.key()).collect();
        if lineage_keys != consumed_keys {
            return Ok(None);
        }
    }
    Ok(Some(outputs.into_iter().map(|(r, _)| r).collect()))
}
