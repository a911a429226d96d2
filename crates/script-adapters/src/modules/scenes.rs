//! ExtractScenesModule
//!
//! Particiona el guion normalizado en escenas por encabezado (INT./EXT.) y
//! emite un `scene_index` de proyecto más un artifact `scene` por entidad.
//! Cada escena se anuncia por el callback de streaming del contexto a medida
//! que se arma.

use serde_json::json;

use script_core::{ArtifactDraft, ModuleError, ModuleRunResult};
use script_domain::{ArtifactKind, ArtifactMetadata, ProvenanceSource};

use crate::declare_module;
use crate::modules::primary_input;

fn is_scene_heading(line: &str) -> bool {
    let upper = line.trim_start().to_ascii_uppercase();
    ["INT.", "EXT.", "INT./EXT.", "EXT./INT.", "I/E."].iter()
                                                      .any(|prefix| upper.starts_with(prefix))
}

struct SceneSlice {
    heading: String,
    body: Vec<String>,
    line_start: usize,
}

fn split_scenes(text: &str) -> Vec<SceneSlice> {
    let mut scenes: Vec<SceneSlice> = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if is_scene_heading(line) {
            scenes.push(SceneSlice { heading: line.trim().to_string(),
                                     body: Vec::new(),
                                     line_start: idx + 1 });
        } else if let Some(current) = scenes.last_mut() {
            current.body.push(line.to_string());
        }
        // texto antes del primer encabezado (FADE IN:, título) no es escena
    }
    scenes
}

declare_module! {
    module ExtractScenesModule {
        id: "extract_scenes",
        inputs: [ArtifactKind::NormalizedScreenplay],
        outputs: [ArtifactKind::SceneIndex, ArtifactKind::Scene],
        run(_me, inputs, _params, ctx) {
            let Some(normalized) = primary_input(inputs) else {
                return ModuleRunResult::Failure { error: ModuleError::Terminal("extract_scenes expects a normalized_screenplay input".to_string()) };
            };
            let Some(text) = normalized.data.get("text").and_then(|v| v.as_str()) else {
                return ModuleRunResult::Failure { error: ModuleError::Terminal("normalized_screenplay payload is missing 'text'".to_string()) };
            };

            let slices = split_scenes(text);
            log::debug!("extract_scenes: {} heading(s) found", slices.len());
            let mut artifacts: Vec<ArtifactDraft> = Vec::with_capacity(slices.len() + 1);
            let mut index_rows = Vec::with_capacity(slices.len());
            for (pos, slice) in slices.iter().enumerate() {
                let entity_id = format!("scene_{:03}", pos + 1);
                index_rows.push(json!({
                    "entity_id": entity_id,
                    "heading": slice.heading,
                    "line_start": slice.line_start,
                }));
                let draft = ArtifactDraft { artifact_type: ArtifactKind::Scene,
                                            entity_id: Some(entity_id),
                                            data: json!({
                                                "heading": slice.heading,
                                                "body": slice.body.join("\n"),
                                                "position": pos + 1,
                                            }),
                                            metadata: ArtifactMetadata::produced_by("extract_scenes",
                                                                                    "slice screenplay into scenes",
                                                                                    ProvenanceSource::Code) };
                ctx.announce(&draft);
                artifacts.push(draft);
            }

            let index = ArtifactDraft { artifact_type: ArtifactKind::SceneIndex,
                                        entity_id: None,
                                        data: json!({ "count": index_rows.len(), "scenes": index_rows }),
                                        metadata: ArtifactMetadata::produced_by("extract_scenes",
                                                                                "index extracted scenes",
                                                                                ProvenanceSource::Code) };
            artifacts.insert(0, index);
            ModuleRunResult::Success { artifacts, cost: None }
        }
    }
}
