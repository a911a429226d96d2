//! ProjectConfigModule (gate de confirmación)
//!
//! Arma el borrador de configuración del proyecto a partir del índice de
//! escenas. Hasta que alguien confirme (`confirmed: true` en params o en los
//! overrides de runtime), el módulo pide pausa: el run queda en checkpoint y
//! se reanuda con el mismo run_id.

use serde_json::json;

use script_core::{ModuleError, ModuleRunResult};
use script_domain::{ArtifactKind, ArtifactMetadata, ProvenanceSource};

use crate::declare_module;
use crate::modules::primary_input;

declare_module! {
    module ProjectConfigModule {
        id: "project_config",
        inputs: [ArtifactKind::SceneIndex],
        outputs: [ArtifactKind::ProjectConfig],
        run(_me, inputs, params, _ctx) {
            let Some(index) = primary_input(inputs) else {
                return ModuleRunResult::Failure { error: ModuleError::Terminal("project_config expects a scene_index input".to_string()) };
            };
            let scene_count = index.data.get("count").and_then(|v| v.as_u64()).unwrap_or(0);

            let confirmed = params.get("confirmed").and_then(|v| v.as_bool()).unwrap_or(false);
            if !confirmed {
                return ModuleRunResult::Pause { reason: "awaiting confirmation of draft project configuration".to_string() };
            }

            let title = params.get("title").and_then(|v| v.as_str()).unwrap_or("Untitled Screenplay");
            let data = json!({
                "title": title,
                "scene_count": scene_count,
                "default_model": params.get("model").and_then(|v| v.as_str()).unwrap_or("standard"),
                "confirmed": true,
            });
            let mut metadata = ArtifactMetadata::produced_by("project_config",
                                                             "assemble confirmed project configuration",
                                                             ProvenanceSource::Hybrid);
            metadata.confidence = 0.9;
            ModuleRunResult::Success { artifacts: vec![script_core::ArtifactDraft { artifact_type: ArtifactKind::ProjectConfig,
                                                                                    entity_id: None,
                                                                                    data,
                                                                                    metadata }],
                                       cost: None }
        }
    }
}
