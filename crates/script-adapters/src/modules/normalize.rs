//! NormalizeModule
//!
//! Limpieza determinista del texto del guion: fines de línea uniformes,
//! espacios colgantes fuera y bloques de líneas en blanco colapsados a uno.

use serde_json::json;

use script_core::{ModuleError, ModuleRunResult};
use script_domain::{ArtifactKind, ArtifactMetadata, ProvenanceSource};

use crate::declare_module;
use crate::modules::primary_input;

fn normalize_text(raw: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut blank_pending = false;
    let normalized = raw.replace("\r\n", "\n");
    for line in normalized.lines().map(|l| l.trim_end()) {
        if line.is_empty() {
            blank_pending = !out.is_empty();
            continue;
        }
        if blank_pending {
            out.push("");
            blank_pending = false;
        }
        out.push(line);
    }
    let mut text = out.join("\n");
    text.push('\n');
    text
}

declare_module! {
    module NormalizeModule {
        id: "normalize",
        inputs: [ArtifactKind::ScreenplaySource],
        outputs: [ArtifactKind::NormalizedScreenplay],
        run(_me, inputs, _params, _ctx) {
            let Some(source) = primary_input(inputs) else {
                return ModuleRunResult::Failure { error: ModuleError::Terminal("normalize expects a screenplay_source input".to_string()) };
            };
            let Some(raw) = source.data.get("text").and_then(|v| v.as_str()) else {
                return ModuleRunResult::Failure { error: ModuleError::Terminal("screenplay_source payload is missing 'text'".to_string()) };
            };
            let text = normalize_text(raw);
            let data = json!({
                "text": text,
                "original_line_count": raw.lines().count(),
                "line_count": text.lines().count(),
            });
            let metadata = ArtifactMetadata::produced_by("normalize", "normalize screenplay text", ProvenanceSource::Code);
            ModuleRunResult::Success { artifacts: vec![script_core::ArtifactDraft { artifact_type: ArtifactKind::NormalizedScreenplay,
                                                                                    entity_id: None,
                                                                                    data,
                                                                                    metadata }],
                                       cost: None }
        }
    }
}

// La normalización nunca debe reordenar contenido: el índice de escenas
// downstream depende de posiciones de línea estables.
