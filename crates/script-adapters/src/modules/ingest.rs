//! IngestModule (fuente determinista)
//!
//! - Carga el guion crudo desde `source_path` (relativo al proyecto) o desde
//!   `source_text` inline, y emite un único artifact `screenplay_source`.
//! - Anota el checksum SHA-256 del texto para detectar cambios de fuente.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use script_core::{ModuleContext, ModuleError, ModuleRunResult};
use script_domain::{ArtifactKind, ArtifactMetadata, ProvenanceSource};

use crate::declare_module;

fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn read_source(params: &Value, ctx: &ModuleContext) -> Result<String, String> {
    if let Some(text) = params.get("source_text").and_then(|v| v.as_str()) {
        return Ok(text.to_string());
    }
    if let Some(path) = params.get("source_path").and_then(|v| v.as_str()) {
        let full = ctx.project_dir.join(path);
        return std::fs::read_to_string(&full).map_err(|e| format!("cannot read screenplay at {}: {e}", full.display()));
    }
    Err("ingest requires a 'source_text' or 'source_path' param".to_string())
}

declare_module! {
    module IngestModule {
        id: "ingest",
        inputs: [],
        outputs: [ArtifactKind::ScreenplaySource],
        run(_me, _inputs, params, ctx) {
            let text = match read_source(params, ctx) {
                Ok(text) => text,
                Err(message) => return ModuleRunResult::Failure { error: ModuleError::Terminal(message) },
            };
            let data = json!({
                "text": text,
                "checksum_sha256": sha256_hex(&text),
                "line_count": text.lines().count(),
            });
            let metadata = ArtifactMetadata::produced_by("ingest", "load raw screenplay source", ProvenanceSource::Code);
            ModuleRunResult::Success { artifacts: vec![script_core::ArtifactDraft { artifact_type: ArtifactKind::ScreenplaySource,
                                                                                    entity_id: None,
                                                                                    data,
                                                                                    metadata }],
                                       cost: None }
        }
    }
}
