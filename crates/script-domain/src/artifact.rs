//! Tipos de valor para artifacts versionados.
//!
//! Un `Artifact` es la unidad inmutable de salida de un stage. Es neutral:
//! - `data` es JSON genérico; el motor no interpreta su semántica.
//! - `ArtifactKind` es la etiqueta de tipo explícita que viaja junto al
//!   payload; el código downstream hace `match` sobre ella en lugar de
//!   inspeccionar la forma del JSON.
//! - `metadata.lineage` lista las versiones upstream exactas consumidas al
//!   producirlo; es la única fuente de aristas del grafo de dependencias.
use std::collections::BTreeMap;
use std::fmt;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DomainError;
use crate::PROJECT_ENTITY;

/// Etiqueta de tipo de artifact. Los tipos conocidos del pipeline tienen
/// variante propia; los tipos declarados por recetas externas caen en
/// `Custom`. En disco y en recetas siempre viaja como string plano.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    ScreenplaySource,
    NormalizedScreenplay,
    SceneIndex,
    Scene,
    ProjectConfig,
    BibleEntry,
    Custom(String),
}

impl ArtifactKind {
    pub fn as_str(&self) -> &str {
        match self {
            ArtifactKind::ScreenplaySource => "screenplay_source",
            ArtifactKind::NormalizedScreenplay => "normalized_screenplay",
            ArtifactKind::SceneIndex => "scene_index",
            ArtifactKind::Scene => "scene",
            ArtifactKind::ProjectConfig => "project_config",
            ArtifactKind::BibleEntry => "bible_entry",
            ArtifactKind::Custom(s) => s,
        }
    }

    /// Reconstruye la etiqueta desde su forma en el wire (receta o disco).
    pub fn from_wire(s: &str) -> Self {
        match s {
            "screenplay_source" => ArtifactKind::ScreenplaySource,
            "normalized_screenplay" => ArtifactKind::NormalizedScreenplay,
            "scene_index" => ArtifactKind::SceneIndex,
            "scene" => ArtifactKind::Scene,
            "project_config" => ArtifactKind::ProjectConfig,
            "bible_entry" => ArtifactKind::BibleEntry,
            other => ArtifactKind::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ArtifactKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ArtifactKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ArtifactKind::from_wire(&s))
    }
}

/// Salud de un nodo/artifact dentro del grafo de dependencias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Valid,
    Stale,
    NeedsReview,
    ConfirmedValid,
}

/// Origen del contenido del artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceSource {
    Human,
    Ai,
    Code,
    Hybrid,
}

/// Contabilidad de una llamada a modelo externo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostData {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost_usd: f64,
}

/// Referencia inmutable a una versión concreta de un artifact.
///
/// Identidad = `(artifact_type, entity_id, version)`. Sólo el artifact store
/// construye refs (al asignar versión); nunca se mutan después.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub artifact_type: ArtifactKind,
    pub entity_id: Option<String>,
    pub version: u32,
    pub path: String,
}

impl ArtifactRef {
    pub fn new(artifact_type: ArtifactKind, entity_id: Option<String>, version: u32, path: String) -> Self {
        Self { artifact_type,
               entity_id,
               version,
               path }
    }

    /// Etiqueta de entidad estable para rutas y claves (`__project__` si no
    /// hay entity_id).
    pub fn entity_label(&self) -> &str {
        self.entity_id.as_deref().unwrap_or(PROJECT_ENTITY)
    }

    /// Clave canónica `tipo/entidad/vN` usada por el grafo de dependencias.
    pub fn key(&self) -> String {
        format!("{}/{}/v{}", self.artifact_type.as_str(), self.entity_label(), self.version)
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Metadatos persistidos junto al payload de cada versión.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Ref propia; la adjunta el store en el save (None antes de persistir).
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub artifact_ref: Option<ArtifactRef>,
    /// Versiones upstream exactas consumidas para producir este artifact.
    #[serde(default)]
    pub lineage: Vec<ArtifactRef>,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub rationale: String,
    pub confidence: f64,
    pub source: ProvenanceSource,
    pub health: Health,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_data: Option<CostData>,
    #[serde(default)]
    pub annotations: BTreeMap<String, Value>,
    pub producing_module: String,
}

impl ArtifactMetadata {
    /// Metadatos mínimos para un artifact producido por código del pipeline.
    pub fn produced_by(module: &str, intent: &str, source: ProvenanceSource) -> Self {
        Self { artifact_ref: None,
               lineage: Vec::new(),
               intent: intent.to_string(),
               rationale: String::new(),
               confidence: 1.0,
               source,
               health: Health::Valid,
               cost_data: None,
               annotations: BTreeMap::new(),
               producing_module: module.to_string() }
    }

    pub fn with_lineage(mut self, lineage: Vec<ArtifactRef>) -> Self {
        self.lineage = lineage;
        self
    }

    /// Valida rangos antes de persistir. `confidence` debe estar en [0,1].
    pub fn validate(&self) -> Result<(), DomainError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(DomainError::ValidationError(format!("confidence fuera de rango [0,1]: {}", self.confidence)));
        }
        Ok(())
    }
}

/// Unidad persistida: metadatos + payload opaco.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub metadata: ArtifactMetadata,
    pub data: Value,
}

impl Artifact {
    pub fn new(metadata: ArtifactMetadata, data: Value) -> Self {
        Self { metadata, data }
    }

    /// Ref propia (presente en todo artifact ya persistido).
    pub fn artifact_ref(&self) -> Option<&ArtifactRef> {
        self.metadata.artifact_ref.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn artifact_kind_round_trips_through_wire_string() {
        for kind in [ArtifactKind::ScreenplaySource,
                     ArtifactKind::Scene,
                     ArtifactKind::Custom("mood_board".to_string())]
        {
            let wire = serde_json::to_string(&kind).expect("serialize kind");
            let back: ArtifactKind = serde_json::from_str(&wire).expect("deserialize kind");
            assert_eq!(kind, back);
        }
        assert_eq!(ArtifactKind::from_wire("scene_index"), ArtifactKind::SceneIndex);
    }

    #[test]
    fn ref_key_uses_project_sentinel_without_entity() {
        let r = ArtifactRef::new(ArtifactKind::ProjectConfig, None, 3, "p".into());
        assert_eq!(r.key(), "project_config/__project__/v3");
        let r2 = ArtifactRef::new(ArtifactKind::Scene, Some("scene_007".into()), 1, "p".into());
        assert_eq!(r2.key(), "scene/scene_007/v1");
    }

    #[test]
    fn metadata_validate_rejects_out_of_range_confidence() {
        let mut meta = ArtifactMetadata::produced_by("ingest", "load source", ProvenanceSource::Code);
        assert!(meta.validate().is_ok());
        meta.confidence = 1.5;
        assert!(meta.validate().is_err());
    }

    #[test]
    fn metadata_serde_keeps_ref_field_name() {
        let mut meta = ArtifactMetadata::produced_by("normalize", "clean text", ProvenanceSource::Code);
        meta.artifact_ref = Some(ArtifactRef::new(ArtifactKind::NormalizedScreenplay, None, 1, "x".into()));
        let v = serde_json::to_value(&meta).expect("metadata to value");
        assert!(v.get("ref").is_some(), "la ref persiste bajo la clave 'ref'");
        let art = Artifact::new(meta, json!({"text": "INT. HOUSE"}));
        let back: Artifact = serde_json::from_value(serde_json::to_value(&art).unwrap()).expect("round trip");
        assert_eq!(back.artifact_ref().unwrap().version, 1);
    }
}
