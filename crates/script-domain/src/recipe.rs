//! Modelo declarativo de recetas (DAG de stages).
//!
//! Una receta se describe en YAML y se valida en el core antes de ejecutar.
//! Distinción clave entre aristas:
//! - `needs` / `needs_all`: dependencias de *datos* (con chequeo de schema);
//!   producen los `inputs` del stage.
//! - `after`: dependencia de *orden* solamente; sin chequeo de schema y sin
//!   flujo de datos, pero participa igual en el chequeo de aciclicidad.
use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::artifact::ArtifactKind;
use crate::error::DomainError;

/// Política de resiliencia de una receta.
///
/// `stage_fallback_models` lista, por stage, los modelos alternos que el
/// motor recorre en cada retry después del primer intento fallido.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay")]
    pub retry_base_delay_seconds: f64,
    #[serde(default = "default_jitter_ratio")]
    pub retry_jitter_ratio: f64,
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_seconds: f64,
    #[serde(default)]
    pub stage_fallback_models: BTreeMap<String, Vec<String>>,
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay() -> f64 {
    1.0
}
fn default_jitter_ratio() -> f64 {
    0.25
}
fn default_attempt_timeout() -> f64 {
    120.0
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self { max_retries: default_max_retries(),
               retry_base_delay_seconds: default_base_delay(),
               retry_jitter_ratio: default_jitter_ratio(),
               attempt_timeout_seconds: default_attempt_timeout(),
               stage_fallback_models: BTreeMap::new() }
    }
}

/// Un stage de la receta: módulo + parámetros + cableado de dependencias.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeStage {
    pub id: String,
    pub module: String,
    #[serde(default)]
    pub params: Value,
    /// Upstream de datos: un artifact (el del stage referido).
    #[serde(default)]
    pub needs: Vec<String>,
    /// Upstream de datos: lista de artifacts a través de todas las entidades.
    #[serde(default)]
    pub needs_all: Vec<String>,
    /// Upstream de orden solamente.
    #[serde(default)]
    pub after: Vec<String>,
    /// Inputs tomados directo del store por tipo declarado (clave -> schema).
    #[serde(default)]
    pub store_inputs: BTreeMap<String, ArtifactKind>,
    #[serde(default)]
    pub store_inputs_optional: BTreeMap<String, ArtifactKind>,
}

impl RecipeStage {
    /// Ids upstream que participan en el orden de ejecución (datos + orden).
    pub fn ordering_upstream(&self) -> impl Iterator<Item = &str> {
        self.needs
            .iter()
            .chain(self.needs_all.iter())
            .chain(self.after.iter())
            .map(|s| s.as_str())
    }

    /// Ids upstream de datos (con chequeo de schema).
    pub fn data_upstream(&self) -> impl Iterator<Item = &str> {
        self.needs.iter().chain(self.needs_all.iter()).map(|s| s.as_str())
    }
}

/// Receta completa: DAG declarativo de stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub recipe_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resilience: Option<ResilienceConfig>,
    pub stages: Vec<RecipeStage>,
}

impl Recipe {
    pub fn from_yaml_str(text: &str) -> Result<Self, DomainError> {
        let recipe: Recipe = serde_yaml::from_str(text)?;
        Ok(recipe)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, DomainError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn stage(&self, id: &str) -> Option<&RecipeStage> {
        self.stages.iter().find(|s| s.id == id)
    }

    /// Resiliencia efectiva (defaults si la receta no declara ninguna).
    pub fn resilience(&self) -> ResilienceConfig {
        self.resilience.clone().unwrap_or_default()
    }
}
