//! Estado persistido de un run y su máquina de estados por stage.
//!
//! Transiciones válidas:
//! - `Pending -> Running -> {Done, Failed, Paused}`
//! - `Pending -> SkippedReused` (reuse sin invocar el módulo)
//! - `Paused -> Running -> {Done, Failed}` al reanudar
//!
//! `RunState` se escribe a almacenamiento durable después de cada transición
//! para que un proceso interrumpido deje un registro inspeccionable y
//! reanudable.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use script_domain::ArtifactRef;

use crate::errors::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Done,
    SkippedReused,
    Failed,
    Paused,
}

/// Bookkeeping por stage dentro de un run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageState {
    pub status: StageStatus,
    #[serde(default)]
    pub artifact_refs: Vec<ArtifactRef>,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default)]
    pub duration_seconds: f64,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_reason: Option<String>,
}

impl Default for StageState {
    fn default() -> Self {
        Self { status: StageStatus::Pending,
               artifact_refs: Vec::new(),
               attempt_count: 0,
               model_used: None,
               duration_seconds: 0.0,
               cost_usd: 0.0,
               error: None,
               pause_reason: None }
    }
}

/// Estado completo de un run (persistido como `run_state.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub recipe_id: String,
    /// Stages en orden de ejecución resuelto.
    pub stages: IndexMap<String, StageState>,
    #[serde(default)]
    pub total_cost_usd: f64,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub instrumented: bool,
}

impl RunState {
    pub fn new(run_id: &str, recipe_id: &str, stage_ids: &[String], instrumented: bool) -> Self {
        let stages = stage_ids.iter()
                              .map(|id| (id.clone(), StageState::default()))
                              .collect();
        Self { run_id: run_id.to_string(),
               recipe_id: recipe_id.to_string(),
               stages,
               total_cost_usd: 0.0,
               started_at: Utc::now(),
               finished_at: None,
               instrumented }
    }

    pub fn ensure_stage(&mut self, stage_id: &str) -> &mut StageState {
        self.stages.entry(stage_id.to_string()).or_default()
    }

    pub fn stage(&self, stage_id: &str) -> Option<&StageState> {
        self.stages.get(stage_id)
    }

    /// Estado agregado del run para el evento de cierre y el CLI.
    pub fn overall_status(&self) -> &'static str {
        if self.stages.values().any(|s| s.status == StageStatus::Failed) {
            return "failed";
        }
        if self.stages.values().any(|s| s.status == StageStatus::Paused) {
            return "paused";
        }
        let all_settled = self.stages
                              .values()
                              .all(|s| matches!(s.status, StageStatus::Done | StageStatus::SkippedReused));
        if all_settled {
            "completed"
        } else {
            "partial"
        }
    }

    /// Resumen de una línea por stage (salida del CLI ante fallos).
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = Vec::with_capacity(self.stages.len() + 1);
        lines.push(format!("run {} [{}] total=${:.4}", self.run_id, self.overall_status(), self.total_cost_usd));
        for (id, st) in &self.stages {
            let detail = match (&st.error, &st.pause_reason) {
                (Some(e), _) => format!(" error={e}"),
                (None, Some(p)) => format!(" pause={p}"),
                _ => String::new(),
            };
            lines.push(format!("  {id}: {:?} attempts={} artifacts={}{detail}",
                               st.status,
                               st.attempt_count,
                               st.artifact_refs.len()));
        }
        lines.join("\n")
    }
}

/// Persistencia del estado de run (un documento por `run_id`).
pub trait RunStateStore {
    fn save(&mut self, state: &RunState) -> Result<(), StoreError>;
    fn load(&self, run_id: &str) -> Result<Option<RunState>, StoreError>;
}

#[derive(Default)]
pub struct InMemoryRunStateStore {
    inner: HashMap<String, RunState>,
}

impl InMemoryRunStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunStateStore for InMemoryRunStateStore {
    fn save(&mut self, state: &RunState) -> Result<(), StoreError> {
        self.inner.insert(state.run_id.clone(), state.clone());
        Ok(())
    }

    fn load(&self, run_id: &str) -> Result<Option<RunState>, StoreError> {
        Ok(self.inner.get(run_id).cloned())
    }
}
