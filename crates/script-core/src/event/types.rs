//! Tipos de evento de un run y estructura `RunEvent`.
//!
//! Rol en el pipeline:
//! - El driver engine emite un evento tras cada transición de stage a un
//!   `EventSink` append-only (`pipeline_events.jsonl` en disco).
//! - El log permite inspeccionar un run interrumpido y auditar la secuencia
//!   retry/fallback sin reconstruir nada más.
//! - El enum `RunEventKind` es el contrato observable y estable del motor.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use script_domain::ArtifactRef;

/// Tipos de evento soportados. Serializan con la etiqueta `event` en
/// snake_case, que es la forma que aparece en cada línea del JSONL.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEventKind {
    /// Primer evento de un run: fija receta y cantidad de stages.
    RunStarted { recipe_id: String, stage_count: usize },
    /// Un intento de ejecución de stage comenzó. No implica éxito.
    StageStarted {
        stage_id: String,
        attempt: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    /// Fallo transitorio: se agendó un reintento con backoff.
    StageRetrying {
        stage_id: String,
        attempt: u32,
        delay_seconds: f64,
        error: String,
    },
    /// El siguiente intento usará un modelo alterno de la cadena de fallback.
    StageFallback { stage_id: String, attempt: u32, model: String },
    /// El stage terminó correctamente con sus artifacts persistidos.
    StageDone {
        stage_id: String,
        artifact_refs: Vec<ArtifactRef>,
        cost_usd: f64,
        duration_seconds: f64,
    },
    /// El stage reutilizó outputs previos sin invocar el módulo.
    StageSkippedReused { stage_id: String, artifact_refs: Vec<ArtifactRef> },
    /// Fallo terminal del stage (retries y fallbacks agotados o error duro).
    StageFailed { stage_id: String, error: String },
    /// El módulo pidió un checkpoint; el run queda esperando input externo.
    StagePaused { stage_id: String, reason: String },
    /// Cierre del run con el estado agregado.
    RunFinished { status: String, total_cost_usd: f64 },
}

impl RunEventKind {
    /// Etiqueta corta para logging/depuración.
    pub fn label(&self) -> &'static str {
        match self {
            RunEventKind::RunStarted { .. } => "run_started",
            RunEventKind::StageStarted { .. } => "stage_started",
            RunEventKind::StageRetrying { .. } => "stage_retrying",
            RunEventKind::StageFallback { .. } => "stage_fallback",
            RunEventKind::StageDone { .. } => "stage_done",
            RunEventKind::StageSkippedReused { .. } => "stage_skipped_reused",
            RunEventKind::StageFailed { .. } => "stage_failed",
            RunEventKind::StagePaused { .. } => "stage_paused",
            RunEventKind::RunFinished { .. } => "run_finished",
        }
    }
}

/// Evento con su posición en el log (`seq` asignado por el sink).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub seq: u64,
    pub run_id: String,
    #[serde(flatten)]
    pub kind: RunEventKind,
    pub ts: DateTime<Utc>, // metadato, no participa en ningún hash
}
