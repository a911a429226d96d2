//! Driver engine: orquestación de runs.
//!
//! Resuelve el orden, decide reuse vs. recompute por stage, invoca módulos
//! con timeout por intento, aplica retry/backoff/fallback y persiste el
//! estado del run más un log de eventos tras cada transición.

mod core;
mod invoke;
mod retry;
mod reuse;
mod state;

pub use self::core::{PipelineEngine, RunRequest};
pub use retry::RetryPolicy;
pub use state::{InMemoryRunStateStore, RunState, RunStateStore, StageState, StageStatus};

pub use crate::event::{EventSink, InMemoryEventSink, RunEvent, RunEventKind};
