use std::collections::HashMap;

use chrono::Utc;

use super::{RunEvent, RunEventKind};
use crate::errors::StoreError;

/// Log de eventos append-only.
pub trait EventSink {
    /// Agrega un evento a partir de su kind y devuelve el evento completo
    /// (con seq y ts asignados).
    fn append_kind(&mut self, run_id: &str, kind: RunEventKind) -> Result<RunEvent, StoreError>;
    /// Lista eventos de un run (orden ascendente por seq).
    fn list(&self, run_id: &str) -> Result<Vec<RunEvent>, StoreError>;
}

/// Sink en memoria, paridad 1:1 con el backend de archivo.
#[derive(Default)]
pub struct InMemoryEventSink {
    inner: HashMap<String, Vec<RunEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventSink for InMemoryEventSink {
    fn append_kind(&mut self, run_id: &str, kind: RunEventKind) -> Result<RunEvent, StoreError> {
        let vec = self.inner.entry(run_id.to_string()).or_default();
        let ev = RunEvent { seq: vec.len() as u64,
                            run_id: run_id.to_string(),
                            kind,
                            ts: Utc::now() };
        vec.push(ev.clone());
        Ok(ev)
    }

    fn list(&self, run_id: &str) -> Result<Vec<RunEvent>, StoreError> {
        Ok(self.inner.get(run_id).cloned().unwrap_or_default())
    }
}
