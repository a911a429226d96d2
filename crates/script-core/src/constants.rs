//! Constantes del motor core.
//!
//! Valores estáticos que participan en el hashing de definiciones y en la
//! compatibilidad entre versiones del motor. `ENGINE_VERSION` entra en el
//! hash de definición de receta: un cambio de versión del engine recalcula
//! determinísticamente las huellas aunque la receta no cambie.

/// Versión lógica del motor de pipelines. Mantener estable mientras no haya
/// cambios incompatibles en el formato persistido o en el hashing.
pub const ENGINE_VERSION: &str = "P1.0";

/// Nombre del archivo de estado de run dentro de `output/runs/<run_id>/`.
pub const RUN_STATE_FILE: &str = "run_state.json";

/// Nombre del log de eventos append-only dentro de `output/runs/<run_id>/`.
pub const EVENTS_FILE: &str = "pipeline_events.jsonl";

/// Ruta relativa del grafo de dependencias dentro del proyecto.
pub const GRAPH_FILE: &str = "graph/dependency_graph.json";
