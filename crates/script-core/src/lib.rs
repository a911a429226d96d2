//! script-core: motor de pipelines de extracción sobre guiones.
//!
//! Contiene la parte dura del sistema: validador de recetas, store de
//! artifacts versionado, grafo de dependencias con propagación de staleness
//! y el driver engine con su política de resiliencia. Los módulos de
//! extracción concretos viven fuera (ver `script-adapters`).
pub mod constants;
pub mod engine;
pub mod errors;
pub mod event;
pub mod graph;
pub mod hashing;
pub mod module;
pub mod params;
pub mod recipe;
pub mod store;

pub use engine::{InMemoryRunStateStore, PipelineEngine, RetryPolicy, RunRequest, RunState, RunStateStore, StageState,
                 StageStatus};
pub use errors::{classify_error, classify_provider_message, EngineError, ErrorClass, ModuleError, StoreError,
                 ValidationError};
pub use event::{EventSink, InMemoryEventSink, RunEvent, RunEventKind};
pub use graph::{DependencyGraph, GraphNode};
pub use module::{ArtifactDraft, InputValue, Module, ModuleContext, ModuleInputs, ModuleRegistry, ModuleRunResult,
                 ModuleSpec, SchemaRegistry};
pub use params::merge_json;
pub use recipe::{resolve_execution_order, validate};
pub use store::{diff_values, ArtifactStorage, ArtifactStore, DiffEntry, DiffKind, GraphStore, InMemoryArtifactStorage,
                InMemoryGraphStore};
