//! Tests de integración del driver engine con backends en memoria y
//! módulos mock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use script_core::{ArtifactDraft, Module, ModuleContext, ModuleError, ModuleInputs, ModuleRunResult, ModuleSpec,
                  PipelineEngine, RunEventKind, RunRequest, StageStatus};
use script_domain::{ArtifactKind, ArtifactMetadata, CostData, ProvenanceSource, Recipe};

struct CountingSource {
    calls: Arc<AtomicU32>,
}

impl Module for CountingSource {
    fn id(&self) -> &str {
        "mock_source"
    }
    fn spec(&self) -> ModuleSpec {
        ModuleSpec { input_schemas: vec![],
                     output_schemas: vec![ArtifactKind::ScreenplaySource] }
    }
    fn run(&self, _inputs: &ModuleInputs, params: &Value, _ctx: &ModuleContext) -> ModuleRunResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = params.get("text").and_then(|v| v.as_str()).unwrap_or("hola");
        ModuleRunResult::Success { artifacts: vec![ArtifactDraft { artifact_type: ArtifactKind::ScreenplaySource,
                                                                   entity_id: None,
                                                                   data: json!({"text": text}),
                                                                   metadata:
                                                                       ArtifactMetadata::produced_by("mock_source",
                                                                                                     "emit source",
                                                                                                     ProvenanceSource::Code) }],
                                   cost: None }
    }
}

struct DeriveModule {
    calls: Arc<AtomicU32>,
}

impl Module for DeriveModule {
    fn id(&self) -> &str {
        "mock_derive"
    }
    fn spec(&self) -> ModuleSpec {
        ModuleSpec { input_schemas: vec![ArtifactKind::ScreenplaySource],
                     output_schemas: vec![ArtifactKind::NormalizedScreenplay] }
    }
    fn run(&self, inputs: &ModuleInputs, _params: &Value, _ctx: &ModuleContext) -> ModuleRunResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let upstream = inputs.values()
                             .next()
                             .and_then(|v| v.single())
                             .and_then(|a| a.data.get("text"))
                             .and_then(|v| v.as_str())
                             .unwrap_or_default();
        ModuleRunResult::Success { artifacts: vec![ArtifactDraft { artifact_type: ArtifactKind::NormalizedScreenplay,
                                                                   entity_id: None,
                                                                   data: json!({"text": upstream.to_uppercase()}),
                                                                   metadata:
                                                                       ArtifactMetadata::produced_by("mock_derive",
                                                                                                     "derive",
                                                                                                     ProvenanceSource::Code) }],
                                   cost: None }
    }
}

/// Falla con señal transitoria mientras el modelo activo sea `model-a`.
struct FlakyModule;

impl Module for FlakyModule {
    fn id(&self) -> &str {
        "mock_flaky"
    }
    fn spec(&self) -> ModuleSpec {
        ModuleSpec { input_schemas: vec![],
                     output_schemas: vec![ArtifactKind::SceneIndex] }
    }
    fn run(&self, _inputs: &ModuleInputs, params: &Value, _ctx: &ModuleContext) -> ModuleRunResult {
        let model = params.get("model").and_then(|v| v.as_str()).unwrap_or("model-a");
        if model == "model-a" {
            return ModuleRunResult::Failure { error: ModuleError::Transient("429 rate limited".to_string()) };
        }
        ModuleRunResult::Success { artifacts: vec![ArtifactDraft { artifact_type: ArtifactKind::SceneIndex,
                                                                   entity_id: None,
                                                                   data: json!({"count": 0, "scenes": []}),
                                                                   metadata:
                                                                       ArtifactMetadata::produced_by("mock_flaky",
                                                                                                     "index",
                                                                                                     ProvenanceSource::Ai) }],
                                   cost: Some(CostData { model: model.to_string(),
                                                         input_tokens: 10,
                                                         output_tokens: 5,
                                                         estimated_cost_usd: 0.01 }) }
    }
}

struct GateModule;

impl Module for GateModule {
    fn id(&self) -> &str {
        "mock_gate"
    }
    fn spec(&self) -> ModuleSpec {
        ModuleSpec { input_schemas: vec![],
                     output_schemas: vec![ArtifactKind::ProjectConfig] }
    }
    fn run(&self, _inputs: &ModuleInputs, params: &Value, _ctx: &ModuleContext) -> ModuleRunResult {
        if !params.get("confirmed").and_then(|v| v.as_bool()).unwrap_or(false) {
            return ModuleRunResult::Pause { reason: "awaiting confirmation".to_string() };
        }
        ModuleRunResult::Success { artifacts: vec![ArtifactDraft { artifact_type: ArtifactKind::ProjectConfig,
                                                                   entity_id: None,
                                                                   data: json!({"confirmed": true}),
                                                                   metadata:
                                                                       ArtifactMetadata::produced_by("mock_gate",
                                                                                                     "config",
                                                                                                     ProvenanceSource::Hybrid) }],
                                   cost: None }
    }
}

struct BoomModule;

impl Module for BoomModule {
    fn id(&self) -> &str {
        "mock_boom"
    }
    fn spec(&self) -> ModuleSpec {
        ModuleSpec { input_schemas: vec![],
                     output_schemas: vec![ArtifactKind::SceneIndex] }
    }
    fn run(&self, _inputs: &ModuleInputs, _params: &Value, _ctx: &ModuleContext) -> ModuleRunResult {
        ModuleRunResult::Failure { error: ModuleError::Terminal("invalid screenplay structure".to_string()) }
    }
}

fn engine_with(counter_src: Arc<AtomicU32>,
               counter_derive: Arc<AtomicU32>)
               -> PipelineEngine<script_core::InMemoryArtifactStorage,
                                 script_core::InMemoryGraphStore,
                                 script_core::InMemoryEventSink,
                                 script_core::InMemoryRunStateStore> {
    let mut engine = PipelineEngine::in_memory("/tmp/test-project").expect("engine in memory");
    engine.modules_mut().register(Arc::new(CountingSource { calls: counter_src }));
    engine.modules_mut().register(Arc::new(DeriveModule { calls: counter_derive }));
    engine.modules_mut().register(Arc::new(FlakyModule));
    engine.modules_mut().register(Arc::new(GateModule));
    engine.modules_mut().register(Arc::new(BoomModule));
    engine
}

fn recipe(yaml: &str) -> Recipe {
    Recipe::from_yaml_str(yaml).expect("recipe parses")
}

const LINEAR: &str = r#"
recipe_id: linear
stages:
  - id: source
    module: mock_source
  - id: derive
    module: mock_derive
    needs: [source]
"#;

#[test]
fn second_run_reuses_every_stage_without_invoking_modules() {
    let src = Arc::new(AtomicU32::new(0));
    let der = Arc::new(AtomicU32::new(0));
    let mut engine = engine_with(src.clone(), der.clone());

    let state = engine.run(RunRequest::new(recipe(LINEAR))).expect("first run");
    assert_eq!(state.stage("source").map(|s| s.status), Some(StageStatus::Done));
    assert_eq!(state.stage("derive").map(|s| s.status), Some(StageStatus::Done));
    assert_eq!((src.load(Ordering::SeqCst), der.load(Ordering::SeqCst)), (1, 1));

    let state = engine.run(RunRequest::new(recipe(LINEAR))).expect("second run");
    assert_eq!(state.stage("source").map(|s| s.status), Some(StageStatus::SkippedReused));
    assert_eq!(state.stage("derive").map(|s| s.status), Some(StageStatus::SkippedReused));
    // ningún módulo se volvió a invocar
    assert_eq!((src.load(Ordering::SeqCst), der.load(Ordering::SeqCst)), (1, 1));
    assert_eq!(state.overall_status(), "completed");

    // los refs copiados apuntan a las versiones v1 originales
    let derive_refs = &state.stage("derive").expect("slot").artifact_refs;
    assert_eq!(derive_refs.len(), 1);
    assert_eq!(derive_refs[0].version, 1);
}

#[test]
fn force_recomputes_and_allocates_new_versions() {
    let src = Arc::new(AtomicU32::new(0));
    let der = Arc::new(AtomicU32::new(0));
    let mut engine = engine_with(src.clone(), der.clone());

    engine.run(RunRequest::new(recipe(LINEAR))).expect("first run");
    let mut request = RunRequest::new(recipe(LINEAR));
    request.force = true;
    let state = engine.run(request).expect("forced run");
    assert_eq!(state.stage("derive").map(|s| s.status), Some(StageStatus::Done));
    assert_eq!(der.load(Ordering::SeqCst), 2);
    let versions = engine.store()
                         .list_versions(&ArtifactKind::NormalizedScreenplay, None)
                         .expect("versions");
    assert_eq!(versions.iter().map(|r| r.version).collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn transient_failure_retries_into_fallback_model() {
    let mut engine = engine_with(Arc::new(AtomicU32::new(0)), Arc::new(AtomicU32::new(0)));
    let r = recipe(r#"
recipe_id: flaky
resilience:
  max_retries: 2
  retry_base_delay_seconds: 0.0
  stage_fallback_models:
    index: [model-b, model-c]
stages:
  - id: index
    module: mock_flaky
    params:
      model: model-a
"#);
    let mut request = RunRequest::new(r);
    request.run_id = Some("flaky-run".to_string());
    let state = engine.run(request).expect("run");

    let slot = state.stage("index").expect("slot");
    assert_eq!(slot.status, StageStatus::Done);
    assert_eq!(slot.attempt_count, 2, "falló en model-a, funcionó al primer fallback");
    assert_eq!(slot.model_used.as_deref(), Some("model-b"));

    let events = engine.events_for("flaky-run").expect("events");
    assert!(events.iter()
                  .any(|e| matches!(&e.kind, RunEventKind::StageRetrying { attempt: 1, .. })),
            "debe registrarse el retry del intento 1");
    assert!(events.iter()
                  .any(|e| matches!(&e.kind, RunEventKind::StageFallback { model, .. } if model == "model-b")),
            "debe registrarse el cambio a model-b");
}

#[test]
fn exhausted_retries_leave_stage_failed() {
    let mut engine = engine_with(Arc::new(AtomicU32::new(0)), Arc::new(AtomicU32::new(0)));
    let r = recipe(r#"
recipe_id: flaky
resilience:
  max_retries: 1
  retry_base_delay_seconds: 0.0
stages:
  - id: index
    module: mock_flaky
    params:
      model: model-a
"#);
    // sin fallbacks el modelo nunca cambia: ambos intentos fallan
    let state = engine.run(RunRequest::new(r)).expect("run returns state");
    let slot = state.stage("index").expect("slot");
    assert_eq!(slot.status, StageStatus::Failed);
    assert_eq!(slot.attempt_count, 2);
    assert!(slot.error.as_deref().unwrap_or_default().contains("429"));
    assert_eq!(state.overall_status(), "failed");
}

#[test]
fn terminal_failure_blocks_transitive_dependents_only() {
    let mut engine = engine_with(Arc::new(AtomicU32::new(0)), Arc::new(AtomicU32::new(0)));
    let r = recipe(r#"
recipe_id: partial
stages:
  - id: boom
    module: mock_boom
  - id: child
    module: mock_flaky
    after: [boom]
  - id: free
    module: mock_source
"#);
    let state = engine.run(RunRequest::new(r)).expect("run");
    assert_eq!(state.stage("boom").map(|s| s.status), Some(StageStatus::Failed));
    assert_eq!(state.stage("child").map(|s| s.status), Some(StageStatus::Pending),
               "el dependiente transitivo no corre");
    assert_eq!(state.stage("free").map(|s| s.status), Some(StageStatus::Done),
               "un stage sin camino desde el fallo sí corre");
}

#[test]
fn pause_halts_run_and_resume_completes_with_overrides() {
    let mut engine = engine_with(Arc::new(AtomicU32::new(0)), Arc::new(AtomicU32::new(0)));
    let yaml = r#"
recipe_id: gated
stages:
  - id: config
    module: mock_gate
  - id: downstream
    module: mock_source
    after: [config]
"#;
    let mut request = RunRequest::new(recipe(yaml));
    request.run_id = Some("gated-run".to_string());
    let state = engine.run(request).expect("first run");
    let slot = state.stage("config").expect("slot");
    assert_eq!(slot.status, StageStatus::Paused);
    assert!(slot.pause_reason.as_deref().unwrap_or_default().contains("confirmation"));
    // la pausa detiene el run completo
    assert_eq!(state.stage("downstream").map(|s| s.status), Some(StageStatus::Pending));
    assert_eq!(state.overall_status(), "paused");

    // reanudar el mismo run con el override del usuario
    let mut resume = RunRequest::new(recipe(yaml));
    resume.run_id = Some("gated-run".to_string());
    resume.runtime_params = json!({"confirmed": true});
    let state = engine.run(resume).expect("resume");
    assert_eq!(state.stage("config").map(|s| s.status), Some(StageStatus::Done));
    assert_eq!(state.stage("downstream").map(|s| s.status), Some(StageStatus::Done));
    assert_eq!(state.overall_status(), "completed");

    let events = engine.events_for("gated-run").expect("events");
    assert!(events.iter().any(|e| matches!(&e.kind, RunEventKind::StagePaused { .. })));
}

#[test]
fn dry_run_plans_without_touching_storage() {
    let mut engine = engine_with(Arc::new(AtomicU32::new(0)), Arc::new(AtomicU32::new(0)));
    let mut request = RunRequest::new(recipe(LINEAR));
    request.run_id = Some("dry".to_string());
    request.dry_run = true;
    let state = engine.run(request).expect("dry run");

    assert_eq!(state.stage("source").map(|s| s.status), Some(StageStatus::Pending));
    assert!(engine.store()
                  .list_versions(&ArtifactKind::ScreenplaySource, None)
                  .expect("versions")
                  .is_empty(),
            "dry run no escribe artifacts");
    assert!(engine.events_for("dry").expect("events").is_empty(), "dry run no emite eventos");
    assert!(engine.run_state("dry").expect("load").is_none(), "dry run no persiste estado");
}

#[test]
fn start_from_assumes_earlier_stages_satisfied() {
    let src = Arc::new(AtomicU32::new(0));
    let der = Arc::new(AtomicU32::new(0));
    let mut engine = engine_with(src.clone(), der.clone());
    engine.run(RunRequest::new(recipe(LINEAR))).expect("seed run");

    let mut request = RunRequest::new(recipe(LINEAR));
    request.start_from = Some("derive".to_string());
    request.force = true;
    let state = engine.run(request).expect("start-from run");
    assert_eq!(state.stage("source").map(|s| s.status), Some(StageStatus::SkippedReused));
    assert_eq!(state.stage("derive").map(|s| s.status), Some(StageStatus::Done));
    assert_eq!(src.load(Ordering::SeqCst), 1, "el stage anterior no se re-ejecuta");
    assert_eq!(der.load(Ordering::SeqCst), 2);

    let mut bad = RunRequest::new(recipe(LINEAR));
    bad.start_from = Some("ghost".to_string());
    assert!(engine.run(bad).is_err(), "start_from desconocido es error");
}
