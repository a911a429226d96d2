//! Implementación del `PipelineEngine`.
//!
//! Responsable de orquestar la ejecución de stages en orden topológico,
//! decidir reuse vs. recompute, aplicar la política de resiliencia y dejar
//! estado durable (run state + eventos) tras cada transición.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use log::{debug, warn};
use serde_json::{json, Value};
use uuid::Uuid;

use script_domain::{ArtifactRef, Recipe, RecipeStage, ResilienceConfig};

use crate::errors::{classify_error, EngineError, ErrorClass, StoreError};
use crate::event::{EventSink, InMemoryEventSink, RunEvent, RunEventKind};
use crate::module::{InputValue, ModuleContext, ModuleInputs, ModuleRegistry, ModuleRunResult, SchemaRegistry};
use crate::params::merge_json;
use crate::recipe::{resolve_execution_order, validate};
use crate::store::{ArtifactStorage, ArtifactStore, GraphStore, InMemoryArtifactStorage, InMemoryGraphStore};

use super::invoke::invoke_with_timeout;
use super::retry::RetryPolicy;
use super::reuse::{check_reuse, stage_outputs};
use super::state::{InMemoryRunStateStore, RunState, RunStateStore, StageStatus};

/// Petición de ejecución de una receta.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub recipe: Recipe,
    /// Id del run; `None` genera uno nuevo. Repetir un id reanuda ese run.
    pub run_id: Option<String>,
    /// Planifica (orden, decisiones de reuse) sin invocar módulos ni
    /// escribir nada.
    pub dry_run: bool,
    /// Comienza la iteración en este stage; los anteriores se asumen
    /// satisfechos.
    pub start_from: Option<String>,
    /// Ignora el chequeo de reuse y recomputa todo.
    pub force: bool,
    pub instrument: bool,
    /// Overrides que se fusionan (shallow) sobre los params de cada stage.
    pub runtime_params: Value,
}

impl RunRequest {
    pub fn new(recipe: Recipe) -> Self {
        Self { recipe,
               run_id: None,
               dry_run: false,
               start_from: None,
               force: false,
               instrument: false,
               runtime_params: Value::Null }
    }
}

enum StageOutcome {
    Done,
    Failed,
    Paused,
}

/// Motor de ejecución de recetas sobre un proyecto.
pub struct PipelineEngine<S, G, E, R>
    where S: ArtifactStorage,
          G: GraphStore,
          E: EventSink,
          R: RunStateStore
{
    store: ArtifactStore<S, G>,
    events: E,
    run_states: R,
    modules: ModuleRegistry,
    schemas: SchemaRegistry,
    project_dir: PathBuf,
    announce: Option<Arc<dyn Fn(&crate::module::ArtifactDraft) + Send + Sync>>,
}

impl PipelineEngine<InMemoryArtifactStorage, InMemoryGraphStore, InMemoryEventSink, InMemoryRunStateStore> {
    /// Engine efímero con todos los backends en memoria (tests, dry runs).
    pub fn in_memory(project_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = ArtifactStore::open(InMemoryArtifactStorage::new(), InMemoryGraphStore::new())?;
        Ok(Self::new(store,
                     InMemoryEventSink::new(),
                     InMemoryRunStateStore::new(),
                     ModuleRegistry::new(),
                     SchemaRegistry::new(),
                     project_dir))
    }
}

impl<S, G, E, R> PipelineEngine<S, G, E, R>
    where S: ArtifactStorage,
          G: GraphStore,
          E: EventSink,
          R: RunStateStore
{
    pub fn new(store: ArtifactStore<S, G>,
               events: E,
               run_states: R,
               modules: ModuleRegistry,
               schemas: SchemaRegistry,
               project_dir: impl Into<PathBuf>)
               -> Self {
        Self { store,
               events,
               run_states,
               modules,
               schemas,
               project_dir: project_dir.into(),
               announce: None }
    }

    pub fn store(&self) -> &ArtifactStore<S, G> {
        &self.store
    }

    pub fn modules_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.modules
    }

    pub fn schemas_mut(&mut self) -> &mut SchemaRegistry {
        &mut self.schemas
    }

    /// Callback de streaming entregado a los módulos vía `ModuleContext`.
    pub fn set_announce(&mut self, callback: Arc<dyn Fn(&crate::module::ArtifactDraft) + Send + Sync>) {
        self.announce = Some(callback);
    }

    pub fn events_for(&self, run_id: &str) -> Result<Vec<RunEvent>, StoreError> {
        self.events.list(run_id)
    }

    pub fn run_state(&self, run_id: &str) -> Result<Option<RunState>, StoreError> {
        self.run_states.load(run_id)
    }

    /// Ejecuta (o reanuda) un run completo. Ver `RunRequest` para los modos.
    ///
    /// Un stage fallido NO es un error de esta función: queda registrado en
    /// el `RunState` devuelto y bloquea sólo a sus dependientes transitivos.
    /// Errores aquí significan que el run como un todo no pudo proceder
    /// (receta inválida, storage roto, violación de inmutabilidad).
    pub fn run(&mut self, request: RunRequest) -> Result<RunState, EngineError> {
        validate(&request.recipe, &self.modules, &self.schemas)?;
        let order = resolve_execution_order(&request.recipe)?;
        let recipe = &request.recipe;
        let resilience = recipe.resilience();

        let run_id = request.run_id
                            .clone()
                            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut state = self.load_or_init_state(&run_id, recipe, &order, request.instrument)?;

        let start_index = match &request.start_from {
            Some(id) => order.iter()
                             .position(|s| s == id)
                             .ok_or_else(|| EngineError::UnknownStartStage(id.clone()))?,
            None => 0,
        };
        self.satisfy_stages_before(recipe, &order[..start_index], &mut state)?;

        let dry = request.dry_run;
        if !dry {
            if self.events.list(&run_id)?.is_empty() {
                self.events.append_kind(&run_id,
                                        RunEventKind::RunStarted { recipe_id: recipe.recipe_id.clone(),
                                                                   stage_count: order.len() })?;
            }
            self.run_states.save(&state)?;
        }

        // stages con un ancestro fallido (o el fallido mismo); al recorrer en
        // orden topológico la pertenencia se vuelve transitiva sola
        let mut blocked: HashSet<String> = HashSet::new();
        let mut paused = false;

        for stage_id in order.iter().skip(start_index) {
            if paused {
                break;
            }
            let stage = recipe.stage(stage_id)
                              .ok_or_else(|| EngineError::Internal(format!("stage '{stage_id}' missing from recipe")))?;
            if matches!(state.stage(stage_id).map(|s| s.status),
                        Some(StageStatus::Done) | Some(StageStatus::SkippedReused))
            {
                continue;
            }
            if stage.ordering_upstream().any(|u| blocked.contains(u)) {
                blocked.insert(stage_id.clone());
                continue;
            }

            let resolved = self.resolve_inputs(stage, &state);
            let (inputs, consumed) = match resolved {
                Ok(pair) => pair,
                Err(e) => {
                    if dry {
                        // en planificación los inputs pueden no existir aún
                        continue;
                    }
                    let slot = state.ensure_stage(stage_id);
                    slot.status = StageStatus::Failed;
                    slot.error = Some(e.to_string());
                    self.events.append_kind(&run_id,
                                            RunEventKind::StageFailed { stage_id: stage_id.clone(),
                                                                       error: e.to_string() })?;
                    self.run_states.save(&state)?;
                    blocked.insert(stage_id.clone());
                    continue;
                }
            };

            if !request.force {
                let output_schemas = self.modules
                                         .spec(&stage.module)
                                         .map(|s| s.output_schemas.clone())
                                         .unwrap_or_default();
                if let Some(refs) = check_reuse(&self.store, stage_id, &output_schemas, &consumed)? {
                    debug!("stage {stage_id}: reusing {} artifact(s)", refs.len());
                    let slot = state.ensure_stage(stage_id);
                    slot.status = StageStatus::SkippedReused;
                    slot.artifact_refs = refs.clone();
                    if !dry {
                        self.events.append_kind(&run_id,
                                                RunEventKind::StageSkippedReused { stage_id: stage_id.clone(),
                                                                                  artifact_refs: refs })?;
                        self.run_states.save(&state)?;
                    }
                    continue;
                }
            }

            if dry {
                continue;
            }

            let outcome = self.execute_stage(stage, &run_id, &resilience, &request.runtime_params,
                                             Arc::new(inputs), consumed, &mut state)?;
            match outcome {
                StageOutcome::Done => {}
                StageOutcome::Failed => {
                    blocked.insert(stage_id.clone());
                }
                StageOutcome::Paused => {
                    paused = true;
                }
            }
        }

        state.total_cost_usd = state.stages.values().map(|s| s.cost_usd).sum();
        state.finished_at = Some(Utc::now());
        if !dry {
            self.run_states.save(&state)?;
            self.events.append_kind(&run_id,
                                    RunEventKind::RunFinished { status: state.overall_status().to_string(),
                                                                total_cost_usd: state.total_cost_usd })?;
        }
        Ok(state)
    }

    /// Carga el estado previo del run (reanudación) o crea uno nuevo.
    ///
    /// En reanudación: `Done`/`SkippedReused` se conservan; `Running` (el
    /// proceso murió a mitad) vuelve a `Pending`; `Failed` y `Paused` se
    /// re-evalúan en esta pasada.
    fn load_or_init_state(&mut self,
                          run_id: &str,
                          recipe: &Recipe,
                          order: &[String],
                          instrument: bool)
                          -> Result<RunState, EngineError> {
        match self.run_states.load(run_id)? {
            Some(mut prev) => {
                prev.instrumented |= instrument;
                prev.finished_at = None;
                for id in order {
                    prev.ensure_stage(id);
                }
                for slot in prev.stages.values_mut() {
                    if matches!(slot.status, StageStatus::Running | StageStatus::Failed | StageStatus::Paused) {
                        slot.status = StageStatus::Pending;
                    }
                }
                Ok(prev)
            }
            None => Ok(RunState::new(run_id, &recipe.recipe_id, order, instrument)),
        }
    }

    /// Marca como satisfechos los stages anteriores a `start_from`,
    /// copiando hacia adelante sus últimas salidas conocidas.
    fn satisfy_stages_before(&mut self,
                             recipe: &Recipe,
                             earlier: &[String],
                             state: &mut RunState)
                             -> Result<(), EngineError> {
        for id in earlier {
            let already = matches!(state.stage(id).map(|s| s.status),
                                   Some(StageStatus::Done) | Some(StageStatus::SkippedReused));
            if already {
                continue;
            }
            let Some(stage) = recipe.stage(id) else { continue };
            let output_schemas = self.modules
                                     .spec(&stage.module)
                                     .map(|s| s.output_schemas.clone())
                                     .unwrap_or_default();
            let refs: Vec<ArtifactRef> = stage_outputs(&self.store, id, &output_schemas)?
                .into_iter()
                .map(|(r, _)| r)
                .collect();
            let slot = state.ensure_stage(id);
            slot.status = StageStatus::SkippedReused;
            slot.artifact_refs = refs;
        }
        Ok(())
    }

    /// Resuelve los inputs del stage y las refs upstream que consumiría.
    ///
    /// - `needs`: un artifact del stage upstream (si produjo varios, se
    ///   prefiere el de tipo compatible con los input schemas del módulo);
    /// - `needs_all`: la lista completa a través de entidades;
    /// - `store_inputs`(+optional): última versión del tipo declarado,
    ///   directa del store.
    fn resolve_inputs(&self,
                      stage: &RecipeStage,
                      state: &RunState)
                      -> Result<(ModuleInputs, Vec<ArtifactRef>), EngineError> {
        let input_schemas = self.modules
                                .spec(&stage.module)
                                .map(|s| s.input_schemas.clone())
                                .unwrap_or_default();
        let mut inputs = ModuleInputs::new();
        let mut consumed: Vec<ArtifactRef> = Vec::new();

        let select = |refs: &[ArtifactRef]| -> Vec<ArtifactRef> {
            let matching: Vec<ArtifactRef> =
                refs.iter()
                    .filter(|r| input_schemas.iter().any(|k| self.schemas.compatible(&r.artifact_type, k)))
                    .cloned()
                    .collect();
            if matching.is_empty() {
                refs.to_vec()
            } else {
                matching
            }
        };

        for dep in &stage.needs {
            let refs = state.stage(dep).map(|s| s.artifact_refs.clone()).unwrap_or_default();
            if refs.is_empty() {
                return Err(EngineError::MissingInput { stage_id: stage.id.clone(),
                                                       key: dep.clone() });
            }
            let chosen = select(&refs);
            let first = chosen.first()
                              .ok_or_else(|| EngineError::MissingInput { stage_id: stage.id.clone(),
                                                                         key: dep.clone() })?;
            let artifact = self.store.load_artifact(first)?;
            inputs.insert(dep.clone(), InputValue::Single(artifact));
            consumed.push(first.clone());
        }

        for dep in &stage.needs_all {
            let refs = state.stage(dep).map(|s| s.artifact_refs.clone()).unwrap_or_default();
            if refs.is_empty() {
                return Err(EngineError::MissingInput { stage_id: stage.id.clone(),
                                                       key: dep.clone() });
            }
            let chosen = select(&refs);
            let mut loaded = Vec::with_capacity(chosen.len());
            for r in &chosen {
                loaded.push(self.store.load_artifact(r)?);
                consumed.push(r.clone());
            }
            inputs.insert(dep.clone(), InputValue::Many(loaded));
        }

        for (key, kind, required) in
            stage.store_inputs
                 .iter()
                 .map(|(k, v)| (k, v, true))
                 .chain(stage.store_inputs_optional.iter().map(|(k, v)| (k, v, false)))
        {
            let found = match self.store.latest(kind, None)? {
                Some(r) => Some(r),
                None => {
                    let entities = self.store.list_entities(kind)?;
                    match entities.as_slice() {
                        [only] => self.store.latest(kind, only.as_deref())?,
                        _ => None,
                    }
                }
            };
            match found {
                Some(r) => {
                    let artifact = self.store.load_artifact(&r)?;
                    inputs.insert(key.clone(), InputValue::Single(artifact));
                    consumed.push(r);
                }
                None if required => {
                    return Err(EngineError::MissingInput { stage_id: stage.id.clone(),
                                                           key: key.clone() });
                }
                None => {}
            }
        }

        // dedupe preservando el orden de aparición
        let mut seen: HashSet<String> = HashSet::new();
        consumed.retain(|r| seen.insert(r.key()));
        Ok((inputs, consumed))
    }

    /// Ejecuta un stage con retries, fallback de modelo y timeout por
    /// intento. Persiste estado y eventos en cada transición.
    #[allow(clippy::too_many_arguments)]
    fn execute_stage(&mut self,
                     stage: &RecipeStage,
                     run_id: &str,
                     resilience: &ResilienceConfig,
                     runtime_params: &Value,
                     inputs: Arc<ModuleInputs>,
                     consumed: Vec<ArtifactRef>,
                     state: &mut RunState)
                     -> Result<StageOutcome, EngineError> {
        let stage_id = stage.id.as_str();
        let module = self.modules
                         .get(&stage.module)
                         .ok_or_else(|| EngineError::Internal(format!("module '{}' vanished from registry",
                                                                      stage.module)))?;
        let policy = RetryPolicy::for_stage(resilience, stage_id);
        let merged_base = merge_json(&stage.params, runtime_params);
        let default_model = merged_base.get("model")
                                       .and_then(|v| v.as_str())
                                       .map(|s| s.to_string());

        let started = Instant::now();
        let mut attempt: u32 = 1;
        loop {
            let model = policy.model_for_attempt(default_model.as_deref(), attempt);
            let mut params = merged_base.clone();
            if let Some(m) = &model {
                match &mut params {
                    Value::Object(map) => {
                        map.insert("model".to_string(), json!(m));
                    }
                    _ => params = json!({ "model": m }),
                }
            }

            {
                let slot = state.ensure_stage(stage_id);
                slot.status = StageStatus::Running;
                slot.attempt_count = attempt;
            }
            self.run_states.save(state)?;
            self.events.append_kind(run_id,
                                    RunEventKind::StageStarted { stage_id: stage_id.to_string(),
                                                                 attempt,
                                                                 model: model.clone() })?;

            let ctx = ModuleContext { project_dir: self.project_dir.clone(),
                                      run_id: run_id.to_string(),
                                      stage_id: stage_id.to_string(),
                                      runtime_params: runtime_params.clone(),
                                      announce_artifact: self.announce.clone() };
            let result = invoke_with_timeout(module.clone(),
                                             inputs.clone(),
                                             params,
                                             ctx,
                                             policy.attempt_timeout());

            match result {
                ModuleRunResult::Success { artifacts, cost } => {
                    let mut refs: Vec<ArtifactRef> = Vec::with_capacity(artifacts.len());
                    for draft in artifacts {
                        let mut meta = draft.metadata;
                        meta.lineage = consumed.clone();
                        if meta.producing_module.is_empty() {
                            meta.producing_module = module.id().to_string();
                        }
                        meta.annotations.insert("stage_id".to_string(), json!(stage_id));
                        meta.annotations.insert("run_id".to_string(), json!(run_id));
                        if state.instrumented {
                            meta.annotations.insert("attempt".to_string(), json!(attempt));
                        }
                        if meta.cost_data.is_none() {
                            meta.cost_data = cost.clone();
                        }
                        let r = self.store
                                    .save_artifact(&draft.artifact_type, draft.entity_id.as_deref(), draft.data, meta)?;
                        refs.push(r);
                    }
                    let cost_usd = cost.as_ref().map(|c| c.estimated_cost_usd).unwrap_or(0.0);
                    let model_used = cost.as_ref()
                                         .map(|c| c.model.clone())
                                         .filter(|m| !m.is_empty())
                                         .or(model);
                    let slot = state.ensure_stage(stage_id);
                    slot.status = StageStatus::Done;
                    slot.artifact_refs = refs.clone();
                    slot.attempt_count = attempt;
                    slot.model_used = model_used;
                    slot.duration_seconds = started.elapsed().as_secs_f64();
                    slot.cost_usd += cost_usd;
                    slot.error = None;
                    slot.pause_reason = None;
                    let duration = slot.duration_seconds;
                    self.run_states.save(state)?;
                    self.events.append_kind(run_id,
                                            RunEventKind::StageDone { stage_id: stage_id.to_string(),
                                                                      artifact_refs: refs,
                                                                      cost_usd,
                                                                      duration_seconds: duration })?;
                    return Ok(StageOutcome::Done);
                }
                ModuleRunResult::Pause { reason } => {
                    let slot = state.ensure_stage(stage_id);
                    slot.status = StageStatus::Paused;
                    slot.attempt_count = attempt;
                    slot.pause_reason = Some(reason.clone());
                    slot.duration_seconds = started.elapsed().as_secs_f64();
                    self.run_states.save(state)?;
                    self.events.append_kind(run_id,
                                            RunEventKind::StagePaused { stage_id: stage_id.to_string(),
                                                                        reason })?;
                    return Ok(StageOutcome::Paused);
                }
                ModuleRunResult::Failure { error } => {
                    let transient = classify_error(&error) == ErrorClass::Transient;
                    if transient && attempt < policy.max_attempts() {
                        let delay = policy.backoff_delay(run_id, stage_id, attempt);
                        warn!("stage {stage_id}: transient failure on attempt {attempt} ({error}); retrying in {:.2}s",
                              delay.as_secs_f64());
                        self.events.append_kind(run_id,
                                                RunEventKind::StageRetrying { stage_id: stage_id.to_string(),
                                                                              attempt,
                                                                              delay_seconds: delay.as_secs_f64(),
                                                                              error: error.to_string() })?;
                        let next_model = policy.model_for_attempt(default_model.as_deref(), attempt + 1);
                        if let Some(next) = &next_model {
                            if next_model != model {
                                self.events.append_kind(run_id,
                                                        RunEventKind::StageFallback { stage_id: stage_id.to_string(),
                                                                                      attempt: attempt + 1,
                                                                                      model: next.clone() })?;
                            }
                        }
                        if !delay.is_zero() {
                            std::thread::sleep(delay);
                        }
                        attempt += 1;
                        continue;
                    }

                    let slot = state.ensure_stage(stage_id);
                    slot.status = StageStatus::Failed;
                    slot.attempt_count = attempt;
                    slot.error = Some(error.to_string());
                    slot.duration_seconds = started.elapsed().as_secs_f64();
                    self.run_states.save(state)?;
                    self.events.append_kind(run_id,
                                            RunEventKind::StageFailed { stage_id: stage_id.to_string(),
                                                                        error: error.to_string() })?;
                    return Ok(StageOutcome::Failed);
                }
            }
        }
    }
}
