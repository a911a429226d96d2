//! Escenario end-to-end sobre el stack de filesystem completo:
//! ingest -> normalize -> extract_scenes -> project_config.

use std::path::Path;

use tempfile::TempDir;

use script_adapters::{standard_registry, standard_schemas};
use script_core::{PipelineEngine, RunRequest, StageStatus};
use script_domain::{ArtifactKind, Health, Recipe};
use script_persistence::{open_project_store, FsArtifactStorage, FsEventLog, FsGraphStore, FsRunStateStore,
                         ProjectLayout};

const SCREENPLAY: &str = "FADE IN:\n\nINT. STATION HALL - NIGHT\n\nThe departures board flickers.\n\nEXT. PLATFORM 4 - NIGHT\n\nRain hammers the canopy.\n\nINT. STATION CAFE - NIGHT\n\nA cold coffee goes colder.\n";

const RECIPE: &str = r#"
recipe_id: short_film_extraction
stages:
  - id: ingest
    module: ingest
    params:
      source_path: screenplay.txt
  - id: normalize
    module: normalize
    needs: [ingest]
  - id: extract_scenes
    module: extract_scenes
    needs: [normalize]
  - id: project_config
    module: project_config
    needs: [extract_scenes]
    after: [normalize]
    params:
      title: The Last Train
      confirmed: true
"#;

type FsEngine = PipelineEngine<FsArtifactStorage, FsGraphStore, FsEventLog, FsRunStateStore>;

fn engine_for(project_dir: &Path) -> FsEngine {
    let store = open_project_store(project_dir).expect("open project store");
    let layout = ProjectLayout::new(project_dir);
    PipelineEngine::new(store,
                        FsEventLog::new(layout.clone()),
                        FsRunStateStore::new(layout),
                        standard_registry(),
                        standard_schemas(),
                        project_dir)
}

fn statuses(state: &script_core::RunState) -> Vec<(String, StageStatus)> {
    state.stages.iter().map(|(id, s)| (id.clone(), s.status)).collect()
}

#[test]
fn full_pipeline_runs_reuses_and_recovers_from_manual_stale() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("screenplay.txt"), SCREENPLAY).expect("write screenplay");
    let recipe = Recipe::from_yaml_str(RECIPE).expect("recipe parses");
    let mut engine = engine_for(dir.path());

    // 1) primera pasada con force: los cuatro stages ejecutan
    let mut first = RunRequest::new(recipe.clone());
    first.run_id = Some("run-1".to_string());
    first.force = true;
    let state = engine.run(first).expect("first run");
    for (id, status) in statuses(&state) {
        assert_eq!(status, StageStatus::Done, "stage {id} debía ejecutar");
    }

    // artifacts persistidos con el layout esperado
    assert!(dir.path().join("artifacts/screenplay_source/__project__/v1.json").is_file());
    assert!(dir.path().join("artifacts/scene/scene_001/v1.json").is_file());
    assert!(dir.path().join("graph/dependency_graph.json").is_file());
    assert!(dir.path().join("output/runs/run-1/run_state.json").is_file());
    assert!(dir.path().join("output/runs/run-1/pipeline_events.jsonl").is_file());

    let index = engine.store()
                      .latest(&ArtifactKind::SceneIndex, None)
                      .expect("latest")
                      .expect("scene index exists");
    let loaded = engine.store().load_artifact(&index).expect("load index");
    assert_eq!(loaded.data["count"], serde_json::json!(3));

    // 2) segunda pasada sin force: reuse idempotente en todos los stages
    let mut second = RunRequest::new(recipe.clone());
    second.run_id = Some("run-2".to_string());
    let state = engine.run(second).expect("second run");
    for (id, status) in statuses(&state) {
        assert_eq!(status, StageStatus::SkippedReused, "stage {id} debía reusar");
    }
    assert_eq!(state.overall_status(), "completed");

    // 3) marcar stale el artifact de normalize a mano y volver a correr
    let normalized = engine.store()
                           .latest(&ArtifactKind::NormalizedScreenplay, None)
                           .expect("latest")
                           .expect("normalized exists");
    assert!(engine.store().set_health(&normalized, Health::Stale).expect("flip health"));

    let mut third = RunRequest::new(recipe);
    third.run_id = Some("run-3".to_string());
    let state = engine.run(third).expect("third run");
    assert_eq!(state.stage("ingest").map(|s| s.status), Some(StageStatus::SkippedReused),
               "ingest no depende del artifact invalidado");
    for id in ["normalize", "extract_scenes", "project_config"] {
        assert_eq!(state.stage(id).map(|s| s.status), Some(StageStatus::Done),
                   "stage {id} debía recomputarse tras el stale manual");
    }

    // versiones monotónicas sin huecos tras la recomputación
    let versions = engine.store()
                         .list_versions(&ArtifactKind::NormalizedScreenplay, None)
                         .expect("versions");
    assert_eq!(versions.iter().map(|r| r.version).collect::<Vec<_>>(), vec![1, 2]);
    let config_versions = engine.store()
                                .list_versions(&ArtifactKind::ProjectConfig, None)
                                .expect("versions");
    assert_eq!(config_versions.len(), 2);

    // el run reanudable quedó en disco: otro proceso lo puede releer
    let reread = engine_for(dir.path());
    let persisted = reread.run_state("run-3").expect("load").expect("run state exists");
    assert_eq!(persisted.overall_status(), "completed");
    let events = reread.events_for("run-3").expect("events");
    assert!(events.len() >= 5, "run_started + transiciones por stage");
}

#[test]
fn diff_between_config_versions_reports_changed_keys() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("screenplay.txt"), SCREENPLAY).expect("write screenplay");
    let recipe = Recipe::from_yaml_str(RECIPE).expect("recipe parses");
    let mut engine = engine_for(dir.path());

    let mut first = RunRequest::new(recipe.clone());
    first.run_id = Some("d1".to_string());
    engine.run(first).expect("first run");

    // segunda corrida forzada con otro título: nueva versión del config
    let mut second = RunRequest::new(recipe);
    second.run_id = Some("d2".to_string());
    second.force = true;
    second.runtime_params = serde_json::json!({"title": "The Last Train, Revised"});
    engine.run(second).expect("second run");

    let versions = engine.store()
                         .list_versions(&ArtifactKind::ProjectConfig, None)
                         .expect("versions");
    assert_eq!(versions.len(), 2);
    let diff = engine.store().diff_versions(&versions[0], &versions[1]).expect("diff");
    let title = diff.iter().find(|d| d.path == "title").expect("title cambió");
    assert_eq!(title.new, Some(serde_json::json!("The Last Train, Revised")));
}
