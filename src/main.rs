//! Demo del pipeline completo sobre un proyecto scratch.
//!
//! Corre la receta de `demos/short_film.yaml` dos veces contra un directorio
//! temporal: la primera ejecuta los cuatro stages, la segunda demuestra el
//! reuse idempotente (`skipped_reused` en todos).

use std::path::PathBuf;

use script_adapters::{standard_registry, standard_schemas};
use script_core::{PipelineEngine, RunRequest};
use script_domain::Recipe;
use script_persistence::{open_project_store, FsEventLog, FsRunStateStore, ProjectLayout};

const RECIPE_YAML: &str = include_str!("../demos/short_film.yaml");
const SCREENPLAY: &str = include_str!("../demos/the_last_train.txt");

fn run_demo() -> Result<(), Box<dyn std::error::Error>> {
    let project_dir: PathBuf = std::env::temp_dir().join(format!("scriptflow-demo-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&project_dir)?;
    std::fs::write(project_dir.join("screenplay.txt"), SCREENPLAY)?;
    println!("proyecto scratch: {}", project_dir.display());

    let recipe = Recipe::from_yaml_str(RECIPE_YAML)?;
    let store = open_project_store(&project_dir)?;
    let layout = ProjectLayout::new(&project_dir);
    let mut engine = PipelineEngine::new(store,
                                         FsEventLog::new(layout.clone()),
                                         FsRunStateStore::new(layout),
                                         standard_registry(),
                                         standard_schemas(),
                                         &project_dir);

    let mut first = RunRequest::new(recipe.clone());
    first.run_id = Some("demo-run".to_string());
    let state = engine.run(first)?;
    println!("\n-- primera pasada --\n{}", state.summary());

    let mut second = RunRequest::new(recipe);
    second.run_id = Some("demo-run-2".to_string());
    let state = engine.run(second)?;
    println!("\n-- segunda pasada (reuse) --\n{}", state.summary());

    let events = engine.events_for("demo-run")?;
    println!("\neventos registrados en la primera pasada: {}", events.len());
    Ok(())
}

fn main() {
    let _ = dotenvy::dotenv();
    env_logger::init();
    if let Err(e) = run_demo() {
        eprintln!("[scriptflow-demo] error: {e}");
        std::process::exit(1);
    }
}
