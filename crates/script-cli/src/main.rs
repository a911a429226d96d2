use std::path::PathBuf;

use serde_json::{json, Value};

use script_adapters::{standard_registry, standard_schemas};
use script_core::{PipelineEngine, RunRequest};
use script_domain::Recipe;
use script_persistence::{open_project_store, FsEventLog, FsRunStateStore, ProjectLayout};

fn usage() -> ! {
    eprintln!("Uso: scriptflow run --recipe PATH [--project DIR] [--run-id ID] [--dry-run] \
               [--start-from STAGE] [--force] [--instrument] [--param K=V]... [--params-file PATH]");
    std::process::exit(2);
}

/// Parsea `K=V`; el valor se interpreta como JSON si es posible, si no como
/// string plano (`--param temperature=0.2`, `--param confirmed=true`).
fn parse_param(raw: &str) -> Option<(String, Value)> {
    let (key, value) = raw.split_once('=')?;
    if key.is_empty() {
        return None;
    }
    let parsed = serde_json::from_str::<Value>(value).unwrap_or_else(|_| json!(value));
    Some((key.to_string(), parsed))
}

fn main() {
    // Cargar .env si existe (SCRIPTFLOW_PROJECT_DIR, RUST_LOG)
    let _ = dotenvy::dotenv();
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || args[1] != "run" {
        usage();
    }

    let mut recipe_path: Option<PathBuf> = None;
    let mut project: Option<PathBuf> = None;
    let mut run_id: Option<String> = None;
    let mut dry_run = false;
    let mut start_from: Option<String> = None;
    let mut force = false;
    let mut instrument = false;
    let mut params = serde_json::Map::new();
    let mut params_file: Option<PathBuf> = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--recipe" => {
                i += 1;
                if i < args.len() { recipe_path = Some(PathBuf::from(&args[i])); } else { usage(); }
            }
            "--project" => {
                i += 1;
                if i < args.len() { project = Some(PathBuf::from(&args[i])); } else { usage(); }
            }
            "--run-id" => {
                i += 1;
                if i < args.len() { run_id = Some(args[i].clone()); } else { usage(); }
            }
            "--start-from" => {
                i += 1;
                if i < args.len() { start_from = Some(args[i].clone()); } else { usage(); }
            }
            "--params-file" => {
                i += 1;
                if i < args.len() { params_file = Some(PathBuf::from(&args[i])); } else { usage(); }
            }
            "--param" => {
                i += 1;
                let Some((k, v)) = args.get(i).and_then(|raw| parse_param(raw)) else {
                    eprintln!("[scriptflow run] --param espera K=V");
                    std::process::exit(2);
                };
                params.insert(k, v);
            }
            "--dry-run" => dry_run = true,
            "--force" => force = true,
            "--instrument" => instrument = true,
            other => {
                eprintln!("[scriptflow run] flag desconocida: {other}");
                usage();
            }
        }
        i += 1;
    }

    let Some(recipe_path) = recipe_path else { usage() };
    let project_dir = project.or_else(|| std::env::var("SCRIPTFLOW_PROJECT_DIR").ok().map(PathBuf::from))
                             .unwrap_or_else(|| PathBuf::from("."));

    // --params-file primero, --param K=V pisa encima
    let mut runtime_params = match &params_file {
        Some(path) => match std::fs::read_to_string(path).map_err(|e| e.to_string())
                                                         .and_then(|t| serde_json::from_str::<Value>(&t).map_err(|e| e.to_string()))
        {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                eprintln!("[scriptflow run] params-file debe contener un objeto JSON");
                std::process::exit(2);
            }
            Err(e) => {
                eprintln!("[scriptflow run] no pude leer params-file {}: {e}", path.display());
                std::process::exit(2);
            }
        },
        None => serde_json::Map::new(),
    };
    runtime_params.extend(params);

    let recipe = match Recipe::from_yaml_file(&recipe_path) {
        Ok(recipe) => recipe,
        Err(e) => {
            eprintln!("[scriptflow run] receta inválida {}: {e}", recipe_path.display());
            std::process::exit(1);
        }
    };

    let store = match open_project_store(&project_dir) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("[scriptflow run] no pude abrir el proyecto {}: {e}", project_dir.display());
            std::process::exit(1);
        }
    };
    let layout = ProjectLayout::new(&project_dir);
    let mut engine = PipelineEngine::new(store,
                                         FsEventLog::new(layout.clone()),
                                         FsRunStateStore::new(layout),
                                         standard_registry(),
                                         standard_schemas(),
                                         &project_dir);

    let mut request = RunRequest::new(recipe);
    request.run_id = run_id;
    request.dry_run = dry_run;
    request.start_from = start_from;
    request.force = force;
    request.instrument = instrument;
    request.runtime_params = if runtime_params.is_empty() {
        Value::Null
    } else {
        Value::Object(runtime_params)
    };

    match engine.run(request) {
        Ok(state) => {
            println!("{}", state.summary());
            if state.overall_status() == "failed" {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("[scriptflow run] error: {e}");
            std::process::exit(1);
        }
    }
}
