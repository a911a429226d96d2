//! Invocación de módulos con timeout por intento.
//!
//! La llamada a modelo externo es la única operación que puede bloquear
//! largo; corre en un hilo de trabajo y el timeout se trata como fallo
//! transitorio (entra al ciclo de retry), no como crash.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

use crate::errors::ModuleError;
use crate::module::{Module, ModuleContext, ModuleInputs, ModuleRunResult};

pub(crate) fn invoke_with_timeout(module: Arc<dyn Module>,
                                  inputs: Arc<ModuleInputs>,
                                  params: Value,
                                  ctx: ModuleContext,
                                  timeout: Option<Duration>)
                                  -> ModuleRunResult {
    let (tx, rx) = mpsc::channel();
    let stage_id = ctx.stage_id.clone();
    thread::spawn(move || {
        let result = module.run(&inputs, &params, &ctx);
        // el receptor puede haber abandonado por timeout; ignorar el send
        let _ = tx.send(result);
    });

    let received = match timeout {
        Some(limit) => rx.recv_timeout(limit).map_err(|e| match e {
                                                  mpsc::RecvTimeoutError::Timeout => {
                                                      ModuleError::Transient(format!("attempt timed out after {:.1}s",
                                                                                     limit.as_secs_f64()))
                                                  }
                                                  mpsc::RecvTimeoutError::Disconnected => {
                                                      ModuleError::Terminal(format!("module thread for '{stage_id}' died"))
                                                  }
                                              }),
        None => rx.recv()
                  .map_err(|_| ModuleError::Terminal(format!("module thread for '{stage_id}' died"))),
    };

    match received {
        Ok(result) => result,
        Err(error) => ModuleRunResult::Failure { error },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleSpec;
    use serde_json::json;

    struct SlowModule;
    impl Module for SlowModule {
        fn id(&self) -> &str {
            "slow"
        }
        fn spec(&self) -> ModuleSpec {
            ModuleSpec { input_schemas: vec![], output_schemas: vec![] }
        }
        fn run(&self, _i: &ModuleInputs, _p: &Value, _c: &ModuleContext) -> ModuleRunResult {
            thread::sleep(Duration::from_millis(200));
            ModuleRunResult::Success { artifacts: vec![], cost: None }
        }
    }

    fn ctx() -> ModuleContext {
        ModuleContext { project_dir: std::path::PathBuf::from("."),
                        run_id: "r".to_string(),
                        stage_id: "s".to_string(),
                        runtime_params: json!({}),
                        announce_artifact: None }
    }

    #[test]
    fn timeout_is_reported_as_transient_failure() {
        let result = invoke_with_timeout(Arc::new(SlowModule),
                                         Arc::new(ModuleInputs::new()),
                                         json!({}),
                                         ctx(),
                                         Some(Duration::from_millis(10)));
        match result {
            ModuleRunResult::Failure { error: ModuleError::Transient(msg) } => {
                assert!(msg.contains("timed out"), "mensaje: {msg}");
            }
            other => panic!("se esperaba timeout transitorio, llegó {other:?}"),
        }
    }

    #[test]
    fn fast_module_completes_within_timeout() {
        let result = invoke_with_timeout(Arc::new(SlowModule),
                                         Arc::new(ModuleInputs::new()),
                                         json!({}),
                                         ctx(),
                                         Some(Duration::from_secs(5)));
        assert!(matches!(result, ModuleRunResult::Success { .. }));
    }
}
