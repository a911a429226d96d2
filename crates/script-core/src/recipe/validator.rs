//! Validación estática de una receta contra el catálogo de módulos.
//!
//! Todo error aquí es fatal antes de ejecutar: ningún stage corre y el
//! storage no se toca.

use std::collections::HashSet;

use script_domain::Recipe;

use crate::errors::ValidationError;
use crate::module::{ModuleRegistry, SchemaRegistry};
use crate::recipe::order::resolve_execution_order;

/// Valida la receta completa. Chequeos, en orden:
/// - hay al menos un stage y los ids no se repiten;
/// - cada `module` existe en el registro;
/// - toda referencia `needs`/`needs_all`/`after` apunta a un stage declarado;
/// - ningún upstream aparece a la vez como dependencia de datos y como
///   store_input (cableado ambiguo);
/// - el grafo conjunto `needs + needs_all + after` es acíclico;
/// - para cada arista de datos, los output schemas del productor incluyen al
///   menos uno compatible con los input schemas del consumidor (`after`
///   exento).
pub fn validate(recipe: &Recipe, modules: &ModuleRegistry, schemas: &SchemaRegistry) -> Result<(), ValidationError> {
    if recipe.stages.is_empty() {
        return Err(ValidationError::EmptyRecipe);
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for stage in &recipe.stages {
        if !seen.insert(stage.id.as_str()) {
            return Err(ValidationError::DuplicateStage { stage: stage.id.clone() });
        }
    }

    for stage in &recipe.stages {
        if !modules.contains(&stage.module) {
            return Err(ValidationError::UnknownModule { stage: stage.id.clone(),
                                                        module: stage.module.clone() });
        }
    }

    for stage in &recipe.stages {
        for reference in stage.ordering_upstream() {
            if !seen.contains(reference) {
                return Err(ValidationError::UnknownStageRef { stage: stage.id.clone(),
                                                             reference: reference.to_string() });
            }
        }
        for key in stage.store_inputs.keys().chain(stage.store_inputs_optional.keys()) {
            if stage.data_upstream().any(|u| u == key.as_str()) {
                return Err(ValidationError::AmbiguousWiring { stage: stage.id.clone(),
                                                              upstream: key.clone() });
            }
        }
    }

    // aciclicidad conjunta (needs + needs_all + after) antes que schemas:
    // un ciclo se reporta como ciclo aunque sus aristas además no tipen
    resolve_execution_order(recipe)?;

    for consumer in &recipe.stages {
        let consumer_spec = modules.spec(&consumer.module)
                                   .ok_or_else(|| ValidationError::UnknownModule { stage: consumer.id.clone(),
                                                                                   module: consumer.module.clone() })?;
        for producer_id in consumer.data_upstream() {
            let Some(producer) = recipe.stage(producer_id) else {
                continue; // ya reportado arriba
            };
            let Some(producer_spec) = modules.spec(&producer.module) else {
                continue;
            };
            let any_compatible = producer_spec.output_schemas
                                              .iter()
                                              .any(|out| {
                                                  consumer_spec.input_schemas
                                                               .iter()
                                                               .any(|inp| schemas.compatible(out, inp))
                                              });
            if !any_compatible {
                return Err(ValidationError::SchemaMismatch { consumer: consumer.id.clone(),
                                                             producer: producer_id.to_string() });
            }
        }
    }

    Ok(())
}
