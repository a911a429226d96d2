//! Orden topológico de stages.
//!
//! Kahn con desempate estable por orden de declaración: stages
//! independientes salen en el orden en que aparecen en la receta, para que
//! dos runs de la misma receta sean reproducibles.

use std::collections::{HashMap, HashSet};

use script_domain::Recipe;

use crate::errors::ValidationError;

/// Orden de ejecución que satisface `needs` + `needs_all` + `after`.
///
/// Asume ids de stage únicos y referencias conocidas (lo garantiza
/// `validate`); si el grafo tiene un ciclo devuelve el error que lo nombra.
pub fn resolve_execution_order(recipe: &Recipe) -> Result<Vec<String>, ValidationError> {
    let ids: Vec<&str> = recipe.stages.iter().map(|s| s.id.as_str()).collect();
    let known: HashSet<&str> = ids.iter().copied().collect();

    // upstream únicos: un mismo id puede aparecer en `needs` y en `after`
    let mut indegree: HashMap<&str, usize> = ids.iter().map(|id| (*id, 0)).collect();
    for stage in &recipe.stages {
        let unique: HashSet<&str> = stage.ordering_upstream().filter(|u| known.contains(u)).collect();
        indegree.insert(stage.id.as_str(), unique.len());
    }

    let mut emitted: Vec<String> = Vec::with_capacity(ids.len());
    let mut placed: HashSet<&str> = HashSet::new();
    while emitted.len() < ids.len() {
        // primer stage (en orden de declaración) sin upstream pendiente
        let next = recipe.stages
                         .iter()
                         .find(|s| !placed.contains(s.id.as_str()) && indegree[s.id.as_str()] == 0);
        let Some(stage) = next else {
            return Err(ValidationError::CycleDetected { cycle: name_cycle(recipe, &placed) });
        };
        placed.insert(stage.id.as_str());
        emitted.push(stage.id.clone());
        for other in &recipe.stages {
            if !placed.contains(other.id.as_str())
               && other.ordering_upstream().any(|u| u == stage.id)
            {
                if let Some(d) = indegree.get_mut(other.id.as_str()) {
                    *d = d.saturating_sub(1);
                }
            }
        }
    }
    Ok(emitted)
}

/// Reconstruye un ciclo entre los stages aún no emitidos para nombrarlo en
/// el error (`a -> b -> a`).
fn name_cycle(recipe: &Recipe, placed: &HashSet<&str>) -> String {
    let pending: Vec<&str> = recipe.stages
                                   .iter()
                                   .map(|s| s.id.as_str())
                                   .filter(|id| !placed.contains(id))
                                   .collect();
    let Some(start) = pending.first().copied() else {
        return String::from("<unknown>");
    };
    // caminar upstream dentro del conjunto pendiente hasta repetir un nodo
    let mut path: Vec<&str> = vec![start];
    let mut seen: HashSet<&str> = HashSet::new();
    seen.insert(start);
    let mut current = start;
    loop {
        let stage = match recipe.stage(current) {
            Some(s) => s,
            None => break,
        };
        let next = stage.ordering_upstream().find(|u| pending.contains(u));
        let Some(next) = next else { break };
        if !seen.insert(next) {
            // cerrar el ciclo desde la primera aparición de `next`
            let from = path.iter().position(|p| *p == next).unwrap_or(0);
            let mut cycle: Vec<&str> = path[from..].to_vec();
            cycle.push(next);
            cycle.reverse();
            return cycle.join(" -> ");
        }
        path.push(next);
        current = next;
    }
    pending.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use script_domain::Recipe;

    fn recipe(yaml: &str) -> Recipe {
        Recipe::from_yaml_str(yaml).expect("recipe parses")
    }

    #[test]
    fn order_is_topological_and_declaration_stable() {
        let r = recipe(r#"
recipe_id: r
stages:
  - id: a
    module: m
  - id: b
    module: m
  - id: c
    module: m
    needs: [a]
  - id: d
    module: m
    needs: [c]
    after: [b]
"#);
        let order = resolve_execution_order(&r).expect("acyclic");
        // a y b independientes: salen por declaración
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn repeated_upstream_in_needs_and_after_counts_once() {
        let r = recipe(r#"
recipe_id: r
stages:
  - id: a
    module: m
  - id: b
    module: m
    needs: [a]
    after: [a]
"#);
        assert_eq!(resolve_execution_order(&r).expect("acyclic"), vec!["a", "b"]);
    }

    #[test]
    fn needs_cycle_is_rejected_with_named_cycle() {
        let r = recipe(r#"
recipe_id: r
stages:
  - id: a
    module: m
    needs: [b]
  - id: b
    module: m
    needs: [a]
"#);
        let err = resolve_execution_order(&r).expect_err("cycle must fail");
        match err {
            ValidationError::CycleDetected { cycle } => {
                assert!(cycle.contains("a") && cycle.contains("b"), "cycle names both stages: {cycle}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn after_only_cycle_is_also_rejected() {
        let r = recipe(r#"
recipe_id: r
stages:
  - id: a
    module: m
    after: [b]
  - id: b
    module: m
    after: [a]
"#);
        assert!(matches!(resolve_execution_order(&r),
                         Err(ValidationError::CycleDetected { .. })));
    }
}
