//! Diff estructural recursivo entre payloads de dos versiones.
//!
//! Comparación clave a clave: objetos anidados recursan; valores no-objeto
//! que difieren se reportan en la clave más profunda que difiere.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    Added,
    Removed,
    Changed,
}

/// Una diferencia en una ruta concreta (`a.b.c`; raíz = cadena vacía).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub path: String,
    pub kind: DiffKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
}

/// Diff completo entre dos payloads.
pub fn diff_values(old: &Value, new: &Value) -> Vec<DiffEntry> {
    let mut out = Vec::new();
    walk("", old, new, &mut out);
    out
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn walk(path: &str, old: &Value, new: &Value, out: &mut Vec<DiffEntry>) {
    match (old, new) {
        (Value::Object(mo), Value::Object(mn)) => {
            // claves en orden determinista: primero las del viejo, luego las nuevas
            for (k, ov) in mo {
                match mn.get(k) {
                    Some(nv) => walk(&join(path, k), ov, nv, out),
                    None => out.push(DiffEntry { path: join(path, k),
                                                 kind: DiffKind::Removed,
                                                 old: Some(ov.clone()),
                                                 new: None }),
                }
            }
            for (k, nv) in mn {
                if !mo.contains_key(k) {
                    out.push(DiffEntry { path: join(path, k),
                                         kind: DiffKind::Added,
                                         old: None,
                                         new: Some(nv.clone()) });
                }
            }
        }
        (o, n) => {
            if o != n {
                out.push(DiffEntry { path: path.to_string(),
                                     kind: DiffKind::Changed,
                                     old: Some(o.clone()),
                                     new: Some(n.clone()) });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diff_reports_added_removed_changed_at_deepest_key() {
        let old = json!({"title": "v1", "scenes": {"count": 3, "night": true}, "gone": 1});
        let new = json!({"title": "v2", "scenes": {"count": 4, "night": true}, "fresh": [1, 2]});
        let diff = diff_values(&old, &new);

        let by_path = |p: &str| diff.iter().find(|d| d.path == p).cloned();
        let title = by_path("title").expect("title changed");
        assert_eq!(title.kind, DiffKind::Changed);
        assert_eq!(title.old, Some(json!("v1")));
        let count = by_path("scenes.count").expect("nested change at deepest key");
        assert_eq!(count.kind, DiffKind::Changed);
        assert_eq!(by_path("gone").unwrap().kind, DiffKind::Removed);
        assert_eq!(by_path("fresh").unwrap().kind, DiffKind::Added);
        // la clave sin cambios no aparece
        assert!(by_path("scenes.night").is_none());
    }

    #[test]
    fn diff_of_equal_values_is_empty() {
        let v = json!({"a": {"b": [1, 2]}});
        assert!(diff_values(&v, &v).is_empty());
    }

    #[test]
    fn non_object_roots_diff_at_root_path() {
        let diff = diff_values(&json!([1, 2]), &json!([1, 3]));
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].path, "");
        assert_eq!(diff[0].kind, DiffKind::Changed);
    }
}
