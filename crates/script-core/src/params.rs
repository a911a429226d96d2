//! Fusión determinista de parámetros JSON.
//!
//! Merge "shallow": las claves de `overrides` reemplazan a las de `base`
//! cuando ambos son objetos. El orden fijo es: params del stage -> overrides
//! de runtime -> modelo elegido por la política de fallback. Mantenemos la
//! semántica simple y predecible; un deep-merge se puede añadir si algún
//! módulo lo necesita.

use serde_json::Value;

/// Merge shallow: claves de `overrides` pisan las de `base`. Cuando alguno
/// de los dos no es objeto, `overrides` tiene precedencia salvo que sea
/// `Null` (ausencia de overrides).
pub fn merge_json(base: &Value, overrides: &Value) -> Value {
    match (base, overrides) {
        (Value::Object(a), Value::Object(b)) => {
            let mut out = a.clone();
            for (k, v) in b.iter() {
                out.insert(k.clone(), v.clone());
            }
            Value::Object(out)
        }
        (a, Value::Null) => a.clone(),
        (Value::Null, b) => b.clone(),
        (_, other) => other.clone(),
    }
}
