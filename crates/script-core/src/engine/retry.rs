//! Política de retry/backoff/fallback por stage.
//!
//! El jitter es determinista: se deriva de blake3(run_id/stage_id/attempt)
//! en lugar de un RNG, así dos ejecuciones del mismo run calculan los mismos
//! delays y el motor sigue siendo reproducible.

use std::time::Duration;

use script_domain::ResilienceConfig;

use crate::hashing::hash_str;

/// Política efectiva para un stage concreto.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_seconds: f64,
    pub jitter_ratio: f64,
    pub attempt_timeout_seconds: f64,
    pub fallback_models: Vec<String>,
}

impl RetryPolicy {
    pub fn for_stage(resilience: &ResilienceConfig, stage_id: &str) -> Self {
        Self { max_retries: resilience.max_retries,
               base_delay_seconds: resilience.retry_base_delay_seconds,
               jitter_ratio: resilience.retry_jitter_ratio,
               attempt_timeout_seconds: resilience.attempt_timeout_seconds,
               fallback_models: resilience.stage_fallback_models
                                          .get(stage_id)
                                          .cloned()
                                          .unwrap_or_default() }
    }

    /// Intentos totales = primer intento + retries.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Timeout por intento; `None` si está deshabilitado (<= 0).
    pub fn attempt_timeout(&self) -> Option<Duration> {
        if self.attempt_timeout_seconds > 0.0 {
            Some(Duration::from_secs_f64(self.attempt_timeout_seconds))
        } else {
            None
        }
    }

    /// Modelo para el intento `attempt` (1-based): el primer intento usa el
    /// modelo por defecto del stage; cada retry avanza por la cadena de
    /// fallback (y se queda en el último si los retries la exceden).
    pub fn model_for_attempt(&self, default_model: Option<&str>, attempt: u32) -> Option<String> {
        if attempt <= 1 || self.fallback_models.is_empty() {
            return default_model.map(|m| m.to_string());
        }
        let idx = ((attempt - 2) as usize).min(self.fallback_models.len() - 1);
        Some(self.fallback_models[idx].clone())
    }

    /// Delay antes del retry que sigue al intento fallido `attempt`
    /// (1-based): `base * 2^(attempt-1)`, modulado por el jitter
    /// determinista en `[-ratio, +ratio]`.
    pub fn backoff_delay(&self, run_id: &str, stage_id: &str, attempt: u32) -> Duration {
        if self.base_delay_seconds <= 0.0 {
            return Duration::ZERO;
        }
        let exp = attempt.saturating_sub(1).min(16);
        let base = self.base_delay_seconds * f64::from(1u32 << exp);
        let factor = 1.0 + self.jitter_ratio * (2.0 * unit_jitter(run_id, stage_id, attempt) - 1.0);
        Duration::from_secs_f64((base * factor).max(0.0))
    }
}

/// Valor en [0,1) derivado del hash de `(run, stage, attempt)`.
fn unit_jitter(run_id: &str, stage_id: &str, attempt: u32) -> f64 {
    let digest = hash_str(&format!("{run_id}/{stage_id}/{attempt}"));
    let bucket = u32::from_str_radix(&digest[..8], 16).unwrap_or(0);
    f64::from(bucket) / (f64::from(u32::MAX) + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn policy(fallbacks: &[&str]) -> RetryPolicy {
        let mut map = BTreeMap::new();
        map.insert("s".to_string(), fallbacks.iter().map(|m| m.to_string()).collect());
        let res = ResilienceConfig { max_retries: 3,
                                     retry_base_delay_seconds: 1.0,
                                     retry_jitter_ratio: 0.25,
                                     attempt_timeout_seconds: 0.0,
                                     stage_fallback_models: map };
        RetryPolicy::for_stage(&res, "s")
    }

    #[test]
    fn fallback_chain_advances_per_retry_and_clamps_at_end() {
        let p = policy(&["model-b", "model-c"]);
        assert_eq!(p.model_for_attempt(Some("model-a"), 1), Some("model-a".to_string()));
        assert_eq!(p.model_for_attempt(Some("model-a"), 2), Some("model-b".to_string()));
        assert_eq!(p.model_for_attempt(Some("model-a"), 3), Some("model-c".to_string()));
        assert_eq!(p.model_for_attempt(Some("model-a"), 4), Some("model-c".to_string()));
    }

    #[test]
    fn without_fallbacks_every_attempt_keeps_default_model() {
        let p = policy(&[]);
        assert_eq!(p.model_for_attempt(Some("m"), 3), Some("m".to_string()));
        assert_eq!(p.model_for_attempt(None, 2), None);
    }

    #[test]
    fn backoff_is_exponential_with_bounded_jitter() {
        let p = policy(&[]);
        for attempt in 1..=3u32 {
            let d = p.backoff_delay("run", "s", attempt).as_secs_f64();
            let base = f64::from(1u32 << (attempt - 1));
            assert!(d >= base * 0.75 - 1e-9 && d <= base * 1.25 + 1e-9,
                    "attempt {attempt}: delay {d} fuera de la banda de jitter");
        }
        // determinista: mismas claves, mismo delay
        assert_eq!(p.backoff_delay("run", "s", 1), p.backoff_delay("run", "s", 1));
    }

    #[test]
    fn zero_base_delay_disables_sleeps() {
        let mut p = policy(&[]);
        p.base_delay_seconds = 0.0;
        assert_eq!(p.backoff_delay("r", "s", 5), Duration::ZERO);
    }
}
