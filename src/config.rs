//! Harness configuration.
//!
//! Loaded from defaults or JSON, then optionally overridden from the process
//! environment. The environment is only read, never written; the resulting
//! value is handed to the driver explicitly.

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backend::{parse_device, BackendSelection, DEVICE_ENV};
use crate::benchmark::BenchmarkConfig;
use crate::compare::MAX_REPORTED_MISMATCHES;
use crate::error::{HarnessError, HarnessResult};
use crate::tolerance::ToleranceSpec;

pub const WARMUP_ENV: &str = "KVERIFY_WARMUP";
pub const ITERS_ENV: &str = "KVERIFY_ITERS";
pub const SKIP_BENCH_ENV: &str = "KVERIFY_SKIP_BENCH_ON_FAIL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub backend: BackendSelection,
    /// Tolerance for cases that do not set their own.
    pub tolerance: ToleranceSpec,
    pub benchmark: BenchmarkConfig,
    /// Skip timing for cases whose verdict failed.
    pub skip_benchmark_on_failure: bool,
    pub max_reported_mismatches: usize,
    /// Number of leading values shown in debug previews.
    pub log_values: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            backend: BackendSelection::default(),
            tolerance: ToleranceSpec::default(),
            benchmark: BenchmarkConfig::default(),
            skip_benchmark_on_failure: false,
            max_reported_mismatches: MAX_REPORTED_MISMATCHES,
            log_values: 8,
        }
    }
}

impl HarnessConfig {
    pub fn from_json_str(json: &str) -> HarnessResult<Self> {
        let config: HarnessConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> HarnessResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> HarnessResult<()> {
        self.benchmark.validate()
    }

    /// Apply `KVERIFY_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> HarnessResult<Self> {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> HarnessResult<Self> {
        if let Some(device) = lookup(DEVICE_ENV) {
            self.backend = parse_device(&device)?;
        }
        if let Some(v) = lookup(WARMUP_ENV) {
            self.benchmark.warmup_iterations = parse_count(WARMUP_ENV, &v)?;
        }
        if let Some(v) = lookup(ITERS_ENV) {
            self.benchmark.measured_iterations = parse_count(ITERS_ENV, &v)?;
        }
        if let Some(v) = lookup(SKIP_BENCH_ENV) {
            self.skip_benchmark_on_failure = parse_flag(SKIP_BENCH_ENV, &v)?;
        }
        self.validate()?;
        Ok(self)
    }
}

fn parse_count(key: &str, value: &str) -> HarnessResult<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| HarnessError::InvalidConfig(format!("{key}={value:?} is not a count")))
}

fn parse_flag(key: &str, value: &str) -> HarnessResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(HarnessError::InvalidConfig(format!("{key}={value:?} is not a flag"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::backend::BackendType;
    use crate::tolerance::ToleranceMode;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let c = HarnessConfig::default();
        assert_eq!(c.backend.backend, BackendType::Cpu);
        assert_eq!(c.benchmark.warmup_iterations, 5);
        assert_eq!(c.benchmark.measured_iterations, 20);
        assert!(!c.skip_benchmark_on_failure);
    }

    #[test]
    fn test_partial_json() {
        let c = HarnessConfig::from_json_str(
            r#"{"tolerance": {"mode": "absolute", "atol": 0.5}, "benchmark": {"measured_iterations": 3}}"#,
        )
        .unwrap();
        assert_eq!(c.tolerance.mode(), ToleranceMode::Absolute);
        assert_eq!(c.benchmark.measured_iterations, 3);
        assert_eq!(c.benchmark.warmup_iterations, 5);
    }

    #[test]
    fn test_json_rejects_invalid_values() {
        assert!(HarnessConfig::from_json_str(r#"{"benchmark": {"measured_iterations": 0}}"#).is_err());
        assert!(HarnessConfig::from_json_str(r#"{"tolerance": {"rtol": -1.0}}"#).is_err());
        assert!(matches!(HarnessConfig::from_json_str("{"), Err(HarnessError::Json(_))));
    }

    #[test]
    fn test_overrides() {
        let c = HarnessConfig::default()
            .with_overrides(lookup(&[
                (DEVICE_ENV, "cuda:2"),
                (WARMUP_ENV, "1"),
                (ITERS_ENV, "4"),
                (SKIP_BENCH_ENV, "true"),
            ]))
            .unwrap();
        assert_eq!(c.backend, BackendSelection { backend: BackendType::Cuda, ordinal: 2 });
        assert_eq!(c.benchmark.warmup_iterations, 1);
        assert_eq!(c.benchmark.measured_iterations, 4);
        assert!(c.skip_benchmark_on_failure);
    }

    #[test]
    fn test_bad_overrides() {
        let base = HarnessConfig::default;
        assert!(matches!(
            base().with_overrides(lookup(&[(DEVICE_ENV, "gpu")])),
            Err(HarnessError::InvalidBackendOverride(_))
        ));
        assert!(base().with_overrides(lookup(&[(ITERS_ENV, "many")])).is_err());
        assert!(base().with_overrides(lookup(&[(ITERS_ENV, "0")])).is_err());
        assert!(base().with_overrides(lookup(&[(SKIP_BENCH_ENV, "maybe")])).is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let c = HarnessConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(HarnessConfig::from_json_str(&json).unwrap(), c);
    }
}
