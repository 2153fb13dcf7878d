//! Numeric tolerance policies.
//!
//! Precision presets follow the per-dtype bounds used by the GPU-vs-CPU
//! comparison suites:
//! - FP32: rtol=1e-5, atol=1e-6
//! - FP16: rtol=1e-3, atol=1e-4
//! - BF16: rtol=1e-2, atol=1e-3

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};
use crate::types::DType;

/// How two elements are judged equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToleranceMode {
    /// Bit-for-bit equality.
    Exact,
    /// `|a - g| <= atol`
    Absolute,
    /// `|a - g| <= rtol * |g|`; a zero golden element requires a zero actual.
    Relative,
    /// `|a - g| <= atol + rtol * |g|`
    #[default]
    Combined,
}

/// A validated tolerance policy. `atol` and `rtol` are finite and `>= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawToleranceSpec")]
pub struct ToleranceSpec {
    mode: ToleranceMode,
    atol: f64,
    rtol: f64,
}

#[derive(Deserialize)]
struct RawToleranceSpec {
    #[serde(default)]
    mode: ToleranceMode,
    #[serde(default)]
    atol: f64,
    #[serde(default)]
    rtol: f64,
}

impl TryFrom<RawToleranceSpec> for ToleranceSpec {
    type Error = HarnessError;

    fn try_from(raw: RawToleranceSpec) -> Result<Self, Self::Error> {
        ToleranceSpec::new(raw.mode, raw.atol, raw.rtol)
    }
}

impl Default for ToleranceSpec {
    fn default() -> Self {
        ToleranceSpec {
            mode: ToleranceMode::Combined,
            atol: 1e-5,
            rtol: 1e-5,
        }
    }
}

impl ToleranceSpec {
    pub fn new(mode: ToleranceMode, atol: f64, rtol: f64) -> HarnessResult<Self> {
        for (label, v) in [("atol", atol), ("rtol", rtol)] {
            if !v.is_finite() || v < 0.0 {
                return Err(HarnessError::InvalidConfig(format!(
                    "{label} must be finite and >= 0, got {v}"
                )));
            }
        }
        Ok(Self { mode, atol, rtol })
    }

    pub fn exact() -> Self {
        Self { mode: ToleranceMode::Exact, atol: 0.0, rtol: 0.0 }
    }

    pub fn absolute(atol: f64) -> HarnessResult<Self> {
        Self::new(ToleranceMode::Absolute, atol, 0.0)
    }

    pub fn relative(rtol: f64) -> HarnessResult<Self> {
        Self::new(ToleranceMode::Relative, 0.0, rtol)
    }

    pub fn combined(atol: f64, rtol: f64) -> HarnessResult<Self> {
        Self::new(ToleranceMode::Combined, atol, rtol)
    }

    /// Default precision bounds for outputs of `dtype`.
    pub fn for_dtype(dtype: DType) -> Self {
        let (atol, rtol) = match dtype {
            DType::F64 => (1e-12, 1e-9),
            DType::F32 => (1e-6, 1e-5),
            DType::F16 => (1e-4, 1e-3),
            DType::BF16 => (1e-3, 1e-2),
            DType::I32 | DType::I64 => return Self::exact(),
        };
        Self { mode: ToleranceMode::Combined, atol, rtol }
    }

    #[inline]
    pub fn mode(&self) -> ToleranceMode { self.mode }
    #[inline]
    pub fn atol(&self) -> f64 { self.atol }
    #[inline]
    pub fn rtol(&self) -> f64 { self.rtol }

    pub fn is_exact(&self) -> bool {
        self.mode == ToleranceMode::Exact
    }

    /// Largest admissible `|actual - golden|` for this golden value.
    #[inline]
    pub fn allowed_diff(&self, golden: f64) -> f64 {
        match self.mode {
            ToleranceMode::Exact => 0.0,
            ToleranceMode::Absolute => self.atol,
            ToleranceMode::Relative => self.rtol * golden.abs(),
            ToleranceMode::Combined => self.atol + self.rtol * golden.abs(),
        }
    }

    /// Judge one pair of widened values. Exact mode is decided on bit
    /// patterns by the comparator, so here it degrades to `==`.
    #[inline]
    pub fn allows(&self, actual: f64, golden: f64) -> bool {
        if actual == golden {
            return true;
        }
        if actual.is_nan() || golden.is_nan() {
            return false;
        }
        match self.mode {
            ToleranceMode::Exact => false,
            ToleranceMode::Relative if golden == 0.0 => false,
            _ => (actual - golden).abs() <= self.allowed_diff(golden),
        }
    }
}

impl fmt::Display for ToleranceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ToleranceMode::Exact => write!(f, "exact"),
            ToleranceMode::Absolute => write!(f, "absolute(atol={:e})", self.atol),
            ToleranceMode::Relative => write!(f, "relative(rtol={:e})", self.rtol),
            ToleranceMode::Combined => write!(f, "combined(atol={:e}, rtol={:e})", self.atol, self.rtol),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_negative_and_nan() {
        assert!(ToleranceSpec::combined(-1e-3, 0.0).is_err());
        assert!(ToleranceSpec::combined(0.0, f64::NAN).is_err());
        assert!(ToleranceSpec::absolute(f64::INFINITY).is_err());
        assert!(ToleranceSpec::combined(0.0, 0.0).is_ok());
    }

    #[test]
    fn test_combined_boundary() {
        let spec = ToleranceSpec::combined(0.5, 0.25).unwrap();
        // threshold for golden=1.0 is 0.75
        assert!(spec.allows(1.75, 1.0));
        assert!(spec.allows(0.25, 1.0));
        assert!(!spec.allows(1.750_000_1, 1.0));
    }

    #[test]
    fn test_relative_zero_golden() {
        let spec = ToleranceSpec::relative(0.1).unwrap();
        assert!(spec.allows(0.0, 0.0));
        assert!(spec.allows(-0.0, 0.0));
        assert!(!spec.allows(1e-30, 0.0));
        assert!(spec.allows(1.05, 1.0));
        assert!(!spec.allows(1.2, 1.0));
    }

    #[test]
    fn test_absolute_ignores_magnitude() {
        let spec = ToleranceSpec::absolute(0.01).unwrap();
        assert!(spec.allows(1000.005, 1000.0));
        assert!(!spec.allows(1000.02, 1000.0));
    }

    #[test]
    fn test_nan_and_inf() {
        let spec = ToleranceSpec::combined(1.0, 1.0).unwrap();
        assert!(!spec.allows(f64::NAN, f64::NAN));
        assert!(!spec.allows(1.0, f64::NAN));
        assert!(spec.allows(f64::INFINITY, f64::INFINITY));
        assert!(!spec.allows(f64::NEG_INFINITY, f64::INFINITY));
    }

    #[test]
    fn test_for_dtype_presets() {
        let s = ToleranceSpec::for_dtype(DType::F16);
        assert_eq!(s.mode(), ToleranceMode::Combined);
        assert_eq!(s.rtol(), 1e-3);
        assert_eq!(s.atol(), 1e-4);
        assert!(ToleranceSpec::for_dtype(DType::I64).is_exact());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: ToleranceSpec =
            serde_json::from_str(r#"{"mode":"absolute","atol":0.1}"#).unwrap();
        assert_eq!(ok.mode(), ToleranceMode::Absolute);
        assert_eq!(ok.rtol(), 0.0);
        let bad = serde_json::from_str::<ToleranceSpec>(r#"{"mode":"combined","atol":-1.0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_display() {
        let s = ToleranceSpec::combined(1e-2, 1e-2).unwrap();
        assert_eq!(s.to_string(), "combined(atol=1e-2, rtol=1e-2)");
    }
}
