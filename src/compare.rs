//! Tolerance comparator.
//!
//! Compares actual outputs against golden outputs and produces a
//! [`TestVerdict`]. Structural disagreement (count, shape, dtype) is reported
//! through its own [`MismatchDetail`] variants and is decided before any value
//! is inspected, whatever the tolerance mode. Inputs are only borrowed.

use serde::{Deserialize, Serialize};

use crate::tensor::Tensor;
use crate::tolerance::ToleranceSpec;
use crate::types::DType;

/// Default number of offending elements listed in a tolerance violation.
pub const MAX_REPORTED_MISMATCHES: usize = 8;

/// One element outside tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementMismatch {
    pub flat_index: usize,
    pub coords: Vec<usize>,
    #[serde(with = "non_finite")]
    pub actual: f64,
    #[serde(with = "non_finite")]
    pub expected: f64,
    #[serde(with = "non_finite")]
    pub abs_diff: f64,
    #[serde(with = "non_finite")]
    pub allowed: f64,
}

/// JSON numbers cannot hold `inf` or `NaN`; those are written as the strings
/// `"inf"`, `"-inf"` and `"nan"` and read back as the same values.
mod non_finite {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_finite() {
            s.serialize_f64(*v)
        } else if v.is_nan() {
            s.serialize_str("nan")
        } else if *v > 0.0 {
            s.serialize_str("inf")
        } else {
            s.serialize_str("-inf")
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Tag(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        match Repr::deserialize(d)? {
            Repr::Number(v) => Ok(v),
            Repr::Tag(tag) => match tag.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                other => Err(D::Error::custom(format!(
                    "expected a number, \"inf\", \"-inf\" or \"nan\", got {other:?}"
                ))),
            },
        }
    }
}

/// Why a comparison failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MismatchDetail {
    /// Different number of output tensors.
    CountMismatch { expected: usize, actual: usize },
    /// Output `index` has the wrong shape.
    ShapeMismatch {
        index: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    /// Output `index` has an incompatible element type.
    DTypeMismatch {
        index: usize,
        expected: DType,
        actual: DType,
    },
    /// Values of output `index` differ beyond the policy.
    ToleranceViolation {
        index: usize,
        tolerance: String,
        mismatched: usize,
        total: usize,
        #[serde(with = "non_finite")]
        max_abs_diff: f64,
        #[serde(with = "non_finite")]
        max_rel_diff: f64,
        first: Vec<ElementMismatch>,
    },
    /// A stochastic output broke a structural expectation.
    StructuralViolation { index: usize, reason: String },
    /// Parts matched pairwise but do not reassemble into the source.
    ReassemblyMismatch { detail: Box<MismatchDetail> },
}

impl MismatchDetail {
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            MismatchDetail::CountMismatch { .. }
                | MismatchDetail::ShapeMismatch { .. }
                | MismatchDetail::DTypeMismatch { .. }
        )
    }

    /// One-line human summary for log lines and abort messages.
    pub fn summary(&self) -> String {
        match self {
            MismatchDetail::CountMismatch { expected, actual } => {
                format!("output count mismatch: expected {expected}, got {actual}")
            }
            MismatchDetail::ShapeMismatch { index, expected, actual } => {
                format!("output {index} shape mismatch: expected {expected:?}, got {actual:?}")
            }
            MismatchDetail::DTypeMismatch { index, expected, actual } => {
                format!("output {index} dtype mismatch: expected {expected}, got {actual}")
            }
            MismatchDetail::ToleranceViolation {
                index,
                tolerance,
                mismatched,
                total,
                max_abs_diff,
                first,
                ..
            } => {
                let head = first
                    .first()
                    .map(|m| {
                        format!(
                            "; first at {:?}: actual={} expected={} diff={:e} allowed={:e}",
                            m.coords, m.actual, m.expected, m.abs_diff, m.allowed
                        )
                    })
                    .unwrap_or_default();
                format!(
                    "output {index}: {mismatched}/{total} elements outside {tolerance}, max |diff|={max_abs_diff:e}{head}"
                )
            }
            MismatchDetail::StructuralViolation { index, reason } => {
                format!("output {index} structural check failed: {reason}")
            }
            MismatchDetail::ReassemblyMismatch { detail } => {
                format!("reassembled parts differ from source: {}", detail.summary())
            }
        }
    }
}

/// Outcome of one comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestVerdict {
    pub passed: bool,
    pub mismatch: Option<MismatchDetail>,
}

impl TestVerdict {
    pub fn pass() -> Self {
        Self { passed: true, mismatch: None }
    }

    pub fn fail(detail: MismatchDetail) -> Self {
        Self { passed: false, mismatch: Some(detail) }
    }

    pub fn is_shape_mismatch(&self) -> bool {
        matches!(
            self.mismatch,
            Some(MismatchDetail::ShapeMismatch { .. }) | Some(MismatchDetail::CountMismatch { .. })
        )
    }

    pub fn is_tolerance_violation(&self) -> bool {
        matches!(self.mismatch, Some(MismatchDetail::ToleranceViolation { .. }))
    }
}

/// Integer value constraints for outputs that cannot be compared
/// elementwise (seeded sampling and the like).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralExpectation {
    pub shape: Vec<usize>,
    pub dtype: DType,
    /// Every value must lie in `[lo, hi)`.
    pub range: (i64, i64),
    /// Optional per-row mask: row `r` may only contain `v` where `support[r][v]`.
    pub support: Option<Vec<Vec<bool>>>,
    /// Values within a row must not repeat.
    pub distinct_per_row: bool,
}

/// Tolerance comparator.
#[derive(Debug, Clone, Copy)]
pub struct Comparator {
    max_reported: usize,
}

impl Default for Comparator {
    fn default() -> Self {
        Self { max_reported: MAX_REPORTED_MISMATCHES }
    }
}

impl Comparator {
    pub fn new(max_reported: usize) -> Self {
        Self { max_reported }
    }

    /// Compare one tensor pair.
    pub fn compare(&self, actual: &Tensor, golden: &Tensor, spec: &ToleranceSpec) -> TestVerdict {
        match self.compare_at(0, actual, golden, spec) {
            Some(detail) => TestVerdict::fail(detail),
            None => TestVerdict::pass(),
        }
    }

    /// Compare two ordered tensor sequences.
    pub fn compare_all(&self, actual: &[Tensor], golden: &[Tensor], spec: &ToleranceSpec) -> TestVerdict {
        if actual.len() != golden.len() {
            return TestVerdict::fail(MismatchDetail::CountMismatch {
                expected: golden.len(),
                actual: actual.len(),
            });
        }
        // Structure first for every output, so a bad shape on output 1 is not
        // masked by a value mismatch on output 0.
        for (i, (a, g)) in actual.iter().zip(golden).enumerate() {
            if let Some(detail) = structural_mismatch(i, a, g, spec) {
                return TestVerdict::fail(detail);
            }
        }
        for (i, (a, g)) in actual.iter().zip(golden).enumerate() {
            if let Some(detail) = self.compare_values(i, a, g, spec) {
                return TestVerdict::fail(detail);
            }
        }
        TestVerdict::pass()
    }

    /// Move/permutation check for operations that relocate data without
    /// arithmetic: `parts` must match `expected_parts` pairwise and in order,
    /// and concatenating `parts` along `axis` must reproduce `source`.
    pub fn compare_decomposition(
        &self,
        parts: &[Tensor],
        expected_parts: &[Tensor],
        source: &Tensor,
        axis: usize,
        spec: &ToleranceSpec,
    ) -> TestVerdict {
        let pairwise = self.compare_all(parts, expected_parts, spec);
        if !pairwise.passed {
            return pairwise;
        }
        let reassembled = match Tensor::concat(source.name(), parts, axis) {
            Ok(t) => t,
            Err(err) => {
                return TestVerdict::fail(MismatchDetail::ReassemblyMismatch {
                    detail: Box::new(MismatchDetail::StructuralViolation {
                        index: 0,
                        reason: err.to_string(),
                    }),
                })
            }
        };
        match self.compare_at(0, &reassembled, source, spec) {
            Some(detail) => TestVerdict::fail(MismatchDetail::ReassemblyMismatch {
                detail: Box::new(detail),
            }),
            None => TestVerdict::pass(),
        }
    }

    /// Structural validation for outputs without an elementwise golden.
    pub fn check_structure(&self, actual: &[Tensor], expectations: &[StructuralExpectation]) -> TestVerdict {
        if actual.len() != expectations.len() {
            return TestVerdict::fail(MismatchDetail::CountMismatch {
                expected: expectations.len(),
                actual: actual.len(),
            });
        }
        for (i, (t, exp)) in actual.iter().zip(expectations).enumerate() {
            if let Some(detail) = check_one_structure(i, t, exp) {
                return TestVerdict::fail(detail);
            }
        }
        TestVerdict::pass()
    }

    fn compare_at(&self, index: usize, actual: &Tensor, golden: &Tensor, spec: &ToleranceSpec) -> Option<MismatchDetail> {
        structural_mismatch(index, actual, golden, spec)
            .or_else(|| self.compare_values(index, actual, golden, spec))
    }

    fn compare_values(&self, index: usize, actual: &Tensor, golden: &Tensor, spec: &ToleranceSpec) -> Option<MismatchDetail> {
        let total = golden.numel();
        let mut mismatched = 0usize;
        let mut max_abs_diff = 0.0f64;
        let mut max_rel_diff = 0.0f64;
        let mut first = Vec::new();

        for i in 0..total {
            let ok = if spec.is_exact() {
                actual.bits(i) == golden.bits(i)
            } else {
                spec.allows(actual.value_f64(i), golden.value_f64(i))
            };
            if ok {
                continue;
            }
            let a = actual.value_f64(i);
            let g = golden.value_f64(i);
            let abs_diff = (a - g).abs();
            mismatched += 1;
            if abs_diff > max_abs_diff || abs_diff.is_nan() {
                max_abs_diff = abs_diff;
            }
            if g != 0.0 {
                let rel = abs_diff / g.abs();
                if rel > max_rel_diff || rel.is_nan() {
                    max_rel_diff = rel;
                }
            } else if abs_diff > 0.0 {
                max_rel_diff = f64::INFINITY;
            }
            if first.len() < self.max_reported {
                first.push(ElementMismatch {
                    flat_index: i,
                    coords: golden.coords(i),
                    actual: a,
                    expected: g,
                    abs_diff,
                    allowed: spec.allowed_diff(g),
                });
            }
        }

        if mismatched == 0 {
            return None;
        }
        Some(MismatchDetail::ToleranceViolation {
            index,
            tolerance: spec.to_string(),
            mismatched,
            total,
            max_abs_diff,
            max_rel_diff,
            first,
        })
    }
}

fn structural_mismatch(index: usize, actual: &Tensor, golden: &Tensor, spec: &ToleranceSpec) -> Option<MismatchDetail> {
    if actual.shape() != golden.shape() {
        return Some(MismatchDetail::ShapeMismatch {
            index,
            expected: golden.shape().to_vec(),
            actual: actual.shape().to_vec(),
        });
    }
    let dtype_ok = if spec.is_exact() {
        actual.dtype() == golden.dtype()
    } else {
        actual.dtype().is_compatible_with(golden.dtype())
    };
    if !dtype_ok {
        return Some(MismatchDetail::DTypeMismatch {
            index,
            expected: golden.dtype(),
            actual: actual.dtype(),
        });
    }
    None
}

fn check_one_structure(index: usize, t: &Tensor, exp: &StructuralExpectation) -> Option<MismatchDetail> {
    if t.shape() != exp.shape.as_slice() {
        return Some(MismatchDetail::ShapeMismatch {
            index,
            expected: exp.shape.clone(),
            actual: t.shape().to_vec(),
        });
    }
    if t.dtype() != exp.dtype {
        return Some(MismatchDetail::DTypeMismatch {
            index,
            expected: exp.dtype,
            actual: t.dtype(),
        });
    }
    let violation = |reason: String| Some(MismatchDetail::StructuralViolation { index, reason });

    let (lo, hi) = exp.range;
    let row_len = t.shape().last().copied().unwrap_or(1).max(1);
    for i in 0..t.numel() {
        let raw = t.value_f64(i);
        if raw.fract() != 0.0 {
            return violation(format!("element {:?} = {raw} is not integral", t.coords(i)));
        }
        let v = raw as i64;
        if v < lo || v >= hi {
            return violation(format!("element {:?} = {v} outside [{lo}, {hi})", t.coords(i)));
        }
        if let Some(support) = &exp.support {
            let row = i / row_len;
            let allowed = support.get(row).and_then(|r| r.get(v as usize)).copied().unwrap_or(false);
            if !allowed {
                return violation(format!("row {row} sampled index {v} which has zero probability"));
            }
        }
    }
    if exp.distinct_per_row {
        for (row, chunk) in t.to_f64_vec().chunks(row_len).enumerate() {
            let mut seen: Vec<i64> = chunk.iter().map(|&v| v as i64).collect();
            seen.sort_unstable();
            if seen.windows(2).any(|w| w[0] == w[1]) {
                return violation(format!("row {row} repeats an index"));
            }
        }
    }
    None
}

/// Compare with the default comparator.
pub fn compare(actual: &Tensor, golden: &Tensor, spec: &ToleranceSpec) -> TestVerdict {
    Comparator::default().compare(actual, golden, spec)
}

/// Compare sequences with the default comparator.
pub fn compare_all(actual: &[Tensor], golden: &[Tensor], spec: &ToleranceSpec) -> TestVerdict {
    Comparator::default().compare_all(actual, golden, spec)
}
