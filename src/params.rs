//! Immutable operation descriptors.
//!
//! An [`OperationParameters`] value names the operation kind and carries
//! every scalar/vector setting that determines its behaviour. It is built once
//! per test case with the consuming `with_*` builders and never mutated.
//!
//! Range checks shared by several operations live here too. They return
//! `HarnessError::ParameterValidation` so backends and golden evaluators
//! report bad descriptors the same way.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// One named setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    IntList(Vec<i64>),
    Str(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::IntList(v) => write!(f, "{v:?}"),
            ParamValue::Str(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self { ParamValue::Bool(v) }
}
impl From<i64> for ParamValue {
    fn from(v: i64) -> Self { ParamValue::Int(v) }
}
impl From<i32> for ParamValue {
    fn from(v: i32) -> Self { ParamValue::Int(v as i64) }
}
impl From<usize> for ParamValue {
    fn from(v: usize) -> Self { ParamValue::Int(v as i64) }
}
impl From<f64> for ParamValue {
    fn from(v: f64) -> Self { ParamValue::Float(v) }
}
impl From<Vec<i64>> for ParamValue {
    fn from(v: Vec<i64>) -> Self { ParamValue::IntList(v) }
}
impl From<&str> for ParamValue {
    fn from(v: &str) -> Self { ParamValue::Str(v.to_string()) }
}

/// Operation kind plus its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationParameters {
    kind: String,
    values: BTreeMap<String, ParamValue>,
}

impl OperationParameters {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            values: BTreeMap::new(),
        }
    }

    /// Add or replace a setting. Consumes `self`, so a finished descriptor
    /// cannot be changed behind a live operation's back.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn int(&self, name: &str) -> HarnessResult<i64> {
        match self.values.get(name) {
            Some(ParamValue::Int(v)) => Ok(*v),
            Some(other) => Err(self.invalid(format!("{name} must be an integer, got {other}"))),
            None => Err(self.invalid(format!("missing required parameter {name}"))),
        }
    }

    pub fn int_or(&self, name: &str, default: i64) -> HarnessResult<i64> {
        if self.contains(name) {
            self.int(name)
        } else {
            Ok(default)
        }
    }

    pub fn float(&self, name: &str) -> HarnessResult<f64> {
        match self.values.get(name) {
            Some(ParamValue::Float(v)) => Ok(*v),
            Some(ParamValue::Int(v)) => Ok(*v as f64),
            Some(other) => Err(self.invalid(format!("{name} must be a number, got {other}"))),
            None => Err(self.invalid(format!("missing required parameter {name}"))),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> HarnessResult<bool> {
        match self.values.get(name) {
            Some(ParamValue::Bool(v)) => Ok(*v),
            Some(other) => Err(self.invalid(format!("{name} must be a bool, got {other}"))),
            None => Ok(default),
        }
    }

    pub fn int_list(&self, name: &str) -> HarnessResult<&[i64]> {
        match self.values.get(name) {
            Some(ParamValue::IntList(v)) => Ok(v),
            Some(other) => Err(self.invalid(format!("{name} must be an integer list, got {other}"))),
            None => Err(self.invalid(format!("missing required parameter {name}"))),
        }
    }

    /// A required integer that must be `>= 1`.
    pub fn positive(&self, name: &str) -> HarnessResult<usize> {
        let v = self.int(name)?;
        if v < 1 {
            return Err(self.invalid(format!("{name} must be >= 1, got {v}")));
        }
        usize::try_from(v).map_err(|_| self.invalid(format!("{name} exceeds usize")))
    }

    /// A required integer that must be `>= 0`.
    pub fn non_negative(&self, name: &str) -> HarnessResult<u64> {
        let v = self.int(name)?;
        u64::try_from(v).map_err(|_| self.invalid(format!("{name} must be >= 0, got {v}")))
    }

    /// Reject settings outside `allowed`, catching typos like `axsi`.
    pub fn expect_only(&self, allowed: &[&str]) -> HarnessResult<()> {
        for name in self.values.keys() {
            if !allowed.contains(&name.as_str()) {
                return Err(self.invalid(format!(
                    "unknown parameter {name} (accepted: {})",
                    allowed.join(", ")
                )));
            }
        }
        Ok(())
    }

    pub fn invalid(&self, reason: impl Into<String>) -> HarnessError {
        HarnessError::param(self.to_string(), reason)
    }
}

impl fmt::Display for OperationParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind)?;
        for (i, (k, v)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str(")")
    }
}

/// Check that an input buffer holds the expected number of elements.
#[inline]
pub fn validate_input_len(actual: usize, expected: usize, name: &str) -> Result<(), String> {
    if actual != expected {
        return Err(format!("{} len {} != expected {}", name, actual, expected));
    }
    Ok(())
}

/// Check the number of inputs handed to an operation.
#[inline]
pub fn validate_input_count(actual: usize, expected: usize) -> Result<(), String> {
    if actual != expected {
        return Err(format!("expected {} input tensor(s), got {}", expected, actual));
    }
    Ok(())
}
