//! JSON tensor loading.
//!
//! Two layouts are accepted and told apart up front:
//!
//! ```text
//! {"dtype": "f32", "shape": [2, 2], "data": [...]}            raw tensor
//! {"tensors": {"x": {"dtype": ..., "shape": ..., "data": ...}}} named container
//! ```
//!
//! The layout is decided from the top-level keys before parsing; a document
//! that fails as one layout is never retried as the other.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{HarnessError, HarnessResult};
use crate::tensor::Tensor;
use crate::types::DType;

#[derive(Debug, Clone, PartialEq)]
pub enum LoadedTensors {
    Single(Tensor),
    Named(BTreeMap<String, Tensor>),
}

impl LoadedTensors {
    /// All tensors, container entries in key order.
    pub fn into_vec(self) -> Vec<Tensor> {
        match self {
            LoadedTensors::Single(t) => vec![t],
            LoadedTensors::Named(map) => map.into_values().collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TensorRecord {
    dtype: DType,
    shape: Vec<usize>,
    data: Vec<f64>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Container {
    tensors: BTreeMap<String, TensorRecord>,
}

impl TensorRecord {
    fn into_tensor(self, fallback_name: &str) -> HarnessResult<Tensor> {
        let name = self.name.unwrap_or_else(|| fallback_name.to_string());
        if let Some((lo, hi)) = integer_bounds(self.dtype) {
            if let Some(bad) = self.data.iter().find(|v| v.fract() != 0.0 || !v.is_finite()) {
                return Err(HarnessError::Load(format!("{name}: {bad} is not an integer")));
            }
            if let Some(bad) = self.data.iter().find(|&&v| v < lo || v > hi) {
                return Err(HarnessError::Load(format!(
                    "{name}: {bad} is outside the {} range [{lo}, {hi}]",
                    self.dtype
                )));
            }
        }
        Tensor::from_f64_values(name.as_str(), self.shape, self.dtype, &self.data)
            .map_err(|e| HarnessError::Load(e.to_string()))
    }
}

/// Values an integer dtype accepts from JSON. `i64` is limited to the
/// integers an f64 holds exactly.
fn integer_bounds(dtype: DType) -> Option<(f64, f64)> {
    const EXACT_F64_INT: f64 = 9_007_199_254_740_992.0;
    match dtype {
        DType::I32 => Some((i32::MIN as f64, i32::MAX as f64)),
        DType::I64 => Some((-EXACT_F64_INT, EXACT_F64_INT)),
        _ => None,
    }
}

pub fn load_from_str(json: &str) -> HarnessResult<LoadedTensors> {
    let value: Value = serde_json::from_str(json).map_err(|e| HarnessError::Load(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| HarnessError::Load("top level must be a JSON object".into()))?;

    if object.contains_key("tensors") {
        let container: Container =
            serde_json::from_value(value).map_err(|e| HarnessError::Load(format!("container: {e}")))?;
        let named = container
            .tensors
            .into_iter()
            .map(|(key, record)| record.into_tensor(&key).map(|t| (key, t)))
            .collect::<HarnessResult<BTreeMap<_, _>>>()?;
        log::debug!("loaded container with {} tensor(s)", named.len());
        Ok(LoadedTensors::Named(named))
    } else if object.contains_key("data") {
        let record: TensorRecord =
            serde_json::from_value(value).map_err(|e| HarnessError::Load(format!("raw tensor: {e}")))?;
        Ok(LoadedTensors::Single(record.into_tensor("tensor")?))
    } else {
        Err(HarnessError::Load(
            "unrecognized layout: expected a \"tensors\" or \"data\" key".into(),
        ))
    }
}

pub fn load_from_path(path: impl AsRef<Path>) -> HarnessResult<LoadedTensors> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    log::debug!("loading tensors from {}", path.display());
    load_from_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_tensor() {
        let t = match load_from_str(r#"{"dtype":"f32","shape":[2,2],"data":[1,2,3,4]}"#).unwrap() {
            LoadedTensors::Single(t) => t,
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(t.name(), "tensor");
        assert_eq!(t.as_f32().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_container() {
        let json = r#"{"tensors": {
            "w": {"dtype":"bf16","shape":[2],"data":[0.5,1.5]},
            "idx": {"dtype":"i64","shape":[3],"data":[0,1,2]}
        }}"#;
        match load_from_str(json).unwrap() {
            LoadedTensors::Named(map) => {
                assert_eq!(map.len(), 2);
                assert_eq!(map["w"].dtype(), DType::BF16);
                assert_eq!(map["idx"].as_i64().unwrap(), &[0, 1, 2]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unrecognized_layout() {
        assert!(matches!(load_from_str(r#"{"values":[1]}"#), Err(HarnessError::Load(_))));
        assert!(matches!(load_from_str("[1, 2]"), Err(HarnessError::Load(_))));
        assert!(matches!(load_from_str("not json"), Err(HarnessError::Load(_))));
    }

    #[test]
    fn test_container_errors_are_not_retried_as_raw() {
        // Has both keys: treated as a container only, and the bad container fails.
        let json = r#"{"tensors": 3, "dtype":"f32","shape":[1],"data":[1]}"#;
        let err = load_from_str(json).unwrap_err();
        assert!(err.to_string().contains("container"));
    }

    #[test]
    fn test_shape_and_integer_validation() {
        assert!(load_from_str(r#"{"dtype":"f32","shape":[3],"data":[1,2]}"#).is_err());
        assert!(load_from_str(r#"{"dtype":"i32","shape":[1],"data":[1.5]}"#).is_err());
    }

    #[test]
    fn test_integer_range_rejected_not_saturated() {
        let err = load_from_str(r#"{"dtype":"i32","shape":[1],"data":[3000000000]}"#).unwrap_err();
        assert!(matches!(err, HarnessError::Load(_)));
        assert!(err.to_string().contains("3000000000"), "{err}");
        assert!(load_from_str(r#"{"dtype":"i32","shape":[1],"data":[-2147483649]}"#).is_err());
        assert!(load_from_str(r#"{"dtype":"i64","shape":[1],"data":[1e19]}"#).is_err());
        let err = load_from_str(r#"{"tensors":{"w":{"dtype":"i32","shape":[2],"data":[1,4294967296]}}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("w:"), "{err}");

        let edge = load_from_str(r#"{"dtype":"i32","shape":[2],"data":[2147483647,-2147483648]}"#).unwrap();
        match edge {
            LoadedTensors::Single(t) => assert_eq!(t.to_f64_vec(), vec![2147483647.0, -2147483648.0]),
            other => panic!("unexpected layout {other:?}"),
        }
        assert!(load_from_str(r#"{"dtype":"i64","shape":[1],"data":[3000000000]}"#).is_ok());
    }
}
