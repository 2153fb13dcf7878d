//! Element types and tensor placement.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Data type for tensor elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    F32,
    F64,
    F16,
    BF16,
    I32,
    I64,
}

impl DType {
    /// Size in bytes per element.
    pub const fn size_bytes(self) -> usize {
        match self {
            Self::F64 | Self::I64 => 8,
            Self::F32 | Self::I32 => 4,
            Self::F16 | Self::BF16 => 2,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64 | Self::F16 | Self::BF16)
    }

    /// Float dtypes compare with float dtypes, integers with integers.
    pub const fn is_compatible_with(self, other: DType) -> bool {
        self.is_float() == other.is_float()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::I32 => "i32",
            Self::I64 => "i64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a tensor's data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    Host,
    Device(u32),
}

impl Location {
    pub fn is_device(self) -> bool {
        matches!(self, Location::Device(_))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Host => f.write_str("host"),
            Location::Device(ordinal) => write!(f, "device:{ordinal}"),
        }
    }
}

/// Resolve a possibly negative axis against `rank`.
pub fn normalize_axis(axis: i64, rank: usize) -> Option<usize> {
    let rank_i = rank as i64;
    let resolved = if axis < 0 { axis + rank_i } else { axis };
    if (0..rank_i).contains(&resolved) {
        Some(resolved as usize)
    } else {
        None
    }
}

/// Split `shape` around `axis` into (outer, axis_len, inner) element counts.
pub fn split_at_axis(shape: &[usize], axis: usize) -> (usize, usize, usize) {
    let outer: usize = shape[..axis].iter().product();
    let inner: usize = shape[axis + 1..].iter().product();
    (outer, shape[axis], inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_sizes() {
        assert_eq!(DType::F32.size_bytes(), 4);
        assert_eq!(DType::BF16.size_bytes(), 2);
        assert_eq!(DType::I64.size_bytes(), 8);
    }

    #[test]
    fn test_dtype_compatibility() {
        assert!(DType::F16.is_compatible_with(DType::F32));
        assert!(DType::I32.is_compatible_with(DType::I64));
        assert!(!DType::F32.is_compatible_with(DType::I64));
    }

    #[test]
    fn test_normalize_axis() {
        assert_eq!(normalize_axis(1, 2), Some(1));
        assert_eq!(normalize_axis(-1, 2), Some(1));
        assert_eq!(normalize_axis(-2, 2), Some(0));
        assert_eq!(normalize_axis(2, 2), None);
        assert_eq!(normalize_axis(-3, 2), None);
        assert_eq!(normalize_axis(0, 0), None);
    }

    #[test]
    fn test_split_at_axis() {
        assert_eq!(split_at_axis(&[2, 3, 4], 1), (2, 3, 4));
        assert_eq!(split_at_axis(&[6, 6], 0), (1, 6, 6));
        assert_eq!(split_at_axis(&[2, 16], 1), (2, 16, 1));
    }

    #[test]
    fn test_dtype_serde_names() {
        let json = serde_json::to_string(&DType::BF16).unwrap();
        assert_eq!(json, "\"bf16\"");
        let parsed: DType = serde_json::from_str("\"i64\"").unwrap();
        assert_eq!(parsed, DType::I64);
    }
}
