//! Named, typed, shaped tensors with a placement tag.
//!
//! Shape and dtype are fixed at construction: the fields are private and no
//! method mutates them. Moving a tensor between host and device goes through
//! [`Tensor::with_location`], which the [`crate::operation::Device`]
//! implementations use for their transfer interface.

use half::{bf16, f16};

use crate::error::{HarnessError, HarnessResult};
use crate::params::validate_input_len;
use crate::types::{split_at_axis, DType, Location};

/// Typed element storage.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Vec<f32>),
    F64(Vec<f64>),
    F16(Vec<f16>),
    BF16(Vec<bf16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
}

/// Evaluate `$body` with `$v` bound to the inner vector, whatever the variant.
macro_rules! with_data {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            TensorData::F32($v) => $body,
            TensorData::F64($v) => $body,
            TensorData::F16($v) => $body,
            TensorData::BF16($v) => $body,
            TensorData::I32($v) => $body,
            TensorData::I64($v) => $body,
        }
    };
}

/// Like `with_data!` but rewraps the produced vector in the same variant.
macro_rules! map_data {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            TensorData::F32($v) => TensorData::F32($body),
            TensorData::F64($v) => TensorData::F64($body),
            TensorData::F16($v) => TensorData::F16($body),
            TensorData::BF16($v) => TensorData::BF16($body),
            TensorData::I32($v) => TensorData::I32($body),
            TensorData::I64($v) => TensorData::I64($body),
        }
    };
}

macro_rules! gather_from_parts {
    ($variant:ident, $parts:expr, $picks:expr) => {{
        let slices: Option<Vec<&[_]>> = $parts
            .iter()
            .map(|d| match d {
                TensorData::$variant(v) => Some(v.as_slice()),
                _ => None,
            })
            .collect();
        slices.map(|s| TensorData::$variant($picks.iter().map(|&(p, i)| s[p][i]).collect()))
    }};
}

impl TensorData {
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::F32,
            TensorData::F64(_) => DType::F64,
            TensorData::F16(_) => DType::F16,
            TensorData::BF16(_) => DType::BF16,
            TensorData::I32(_) => DType::I32,
            TensorData::I64(_) => DType::I64,
        }
    }

    pub fn len(&self) -> usize {
        with_data!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::F32 => TensorData::F32(vec![0.0; len]),
            DType::F64 => TensorData::F64(vec![0.0; len]),
            DType::F16 => TensorData::F16(vec![f16::ZERO; len]),
            DType::BF16 => TensorData::BF16(vec![bf16::ZERO; len]),
            DType::I32 => TensorData::I32(vec![0; len]),
            DType::I64 => TensorData::I64(vec![0; len]),
        }
    }

    /// Cast f64 values into storage of `dtype`. Integer targets truncate.
    pub fn from_f64(dtype: DType, values: &[f64]) -> Self {
        match dtype {
            DType::F32 => TensorData::F32(values.iter().map(|&v| v as f32).collect()),
            DType::F64 => TensorData::F64(values.to_vec()),
            DType::F16 => TensorData::F16(values.iter().map(|&v| f16::from_f64(v)).collect()),
            DType::BF16 => TensorData::BF16(values.iter().map(|&v| bf16::from_f64(v)).collect()),
            DType::I32 => TensorData::I32(values.iter().map(|&v| v as i32).collect()),
            DType::I64 => TensorData::I64(values.iter().map(|&v| v as i64).collect()),
        }
    }

    /// Element `i` widened to f64.
    #[inline]
    pub fn value_f64(&self, i: usize) -> f64 {
        match self {
            TensorData::F32(v) => v[i] as f64,
            TensorData::F64(v) => v[i],
            TensorData::F16(v) => v[i].to_f64(),
            TensorData::BF16(v) => v[i].to_f64(),
            TensorData::I32(v) => v[i] as f64,
            TensorData::I64(v) => v[i] as f64,
        }
    }

    /// Raw bit pattern of element `i`, for exact comparison.
    #[inline]
    pub fn bits(&self, i: usize) -> u64 {
        match self {
            TensorData::F32(v) => v[i].to_bits() as u64,
            TensorData::F64(v) => v[i].to_bits(),
            TensorData::F16(v) => v[i].to_bits() as u64,
            TensorData::BF16(v) => v[i].to_bits() as u64,
            TensorData::I32(v) => v[i] as u32 as u64,
            TensorData::I64(v) => v[i] as u64,
        }
    }

    /// Pick elements by flat index into a new buffer of the same dtype.
    pub fn gather(&self, indices: &[usize]) -> TensorData {
        map_data!(self, v => indices.iter().map(|&i| v[i]).collect())
    }

    /// Pick `(part, index)` elements from several buffers of one dtype.
    fn gather_many(parts: &[&TensorData], picks: &[(usize, usize)]) -> Option<TensorData> {
        let first = parts.first()?;
        match first.dtype() {
            DType::F32 => gather_from_parts!(F32, parts, picks),
            DType::F64 => gather_from_parts!(F64, parts, picks),
            DType::F16 => gather_from_parts!(F16, parts, picks),
            DType::BF16 => gather_from_parts!(BF16, parts, picks),
            DType::I32 => gather_from_parts!(I32, parts, picks),
            DType::I64 => gather_from_parts!(I64, parts, picks),
        }
    }
}

/// A named multi-dimensional array.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    name: String,
    shape: Vec<usize>,
    data: TensorData,
    location: Location,
}

impl Tensor {
    /// Create a host tensor, checking that `data` matches `shape`.
    pub fn new(name: impl Into<String>, shape: Vec<usize>, data: TensorData) -> HarnessResult<Self> {
        let name = name.into();
        validate_input_len(data.len(), shape.iter().product(), &name)
            .map_err(|reason| HarnessError::InvalidTensor(format!("{reason} for shape {shape:?}")))?;
        Ok(Self {
            name,
            shape,
            data,
            location: Location::Host,
        })
    }

    pub fn from_f32(name: impl Into<String>, shape: Vec<usize>, values: Vec<f32>) -> HarnessResult<Self> {
        Self::new(name, shape, TensorData::F32(values))
    }

    pub fn from_i64(name: impl Into<String>, shape: Vec<usize>, values: Vec<i64>) -> HarnessResult<Self> {
        Self::new(name, shape, TensorData::I64(values))
    }

    /// Build a tensor of `dtype` from f64 values.
    pub fn from_f64_values(
        name: impl Into<String>,
        shape: Vec<usize>,
        dtype: DType,
        values: &[f64],
    ) -> HarnessResult<Self> {
        Self::new(name, shape, TensorData::from_f64(dtype, values))
    }

    pub fn zeros(name: impl Into<String>, shape: Vec<usize>, dtype: DType) -> Self {
        let len = shape.iter().product();
        Self {
            name: name.into(),
            shape,
            data: TensorData::zeros(dtype, len),
            location: Location::Host,
        }
    }

    #[inline]
    pub fn name(&self) -> &str { &self.name }
    #[inline]
    pub fn shape(&self) -> &[usize] { &self.shape }
    #[inline]
    pub fn rank(&self) -> usize { self.shape.len() }
    #[inline]
    pub fn dtype(&self) -> DType { self.data.dtype() }
    #[inline]
    pub fn data(&self) -> &TensorData { &self.data }
    #[inline]
    pub fn location(&self) -> Location { self.location }
    #[inline]
    pub fn is_device(&self) -> bool { self.location.is_device() }
    #[inline]
    pub fn numel(&self) -> usize { self.data.len() }

    pub fn into_data(self) -> TensorData {
        self.data
    }

    /// Row-major strides in elements.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.shape.len()];
        for d in (0..self.shape.len().saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * self.shape[d + 1];
        }
        strides
    }

    /// Multi-dimensional coordinates of flat index `flat`.
    pub fn coords(&self, flat: usize) -> Vec<usize> {
        let mut rem = flat;
        self.strides()
            .iter()
            .map(|&s| {
                let c = rem / s;
                rem %= s;
                c
            })
            .collect()
    }

    #[inline]
    pub fn value_f64(&self, i: usize) -> f64 {
        self.data.value_f64(i)
    }

    #[inline]
    pub fn bits(&self, i: usize) -> u64 {
        self.data.bits(i)
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.numel()).map(|i| self.data.value_f64(i)).collect()
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.data {
            TensorData::I64(v) => Some(v),
            _ => None,
        }
    }

    /// Same tensor, re-tagged. Shape and dtype are carried over unchanged.
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// New host tensor built from the elements at `indices`.
    pub fn gather(&self, name: impl Into<String>, shape: Vec<usize>, indices: &[usize]) -> HarnessResult<Tensor> {
        Tensor::new(name, shape, self.data.gather(indices))
    }

    /// Concatenate `parts` along `axis` into a host tensor.
    ///
    /// All parts must share rank, dtype and every extent except `axis`.
    pub fn concat(name: impl Into<String>, parts: &[Tensor], axis: usize) -> HarnessResult<Tensor> {
        let first = parts
            .first()
            .ok_or_else(|| HarnessError::InvalidTensor("concat of zero tensors".into()))?;
        if axis >= first.rank() {
            return Err(HarnessError::InvalidTensor(format!(
                "concat axis {axis} out of range for rank {}",
                first.rank()
            )));
        }
        let mut out_shape = first.shape.clone();
        out_shape[axis] = 0;
        for part in parts {
            if part.dtype() != first.dtype() {
                return Err(HarnessError::InvalidTensor(format!(
                    "concat dtype mismatch: {} vs {}",
                    part.dtype(),
                    first.dtype()
                )));
            }
            let compatible = part.rank() == first.rank()
                && part
                    .shape
                    .iter()
                    .zip(&first.shape)
                    .enumerate()
                    .all(|(d, (a, b))| d == axis || a == b);
            if !compatible {
                return Err(HarnessError::ShapeMismatch {
                    expected: first.shape.clone(),
                    actual: part.shape.clone(),
                });
            }
            out_shape[axis] += part.shape[axis];
        }

        let (outer, _, inner) = split_at_axis(&first.shape, axis);
        let total: usize = out_shape.iter().product();
        let mut picks = Vec::with_capacity(total);
        for o in 0..outer {
            for (p, part) in parts.iter().enumerate() {
                let block = part.shape[axis] * inner;
                let base = o * block;
                picks.extend((base..base + block).map(|i| (p, i)));
            }
        }
        let datas: Vec<&TensorData> = parts.iter().map(|p| &p.data).collect();
        let data = TensorData::gather_many(&datas, &picks)
            .ok_or_else(|| HarnessError::InvalidTensor("concat dtype mismatch".into()))?;
        Tensor::new(name, out_shape, data)
    }

    /// Short rendering of the leading values for log lines.
    pub fn preview(&self, max: usize) -> String {
        let shown: Vec<String> = (0..self.numel().min(max))
            .map(|i| {
                if self.dtype().is_float() {
                    format!("{:.4}", self.value_f64(i))
                } else {
                    format!("{}", self.value_f64(i) as i64)
                }
            })
            .collect();
        let ellipsis = if self.numel() > max { ", ..." } else { "" };
        format!(
            "{}{:?}<{}>@{} [{}{}]",
            self.name,
            self.shape,
            self.dtype(),
            self.location,
            shown.join(", "),
            ellipsis
        )
    }
}
