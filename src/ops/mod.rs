//! Operation kinds understood by the built-in backend and reference registry.
//!
//! Each kind has a config type parsed from [`OperationParameters`]. Parsing
//! checks everything that does not depend on the inputs (types, ranges,
//! unknown keys); checks against input rank happen at execution time.

pub mod chunk;
pub mod cumsum;
pub mod multinomial;

use crate::error::HarnessResult;
use crate::params::OperationParameters;

/// Inclusive prefix sum along one axis.
pub const CUMSUM: &str = "cumsum";
/// Split into contiguous chunks along one axis.
pub const CHUNK: &str = "chunk";
/// Seeded categorical sampling from (unnormalized) row weights.
pub const MULTINOMIAL: &str = "multinomial";

/// Upper bound on samples per row, and on samples per launch across rows.
pub const MAX_SAMPLES: usize = 1 << 24;

/// Settings for [`CUMSUM`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CumsumConfig {
    pub axis: i64,
}

impl CumsumConfig {
    pub fn from_params(params: &OperationParameters) -> HarnessResult<Self> {
        expect_kind(params, CUMSUM)?;
        params.expect_only(&["axis"])?;
        Ok(Self { axis: params.int("axis")? })
    }
}

/// Settings for [`CHUNK`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    pub chunks: usize,
    pub axis: i64,
}

impl ChunkConfig {
    pub fn from_params(params: &OperationParameters) -> HarnessResult<Self> {
        expect_kind(params, CHUNK)?;
        params.expect_only(&["chunks", "axis"])?;
        Ok(Self {
            chunks: params.positive("chunks")?,
            axis: params.int_or("axis", 0)?,
        })
    }
}

/// Settings for [`MULTINOMIAL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultinomialConfig {
    pub num_samples: usize,
    pub seed: u64,
    pub replacement: bool,
}

impl MultinomialConfig {
    pub fn from_params(params: &OperationParameters) -> HarnessResult<Self> {
        expect_kind(params, MULTINOMIAL)?;
        params.expect_only(&["num_samples", "seed", "replacement"])?;
        let num_samples = params.positive("num_samples")?;
        if num_samples > MAX_SAMPLES {
            return Err(params.invalid(format!("num_samples must be <= {MAX_SAMPLES}, got {num_samples}")));
        }
        Ok(Self {
            num_samples,
            seed: params.non_negative("seed")?,
            replacement: params.bool_or("replacement", true)?,
        })
    }
}

fn expect_kind(params: &OperationParameters, kind: &str) -> HarnessResult<()> {
    if params.kind() != kind {
        return Err(params.invalid(format!("expected a {kind} descriptor")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HarnessError;

    #[test]
    fn test_cumsum_config() {
        let p = OperationParameters::new(CUMSUM).with("axis", -1);
        assert_eq!(CumsumConfig::from_params(&p).unwrap().axis, -1);
        assert!(CumsumConfig::from_params(&OperationParameters::new(CUMSUM)).is_err());
    }

    #[test]
    fn test_chunk_config_defaults_axis() {
        let p = OperationParameters::new(CHUNK).with("chunks", 3);
        let c = ChunkConfig::from_params(&p).unwrap();
        assert_eq!(c, ChunkConfig { chunks: 3, axis: 0 });
        let zero = OperationParameters::new(CHUNK).with("chunks", 0);
        assert!(matches!(
            ChunkConfig::from_params(&zero),
            Err(HarnessError::ParameterValidation { .. })
        ));
    }

    #[test]
    fn test_multinomial_config() {
        let p = OperationParameters::new(MULTINOMIAL).with("num_samples", 1).with("seed", 42);
        let c = MultinomialConfig::from_params(&p).unwrap();
        assert_eq!(c, MultinomialConfig { num_samples: 1, seed: 42, replacement: true });
        let neg = OperationParameters::new(MULTINOMIAL).with("num_samples", 1).with("seed", -1);
        assert!(MultinomialConfig::from_params(&neg).is_err());
    }

    #[test]
    fn test_multinomial_sample_count_bounded() {
        let at_cap = OperationParameters::new(MULTINOMIAL).with("num_samples", MAX_SAMPLES).with("seed", 0);
        assert_eq!(MultinomialConfig::from_params(&at_cap).unwrap().num_samples, MAX_SAMPLES);
        for n in [MAX_SAMPLES as i64 + 1, i64::MAX] {
            let p = OperationParameters::new(MULTINOMIAL).with("num_samples", n).with("seed", 0);
            match MultinomialConfig::from_params(&p) {
                Err(HarnessError::ParameterValidation { reason, .. }) => assert!(reason.contains("num_samples")),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let p = OperationParameters::new(CHUNK).with("axis", 0);
        assert!(CumsumConfig::from_params(&p).is_err());
    }
}
