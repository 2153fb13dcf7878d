//! Compensated accumulation for reference computations.
//!
//! Reference paths accumulate in f64 with Kahan compensation so their own
//! rounding error stays well below any tolerance applied to device output.

/// Kahan compensated summation.
///
/// Tracks a compensation term `c` holding the low-order bits lost by each
/// addition and feeds it back into the next one. Rounding error stays O(1)
/// instead of growing with the number of terms.
#[derive(Debug, Clone, Copy, Default)]
pub struct KahanAccumulator {
    sum: f64,
    /// Compensation term for lost low-order bits.
    c: f64,
}

impl KahanAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add(&mut self, x: f64) {
        let y = x - self.c;
        let t = self.sum + y;
        self.c = (t - self.sum) - y;
        self.sum = t;
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.sum
    }

    /// Sum with the pending compensation applied.
    #[inline]
    pub fn corrected_value(&self) -> f64 {
        self.sum - self.c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kahan_sum_precision() {
        let mut kahan = KahanAccumulator::new();
        let mut naive = 0.0f64;
        for _ in 0..1_000_000 {
            kahan.add(0.1);
            naive += 0.1;
        }
        let expected = 100_000.0;
        let kahan_err = (kahan.corrected_value() - expected).abs();
        let naive_err = (naive - expected).abs();
        assert!(kahan_err < naive_err, "kahan {kahan_err} vs naive {naive_err}");
        assert!(kahan_err < 1e-6);
    }

    #[test]
    fn test_kahan_sum_large_small() {
        let mut kahan = KahanAccumulator::new();
        kahan.add(1e16);
        for _ in 0..1000 {
            kahan.add(1.0);
        }
        kahan.add(-1e16);
        assert!((kahan.corrected_value() - 1000.0).abs() < 1.0);
    }
}
