use super::rolling::RollingMean;

/// Wilder's recursive smoothing: the first value is the simple mean of the
/// first `period` inputs, then `(prev * (period - 1) + x) / period`.
#[derive(Debug, Clone)]
pub struct WilderSmoother {
    period: usize,
    seed: RollingMean,
    value: Option<f64>,
}

impl WilderSmoother {
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "Wilder period must be > 0");
        Self {
            period,
            seed: RollingMean::new(period),
            value: None,
        }
    }

    pub fn push(&mut self, x: f64) -> Option<f64> {
        self.value = match self.value {
            Some(prev) => {
                let n = self.period as f64;
                Some((prev * (n - 1.0) + x) / n)
            }
            None => self.seed.push(x),
        };
        self.value
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn is_ready(&self) -> bool {
        self.value.is_some()
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_with_simple_mean_then_recurses() {
        let mut w = WilderSmoother::new(3);
        assert_eq!(w.push(3.0), None);
        assert_eq!(w.push(6.0), None);
        assert!((w.push(9.0).unwrap() - 6.0).abs() < 1e-12);
        // (6 * 2 + 12) / 3 = 8
        assert!((w.push(12.0).unwrap() - 8.0).abs() < 1e-12);
        assert!(w.is_ready());
    }
}
