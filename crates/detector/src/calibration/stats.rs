//! Streaming statistics for calibration captures

/// Min, max, mean and population standard deviation over raw counts
/// (Welford's online update)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsAccumulator {
    count: usize,
    min: u16,
    max: u16,
    mean: f64,
    m2: f64,
}

impl StatsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: u16) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        let x = f64::from(value);
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// 0 when empty
    pub fn min(&self) -> u16 {
        self.min
    }

    /// 0 when empty
    pub fn max(&self) -> u16 {
        self.max
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// NaN when empty
    pub fn stddev(&self) -> f64 {
        if self.count == 0 {
            return f64::NAN;
        }
        (self.m2 / self.count as f64).sqrt()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_known_values() {
        let mut stats = StatsAccumulator::new();
        for value in [2, 4, 4, 4, 5, 5, 7, 9] {
            stats.push(value);
        }
        assert_eq!(stats.count(), 8);
        assert_eq!(stats.min(), 2);
        assert_eq!(stats.max(), 9);
        assert_relative_eq!(stats.mean(), 5.0);
        assert_relative_eq!(stats.stddev(), 2.0);
    }

    #[test]
    fn test_empty_stddev_not_finite() {
        let stats = StatsAccumulator::new();
        assert!(stats.is_empty());
        assert!(!stats.stddev().is_finite());
    }

    #[test]
    fn test_matches_two_pass_on_noise() {
        let mut rng = StdRng::seed_from_u64(11);
        let samples: Vec<u16> = (0..5_000).map(|_| rng.random_range(15..=25)).collect();

        let mut stats = StatsAccumulator::new();
        samples.iter().for_each(|&v| stats.push(v));

        let n = samples.len() as f64;
        let mean = samples.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
        let var = samples
            .iter()
            .map(|&v| (f64::from(v) - mean).powi(2))
            .sum::<f64>()
            / n;
        assert_relative_eq!(stats.mean(), mean, epsilon = 1e-9);
        assert_relative_eq!(stats.stddev(), var.sqrt(), epsilon = 1e-9);
        assert!(stats.min() >= 15 && stats.max() <= 25);
    }
}
