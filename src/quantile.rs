//! Streaming quantile estimation
//!
//! The P² algorithm (Jain & Chlamtac, 1985): five markers per target
//! quantile, O(1) memory and update. Suitable for high-percentile
//! estimates (q >= ~0.9). Falls back to exact sample quantiles until five
//! samples have been seen. `compute_quantile` gives the exact
//! linear-interpolation quantile over a fixed buffer.

/// O(1) streaming estimator of a single quantile.
#[derive(Debug, Clone)]
pub struct P2Quantile {
    q: f64,
    /// Marker heights h[0..4]
    heights: [f64; 5],
    /// Marker positions n[0..4]
    positions: [i64; 5],
    /// Desired marker positions n'[0..4]
    desired: [f64; 5],
    /// Desired position increments dn[0..4]
    increments: [f64; 5],
    /// Initial sample buffer, used until five samples accumulate
    buffer: Vec<f64>,
    initialized: bool,
}

impl P2Quantile {
    /// Create an estimator for quantile `q` in (0, 1).
    pub fn new(q: f64) -> Self {
        assert!(q > 0.0 && q < 1.0, "q must be in (0,1)");
        Self {
            q,
            heights: [0.0; 5],
            positions: [0; 5],
            desired: [0.0; 5],
            increments: [0.0; 5],
            buffer: Vec::with_capacity(5),
            initialized: false,
        }
    }

    pub fn q(&self) -> f64 {
        self.q
    }

    /// Observe one sample.
    pub fn update(&mut self, x: f64) {
        if !self.initialized {
            self.buffer.push(x);
            if self.buffer.len() == 5 {
                self.buffer.sort_by(f64::total_cmp);
                for (i, v) in self.buffer.iter().enumerate() {
                    self.heights[i] = *v;
                }
                self.positions = [1, 2, 3, 4, 5];
                let q = self.q;
                self.desired = [1.0, 1.0 + 2.0 * q, 1.0 + 4.0 * q, 3.0 + 2.0 * q, 5.0];
                self.increments = [0.0, q / 2.0, q, (1.0 + q) / 2.0, 1.0];
                self.initialized = true;
            }
            return;
        }

        let h = &mut self.heights;
        let n = &mut self.positions;

        // Find the cell x falls into, widening the extremes as needed
        let k = if x < h[0] {
            h[0] = x;
            0
        } else if x >= h[4] {
            h[4] = x;
            3
        } else {
            let mut k = 0;
            while k < 4 && x >= h[k + 1] {
                k += 1;
            }
            k
        };

        for pos in n.iter_mut().skip(k + 1) {
            *pos += 1;
        }
        for (nd, dn) in self.desired.iter_mut().zip(self.increments.iter()) {
            *nd += dn;
        }

        // Adjust interior markers toward their desired positions
        for i in 1..4 {
            let d = self.desired[i] - n[i] as f64;
            let room_right = n[i + 1] - n[i] > 1;
            let room_left = n[i - 1] - n[i] < -1;
            if (d >= 1.0 && room_right) || (d <= -1.0 && room_left) {
                let step: i64 = if d > 0.0 { 1 } else { -1 };
                let candidate = Self::parabolic(i, step, h, n);
                h[i] = match candidate {
                    Some(hp) if h[i - 1] < hp && hp < h[i + 1] => hp,
                    _ => Self::linear(i, step, h, n),
                };
                n[i] += step;
            }
        }
    }

    /// Current quantile estimate (exact while fewer than five samples).
    pub fn value(&self) -> f64 {
        if !self.initialized {
            if self.buffer.is_empty() {
                return f64::NAN;
            }
            let mut data = self.buffer.clone();
            data.sort_by(f64::total_cmp);
            if data.len() == 1 {
                return data[0];
            }
            let idx = self.q * (data.len() - 1) as f64;
            let lo = idx as usize;
            let hi = (lo + 1).min(data.len() - 1);
            let frac = idx - lo as f64;
            return data[lo] + (data[hi] - data[lo]) * frac;
        }
        self.heights[2]
    }

    /// Parabolic (piecewise-P²) prediction for marker i moved by `step`.
    /// Returns None when a marker-position difference is zero, which would
    /// divide by zero; callers fall back to linear interpolation.
    fn parabolic(i: usize, step: i64, h: &[f64; 5], n: &[i64; 5]) -> Option<f64> {
        let (n0, n1, n2) = (n[i - 1] as f64, n[i] as f64, n[i + 1] as f64);
        let (h0, h1, h2) = (h[i - 1], h[i], h[i + 1]);
        if n2 - n0 == 0.0 || n2 - n1 == 0.0 || n1 - n0 == 0.0 {
            return None;
        }
        let d = step as f64;
        Some(
            h1 + d / (n2 - n0)
                * ((n1 - n0 + d) * (h2 - h1) / (n2 - n1) + (n2 - n1 - d) * (h1 - h0) / (n1 - n0)),
        )
    }

    /// Linear fallback. The adjustment precondition guarantees the
    /// denominator is nonzero.
    fn linear(i: usize, step: i64, h: &[f64; 5], n: &[i64; 5]) -> f64 {
        let j = (i as i64 + step) as usize;
        h[i] + step as f64 * (h[j] - h[i]) / (n[j] - n[i]) as f64
    }
}

/// Exact q-quantile of a buffer by linear interpolation on sorted values.
///
/// Empty input yields +inf so comparisons against it never alert.
pub fn compute_quantile<I>(values: I, q: f64) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut data: Vec<f64> = values.into_iter().collect();
    if data.is_empty() {
        return f64::INFINITY;
    }
    data.sort_by(f64::total_cmp);
    if data.len() == 1 {
        return data[0];
    }
    let position = q * (data.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        return data[lower];
    }
    let fraction = position - lower as f64;
    data[lower] + (data[upper] - data[lower]) * fraction
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Standard normal samples via Box-Muller over a seeded uniform stream.
    fn normal_samples(rng: &mut ChaCha8Rng, count: usize) -> Vec<f64> {
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            let u1: f64 = rng.random();
            let u2: f64 = rng.random();
            let r = (-2.0 * u1.max(1e-300).ln()).sqrt();
            let theta = 2.0 * std::f64::consts::PI * u2;
            out.push(r * theta.cos());
            if out.len() < count {
                out.push(r * theta.sin());
            }
        }
        out
    }

    #[test]
    fn test_fewer_than_five_samples_exact() {
        let mut est = P2Quantile::new(0.9);
        let samples = [5.0, 1.0, 3.0, 9.0];
        for s in samples {
            est.update(s);
        }
        // Interpolation over sorted [1,3,5,9]: idx = 0.9 * 3 = 2.7
        let expected = 5.0 + (9.0 - 5.0) * 0.7;
        assert!((est.value() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_empty_value_is_nan() {
        let est = P2Quantile::new(0.5);
        assert!(est.value().is_nan());
    }

    #[test]
    fn test_exact_after_five_initialization() {
        let mut est = P2Quantile::new(0.5);
        for s in [10.0, 2.0, 7.0, 4.0, 20.0] {
            est.update(s);
        }
        // Markers initialize to the sorted first five; the median marker
        // is the middle element
        assert_eq!(est.value(), 7.0);
    }

    #[test]
    fn test_constant_sequence() {
        let mut est = P2Quantile::new(0.9);
        for _ in 0..200 {
            est.update(42.0);
        }
        assert_eq!(est.value(), 42.0);
    }

    #[test]
    fn test_converges_on_uniform() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut est = P2Quantile::new(0.95);
        for _ in 0..10_000 {
            est.update(rng.random::<f64>());
        }
        let v = est.value();
        assert!(v > 0.93 && v < 0.97, "estimate was {v}");
    }

    #[test]
    fn test_converges_on_normal() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut est = P2Quantile::new(0.995);
        for x in normal_samples(&mut rng, 100_000) {
            est.update(x);
        }
        let v = est.value();
        // True 99.5th percentile of N(0,1) is ~2.576
        assert!(!v.is_nan());
        assert!((2.47..=2.67).contains(&v), "estimate was {v}");
    }

    #[test]
    fn test_tracks_mean_shift() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut est = P2Quantile::new(0.99);
        for x in normal_samples(&mut rng, 10_000) {
            est.update(x);
        }
        let before = est.value();
        for x in normal_samples(&mut rng, 2_000) {
            est.update(x + 2.0);
        }
        let after = est.value();
        // 99th of N(0,1) ~ 2.33; of N(2,1) ~ 4.33
        assert!(after > before);
        assert!(after - before > 1.0, "before={before} after={after}");
    }

    #[test]
    fn test_monotone_across_target_quantiles() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut lo = P2Quantile::new(0.9);
        let mut hi = P2Quantile::new(0.99);
        for _ in 0..5_000 {
            let x = rng.random::<f64>();
            lo.update(x);
            hi.update(x);
        }
        assert!(hi.value() >= lo.value() - 1e-6);
    }

    #[test]
    fn test_coverage_converges_on_stationary_stream() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let q = 0.992;
        let mut est = P2Quantile::new(q);
        let mut above = 0usize;
        let warmup = 5_000usize;
        let total = 20_000usize;
        for i in 0..warmup + total {
            let x = rng.random::<f64>();
            // Count exceedances against the running estimate, then update
            if i >= warmup && x > est.value() {
                above += 1;
            }
            est.update(x);
        }
        let observed = above as f64 / total as f64;
        let target = 1.0 - q;
        let relative_error = (observed - target).abs() / target;
        assert!(relative_error <= 0.5, "observed={observed} target={target}");
    }

    #[test]
    fn test_compute_quantile_literals() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(compute_quantile(v, 0.5), 2.5);
        assert_eq!(compute_quantile(v, 0.0), 1.0);
        assert!((compute_quantile(v, 0.999) - 4.0).abs() < 0.01);
        assert_eq!(compute_quantile([42.0], 0.2), 42.0);
        assert_eq!(compute_quantile(std::iter::empty::<f64>(), 0.5), f64::INFINITY);
    }

    #[test]
    fn test_compute_quantile_matches_p2_on_batch() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let q = 0.98;
        let data: Vec<f64> = (0..50_000).map(|_| rng.random::<f64>().powi(2)).collect();
        let mut est = P2Quantile::new(q);
        for &x in &data {
            est.update(x);
        }
        let exact = compute_quantile(data.iter().copied(), q);
        let approx = est.value();
        let err = (approx - exact).abs();
        assert!(err <= 0.02 * exact.abs() + 0.01, "exact={exact} approx={approx}");
    }
}
