//! Deterministic random number generation.
//!
//! RULE: nothing in the pipeline may call a platform RNG.
//! All randomness flows through a `SimulationRng` derived from an
//! explicit seed, so every Monte Carlo run is reproducible.
//!
//! Streams are derived from (seed XOR stream_index), which means a new
//! consumer never shifts the draws of existing ones.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

pub struct SimulationRng {
    inner: Pcg64Mcg,
    /// Second Box–Muller variate, kept for the next normal draw.
    spare_normal: Option<f64>,
}

impl SimulationRng {
    pub fn new(seed: u64) -> Self {
        Self::for_stream(seed, 0)
    }

    /// Derive an independent stream from a base seed and a stable index.
    pub fn for_stream(seed: u64, stream_index: u64) -> Self {
        let derived_seed = seed ^ (stream_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
            spare_normal: None,
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        use rand::RngCore;
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Standard normal draw (Box–Muller).
    pub fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.spare_normal.take() {
            return z;
        }
        let u1 = self.next_f64().max(1e-300);
        let u2 = self.next_f64();
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f64::consts::PI * u2;
        self.spare_normal = Some(radius * theta.sin());
        radius * theta.cos()
    }

    pub fn normal(&mut self, mean: f64, std_dev: f64) -> f64 {
        mean + std_dev * self.standard_normal()
    }
}
