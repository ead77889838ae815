//! Chaos plugins: injected latency and random error responses.

mod latency;
mod random_error;

pub use latency::{LatencyConfig, LatencyPlugin, LATENCY_PLUGIN_NAME};
pub use random_error::{
    ErrorTemplate, RandomErrorConfig, RandomErrorPlugin, RANDOM_ERROR_PLUGIN_NAME,
};

use rand::Rng;

/// What a chaos plugin does to one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChaosDecision {
    None,
    Latency { duration_ms: u64 },
    Error { template: usize },
}

/// Delay uniformly drawn from `min_ms..=max_ms`.
pub fn decide_latency(config: &LatencyConfig, rng: &mut impl Rng) -> ChaosDecision {
    let (low, high) = if config.min_ms <= config.max_ms {
        (config.min_ms, config.max_ms)
    } else {
        (config.max_ms, config.min_ms)
    };
    if high == 0 {
        return ChaosDecision::None;
    }
    ChaosDecision::Latency {
        duration_ms: rng.gen_range(low..=high),
    }
}

/// Fail with probability `rate`% using a random template.
pub fn decide_error(config: &RandomErrorConfig, rng: &mut impl Rng) -> ChaosDecision {
    if config.errors.is_empty() || !should_inject(f64::from(config.rate) / 100.0, rng) {
        return ChaosDecision::None;
    }
    ChaosDecision::Error {
        template: rng.gen_range(0..config.errors.len()),
    }
}

fn should_inject(probability: f64, rng: &mut impl Rng) -> bool {
    rng.gen::<f64>() < probability
}
