use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Outcome of sampling one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleDecision {
    /// Send; the event stands for this many observed records.
    Keep(u32),
    Discard,
}

/// Keeps each record with probability `1 / rate`.
///
/// The random source is seeded once and shared by every producer.
#[derive(Debug)]
pub struct Sampler {
    rate: u32,
    rng: Mutex<StdRng>,
}

impl Sampler {
    pub fn new(rate: u32, seed: u64) -> Self {
        Self {
            rate: rate.max(1),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Seed from the current time.
    pub fn from_clock(rate: u32) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self::new(rate, seed)
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn decide(&self) -> SampleDecision {
        if self.rate == 1 {
            return SampleDecision::Keep(1);
        }
        let hit = match self.rng.lock() {
            Ok(mut rng) => rng.random_range(0..self.rate) == 0,
            Err(poisoned) => poisoned.into_inner().random_range(0..self.rate) == 0,
        };
        if hit {
            SampleDecision::Keep(self.rate)
        } else {
            SampleDecision::Discard
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_one_keeps_everything() {
        let sampler = Sampler::new(1, 7);
        assert!((0..1000).all(|_| sampler.decide() == SampleDecision::Keep(1)));
    }

    #[test]
    fn test_rate_n_keeps_about_one_in_n() {
        let sampler = Sampler::new(20, 1);
        let kept: Vec<_> = (0..10_000)
            .map(|_| sampler.decide())
            .filter(|d| *d != SampleDecision::Discard)
            .collect();

        assert!((400..=600).contains(&kept.len()), "kept {}", kept.len());
        assert!(kept.iter().all(|d| *d == SampleDecision::Keep(20)));
    }

    #[test]
    fn test_same_seed_same_decisions() {
        let a = Sampler::new(5, 99);
        let b = Sampler::new(5, 99);
        let run_a: Vec<_> = (0..200).map(|_| a.decide()).collect();
        let run_b: Vec<_> = (0..200).map(|_| b.decide()).collect();
        assert_eq!(run_a, run_b);
    }

    #[test]
    fn test_zero_rate_is_clamped() {
        assert_eq!(Sampler::new(0, 1).rate(), 1);
    }
}
