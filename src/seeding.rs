//! Per-run seed generation.
//!
//! A batch of `runs` trials gets exactly one `u32` seed per run. Explicit
//! seeds are used as given when their count matches the run count; otherwise
//! seeds are drawn from a generator with a fixed seed so the fallback is
//! reproducible. `auto_seed` draws from a clock-seeded generator instead and
//! wins over any explicit list.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::warn;

/// Generator seed used when explicit seeds are missing or malformed.
pub const FALLBACK_GENERATOR_SEED: u64 = 99;

/// How the seeds of a batch are chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedPolicy {
    pub runs: usize,
    pub explicit: Option<Vec<u32>>,
    pub auto_seed: bool,
}

impl SeedPolicy {
    pub fn new(runs: usize, explicit: Option<Vec<u32>>, auto_seed: bool) -> Self {
        SeedPolicy {
            runs,
            explicit,
            auto_seed,
        }
    }

    /// Produce one seed per run.
    pub fn resolve(&self) -> Vec<u32> {
        self.resolve_with_clock(clock_generator_seed())
    }

    /// Same as [`resolve`](Self::resolve) with the auto-seed generator seeded
    /// from `clock_seed` instead of the wall clock.
    pub fn resolve_with_clock(&self, clock_seed: u64) -> Vec<u32> {
        if self.auto_seed {
            if let Some(seeds) = &self.explicit {
                if seeds.len() == self.runs {
                    warn!(
                        "auto_seed is enabled while a valid seed configuration was provided; \
                         auto_seed takes precedence and overrides {:?}",
                        seeds
                    );
                }
            }
            return draw_seeds(&mut StdRng::seed_from_u64(clock_seed), self.runs);
        }

        match &self.explicit {
            Some(seeds) if seeds.len() == self.runs => seeds.clone(),
            Some(seeds) => {
                warn!(
                    "{} seeds given for {} runs; falling back to generated seeds",
                    seeds.len(),
                    self.runs
                );
                fallback_seeds(self.runs)
            }
            None => fallback_seeds(self.runs),
        }
    }
}

/// Reproducible seeds used when no usable explicit list exists.
pub fn fallback_seeds(runs: usize) -> Vec<u32> {
    draw_seeds(&mut StdRng::seed_from_u64(FALLBACK_GENERATOR_SEED), runs)
}

fn draw_seeds(rng: &mut StdRng, runs: usize) -> Vec<u32> {
    (0..runs).map(|_| rng.random::<u32>()).collect()
}

fn clock_generator_seed() -> u64 {
    Utc::now().timestamp_micros() as u64
}

/// Random subsystems a run owns. Each one is seeded from the run seed alone,
/// so no state is shared between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subsystem {
    Environment,
    Learner,
}

impl Subsystem {
    fn stream(self) -> usize {
        match self {
            Subsystem::Environment => 0,
            Subsystem::Learner => 1,
        }
    }
}

/// Seeds for every random subsystem of one run, derived from its run seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSeeds {
    seed: u32,
}

impl RunSeeds {
    pub fn new(seed: u32) -> Self {
        RunSeeds { seed }
    }

    pub fn derive(&self, subsystem: Subsystem) -> u64 {
        let mut root = StdRng::seed_from_u64(u64::from(self.seed));
        for _ in 0..subsystem.stream() {
            root.next_u64();
        }
        root.next_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_seeds_are_used_verbatim() {
        let policy = SeedPolicy::new(3, Some(vec![11, 22, 33]), false);
        assert_eq!(policy.resolve(), vec![11, 22, 33]);
        assert_eq!(policy.resolve(), policy.resolve());
    }

    #[test]
    fn test_missing_seeds_fall_back_deterministically() {
        let a = SeedPolicy::new(4, None, false).resolve();
        let b = SeedPolicy::new(4, None, false).resolve();
        assert_eq!(a.len(), 4);
        assert_eq!(a, b);
        assert_eq!(a, fallback_seeds(4));
    }

    #[test]
    fn test_mismatched_seed_count_uses_fallback() {
        let seeds = SeedPolicy::new(3, Some(vec![1, 2]), false).resolve();
        assert_eq!(seeds, fallback_seeds(3));
    }

    #[test]
    fn test_fallback_prefix_is_stable_across_run_counts() {
        let short = fallback_seeds(2);
        let long = fallback_seeds(5);
        assert_eq!(&long[..2], &short[..]);
    }

    #[test]
    fn test_auto_seed_overrides_explicit_list() {
        let policy = SeedPolicy::new(2, Some(vec![11, 22]), true);
        let seeds = policy.resolve_with_clock(1_700_000_000);
        assert_eq!(seeds.len(), 2);
        assert_ne!(seeds, vec![11, 22]);
    }

    #[test]
    fn test_auto_seed_differs_between_clock_values() {
        let policy = SeedPolicy::new(4, None, true);
        let a = policy.resolve_with_clock(1_700_000_000_000_000);
        let b = policy.resolve_with_clock(1_700_000_000_000_001);
        assert_ne!(a, b);
    }

    #[test]
    fn test_auto_seed_differs_between_batches() {
        let policy = SeedPolicy::new(4, None, true);
        let a = policy.resolve();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = policy.resolve();
        assert_ne!(a, b);
    }

    #[test]
    fn test_fallback_seeds_are_distinct_in_practice() {
        let mut seeds = fallback_seeds(64);
        seeds.sort_unstable();
        seeds.dedup();
        assert_eq!(seeds.len(), 64);
    }

    #[test]
    fn test_run_seeds_derive_independent_streams() {
        let seeds = RunSeeds::new(11);
        let env = seeds.derive(Subsystem::Environment);
        let learner = seeds.derive(Subsystem::Learner);
        assert_ne!(env, learner);
        assert_eq!(env, RunSeeds::new(11).derive(Subsystem::Environment));
        assert_ne!(env, RunSeeds::new(22).derive(Subsystem::Environment));
    }
}
