//! Per-run results and their reduction across a batch.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A reward together with the timestep at which it was reached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPair {
    pub reward: f64,
    pub step: u64,
}

/// What one finished trial hands back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub run_index: usize,
    pub seed: u32,
    /// Best single evaluation-episode reward.
    pub best: Option<MetricPair>,
    /// Best mean reward over one evaluation call.
    pub best_mean: Option<MetricPair>,
}

fn fmt_pair(f: &mut fmt::Formatter<'_>, pair: &Option<MetricPair>) -> fmt::Result {
    match pair {
        Some(p) => write!(f, "({:.4}, {})", p.reward, p.step),
        None => f.write_str("(none)"),
    }
}

impl fmt::Display for TrialResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run {} (seed {}): best=", self.run_index, self.seed)?;
        fmt_pair(f, &self.best)?;
        f.write_str(" best_mean=")?;
        fmt_pair(f, &self.best_mean)
    }
}

/// Arithmetic means over the collected results.
///
/// Each quantity is averaged only over the results that carry it; a field is
/// `None` when no result does.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchSummary {
    pub runs: usize,
    pub best_reward: Option<f64>,
    pub best_step: Option<f64>,
    pub best_mean_reward: Option<f64>,
    pub best_mean_step: Option<f64>,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

impl BatchSummary {
    pub fn from_results(results: &[TrialResult]) -> Self {
        let best = || results.iter().filter_map(|r| r.best);
        let best_mean = || results.iter().filter_map(|r| r.best_mean);
        BatchSummary {
            runs: results.len(),
            best_reward: mean(best().map(|p| p.reward)),
            best_step: mean(best().map(|p| p.step as f64)),
            best_mean_reward: mean(best_mean().map(|p| p.reward)),
            best_mean_step: mean(best_mean().map(|p| p.step as f64)),
        }
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            ("best_reward", self.best_reward),
            ("best_step", self.best_step),
            ("best_mean_reward", self.best_mean_reward),
            ("best_mean_step", self.best_mean_step),
        ];
        writeln!(f, "summary over {} run(s)", self.runs)?;
        for (i, (name, value)) in rows.iter().enumerate() {
            match value {
                Some(v) => write!(f, "mean {name} = {v:.4}")?,
                None => write!(f, "mean {name} = n/a")?,
            }
            if i + 1 < rows.len() {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(run_index: usize, best: (f64, u64), mean: (f64, u64)) -> TrialResult {
        TrialResult {
            run_index,
            seed: 0,
            best: Some(MetricPair {
                reward: best.0,
                step: best.1,
            }),
            best_mean: Some(MetricPair {
                reward: mean.0,
                step: mean.1,
            }),
        }
    }

    #[test]
    fn test_means_of_two_results() {
        let results = vec![
            result(0, (5.0, 100), (4.0, 90)),
            result(1, (7.0, 120), (6.0, 110)),
        ];
        let summary = BatchSummary::from_results(&results);
        assert_eq!(summary.runs, 2);
        assert_eq!(summary.best_reward, Some(6.0));
        assert_eq!(summary.best_step, Some(110.0));
        assert_eq!(summary.best_mean_reward, Some(5.0));
        assert_eq!(summary.best_mean_step, Some(100.0));
    }

    #[test]
    fn test_order_does_not_matter() {
        let a = result(0, (5.0, 100), (4.0, 90));
        let b = result(1, (7.0, 120), (6.0, 110));
        assert_eq!(
            BatchSummary::from_results(&[a.clone(), b.clone()]),
            BatchSummary::from_results(&[b, a])
        );
    }

    #[test]
    fn test_absent_metrics_are_excluded() {
        let mut empty = result(1, (0.0, 0), (0.0, 0));
        empty.best = None;
        empty.best_mean = None;
        let results = vec![result(0, (5.0, 100), (4.0, 90)), empty];
        let summary = BatchSummary::from_results(&results);
        assert_eq!(summary.runs, 2);
        assert_eq!(summary.best_reward, Some(5.0));
        assert_eq!(summary.best_mean_step, Some(90.0));
    }

    #[test]
    fn test_empty_collection() {
        let summary = BatchSummary::from_results(&[]);
        assert_eq!(summary, BatchSummary::default());
        assert!(summary.to_string().contains("mean best_reward = n/a"));
    }

    #[test]
    fn test_result_display() {
        let r = result(3, (1.5, 10), (1.0, 20));
        assert_eq!(r.to_string(), "run 3 (seed 0): best=(1.5000, 10) best_mean=(1.0000, 20)");
    }
}
