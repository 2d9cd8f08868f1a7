use std::fs::File;
use std::io::{BufWriter, Write};

use tracing::{debug, info};

use crate::aggregate::TrialResult;
use crate::descriptor::RunDescriptor;
use crate::error::TrialError;
use crate::evaluation::EvaluationSelector;
use crate::placement::{CallbackAction, Policy, StepProgress, TrainingCallback};
use crate::training::metrics::TrainingMetrics;

/// Learning callback of one run: logs finished episodes, evaluates on a
/// fixed timestep interval and stops the learner once the rolling mean
/// reward stalls for `early_stopping` timesteps.
pub struct TrainingMonitor {
    selector: EvaluationSelector,
    metrics: TrainingMetrics,
    log: BufWriter<File>,
    run_index: usize,
    seed: u32,
    evaluate_every: u64,
    max_timesteps: u64,
    patience: u64,
    best_mean: f64,
    last_improvement: u64,
    evaluations: usize,
}

impl TrainingMonitor {
    pub fn new(
        selector: EvaluationSelector,
        descriptor: &RunDescriptor,
    ) -> Result<Self, TrialError> {
        let log = BufWriter::new(File::create(descriptor.log_dir().join("training.log"))?);
        let budgets = &descriptor.budgets;
        Ok(TrainingMonitor {
            selector,
            metrics: TrainingMetrics::new(),
            log,
            run_index: descriptor.run_index,
            seed: descriptor.seed,
            evaluate_every: budgets.evaluate_every,
            max_timesteps: budgets.max_timesteps,
            patience: budgets.early_stopping_patience(),
            best_mean: f64::NEG_INFINITY,
            last_improvement: 0,
            evaluations: 0,
        })
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Flush the training log and hand back the selector's best metrics.
    pub fn finish(mut self) -> Result<TrialResult, TrialError> {
        self.log.flush()?;
        info!(
            run = self.run_index,
            episodes = self.metrics.total_episodes(),
            evaluations = self.evaluations,
            "training finished"
        );
        Ok(TrialResult {
            run_index: self.run_index,
            seed: self.seed,
            best: self.selector.best_metrics(),
            best_mean: self.selector.best_mean_metrics(),
        })
    }
}

impl TrainingCallback for TrainingMonitor {
    fn on_step(
        &mut self,
        policy: &dyn Policy,
        progress: &StepProgress,
    ) -> Result<CallbackAction, TrialError> {
        let timestep = progress.timestep;

        if let Some(episode) = progress.episode {
            self.metrics.record_episode(episode);
            let window = self.metrics.window();
            let mean = self.metrics.mean_reward(window).unwrap_or(episode.reward);
            writeln!(
                self.log,
                "timestep={} episode={} reward={:.4} steps={} mean_reward={:.4} mean_length={:.1}",
                timestep,
                self.metrics.total_episodes(),
                episode.reward,
                episode.steps,
                mean,
                self.metrics.mean_length(window),
            )?;
            if mean > self.best_mean {
                self.best_mean = mean;
                self.last_improvement = timestep;
            }
        }

        if self.evaluate_every > 0 && timestep % self.evaluate_every == 0 {
            let report = self.selector.evaluate(policy, timestep)?;
            self.evaluations += 1;
            debug!(
                timestep,
                mean_reward = ?report.mean_reward,
                new_best = report.new_best,
                "evaluation finished"
            );
        }

        if timestep < self.max_timesteps
            && timestep.saturating_sub(self.last_improvement) >= self.patience
        {
            info!(
                timestep,
                last_improvement = self.last_improvement,
                "no mean reward improvement, stopping early"
            );
            return Ok(CallbackAction::Stop);
        }
        Ok(CallbackAction::Continue)
    }
}
