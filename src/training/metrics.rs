use std::collections::VecDeque;

use crate::placement::EpisodeSummary;

/// Episode reward and length tracker with rolling window computations.
pub struct TrainingMetrics {
    episodes: VecDeque<EpisodeSummary>,
    capacity: usize,
    total_episodes: usize, // lifetime count, never capped
}

impl TrainingMetrics {
    pub fn with_capacity(capacity: usize) -> Self {
        TrainingMetrics {
            episodes: VecDeque::with_capacity(capacity),
            capacity,
            total_episodes: 0,
        }
    }

    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn record_episode(&mut self, episode: EpisodeSummary) {
        self.total_episodes += 1;
        self.episodes.push_back(episode);
        if self.episodes.len() > self.capacity {
            self.episodes.pop_front();
        }
    }

    /// Mean episode reward over the last N episodes, `None` before the first.
    pub fn mean_reward(&self, last_n: usize) -> Option<f64> {
        let n = self.episodes.len().min(last_n);
        if n == 0 {
            return None;
        }
        let sum: f64 = self.episodes.iter().rev().take(n).map(|e| e.reward).sum();
        Some(sum / n as f64)
    }

    /// Average episode length over the last N episodes.
    pub fn mean_length(&self, last_n: usize) -> f64 {
        let n = self.episodes.len().min(last_n);
        if n == 0 {
            return 0.0;
        }
        let total: u64 = self.episodes.iter().rev().take(n).map(|e| e.steps).sum();
        total as f64 / n as f64
    }

    pub fn window(&self) -> usize {
        self.capacity
    }

    pub fn total_episodes(&self) -> usize {
        self.total_episodes
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new()
    }
}
