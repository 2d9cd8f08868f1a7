//! Synthetic placement backend.
//!
//! Rectangular components joined by two-pin nets on a square board. Each
//! component is one agent that moves itself by a bounded `(dx, dy)` per step.
//! The learner is a single-gain linear policy tuned by perturbation
//! hill-climbing on episode return. The tracker dumps frames as JSON instead
//! of rendering images or video.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::descriptor::PolicyKind;
use crate::error::{BackendError, TrialError};
use crate::placement::{
    mean_reward, AgentStep, Architecture, CallbackAction, EnvironmentParams, EpisodeSummary,
    LearnSchedule, Learner, LearnerSetup, PlacementBackend, PlacementEnv, Policy, StepProgress,
    Tracker, TrainingCallback, OVERLAP_FEATURES,
};

const BOARD_SIZE: f64 = 100.0;
const MOVE_SCALE: f64 = 2.0;
const RESET_JITTER: f64 = 5.0;
const FEATURE_LEN: usize = 16;
const NEIGHBOR_SLOTS: usize = 4;
/// Penalty per unit of relative HPWL above the expert target.
const TARGET_GAP_WEIGHT: f64 = 1.0;

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), BackendError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

/// Center-anchored rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Component {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

impl Component {
    fn area(&self) -> f64 {
        self.w * self.h
    }

    fn intersection(&self, other: &Component) -> f64 {
        let ox = ((self.w + other.w) / 2.0 - (self.x - other.x).abs()).max(0.0);
        let oy = ((self.h + other.h) / 2.0 - (self.y - other.y).abs()).max(0.0);
        ox * oy
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BoardLayout {
    components: Vec<Component>,
    nets: Vec<(usize, usize)>,
}

impl BoardLayout {
    fn generate(count: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let components = (0..count)
            .map(|_| Component {
                x: rng.random_range(10.0..90.0),
                y: rng.random_range(10.0..90.0),
                w: rng.random_range(4.0..12.0),
                h: rng.random_range(4.0..12.0),
            })
            .collect();

        let mut nets: Vec<(usize, usize)> = (1..count).map(|i| (i - 1, i)).collect();
        for _ in 0..count / 2 {
            let a = rng.random_range(0..count);
            let b = rng.random_range(0..count);
            if a != b {
                nets.push((a, b));
            }
        }
        BoardLayout { components, nets }
    }

    /// Read a board written by `write_board` or `write_current_board`.
    fn load(path: &Path) -> Result<Self, BackendError> {
        let load_error = |reason: String| BackendError::BoardLoad {
            path: path.to_path_buf(),
            reason,
        };
        let text = fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let layout: BoardLayout =
            serde_json::from_str(&text).map_err(|e| load_error(e.to_string()))?;
        if layout.components.is_empty() {
            return Err(load_error("board has no components".to_string()));
        }
        let count = layout.components.len();
        if let Some(&(a, b)) = layout.nets.iter().find(|&&(a, b)| a >= count || b >= count) {
            return Err(load_error(format!(
                "net ({a}, {b}) refers to a component outside 0..{count}"
            )));
        }
        Ok(layout)
    }

    fn hpwl(&self) -> f64 {
        self.nets
            .iter()
            .map(|&(a, b)| self.net_length(a, b))
            .sum()
    }

    fn net_length(&self, a: usize, b: usize) -> f64 {
        let (ca, cb) = (&self.components[a], &self.components[b]);
        (ca.x - cb.x).abs() + (ca.y - cb.y).abs()
    }

    fn neighbors(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        self.nets.iter().filter_map(move |&(a, b)| {
            if a == i {
                Some(b)
            } else if b == i {
                Some(a)
            } else {
                None
            }
        })
    }

    fn wirelength_of(&self, i: usize) -> f64 {
        self.neighbors(i).map(|j| self.net_length(i, j)).sum()
    }

    /// Fraction of component `i` covered by each other component, largest first.
    fn overlaps_of(&self, i: usize) -> Vec<f64> {
        let me = &self.components[i];
        let mut fractions: Vec<f64> = self
            .components
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(_, other)| me.intersection(other) / me.area())
            .filter(|f| *f > 0.0)
            .collect();
        fractions.sort_by(|a, b| b.total_cmp(a));
        fractions
    }

    fn features(&self, i: usize, progress: f64) -> Vec<f64> {
        let mut features = vec![0.0; FEATURE_LEN];
        let me = &self.components[i];
        for (slot, j) in self.neighbors(i).take(NEIGHBOR_SLOTS).enumerate() {
            let other = &self.components[j];
            features[2 * slot] = (other.x - me.x) / BOARD_SIZE;
            features[2 * slot + 1] = (other.y - me.y) / BOARD_SIZE;
        }
        for (k, overlap) in self
            .overlaps_of(i)
            .into_iter()
            .take(OVERLAP_FEATURES.len())
            .enumerate()
        {
            features[OVERLAP_FEATURES.start + k] = overlap;
        }
        features[FEATURE_LEN - 1] = progress;
        features
    }
}

/// Keeps the most recent frames of component positions.
#[derive(Debug)]
struct SandboxTracker {
    frames: VecDeque<Vec<(f64, f64)>>,
    capacity: usize,
}

impl SandboxTracker {
    fn new(capacity: usize) -> Self {
        SandboxTracker {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn record(&mut self, layout: &BoardLayout) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames
            .push_back(layout.components.iter().map(|c| (c.x, c.y)).collect());
    }
}

impl Tracker for SandboxTracker {
    fn capture_snapshot(&mut self, path: &Path) -> Result<(), BackendError> {
        write_json(path, &self.frames.back())
    }

    fn create_video(&mut self, path: &Path) -> Result<(), BackendError> {
        write_json(path, &self.frames)
    }

    fn log_run_to_file(
        &mut self,
        dir: &Path,
        filename: &str,
        board: &str,
    ) -> Result<(), BackendError> {
        fs::create_dir_all(dir)?;
        fs::write(
            dir.join(filename),
            format!("frames={}\n{}\n", self.frames.len(), board),
        )?;
        Ok(())
    }

    fn reset(&mut self) {
        self.frames.clear();
    }
}

pub struct SandboxEnv {
    params: EnvironmentParams,
    original: BoardLayout,
    layout: BoardLayout,
    optimal: Option<(f64, BoardLayout)>,
    rng: StdRng,
    noise: Option<Normal<f64>>,
    steps: u32,
    tracker: SandboxTracker,
}

impl SandboxEnv {
    fn new(layout: BoardLayout, params: EnvironmentParams) -> Result<Self, BackendError> {
        let noise = if params.deterministic || params.expl_noise <= 0.0 {
            None
        } else {
            Some(
                Normal::new(0.0, params.expl_noise)
                    .map_err(|e| BackendError::Message(format!("exploration noise: {e}")))?,
            )
        };
        Ok(SandboxEnv {
            rng: StdRng::seed_from_u64(params.seed),
            tracker: SandboxTracker::new(params.max_steps.max(1) as usize + 1),
            original: layout.clone(),
            layout,
            optimal: None,
            noise,
            steps: 0,
            params,
        })
    }

    fn random_action(&mut self) -> Vec<f64> {
        vec![
            self.rng.random_range(-1.0..=1.0),
            self.rng.random_range(-1.0..=1.0),
        ]
    }
}

impl PlacementEnv for SandboxEnv {
    fn reset(&mut self) -> Result<(), BackendError> {
        self.layout = self.original.clone();
        for c in &mut self.layout.components {
            c.x = (c.x + self.rng.random_range(-RESET_JITTER..RESET_JITTER)).clamp(0.0, BOARD_SIZE);
            c.y = (c.y + self.rng.random_range(-RESET_JITTER..RESET_JITTER)).clamp(0.0, BOARD_SIZE);
        }
        self.steps = 0;
        Ok(())
    }

    fn step(&mut self, policy: &dyn Policy, random: bool) -> Result<Vec<AgentStep>, BackendError> {
        let count = self.layout.components.len();
        let mut order: Vec<usize> = (0..count).collect();
        if self.params.shuffle_idxs {
            order.shuffle(&mut self.rng);
        }

        let max_steps = f64::from(self.params.max_steps.max(1));
        let progress = f64::from(self.steps) / max_steps;
        for &i in &order {
            let action = if random {
                self.random_action()
            } else {
                let mut action = policy.select_action(&self.layout.features(i, progress));
                if let Some(noise) = &self.noise {
                    for a in &mut action {
                        *a += noise.sample(&mut self.rng);
                    }
                }
                action
            };
            let dx = action.first().copied().unwrap_or(0.0).clamp(-1.0, 1.0);
            let dy = action.get(1).copied().unwrap_or(0.0).clamp(-1.0, 1.0);
            let c = &mut self.layout.components[i];
            c.x = (c.x + dx * MOVE_SCALE).clamp(0.0, BOARD_SIZE);
            c.y = (c.y + dy * MOVE_SCALE).clamp(0.0, BOARD_SIZE);
        }
        self.steps += 1;

        let hpwl = self.layout.hpwl();
        let norm = self.layout.nets.len().max(1) as f64 * BOARD_SIZE;
        let done = self.steps >= self.params.max_steps;
        let progress = f64::from(self.steps) / max_steps;
        let agents: Vec<AgentStep> = (0..count)
            .map(|i| {
                let c = &self.layout.components[i];
                let overlap: f64 = self.layout.overlaps_of(i).iter().sum();
                let own = self.layout.wirelength_of(i) / BOARD_SIZE;
                let reward =
                    -(self.params.w * own + self.params.hpwl * hpwl / norm + self.params.o * overlap);
                AgentStep {
                    observation: vec![c.x, c.y, c.w, c.h],
                    features: self.layout.features(i, progress),
                    reward,
                    info: [("hpwl".to_string(), hpwl), ("overlap".to_string(), overlap)]
                        .into_iter()
                        .collect(),
                    done,
                }
            })
            .collect();

        let overlapping = agents.iter().any(|a| a.overlap() > 0.0);
        let improved = self.optimal.as_ref().is_none_or(|(best, _)| hpwl < *best);
        if !overlapping && improved {
            self.optimal = Some((hpwl, self.layout.clone()));
        }
        self.tracker.record(&self.layout);
        Ok(agents)
    }

    fn calc_hpwl(&self) -> f64 {
        self.layout.hpwl()
    }

    fn tracker(&mut self) -> &mut dyn Tracker {
        &mut self.tracker
    }

    fn write_current_board(&self, dir: &Path, filename: &str) -> Result<(), BackendError> {
        write_json(&dir.join(filename), &self.layout)
    }

    fn commit_optimal_positions(&mut self) {
        if let Some((_, layout)) = &self.optimal {
            self.original = layout.clone();
        }
    }

    fn write_board(&self, dir: &Path, filename: &str) -> Result<(), BackendError> {
        write_json(&dir.join(filename), &self.original)
    }

    fn board_representation(&self) -> String {
        serde_json::to_string(&self.layout).unwrap_or_default()
    }
}

/// Moves each component toward the sum of its net-neighbor offsets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearPolicy {
    pub kind: PolicyKind,
    pub attraction: f64,
}

impl Policy for LinearPolicy {
    fn select_action(&self, features: &[f64]) -> Vec<f64> {
        let offsets = &features[..(2 * NEIGHBOR_SLOTS).min(features.len())];
        let dx: f64 = offsets.iter().step_by(2).sum();
        let dy: f64 = offsets.iter().skip(1).step_by(2).sum();
        vec![self.attraction * dx, self.attraction * dy]
    }

    fn save(&self, path: &Path) -> Result<(), BackendError> {
        write_json(path, self)
    }
}

pub struct SandboxLearner {
    env: Box<dyn PlacementEnv>,
    policy: LinearPolicy,
    candidate: LinearPolicy,
    best_return: f64,
    perturbation: Normal<f64>,
    rng: StdRng,
    expert_target_hpwl: Option<f64>,
}

impl SandboxLearner {
    fn new(setup: LearnerSetup, env: Box<dyn PlacementEnv>) -> Result<Self, BackendError> {
        let perturbation = Normal::new(0.0, setup.hyperparameters.policy_noise)
            .map_err(|e| BackendError::Message(format!("policy noise: {e}")))?;
        let policy = LinearPolicy {
            kind: setup.kind,
            attraction: 0.5,
        };
        Ok(SandboxLearner {
            env,
            policy,
            candidate: policy,
            best_return: f64::NEG_INFINITY,
            perturbation,
            rng: StdRng::seed_from_u64(setup.seed),
            expert_target_hpwl: None,
        })
    }

    /// Episode return, less a penalty for ending above the expert target HPWL.
    fn episode_score(&self, episode_return: f64, final_hpwl: f64) -> f64 {
        match self.expert_target_hpwl {
            Some(target) => {
                let gap = (final_hpwl - target).max(0.0) / target.max(1.0);
                episode_return - TARGET_GAP_WEIGHT * gap
            }
            None => episode_return,
        }
    }

    fn hill_climb(&mut self, score: f64) {
        if score > self.best_return {
            self.best_return = score;
            self.policy = self.candidate;
        }
        self.candidate = LinearPolicy {
            attraction: self.policy.attraction + self.perturbation.sample(&mut self.rng),
            ..self.policy
        };
    }
}

impl Learner for SandboxLearner {
    fn architecture(&self) -> Architecture {
        Architecture {
            actor: format!(
                "LinearPolicy(in_features={}, out_features=2, attraction={:.4})",
                FEATURE_LEN, self.policy.attraction
            ),
            critic: "EpisodeReturn(hill_climbing)".to_string(),
            critic_target: match self.expert_target_hpwl {
                Some(target) => format!(
                    "EpisodeReturn(best={:.4}, target_hpwl={:.4})",
                    self.best_return, target
                ),
                None => format!("EpisodeReturn(best={:.4})", self.best_return),
            },
            activation: "Identity".to_string(),
        }
    }

    fn explore_for_expert_targets(&mut self, steps: u64) -> Result<(), BackendError> {
        if steps == 0 {
            return Ok(());
        }
        self.env.reset()?;
        let mut best = self.env.calc_hpwl();
        for _ in 0..steps {
            let agents = self.env.step(&self.policy, true)?;
            best = best.min(self.env.calc_hpwl());
            if agents.iter().any(|a| a.done) {
                self.env.reset()?;
            }
        }
        debug!(steps, target_hpwl = best, "expert target exploration finished");
        self.expert_target_hpwl = Some(best);
        Ok(())
    }

    fn learn(
        &mut self,
        schedule: &LearnSchedule,
        callback: &mut dyn TrainingCallback,
    ) -> Result<(), TrialError> {
        if let Some(growth) = schedule.replay_growth {
            debug!(
                factor = growth.factor(),
                "sandbox learner keeps no replay buffer; growth ignored"
            );
        }
        self.env.reset()?;
        let mut episode_reward = 0.0;
        let mut episode_steps = 0u64;

        for timestep in 1..=schedule.max_timesteps {
            let random = timestep <= schedule.start_timesteps;
            let agents = self.env.step(&self.candidate, random)?;
            episode_reward += mean_reward(&agents);
            episode_steps += 1;

            let episode = if agents.iter().any(|a| a.done) {
                let summary = EpisodeSummary {
                    reward: episode_reward,
                    steps: episode_steps,
                };
                if !random {
                    let score = self.episode_score(episode_reward, self.env.calc_hpwl());
                    self.hill_climb(score);
                }
                episode_reward = 0.0;
                episode_steps = 0;
                self.env.reset()?;
                Some(summary)
            } else {
                None
            };

            let progress = StepProgress { timestep, episode };
            if callback.on_step(&self.policy, &progress)? == CallbackAction::Stop {
                break;
            }
        }
        Ok(())
    }
}

/// Builds sandbox boards with a fixed component count and layout seed.
#[derive(Debug, Clone)]
pub struct SandboxBackend {
    components: usize,
    layout_seed: u64,
}

impl Default for SandboxBackend {
    fn default() -> Self {
        SandboxBackend::new(8)
    }
}

impl SandboxBackend {
    pub fn new(components: usize) -> Self {
        SandboxBackend {
            components: components.max(2),
            layout_seed: 0x5eed,
        }
    }
}

impl PlacementBackend for SandboxBackend {
    fn build_environment(
        &self,
        params: &EnvironmentParams,
    ) -> Result<Box<dyn PlacementEnv>, BackendError> {
        let layout = match &params.board {
            Some(path) => {
                let layout = BoardLayout::load(path)?;
                debug!(board = %path.display(), components = layout.components.len(), "board loaded");
                layout
            }
            None => BoardLayout::generate(self.components, self.layout_seed),
        };
        Ok(Box::new(SandboxEnv::new(layout, params.clone())?))
    }

    fn build_learner(
        &self,
        setup: LearnerSetup,
        env: Box<dyn PlacementEnv>,
    ) -> Result<Box<dyn Learner>, BackendError> {
        Ok(Box::new(SandboxLearner::new(setup, env)?))
    }

    fn build_info(&self) -> String {
        format!(
            "sandbox placement backend {}\ncomponents={} layout_seed={:#x}\n",
            env!("CARGO_PKG_VERSION"),
            self.components,
            self.layout_seed
        )
    }
}
