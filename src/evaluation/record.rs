use crate::aggregate::MetricPair;

/// Highest reward seen so far and the timestep it was reached at.
///
/// Never decreases over the lifetime of the owner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestRewardRecord {
    reward: f64,
    timestep: Option<u64>,
}

impl BestRewardRecord {
    pub fn new() -> Self {
        BestRewardRecord {
            reward: f64::NEG_INFINITY,
            timestep: None,
        }
    }

    /// Keep `reward` if it strictly beats the record. Returns whether it did.
    pub fn offer(&mut self, reward: f64, timestep: u64) -> bool {
        if reward > self.reward {
            self.reward = reward;
            self.timestep = Some(timestep);
            true
        } else {
            false
        }
    }

    pub fn metric(&self) -> Option<MetricPair> {
        self.timestep.map(|step| MetricPair {
            reward: self.reward,
            step,
        })
    }
}

impl Default for BestRewardRecord {
    fn default() -> Self {
        Self::new()
    }
}
