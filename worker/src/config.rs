use serde::Deserialize;

use crate::{AgentErr, Result};

/// The floating point precision returns are accumulated with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Single,
    Double,
}

/// Hyperparameters shared by every learning agent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct AgentConfig {
    /// Discount factor.
    pub gamma: f32,
    /// Initial learning rate, annealed linearly to zero over the whole run.
    pub learning_rate: f32,
    pub rms_decay: f32,
    pub rms_epsilon: f32,
    /// Element-wise bound on every gradient component.
    pub grad_clip: f32,
    pub epsilon_start: f32,
    pub epsilon_end: f32,
    /// Logical steps over which epsilon is annealed, per worker.
    pub epsilon_steps: u64,
    /// Maximum rollout length of the n-step learners.
    pub n_steps: usize,
    /// Steps between gradient applications of the 1-step learner.
    pub async_update_interval: u64,
    /// Global steps between target parameter synchronizations.
    pub target_update_interval: u64,
    pub entropy_beta: f32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            learning_rate: 0.1,
            rms_decay: 0.99,
            rms_epsilon: 0.01,
            grad_clip: 10.,
            epsilon_start: 1.,
            epsilon_end: 0.05,
            epsilon_steps: 10_000,
            n_steps: 5,
            async_update_interval: 5,
            target_update_interval: 1_000,
            entropy_beta: 0.01,
        }
    }
}

impl AgentConfig {
    /// Checks the hyperparameters can be trained with.
    ///
    /// # Returns
    /// An `InvalidConfig` error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(AgentErr::InvalidConfig(msg));

        if !(0. ..=1.).contains(&self.gamma) {
            return invalid(format!("gamma must be in [0, 1], got {}", self.gamma));
        }

        if !(self.learning_rate.is_finite() && self.learning_rate > 0.) {
            return invalid(format!(
                "learningRate must be positive, got {}",
                self.learning_rate
            ));
        }

        if !(0. ..1.).contains(&self.rms_decay) {
            return invalid(format!("rmsDecay must be in [0, 1), got {}", self.rms_decay));
        }

        if self.rms_epsilon <= 0. || self.grad_clip <= 0. {
            return invalid("rmsEpsilon and gradClip must be positive".into());
        }

        for (name, eps) in [
            ("epsilonStart", self.epsilon_start),
            ("epsilonEnd", self.epsilon_end),
        ] {
            if !(0. ..=1.).contains(&eps) {
                return invalid(format!("{name} must be in [0, 1], got {eps}"));
            }
        }

        if self.n_steps == 0 || self.async_update_interval == 0 {
            return invalid("nSteps and asyncUpdateInterval must be greater than 0".into());
        }

        if self.target_update_interval == 0 {
            return invalid("targetUpdateInterval must be greater than 0".into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(AgentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let configs = [
            AgentConfig {
                gamma: 1.5,
                ..Default::default()
            },
            AgentConfig {
                learning_rate: 0.,
                ..Default::default()
            },
            AgentConfig {
                epsilon_end: -0.1,
                ..Default::default()
            },
            AgentConfig {
                n_steps: 0,
                ..Default::default()
            },
            AgentConfig {
                target_update_interval: 0,
                ..Default::default()
            },
        ];

        for config in configs {
            assert!(
                matches!(config.validate(), Err(AgentErr::InvalidConfig(_))),
                "{config:?} should be invalid"
            );
        }
    }
}
