use std::path::PathBuf;

use parameter_store::ParameterStore;
use worker::{
    Agent, AgentConfig, AgentKind, Corridor, Environment, Learner, NumericContext, PolicyNet,
    Shared, ValidationAgent, environment::CorridorConfig,
};

use crate::{Config, Result, validator::Evaluator};

/// Describes what a run trains: how many parameters it shares and how its agents are built.
///
/// Agents and evaluators are built on the thread that owns them.
pub trait Blueprint: Send + Sync + 'static {
    type Agent: Agent + 'static;
    type Evaluator: Evaluator + 'static;

    /// The length of the shared parameter buffers.
    fn param_count(&self) -> usize;

    /// Builds a worker agent bound to `shared`.
    fn build_agent(&self, shared: Shared, ctx: NumericContext) -> Result<Self::Agent>;

    /// Builds the evaluator of the control thread.
    fn build_evaluator(&self, store: ParameterStore, weights_dir: PathBuf)
    -> Result<Self::Evaluator>;
}

/// Trains one of the built-in learners on the corridor environment.
#[derive(Debug, Clone)]
pub struct CorridorBlueprint {
    kind: AgentKind,
    agent: AgentConfig,
    environment: CorridorConfig,
    total_steps: u64,
    validation_episodes: usize,
}

impl CorridorBlueprint {
    pub fn from_config(config: &Config) -> Self {
        Self {
            kind: config.agent_kind,
            agent: config.agent.clone(),
            environment: config.environment,
            total_steps: config.total_steps,
            validation_episodes: config.validation_episodes,
        }
    }

    fn net(&self, env: &Corridor) -> PolicyNet {
        PolicyNet::new(env.num_states(), env.num_actions(), self.kind.head())
    }
}

impl Blueprint for CorridorBlueprint {
    type Agent = Learner<Corridor>;
    type Evaluator = ValidationAgent<Corridor>;

    fn param_count(&self) -> usize {
        self.net(&self.environment.build()).param_count()
    }

    fn build_agent(&self, shared: Shared, ctx: NumericContext) -> Result<Self::Agent> {
        let env = self.environment.build();
        let net = self.net(&env);

        let learner = Learner::new(
            self.kind,
            &self.agent,
            net,
            shared,
            env,
            ctx,
            self.total_steps,
        )?;

        Ok(learner)
    }

    fn build_evaluator(
        &self,
        store: ParameterStore,
        weights_dir: PathBuf,
    ) -> Result<Self::Evaluator> {
        let env = self.environment.build();
        let net = self.net(&env);

        Ok(ValidationAgent::new(
            self.validation_episodes,
            net,
            store,
            env,
            weights_dir,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_count_follows_agent_kind() {
        let mut config = Config {
            run_id: "blueprint".into(),
            ..Default::default()
        };
        config.environment.length = 6;

        assert_eq!(CorridorBlueprint::from_config(&config).param_count(), 12);

        config.agent_kind = AgentKind::A3C;
        assert_eq!(CorridorBlueprint::from_config(&config).param_count(), 18);
    }
}
