use log::{debug, info};
use parameter_store::{ParameterStore, StepCounter, divergence};
use rand::Rng;
use serde::Deserialize;

use crate::{
    A3C, AgentConfig, AgentErr, Environment, NStepQ, NumericContext, OneStepQ, PolicyNet, Result,
    model::{Head, ParamView},
    optimizer::Optimizer,
    schedule::LinearSchedule,
};

/// A learner that trains the shared parameters.
pub trait Agent {
    /// Runs `steps_to_go` training steps, blocking until they're done.
    ///
    /// # Arguments
    /// * `steps_to_go` - The amount of steps to run.
    /// * `start_step` - The logical step this worker starts from, used by its schedules.
    ///
    /// # Returns
    /// An error if the shared parameters diverged.
    fn learn(&mut self, steps_to_go: u64, start_step: u64) -> Result<()>;
}

/// The learning rule every worker of a run uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum AgentKind {
    #[default]
    OneStepQ,
    NStepQ,
    A3C,
}

impl AgentKind {
    /// The network head this kind of agent trains.
    pub fn head(&self) -> Head {
        match self {
            AgentKind::OneStepQ | AgentKind::NStepQ => Head::Q,
            AgentKind::A3C => Head::ActorCritic,
        }
    }
}

/// The handles every agent of a run binds to.
#[derive(Debug, Clone)]
pub struct Shared {
    pub store: ParameterStore,
    pub counter: StepCounter,
}

/// A worker agent, one per worker thread.
pub enum Learner<E: Environment> {
    OneStepQ(OneStepQ<E>),
    NStepQ(NStepQ<E>),
    A3C(A3C<E>),
}

impl<E: Environment> Learner<E> {
    /// Creates a new `Learner` of the given `kind`.
    ///
    /// # Arguments
    /// * `kind` - The learning rule to use.
    /// * `config` - The hyperparameters.
    /// * `net` - The layout of the shared parameters.
    /// * `shared` - The shared parameters and step counter.
    /// * `env` - This worker's own environment.
    /// * `ctx` - The numeric context of the thread the agent lives in.
    /// * `total_steps` - The length of the whole run, the learning rate reaches zero there.
    ///
    /// # Returns
    /// An `InvalidConfig` error if the hyperparameters or the network don't fit the kind
    /// of agent or the environment.
    pub fn new(
        kind: AgentKind,
        config: &AgentConfig,
        net: PolicyNet,
        shared: Shared,
        env: E,
        ctx: NumericContext,
        total_steps: u64,
    ) -> Result<Self> {
        config.validate()?;

        if net.head() != kind.head() {
            return Err(AgentErr::InvalidConfig(format!(
                "{kind:?} can't train a {:?} network",
                net.head()
            )));
        }

        if net.num_states() != env.num_states() || net.num_actions() != env.num_actions() {
            return Err(AgentErr::InvalidConfig(format!(
                "network of {}x{} doesn't fit an environment of {}x{}",
                net.num_states(),
                net.num_actions(),
                env.num_states(),
                env.num_actions()
            )));
        }

        if net.param_count() != shared.store.len() {
            return Err(AgentErr::InvalidConfig(format!(
                "network needs {} parameters but the store holds {}",
                net.param_count(),
                shared.store.len()
            )));
        }

        let core = Core::new(config, net, shared, ctx, total_steps);

        let learner = match kind {
            AgentKind::OneStepQ => Self::OneStepQ(OneStepQ::new(core, env)),
            AgentKind::NStepQ => Self::NStepQ(NStepQ::new(core, env)),
            AgentKind::A3C => Self::A3C(A3C::new(core, env)),
        };

        Ok(learner)
    }

    pub fn kind(&self) -> AgentKind {
        match self {
            Self::OneStepQ(_) => AgentKind::OneStepQ,
            Self::NStepQ(_) => AgentKind::NStepQ,
            Self::A3C(_) => AgentKind::A3C,
        }
    }
}

impl<E: Environment> Agent for Learner<E> {
    fn learn(&mut self, steps_to_go: u64, start_step: u64) -> Result<()> {
        info!(
            "starting to learn: kind={:?} steps_to_go={steps_to_go} start_step={start_step}",
            self.kind()
        );

        let episodes = match self {
            Self::OneStepQ(agent) => agent.run(steps_to_go, start_step)?,
            Self::NStepQ(agent) => agent.run(steps_to_go, start_step)?,
            Self::A3C(agent) => agent.run(steps_to_go, start_step)?,
        };

        info!("finished learning after {episodes} episodes");
        Ok(())
    }
}

/// The state every learning rule has in common.
pub(crate) struct Core {
    pub config: AgentConfig,
    pub net: PolicyNet,
    pub shared: Shared,
    pub ctx: NumericContext,
    pub grad: Vec<f32>,
    lr: LinearSchedule,
    epsilon: LinearSchedule,
}

impl Core {
    pub fn new(
        config: &AgentConfig,
        net: PolicyNet,
        shared: Shared,
        ctx: NumericContext,
        total_steps: u64,
    ) -> Self {
        let grad = vec![0.; shared.store.len()];

        Self {
            lr: LinearSchedule::new(config.learning_rate, 0., total_steps),
            epsilon: LinearSchedule::new(
                config.epsilon_start,
                config.epsilon_end,
                config.epsilon_steps,
            ),
            config: config.clone(),
            net,
            shared,
            ctx,
            grad,
        }
    }

    pub fn store(&self) -> &ParameterStore {
        &self.shared.store
    }

    /// Counts a completed step and keeps the target parameters in sync.
    ///
    /// # Returns
    /// The global amount of steps, `None` once the run was stopped.
    pub fn complete_step(&self) -> Option<i64> {
        let global = self.shared.counter.increment()?;

        if global as u64 % self.config.target_update_interval == 0 {
            debug!(global = global; "syncing target parameters");
            self.shared.store.sync_target();
        }

        Some(global)
    }

    /// Picks a random action with probability epsilon, else the greedy one.
    pub fn epsilon_greedy(&mut self, state: usize, logical_step: u64) -> usize {
        let epsilon = self.epsilon.value(logical_step);
        let num_actions = self.net.num_actions();
        let rng = self.ctx.rng();

        if rng.random::<f32>() < epsilon {
            return rng.random_range(0..num_actions);
        }

        self.net.greedy(self.shared.store.params(), state)
    }

    /// Reads a single shared parameter.
    pub fn param(&self, idx: usize) -> f32 {
        self.shared.store.params().at(idx)
    }

    /// Applies the accumulated gradient with `optimizer` and clears it.
    ///
    /// # Returns
    /// A `Diverged` error if the shared buffers contain NaN afterwards.
    pub fn flush<O: Optimizer>(&mut self, optimizer: &O, global: i64) -> Result<()> {
        let lr = self.lr.value(global.max(0) as u64);
        optimizer.apply(&self.shared.store, &self.grad, lr)?;
        self.grad.fill(0.);

        let store = &self.shared.store;
        let buffers = [
            ("shared parameters", store.params()),
            ("shared gradient", store.grads()),
        ];

        for (buffer, values) in buffers {
            if divergence::is_diverged(values) {
                return Err(AgentErr::Diverged {
                    buffer,
                    step: global,
                });
            }
        }

        Ok(())
    }
}
