use crate::{Environment, Result, agent::Core, optimizer::SharedRmsProp};

/// A rollout of at most `n_steps` transitions.
#[derive(Debug, Default)]
pub(crate) struct Rollout {
    pub states: Vec<usize>,
    pub actions: Vec<usize>,
    pub rewards: Vec<f32>,
    /// The state reached after the last transition.
    pub next: usize,
    pub done: bool,
    pub terminal: bool,
    /// Set once the run was stopped while collecting.
    pub stopped: bool,
    /// The global step count after the last transition.
    pub global: i64,
}

impl Rollout {
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}

/// Collects up to `n_steps` transitions starting from `state`, ending early on episode end,
/// on `end` or once the run is stopped.
pub(crate) fn collect<E, F>(
    core: &mut Core,
    env: &mut E,
    state: usize,
    step: &mut u64,
    end: u64,
    mut policy: F,
) -> Rollout
where
    E: Environment,
    F: FnMut(&mut Core, usize, u64) -> usize,
{
    let mut rollout = Rollout {
        next: state,
        global: core.shared.counter.get(),
        ..Default::default()
    };

    while rollout.len() < core.config.n_steps && *step < end {
        let action = policy(core, rollout.next, *step);
        let transition = env.step(action);

        rollout.states.push(rollout.next);
        rollout.actions.push(action);
        rollout.rewards.push(transition.reward);
        rollout.next = transition.state;
        *step += 1;

        match core.complete_step() {
            Some(global) => rollout.global = global,
            None => {
                rollout.stopped = true;
                break;
            }
        }

        if transition.done {
            rollout.done = true;
            rollout.terminal = transition.terminal;
            break;
        }
    }

    rollout
}

/// N-step Q-learning.
///
/// Collects rollouts of up to `n_steps` transitions, computes their discounted returns
/// bootstrapped from the target parameters, and applies the accumulated gradient through the
/// shared RMSProp statistics.
pub struct NStepQ<E> {
    core: Core,
    env: E,
    optimizer: SharedRmsProp,
}

impl<E: Environment> NStepQ<E> {
    pub(crate) fn new(core: Core, env: E) -> Self {
        let config = &core.config;
        let optimizer = SharedRmsProp::new(config.rms_decay, config.rms_epsilon, config.grad_clip);

        Self {
            core,
            env,
            optimizer,
        }
    }

    pub(crate) fn run(&mut self, steps_to_go: u64, start_step: u64) -> Result<u64> {
        let (mut step, end) = (start_step, start_step + steps_to_go);
        let mut state = self.env.reset();
        let mut episodes = 0;

        while step < end {
            let rollout = collect(
                &mut self.core,
                &mut self.env,
                state,
                &mut step,
                end,
                Core::epsilon_greedy,
            );

            if rollout.is_empty() {
                break;
            }

            let core = &mut self.core;
            let bootstrap = if rollout.terminal {
                0.
            } else {
                core.net.max_output(core.store().target(), rollout.next)
            };

            let returns = core.ctx.returns(&rollout.rewards, bootstrap, core.config.gamma);
            for ((&s, &a), ret) in rollout.states.iter().zip(&rollout.actions).zip(returns) {
                let idx = core.net.action_index(s, a);
                let td = ret - core.param(idx);
                core.grad[idx] -= td;
            }

            core.flush(&self.optimizer, rollout.global)?;

            if rollout.stopped {
                break;
            }

            state = if rollout.done {
                episodes += 1;
                self.env.reset()
            } else {
                rollout.next
            };
        }

        Ok(episodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Agent, AgentConfig, AgentKind, Corridor,
        agent::tests::create_learner,
        model::{Head, PolicyNet},
    };

    #[test]
    fn test_rollouts_stop_at_n_steps() {
        let config = AgentConfig {
            n_steps: 3,
            ..Default::default()
        };
        let (learner, _) = create_learner(AgentKind::NStepQ, &config);
        let crate::Learner::NStepQ(mut agent) = learner else {
            unreachable!()
        };

        let mut env = Corridor::new(10, 100);
        let state = env.reset();
        let mut step = 0;
        let rollout = collect(&mut agent.core, &mut env, state, &mut step, 100, |_, _, _| {
            Corridor::RIGHT
        });

        assert_eq!(rollout.len(), 3);
        assert_eq!(rollout.next, 3);
        assert_eq!(rollout.global, 3);
        assert!(!rollout.done);
        assert_eq!(step, 3);
    }

    #[test]
    fn test_rollouts_stop_at_episode_end() {
        let (learner, _) = create_learner(AgentKind::NStepQ, &AgentConfig::default());
        let crate::Learner::NStepQ(mut agent) = learner else {
            unreachable!()
        };

        let mut env = Corridor::new(3, 100);
        let state = env.reset();
        let mut step = 0;
        let rollout = collect(&mut agent.core, &mut env, state, &mut step, 100, |_, _, _| {
            Corridor::RIGHT
        });

        assert_eq!(rollout.rewards, [0., 1.]);
        assert!(rollout.done && rollout.terminal);
    }

    #[test]
    fn test_learns_to_walk_right() {
        let config = AgentConfig {
            gamma: 0.5,
            epsilon_start: 0.3,
            epsilon_end: 0.3,
            learning_rate: 0.05,
            target_update_interval: 20,
            ..Default::default()
        };
        let (mut learner, shared) = create_learner(AgentKind::NStepQ, &config);

        learner.learn(3_000, 0).unwrap();

        let net = PolicyNet::new(5, 2, Head::Q);
        let params = shared.store.params();
        assert_eq!(net.greedy(params, 3), 1);
        assert_eq!(net.greedy(params, 2), 1);
    }
}
