use log::debug;

use crate::{Environment, Result, agent::Core, optimizer::Sgd};

/// One-step Q-learning.
///
/// Every step regresses the value of the taken action towards `r + gamma * max_a Q'(s', a)`,
/// where `Q'` reads the target parameters. Gradients are accumulated locally and applied to the
/// shared parameters every `async_update_interval` steps and at the end of every episode.
pub struct OneStepQ<E> {
    core: Core,
    env: E,
    optimizer: Sgd,
}

impl<E: Environment> OneStepQ<E> {
    pub(crate) fn new(core: Core, env: E) -> Self {
        let optimizer = Sgd::new(core.config.grad_clip);
        Self {
            core,
            env,
            optimizer,
        }
    }

    /// Runs the training loop.
    ///
    /// # Returns
    /// The amount of finished episodes.
    pub(crate) fn run(&mut self, steps_to_go: u64, start_step: u64) -> Result<u64> {
        let core = &mut self.core;
        let (gamma, interval) = (core.config.gamma, core.config.async_update_interval);

        let mut state = self.env.reset();
        let mut pending = 0;
        let mut global = core.shared.counter.get();
        let mut episodes = 0;

        for step in start_step..start_step + steps_to_go {
            let action = core.epsilon_greedy(state, step);
            let transition = self.env.step(action);

            let mut target = transition.reward;
            if !transition.terminal {
                target += gamma * core.net.max_output(core.store().target(), transition.state);
            }

            let idx = core.net.action_index(state, action);
            let td = target - core.param(idx);
            core.grad[idx] -= td;
            pending += 1;

            let Some(curr) = core.complete_step() else {
                debug!("run stopped, leaving the training loop");
                break;
            };
            global = curr;

            if pending >= interval || transition.done {
                core.flush(&self.optimizer, global)?;
                pending = 0;
            }

            state = if transition.done {
                episodes += 1;
                self.env.reset()
            } else {
                transition.state
            };
        }

        if pending > 0 {
            core.flush(&self.optimizer, global)?;
        }

        Ok(episodes)
    }
}
