use rand::Rng;

use crate::{Environment, Result, agent::Core, n_step_q::collect, optimizer::SharedRmsProp};

/// Smallest probability fed to a logarithm.
const MIN_PROB: f32 = 1e-12;

/// Advantage actor-critic over a softmax policy and a state value head.
///
/// Rollouts are collected on-policy and bootstrapped from the current state value. The policy is
/// pushed towards actions with positive advantage while an entropy bonus weighted by
/// `entropy_beta` keeps it from collapsing early.
pub struct A3C<E> {
    core: Core,
    env: E,
    optimizer: SharedRmsProp,
}

impl<E: Environment> A3C<E> {
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
            let rollout = collect(&mut self.core, &mut self.env, state, &mut step, end, sample);

            if rollout.is_empty() {
                break;
            }

            let core = &mut self.core;
            let bootstrap = if rollout.terminal {
                0.
            } else {
                core.net.value(core.store().params(), rollout.next)
            };

            let returns = core.ctx.returns(&rollout.rewards, bootstrap, core.config.gamma);
            for ((&s, &a), ret) in rollout.states.iter().zip(&rollout.actions).zip(returns) {
                accumulate(core, s, a, ret);
            }

            self.flush(rollout.global)?;

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

    fn flush(&mut self, global: i64) -> Result<()> {
        self.core.flush(&self.optimizer, global)
    }
}

/// Samples an action from the current policy.
fn sample(core: &mut Core, state: usize, _: u64) -> usize {
    let probs = core.net.policy(core.store().params(), state);
    let mut u = core.ctx.rng().random::<f32>();

    for (action, p) in probs.iter().enumerate() {
        if u < *p {
            return action;
        }
        u -= p;
    }

    probs.len() - 1
}

/// Adds the actor-critic gradient of a single transition to the local gradient.
fn accumulate(core: &mut Core, state: usize, action: usize, ret: f32) {
    let net = core.net;
    let beta = core.config.entropy_beta;

    let value_idx = net.value_index(state);
    let advantage = ret - core.param(value_idx);
    core.grad[value_idx] -= advantage;

    let probs = net.policy(core.store().params(), state);
    let logs: Vec<f32> = probs.iter().map(|p| p.max(MIN_PROB).ln()).collect();
    let entropy: f32 = -probs.iter().zip(&logs).map(|(p, l)| p * l).sum::<f32>();

    for (b, (p, l)) in probs.iter().zip(&logs).enumerate() {
        let taken: f32 = if b == action { 1. } else { 0. };
        let idx = net.action_index(state, b);

        core.grad[idx] += -advantage * (taken - p) + beta * p * (l + entropy);
    }
}
