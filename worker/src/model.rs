use parameter_store::WildBuffer;

/// Read access to a flat parameter vector, either shared or a local copy.
pub trait ParamView {
    fn at(&self, idx: usize) -> f32;
}

impl ParamView for WildBuffer {
    #[inline]
    fn at(&self, idx: usize) -> f32 {
        self.get(idx)
    }
}

impl ParamView for [f32] {
    #[inline]
    fn at(&self, idx: usize) -> f32 {
        self[idx]
    }
}

/// What the function approximator outputs for every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Head {
    /// One action value per action.
    Q,
    /// One policy logit per action followed by a single state value.
    ActorCritic,
}

/// A linear function approximator over one-hot encoded states.
///
/// The network owns no weights, it describes how a flat parameter vector is laid out and reads
/// its outputs from any [`ParamView`]. The same layout serves the policy and the target
/// parameters. Action outputs come first, `num_states * num_actions` of them in state-major
/// order, followed by the `num_states` state values of the actor-critic head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyNet {
    num_states: usize,
    num_actions: usize,
    head: Head,
}

impl PolicyNet {
    pub fn new(num_states: usize, num_actions: usize, head: Head) -> Self {
        Self {
            num_states,
            num_actions,
            head,
        }
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    pub fn head(&self) -> Head {
        self.head
    }

    /// The length of the flat parameter vector this network reads from.
    pub fn param_count(&self) -> usize {
        let actions = self.num_states * self.num_actions;

        match self.head {
            Head::Q => actions,
            Head::ActorCritic => actions + self.num_states,
        }
    }

    /// The index of the output of `action` in `state`.
    #[inline]
    pub fn action_index(&self, state: usize, action: usize) -> usize {
        debug_assert!(state < self.num_states && action < self.num_actions);
        state * self.num_actions + action
    }

    /// The index of the value of `state`, only meaningful for the actor-critic head.
    #[inline]
    pub fn value_index(&self, state: usize) -> usize {
        debug_assert_eq!(self.head, Head::ActorCritic);
        self.num_states * self.num_actions + state
    }

    /// Reads the action outputs of `state`: action values or policy logits.
    pub fn action_outputs<P: ParamView + ?Sized>(&self, params: &P, state: usize) -> Vec<f32> {
        (0..self.num_actions)
            .map(|a| params.at(self.action_index(state, a)))
            .collect()
    }

    /// The action with the highest output in `state`, ties broken by the lowest index.
    pub fn greedy<P: ParamView + ?Sized>(&self, params: &P, state: usize) -> usize {
        let outputs = self.action_outputs(params, state);
        argmax(&outputs)
    }

    /// The highest action output in `state`.
    pub fn max_output<P: ParamView + ?Sized>(&self, params: &P, state: usize) -> f32 {
        self.action_outputs(params, state)
            .into_iter()
            .fold(f32::NEG_INFINITY, f32::max)
    }

    /// The estimated value of `state`.
    pub fn value<P: ParamView + ?Sized>(&self, params: &P, state: usize) -> f32 {
        params.at(self.value_index(state))
    }

    /// The action distribution in `state`, the softmax of its logits.
    pub fn policy<P: ParamView + ?Sized>(&self, params: &P, state: usize) -> Vec<f32> {
        softmax(&self.action_outputs(params, state))
    }
}

/// The index of the highest value, the lowest one among ties.
pub fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, max), (i, &v)| {
            if v > max { (i, v) } else { (best, max) }
        })
        .0
}

/// A numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let total: f32 = exps.iter().sum();

    exps.into_iter().map(|e| e / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_count() {
        assert_eq!(PolicyNet::new(4, 2, Head::Q).param_count(), 8);
        assert_eq!(PolicyNet::new(4, 2, Head::ActorCritic).param_count(), 12);
    }

    #[test]
    fn test_layout() {
        let net = PolicyNet::new(3, 2, Head::ActorCritic);
        let params: Vec<f32> = (0..net.param_count()).map(|i| i as f32).collect();

        assert_eq!(net.action_outputs(params.as_slice(), 1), [2., 3.]);
        assert_eq!(net.value(params.as_slice(), 2), 8.);
    }

    #[test]
    fn test_greedy_on_shared_buffer() {
        let net = PolicyNet::new(2, 3, Head::Q);
        let params = WildBuffer::new(vec![0., 0., 0., 1., 5., 5.]);

        assert_eq!(net.greedy(&params, 0), 0);
        assert_eq!(net.greedy(&params, 1), 1);
        assert_eq!(net.max_output(&params, 1), 5.);
    }

    #[test]
    fn test_softmax() {
        let probs = softmax(&[1000., 1000.]);
        assert_eq!(probs, [0.5, 0.5]);

        let probs = softmax(&[0., 1., 2.]);
        assert!((probs.iter().sum::<f32>() - 1.).abs() < 1e-6);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }
}
