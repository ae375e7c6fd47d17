use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};
use parameter_store::{ParameterStore, StoreErr, divergence, snapshot};

use crate::{Environment, PolicyNet, Result};

/// Where the snapshot tagged `tag` lives inside `dir`.
pub fn weights_path(dir: &Path, tag: &str) -> PathBuf {
    dir.join(format!("{tag}.weights"))
}

/// Evaluates the shared parameters and persists them as tagged snapshots.
///
/// Evaluation runs greedy episodes on a private copy of the parameters taken at the start of
/// every pass, so workers keep training while it runs.
pub struct ValidationAgent<E> {
    episodes: usize,
    net: PolicyNet,
    store: ParameterStore,
    env: E,
    weights_dir: PathBuf,
    local: Vec<f32>,
    best: Option<f32>,
}

impl<E: Environment> ValidationAgent<E> {
    /// Creates a new `ValidationAgent`.
    ///
    /// # Arguments
    /// * `episodes` - The amount of episodes every evaluation pass runs, at least one.
    /// * `net` - The layout of the shared parameters.
    /// * `store` - The shared parameters.
    /// * `env` - The environment to evaluate on.
    /// * `weights_dir` - Where tagged snapshots are written.
    pub fn new(
        episodes: usize,
        net: PolicyNet,
        store: ParameterStore,
        env: E,
        weights_dir: PathBuf,
    ) -> Self {
        let local = vec![0.; store.len()];

        Self {
            episodes: episodes.max(1),
            net,
            store,
            env,
            weights_dir,
            local,
            best: None,
        }
    }

    /// Prepares the snapshot directory.
    pub fn start(&mut self) -> Result<()> {
        fs::create_dir_all(&self.weights_dir)?;
        debug!("writing snapshots to {}", self.weights_dir.display());
        Ok(())
    }

    /// Runs a full evaluation pass, saving a `best` snapshot when the score improves.
    ///
    /// # Returns
    /// The mean return over the evaluation episodes, or a `Diverged` error if the parameters
    /// contain NaN.
    pub fn validate(&mut self) -> Result<f32> {
        self.store.params().pull(&mut self.local)?;

        if divergence::slice_diverged(&self.local) {
            return Err(StoreErr::Diverged {
                buffer: "shared parameters",
            }
            .into());
        }

        let mut total = 0.;
        for _ in 0..self.episodes {
            total += self.run_episode();
        }
        let score = total / self.episodes as f32;

        if self.best.is_none_or(|best| score > best) {
            self.best = Some(score);
            let path = weights_path(&self.weights_dir, "best");
            snapshot::save(&path, &self.local)?;
            info!("validation score={score:.4} (new best)");
        } else {
            info!("validation score={score:.4}");
        }

        Ok(score)
    }

    /// Persists the current shared parameters under `tag`.
    ///
    /// # Returns
    /// Where the snapshot was written.
    pub fn save_weights(&self, tag: &str) -> Result<PathBuf> {
        let path = weights_path(&self.weights_dir, tag);
        snapshot::save(&path, &self.store.params().to_vec())?;

        info!("saved weights to {}", path.display());
        Ok(path)
    }

    /// The highest score seen so far.
    pub fn best(&self) -> Option<f32> {
        self.best
    }

    fn run_episode(&mut self) -> f32 {
        let mut state = self.env.reset();
        let mut ret = 0.;

        loop {
            let action = self.net.greedy(self.local.as_slice(), state);
            let transition = self.env.step(action);
            ret += transition.reward;

            if transition.done {
                return ret;
            }
            state = transition.state;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use parameter_store::initialization::ConstParamGen;

    use super::*;
    use crate::{Corridor, model::Head};

    fn create_agent(name: &str) -> (ValidationAgent<Corridor>, ParameterStore, PathBuf) {
        let dir = env::temp_dir().join(format!("validation-{name}-{}", std::process::id()));
        let net = PolicyNet::new(4, 2, Head::Q);
        let store = ParameterStore::new(ConstParamGen::new(0., net.param_count()));
        let agent = ValidationAgent::new(2, net, store.clone(), Corridor::new(4, 20), dir.clone());

        (agent, store, dir)
    }

    #[test]
    fn test_greedy_score_and_best_snapshot() {
        let (mut agent, store, dir) = create_agent("best");
        agent.start().unwrap();

        // ties go left, the agent never reaches the goal
        assert_eq!(agent.validate().unwrap(), 0.);
        assert!(weights_path(&dir, "best").exists());

        let net = PolicyNet::new(4, 2, Head::Q);
        for state in 0..4 {
            store.params().set(net.action_index(state, Corridor::RIGHT), 1.);
        }

        assert_eq!(agent.validate().unwrap(), 1.);
        assert_eq!(agent.best(), Some(1.));

        let best = snapshot::load(&weights_path(&dir, "best")).unwrap();
        assert_eq!(best, store.params().to_vec());

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_save_weights() {
        let (agent, store, dir) = create_agent("save");
        store.params().fill(0.25);

        let path = agent.save_weights("last").unwrap();
        assert_eq!(path, weights_path(&dir, "last"));
        assert_eq!(snapshot::load(&path).unwrap(), vec![0.25; 8]);

        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_nan_parameters_are_reported() {
        let (mut agent, store, dir) = create_agent("nan");
        agent.start().unwrap();
        store.params().set(3, f32::NAN);

        assert!(agent.validate().unwrap_err().is_divergence());
        fs::remove_dir_all(dir).unwrap();
    }
}
