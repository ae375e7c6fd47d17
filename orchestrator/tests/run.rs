use std::{
    env, fs,
    path::PathBuf,
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use orchestrator::{
    AsyncMaster, Blueprint, CheckpointManager, CheckpointRecord, Config, Evaluator,
    OrchestratorError, Plan,
};
use parameter_store::{ParameterStore, SENTINEL, snapshot};
use worker::{Agent, AgentErr, NumericContext, Shared};

const PARAMS: usize = 8;

type Calls = Arc<Mutex<Vec<(u64, u64)>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Error,
    Panic,
}

/// Counts steps without learning anything, recording how it was asked to learn.
struct MockAgent {
    shared: Shared,
    calls: Calls,
    failure: Option<Failure>,
    step_delay: Duration,
}

impl Agent for MockAgent {
    fn learn(&mut self, steps_to_go: u64, start_step: u64) -> worker::Result<()> {
        self.calls.lock().unwrap().push((steps_to_go, start_step));

        match self.failure {
            Some(Failure::Error) => {
                return Err(AgentErr::InvalidConfig("bad worker".into()));
            }
            Some(Failure::Panic) => panic!("bad worker"),
            None => {}
        }

        for _ in 0..steps_to_go {
            if self.shared.counter.increment().is_none() {
                break;
            }

            if !self.step_delay.is_zero() {
                thread::sleep(self.step_delay);
            }
        }

        Ok(())
    }
}

struct MockEvaluator {
    store: ParameterStore,
    weights_dir: PathBuf,
}

impl Evaluator for MockEvaluator {
    fn start(&mut self) -> orchestrator::Result<()> {
        fs::create_dir_all(&self.weights_dir)?;
        Ok(())
    }

    fn validate(&mut self) -> orchestrator::Result<f32> {
        Ok(self.store.params().sum())
    }

    fn save_weights(&self, tag: &str) -> orchestrator::Result<PathBuf> {
        let path = self.weights_dir.join(format!("{tag}.weights"));
        snapshot::save(&path, &self.store.params().to_vec())?;
        Ok(path)
    }
}

#[derive(Default)]
struct MockBlueprint {
    calls: Calls,
    /// The 1-based index of the worker that fails, and how.
    failing: Option<(usize, Failure)>,
    step_delay: Duration,
}

impl Blueprint for MockBlueprint {
    type Agent = MockAgent;
    type Evaluator = MockEvaluator;

    fn param_count(&self) -> usize {
        PARAMS
    }

    fn build_agent(&self, shared: Shared, ctx: NumericContext) -> orchestrator::Result<MockAgent> {
        let failure = self
            .failing
            .filter(|(idx, _)| *idx == ctx.thread_index())
            .map(|(_, failure)| failure);

        Ok(MockAgent {
            shared,
            calls: self.calls.clone(),
            failure,
            step_delay: self.step_delay,
        })
    }

    fn build_evaluator(
        &self,
        store: ParameterStore,
        weights_dir: PathBuf,
    ) -> orchestrator::Result<MockEvaluator> {
        Ok(MockEvaluator { store, weights_dir })
    }
}

fn mk_config(name: &str, total_steps: u64, workers: usize) -> Config {
    Config {
        run_id: name.into(),
        experiments_dir: env::temp_dir().join(format!("orchestrator-run-{}", std::process::id())),
        total_steps,
        worker_thread_count: workers,
        validation_frequency: 10,
        ..Default::default()
    }
}

#[test]
fn test_fresh_run_splits_steps_among_workers() {
    let config = mk_config("fresh", 100, 4);
    let run_dir = config.run_dir();
    let blueprint = MockBlueprint::default();
    let calls = blueprint.calls.clone();

    let master = AsyncMaster::with_blueprint(config, blueprint).unwrap();
    let counter = master.counter().clone();
    let summary = master.start().unwrap();

    assert_eq!(*calls.lock().unwrap(), vec![(25, 0); 4]);
    assert_eq!(summary.global_steps, 100);
    assert_eq!(summary.live_threads, 0);
    assert_eq!(counter.get(), SENTINEL);

    let checkpoints = CheckpointManager::new(&run_dir);
    assert_eq!(
        checkpoints.load().unwrap(),
        Some(CheckpointRecord { global_steps: 100 })
    );
    assert!(checkpoints.weights_path("last").exists());
    assert!(run_dir.join("logs/worker-1.log").exists());
    assert!(run_dir.join("logs/control-1.log").exists());

    fs::remove_dir_all(run_dir).unwrap();
}

#[test]
fn test_resumed_run_continues_from_checkpoint() {
    let config = mk_config("resumed", 1_000, 8);
    let run_dir = config.run_dir();

    let checkpoints = CheckpointManager::new(&run_dir);
    let trained = vec![0.25; PARAMS];
    snapshot::save(&checkpoints.weights_path("last"), &trained).unwrap();
    checkpoints
        .save(&CheckpointRecord { global_steps: 200 })
        .unwrap();

    let blueprint = MockBlueprint::default();
    let calls = blueprint.calls.clone();

    let master = AsyncMaster::with_blueprint(config, blueprint).unwrap();
    let store = master.store().clone();
    let summary = master.start().unwrap();

    assert_eq!(
        summary.plan,
        Plan {
            resumed_steps: 200,
            steps_to_go: 100,
            start_step: 25,
        }
    );
    assert_eq!(*calls.lock().unwrap(), vec![(100, 25); 8]);
    assert_eq!(summary.global_steps, 1_000);
    assert_eq!(store.params().to_vec(), trained);
    assert_eq!(store.target().to_vec(), trained);
    assert_eq!(
        checkpoints.load().unwrap(),
        Some(CheckpointRecord {
            global_steps: 1_000
        })
    );

    fs::remove_dir_all(run_dir).unwrap();
}

#[test]
fn test_resume_without_weights_fails() {
    let config = mk_config("missing-weights", 100, 2);
    let run_dir = config.run_dir();

    CheckpointManager::new(&run_dir)
        .save(&CheckpointRecord { global_steps: 50 })
        .unwrap();

    let blueprint = MockBlueprint::default();
    let calls = blueprint.calls.clone();

    let master = AsyncMaster::with_blueprint(config, blueprint).unwrap();
    let err = master.start().unwrap_err();

    assert!(matches!(err, OrchestratorError::ResumeMissingWeights { .. }));
    assert!(calls.lock().unwrap().is_empty());

    fs::remove_dir_all(run_dir).unwrap();
}

fn run_with_failing_worker(name: &str, failure: Failure) -> (OrchestratorError, Duration) {
    let config = mk_config(name, 200_000, 2);
    let run_dir = config.run_dir();
    let blueprint = MockBlueprint {
        failing: Some((1, failure)),
        step_delay: Duration::from_millis(1),
        ..Default::default()
    };

    let master = AsyncMaster::with_blueprint(config, blueprint).unwrap();
    let counter = master.counter().clone();

    let started = Instant::now();
    let err = master.start().unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(counter.get(), SENTINEL);
    assert_eq!(CheckpointManager::new(&run_dir).load().unwrap(), None);

    fs::remove_dir_all(run_dir).unwrap();
    (err, elapsed)
}

#[test]
fn test_failing_worker_stops_its_siblings() {
    let (err, elapsed) = run_with_failing_worker("failing-worker", Failure::Error);

    assert!(matches!(
        err,
        OrchestratorError::Agent(AgentErr::InvalidConfig(_))
    ));
    assert!(elapsed < Duration::from_secs(10), "took {elapsed:?}");
}

#[test]
fn test_panicking_worker_stops_its_siblings() {
    let (err, elapsed) = run_with_failing_worker("panicking-worker", Failure::Panic);

    assert!(matches!(
        err,
        OrchestratorError::ThreadPanicked { ref thread, .. } if thread == "worker-1"
    ));
    assert!(elapsed < Duration::from_secs(10), "took {elapsed:?}");
}

#[test]
fn test_invalid_config_starts_no_threads() {
    let mut config = mk_config("invalid", 100, 0);
    config.run_id = String::new();

    let result = AsyncMaster::with_blueprint(config, MockBlueprint::default());
    assert!(matches!(result, Err(OrchestratorError::InvalidConfig(_))));
}

#[test]
fn test_corridor_run() {
    let mut config = mk_config("corridor", 2_000, 2);
    config.validation_frequency = 500;
    config.environment.length = 5;
    let run_dir = config.run_dir();

    let master = AsyncMaster::init(config).unwrap();
    let store = master.store().clone();
    let summary = master.start().unwrap();

    assert_eq!(summary.global_steps, 2_000);
    assert_eq!(summary.live_threads, 0);
    assert!(store.check_finite().is_ok());

    let saved = snapshot::load(&run_dir.join("weights/last.weights")).unwrap();
    assert_eq!(saved, store.params().to_vec());

    fs::remove_dir_all(run_dir).unwrap();
}
