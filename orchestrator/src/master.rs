use std::{cell::RefCell, process, rc::Rc, sync::Arc, thread};

use log::{debug, error, info};
use parameter_store::{ParameterStore, StepCounter, initialization::RandParamGen, snapshot};
use rand::{SeedableRng, rngs::StdRng};
use tokio::runtime::{Builder, Runtime};
use worker::{Agent, Shared};

use crate::{
    Config, OrchestratorError, Result,
    blueprint::{Blueprint, CorridorBlueprint},
    checkpoint::{CheckpointManager, CheckpointRecord, LAST},
    interrupt::{InterruptHandler, Interrupts},
    pool::{Job, ThreadPool},
    setup::{InitMutex, SetupPipeline},
    validator::{Evaluator, Validator},
};

/// How the remaining steps of a run are split among the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub resumed_steps: u64,
    /// The amount of steps every worker runs.
    pub steps_to_go: u64,
    /// The logical step every worker starts from.
    pub start_step: u64,
}

/// Splits the steps left between `resumed_steps` and `total_steps` evenly among `workers`.
///
/// The remainder of the division is not run.
pub fn resume_plan(total_steps: u64, resumed_steps: u64, workers: usize) -> Plan {
    let workers = workers.max(1) as u64;

    Plan {
        resumed_steps,
        steps_to_go: total_steps.saturating_sub(resumed_steps) / workers,
        start_step: resumed_steps / workers,
    }
}

/// What a finished run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub plan: Plan,
    /// The global step count once every worker finished.
    pub global_steps: u64,
    /// Pool threads still running after both pools were terminated.
    pub live_threads: usize,
}

struct WorkerState<A> {
    agent: A,
}

struct ControlState<V> {
    runtime: Runtime,
    interrupts: Interrupts,
    validator: Validator<V>,
    handler: InterruptHandler<V>,
}

impl<V: Evaluator> ControlState<V> {
    /// Validates until the run stops, handling any interrupt meanwhile.
    fn run(&mut self) -> Result<()> {
        let Self {
            runtime,
            interrupts,
            validator,
            handler,
        } = self;

        runtime.block_on(async {
            tokio::select! {
                evaluations = validator.run() => evaluations.map(|n| {
                    debug!("control job finished after {n} evaluations");
                }),
                signo = interrupts.recv() => handler.handle(signo),
            }
        })
    }
}

/// Stops the run if a worker panics while learning.
struct StopOnPanic(StepCounter);

impl Drop for StopOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.stop();
        }
    }
}

/// Logs and aborts on diverged shared buffers, nothing can recover them.
fn abort_on_divergence(result: Result<()>) -> Result<()> {
    if let Err(e) = &result {
        if e.is_divergence() {
            error!("{e}, aborting");
            log::logger().flush();
            process::abort();
        }
    }

    result
}

/// Orchestrates an asynchronous training run.
///
/// Owns the shared parameters and the step counter, a control pool with a single thread that
/// validates and handles interrupts, and a worker pool with one agent per thread.
pub struct AsyncMaster<B: Blueprint> {
    config: Config,
    store: ParameterStore,
    counter: StepCounter,
    checkpoints: CheckpointManager,
    control: ThreadPool<ControlState<B::Evaluator>>,
    workers: ThreadPool<WorkerState<B::Agent>>,
}

impl AsyncMaster<CorridorBlueprint> {
    /// Prepares a run of the built-in corridor learners.
    pub fn init(config: Config) -> Result<Self> {
        let blueprint = CorridorBlueprint::from_config(&config);
        Self::with_blueprint(config, blueprint)
    }
}

impl<B: Blueprint> AsyncMaster<B> {
    /// Prepares a run: builds the shared state and starts both pools.
    ///
    /// The control pool is fully set up, with its interrupt handler registered, before the first
    /// worker thread is created. Workers build their agents one at a time and then wait for
    /// [`AsyncMaster::start`].
    ///
    /// # Returns
    /// An error if the config is invalid, the pretrained weights can't be loaded or any pool
    /// thread failed its setup.
    pub fn with_blueprint(config: Config, blueprint: B) -> Result<Self> {
        config.validate()?;
        info!("initializing run {}", config.run_id);

        let rng = StdRng::seed_from_u64(config.seed);
        let param_gen = RandParamGen::symmetric(rng, blueprint.param_count(), config.init_range)?;
        let store = ParameterStore::new(param_gen);

        if let Some(path) = &config.pretrained_weights_path {
            let weights = snapshot::load(path)?;
            store.load(&weights)?;
            info!("loaded pretrained weights from {}", path.display());
        }

        let counter = StepCounter::new();
        let checkpoints = CheckpointManager::new(&config.run_dir());
        let pipeline = Arc::new(SetupPipeline::new(
            config.logs_dir(),
            config.seed,
            config.numeric_precision,
        ));
        let blueprint = Arc::new(blueprint);

        let control = ThreadPool::spawn("control", 1, {
            let (pipeline, blueprint) = (pipeline.clone(), blueprint.clone());
            let (store, counter) = (store.clone(), counter.clone());
            let checkpoints = checkpoints.clone();
            let frequency = config.validation_frequency;

            move |index| {
                pipeline.run(index)?;

                let mut evaluator = blueprint
                    .build_evaluator(store.clone(), checkpoints.weights_dir().to_path_buf())?;
                evaluator.start()?;
                let evaluator = Rc::new(RefCell::new(evaluator));

                let runtime = Builder::new_current_thread().enable_all().build()?;
                let interrupts = {
                    let _guard = runtime.enter();
                    Interrupts::register()?
                };

                Ok(ControlState {
                    runtime,
                    interrupts,
                    validator: Validator::new(counter.clone(), frequency, evaluator.clone()),
                    handler: InterruptHandler::new(counter.clone(), checkpoints.clone(), evaluator),
                })
            }
        })?;
        info!("control pool ready");

        let init_mutex = InitMutex::new();
        let workers = ThreadPool::spawn("worker", config.worker_thread_count, {
            let shared = Shared {
                store: store.clone(),
                counter: counter.clone(),
            };

            move |index| {
                let ctx = pipeline.run(index)?;
                let agent = init_mutex.construct(|| blueprint.build_agent(shared.clone(), ctx))?;

                Ok(WorkerState { agent })
            }
        })?;
        info!("worker pool ready with {} threads", workers.len());

        Ok(Self {
            config,
            store,
            counter,
            checkpoints,
            control,
            workers,
        })
    }

    pub fn store(&self) -> &ParameterStore {
        &self.store
    }

    pub fn counter(&self) -> &StepCounter {
        &self.counter
    }

    /// Runs the training to completion, resuming from the run's checkpoint if there's one.
    ///
    /// Blocks until every worker finished, then stops the validator and releases both pools.
    /// A finished run saves its final checkpoint and `last` snapshot.
    ///
    /// # Returns
    /// The first error of a worker or the control thread, after every thread was released.
    pub fn start(mut self) -> Result<RunSummary> {
        let resumed = self
            .checkpoints
            .resume(&self.store, &self.counter)?
            .unwrap_or(0);

        let plan = resume_plan(
            self.config.total_steps,
            resumed,
            self.config.worker_thread_count,
        );
        info!(
            "starting {} workers: steps_to_go={} start_step={} resumed_steps={}",
            self.workers.len(),
            plan.steps_to_go,
            plan.start_step,
            plan.resumed_steps
        );

        let scheduled = self.schedule(plan);
        let workers_result = scheduled.and_then(|()| self.workers.synchronize());

        let global_steps = self.counter.get().max(0) as u64;
        let saved = match &workers_result {
            Ok(()) => abort_on_divergence(self.save_final(global_steps)),
            Err(_) => Ok(()),
        };

        self.counter.stop();
        debug!("step counter stopped at {global_steps}");
        let control_result = self.control.synchronize();

        let worker_threads = self.workers.live_threads();
        let control_threads = self.control.live_threads();
        let workers_terminated = self.workers.terminate();
        let control_terminated = self.control.terminate();

        workers_result?;
        control_result?;
        saved?;
        workers_terminated?;
        control_terminated?;

        info!("run {} finished at {global_steps} global steps", self.config.run_id);

        Ok(RunSummary {
            plan,
            global_steps,
            live_threads: worker_threads.count() + control_threads.count(),
        })
    }

    fn schedule(&mut self, plan: Plan) -> Result<()> {
        let validate: Job<ControlState<B::Evaluator>> =
            Box::new(|state| abort_on_divergence(state.run()));
        self.control.execute(0, validate)?;

        for idx in 0..self.workers.len() {
            let counter = self.counter.clone();
            let learn: Job<WorkerState<B::Agent>> = Box::new(move |state| {
                let _guard = StopOnPanic(counter.clone());
                let result = state
                    .agent
                    .learn(plan.steps_to_go, plan.start_step)
                    .map_err(OrchestratorError::from);

                // Stopping the counter makes the rest of the workers leave their loops.
                if let Err(e) = &result {
                    error!("worker failed: {e}, stopping the run");
                    counter.stop();
                }

                abort_on_divergence(result)
            });
            self.workers.execute(idx, learn)?;
        }

        Ok(())
    }

    fn save_final(&self, global_steps: u64) -> Result<()> {
        self.store.check_finite()?;

        let path = self.checkpoints.save_weights(LAST, &self.store)?;
        self.checkpoints.save(&CheckpointRecord { global_steps })?;

        info!("saved final weights to {}", path.display());
        Ok(())
    }
}
