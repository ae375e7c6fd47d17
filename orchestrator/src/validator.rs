use std::{cell::RefCell, path::PathBuf, rc::Rc, time::Duration};

use log::{debug, info};
use parameter_store::{SENTINEL, StepCounter};
use worker::{Environment, ValidationAgent};

use crate::Result;

/// How long the validator sleeps between reads of the step counter.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Evaluates and persists the shared parameters from the control thread.
pub trait Evaluator {
    /// One-time setup, run before the first evaluation.
    fn start(&mut self) -> Result<()>;

    /// Runs a blocking evaluation pass.
    ///
    /// # Returns
    /// The score of the shared parameters.
    fn validate(&mut self) -> Result<f32>;

    /// Persists the current shared parameters under `tag`.
    fn save_weights(&self, tag: &str) -> Result<PathBuf>;
}

impl<E: Environment> Evaluator for ValidationAgent<E> {
    fn start(&mut self) -> Result<()> {
        Ok(ValidationAgent::start(self)?)
    }

    fn validate(&mut self) -> Result<f32> {
        Ok(ValidationAgent::validate(self)?)
    }

    fn save_weights(&self, tag: &str) -> Result<PathBuf> {
        Ok(ValidationAgent::save_weights(self, tag)?)
    }
}

/// The outcome of a single read of the step counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The run is over.
    Stop,
    /// An evaluation pass ran at the given global step.
    Evaluated(i64),
    Idle,
}

/// Runs an evaluation pass every `frequency` global steps until the run stops.
pub struct Validator<V> {
    counter: StepCounter,
    frequency: u64,
    last_mark: i64,
    evaluations: usize,
    evaluator: Rc<RefCell<V>>,
}

impl<V: Evaluator> Validator<V> {
    /// Creates a new `Validator`, marking the counter's current value as evaluated.
    ///
    /// # Arguments
    /// * `counter` - The global step counter.
    /// * `frequency` - Global steps between evaluation passes.
    /// * `evaluator` - Runs the evaluation passes.
    pub fn new(counter: StepCounter, frequency: u64, evaluator: Rc<RefCell<V>>) -> Self {
        let last_mark = counter.get().max(0);

        Self {
            counter,
            frequency,
            last_mark,
            evaluations: 0,
            evaluator,
        }
    }

    /// The amount of evaluation passes run so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Reads the counter once, evaluating if enough steps went by since the last pass.
    pub fn tick(&mut self) -> Result<Tick> {
        let steps = self.counter.get();
        if steps == SENTINEL {
            return Ok(Tick::Stop);
        }

        let frequency = i64::try_from(self.frequency).unwrap_or(i64::MAX);
        if steps - self.last_mark <= frequency {
            return Ok(Tick::Idle);
        }

        self.last_mark = steps;
        let score = self.evaluator.borrow_mut().validate()?;
        self.evaluations += 1;

        debug!("evaluation {} at step {steps}: score={score}", self.evaluations);
        Ok(Tick::Evaluated(steps))
    }

    /// Loops until the counter holds the sentinel.
    ///
    /// The mark starts at the counter's value when the loop starts, a resumed run isn't
    /// evaluated right away.
    ///
    /// # Returns
    /// The amount of evaluation passes run, or the first evaluation error.
    pub async fn run(&mut self) -> Result<usize> {
        self.last_mark = self.counter.get().max(0);
        info!("validator started at step {}", self.last_mark);

        loop {
            match self.tick()? {
                Tick::Stop => break,
                Tick::Evaluated(_) => tokio::task::yield_now().await,
                Tick::Idle => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }

        info!("validator stopped after {} evaluations", self.evaluations);
        Ok(self.evaluations)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Instant;

    use super::*;
    use crate::OrchestratorError;

    /// Counts its calls instead of evaluating anything.
    #[derive(Debug, Default)]
    pub struct CountingEvaluator {
        pub started: bool,
        pub validations: usize,
        pub saved: Vec<String>,
        pub fail: bool,
    }

    impl Evaluator for CountingEvaluator {
        fn start(&mut self) -> Result<()> {
            self.started = true;
            Ok(())
        }

        fn validate(&mut self) -> Result<f32> {
            if self.fail {
                return Err(OrchestratorError::InvalidConfig("evaluation failed".into()));
            }

            self.validations += 1;
            Ok(self.validations as f32)
        }

        fn save_weights(&self, tag: &str) -> Result<PathBuf> {
            Ok(PathBuf::from(format!("{tag}.weights")))
        }
    }

    fn create_validator(frequency: u64) -> (Validator<CountingEvaluator>, StepCounter) {
        let counter = StepCounter::new();
        let evaluator = Rc::new(RefCell::new(CountingEvaluator::default()));
        (Validator::new(counter.clone(), frequency, evaluator), counter)
    }

    #[test]
    fn test_cadence() {
        let (mut validator, counter) = create_validator(1000);

        let mut evaluated_at = Vec::new();
        for _ in 0..10_000 {
            counter.increment();
            if let Tick::Evaluated(step) = validator.tick().unwrap() {
                evaluated_at.push(step);
            }
        }

        assert_eq!(evaluated_at.len(), 9);
        assert_eq!(evaluated_at[0], 1001);
        assert!(evaluated_at.windows(2).all(|w| w[1] - w[0] == 1001));
        assert_eq!(validator.evaluations(), 9);
    }

    #[test]
    fn test_resumed_counter_is_not_evaluated_right_away() {
        let counter = StepCounter::new();
        counter.advance_to(50_000);

        let evaluator = Rc::new(RefCell::new(CountingEvaluator::default()));
        let mut validator = Validator::new(counter.clone(), 100, evaluator.clone());

        assert_eq!(validator.tick().unwrap(), Tick::Idle);
        counter.advance_to(50_101);
        assert_eq!(validator.tick().unwrap(), Tick::Evaluated(50_101));
        assert_eq!(evaluator.borrow().validations, 1);
    }

    #[test]
    fn test_huge_frequency_never_evaluates() {
        let (mut validator, counter) = create_validator(u64::MAX);

        counter.advance_to(i64::MAX - 1);
        assert_eq!(validator.tick().unwrap(), Tick::Idle);
        assert_eq!(validator.evaluations(), 0);
    }

    #[test]
    fn test_evaluation_errors_propagate() {
        let counter = StepCounter::new();
        let evaluator = Rc::new(RefCell::new(CountingEvaluator {
            fail: true,
            ..Default::default()
        }));
        let mut validator = Validator::new(counter.clone(), 1, evaluator);

        counter.advance_to(5);
        assert!(validator.tick().is_err());
    }

    #[tokio::test]
    async fn test_run_returns_on_sentinel() {
        let (mut validator, counter) = create_validator(10);
        counter.advance_to(5);

        let stopper = std::thread::spawn({
            let counter = counter.clone();
            move || {
                std::thread::sleep(Duration::from_millis(30));
                counter.advance_to(20);
                std::thread::sleep(Duration::from_millis(30));
                let stopped_at = Instant::now();
                counter.stop();
                stopped_at
            }
        });

        let evaluations = validator.run().await.unwrap();
        let returned_at = Instant::now();
        let stopped_at = stopper.join().unwrap();

        assert_eq!(evaluations, 1);
        assert!(returned_at.duration_since(stopped_at) < POLL_INTERVAL * 5);
    }

    #[tokio::test]
    async fn test_run_on_stopped_counter() {
        let (mut validator, counter) = create_validator(10);
        counter.stop();

        assert_eq!(validator.run().await.unwrap(), 0);
    }
}
