use serde::Deserialize;

/// The outcome of taking an action in an environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    /// The state reached after the action.
    pub state: usize,
    pub reward: f32,
    /// Whether the episode ended, either on a terminal state or by truncation.
    pub done: bool,
    /// Whether the episode ended on a terminal state, as opposed to being truncated.
    pub terminal: bool,
}

/// A discrete episodic environment an agent can step through.
///
/// Constructing an environment might not be safe to do concurrently, callers serialize it.
/// Stepping distinct instances concurrently is always safe.
pub trait Environment {
    fn num_states(&self) -> usize;

    fn num_actions(&self) -> usize;

    /// Starts a new episode.
    ///
    /// # Returns
    /// The initial state.
    fn reset(&mut self) -> usize;

    /// Applies `action` to the current state.
    ///
    /// # Panics
    /// If `action` is not lower than `num_actions`.
    fn step(&mut self, action: usize) -> Transition;
}

/// Settings of the built-in [`Corridor`] environment.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CorridorConfig {
    pub length: usize,
    pub max_episode_steps: usize,
}

impl Default for CorridorConfig {
    fn default() -> Self {
        Self {
            length: 10,
            max_episode_steps: 100,
        }
    }
}

impl CorridorConfig {
    pub fn build(&self) -> Corridor {
        Corridor::new(self.length, self.max_episode_steps)
    }
}

/// A one dimensional corridor, the agent starts at the left end and is rewarded when it
/// reaches the right end.
///
/// Action `0` moves left and action `1` moves right, walking into the left wall keeps the agent
/// in place. Episodes longer than `max_steps` are truncated.
#[derive(Debug, Clone)]
pub struct Corridor {
    length: usize,
    max_steps: usize,
    position: usize,
    steps: usize,
}

impl Corridor {
    pub const LEFT: usize = 0;
    pub const RIGHT: usize = 1;

    /// Creates a new `Corridor`.
    ///
    /// # Arguments
    /// * `length` - The amount of cells, at least 2.
    /// * `max_steps` - The maximum length of an episode.
    pub fn new(length: usize, max_steps: usize) -> Self {
        Self {
            length: length.max(2),
            max_steps: max_steps.max(1),
            position: 0,
            steps: 0,
        }
    }

    pub fn goal(&self) -> usize {
        self.length - 1
    }
}

impl Environment for Corridor {
    fn num_states(&self) -> usize {
        self.length
    }

    fn num_actions(&self) -> usize {
        2
    }

    fn reset(&mut self) -> usize {
        self.position = 0;
        self.steps = 0;
        self.position
    }

    fn step(&mut self, action: usize) -> Transition {
        assert!(action < self.num_actions(), "invalid action {action}");

        self.position = match action {
            Self::LEFT => self.position.saturating_sub(1),
            _ => (self.position + 1).min(self.goal()),
        };
        self.steps += 1;

        let terminal = self.position == self.goal();

        Transition {
            state: self.position,
            reward: if terminal { 1. } else { 0. },
            done: terminal || self.steps >= self.max_steps,
            terminal,
        }
    }
}
