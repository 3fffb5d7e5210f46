//! Experiment round lifecycle
//!
//! A round moves from `NotStarted` to `Running` exactly once per process.
//! The secret only exists while running, so evaluating a guess before the
//! operator starts the round fails instead of comparing against nothing.

use crate::error::{Result, ServerError};
use log::info;
use rand::Rng;
use shared::{evaluate, Verdict, SECRET_RANGE};
use std::time::{Duration, Instant};

/// Lifecycle of the single experiment round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    NotStarted,
    Running { secret: i64 },
}

#[derive(Debug)]
pub struct Experiment {
    state: RoundState,
    started_at: Option<Instant>,
}

impl Experiment {
    /// Creates an experiment whose round has not started yet
    pub fn new() -> Self {
        Self {
            state: RoundState::NotStarted,
            started_at: None,
        }
    }

    /// Starts the round with a secret drawn uniformly from `SECRET_RANGE`
    ///
    /// Repeat starts are rejected so guesses already made keep referring to
    /// the same secret.
    pub fn start(&mut self) -> Result<i64> {
        let secret = rand::thread_rng().gen_range(SECRET_RANGE);
        self.start_with_secret(secret)
    }

    /// Starts the round with a known secret
    ///
    /// The secret must lie in `SECRET_RANGE`. Nothing changes when the secret
    /// is out of range or a round is already running.
    pub fn start_with_secret(&mut self, secret: i64) -> Result<i64> {
        if !SECRET_RANGE.contains(&secret) {
            return Err(ServerError::InvalidSecret(secret));
        }
        if self.is_started() {
            return Err(ServerError::RoundAlreadyStarted);
        }

        self.state = RoundState::Running { secret };
        self.started_at = Some(Instant::now());
        info!("Experiment started, secret number is {}", secret);
        Ok(secret)
    }

    /// Returns true once the operator has started the round
    pub fn is_started(&self) -> bool {
        matches!(self.state, RoundState::Running { .. })
    }

    /// Returns the secret while the round is running
    pub fn secret(&self) -> Option<i64> {
        match self.state {
            RoundState::Running { secret } => Some(secret),
            RoundState::NotStarted => None,
        }
    }

    /// Time since the round started, if it has
    pub fn running_for(&self) -> Option<Duration> {
        self.started_at.map(|started| started.elapsed())
    }

    /// Compares a guess against the secret
    ///
    /// Fails with `RoundNotStarted` until the operator starts the round.
    pub fn evaluate(&self, guess: i64) -> Result<Verdict> {
        self.secret()
            .map(|secret| evaluate(secret, guess))
            .ok_or(ServerError::RoundNotStarted)
    }
}

impl Default for Experiment {
    fn default() -> Self {
        Self::new()
    }
}
