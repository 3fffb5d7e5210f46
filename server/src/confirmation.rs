//! Delivery confirmations for acknowledgeable server messages
//!
//! Purely an observability signal: nothing is re-sent when a confirmation
//! never arrives.

use serde::Serialize;
use shared::MessageKind;

/// Per-client acknowledgement flags. Flags only ever go from false to true.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Confirmations {
    pub experiment_start: bool,
    pub guess_result: bool,
}

impl Confirmations {
    /// Creates a record with nothing confirmed yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `kind` as confirmed. Returns true the first time only.
    pub fn confirm(&mut self, kind: MessageKind) -> bool {
        let flag = match kind {
            MessageKind::ExperimentStart => &mut self.experiment_start,
            MessageKind::GuessResult => &mut self.guess_result,
        };
        let newly_confirmed = !*flag;
        *flag = true;
        newly_confirmed
    }

    /// Returns true once `kind` has been confirmed
    pub fn is_confirmed(&self, kind: MessageKind) -> bool {
        match kind {
            MessageKind::ExperimentStart => self.experiment_start,
            MessageKind::GuessResult => self.guess_result,
        }
    }
}
