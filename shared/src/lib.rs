use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use thiserror::Error;

pub const SECRET_RANGE: RangeInclusive<i64> = 1..=100;
pub const DEFAULT_PORT: u16 = 8765;

/// Actions a client may put in the `action` field.
pub const CLIENT_ACTIONS: [&str; 5] = [
    "connect",
    "guess",
    "get_attempts",
    "confirm_receipt",
    "get_status",
];

/// Server-assigned handle of one connection. Shown as `client_<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    TooLow,
    TooHigh,
}

impl Verdict {
    /// Human-readable text sent along with the verdict
    pub fn message(&self) -> &'static str {
        match self {
            Verdict::Correct => "Correct! You guessed the number.",
            Verdict::TooLow => "Too low: the secret number is higher.",
            Verdict::TooHigh => "Too high: the secret number is lower.",
        }
    }
}

/// Compares a guess against the secret
///
/// Guesses outside `SECRET_RANGE` are still evaluated, they just come back
/// as `TooLow` or `TooHigh`.
pub fn evaluate(secret: i64, guess: i64) -> Verdict {
    match guess.cmp(&secret) {
        Ordering::Equal => Verdict::Correct,
        Ordering::Less => Verdict::TooLow,
        Ordering::Greater => Verdict::TooHigh,
    }
}

/// Server messages a client is expected to acknowledge with `confirm_receipt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    ExperimentStart,
    GuessResult,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::ExperimentStart => "experiment_start",
            MessageKind::GuessResult => "guess_result",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "experiment_start" => Ok(MessageKind::ExperimentStart),
            "guess_result" => Ok(MessageKind::GuessResult),
            other => Err(other.to_string()),
        }
    }
}

/// Error classes reported back to a client in an `error` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownClient,
    InvalidGuess,
    RoundNotStarted,
    TransportClosed,
    MalformedMessage,
    UnrecognizedAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    Connect {
        #[serde(default)]
        name: String,
    },
    /// `guess` is kept raw: players may send a number or a string.
    Guess {
        guess: Value,
    },
    GetAttempts,
    ConfirmReceipt {
        message_type: String,
    },
    GetStatus,
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("unrecognized action: {0}")]
    UnrecognizedAction(String),
}

impl ClientMessage {
    /// Guess action carrying an integer
    pub fn guess(value: i64) -> Self {
        ClientMessage::Guess {
            guess: Value::from(value),
        }
    }

    /// Receipt confirmation for `kind`
    pub fn confirm(kind: MessageKind) -> Self {
        ClientMessage::ConfirmReceipt {
            message_type: kind.as_str().to_string(),
        }
    }

    /// Decodes one text frame, telling unknown actions apart from broken payloads.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ParseError::Malformed(e.to_string()))?;

        let action = value
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| ParseError::Malformed("missing \"action\" field".to_string()))?;

        if !CLIENT_ACTIONS.contains(&action) {
            return Err(ParseError::UnrecognizedAction(action.to_string()));
        }

        serde_json::from_value(value).map_err(|e| ParseError::Malformed(e.to_string()))
    }
}

/// Reads a guess payload as an integer. Strings are trimmed before parsing.
pub fn parse_guess(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ServerMessage {
    ExperimentStart {
        message: String,
    },
    #[serde(rename = "result")]
    GuessResult {
        message: String,
        verdict: Verdict,
    },
    Attempts {
        attempts: Vec<i64>,
    },
    Status {
        started: bool,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl ServerMessage {
    /// Notification broadcast when the operator starts the round
    pub fn experiment_start() -> Self {
        ServerMessage::ExperimentStart {
            message: "The experiment has started!".to_string(),
        }
    }

    /// Result message for an evaluated guess
    pub fn verdict(verdict: Verdict) -> Self {
        ServerMessage::GuessResult {
            message: verdict.message().to_string(),
            verdict,
        }
    }

    /// The confirmation this message asks for, if any.
    pub fn ack_kind(&self) -> Option<MessageKind> {
        match self {
            ServerMessage::ExperimentStart { .. } => Some(MessageKind::ExperimentStart),
            ServerMessage::GuessResult { .. } => Some(MessageKind::GuessResult),
            _ => None,
        }
    }
}
