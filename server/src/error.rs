//! Error taxonomy of the session engine
//!
//! Every variant except `Io` and `WebSocket` is recoverable and stays inside
//! the connection handler that produced it.

use shared::{ClientId, ErrorKind, ParseError};
use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("unknown client {0}")]
    UnknownClient(ClientId),

    #[error("invalid guess: {0}")]
    InvalidGuess(String),

    #[error("no round has been started yet")]
    RoundNotStarted,

    #[error("a round is already running")]
    RoundAlreadyStarted,

    #[error("secret {0} is outside the allowed range")]
    InvalidSecret(i64),

    #[error("transport closed for {0}")]
    TransportClosed(ClientId),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("unrecognized action: {0}")]
    UnrecognizedAction(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    WebSocket(#[from] Box<tungstenite::Error>),
}

pub type Result<T> = std::result::Result<T, ServerError>;

impl ServerError {
    /// Wire-level class of this error, for errors a client gets told about.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ServerError::InvalidGuess(_) => Some(ErrorKind::InvalidGuess),
            ServerError::RoundNotStarted => Some(ErrorKind::RoundNotStarted),
            ServerError::MalformedMessage(_) => Some(ErrorKind::MalformedMessage),
            ServerError::UnrecognizedAction(_) => Some(ErrorKind::UnrecognizedAction),
            _ => None,
        }
    }

    /// Errors that end the connection they occurred on.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            ServerError::UnknownClient(_) | ServerError::TransportClosed(_)
        )
    }
}

impl From<ParseError> for ServerError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Malformed(reason) => ServerError::MalformedMessage(reason),
            ParseError::UnrecognizedAction(action) => ServerError::UnrecognizedAction(action),
        }
    }
}

impl From<tungstenite::Error> for ServerError {
    fn from(err: tungstenite::Error) -> Self {
        ServerError::WebSocket(Box::new(err))
    }
}
