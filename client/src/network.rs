use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, warn};
use shared::{ClientMessage, MessageKind, ServerMessage};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    WebSocket(#[from] Box<tungstenite::Error>),

    #[error("invalid server message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("connection closed")]
    Closed,
}

impl From<tungstenite::Error> for ClientError {
    fn from(err: tungstenite::Error) -> Self {
        ClientError::WebSocket(Box::new(err))
    }
}

/// Cloneable handle for queueing messages to the server
#[derive(Debug, Clone)]
pub struct MessageSender {
    tx: mpsc::UnboundedSender<ClientMessage>,
}

impl MessageSender {
    /// Queues a message for the writer task
    ///
    /// Fails with `Closed` once the connection has gone away.
    pub fn send(&self, message: ClientMessage) -> Result<(), ClientError> {
        self.tx.send(message).map_err(|_| ClientError::Closed)
    }

    /// Announces the player's display name
    pub fn join(&self, name: &str) -> Result<(), ClientError> {
        self.send(ClientMessage::Connect {
            name: name.to_string(),
        })
    }

    pub fn guess(&self, guess: i64) -> Result<(), ClientError> {
        self.send(ClientMessage::guess(guess))
    }

    /// Sends the guess exactly as typed; the server validates it
    pub fn guess_raw(&self, guess: &str) -> Result<(), ClientError> {
        self.send(ClientMessage::Guess {
            guess: guess.into(),
        })
    }

    pub fn request_attempts(&self) -> Result<(), ClientError> {
        self.send(ClientMessage::GetAttempts)
    }

    pub fn request_status(&self) -> Result<(), ClientError> {
        self.send(ClientMessage::GetStatus)
    }

    /// Acknowledges receipt of an `experiment_start` or guess result
    pub fn confirm(&self, kind: MessageKind) -> Result<(), ClientError> {
        self.send(ClientMessage::confirm(kind))
    }
}

/// Websocket connection to the experiment server
///
/// Outgoing messages go through a queue drained by a writer task, so a
/// [`MessageSender`] can be used while another task waits on
/// [`next_message`](GameClient::next_message).
pub struct GameClient {
    sender: MessageSender,
    incoming: SplitStream<WsStream>,
    writer: JoinHandle<()>,
    auto_confirm: bool,
}

impl GameClient {
    /// Opens the websocket and starts the writer task
    pub async fn connect(url: &str) -> Result<Self, ClientError> {
        let (ws, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut sink, incoming) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<ClientMessage>();

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to encode message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::text(text)).await {
                    debug!("Writer stopped: {}", e);
                    break;
                }
            }
            let _ = sink.close().await;
        });

        Ok(GameClient {
            sender: MessageSender { tx },
            incoming,
            writer,
            auto_confirm: true,
        })
    }

    /// Turns automatic `confirm_receipt` replies on or off
    pub fn set_auto_confirm(&mut self, enabled: bool) {
        self.auto_confirm = enabled;
    }

    /// Returns a handle for sending while this client is being read
    pub fn sender(&self) -> MessageSender {
        self.sender.clone()
    }

    /// Waits for the next message from the server
    ///
    /// Returns `Ok(None)` once the server closes the connection. With
    /// auto-confirm on, `experiment_start` and `result` messages are
    /// acknowledged before being returned.
    pub async fn next_message(&mut self) -> Result<Option<ServerMessage>, ClientError> {
        while let Some(frame) = self.incoming.next().await {
            let text = match frame? {
                Message::Text(text) => text,
                Message::Close(_) => return Ok(None),
                _ => continue,
            };

            let message: ServerMessage = serde_json::from_str(text.as_str())?;
            if self.auto_confirm {
                if let Some(kind) = message.ack_kind() {
                    if let Err(e) = self.sender.confirm(kind) {
                        warn!("Could not confirm {}: {}", kind, e);
                    }
                }
            }
            return Ok(Some(message));
        }

        Ok(None)
    }

    /// Closes the connection once queued messages are written
    ///
    /// Waits until every [`MessageSender`] obtained from this client has
    /// been dropped.
    pub async fn close(self) {
        let GameClient { sender, writer, .. } = self;
        drop(sender);
        let _ = writer.await;
    }
}
