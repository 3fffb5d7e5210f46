//! Server network layer handling websocket connections
//!
//! Every accepted connection gets two tasks: a reader that feeds text frames
//! to the [`SessionCoordinator`] in arrival order, and a writer that drains
//! the client's outbound queue into the socket. When the reader stops, for
//! whatever reason, the client is unregistered before the task exits.

use crate::coordinator::SessionCoordinator;
use crate::error::Result;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::{ClientId, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Websocket front end of the session coordinator
pub struct Server {
    listener: TcpListener,
    coordinator: Arc<SessionCoordinator>,
}

impl Server {
    /// Binds the listening socket
    ///
    /// Pass port 0 to let the OS choose a free port, then read it back with
    /// [`local_addr`](Self::local_addr).
    pub async fn bind(addr: &str, coordinator: Arc<SessionCoordinator>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            coordinator,
        })
    }

    /// Address the server is actually listening on
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared handle to the coordinator behind this server
    pub fn coordinator(&self) -> Arc<SessionCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Accepts connections until the listener fails
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    continue;
                }
            };

            let coordinator = Arc::clone(&self.coordinator);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(coordinator, stream, addr).await {
                    warn!("Connection from {} ended with error: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_connection(
    coordinator: Arc<SessionCoordinator>,
    stream: TcpStream,
    addr: SocketAddr,
) -> Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut incoming) = ws.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let client_id = coordinator.connect(tx).await;
    info!("Client {} connected from {}", client_id, addr);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode message for {}: {}", client_id, e);
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::text(text)).await {
                debug!("Writer for {} stopped: {}", client_id, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    let result = read_loop(&coordinator, client_id, &mut incoming).await;

    // Dropping the session closes the outbound queue, which ends the writer.
    coordinator.disconnect(client_id).await;
    if let Err(e) = writer.await {
        error!("Writer task for {} panicked: {}", client_id, e);
    }
    info!("Client {} disconnected", client_id);

    result
}

async fn read_loop(
    coordinator: &SessionCoordinator,
    client_id: ClientId,
    incoming: &mut SplitStream<WebSocketStream<TcpStream>>,
) -> Result<()> {
    while let Some(frame) = incoming.next().await {
        match frame? {
            Message::Text(text) => {
                if let Err(e) = coordinator.handle_text(client_id, text.as_str()).await {
                    if e.is_disconnect() {
                        return Err(e);
                    }
                    warn!("Client {}: {}", client_id, e);
                }
            }
            Message::Close(_) => break,
            Message::Binary(_) => {
                debug!("Ignoring binary frame from {}", client_id);
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }

    Ok(())
}
