//! Connection registry and per-client session state
//!
//! This module tracks everything the server knows about a connected player:
//! - The outbound channel used to reach their connection
//! - The ordered history of accepted guesses and how many were correct
//! - Which acknowledgeable messages the player has confirmed
//!
//! A session lives exactly as long as its registry entry. Disconnecting
//! drops the channel, the guess history and the confirmation record at once.

use crate::confirmation::Confirmations;
use crate::error::{Result, ServerError};
use log::{info, warn};
use serde::Serialize;
use shared::{ClientId, ServerMessage, Verdict};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Queue drained by a connection's writer task.
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// Derived per-client standing, recomputed on every query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub id: ClientId,
    pub name: Option<String>,
    pub attempts: usize,
    pub guessed: bool,
    pub correct_guesses: u32,
}

/// Outcome of a broadcast
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<ClientId>,
    pub failed: Vec<ClientId>,
}

/// A connected player's session
#[derive(Debug)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: ClientId,
    /// Display name announced with the `connect` action
    pub name: Option<String>,
    /// Accepted guesses in arrival order
    pub guesses: Vec<i64>,
    pub has_guessed_correctly: bool,
    pub correct_guess_count: u32,
    pub confirmations: Confirmations,
    sender: Outbound,
}

impl Client {
    /// Creates an empty session bound to a connection's outbound queue
    pub fn new(id: ClientId, sender: Outbound) -> Self {
        Self {
            id,
            name: None,
            guesses: Vec::new(),
            has_guessed_correctly: false,
            correct_guess_count: 0,
            confirmations: Confirmations::new(),
            sender,
        }
    }

    /// Appends an evaluated guess to the history
    ///
    /// Guesses after a correct one are still recorded, and every further
    /// correct guess bumps the counter.
    pub fn record_guess(&mut self, guess: i64, verdict: Verdict) {
        self.guesses.push(guess);
        if verdict == Verdict::Correct {
            self.has_guessed_correctly = true;
            self.correct_guess_count += 1;
        }
    }

    /// Number of accepted guesses so far
    pub fn attempt_count(&self) -> usize {
        self.guesses.len()
    }

    /// Snapshot of this client's standing for the operator
    pub fn leaderboard_entry(&self) -> LeaderboardEntry {
        LeaderboardEntry {
            id: self.id,
            name: self.name.clone(),
            attempts: self.attempt_count(),
            guessed: self.has_guessed_correctly,
            correct_guesses: self.correct_guess_count,
        }
    }

    /// Queues a message on this client's connection
    pub fn send(&self, message: ServerMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| ServerError::TransportClosed(self.id))
    }
}

/// Maps client identifiers to their sessions and outbound channels
///
/// Identifiers come from a counter that only moves forward, so an id is
/// never handed out twice within one server process.
#[derive(Debug)]
pub struct ClientManager {
    /// Connected clients indexed by their unique ID
    clients: HashMap<ClientId, Client>,
    /// Next available client ID for new connections
    next_client_id: u32,
}

impl ClientManager {
    /// Creates an empty registry. The first client gets id 1.
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
        }
    }

    /// Registers a new connection and creates its empty session
    pub fn register(&mut self, sender: Outbound) -> ClientId {
        let client_id = ClientId(self.next_client_id);
        self.next_client_id += 1;

        self.clients.insert(client_id, Client::new(client_id, sender));
        info!("Registered client {}", client_id);

        client_id
    }

    /// Removes a client together with its session
    ///
    /// Returns true if the client was found and removed, false if they were
    /// already gone.
    pub fn unregister(&mut self, client_id: &ClientId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!(
                "Unregistered client {} after {} guesses",
                client.id,
                client.attempt_count()
            );
            true
        } else {
            false
        }
    }

    /// Looks up a client's session
    ///
    /// Fails with `UnknownClient` once the client has disconnected.
    pub fn get(&self, client_id: &ClientId) -> Result<&Client> {
        self.clients
            .get(client_id)
            .ok_or(ServerError::UnknownClient(*client_id))
    }

    /// Mutable variant of [`get`](Self::get)
    pub fn get_mut(&mut self, client_id: &ClientId) -> Result<&mut Client> {
        self.clients
            .get_mut(client_id)
            .ok_or(ServerError::UnknownClient(*client_id))
    }

    /// Delivers a message to exactly one client
    pub fn send(&self, client_id: &ClientId, message: ServerMessage) -> Result<()> {
        self.get(client_id)?.send(message)
    }

    /// Delivers a message to every registered client
    ///
    /// The recipient list is taken before sending. A closed channel is logged
    /// and reported, it never stops delivery to the remaining clients.
    pub fn broadcast(&self, message: &ServerMessage) -> BroadcastReport {
        let recipients: Vec<&Client> = self.clients.values().collect();
        let mut report = BroadcastReport::default();

        for client in recipients {
            match client.send(message.clone()) {
                Ok(()) => report.delivered.push(client.id),
                Err(e) => {
                    warn!("Broadcast to {} failed: {}", client.id, e);
                    report.failed.push(client.id);
                }
            }
        }

        report.delivered.sort();
        report.failed.sort();
        report
    }

    /// Ids of all connected clients in allocation order
    pub fn ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.clients.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Connected clients in allocation order
    pub fn sorted(&self) -> Vec<&Client> {
        let mut clients: Vec<&Client> = self.clients.values().collect();
        clients.sort_by_key(|c| c.id);
        clients
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl Default for ClientManager {
    fn default() -> Self {
        Self::new()
    }
}
