//! Session coordinator: the shared state every connection handler talks to
//!
//! The registry, the experiment round and the leaders map live behind a
//! single lock. Each operation takes that lock once, performs its short
//! update and queues the resulting messages on the clients' outbound
//! channels. Queueing never waits on the network, so no handler holds the
//! lock across I/O.

use crate::client_manager::{ClientManager, LeaderboardEntry, Outbound};
use crate::confirmation::Confirmations;
use crate::error::{Result, ServerError};
use crate::experiment::Experiment;
use log::{debug, info, warn};
use serde_json::Value;
use shared::{parse_guess, ClientId, ClientMessage, MessageKind, ServerMessage, Verdict};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// Round status as seen by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundStatus {
    pub started: bool,
    pub secret: Option<i64>,
    /// Time since the operator started the round
    pub running_for: Option<Duration>,
}

#[derive(Debug, Default)]
struct CoordinatorState {
    clients: ClientManager,
    experiment: Experiment,
    /// Attempt count at the client's latest correct guess
    leaders: HashMap<ClientId, usize>,
}

#[derive(Debug, Default)]
pub struct SessionCoordinator {
    state: RwLock<CoordinatorState>,
}

impl SessionCoordinator {
    /// Creates a coordinator with no clients and no running round
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection and returns its identifier
    pub async fn connect(&self, sender: Outbound) -> ClientId {
        let mut state = self.state.write().await;
        state.clients.register(sender)
    }

    /// Drops a client's channel, session and leaderboard record
    pub async fn disconnect(&self, client_id: ClientId) -> bool {
        let mut state = self.state.write().await;
        state.leaders.remove(&client_id);
        state.clients.unregister(&client_id)
    }

    /// Starts the round and notifies every client connected right now
    pub async fn start_round(&self) -> Result<i64> {
        let mut state = self.state.write().await;
        let secret = state.experiment.start()?;
        Self::announce_start(&state);
        Ok(secret)
    }

    /// Same as [`start_round`](Self::start_round) with a chosen secret
    ///
    /// Secrets outside `SECRET_RANGE` are rejected and nobody is notified.
    pub async fn start_round_with_secret(&self, secret: i64) -> Result<i64> {
        let mut state = self.state.write().await;
        let secret = state.experiment.start_with_secret(secret)?;
        Self::announce_start(&state);
        Ok(secret)
    }

    fn announce_start(state: &CoordinatorState) {
        let report = state.clients.broadcast(&ServerMessage::experiment_start());
        info!(
            "Announced experiment start to {} clients ({} failed)",
            report.delivered.len(),
            report.failed.len()
        );
    }

    /// Sends a message to a single client
    pub async fn send_to(&self, client_id: ClientId, message: ServerMessage) -> Result<()> {
        let state = self.state.read().await;
        state.clients.send(&client_id, message)
    }

    /// Handles one raw text frame from a client
    ///
    /// Errors a client can act on (bad guess, no round yet, unparseable or
    /// unknown message) are reported back to that client before being
    /// returned to the caller for logging.
    pub async fn handle_text(&self, client_id: ClientId, text: &str) -> Result<()> {
        let result = match ClientMessage::parse(text) {
            Ok(message) => self.handle_message(client_id, message).await,
            Err(e) => Err(e.into()),
        };

        if let Err(err) = &result {
            if let Some(kind) = err.kind() {
                self.send_to(
                    client_id,
                    ServerMessage::Error {
                        kind,
                        message: err.to_string(),
                    },
                )
                .await?;
            }
        }

        result
    }

    /// Dispatches a parsed client message
    pub async fn handle_message(&self, client_id: ClientId, message: ClientMessage) -> Result<()> {
        match message {
            ClientMessage::Connect { name } => self.process_connect(client_id, name).await,
            ClientMessage::Guess { guess } => self.process_guess(client_id, &guess).await,
            ClientMessage::GetAttempts => self.send_attempts(client_id).await,
            ClientMessage::ConfirmReceipt { message_type } => {
                self.process_confirmation(client_id, &message_type).await
            }
            ClientMessage::GetStatus => self.send_status(client_id).await,
        }
    }

    async fn process_connect(&self, client_id: ClientId, name: String) -> Result<()> {
        let mut state = self.state.write().await;
        let client = state.clients.get_mut(&client_id)?;
        info!("Client {} introduced itself as {:?}", client_id, name);
        client.name = Some(name);
        Ok(())
    }

    async fn process_guess(&self, client_id: ClientId, raw: &Value) -> Result<()> {
        let guess =
            parse_guess(raw).ok_or_else(|| ServerError::InvalidGuess(raw.to_string()))?;

        let mut state = self.state.write().await;
        let CoordinatorState {
            clients,
            experiment,
            leaders,
        } = &mut *state;

        let client = clients.get_mut(&client_id)?;
        let verdict = experiment.evaluate(guess)?;
        client.record_guess(guess, verdict);

        debug!(
            "Client {} guessed {} ({:?}), secret is {:?}",
            client_id,
            guess,
            verdict,
            experiment.secret()
        );

        if verdict == Verdict::Correct {
            leaders.insert(client_id, client.attempt_count());
            info!(
                "Client {} guessed the number after {} attempts",
                client_id,
                client.attempt_count()
            );
        }

        client.send(ServerMessage::verdict(verdict))
    }

    async fn send_attempts(&self, client_id: ClientId) -> Result<()> {
        let state = self.state.read().await;
        let client = state.clients.get(&client_id)?;
        client.send(ServerMessage::Attempts {
            attempts: client.guesses.clone(),
        })
    }

    async fn process_confirmation(&self, client_id: ClientId, message_type: &str) -> Result<()> {
        let kind: MessageKind = match message_type.parse() {
            Ok(kind) => kind,
            Err(other) => {
                warn!(
                    "Client {} confirmed unknown message type {:?}",
                    client_id, other
                );
                return Ok(());
            }
        };

        let mut state = self.state.write().await;
        let client = state.clients.get_mut(&client_id)?;
        if client.confirmations.confirm(kind) {
            info!("Client {} confirmed receipt of {}", client_id, kind);
        }
        Ok(())
    }

    async fn send_status(&self, client_id: ClientId) -> Result<()> {
        let state = self.state.read().await;
        let started = state.experiment.is_started();
        state
            .clients
            .send(&client_id, ServerMessage::Status { started })
    }

    /// Identifiers of all connected clients in allocation order
    pub async fn list_clients(&self) -> Vec<ClientId> {
        self.state.read().await.clients.ids()
    }

    /// Attempts and results of every connected client
    pub async fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let state = self.state.read().await;
        let entries = state
            .clients
            .sorted()
            .into_iter()
            .map(|client| client.leaderboard_entry())
            .collect();
        entries
    }

    /// Delivery confirmation flags of every connected client
    pub async fn confirmation_status(&self) -> Vec<(ClientId, Confirmations)> {
        let state = self.state.read().await;
        let status = state
            .clients
            .sorted()
            .into_iter()
            .map(|client| (client.id, client.confirmations))
            .collect();
        status
    }

    /// Clients who guessed correctly, with their attempt count at that time
    pub async fn leaders(&self) -> Vec<(ClientId, usize)> {
        let state = self.state.read().await;
        let mut leaders: Vec<(ClientId, usize)> =
            state.leaders.iter().map(|(id, n)| (*id, *n)).collect();
        leaders.sort();
        leaders
    }

    /// Whether the round is running, its secret and how long it has run
    pub async fn round(&self) -> RoundStatus {
        let state = self.state.read().await;
        RoundStatus {
            started: state.experiment.is_started(),
            secret: state.experiment.secret(),
            running_for: state.experiment.running_for(),
        }
    }

    /// Number of currently connected clients
    pub async fn client_count(&self) -> usize {
        self.state.read().await.clients.len()
    }

    /// Accepted guesses of one client, in order
    pub async fn guesses(&self, client_id: ClientId) -> Result<Vec<i64>> {
        let state = self.state.read().await;
        Ok(state.clients.get(&client_id)?.guesses.clone())
    }

    /// Leaderboard entry of one client
    pub async fn standing(&self, client_id: ClientId) -> Result<LeaderboardEntry> {
        let state = self.state.read().await;
        Ok(state.clients.get(&client_id)?.leaderboard_entry())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::ErrorKind;
    use tokio::sync::mpsc;
    use tokio_test::assert_ok;

    type Inbox = mpsc::UnboundedReceiver<ServerMessage>;

    async fn join(coordinator: &SessionCoordinator) -> (ClientId, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (coordinator.connect(tx).await, rx)
    }

    fn guess_frame(guess: &str) -> String {
        format!(r#"{{"action": "guess", "guess": {}}}"#, guess)
    }

    #[tokio::test]
    async fn test_guess_scenario() {
        let coordinator = SessionCoordinator::new();
        let (a, mut inbox) = join(&coordinator).await;
        assert_ok!(coordinator.start_round_with_secret(42).await);
        assert_eq!(inbox.try_recv().unwrap(), ServerMessage::experiment_start());

        assert_ok!(coordinator.handle_text(a, &guess_frame("50")).await);
        assert_eq!(
            inbox.try_recv().unwrap(),
            ServerMessage::verdict(Verdict::TooHigh)
        );

        assert_ok!(coordinator.handle_text(a, &guess_frame("\"42\"")).await);
        assert_eq!(
            inbox.try_recv().unwrap(),
            ServerMessage::verdict(Verdict::Correct)
        );

        let standing = coordinator.standing(a).await.unwrap();
        assert_eq!(standing.correct_guesses, 1);
        assert!(standing.guessed);

        assert_ok!(
            coordinator
                .handle_text(a, r#"{"action": "get_attempts"}"#)
                .await
        );
        assert_eq!(
            inbox.try_recv().unwrap(),
            ServerMessage::Attempts {
                attempts: vec![50, 42]
            }
        );
        assert_eq!(coordinator.leaders().await, vec![(a, 2)]);
    }

    #[tokio::test]
    async fn test_guess_before_round() {
        let coordinator = SessionCoordinator::new();
        let (a, mut inbox) = join(&coordinator).await;

        let result = coordinator.handle_text(a, &guess_frame("10")).await;
        assert!(matches!(result, Err(ServerError::RoundNotStarted)));

        match inbox.try_recv().unwrap() {
            ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::RoundNotStarted),
            other => panic!("Unexpected message {:?}", other),
        }
        assert!(coordinator.guesses(a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_guess_reported_to_sender_only() {
        let coordinator = SessionCoordinator::new();
        let (a, mut inbox_a) = join(&coordinator).await;
        let (b, mut inbox_b) = join(&coordinator).await;
        coordinator.start_round_with_secret(30).await.unwrap();
        inbox_a.try_recv().unwrap();
        inbox_b.try_recv().unwrap();

        let result = coordinator.handle_text(a, &guess_frame("\"thirty\"")).await;
        assert!(matches!(result, Err(ServerError::InvalidGuess(_))));

        match inbox_a.try_recv().unwrap() {
            ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::InvalidGuess),
            other => panic!("Unexpected message {:?}", other),
        }
        assert!(inbox_b.try_recv().is_err());

        assert_ok!(coordinator.handle_text(b, &guess_frame("30")).await);
        assert_eq!(
            inbox_b.try_recv().unwrap(),
            ServerMessage::verdict(Verdict::Correct)
        );
        assert!(coordinator.guesses(a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_and_unrecognized_frames() {
        let coordinator = SessionCoordinator::new();
        let (a, mut inbox) = join(&coordinator).await;

        let result = coordinator.handle_text(a, "{oops").await;
        assert!(matches!(result, Err(ServerError::MalformedMessage(_))));
        assert!(matches!(
            inbox.try_recv().unwrap(),
            ServerMessage::Error {
                kind: ErrorKind::MalformedMessage,
                ..
            }
        ));

        let result = coordinator
            .handle_text(a, r#"{"action": "start_experiment"}"#)
            .await;
        assert!(matches!(result, Err(ServerError::UnrecognizedAction(_))));
        assert!(matches!(
            inbox.try_recv().unwrap(),
            ServerMessage::Error {
                kind: ErrorKind::UnrecognizedAction,
                ..
            }
        ));
        assert!(!coordinator.round().await.started);
    }

    #[tokio::test]
    async fn test_attempts_are_private() {
        let coordinator = SessionCoordinator::new();
        let (a, mut inbox_a) = join(&coordinator).await;
        let (b, mut inbox_b) = join(&coordinator).await;
        coordinator.start_round_with_secret(5).await.unwrap();
        inbox_a.try_recv().unwrap();
        inbox_b.try_recv().unwrap();

        coordinator
            .handle_message(a, ClientMessage::guess(1))
            .await
            .unwrap();
        coordinator
            .handle_message(b, ClientMessage::guess(9))
            .await
            .unwrap();
        coordinator
            .handle_message(b, ClientMessage::guess(9))
            .await
            .unwrap();
        inbox_a.try_recv().unwrap();
        inbox_b.try_recv().unwrap();
        inbox_b.try_recv().unwrap();

        coordinator
            .handle_message(b, ClientMessage::GetAttempts)
            .await
            .unwrap();
        assert_eq!(
            inbox_b.try_recv().unwrap(),
            ServerMessage::Attempts {
                attempts: vec![9, 9]
            }
        );
        assert!(inbox_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_guesses_after_correct_are_recorded() {
        let coordinator = SessionCoordinator::new();
        let (a, _inbox) = join(&coordinator).await;
        coordinator.start_round_with_secret(42).await.unwrap();

        for guess in [42, 10, 42] {
            coordinator
                .handle_message(a, ClientMessage::guess(guess))
                .await
                .unwrap();
        }

        assert_eq!(coordinator.guesses(a).await.unwrap(), vec![42, 10, 42]);
        let standing = coordinator.standing(a).await.unwrap();
        assert_eq!(standing.correct_guesses, 2);
        assert_eq!(coordinator.leaders().await, vec![(a, 3)]);
    }

    #[tokio::test]
    async fn test_start_reaches_only_registered_clients() {
        let coordinator = SessionCoordinator::new();
        let (_a, mut inbox_a) = join(&coordinator).await;
        let (_b, mut inbox_b) = join(&coordinator).await;

        coordinator.start_round_with_secret(77).await.unwrap();
        let (c, mut inbox_c) = join(&coordinator).await;

        assert_eq!(inbox_a.try_recv().unwrap(), ServerMessage::experiment_start());
        assert_eq!(inbox_b.try_recv().unwrap(), ServerMessage::experiment_start());
        assert!(inbox_c.try_recv().is_err());

        coordinator
            .handle_message(c, ClientMessage::guess(80))
            .await
            .unwrap();
        assert_eq!(
            inbox_c.try_recv().unwrap(),
            ServerMessage::verdict(Verdict::TooHigh)
        );
        assert!(inbox_c.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_repeat_start_is_rejected() {
        let coordinator = SessionCoordinator::new();
        let (_a, mut inbox) = join(&coordinator).await;

        coordinator.start_round_with_secret(12).await.unwrap();
        let result = coordinator.start_round().await;

        assert!(matches!(result, Err(ServerError::RoundAlreadyStarted)));
        let round = coordinator.round().await;
        assert!(round.started);
        assert_eq!(round.secret, Some(12));
        assert!(round.running_for.is_some());
        inbox.try_recv().unwrap();
        assert!(inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_out_of_range_secret_is_rejected() {
        let coordinator = SessionCoordinator::new();
        let (a, mut inbox) = join(&coordinator).await;

        let result = coordinator.start_round_with_secret(500).await;
        assert!(matches!(result, Err(ServerError::InvalidSecret(500))));
        assert!(matches!(
            coordinator.start_round_with_secret(0).await,
            Err(ServerError::InvalidSecret(0))
        ));

        let round = coordinator.round().await;
        assert!(!round.started);
        assert_eq!(round.secret, None);
        assert!(round.running_for.is_none());
        assert!(inbox.try_recv().is_err());

        let result = coordinator.handle_text(a, &guess_frame("100")).await;
        assert!(matches!(result, Err(ServerError::RoundNotStarted)));
        match inbox.try_recv().unwrap() {
            ServerMessage::Error { kind, .. } => assert_eq!(kind, ErrorKind::RoundNotStarted),
            other => panic!("Unexpected message {:?}", other),
        }

        assert_ok!(coordinator.start_round_with_secret(100).await);
        assert_eq!(inbox.try_recv().unwrap(), ServerMessage::experiment_start());
    }

    #[tokio::test]
    async fn test_status_query() {
        let coordinator = SessionCoordinator::new();
        let (a, mut inbox) = join(&coordinator).await;

        coordinator
            .handle_message(a, ClientMessage::GetStatus)
            .await
            .unwrap();
        assert_eq!(
            inbox.try_recv().unwrap(),
            ServerMessage::Status { started: false }
        );

        coordinator.start_round().await.unwrap();
        inbox.try_recv().unwrap();
        coordinator
            .handle_message(a, ClientMessage::GetStatus)
            .await
            .unwrap();
        assert_eq!(
            inbox.try_recv().unwrap(),
            ServerMessage::Status { started: true }
        );
    }

    #[tokio::test]
    async fn test_confirmations() {
        let coordinator = SessionCoordinator::new();
        let (a, _inbox_a) = join(&coordinator).await;
        let (b, _inbox_b) = join(&coordinator).await;

        let status = coordinator.confirmation_status().await;
        assert_eq!(
            status,
            vec![(a, Confirmations::default()), (b, Confirmations::default())]
        );

        coordinator
            .handle_message(a, ClientMessage::confirm(MessageKind::ExperimentStart))
            .await
            .unwrap();
        coordinator
            .handle_text(a, r#"{"action": "confirm_receipt", "message_type": "bogus"}"#)
            .await
            .unwrap();

        let status = coordinator.confirmation_status().await;
        assert!(status[0].1.experiment_start);
        assert!(!status[0].1.guess_result);
        assert_eq!(status[1].1, Confirmations::default());

        coordinator.start_round_with_secret(3).await.unwrap();
        coordinator
            .handle_message(a, ClientMessage::guess(3))
            .await
            .unwrap();
        assert!(coordinator.confirmation_status().await[0].1.experiment_start);
    }

    #[tokio::test]
    async fn test_connect_sets_name() {
        let coordinator = SessionCoordinator::new();
        let (a, mut inbox) = join(&coordinator).await;

        coordinator
            .handle_text(a, r#"{"action": "connect", "name": "alice"}"#)
            .await
            .unwrap();

        assert_eq!(
            coordinator.standing(a).await.unwrap().name.as_deref(),
            Some("alice")
        );
        assert!(inbox.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_drops_session() {
        let coordinator = SessionCoordinator::new();
        let (a, _inbox_a) = join(&coordinator).await;
        let (b, _inbox_b) = join(&coordinator).await;
        coordinator.start_round_with_secret(1).await.unwrap();
        coordinator
            .handle_message(a, ClientMessage::guess(1))
            .await
            .unwrap();

        assert!(coordinator.disconnect(a).await);
        assert!(!coordinator.disconnect(a).await);

        assert_eq!(coordinator.list_clients().await, vec![b]);
        assert!(coordinator.leaders().await.is_empty());
        assert!(matches!(
            coordinator.guesses(a).await,
            Err(ServerError::UnknownClient(_))
        ));
        assert!(matches!(
            coordinator
                .send_to(a, ServerMessage::Status { started: true })
                .await,
            Err(ServerError::UnknownClient(_))
        ));
        assert!(matches!(
            coordinator.handle_message(a, ClientMessage::guess(1)).await,
            Err(ServerError::UnknownClient(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_channel_surfaces_transport_error() {
        let coordinator = SessionCoordinator::new();
        let (a, inbox) = join(&coordinator).await;
        drop(inbox);

        let result = coordinator.handle_message(a, ClientMessage::GetStatus).await;
        assert!(matches!(result, Err(ServerError::TransportClosed(id)) if id == a));
    }

    #[tokio::test]
    async fn test_leaderboard_in_id_order() {
        let coordinator = SessionCoordinator::new();
        let mut inboxes = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let (id, inbox) = join(&coordinator).await;
            ids.push(id);
            inboxes.push(inbox);
        }
        coordinator.start_round_with_secret(60).await.unwrap();
        coordinator
            .handle_message(ids[1], ClientMessage::guess(60))
            .await
            .unwrap();

        let board = coordinator.leaderboard().await;
        let order: Vec<ClientId> = board.iter().map(|e| e.id).collect();
        assert_eq!(order, ids);
        assert!(board[1].guessed);
        assert_eq!(board[1].attempts, 1);
        assert!(!board[0].guessed);
        assert_eq!(coordinator.client_count().await, 3);
    }
}
