//! Operator console commands
//!
//! The console only reads aggregate state and starts the round. Per-client
//! errors are never shown here; they stay in the connection logs.

use crate::coordinator::SessionCoordinator;
use crate::error::ServerError;
use shared::MessageKind;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Clients,
    Leaderboard,
    Confirmations,
    Status,
    Help,
    Quit,
}

impl Command {
    /// Parses a console line, accepting command words or menu numbers
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "start" | "1" => Some(Command::Start),
            "clients" | "2" => Some(Command::Clients),
            "leaderboard" | "3" => Some(Command::Leaderboard),
            "confirmations" | "4" => Some(Command::Confirmations),
            "status" => Some(Command::Status),
            "help" | "?" => Some(Command::Help),
            "quit" | "exit" | "5" => Some(Command::Quit),
            _ => None,
        }
    }
}

pub const HELP: &str = "\
1. start          start the experiment
2. clients        list connected clients
3. leaderboard    show attempts and results per client
4. confirmations  show delivery confirmations
   status         show whether a round is running
5. quit           stop the server";

/// Runs one console command and renders its output
pub async fn execute(coordinator: &SessionCoordinator, command: Command) -> String {
    match command {
        Command::Start => match coordinator.start_round().await {
            Ok(secret) => format!("Experiment started! Secret number: {}", secret),
            Err(ServerError::RoundAlreadyStarted) => {
                "The experiment is already running".to_string()
            }
            Err(e) => format!("Could not start the experiment: {}", e),
        },
        Command::Clients => {
            let ids = coordinator.list_clients().await;
            if ids.is_empty() {
                return "No clients connected".to_string();
            }
            let names: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
            format!("Participants: {}", names.join(", "))
        }
        Command::Leaderboard => {
            let board = coordinator.leaderboard().await;
            if board.is_empty() {
                return "No clients connected".to_string();
            }
            let mut out = String::new();
            for entry in board {
                let status = if entry.guessed {
                    "guessed"
                } else {
                    "not guessed"
                };
                let _ = writeln!(
                    out,
                    "{}{}: {} attempts, status: {}, correct guesses: {}",
                    entry.id,
                    entry
                        .name
                        .as_deref()
                        .map(|n| format!(" ({})", n))
                        .unwrap_or_default(),
                    entry.attempts,
                    status,
                    entry.correct_guesses
                );
            }
            out.trim_end().to_string()
        }
        Command::Confirmations => {
            let status = coordinator.confirmation_status().await;
            if status.is_empty() {
                return "No clients connected".to_string();
            }
            let mut out = String::new();
            for (id, flags) in status {
                let _ = writeln!(
                    out,
                    "{}: experiment start received - {}, guess result received - {}",
                    id,
                    flags.is_confirmed(MessageKind::ExperimentStart),
                    flags.is_confirmed(MessageKind::GuessResult)
                );
            }
            out.trim_end().to_string()
        }
        Command::Status => {
            let round = coordinator.round().await;
            let clients = coordinator.client_count().await;
            match (round.secret, round.running_for) {
                (Some(secret), Some(elapsed)) => format!(
                    "Round running for {}s (secret {}), {} clients connected",
                    elapsed.as_secs(),
                    secret,
                    clients
                ),
                _ => format!("Round not started, {} clients connected", clients),
            }
        }
        Command::Help => HELP.to_string(),
        Command::Quit => "Shutting down the server...".to_string(),
    }
}
