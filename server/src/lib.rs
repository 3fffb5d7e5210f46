//! # Guess-the-Number Server Library
//!
//! This library provides the server side of a multiplayer guess-the-number
//! experiment. The server holds one secret number per round, accepts
//! websocket connections from many players, evaluates their guesses and
//! tracks which notifications each player has acknowledged.
//!
//! ## Core Responsibilities
//!
//! ### Round Lifecycle
//! A round starts when the operator asks for it. At that moment a secret is
//! drawn from `1..=100` and every connected player is notified. Players who
//! join later are not notified but can still guess, or ask for the round
//! status explicitly.
//!
//! ### Client Management
//! Handles the complete lifecycle of client connections including:
//! - Identifier assignment on connect
//! - Per-client guess history and correct-guess counters
//! - Disconnection handling and cleanup of all per-client state
//!
//! ### Delivery Confirmations
//! Players acknowledge the `experiment_start` notification and each guess
//! result. The server records these acknowledgements for the operator; it
//! never re-sends anything.
//!
//! ## Architecture Design
//!
//! ### Single Coordinator
//! All shared state sits in one [`coordinator::SessionCoordinator`] behind a
//! single lock. Every operation takes the lock once and queues outbound
//! messages on unbounded channels, so no operation waits on the network
//! while holding it.
//!
//! ### Task Per Connection
//! Each websocket connection runs a reader task, which processes that
//! player's messages strictly in order, and a writer task that drains the
//! player's outbound queue.
//!
//! ## Module Organization
//!
//! - `client_manager`: connection registry and per-client sessions
//! - `confirmation`: acknowledgement flags
//! - `console`: operator commands
//! - `coordinator`: message dispatch and shared state
//! - `error`: error taxonomy
//! - `experiment`: round state and guess evaluation
//! - `network`: websocket accept loop and connection tasks
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::coordinator::SessionCoordinator;
//! use server::network::Server;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = Arc::new(SessionCoordinator::new());
//!     let server = Server::bind("127.0.0.1:8765", Arc::clone(&coordinator)).await?;
//!     tokio::spawn(server.run());
//!
//!     // Later, from the operator side:
//!     let secret = coordinator.start_round().await?;
//!     println!("Secret is {}", secret);
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod confirmation;
pub mod console;
pub mod coordinator;
pub mod error;
pub mod experiment;
pub mod network;
