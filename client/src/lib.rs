//! # Guess-the-Number Client Library
//!
//! Client side of the guess-the-number experiment. It connects to the server
//! over a websocket, sends guesses and queries, and answers the server's
//! acknowledgeable messages (`experiment_start` and guess results) with the
//! matching `confirm_receipt`, so the operator can see what was delivered.
//!
//! ## Network Module (`network`)
//! - [`network::GameClient`] owns the connection and yields decoded
//!   [`shared::ServerMessage`]s
//! - [`network::MessageSender`] is a cloneable handle for queueing
//!   [`shared::ClientMessage`]s while another task waits for replies
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::GameClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = GameClient::connect("ws://127.0.0.1:8765").await?;
//!     let sender = client.sender();
//!
//!     sender.join("alice")?;
//!     sender.guess(50)?;
//!
//!     while let Some(message) = client.next_message().await? {
//!         println!("{:?}", message);
//!     }
//!     Ok(())
//! }
//! ```

pub mod network;
