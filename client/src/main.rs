use clap::Parser;
use client::network::{GameClient, MessageSender};
use log::{error, info};
use shared::{ServerMessage, DEFAULT_PORT};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server websocket URL
    #[arg(short = 's', long)]
    server: Option<String>,

    /// Player name announced to the server
    #[arg(short = 'n', long, default_value = "player")]
    name: String,
}

const HELP: &str = "Commands: guess <number>, attempts, status, quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let url = args
        .server
        .unwrap_or_else(|| format!("ws://127.0.0.1:{}", DEFAULT_PORT));

    info!("Connecting to: {}", url);
    let mut client = GameClient::connect(&url).await?;
    let sender = client.sender();
    sender.join(&args.name)?;

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_command(&sender, line.trim())? {
                            break;
                        }
                    }
                    None => break,
                }
            }
            message = client.next_message() => {
                match message {
                    Ok(Some(message)) => print_message(&message),
                    Ok(None) => {
                        println!("Server closed the connection");
                        break;
                    }
                    Err(e) => {
                        error!("Connection error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Returns false when the player asked to quit
fn handle_command(sender: &MessageSender, line: &str) -> Result<bool, Box<dyn std::error::Error>> {
    let mut parts = line.splitn(2, char::is_whitespace);
    match (parts.next().unwrap_or(""), parts.next().map(str::trim)) {
        ("", _) => {}
        ("guess", Some(value)) => sender.guess_raw(value)?,
        ("attempts", None) => sender.request_attempts()?,
        ("status", None) => sender.request_status()?,
        ("quit", None) | ("exit", None) => return Ok(false),
        _ => println!("{}", HELP),
    }
    Ok(true)
}

fn print_message(message: &ServerMessage) {
    match message {
        ServerMessage::ExperimentStart { message } => println!("{}", message),
        ServerMessage::GuessResult { message, .. } => println!("{}", message),
        ServerMessage::Attempts { attempts } => println!("Your attempts: {:?}", attempts),
        ServerMessage::Status { started } => {
            if *started {
                println!("A round is running");
            } else {
                println!("No round has started yet");
            }
        }
        ServerMessage::Error { message, .. } => println!("Error: {}", message),
    }
}
