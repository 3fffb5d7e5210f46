use clap::Parser;
use log::{error, info};
use server::console::{self, Command};
use server::coordinator::SessionCoordinator;
use server::network::Server;
use shared::DEFAULT_PORT;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let coordinator = Arc::new(SessionCoordinator::new());
    let address = format!("{}:{}", args.host, args.port);
    let server = Server::bind(&address, Arc::clone(&coordinator)).await?;

    let server_handle = tokio::spawn(server.run());
    info!("Server started. Waiting for clients...");

    tokio::select! {
        result = server_handle => {
            match result {
                Ok(Err(e)) => error!("Network task failed: {}", e),
                Err(e) => error!("Network task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = run_console(&coordinator) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    Ok(())
}

/// Reads operator commands from stdin until `quit` or end of input
async fn run_console(coordinator: &SessionCoordinator) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", console::HELP);

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Operator input closed, serving until Ctrl+C");
                std::future::pending::<()>().await;
                break;
            }
            Err(e) => {
                error!("Failed to read operator input: {}", e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match Command::parse(&line) {
            Some(command) => {
                println!("{}", console::execute(coordinator, command).await);
                if command == Command::Quit {
                    break;
                }
            }
            None => println!("Unknown command, type `help` for the list of commands"),
        }
    }
}
