//! CLI for securesub
//!
//! Subcommands:
//! - `consumer`: subscribe to the mode's destination and log deliveries
//! - `producer`: publish one message and wait for its delivery report
//! - `addressbook`: print the service's address book

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use securesub::client::{Connection, DeliveryMode, Event, Message};
use securesub::config::{self, Settings};
use securesub::transport::WebSocketConnector;
use securesub::utils::{Result, logging};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "securesub")]
struct Cli {
    /// Config file stem to read instead of `config/default`
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Subscribe and log every message received
    Consumer {
        /// Commit each message explicitly instead of relying on auto commit
        #[arg(long)]
        manual_commit: bool,
    },
    /// Publish a single message
    Producer {
        #[arg(long, default_value = "Testing 1-2-3")]
        content: String,
        /// Delivery key used to correlate the delivery report
        #[arg(long, default_value = "samplekey")]
        key: String,
    },
    /// Fetch the address book over REST
    Addressbook,
}

enum Step {
    Event(Option<Event>),
    Interrupted,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match cli.config.as_deref() {
        Some(file) => config::load_config_from(file),
        None => config::load_config(),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.logging.level);

    let outcome = match cli.command {
        Command::Consumer { manual_commit } => run_consumer(settings, manual_commit).await,
        Command::Producer { content, key } => run_producer(settings, content, key).await,
        Command::Addressbook => run_addressbook(settings).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn connect(settings: Settings) -> Result<Connection> {
    let profile = config::resolve(settings)?;
    let mode = DeliveryMode::from_profile(&profile)?;
    Ok(Connection::open(
        &profile.endpoint,
        &profile.credential,
        mode,
        WebSocketConnector,
    ))
}

/// Waits for the next event or Ctrl-C, disconnecting on the first Ctrl-C.
async fn next_step(conn: &mut Connection, interrupted: &mut bool) -> Option<Event> {
    loop {
        let step = tokio::select! {
            event = conn.next_event() => Step::Event(event),
            _ = tokio::signal::ctrl_c(), if !*interrupted => Step::Interrupted,
        };
        match step {
            Step::Event(event) => return event,
            Step::Interrupted => {
                info!("Shutdown signal received. Disconnecting.");
                *interrupted = true;
                conn.disconnect();
            }
        }
    }
}

fn log_background(event: Event) -> Result<()> {
    match event {
        Event::Exception(detail) => warn!("Service reported an exception: {detail}"),
        Event::Error(e) => error!("Error: {e}"),
        Event::ConnectError(e) => return Err(e),
        other => info!("{other:?}"),
    }
    Ok(())
}

async fn run_consumer(mut settings: Settings, manual_commit: bool) -> Result<()> {
    if manual_commit {
        settings.service.auto_commit = false;
    }
    let destination = settings.destination()?.to_string();
    let mut conn = connect(settings)?;
    let mut interrupted = false;

    while let Some(event) = next_step(&mut conn, &mut interrupted).await {
        match event {
            Event::Connected => {
                info!("Consumer connected.");
                match conn.subscribe([destination.as_str()]).await {
                    Ok(result) => info!("Subscribed to {destination}: {result}"),
                    Err(e) => error!("{e}"),
                }
            }
            Event::Message(delivery) => {
                info!("Message from: {}", delivery.message.headers.from);
                info!("Content: {}", delivery.message.content);
                info!(
                    "Key: {}, timestamp: {}",
                    delivery.key,
                    delivery
                        .received_at()
                        .map(|at| at.to_rfc3339())
                        .unwrap_or_else(|| delivery.timestamp.to_string())
                );
                info!("Signature: {:?}", delivery.signature);
                if conn.commit()? {
                    info!("Commit emitted");
                }
            }
            Event::Disconnected => {
                info!("Consumer disconnected.");
                break;
            }
            other => log_background(other)?,
        }
    }
    Ok(())
}

async fn run_producer(settings: Settings, content: String, key: String) -> Result<()> {
    let destination = settings.destination()?.to_string();
    let mut conn = connect(settings)?;
    let mut interrupted = false;

    while let Some(event) = next_step(&mut conn, &mut interrupted).await {
        match event {
            Event::Connected => {
                info!("Producer connected.");
                let message =
                    Message::new(destination.clone(), destination.clone(), content.clone());
                if let Err(e) = conn.publish(message, key.clone()).await {
                    error!("{e}");
                    conn.disconnect();
                }
            }
            Event::DeliveryReport(report) => {
                info!(
                    "Delivery report key: {}, timestamp: {}",
                    report.key, report.timestamp
                );
                if report.key == key {
                    conn.disconnect();
                }
            }
            Event::Disconnected => {
                info!("Producer disconnected.");
                break;
            }
            other => log_background(other)?,
        }
    }
    Ok(())
}

async fn run_addressbook(settings: Settings) -> Result<()> {
    let book = securesub::rest::fetch_address_book(&settings.endpoint(), &settings.credential)
        .await
        .map_err(|e| {
            error!("Failed to access address book: {e}");
            e
        })?;
    println!("{}", serde_json::to_string_pretty(&book)?);
    Ok(())
}
