use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tokio::sync::mpsc::UnboundedReceiver;
use topicwatch::config::{default_settings_path, Settings};
use topicwatch::mqtt::{ChannelSink, SessionEvent, SessionManager, SessionState};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Subscribe to one MQTT topic and print every payload it carries
#[derive(Parser)]
#[command(name = "topicwatch", version)]
struct Cli {
    /// Settings file, defaults to <config dir>/topicwatch/config.toml
    #[arg(short, long, value_name = "FILE", env = "TOPICWATCH_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_error_hook()?;

    let path = cli.config.unwrap_or_else(default_settings_path);
    let created = Settings::ensure_default(&path).await?;
    let settings = Settings::load(&path).await?;

    setup_logging_env(settings.level());
    if created {
        info!("Created default settings at {}", path.display());
    }
    info!("Using settings from {}", path.display());

    let (sink, events) = ChannelSink::new();
    let manager = SessionManager::start(&settings.connection, sink)
        .map_err(|e| eyre!("Failed to start session: {}", e))?;

    info!(
        "Watching {} on {} as {}",
        manager.topic(),
        settings.connection.broker_uri,
        manager.client_id()
    );

    run(events, &settings.display.label).await;

    manager.stop();
    manager.wait_closed().await;
    info!("Session closed");
    Ok(())
}

/// Prints events until ctrl-c or until the session stops reporting
async fn run(mut events: UnboundedReceiver<SessionEvent>, label: &str) {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            event = events.recv() => match event {
                Some(SessionEvent::Message(msg)) => {
                    debug!("{}", msg);
                    println!("{}", msg.render(label));
                }
                Some(SessionEvent::StateChanged(state)) => match state {
                    SessionState::Subscribed => info!("Subscribed, waiting for messages"),
                    SessionState::ReconnectPending => warn!("Connection lost"),
                    other => debug!("Session state: {}", other),
                },
                Some(SessionEvent::Error { kind, detail }) => error!("{}: {}", kind, detail),
                Some(SessionEvent::ReconnectScheduled { attempt, delay }) => {
                    info!("Reconnect attempt {} in {:?}", attempt, delay)
                }
                None => break,
            }
        }
    }
}

fn setup_error_hook() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .init();
}
