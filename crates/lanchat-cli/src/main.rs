//! # lanchat
//!
//! Terminal client for the LanChat network.
//!
//! Lines typed on stdin are chat messages or `/commands`; everything the
//! engine has to say is printed to stdout. Logs go to stderr and respect
//! `RUST_LOG`.

mod config;
mod pump;
mod terminal;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lanchat_core::{generate_code, ChatEngine, Collaborators, Settings};
use lanchat_net::spawn_transport;

use crate::config::CliConfig;
use crate::pump::TcpPump;
use crate::terminal::{TerminalChat, TerminalUi};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,lanchat_core=debug,lanchat_net=debug")),
        )
        .init();

    info!("Starting LanChat v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = CliConfig::from_env();
    info!(?config, "Loaded configuration");

    let data = config.settings_data();
    let code = config.code.unwrap_or_else(generate_code);
    let transport_config = config.transport_config(data.private_chat_enabled);

    let mut settings = Settings::new(code, data);
    if let Some(path) = &config.settings_file {
        settings = settings.with_file(path.clone());
    }
    let settings = Arc::new(settings);

    // -----------------------------------------------------------------------
    // 3. Network and engine
    // -----------------------------------------------------------------------
    let (transport, notifications) = spawn_transport(transport_config).await?;

    let (ui, mut quit) = TerminalUi::new();
    let engine = Arc::new(ChatEngine::new(
        settings,
        Collaborators {
            transport: transport.clone(),
            chat: Arc::new(TerminalChat),
            ui: Arc::new(ui),
            pump: Arc::new(TcpPump::new()),
        },
    ));

    let tasks = engine.start();
    let input = spawn_input(engine.clone());

    // -----------------------------------------------------------------------
    // 4. Run until the user quits or the network goes away
    // -----------------------------------------------------------------------
    tokio::select! {
        _ = engine.run(notifications) => {
            warn!("Transport stopped");
        }
        _ = quit.wait_for(|quit| *quit) => {
            info!("Quit requested");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    engine.shutdown();
    transport.stop();
    input.abort();
    for task in tasks {
        let _ = task.await;
    }

    Ok(())
}

/// Read lines from stdin and run them through the engine. End of input
/// quits.
fn spawn_input(engine: Arc<ChatEngine>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if !line.trim().is_empty() {
                        engine.execute(&line);
                    }
                }
                Ok(None) => {
                    engine.controller().ui().quit();
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read from stdin");
                    engine.controller().ui().quit();
                    break;
                }
            }
        }
    })
}
