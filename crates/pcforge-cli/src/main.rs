//! # pcforge
//!
//! Command-line client for the pcforge build assistant. Wires settings,
//! logging and a [`pcforge_client::Session`] together for one-shot queries,
//! an interactive chat loop and health checks.

#![deny(unsafe_code)]

mod render;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use pcforge_client::{
    ConnectionState, HealthProbe, HttpHealthProbe, Session, SessionConfig, SessionHandle,
    WsConnector,
};
use pcforge_core::{InboundEvent, LogFormat, init_subscriber};
use pcforge_settings::PcforgeSettings;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Client for the pcforge PC-build assistant.
#[derive(Parser, Debug)]
#[command(name = "pcforge", version, about = "Client for the pcforge PC-build assistant")]
struct Cli {
    /// WebSocket endpoint (overrides settings).
    #[arg(long, global = true)]
    url: Option<String>,

    /// Health endpoint (overrides settings).
    #[arg(long, global = true)]
    health_url: Option<String>,

    /// Settings file (default: `~/.pcforge/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level or `EnvFilter` directive.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask one question and print the answer.
    Ask {
        /// The build request, e.g. "Budget Gaming PC".
        query: String,

        /// Seconds to wait for the connection before giving up.
        #[arg(long, default_value = "30")]
        connect_timeout: u64,
    },
    /// Interactive session over stdin.
    Chat,
    /// Run one health probe.
    Probe,
}

impl Cli {
    /// Load settings and apply command-line overrides.
    fn resolve_settings(&self) -> Result<PcforgeSettings> {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(pcforge_settings::settings_path);
        let mut settings = pcforge_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;

        if let Some(ref url) = self.url {
            settings.client.url.clone_from(url);
        }
        if let Some(ref health_url) = self.health_url {
            settings.client.health_url.clone_from(health_url);
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        settings.validate().context("Invalid command-line override")?;
        Ok(settings)
    }
}

fn http_probe(config: &SessionConfig) -> Result<HttpHealthProbe> {
    HttpHealthProbe::new(&config.health_url, config.probe_timeout())
        .context("Failed to build health probe")
}

fn start_session(
    config: SessionConfig,
) -> Result<(SessionHandle, mpsc::UnboundedReceiver<InboundEvent>)> {
    let probe = http_probe(&config)?;
    Ok(Session::spawn(config, Arc::new(WsConnector), Arc::new(probe)))
}

/// Wait until connected, failing early if the session gives up.
async fn wait_connected(session: &SessionHandle, wait: Duration) -> Result<()> {
    let mut status = session.subscribe();
    let ready = tokio::time::timeout(
        wait,
        status.wait_for(|s| s.state == ConnectionState::Connected || render::is_terminal(s)),
    )
    .await
    .with_context(|| {
        format!(
            "Not connected after {}s ({})",
            wait.as_secs(),
            render::status_line(&session.status())
        )
    })?
    .context("Session ended")?
    .clone();

    if ready.state == ConnectionState::Connected {
        Ok(())
    } else {
        bail!("Could not connect ({})", render::status_line(&ready))
    }
}

async fn ask(config: SessionConfig, query: &str, connect_timeout: Duration) -> Result<()> {
    let (session, mut events) = start_session(config)?;
    session.connect();
    wait_connected(&session, connect_timeout).await?;

    let id = session
        .submit(query)
        .await
        .map_err(|e| anyhow!(render::error_line(&e)))?;
    debug!(query_id = %id, "waiting for answer");

    let mut status = session.subscribe();
    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(InboundEvent::FinalOutput { text }) => break Ok(text),
                Some(event) => {
                    if let Some(line) = render::progress(&event) {
                        eprintln!("{line}");
                    }
                }
                None => break Err(anyhow!("Session ended before the answer arrived")),
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break Err(anyhow!("Session ended before the answer arrived"));
                }
                let snapshot = status.borrow_and_update().clone();
                if let Some(reason) = render::query_failure(&snapshot) {
                    break Err(anyhow!("Query failed: {reason}"));
                }
                debug!(state = %snapshot.state, "status changed while waiting");
            }
        }
    };

    session.disconnect();
    session.shutdown();
    session.closed().await;

    let answer = outcome?;
    println!("{answer}");
    Ok(())
}

async fn chat(config: SessionConfig) -> Result<()> {
    let (session, mut events) = start_session(config)?;
    let mut status = session.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    session.connect();
    eprintln!("{}", render::status_line(&session.status()));
    eprintln!("Type a build request, or /reconnect, /cancel, /status, /quit.");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match line.trim() {
                    "" => {}
                    "/quit" => break,
                    "/reconnect" => session.reconnect(),
                    "/cancel" => session.cancel_query(),
                    "/status" => eprintln!("{}", render::status_line(&session.status())),
                    text => match session.submit(text).await {
                        Ok(id) => debug!(query_id = %id, "query submitted"),
                        Err(e) => eprintln!("{}", render::error_line(&e)),
                    },
                }
            }
            event = events.recv() => match event {
                Some(InboundEvent::FinalOutput { text }) => println!("{text}"),
                Some(event) => {
                    if let Some(line) = render::progress(&event) {
                        eprintln!("{line}");
                    }
                }
                None => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = status.borrow_and_update().clone();
                eprintln!("{}", render::status_line(&snapshot));
            }
        }
    }

    session.disconnect();
    session.shutdown();
    session.closed().await;
    Ok(())
}

async fn probe(config: &SessionConfig) -> Result<()> {
    let probe = http_probe(config)?;
    match probe.check().await {
        Ok(()) => {
            println!("healthy: {}", probe.url());
            Ok(())
        }
        Err(e) => bail!("unhealthy: {} {}", probe.url(), render::error_line(&e)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.resolve_settings()?;

    let format = if settings.logging.json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    init_subscriber(&settings.logging.level, format);
    let config = SessionConfig::from_settings(&settings);
    info!(url = %config.url, "pcforge starting");

    match cli.command {
        Command::Ask {
            query,
            connect_timeout,
        } => ask(config, &query, Duration::from_secs(connect_timeout)).await,
        Command::Chat => chat(config).await,
        Command::Probe => probe(&config).await,
    }
}
