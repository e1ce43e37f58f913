//! modbot - pluggable command dispatcher for guild-based chat platforms.

use modbot::config::{self, Config};
use modbot::http::WebhookServer;
use modbot::modules::ModuleCatalog;
use modbot::platform::{LocalPlatform, PlatformEvent};
use modbot::{BotBuilder, metrics};
use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Upper bound on the whole shutdown sequence.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Inbound platform events buffered ahead of dispatch.
const EVENT_CHANNEL_SIZE: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "modbot.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "Refusing to start with {} configuration error(s)",
            errors.len()
        ));
    }

    let port = config.webhook_port()?;
    info!(
        prefix = %config.prefix,
        modules = config.modules.len(),
        url = %config.url(),
        "Starting modbot"
    );

    metrics::init();

    // No remote gateway is compiled in; the local platform stands in for it.
    let platform = Arc::new(LocalPlatform::default());
    let catalog = ModuleCatalog::builtin();
    let modules = config.modules.clone();

    let bot = BotBuilder::new(config, platform)
        .load_modules(&modules, &catalog)
        .load_default_modules()
        .init_persistence()
        .await?;
    bot.load_global_config().await?;
    bot.init_all_modules().await?;

    let shutdown = CancellationToken::new();

    let server = WebhookServer::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    info!(addr = %server.local_addr(), "Webhook listener bound");
    let http_task = tokio::spawn(server.serve(bot.dispatcher().clone(), shutdown.clone()));

    spawn_console(shutdown.clone());
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received");
                shutdown.cancel();
            }
        });
    }

    // A gateway adapter feeds this channel. Holding the sender keeps the
    // loop alive until shutdown is requested.
    let (_events_tx, events_rx) = mpsc::channel::<PlatformEvent>(EVENT_CHANNEL_SIZE);
    bot.run(events_rx, shutdown.clone()).await?;
    shutdown.cancel();

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, bot.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Shutdown failed"),
        Err(_) => warn!("Shutdown timed out, exiting anyway"),
    }

    match http_task.await {
        Ok(Err(e)) => error!(error = %e, "Webhook listener failed"),
        Err(e) => error!(error = %e, "Webhook listener task failed"),
        Ok(Ok(())) => {}
    }
    Ok(())
}

fn prompt() {
    print!("modbot > ");
    let _ = std::io::stdout().flush();
}

/// Interactive console on stdin: `exit` shuts down.
fn spawn_console(shutdown: CancellationToken) {
    if !std::io::stdin().is_terminal() {
        return;
    }
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        prompt();
        while let Ok(Some(line)) = lines.next_line().await {
            match line.trim() {
                "" => {}
                "exit" => {
                    shutdown.cancel();
                    break;
                }
                other => println!("Unknown command: {other}"),
            }
            prompt();
        }
    });
}
