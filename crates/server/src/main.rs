mod app;
mod config;
mod handlers;
mod sessions;
mod state;
mod storage;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gemproxy_webapi::WebClientFactory;
use listenfd::ListenFd;
use tokio::{net::TcpListener, signal, task::JoinHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    app::create_app,
    config::{Config, Loaded, LoggingConfig},
    state::AppState,
};

/// gemproxy - OpenAI-compatible chat API served by the Gemini web app
#[derive(Parser, Debug)]
#[command(name = "gemproxy")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Host address to bind, overrides `server.host`
        #[arg(long, short = 'H')]
        host: Option<String>,

        /// Port to listen on, overrides `server.port`
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Check a running server; exits 0 iff `/health` answers 200
    Healthcheck {
        /// Defaults to the configured host and port (`PORT`, `server.port`)
        #[arg(long)]
        url: Option<String>,

        /// Seconds to wait for the answer
        #[arg(long, default_value = "5")]
        timeout: u64,
    },

    /// Print the effective configuration with secrets redacted
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => serve(config::load()?, host, port).await,
        Commands::Healthcheck { url, timeout } => {
            let url = match url {
                Some(url) => url,
                None => config::load()?.config.health_url(),
            };
            healthcheck(&url, timeout).await
        }
        Commands::CheckConfig => check_config(config::load()?),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},tower_http=info", logging.level.as_filter()).into());

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn serve(loaded: Loaded, host: Option<String>, port: Option<u16>) -> Result<()> {
    let Loaded {
        mut config,
        warnings,
    } = loaded;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    init_tracing(&config.logging);
    for warning in &warnings {
        tracing::warn!("{warning}");
    }

    config.validate().context("Invalid configuration")?;
    log_credentials(&config);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let factory = Arc::new(WebClientFactory::new(config.web_client_config()));
    let state = AppState::new(config, factory).await?;
    tracing::info!(backend = storage::BACKEND_NAME, "Conversation store ready");

    let app = create_app(state.clone());

    // Socket activation via listenfd
    let mut listenfd = ListenFd::from_env();
    let listener = match listenfd.take_tcp_listener(0)? {
        Some(listener) => {
            listener.set_nonblocking(true)?;
            TcpListener::from_std(listener)?
        }
        None => TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?,
    };

    tracing::info!("listening on {}", listener.local_addr()?);

    let prewarm = spawn_prewarm(&state);
    let monitor = state.pool.spawn_monitor(state.subscribe_shutdown());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    prewarm.abort();
    if let Err(e) = monitor.await {
        tracing::warn!(error = %e, "Pool monitor ended abnormally");
    }
    state.pool.close_all().await;

    tracing::info!("Server stopped");
    Ok(())
}

fn log_credentials(config: &Config) {
    let redacted = config.redacted();
    if redacted.gemini.clients.is_empty() {
        tracing::warn!(
            "No Gemini credentials configured. Set SECURE_1PSID or gemini.clients; \
            chat requests will fail until then"
        );
    }
    for client in &redacted.gemini.clients {
        tracing::info!(
            id = %client.id,
            secure_1psid = %client.secure_1psid,
            has_1psidts = client.secure_1psidts.is_some(),
            "Gemini credential"
        );
    }
}

/// Signs in one client in the background while the server already answers.
fn spawn_prewarm(state: &AppState) -> JoinHandle<()> {
    let pool = Arc::clone(&state.pool);

    tokio::spawn(async move {
        if pool.credential_ids().is_empty() {
            return;
        }

        match pool.acquire(None).await {
            Ok(lease) => tracing::info!(client = %lease.id, credential = %lease.credential_id, "Gemini client ready"),
            Err(e) => tracing::warn!(
                error = %e,
                "Could not sign in a Gemini client at startup, will retry on first request"
            ),
        }
    })
}

async fn healthcheck(url: &str, timeout: u64) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout))
        .build()?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Health check request to {url} failed"))?;

    anyhow::ensure!(
        response.status() == reqwest::StatusCode::OK,
        "Health check returned {}",
        response.status()
    );
    Ok(())
}

fn check_config(loaded: Loaded) -> Result<()> {
    for warning in &loaded.warnings {
        eprintln!("warning: {warning}");
    }
    loaded.config.validate()?;
    print!("{}", serde_yaml::to_string(&loaded.config.redacted())?);
    Ok(())
}

/// Wait for shutdown signals (Ctrl+C or SIGTERM) and notify background tasks.
async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }

    state.signal_shutdown();
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::state::test_support::test_config;

    #[tokio::test(start_paused = true)]
    async fn test_health_answers_while_prewarming() {
        let (state, script) = AppState::for_tests(test_config());
        *script.create_delay.lock().unwrap() = Duration::from_secs(30);

        let prewarm = spawn_prewarm(&state);
        tokio::task::yield_now().await;

        let response = tokio::time::timeout(
            Duration::from_secs(1),
            create_app(state.clone())
                .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()),
        )
        .await
        .expect("health must not wait for the sign-in")
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.pool.stats().await.total, 0);

        prewarm.await.unwrap();
        assert_eq!(state.pool.stats().await.total, 1);
    }
}
