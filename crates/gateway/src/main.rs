use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use cs_crm::CrmRegistry;
use cs_domain::config::{Config, ConfigSeverity};
use cs_engines::create_engine;
use cs_gateway::api;
use cs_gateway::cli::{self, Cli, Command, ConfigCommand};
use cs_gateway::state::AppState;
use cs_platforms::service::spawn_connection_monitor;
use cs_platforms::PlatformRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _config_path) = cli::load_config(cli.config.as_ref())?;
            run_server(Arc::new(config)).await
        }
        Some(Command::Monitor {
            url,
            once,
            interval,
        }) => {
            let healthy = cli::monitor::run(&url, once, interval).await?;
            if !healthy {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::LoadTest { sessions, chunks }) => {
            init_tracing();
            let (config, _config_path) = cli::load_config(cli.config.as_ref())?;
            let passed = cli::load_test::run(config, sessions, chunks).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::VerifyCapacity { target }) => {
            let (config, _config_path) = cli::load_config(cli.config.as_ref())?;
            let passed = cli::verify_capacity::run(&config, target)?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = cli::load_config(cli.config.as_ref())?;
            if !cli::config::validate(&config, &config_path) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = cli::load_config(cli.config.as_ref())?;
            cli::config::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("callscribe {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing (only for the `serve` and
/// `load-test` commands).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cs_gateway=debug")),
        )
        .json()
        .init();
}

/// Start the gateway server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("CallScribe starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Transcription engine ─────────────────────────────────────────
    let engine = create_engine(&config.engine).context("initializing transcription engine")?;
    engine
        .initialize(&config.engine)
        .await
        .context("transcription engine startup")?;

    // ── Pipeline state ───────────────────────────────────────────────
    let state = AppState::build(
        config.clone(),
        engine,
        PlatformRegistry::with_default_bots(),
        CrmRegistry::from_config(&config.crm),
        true,
    )
    .context("building application state")?;
    tracing::info!(
        state_path = %config.storage.state_path.display(),
        "pipeline state ready"
    );

    let shutdown = CancellationToken::new();

    // ── Connection monitor (shared across all bot sessions) ─────────
    spawn_connection_monitor(
        state.call_bots.clone(),
        Duration::from_secs(config.session.monitor_interval_s.max(1)),
        shutdown.clone(),
    );
    tracing::info!(
        interval_s = config.session.monitor_interval_s,
        "connection monitor started"
    );

    // ── Validation expiry sweep ──────────────────────────────────────
    {
        let validation = state.validation.clone();
        let interval_s = config.validation.sweep_interval_s.max(1);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_s));
            loop {
                ticker.tick().await;
                let expired = validation.expire_overdue();
                if expired > 0 {
                    tracing::info!(expired, "validation sessions expired");
                }
            }
        });
        tracing::info!(interval_s, "validation expiry sweep started");
    }

    // ── Periodic store flush ─────────────────────────────────────────
    {
        let store = state.store.clone();
        let validation = state.validation.clone();
        let crm_sync = state.crm_sync.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            loop {
                ticker.tick().await;
                if let Err(e) = store.flush() {
                    tracing::warn!(error = %e, "meeting store flush failed");
                }
                if let Err(e) = validation.flush() {
                    tracing::warn!(error = %e, "validation store flush failed");
                }
                if let Err(e) = crm_sync.flush() {
                    tracing::warn!(error = %e, "crm sync store flush failed");
                }
            }
        });
    }

    // ── Session cache eviction ───────────────────────────────────────
    {
        let state_for_evict = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                let evicted = state_for_evict.evict_stale_cache();
                if evicted > 0 {
                    tracing::debug!(evicted, "stale session cache entries evicted");
                }
            }
        });
    }

    // ── Router ───────────────────────────────────────────────────────
    let app = api::router(state.clone())
        .layer(tower::limit::ConcurrencyLimitLayer::new(
            config.server.max_concurrent_requests,
        ))
        .with_state(state);

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "CallScribe listening");

    axum::serve(listener, app).await.context("axum server error")?;

    shutdown.cancel();
    Ok(())
}
