mod app;
mod cleanup;
mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use intranet_api::clock::SystemClock;
use intranet_db::Database;
use intranet_sms::{LogSender, SmsSender, TwilioSender};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "intranet=debug,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            eprintln!("       Fix your environment or .env file and restart.");
            std::process::exit(1);
        }
    };

    let db = Arc::new(Database::open(&config.db_path)?);
    app::seed_admins(&db, &config.bootstrap_admins)?;

    let sms: Arc<dyn SmsSender> = match config.twilio.clone() {
        Some(options) => Arc::new(TwilioSender::new(options)?),
        None => {
            warn!("Twilio credentials not set; login codes will only be logged");
            Arc::new(LogSender)
        }
    };

    let state = app::build_state(&config, db.clone(), sms, Arc::new(SystemClock))?;

    tokio::spawn(cleanup::run_cleanup_loop(
        db,
        config.submission.window.num_seconds(),
        config.cleanup_interval_secs,
    ));

    let app = app::router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Intranet server listening on {}", addr);
    if config.trust_forwarded_for {
        info!("Client addresses taken from X-Forwarded-For");
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
