use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use chatline_server::config::{generate_config_template, Cli, Config};
use chatline_server::{auth, db, routes, state, ws};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Handle --generate-config: print template and exit
    if cli.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load(&cli)?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chatline_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }

    tracing::info!("Chatline server v{} starting", env!("CARGO_PKG_VERSION"));

    let db = db::init_db(&config.data_dir)?;
    let jwt_secret =
        auth::jwt::load_or_generate_jwt_secret(config.jwt_secret.as_deref(), &config.data_dir)?;

    tracing::info!(
        queue_capacity = config.push.queue_capacity,
        ping_interval_secs = config.push.ping_interval_secs,
        write_timeout_secs = config.push.write_timeout_secs,
        "Push hub configured"
    );
    let hub = Arc::new(ws::Hub::new(config.push.clone()));

    let app_state = state::AppState {
        db,
        jwt_secret,
        token_ttl_hours: config.token_ttl_hours,
        hub: hub.clone(),
    };

    let app = routes::build_router(app_state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(hub))
    .await?;

    tracing::info!("Chatline server stopped");
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM, then tear down every live push session so the
/// upgraded connections let go of the server.
async fn shutdown_signal(hub: Arc<ws::Hub>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("Shutdown signal received");
    hub.shutdown();
}
