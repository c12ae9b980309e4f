use std::env;

use ssogate_server::config::loader::load_config;
use ssogate_server::{build_app, hash_password, observability};

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    let args: Vec<String> = env::args().skip(1).collect();

    // `ssogate hash-password <password>` prints a PHC string for the users table.
    if args.first().map(String::as_str) == Some("hash-password") {
        let Some(password) = args.get(1) else {
            eprintln!("usage: ssogate hash-password <password>");
            std::process::exit(2);
        };
        match hash_password(password) {
            Ok(hash) => println!("{hash}"),
            Err(e) => {
                eprintln!("hashing failed: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    observability::init_tracing();

    let config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .or_else(|| env::var("SSOGATE_CONFIG").ok());

    let cfg = match load_config(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    observability::apply_logging_level(&cfg.logging.level);
    tracing::info!(path = ?config_path, "Configuration loaded");

    let app = match build_app(&cfg).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Startup failed: {e:#}");
            std::process::exit(1);
        }
    };

    let addr = cfg.addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "ssogate listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
