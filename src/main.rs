use std::net::SocketAddr;

use clap::Parser;
use tracing::{error, info};
use visage::cli::{Args, build_config, init_logging, load_secret, open_database};
use visage::{create_app, init_cleanup};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(access_secret) = load_secret("ACCESS_TOKEN_SECRET", args.access_secret_file.as_deref())
    else {
        std::process::exit(1);
    };
    let Some(refresh_secret) =
        load_secret("REFRESH_TOKEN_SECRET", args.refresh_secret_file.as_deref())
    else {
        std::process::exit(1);
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    let config = build_config(&args, db, access_secret, refresh_secret);

    let issuer = config.token_issuer().unwrap_or_else(|e| {
        error!(error = %e, "Invalid signing configuration");
        std::process::exit(1);
    });
    if let Err(e) = issuer.self_check() {
        error!(error = %e, "Token signing self-check failed");
        std::process::exit(1);
    }

    let app = create_app(&config).unwrap_or_else(|e| {
        error!(error = %e, "Failed to build application");
        std::process::exit(1);
    });

    init_cleanup(&config.db).await;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    match listener.local_addr() {
        Ok(local_addr) => info!(address = %local_addr, environment = ?args.environment, "Listening"),
        Err(e) => error!(error = %e, "Failed to get local address"),
    }

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
