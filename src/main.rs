use std::net::SocketAddr;

use clap::Parser;
use storefront::cli::{
    Args, build_config, handle_create_admin, init_logging, load_secrets, open_database,
    validate_origin,
};
use storefront::create_app;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_logging(&args.log_format);

    let Some(secrets) = load_secrets(&args) else {
        std::process::exit(1);
    };

    let origin_allow = match args.origin_allow.as_deref() {
        Some(origin) => match validate_origin(origin) {
            Some(value) => Some(value),
            None => std::process::exit(1),
        },
        None => None,
    };

    let Some(db) = open_database(&args.database).await else {
        std::process::exit(1);
    };

    if let Some(email) = args.create_admin.as_deref() {
        if let Err(e) = handle_create_admin(&db, email).await {
            error!(error = %e, "Failed to create admin");
            std::process::exit(1);
        }
    }

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        });

    let local_addr = listener.local_addr().unwrap_or_else(|e| {
        error!(error = %e, "Failed to read local address");
        std::process::exit(1);
    });

    let config = build_config(&args, db, secrets, origin_allow);
    let app = create_app(&config);

    info!(
        address = %local_addr,
        production = config.production,
        upload_dir = %config.upload_dir.display(),
        "Listening"
    );

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    if let Err(e) = axum::serve(listener, make_service).await {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
