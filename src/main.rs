use std::sync::Arc;

use antigravity_rs::api::router;
use antigravity_rs::config::load_config;
use antigravity_rs::observability::init_tracing;
use antigravity_rs::state::AppState;

fn main() {
    let config = load_config("config.yaml").unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Please copy 'config.example.yaml' to 'config.yaml' and modify as needed.");
        std::process::exit(1);
    });

    init_tracing(&config.features.log_level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            std::process::exit(1);
        });

    runtime.block_on(run(config));
}

async fn run(config: antigravity_rs::config::AppConfig) {
    let host = config.server.host.clone();
    let port = config.server.port;

    let state = AppState::from_config(config).unwrap_or_else(|err| {
        eprintln!("Failed to build HTTP transport: {err}");
        std::process::exit(1);
    });
    let endpoint_count = state.endpoints().len();
    let app = router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .unwrap_or_else(|err| {
            eprintln!("Failed to bind to {host}:{port}: {err}");
            std::process::exit(1);
        });

    tracing::info!(
        "antigravity-rs starting on {}:{} with {} streaming endpoint(s)",
        host,
        port,
        endpoint_count
    );

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %err, "server error");
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
