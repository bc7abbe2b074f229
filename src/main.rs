// Label print agent: HTTP print-job server for thermal label printers.

use actix_web::{middleware, web, App, HttpServer};
use tracing::{error, info, warn};

use label_print_agent::config::Config;
use label_print_agent::{routes, AppState};

// ============================================================================
// Shutdown Handling
// ============================================================================

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

async fn cleanup_resources(state: AppState) {
    info!("Beginning resource cleanup");

    // Wait for an in-flight batch before releasing the serial link
    let _batch = state.print_lock.lock().await;
    let connections = state.connections.clone();
    match web::block(move || connections.disconnect()).await {
        Ok(Ok(())) => info!("Serial link released"),
        Ok(Err(e)) => warn!("Failed to release serial link: {}", e),
        Err(e) => warn!("Disconnect task failed: {}", e),
    }

    info!("Resource cleanup complete");
}

fn io_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, e))
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting label print agent v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        io_error("Failed to load configuration", e)
    })?;

    let bind_address = config.bind_address();
    info!("Configuration loaded, server will bind to {}", bind_address);

    let app_state = AppState::new(config).await.map_err(|e| {
        error!("Application initialization error: {}", e);
        io_error("Failed to initialize application", e)
    })?;

    if app_state.tokens.status().configured {
        info!("Access token configured, print endpoints require authentication");
    } else {
        warn!("No access token configured, print endpoints are open to any local client");
    }

    let app_state_for_server = app_state.clone();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(middleware::Logger::default())
            .wrap(middleware::NormalizePath::trim())
            .app_data(web::Data::new(app_state_for_server.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_address)?
    .shutdown_timeout(5)
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    info!("Label print agent listening on {}", bind_address);

    shutdown_signal().await;

    info!("Initiating graceful shutdown...");
    server_handle.stop(true).await;
    cleanup_resources(app_state).await;

    server_task
        .await
        .map_err(|e| io_error("Server task error", e))??;

    info!("Graceful shutdown complete");
    Ok(())
}
