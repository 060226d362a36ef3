//! ArchiveLink Gateway Binary
//!
//! Runs the content server endpoint over HTTP.

use std::sync::Arc;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

use archivelink_core::access::permission_letters;
use archivelink_dispatch::{CertificateProvider, MemoryCertificateStore};
use archivelink_gateway::{build_state, create_router, GatewayConfig, StartupError};

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = GatewayConfig::from_env()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| StartupError::Logging(e.to_string()))?;

    let provider: Arc<dyn CertificateProvider> = Arc::new(MemoryCertificateStore::new());
    let addr = config.socket_addr();

    let protection = permission_letters(config.dispatcher.protection_level);
    info!(
        endpoint = %config.endpoint,
        protection = %protection,
        forward_writes = config.dispatcher.forward_writes.is_some(),
        "Starting ArchiveLink gateway"
    );

    let state = build_state(config, provider).await?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "ArchiveLink gateway listening");

    axum::serve(listener, app).await?;
    Ok(())
}
