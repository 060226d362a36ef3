//! ArchiveLink Gateway
//!
//! HTTP front end for an ArchiveLink content server. Every protocol command
//! arrives on a single endpoint with its parameters in the query string; the
//! gateway hands it to the request dispatcher and writes back whatever the
//! dispatcher produced.
//!
//! ## API Endpoints
//!
//! - `GET /health` - Liveness check
//! - `GET /ready` - Readiness check with repository count
//! - `GET|POST|PUT|DELETE /ContentServer/ContentServer.dll?<command>&...` -
//!   the content server endpoint (path configurable)
//!
//! ## Handlers
//!
//! `serverInfo` and `putCert` are served by real handlers. Document
//! commands (`get`, `create`, `delete`, ...) are acknowledged with static
//! text; storage is provided by whoever registers handlers for them.

pub mod api;
pub mod config;

pub use api::{create_router, AppState};
pub use config::{load_trust_file, GatewayConfig, StartupError};

use std::sync::Arc;
use tracing::info;

use archivelink_core::Operation;
use archivelink_dispatch::{
    handlers::{PutCertHandler, ServerInfoHandler, StaticTextHandler},
    CertificateProvider, RequestDispatcher,
};

/// Operations answered with a static acknowledgement
pub const ACKNOWLEDGED_OPERATIONS: [Operation; 10] = [
    Operation::Info,
    Operation::Get,
    Operation::DocGet,
    Operation::Search,
    Operation::AttrSearch,
    Operation::Create,
    Operation::MCreate,
    Operation::Update,
    Operation::Append,
    Operation::Delete,
];

/// Dispatcher with the default handler set
pub fn build_dispatcher(
    config: &GatewayConfig,
    provider: Arc<dyn CertificateProvider>,
) -> RequestDispatcher {
    let builder = ACKNOWLEDGED_OPERATIONS.into_iter().fold(
        RequestDispatcher::builder(provider.clone()).with_config(config.dispatcher.clone()),
        |builder, operation| builder.with_handler(StaticTextHandler::acknowledge(operation)),
    );

    builder
        .with_handler(ServerInfoHandler::new(provider.clone()))
        .with_handler(PutCertHandler::new(provider))
        .build()
}

/// Load the trust file (if any) into the provider and assemble the state
pub async fn build_state(
    config: GatewayConfig,
    provider: Arc<dyn CertificateProvider>,
) -> Result<Arc<AppState>, StartupError> {
    if let Some(path) = &config.trust_file {
        let entries = load_trust_file(path)?;
        info!(path = %path.display(), count = entries.len(), "Loading trusted certificates");
        for (repository, certificate) in entries {
            provider
                .register(&repository, certificate)
                .await
                .map_err(|e| StartupError::TrustFile {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
        }
    }

    let dispatcher = build_dispatcher(&config, provider.clone());
    Ok(Arc::new(AppState {
        dispatcher,
        provider,
        config,
    }))
}
