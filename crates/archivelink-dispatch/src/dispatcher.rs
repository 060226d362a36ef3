//! Request Dispatcher - routes resolved commands to operation handlers

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use archivelink_core::{
    access::PROTECTION_RCUD, command::SIGNATURE_PARAM, resolve, Command, HttpMethod, Operation,
};

use crate::authorize::Authorizer;
use crate::error::{DispatchError, Result};
use crate::provider::CertificateProvider;
use crate::types::{CommandRequest, CommandResponse, DispatchResult, RequestContext};

/// Trait for operation handlers
///
/// Each handler implements the business side of exactly one operation. The
/// dispatcher only calls it after the command resolved, matched its method and
/// passed authorization.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// The operation this handler serves
    fn operation(&self) -> Operation;

    /// Execute the command
    ///
    /// Return `DispatchError::Protocol` to reply with a client error; any
    /// other error becomes a generic 500.
    async fn handle(&self, command: &Command, context: &RequestContext) -> Result<CommandResponse>;

    /// Get a description of this handler (for logging)
    fn description(&self) -> &str {
        "operation handler"
    }
}

/// Where write commands are sent when forwarding is enabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTarget {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl ForwardTarget {
    /// Redirect location for a query
    pub fn location(&self, query: &str) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("{}://{}:{}{}?{}", self.scheme, self.host, self.port, path, query)
    }
}

/// Dispatcher settings, fixed at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Bitmask of access modes that must be signed
    pub protection_level: u32,

    /// Redirect create/update commands here instead of running them
    pub forward_writes: Option<ForwardTarget>,

    /// Accept a raw certificate in place of a detached signature
    ///
    /// Off unless configured: the trusted certificate is public, so anyone
    /// holding it passes the fallback.
    pub allow_certificate_fallback: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            protection_level: PROTECTION_RCUD,
            forward_writes: None,
            allow_certificate_fallback: false,
        }
    }
}

/// Request Dispatcher
///
/// Holds an immutable registry of operation handlers. Built once through
/// [`RequestDispatcherBuilder`] and shared behind an `Arc`.
pub struct RequestDispatcher {
    handlers: HashMap<Operation, Arc<dyn OperationHandler>>,
    authorizer: Authorizer,
    config: DispatcherConfig,
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("operations", &self.registered_operations())
            .field("config", &self.config)
            .finish()
    }
}

impl RequestDispatcher {
    pub fn builder(provider: Arc<dyn CertificateProvider>) -> RequestDispatcherBuilder {
        RequestDispatcherBuilder::new(provider)
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// List all registered operations, in catalogue order
    pub fn registered_operations(&self) -> Vec<Operation> {
        Operation::ALL
            .iter()
            .copied()
            .filter(|op| self.handlers.contains_key(op))
            .collect()
    }

    /// Dispatch one request
    ///
    /// Never fails: every error becomes an error reply.
    pub async fn run(&self, request: CommandRequest) -> DispatchResult {
        match self.dispatch(request).await {
            Ok(result) => result,
            Err(err) => {
                if err.status() >= 500 {
                    error!(error = %err, "Command failed");
                } else {
                    warn!(status = err.status(), error = %err, "Command rejected");
                }
                DispatchResult::Reply(CommandResponse::error(err.status(), &err.client_message()))
            }
        }
    }

    async fn dispatch(&self, request: CommandRequest) -> Result<DispatchResult> {
        let query = normalize_query(&request.query);
        if query.is_empty() {
            return Err(DispatchError::protocol("Query string is required."));
        }

        let method: HttpMethod = request.method.parse().map_err(DispatchError::protocol)?;
        let command = resolve(method, query, &request.charset)?;
        let operation = command.operation();

        if let Some(target) = &self.config.forward_writes {
            if command.access_mode().is_write() {
                let location = target.location(&command.canonical_query(&[SIGNATURE_PARAM]));
                info!(operation = %operation, location = %location, "Forwarding write command");
                return Ok(DispatchResult::Redirect(location));
            }
        }

        let handler = self.handlers.get(&operation).ok_or_else(|| {
            warn!(operation = %operation, method = %method, "No handler for command");
            DispatchError::protocol("Unsupported command for this HTTP method")
        })?;

        let authorization = self.authorizer.authorize(&command).await?;

        let context = RequestContext {
            headers: request.headers,
            body: request.body,
            signer: authorization.signer().cloned(),
        };

        let response = handler.handle(&command, &context).await.map_err(|err| match err {
            DispatchError::Protocol { .. } | DispatchError::Verification { .. } => err,
            DispatchError::Storage(_) | DispatchError::Internal(_) => {
                error!(
                    operation = %operation,
                    handler = handler.description(),
                    error = %err,
                    "Handler failed"
                );
                DispatchError::Internal(err.to_string())
            }
        })?;

        Ok(DispatchResult::from_response(response))
    }
}

/// Strip the leading `?` and surrounding whitespace
fn normalize_query(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_prefix('?').unwrap_or(trimmed).trim()
}

/// Builder for creating a RequestDispatcher with handlers
pub struct RequestDispatcherBuilder {
    handlers: HashMap<Operation, Arc<dyn OperationHandler>>,
    provider: Arc<dyn CertificateProvider>,
    config: DispatcherConfig,
}

impl RequestDispatcherBuilder {
    pub fn new(provider: Arc<dyn CertificateProvider>) -> Self {
        Self {
            handlers: HashMap::new(),
            provider,
            config: DispatcherConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Add an operation handler; a later handler for the same operation wins
    pub fn with_handler<H: OperationHandler + 'static>(self, handler: H) -> Self {
        self.with_shared_handler(Arc::new(handler))
    }

    pub fn with_shared_handler(mut self, handler: Arc<dyn OperationHandler>) -> Self {
        let operation = handler.operation();
        info!(
            operation = %operation,
            description = handler.description(),
            "Registered operation handler"
        );
        if self.handlers.insert(operation, handler).is_some() {
            warn!(operation = %operation, "Replaced previously registered handler");
        }
        self
    }

    /// Build the dispatcher
    pub fn build(self) -> RequestDispatcher {
        let authorizer = Authorizer::new(
            self.provider,
            self.config.protection_level,
            self.config.allow_certificate_fallback,
        );
        RequestDispatcher {
            handlers: self.handlers,
            authorizer,
            config: self.config,
        }
    }
}
