//! ArchiveLink Request Dispatcher
//!
//! Turns raw HTTP requests into resolved commands, authorizes them and hands
//! them to operation handlers.
//!
//! ## Architecture
//!
//! The dispatcher keeps an immutable registry with one handler per
//! operation. For every request it:
//!
//! 1. normalizes the query string and resolves the command
//! 2. redirects create/update commands when write forwarding is configured
//! 3. checks the signed URL when the protection level covers the command's
//!    access mode, using the repository's certificate from a
//!    [`CertificateProvider`]
//! 4. runs the handler and maps its errors to protocol replies
//!
//! ## Usage
//!
//! ```ignore
//! use archivelink_dispatch::{handlers::*, MemoryCertificateStore, RequestDispatcher};
//!
//! let provider = Arc::new(MemoryCertificateStore::new());
//! let dispatcher = RequestDispatcher::builder(provider.clone())
//!     .with_handler(ServerInfoHandler::new(provider.clone()))
//!     .with_handler(PutCertHandler::new(provider))
//!     .build();
//!
//! let result = dispatcher.run(CommandRequest::new("GET", "serverInfo")).await;
//! ```

pub mod authorize;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod provider;
pub mod types;

pub use authorize::{Authorization, Authorizer};
pub use dispatcher::{
    DispatcherConfig, ForwardTarget, OperationHandler, RequestDispatcher, RequestDispatcherBuilder,
};
pub use error::{DispatchError, Result};
pub use provider::{CertificateProvider, MemoryCertificateStore, StorageError};
pub use types::{
    charset_from_content_type, CommandRequest, CommandResponse, DispatchResult, DocumentPart,
    RequestContext,
};
