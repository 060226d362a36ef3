//! Fixed-text handler
//!
//! Answers one operation with the same text every time. Used for operations
//! whose document-store semantics live outside the gateway.

use async_trait::async_trait;
use archivelink_core::{Command, Operation};

use crate::dispatcher::OperationHandler;
use crate::error::Result;
use crate::types::{CommandResponse, RequestContext};

pub struct StaticTextHandler {
    operation: Operation,
    status: u16,
    text: String,
    description: String,
}

impl StaticTextHandler {
    /// Answer `operation` with `text` and status 200
    pub fn new(operation: Operation, text: impl Into<String>) -> Self {
        Self {
            operation,
            status: 200,
            text: text.into(),
            description: format!("static text for {}", operation),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Acknowledgement handler: `"<command> OK"`
    pub fn acknowledge(operation: Operation) -> Self {
        Self::new(operation, format!("{} OK\n", operation))
    }
}

#[async_trait]
impl OperationHandler for StaticTextHandler {
    fn operation(&self) -> Operation {
        self.operation
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn handle(
        &self,
        _command: &Command,
        _context: &RequestContext,
    ) -> Result<CommandResponse> {
        Ok(CommandResponse::text(self.status, self.text.clone()))
    }
}
