//! serverInfo handler
//!
//! Reports the gateway status and the configured repositories, either as
//! ArchiveLink `key="value";` text or as an HTML table (`resultAs=html`).

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use archivelink_core::{Command, Operation, TrustedCertificate};

use crate::dispatcher::OperationHandler;
use crate::error::Result;
use crate::provider::CertificateProvider;
use crate::types::{CommandResponse, RequestContext};

/// Protocol version reported to clients
pub const PROTOCOL_VERSION: &str = "0047";

pub struct ServerInfoHandler {
    provider: Arc<dyn CertificateProvider>,
    vendor: String,
    version: String,
}

struct RepositoryStatus {
    name: String,
    certificate: Option<TrustedCertificate>,
}

impl RepositoryStatus {
    fn certificate_state(&self) -> &'static str {
        match &self.certificate {
            Some(cert) if cert.enabled => "enabled",
            Some(_) => "disabled",
            None => "none",
        }
    }

    fn permissions(&self) -> String {
        self.certificate
            .as_ref()
            .map(TrustedCertificate::permission_letters)
            .unwrap_or_default()
    }
}

impl ServerInfoHandler {
    pub fn new(provider: Arc<dyn CertificateProvider>) -> Self {
        Self {
            provider,
            vendor: "archivelink-gateway".to_string(),
            version: archivelink_core::version().to_string(),
        }
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>, version: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self.version = version.into();
        self
    }

    /// Repositories to report; `contRep` narrows the report to one
    async fn repositories(&self, only: Option<&str>) -> Result<Vec<RepositoryStatus>> {
        let names = match only {
            Some(name) => vec![name.to_string()],
            None => self.provider.list().await?,
        };

        let mut repositories = Vec::with_capacity(names.len());
        for name in names {
            let certificate = self.provider.lookup(&name).await?;
            if only.is_some() && certificate.is_none() {
                continue;
            }
            repositories.push(RepositoryStatus { name, certificate });
        }
        Ok(repositories)
    }

    fn render_text(&self, repositories: &[RepositoryStatus]) -> String {
        let now = Utc::now();
        let mut out = format!(
            "serverStatus=\"running\";serverVendorId=\"{}\";serverVersion=\"{}\";serverDate=\"{}\";serverTime=\"{}\";pVersion=\"{}\";\r\n",
            self.vendor,
            self.version,
            now.format("%Y-%m-%d"),
            now.format("%H:%M:%S"),
            PROTOCOL_VERSION,
        );
        for repo in repositories {
            out.push_str(&format!(
                "contRep=\"{}\";contRepStatus=\"running\";certificate=\"{}\";permissions=\"{}\";\r\n",
                repo.name.replace('"', "'"),
                repo.certificate_state(),
                repo.permissions(),
            ));
        }
        out
    }

    fn render_html(&self, repositories: &[RepositoryStatus]) -> String {
        let mut rows = String::new();
        for repo in repositories {
            rows.push_str(&format!(
                "<tr><td>{}</td><td>running</td><td>{}</td><td>{}</td></tr>\n",
                escape_html(&repo.name),
                repo.certificate_state(),
                repo.permissions(),
            ));
        }

        format!(
            "<html><head><title>Server Info</title></head><body>\n\
             <h1>{} {}</h1>\n\
             <p>Status: running, protocol version {}</p>\n\
             <table>\n<tr><th>contRep</th><th>Status</th><th>Certificate</th><th>Permissions</th></tr>\n\
             {}</table>\n</body></html>\n",
            escape_html(&self.vendor),
            escape_html(&self.version),
            PROTOCOL_VERSION,
            rows,
        )
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[async_trait]
impl OperationHandler for ServerInfoHandler {
    fn operation(&self) -> Operation {
        Operation::ServerInfo
    }

    fn description(&self) -> &str {
        "server status report"
    }

    async fn handle(
        &self,
        command: &Command,
        _context: &RequestContext,
    ) -> Result<CommandResponse> {
        let only = command.decoded("contRep")?;
        let repositories = self.repositories(only.as_deref()).await?;

        let as_html = command
            .decoded("resultAs")?
            .is_some_and(|format| format.eq_ignore_ascii_case("html"));

        if as_html {
            Ok(CommandResponse::html(self.render_html(&repositories)))
        } else {
            Ok(CommandResponse::text(200, self.render_text(&repositories)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryCertificateStore;
    use archivelink_core::{resolve, HttpMethod, KeyPair};

    async fn store_with(repos: &[(&str, u32, bool)]) -> Arc<MemoryCertificateStore> {
        let store = Arc::new(MemoryCertificateStore::new());
        for (name, permissions, enabled) in repos {
            let kp = KeyPair::generate(format!("CN={}", name));
            let trusted = TrustedCertificate::new(kp.certificate().clone(), *permissions)
                .unwrap()
                .with_enabled(*enabled);
            store.register(name, trusted).await.unwrap();
        }
        store
    }

    async fn run(handler: &ServerInfoHandler, query: &str) -> CommandResponse {
        let command = resolve(HttpMethod::Get, query, "UTF-8").unwrap();
        handler.handle(&command, &RequestContext::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_text_report_lists_repositories() {
        let store = store_with(&[("K1", 15, true), ("K2", 1, false)]).await;
        let handler = ServerInfoHandler::new(store);

        let response = run(&handler, "serverInfo").await;
        let body = String::from_utf8(response.body().to_vec()).unwrap();

        assert_eq!(response.content_type(), Some("text/plain; charset=UTF-8"));
        assert!(body.starts_with("serverStatus=\"running\";"));
        assert!(body.contains(
            "contRep=\"K1\";contRepStatus=\"running\";certificate=\"enabled\";permissions=\"rcud\";"
        ));
        assert!(body.contains(
            "contRep=\"K2\";contRepStatus=\"running\";certificate=\"disabled\";permissions=\"r\";"
        ));
    }

    #[tokio::test]
    async fn test_single_repository() {
        let store = store_with(&[("K1", 15, true), ("K2", 1, true)]).await;
        let handler = ServerInfoHandler::new(store);

        let response = run(&handler, "serverInfo&contRep=K2").await;
        let body = String::from_utf8(response.into_body()).unwrap();
        assert!(body.contains("contRep=\"K2\""));
        assert!(!body.contains("contRep=\"K1\""));
    }

    #[tokio::test]
    async fn test_html_report_escapes_names() {
        let store = store_with(&[("<K1>", 15, true)]).await;
        let handler = ServerInfoHandler::new(store).with_vendor("acme", "9.9");

        let response = run(&handler, "serverInfo&resultAs=HTML").await;
        let body = String::from_utf8(response.body().to_vec()).unwrap();

        assert_eq!(response.content_type(), Some("text/html; charset=UTF-8"));
        assert!(body.contains("<h1>acme 9.9</h1>"));
        assert!(body.contains("&lt;K1&gt;"));
        assert!(!body.contains("<K1>"));
    }
}
