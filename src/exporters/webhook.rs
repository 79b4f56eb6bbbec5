//! Optional exporter that POSTs each audit entry to a configured webhook.
//! Only compiled with the `webhook-exporter` feature, since it pulls in
//! `reqwest`.

use async_trait::async_trait;

use crate::error::InfrastructureError;
use crate::types::AuditEntry;

use super::Exporter;

pub struct WebhookExporter {
    client: reqwest::Client,
    url: String,
}

impl WebhookExporter {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl Exporter for WebhookExporter {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn export(&self, entry: &AuditEntry) -> Result<(), InfrastructureError> {
        self.client
            .post(&self.url)
            .json(entry)
            .send()
            .await
            .map_err(|source| InfrastructureError::Exporter {
                name: self.name().to_string(),
                source: source.into(),
            })?
            .error_for_status()
            .map_err(|source| InfrastructureError::Exporter {
                name: self.name().to_string(),
                source: source.into(),
            })?;
        Ok(())
    }
}
