//! Pluggable sinks for audit entries, in addition to the in-process audit
//! log. An exporter failure is isolated and logged; it must never stop
//! the guard from evaluating or executing actions.

mod stdout;
#[cfg(feature = "webhook-exporter")]
mod webhook;

pub use stdout::StdoutExporter;
#[cfg(feature = "webhook-exporter")]
pub use webhook::WebhookExporter;

use async_trait::async_trait;

use crate::error::InfrastructureError;
use crate::types::AuditEntry;

/// A sink an [`AuditEntry`] is sent to after it's recorded in the
/// in-process audit log.
#[async_trait]
pub trait Exporter: Send + Sync {
    fn name(&self) -> &str;

    async fn export(&self, entry: &AuditEntry) -> Result<(), InfrastructureError>;
}
