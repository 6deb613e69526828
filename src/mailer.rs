use async_trait::async_trait;
use tracing::{debug, info};

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Writes outgoing mail to the log instead of an SMTP relay.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        info!(%to, %subject, "outgoing mail");
        // Bodies carry live reset and verification links.
        debug!(%to, %body, "outgoing mail body");
        Ok(())
    }
}
