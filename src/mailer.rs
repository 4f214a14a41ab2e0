use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

/// Delivery channel for activation codes.
///
/// Dispatch is best-effort: the registration flow treats a send failure as a
/// warning, never as a reason to abort.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_activation_code(&self, email: &str, code: &str) -> anyhow::Result<()>;
}

/// Logs the code instead of delivering it. Used in development and tests.
pub struct MockMailer;

#[async_trait]
impl Mailer for MockMailer {
    async fn send_activation_code(&self, email: &str, code: &str) -> anyhow::Result<()> {
        info!(%email, %code, "mock mail: activation code");
        Ok(())
    }
}

/// Forwards the code to an external mail gateway as a JSON POST.
pub struct WebhookMailer {
    client: reqwest::Client,
    url: String,
}

impl WebhookMailer {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send_activation_code(&self, email: &str, code: &str) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "email": email, "code": code }))
            .send()
            .await
            .context("send activation mail")?;
        resp.error_for_status()
            .context("mail gateway rejected the request")?;
        Ok(())
    }
}
