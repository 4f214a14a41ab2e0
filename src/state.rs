use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use time::Duration;

use crate::config::AppConfig;
use crate::mailer::{Mailer, MockMailer, WebhookMailer};
use crate::registration::repo::PgStore;
use crate::registration::service::RegistrationService;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub service: Arc<RegistrationService>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let store = Arc::new(PgStore::new(db.clone()));
        let mailer = mailer_from_config(&config)?;

        let service = Arc::new(RegistrationService::new(
            store,
            mailer,
            Duration::minutes(config.activation.code_ttl_minutes),
            config.activation.password_min_len,
        ));

        Ok(Self {
            db,
            config,
            service,
        })
    }
}

/// The mail transport is chosen here, from configuration; the service only
/// ever sees `Arc<dyn Mailer>`.
fn mailer_from_config(config: &AppConfig) -> anyhow::Result<Arc<dyn Mailer>> {
    match config.email.mode.as_str() {
        "mock" => Ok(Arc::new(MockMailer)),
        "webhook" => {
            let url = config
                .email
                .webhook_url
                .clone()
                .context("EMAIL_WEBHOOK_URL is required when EMAIL_MODE=webhook")?;
            Ok(Arc::new(WebhookMailer::new(url)))
        }
        other => anyhow::bail!("unknown EMAIL_MODE: {other}"),
    }
}
