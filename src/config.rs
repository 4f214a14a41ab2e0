use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ActivationConfig {
    pub code_ttl_minutes: i64,
    pub password_min_len: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub mode: String,
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub activation: ActivationConfig,
    pub email: EmailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let activation = ActivationConfig {
            code_ttl_minutes: std::env::var("ACTIVATION_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(15),
            password_min_len: std::env::var("PASSWORD_MIN_LEN")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(8),
        };
        let email = EmailConfig {
            mode: std::env::var("EMAIL_MODE").unwrap_or_else(|_| "mock".into()),
            webhook_url: std::env::var("EMAIL_WEBHOOK_URL").ok(),
        };
        Ok(Self {
            database_url,
            activation,
            email,
        })
    }
}
