use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub jwt_expiry_minutes: i64,
    pub portal_base_url: String,
    pub portal_token_expiry_days: i64,
    pub confirmation_deadline_days: i64,
    pub email_send_delay_ms: u64,
    pub cors_allowed_origin: Option<String>,
    pub zendesk_subdomain: Option<String>,
    pub zendesk_email: Option<String>,
    pub zendesk_api_token: Option<String>,
    pub zendesk_request_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);
        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "kanzlei-backend".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "kanzlei-portal".to_string());
        let jwt_expiry_minutes = env::var("JWT_EXPIRY_MINUTES")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .context("JWT_EXPIRY_MINUTES must be an integer")?;
        let portal_base_url =
            env::var("PORTAL_BASE_URL").unwrap_or_else(|_| "http://localhost:5173".to_string());
        let portal_token_expiry_days = env::var("PORTAL_TOKEN_EXPIRY_DAYS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("PORTAL_TOKEN_EXPIRY_DAYS must be an integer")?;
        let confirmation_deadline_days = env::var("CONFIRMATION_DEADLINE_DAYS")
            .unwrap_or_else(|_| "14".to_string())
            .parse()
            .context("CONFIRMATION_DEADLINE_DAYS must be an integer")?;
        // Zendesk throttles side-conversation creation; keep sends spaced out.
        let email_send_delay_ms = env::var("EMAIL_SEND_DELAY_MS")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()
            .context("EMAIL_SEND_DELAY_MS must be an integer")?;
        let cors_allowed_origin = env::var("CORS_ALLOWED_ORIGIN").ok();
        let zendesk_subdomain = env::var("ZENDESK_SUBDOMAIN").ok();
        let zendesk_email = env::var("ZENDESK_EMAIL").ok();
        let zendesk_api_token = env::var("ZENDESK_API_TOKEN").ok();
        let zendesk_request_timeout_secs = env::var("ZENDESK_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("ZENDESK_REQUEST_TIMEOUT_SECS must be an integer")?;

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            jwt_secret,
            jwt_issuer,
            jwt_audience,
            jwt_expiry_minutes,
            portal_base_url,
            portal_token_expiry_days,
            confirmation_deadline_days,
            email_send_delay_ms,
            cors_allowed_origin,
            zendesk_subdomain,
            zendesk_email,
            zendesk_api_token,
            zendesk_request_timeout_secs,
        })
    }

    pub fn email_send_delay(&self) -> Duration {
        Duration::from_millis(self.email_send_delay_ms)
    }

    pub fn zendesk_configured(&self) -> bool {
        self.zendesk_subdomain.is_some()
            && self.zendesk_email.is_some()
            && self.zendesk_api_token.is_some()
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => raw.to_string(),
    }
}
