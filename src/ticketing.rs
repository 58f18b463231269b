use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;

use crate::config::AppConfig;

/// Zendesk-shaped ticketing surface: one main ticket per case, one side
/// conversation per creditor email, internal notes for the audit trail.
#[async_trait]
pub trait Ticketing: Send + Sync + 'static {
    async fn create_ticket(&self, subject: &str, body: &str) -> Result<String>;

    /// Sends an email thread attached to the ticket; returns the side
    /// conversation id.
    async fn send_side_conversation(
        &self,
        ticket_id: &str,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<String>;

    async fn add_internal_note(&self, ticket_id: &str, body: &str) -> Result<()>;
}

pub struct ZendeskClient {
    http: HttpClient,
    base_url: String,
    auth_header: String,
}

impl ZendeskClient {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let subdomain = config
            .zendesk_subdomain
            .as_ref()
            .ok_or_else(|| anyhow!("ZENDESK_SUBDOMAIN missing"))?;
        let email = config
            .zendesk_email
            .as_ref()
            .ok_or_else(|| anyhow!("ZENDESK_EMAIL missing"))?;
        let api_token = config
            .zendesk_api_token
            .as_ref()
            .ok_or_else(|| anyhow!("ZENDESK_API_TOKEN missing"))?;

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.zendesk_request_timeout_secs))
            .build()
            .context("failed to build zendesk http client")?;

        let credentials = BASE64.encode(format!("{email}/token:{api_token}"));

        Ok(Self {
            http,
            base_url: format!("https://{subdomain}.zendesk.com/api/v2"),
            auth_header: format!("Basic {credentials}"),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TicketEnvelope {
    ticket: TicketBody,
}

#[derive(Debug, Deserialize)]
struct TicketBody {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct SideConversationEnvelope {
    side_conversation: SideConversationBody,
}

#[derive(Debug, Deserialize)]
struct SideConversationBody {
    id: String,
}

#[async_trait]
impl Ticketing for ZendeskClient {
    async fn create_ticket(&self, subject: &str, body: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}/tickets.json", self.base_url))
            .header("authorization", &self.auth_header)
            .json(&json!({
                "ticket": {
                    "subject": subject,
                    "comment": { "body": body, "public": false },
                    "tags": ["glaeubiger-kontakt"],
                }
            }))
            .send()
            .await
            .context("failed to reach zendesk")?
            .error_for_status()
            .context("zendesk rejected ticket creation")?;

        let envelope: TicketEnvelope = response
            .json()
            .await
            .context("unexpected zendesk ticket response")?;
        Ok(envelope.ticket.id.to_string())
    }

    async fn send_side_conversation(
        &self,
        ticket_id: &str,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<String> {
        let response = self
            .http
            .post(format!(
                "{}/tickets/{}/side_conversations",
                self.base_url, ticket_id
            ))
            .header("authorization", &self.auth_header)
            .json(&json!({
                "message": {
                    "subject": subject,
                    "body": body,
                    "to": [{ "email": recipient }],
                }
            }))
            .send()
            .await
            .context("failed to reach zendesk")?
            .error_for_status()
            .context("zendesk rejected side conversation")?;

        let envelope: SideConversationEnvelope = response
            .json()
            .await
            .context("unexpected zendesk side conversation response")?;
        Ok(envelope.side_conversation.id)
    }

    async fn add_internal_note(&self, ticket_id: &str, body: &str) -> Result<()> {
        self.http
            .put(format!("{}/tickets/{}.json", self.base_url, ticket_id))
            .header("authorization", &self.auth_header)
            .json(&json!({
                "ticket": {
                    "comment": { "body": body, "public": false },
                }
            }))
            .send()
            .await
            .context("failed to reach zendesk")?
            .error_for_status()
            .context("zendesk rejected internal note")?;
        Ok(())
    }
}
