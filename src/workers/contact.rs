use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::contact::start_creditor_contact;
use crate::jobs::JOB_CREDITOR_CONTACT;
use crate::models::Job;
use crate::state::AppState;

use super::{JobExecution, JobHandler};

#[derive(Debug, Deserialize)]
struct ContactPayload {
    client_id: Uuid,
}

/// Drives the creditor-contact pipeline for a confirmed client. Idempotent:
/// a client whose contact already started is a no-op success, so redelivery
/// and the manual admin endpoint cannot double-send.
pub struct CreditorContactJob;

impl CreditorContactJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CreditorContactJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for CreditorContactJob {
    fn job_type(&self) -> &'static str {
        JOB_CREDITOR_CONTACT
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let payload: ContactPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid contact payload: {err}"),
                }
            }
        };

        if state.ticketing.is_none() {
            warn!(
                client_id = %payload.client_id,
                "ticketing not configured; skipping creditor contact"
            );
            return JobExecution::Success;
        }

        let mut client = match state.store.find(&payload.client_id.to_string()).await {
            Ok(Some(client)) => client,
            Ok(None) => {
                return JobExecution::Failed {
                    error: format!("client {} not found", payload.client_id),
                }
            }
            Err(err) => {
                return JobExecution::Retry {
                    delay: Duration::from_secs(30),
                    error: format!("client lookup failed: {err}"),
                }
            }
        };

        if client.creditor_contact_started {
            info!(client_id = %client.id, "creditor contact already started; nothing to do");
            return JobExecution::Success;
        }
        if !client.client_confirmed_creditors {
            return JobExecution::Failed {
                error: format!("client {} has not confirmed creditors", client.id),
            };
        }

        match start_creditor_contact(state.as_ref(), &mut client, "system").await {
            Ok(outcome) => {
                info!(
                    client_id = %client.id,
                    emails_sent = outcome.emails_sent,
                    emails_failed = outcome.emails_failed,
                    "creditor contact job done"
                );
                JobExecution::Success
            }
            // 4xx means the case itself cannot be contacted (e.g. no creditors
            // with email addresses); retrying will never change that. The admin
            // endpoint remains the manual path once the case is fixed up.
            Err(err) if err.status().is_client_error() => JobExecution::Failed {
                error: format!("creditor contact rejected: {err}"),
            },
            Err(err) => JobExecution::Retry {
                delay: Duration::from_secs(60),
                error: format!("creditor contact failed: {err}"),
            },
        }
    }
}
