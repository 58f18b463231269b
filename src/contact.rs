use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Client, ClientStatus, ContactSendStatus, Creditor, CreditorContact};
use crate::state::AppState;
use crate::ticketing::Ticketing;

#[derive(Debug, Serialize)]
pub struct SendResult {
    pub creditor: String,
    pub email: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContactOutcome {
    pub success: bool,
    pub emails_sent: usize,
    pub emails_failed: usize,
    pub main_ticket_id: String,
    pub results: Vec<SendResult>,
}

fn email_subject(client: &Client) -> String {
    format!("Forderungsanfrage - Az. {}", client.aktenzeichen)
}

fn email_body(client: &Client, creditor: &Creditor) -> String {
    let mut body = format!(
        "Sehr geehrte Damen und Herren,\n\n\
         wir vertreten {} in einem Verbraucherinsolvenzverfahren \
         (Aktenzeichen {}).\n\n",
        client.name, client.aktenzeichen
    );
    if creditor.is_representative {
        if let Some(actual) = &creditor.actual_creditor {
            body.push_str(&format!(
                "Sie wurden uns als Vertretung der Forderung von {actual} benannt.\n\n"
            ));
        }
    }
    if let Some(reference) = &creditor.reference_number {
        body.push_str(&format!("Ihr Zeichen: {reference}\n\n"));
    }
    body.push_str(
        "Bitte teilen Sie uns die aktuelle Forderungshoehe sowie eine \
         Forderungsaufstellung mit.\n\nMit freundlichen Gruessen\nIhre Kanzlei",
    );
    body
}

async fn ensure_main_ticket(
    ticketing: &Arc<dyn Ticketing>,
    client: &Client,
    contact_count: usize,
) -> AppResult<String> {
    if let Some(ticket_id) = &client.main_ticket_id {
        return Ok(ticket_id.clone());
    }
    let subject = format!(
        "Glaeubigerkontakt {} (Az. {})",
        client.name, client.aktenzeichen
    );
    let body = format!(
        "Forderungsanfragen an {contact_count} Glaeubiger fuer Mandant {} (Az. {}).",
        client.name, client.aktenzeichen
    );
    let ticket_id = ticketing
        .create_ticket(&subject, &body)
        .await
        .map_err(AppError::internal)?;
    Ok(ticket_id)
}

fn require_ticketing(state: &AppState) -> AppResult<Arc<dyn Ticketing>> {
    state
        .ticketing
        .clone()
        .ok_or_else(|| AppError::bad_request("ticketing is not configured"))
}

/// Contacts every creditor that has an email address: one side conversation per
/// creditor on the case's main ticket, spaced by the configured delay so the
/// provider rate limit is respected. Individual send failures are recorded and
/// do not abort the loop.
pub async fn start_creditor_contact(
    state: &AppState,
    client: &mut Client,
    changed_by: &str,
) -> AppResult<ContactOutcome> {
    let ticketing = require_ticketing(state)?;

    let targets: Vec<Creditor> = client
        .final_creditor_list
        .iter()
        .filter(|creditor| creditor.sender_email.is_some())
        .cloned()
        .collect();
    if targets.is_empty() {
        return Err(AppError::bad_request(
            "client has no creditors with email addresses",
        ));
    }

    let ticket_id = ensure_main_ticket(&ticketing, client, targets.len()).await?;
    client.main_ticket_id = Some(ticket_id.clone());

    let subject = email_subject(client);
    let delay = state.config.email_send_delay();
    let mut contacts = Vec::with_capacity(targets.len());
    let mut results = Vec::with_capacity(targets.len());

    for (index, creditor) in targets.iter().enumerate() {
        if index > 0 {
            sleep(delay).await;
        }
        let email = creditor
            .sender_email
            .clone()
            .unwrap_or_default();
        let body = email_body(client, creditor);
        let mut contact = CreditorContact {
            id: Uuid::new_v4(),
            creditor_id: creditor.id,
            creditor_name: creditor.sender_name.clone(),
            email: email.clone(),
            ticket_id: Some(ticket_id.clone()),
            side_conversation_id: None,
            status: ContactSendStatus::Pending,
            last_error: None,
            sent_at: None,
        };

        match ticketing
            .send_side_conversation(&ticket_id, &email, &subject, &body)
            .await
        {
            Ok(side_conversation_id) => {
                contact.side_conversation_id = Some(side_conversation_id);
                contact.status = ContactSendStatus::Sent;
                contact.sent_at = Some(Utc::now().naive_utc());
                results.push(SendResult {
                    creditor: creditor.sender_name.clone(),
                    email,
                    success: true,
                    error: None,
                });
            }
            Err(err) => {
                warn!(
                    client_id = %client.id,
                    creditor = %creditor.sender_name,
                    error = %err,
                    "creditor email failed"
                );
                contact.status = ContactSendStatus::Failed;
                contact.last_error = Some(err.to_string());
                results.push(SendResult {
                    creditor: creditor.sender_name.clone(),
                    email,
                    success: false,
                    error: Some(err.to_string()),
                });
            }
        }
        contacts.push(contact);
    }

    let emails_sent = results.iter().filter(|r| r.success).count();
    let emails_failed = results.len() - emails_sent;

    client.creditor_contacts = contacts;
    client.creditor_contact_started = true;
    client.creditor_contact_started_at = Some(Utc::now().naive_utc());
    client.current_status = ClientStatus::CreditorContactActive;
    client.record_history(
        "creditor_contact_started",
        changed_by,
        json!({
            "ticket_id": ticket_id,
            "emails_sent": emails_sent,
            "emails_failed": emails_failed,
        }),
    );
    client.touch();
    state.store.save(client).await?;

    info!(
        client_id = %client.id,
        emails_sent,
        emails_failed,
        ticket_id = %ticket_id,
        "creditor contact completed"
    );

    // Audit note on the ticket; the contact itself already succeeded.
    if let Err(err) = ticketing
        .add_internal_note(
            &ticket_id,
            &format!(
                "Forderungsanfragen versendet: {emails_sent} von {} (Az. {}).",
                results.len(),
                client.aktenzeichen
            ),
        )
        .await
    {
        warn!(client_id = %client.id, error = %err, "internal audit note failed");
    }

    Ok(ContactOutcome {
        success: emails_failed == 0,
        emails_sent,
        emails_failed,
        main_ticket_id: ticket_id,
        results,
    })
}

#[derive(Debug, Serialize)]
pub struct ResendOutcome {
    pub success: bool,
    pub emails_sent: usize,
    pub results: Vec<SendResult>,
}

/// Resends the creditor emails sequentially with the configured inter-send
/// delay. Per-creditor failures are collected, never aborting the loop.
pub async fn resend_creditor_emails(
    state: &AppState,
    client: &mut Client,
    changed_by: &str,
) -> AppResult<ResendOutcome> {
    if !client.creditor_contact_started || client.creditor_contacts.is_empty() {
        return Err(AppError::bad_request(
            "creditor contact has not been started for this client",
        ));
    }
    let ticketing = require_ticketing(state)?;
    let ticket_id = client
        .main_ticket_id
        .clone()
        .ok_or_else(|| AppError::internal("contact started but no main ticket recorded"))?;

    let subject = email_subject(client);
    let delay = state.config.email_send_delay();
    let mut results = Vec::with_capacity(client.creditor_contacts.len());

    for index in 0..client.creditor_contacts.len() {
        if index > 0 {
            sleep(delay).await;
        }
        let (email, creditor_id, creditor_name) = {
            let contact = &client.creditor_contacts[index];
            (
                contact.email.clone(),
                contact.creditor_id,
                contact.creditor_name.clone(),
            )
        };
        let body = match client
            .final_creditor_list
            .iter()
            .find(|creditor| creditor.id == creditor_id)
        {
            Some(creditor) => email_body(client, creditor),
            None => continue,
        };

        let send = ticketing
            .send_side_conversation(&ticket_id, &email, &subject, &body)
            .await;
        let contact = &mut client.creditor_contacts[index];
        match send {
            Ok(side_conversation_id) => {
                contact.side_conversation_id = Some(side_conversation_id);
                contact.status = ContactSendStatus::Sent;
                contact.sent_at = Some(Utc::now().naive_utc());
                contact.last_error = None;
                results.push(SendResult {
                    creditor: creditor_name,
                    email,
                    success: true,
                    error: None,
                });
            }
            Err(err) => {
                warn!(
                    client_id = %client.id,
                    creditor = %creditor_name,
                    error = %err,
                    "creditor email resend failed"
                );
                contact.status = ContactSendStatus::Failed;
                contact.last_error = Some(err.to_string());
                results.push(SendResult {
                    creditor: creditor_name,
                    email,
                    success: false,
                    error: Some(err.to_string()),
                });
            }
        }
    }

    let emails_sent = results.iter().filter(|r| r.success).count();
    client.record_history(
        "creditor_emails_resent",
        changed_by,
        json!({ "emails_sent": emails_sent, "emails_total": results.len() }),
    );
    client.touch();
    state.store.save(client).await?;

    Ok(ResendOutcome {
        success: emails_sent == results.len(),
        emails_sent,
        results,
    })
}

#[derive(Debug, Serialize)]
pub struct ContactStatusView {
    pub contact_started: bool,
    pub contact_started_at: Option<chrono::NaiveDateTime>,
    pub main_ticket_id: Option<String>,
    pub emails_sent: usize,
    pub emails_failed: usize,
    pub contacts: Vec<ContactEntryView>,
}

#[derive(Debug, Serialize)]
pub struct ContactEntryView {
    pub creditor_name: String,
    pub email: String,
    pub status: ContactSendStatus,
    pub side_conversation_id: Option<String>,
    pub sent_at: Option<chrono::NaiveDateTime>,
    pub last_error: Option<String>,
}

pub fn contact_status(client: &Client) -> ContactStatusView {
    let contacts: Vec<ContactEntryView> = client
        .creditor_contacts
        .iter()
        .map(|contact| ContactEntryView {
            creditor_name: contact.creditor_name.clone(),
            email: contact.email.clone(),
            status: contact.status,
            side_conversation_id: contact.side_conversation_id.clone(),
            sent_at: contact.sent_at,
            last_error: contact.last_error.clone(),
        })
        .collect();
    let emails_sent = contacts
        .iter()
        .filter(|c| c.status == ContactSendStatus::Sent)
        .count();
    let emails_failed = contacts
        .iter()
        .filter(|c| c.status == ContactSendStatus::Failed)
        .count();

    ContactStatusView {
        contact_started: client.creditor_contact_started,
        contact_started_at: client.creditor_contact_started_at,
        main_ticket_id: client.main_ticket_id.clone(),
        emails_sent,
        emails_failed,
        contacts,
    }
}

#[derive(Debug, Serialize)]
pub struct DebtSummary {
    pub total_debt: f64,
    pub creditor_count: usize,
    pub creditors: Vec<DebtSummaryEntry>,
}

#[derive(Debug, Serialize)]
pub struct DebtSummaryEntry {
    pub name: String,
    pub reference_number: Option<String>,
    pub amount: f64,
}

pub fn final_debt_summary(client: &Client) -> DebtSummary {
    let creditors: Vec<DebtSummaryEntry> = client
        .final_creditor_list
        .iter()
        .map(|creditor| DebtSummaryEntry {
            name: creditor.sender_name.clone(),
            reference_number: creditor.reference_number.clone(),
            amount: creditor.claim_amount,
        })
        .collect();

    DebtSummary {
        total_debt: client.total_debt(),
        creditor_count: creditors.len(),
        creditors,
    }
}
