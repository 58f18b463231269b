use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::schema::*;

/// Workflow status of a client case. Single canonical field; the portal still
/// sees it under the legacy `workflow_status` response key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    Created,
    PortalAccessSent,
    CreditorReview,
    AwaitingClientConfirmation,
    CreditorContactInitiated,
    CreditorContactActive,
    Completed,
}

impl ClientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientStatus::Created => "created",
            ClientStatus::PortalAccessSent => "portal_access_sent",
            ClientStatus::CreditorReview => "creditor_review",
            ClientStatus::AwaitingClientConfirmation => "awaiting_client_confirmation",
            ClientStatus::CreditorContactInitiated => "creditor_contact_initiated",
            ClientStatus::CreditorContactActive => "creditor_contact_active",
            ClientStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditorStatus {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditorOrigin {
    ClientManualEntry,
    AdminManualEntry,
    AiExtraction,
}

impl CreditorOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditorOrigin::ClientManualEntry => "client_manual_entry",
            CreditorOrigin::AdminManualEntry => "admin_manual_entry",
            CreditorOrigin::AiExtraction => "ai_extraction",
        }
    }
}

/// A creditor entry on a client's final creditor list. Entries are never
/// hard-deleted; corrections go through `status_history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Creditor {
    pub id: Uuid,
    pub sender_name: String,
    #[serde(default)]
    pub sender_email: Option<String>,
    #[serde(default)]
    pub sender_address: Option<String>,
    #[serde(default)]
    pub reference_number: Option<String>,
    pub claim_amount: f64,
    #[serde(default)]
    pub is_representative: bool,
    /// The true creditor when the sender is a representative or collection agency.
    #[serde(default)]
    pub actual_creditor: Option<String>,
    pub status: CreditorStatus,
    pub ai_confidence: f64,
    #[serde(default)]
    pub manually_reviewed: bool,
    #[serde(default)]
    pub reviewed_by: Option<String>,
    #[serde(default)]
    pub reviewed_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub confirmed_at: Option<NaiveDateTime>,
    pub created_via: CreditorOrigin,
    #[serde(default)]
    pub correction_notes: Option<String>,
    #[serde(default)]
    pub source_document_id: Option<Uuid>,
    pub created_at: NaiveDateTime,
}

/// Metadata of an uploaded document. Binary content and extraction live in
/// external services; only the linkage and the creditor-document flag matter here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientDocument {
    pub id: Uuid,
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    /// `Some(false)` means an admin explicitly ruled this out as a creditor
    /// document; creditors extracted from it are hidden from the client.
    #[serde(default)]
    pub is_creditor_document: Option<bool>,
    pub uploaded_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactSendStatus {
    Pending,
    Sent,
    Failed,
}

/// One outbound creditor email, tracked for resend and status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditorContact {
    pub id: Uuid,
    pub creditor_id: Uuid,
    pub creditor_name: String,
    pub email: String,
    #[serde(default)]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub side_conversation_id: Option<String>,
    pub status: ContactSendStatus,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub sent_at: Option<NaiveDateTime>,
}

/// Append-only audit log entry. The history is the system's only durable event
/// log and is never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub status: String,
    pub changed_by: String,
    pub metadata: Value,
    pub created_at: NaiveDateTime,
}

/// One debtor case. Owns its creditors, documents, contacts and history
/// exclusively; persisted as a single document row (read, mutate, single save).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub aktenzeichen: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub current_status: ClientStatus,
    #[serde(default)]
    pub admin_approved: bool,
    #[serde(default)]
    pub client_confirmed_creditors: bool,
    #[serde(default)]
    pub client_confirmed_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub first_payment_received: bool,
    #[serde(default)]
    pub seven_day_review_triggered: bool,
    #[serde(default)]
    pub creditor_contact_started: bool,
    #[serde(default)]
    pub creditor_contact_started_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub confirmation_deadline: Option<NaiveDateTime>,
    #[serde(default)]
    pub main_ticket_id: Option<String>,
    #[serde(default)]
    pub final_creditor_list: Vec<Creditor>,
    #[serde(default)]
    pub documents: Vec<ClientDocument>,
    #[serde(default)]
    pub creditor_contacts: Vec<CreditorContact>,
    #[serde(default)]
    pub status_history: Vec<StatusHistoryEntry>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Client {
    pub fn new(aktenzeichen: String, name: String, email: Option<String>) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4(),
            aktenzeichen,
            name,
            email,
            current_status: ClientStatus::Created,
            admin_approved: false,
            client_confirmed_creditors: false,
            client_confirmed_at: None,
            first_payment_received: false,
            seven_day_review_triggered: false,
            creditor_contact_started: false,
            creditor_contact_started_at: None,
            confirmation_deadline: None,
            main_ticket_id: None,
            final_creditor_list: Vec::new(),
            documents: Vec::new(),
            creditor_contacts: Vec::new(),
            status_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the creditor list has been released to the client. Either an
    /// admin approved it, or the auto-approval conditions hold during review
    /// (first payment received and the seven-day review already ran).
    pub fn creditor_list_released(&self) -> bool {
        if self.admin_approved {
            return true;
        }
        self.current_status == ClientStatus::CreditorReview
            && self.first_payment_received
            && self.seven_day_review_triggered
    }

    /// Creditors shown to the client: anything whose source document has been
    /// explicitly marked as not a creditor document is filtered out.
    pub fn visible_creditors(&self) -> Vec<&Creditor> {
        self.final_creditor_list
            .iter()
            .filter(|creditor| match creditor.source_document_id {
                Some(document_id) => !self
                    .documents
                    .iter()
                    .any(|doc| doc.id == document_id && doc.is_creditor_document == Some(false)),
                None => true,
            })
            .collect()
    }

    /// Appends an audit entry. History is append-only; callers persist the
    /// whole aggregate afterwards.
    pub fn record_history(&mut self, status: &str, changed_by: &str, metadata: Value) {
        self.status_history.push(StatusHistoryEntry {
            id: Uuid::new_v4(),
            status: status.to_string(),
            changed_by: changed_by.to_string(),
            metadata,
            created_at: Utc::now().naive_utc(),
        });
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now().naive_utc();
    }

    pub fn total_debt(&self) -> f64 {
        self.final_creditor_list
            .iter()
            .map(|creditor| creditor.claim_amount)
            .sum()
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = clients)]
pub struct ClientRow {
    pub id: Uuid,
    pub aktenzeichen: String,
    pub data: Value,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = clients)]
pub struct NewClientRow {
    pub id: Uuid,
    pub aktenzeichen: String,
    pub data: Value,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}
