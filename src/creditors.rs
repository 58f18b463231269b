use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Client, Creditor, CreditorOrigin, CreditorStatus};
use crate::store::ClientStore;

/// Loosely-typed creditor input as the portal and admin UI send it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreditorDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(rename = "referenceNumber", alias = "reference_number", default)]
    pub reference_number: Option<String>,
    /// Number or string; German users type "150,50" as readily as "150.50".
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(rename = "isRepresentative", alias = "is_representative", default)]
    pub is_representative: bool,
    #[serde(rename = "actualCreditor", alias = "actual_creditor", default)]
    pub actual_creditor: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(rename = "sourceDocumentId", alias = "source_document_id", default)]
    pub source_document_id: Option<Uuid>,
}

/// Draft mapped onto the stored schema, still unpersisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CreditorFields {
    pub sender_name: String,
    pub sender_email: Option<String>,
    pub sender_address: Option<String>,
    pub reference_number: Option<String>,
    pub claim_amount: f64,
    pub is_representative: bool,
    pub actual_creditor: Option<String>,
    pub correction_notes: Option<String>,
    pub source_document_id: Option<Uuid>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Coerces the amount field to a decimal. Missing or blank means 0.
pub fn parse_claim_amount(value: Option<&Value>) -> Result<f64, String> {
    match value {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(number)) => number
            .as_f64()
            .ok_or_else(|| format!("amount {number} is not a valid decimal")),
        Some(Value::String(raw)) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(0.0);
            }
            trimmed
                .replace(',', ".")
                .parse::<f64>()
                .map_err(|_| format!("amount '{trimmed}' is not a valid decimal"))
        }
        Some(other) => Err(format!("amount must be a number or string, got {other}")),
    }
}

/// Pure mapping from portal input to the stored field names.
pub fn map_creditor_fields(draft: &CreditorDraft) -> Result<CreditorFields, String> {
    Ok(CreditorFields {
        sender_name: draft.name.trim().to_string(),
        sender_email: non_empty(draft.email.clone()),
        sender_address: non_empty(draft.address.clone()),
        reference_number: non_empty(draft.reference_number.clone()),
        claim_amount: parse_claim_amount(draft.amount.as_ref())?,
        is_representative: draft.is_representative,
        actual_creditor: non_empty(draft.actual_creditor.clone()),
        correction_notes: non_empty(draft.notes.clone()),
        source_document_id: draft.source_document_id,
    })
}

/// Builds a full creditor record for a manual entry. Manual entries are
/// maximally trusted: reviewed, confirmed and at confidence 1.0 from the start.
pub fn build_creditor(
    fields: CreditorFields,
    origin: CreditorOrigin,
    reviewed_by: &str,
) -> Creditor {
    let now = Utc::now().naive_utc();
    Creditor {
        id: Uuid::new_v4(),
        sender_name: fields.sender_name,
        sender_email: fields.sender_email,
        sender_address: fields.sender_address,
        reference_number: fields.reference_number,
        claim_amount: fields.claim_amount,
        is_representative: fields.is_representative,
        actual_creditor: fields.actual_creditor,
        status: CreditorStatus::Confirmed,
        ai_confidence: 1.0,
        manually_reviewed: true,
        reviewed_by: Some(reviewed_by.to_string()),
        reviewed_at: Some(now),
        confirmed_at: Some(now),
        created_via: origin,
        correction_notes: fields.correction_notes,
        source_document_id: fields.source_document_id,
        created_at: now,
    }
}

#[derive(Debug, Serialize)]
pub struct CreditorAdded {
    pub success: bool,
    pub creditor: AddedCreditorInfo,
    pub creditor_count: usize,
}

#[derive(Debug, Serialize)]
pub struct AddedCreditorInfo {
    pub id: Uuid,
    pub name: String,
    pub amount: f64,
}

/// Validates, appends and persists a manually-entered creditor. Exactly one
/// creditor and one history entry are appended to the same in-memory aggregate
/// before the single save, so neither can land without the other.
pub async fn add_creditor_to_client(
    store: &dyn ClientStore,
    client_key: &str,
    draft: CreditorDraft,
    origin: CreditorOrigin,
    created_by: &str,
    reviewed_by: &str,
) -> AppResult<CreditorAdded> {
    if draft.name.trim().is_empty() {
        return Err(AppError::validation("creditor name must not be empty"));
    }
    let fields = map_creditor_fields(&draft).map_err(AppError::validation)?;

    let mut client = store
        .find(client_key)
        .await?
        .ok_or_else(AppError::not_found)?;

    let creditor = build_creditor(fields, origin, reviewed_by);
    let summary = AddedCreditorInfo {
        id: creditor.id,
        name: creditor.sender_name.clone(),
        amount: creditor.claim_amount,
    };

    client.final_creditor_list.push(creditor);
    let creditor_count = client.final_creditor_list.len();
    client.record_history(
        "creditor_added",
        created_by,
        json!({
            "creditor_name": summary.name,
            "creditor_count": creditor_count,
            "created_via": origin.as_str(),
        }),
    );
    client.touch();
    store.save(&client).await?;

    Ok(CreditorAdded {
        success: true,
        creditor: summary,
        creditor_count,
    })
}

/// Public projection of a creditor, decoupled from storage internals.
#[derive(Debug, Serialize)]
pub struct CreditorView {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub reference_number: Option<String>,
    pub claim_amount: f64,
    pub is_representative: bool,
    pub actual_creditor: Option<String>,
    pub status: CreditorStatus,
}

impl From<&Creditor> for CreditorView {
    fn from(creditor: &Creditor) -> Self {
        Self {
            id: creditor.id,
            name: creditor.sender_name.clone(),
            email: creditor.sender_email.clone(),
            address: creditor.sender_address.clone(),
            reference_number: creditor.reference_number.clone(),
            claim_amount: creditor.claim_amount,
            is_representative: creditor.is_representative,
            actual_creditor: creditor.actual_creditor.clone(),
            status: creditor.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClientInfo {
    pub id: Uuid,
    pub name: String,
    pub aktenzeichen: String,
    pub email: Option<String>,
}

impl From<&Client> for ClientInfo {
    fn from(client: &Client) -> Self {
        Self {
            id: client.id,
            name: client.name.clone(),
            aktenzeichen: client.aktenzeichen.clone(),
            email: client.email.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClientWithCreditors {
    pub client: ClientInfo,
    pub creditors: Vec<CreditorView>,
}

pub async fn client_with_creditors(
    store: &dyn ClientStore,
    client_key: &str,
) -> AppResult<ClientWithCreditors> {
    let client = store
        .find(client_key)
        .await?
        .ok_or_else(AppError::not_found)?;

    let creditors = client
        .final_creditor_list
        .iter()
        .map(CreditorView::from)
        .collect();

    Ok(ClientWithCreditors {
        client: ClientInfo::from(&client),
        creditors,
    })
}
