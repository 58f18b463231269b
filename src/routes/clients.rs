use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};

use crate::auth::AuthenticatedUser;
use crate::contact;
use crate::creditors::{self, ClientInfo, CreditorDraft, CreditorView};
use crate::error::{AppError, AppResult};
use crate::jobs::JOB_CREDITOR_CONTACT;
use crate::models::{Client, ClientStatus, CreditorOrigin};
use crate::state::AppState;

async fn load_client(state: &AppState, key: &str) -> AppResult<Client> {
    state
        .store
        .find(key)
        .await?
        .ok_or_else(AppError::not_found)
}

#[derive(Serialize)]
pub struct ConfirmationView {
    pub workflow_status: ClientStatus,
    pub creditors: Vec<CreditorView>,
    pub client_confirmed: bool,
    pub confirmation_deadline: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Pure projection of the confirmation state. The list stays hidden until the
/// admin released it (or the auto-approval conditions hold), and creditors
/// whose source document was ruled out are never shown.
pub async fn get_creditor_confirmation(
    State(state): State<AppState>,
    Path(client_key): Path<String>,
    user: AuthenticatedUser,
) -> AppResult<Json<ConfirmationView>> {
    let client = load_client(&state, &client_key).await?;
    user.require_client_access(client.id)?;

    let empty = |message: &str| ConfirmationView {
        workflow_status: client.current_status,
        creditors: Vec::new(),
        client_confirmed: client.client_confirmed_creditors,
        confirmation_deadline: None,
        message: Some(message.to_string()),
    };

    if matches!(
        client.current_status,
        ClientStatus::Created | ClientStatus::PortalAccessSent
    ) {
        return Ok(Json(empty(
            "Ihre Glaeubigerliste wird noch vorbereitet. Bitte schauen Sie spaeter wieder vorbei.",
        )));
    }

    if !client.creditor_list_released() {
        return Ok(Json(empty(
            "Ihre Glaeubigerliste wird derzeit geprueft und ist noch nicht freigegeben.",
        )));
    }

    let creditors = client
        .visible_creditors()
        .into_iter()
        .map(CreditorView::from)
        .collect();

    Ok(Json(ConfirmationView {
        workflow_status: client.current_status,
        creditors,
        client_confirmed: client.client_confirmed_creditors,
        confirmation_deadline: client.confirmation_deadline,
        message: None,
    }))
}

#[derive(Serialize)]
pub struct ConfirmResponse {
    pub success: bool,
    pub message: String,
    pub status: ClientStatus,
    /// Always null: contact runs asynchronously through the outbox worker.
    pub creditor_contact: Option<contact::ContactOutcome>,
}

/// The client signs off on the creditor list. The state transition commits in
/// one save; the creditor-contact job is enqueued afterwards and any enqueue
/// failure is logged only, since the confirmation itself already succeeded.
pub async fn confirm_creditors(
    State(state): State<AppState>,
    Path(client_key): Path<String>,
    user: AuthenticatedUser,
) -> AppResult<Json<ConfirmResponse>> {
    let mut client = load_client(&state, &client_key).await?;
    user.require_client_access(client.id)?;

    if !client.admin_approved {
        return Err(AppError::bad_request(
            "creditor list has not been released by the administration yet",
        ));
    }
    if client.current_status != ClientStatus::AwaitingClientConfirmation {
        return Err(AppError::bad_request(format!(
            "creditors cannot be confirmed while the case is in status '{}'",
            client.current_status.as_str()
        )));
    }

    let creditors_count = client.final_creditor_list.len();
    client.client_confirmed_creditors = true;
    client.client_confirmed_at = Some(Utc::now().naive_utc());
    client.current_status = ClientStatus::CreditorContactInitiated;
    client.record_history(
        "client_creditors_confirmed",
        &user.name,
        json!({ "creditors_count": creditors_count }),
    );
    client.touch();
    state.store.save(&client).await?;

    match state
        .queue
        .enqueue(JOB_CREDITOR_CONTACT, json!({ "client_id": client.id }), None)
        .await
    {
        Ok(job) => {
            info!(client_id = %client.id, job_id = %job.id, "creditor contact queued");
        }
        Err(err) => {
            error!(
                client_id = %client.id,
                error = %err,
                "failed to queue creditor contact; confirmation is committed, \
                 contact can be started manually"
            );
        }
    }

    Ok(Json(ConfirmResponse {
        success: true,
        message: "creditor list confirmed; creditor contact has been scheduled".to_string(),
        status: client.current_status,
        creditor_contact: None,
    }))
}

/// Manual/retry entry point for the contact pipeline. Permissive on purpose:
/// it must stay usable when the queued job was lost or already ran partially.
pub async fn start_creditor_contact(
    State(state): State<AppState>,
    Path(client_key): Path<String>,
    user: AuthenticatedUser,
) -> AppResult<Json<contact::ContactOutcome>> {
    user.require_admin()?;
    let mut client = load_client(&state, &client_key).await?;

    let allowed = client.current_status == ClientStatus::Completed
        || client.client_confirmed_creditors
        || matches!(
            client.current_status,
            ClientStatus::CreditorContactInitiated | ClientStatus::CreditorContactActive
        );
    if !allowed {
        return Err(AppError::bad_request(format!(
            "creditor contact cannot be started in status '{}'",
            client.current_status.as_str()
        )));
    }

    let outcome = contact::start_creditor_contact(&state, &mut client, &user.name).await?;
    Ok(Json(outcome))
}

pub async fn resend_creditor_emails(
    State(state): State<AppState>,
    Path(client_key): Path<String>,
    user: AuthenticatedUser,
) -> AppResult<Json<contact::ResendOutcome>> {
    user.require_admin()?;
    let mut client = load_client(&state, &client_key).await?;
    let outcome = contact::resend_creditor_emails(&state, &mut client, &user.name).await?;
    Ok(Json(outcome))
}

#[derive(Serialize)]
pub struct ContactStatusResponse {
    #[serde(flatten)]
    pub status: contact::ContactStatusView,
    pub client_info: ClientInfo,
}

pub async fn creditor_contact_status(
    State(state): State<AppState>,
    Path(client_key): Path<String>,
    user: AuthenticatedUser,
) -> AppResult<Json<ContactStatusResponse>> {
    user.require_admin()?;
    let client = load_client(&state, &client_key).await?;

    Ok(Json(ContactStatusResponse {
        status: contact::contact_status(&client),
        client_info: ClientInfo::from(&client),
    }))
}

#[derive(Serialize)]
pub struct DebtSummaryResponse {
    #[serde(flatten)]
    pub summary: contact::DebtSummary,
    pub client_info: ClientInfo,
}

pub async fn final_debt_summary(
    State(state): State<AppState>,
    Path(client_key): Path<String>,
    user: AuthenticatedUser,
) -> AppResult<Json<DebtSummaryResponse>> {
    let client = load_client(&state, &client_key).await?;
    user.require_client_access(client.id)?;

    Ok(Json(DebtSummaryResponse {
        summary: contact::final_debt_summary(&client),
        client_info: ClientInfo::from(&client),
    }))
}

pub async fn add_creditor(
    State(state): State<AppState>,
    Path(client_key): Path<String>,
    user: AuthenticatedUser,
    Json(draft): Json<CreditorDraft>,
) -> AppResult<Json<creditors::CreditorAdded>> {
    let client = load_client(&state, &client_key).await?;
    user.require_client_access(client.id)?;

    let added = creditors::add_creditor_to_client(
        state.store.as_ref(),
        &client_key,
        draft,
        CreditorOrigin::ClientManualEntry,
        &user.name,
        &user.name,
    )
    .await?;
    Ok(Json(added))
}

pub async fn list_creditors(
    State(state): State<AppState>,
    Path(client_key): Path<String>,
    user: AuthenticatedUser,
) -> AppResult<Json<creditors::ClientWithCreditors>> {
    let client = load_client(&state, &client_key).await?;
    user.require_client_access(client.id)?;

    let listing = creditors::client_with_creditors(state.store.as_ref(), &client_key).await?;
    Ok(Json(listing))
}
