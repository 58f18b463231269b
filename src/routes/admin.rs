use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{Datelike, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::creditors::{self, CreditorDraft};
use crate::error::{AppError, AppResult};
use crate::models::{Client, ClientDocument, ClientStatus, CreditorOrigin};
use crate::state::AppState;

async fn load_client(state: &AppState, key: &str) -> AppResult<Client> {
    state
        .store
        .find(key)
        .await?
        .ok_or_else(AppError::not_found)
}

#[derive(Deserialize)]
pub struct CreateClientRequest {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub aktenzeichen: Option<String>,
}

#[derive(Serialize)]
pub struct ClientSummary {
    pub id: Uuid,
    pub aktenzeichen: String,
    pub name: String,
    pub workflow_status: ClientStatus,
    pub admin_approved: bool,
    pub client_confirmed_creditors: bool,
    pub creditor_count: usize,
}

impl From<&Client> for ClientSummary {
    fn from(client: &Client) -> Self {
        Self {
            id: client.id,
            aktenzeichen: client.aktenzeichen.clone(),
            name: client.name.clone(),
            workflow_status: client.current_status,
            admin_approved: client.admin_approved,
            client_confirmed_creditors: client.client_confirmed_creditors,
            creditor_count: client.final_creditor_list.len(),
        }
    }
}

fn generate_aktenzeichen() -> String {
    let serial: u32 = rand::thread_rng().gen_range(10000..100000);
    format!("AZ-{}-{serial}", Utc::now().year())
}

pub async fn create_client(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateClientRequest>,
) -> AppResult<(StatusCode, Json<ClientSummary>)> {
    user.require_admin()?;

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::validation("client name must not be empty"));
    }
    let aktenzeichen = payload
        .aktenzeichen
        .map(|az| az.trim().to_string())
        .filter(|az| !az.is_empty())
        .unwrap_or_else(generate_aktenzeichen);

    let email = payload
        .email
        .map(|mail| mail.trim().to_lowercase())
        .filter(|mail| !mail.is_empty());

    let mut client = Client::new(aktenzeichen, name, email);
    client.record_history("client_created", &user.name, json!({}));
    state.store.insert(&client).await?;

    Ok((StatusCode::CREATED, Json(ClientSummary::from(&client))))
}

pub async fn list_clients(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ClientSummary>>> {
    user.require_admin()?;
    let clients = state.store.list().await?;
    Ok(Json(clients.iter().map(ClientSummary::from).collect()))
}

pub async fn get_client(
    State(state): State<AppState>,
    Path(client_key): Path<String>,
    user: AuthenticatedUser,
) -> AppResult<Json<Client>> {
    user.require_admin()?;
    let client = load_client(&state, &client_key).await?;
    Ok(Json(client))
}

pub async fn add_creditor(
    State(state): State<AppState>,
    Path(client_key): Path<String>,
    user: AuthenticatedUser,
    Json(draft): Json<CreditorDraft>,
) -> AppResult<Json<creditors::CreditorAdded>> {
    user.require_admin()?;

    let added = creditors::add_creditor_to_client(
        state.store.as_ref(),
        &client_key,
        draft,
        CreditorOrigin::AdminManualEntry,
        &user.name,
        &user.name,
    )
    .await?;
    Ok(Json(added))
}

#[derive(Serialize)]
pub struct ApprovalResponse {
    pub success: bool,
    pub status: ClientStatus,
    pub confirmation_deadline: Option<chrono::NaiveDateTime>,
}

/// Releases the creditor list to the client and opens the confirmation window.
pub async fn approve_creditors(
    State(state): State<AppState>,
    Path(client_key): Path<String>,
    user: AuthenticatedUser,
) -> AppResult<Json<ApprovalResponse>> {
    user.require_admin()?;
    let mut client = load_client(&state, &client_key).await?;

    if client.client_confirmed_creditors {
        return Err(AppError::bad_request(
            "client has already confirmed the creditor list",
        ));
    }

    let deadline =
        Utc::now().naive_utc() + Duration::days(state.config.confirmation_deadline_days);
    client.admin_approved = true;
    client.current_status = ClientStatus::AwaitingClientConfirmation;
    client.confirmation_deadline = Some(deadline);
    client.record_history(
        "creditor_list_approved",
        &user.name,
        json!({ "creditor_count": client.final_creditor_list.len() }),
    );
    client.touch();
    state.store.save(&client).await?;

    Ok(Json(ApprovalResponse {
        success: true,
        status: client.current_status,
        confirmation_deadline: client.confirmation_deadline,
    }))
}

#[derive(Serialize)]
pub struct PortalLinkResponse {
    pub portal_url: String,
    pub expires_in_days: i64,
}

pub async fn create_portal_link(
    State(state): State<AppState>,
    Path(client_key): Path<String>,
    user: AuthenticatedUser,
) -> AppResult<Json<PortalLinkResponse>> {
    user.require_admin()?;
    let mut client = load_client(&state, &client_key).await?;

    let token = state.jwt.generate_portal_token(client.id, &client.name)?;
    let portal_url = format!(
        "{}/portal?token={token}",
        state.config.portal_base_url.trim_end_matches('/')
    );

    if client.current_status == ClientStatus::Created {
        client.current_status = ClientStatus::PortalAccessSent;
        client.record_history("portal_access_sent", &user.name, json!({}));
        client.touch();
        state.store.save(&client).await?;
    }

    Ok(Json(PortalLinkResponse {
        portal_url,
        expires_in_days: state.config.portal_token_expiry_days,
    }))
}

#[derive(Deserialize)]
pub struct RegisterDocumentRequest {
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub is_creditor_document: Option<bool>,
}

pub async fn register_document(
    State(state): State<AppState>,
    Path(client_key): Path<String>,
    user: AuthenticatedUser,
    Json(payload): Json<RegisterDocumentRequest>,
) -> AppResult<(StatusCode, Json<ClientDocument>)> {
    user.require_admin()?;

    if payload.filename.trim().is_empty() {
        return Err(AppError::validation("filename must not be empty"));
    }

    let mut client = load_client(&state, &client_key).await?;
    let document = ClientDocument {
        id: Uuid::new_v4(),
        filename: payload.filename.trim().to_string(),
        content_type: payload.content_type,
        is_creditor_document: payload.is_creditor_document,
        uploaded_at: Utc::now().naive_utc(),
    };
    client.documents.push(document.clone());
    client.record_history(
        "document_registered",
        &user.name,
        json!({ "document_id": document.id, "filename": document.filename }),
    );
    client.touch();
    state.store.save(&client).await?;

    Ok((StatusCode::CREATED, Json(document)))
}

#[derive(Deserialize)]
pub struct UpdateDocumentRequest {
    /// Outer `None` means the field was absent; `Some(None)` is an explicit
    /// null that clears an earlier ruling.
    #[serde(default, deserialize_with = "explicit_flag")]
    pub is_creditor_document: Option<Option<bool>>,
}

fn explicit_flag<'de, D>(deserializer: D) -> Result<Option<Option<bool>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<bool>::deserialize(deserializer).map(Some)
}

pub async fn update_document(
    State(state): State<AppState>,
    Path((client_key, document_id)): Path<(String, Uuid)>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateDocumentRequest>,
) -> AppResult<Json<ClientDocument>> {
    user.require_admin()?;
    let flag = payload
        .is_creditor_document
        .ok_or_else(|| AppError::validation("is_creditor_document must be provided"))?;
    let mut client = load_client(&state, &client_key).await?;

    let document = client
        .documents
        .iter_mut()
        .find(|doc| doc.id == document_id)
        .ok_or_else(AppError::not_found)?;
    document.is_creditor_document = flag;
    let updated = document.clone();

    client.record_history(
        "document_flag_updated",
        &user.name,
        json!({
            "document_id": document_id,
            "is_creditor_document": flag,
        }),
    );
    client.touch();
    state.store.save(&client).await?;

    Ok(Json(updated))
}
