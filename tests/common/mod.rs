use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use chrono::{NaiveDateTime, Utc};
use http_body_util::BodyExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

use kanzlei_backend::auth::jwt::{JwtService, ROLE_ADMIN, ROLE_CLIENT};
use kanzlei_backend::config::AppConfig;
use kanzlei_backend::creditors::{build_creditor, CreditorFields};
use kanzlei_backend::db::DEFAULT_MAX_POOL_SIZE;
use kanzlei_backend::jobs::{
    JobQueue, JobQueueError, JobQueueResult, STATUS_FAILED, STATUS_PROCESSING, STATUS_QUEUED,
    STATUS_SUCCEEDED,
};
use kanzlei_backend::models::{Client, ClientStatus, Creditor, CreditorOrigin, Job};
use kanzlei_backend::routes;
use kanzlei_backend::state::AppState;
use kanzlei_backend::store::ClientStore;
use kanzlei_backend::ticketing::Ticketing;

#[derive(Default)]
pub struct MemoryClientStore {
    clients: Mutex<Vec<Client>>,
}

#[async_trait]
impl ClientStore for MemoryClientStore {
    async fn insert(&self, client: &Client) -> Result<()> {
        let mut guard = self.clients.lock().await;
        if guard.iter().any(|c| c.aktenzeichen == client.aktenzeichen) {
            return Err(anyhow!("duplicate aktenzeichen {}", client.aktenzeichen));
        }
        guard.push(client.clone());
        Ok(())
    }

    async fn find(&self, key: &str) -> Result<Option<Client>> {
        let guard = self.clients.lock().await;
        let id = Uuid::parse_str(key).ok();
        Ok(guard
            .iter()
            .find(|c| Some(c.id) == id || c.aktenzeichen == key)
            .cloned())
    }

    async fn save(&self, client: &Client) -> Result<()> {
        let mut guard = self.clients.lock().await;
        let slot = guard
            .iter_mut()
            .find(|c| c.id == client.id)
            .ok_or_else(|| anyhow!("client {} vanished during save", client.id))?;
        *slot = client.clone();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Client>> {
        let guard = self.clients.lock().await;
        Ok(guard.clone())
    }
}

#[derive(Default)]
pub struct MemoryJobQueue {
    jobs: Mutex<Vec<Job>>,
    fail_enqueue: AtomicBool,
}

impl MemoryJobQueue {
    #[allow(dead_code)]
    pub fn set_fail_enqueue(&self, fail: bool) {
        self.fail_enqueue.store(fail, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub async fn jobs_of_type(&self, job_type: &str) -> Vec<Job> {
        let guard = self.jobs.lock().await;
        guard
            .iter()
            .filter(|job| job.job_type == job_type)
            .cloned()
            .collect()
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(
        &self,
        job_type: &str,
        payload: Value,
        run_after: Option<NaiveDateTime>,
    ) -> JobQueueResult<Job> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(JobQueueError::Pool("enqueue disabled".to_string()));
        }
        let job = Job {
            id: Uuid::new_v4(),
            job_type: job_type.to_string(),
            payload,
            status: STATUS_QUEUED.to_string(),
            attempts: 0,
            run_after: run_after.unwrap_or_else(now),
            last_error: None,
            created_at: now(),
            updated_at: now(),
        };
        let mut guard = self.jobs.lock().await;
        guard.push(job.clone());
        Ok(job)
    }

    async fn reserve(&self, job_types: &[&str]) -> JobQueueResult<Option<Job>> {
        let mut guard = self.jobs.lock().await;
        let reserve_time = now();
        let job = guard.iter_mut().find(|job| {
            job.status == STATUS_QUEUED
                && job.run_after <= reserve_time
                && job_types.contains(&job.job_type.as_str())
        });
        if let Some(job) = job {
            job.status = STATUS_PROCESSING.to_string();
            job.attempts += 1;
            job.updated_at = reserve_time;
            Ok(Some(job.clone()))
        } else {
            Ok(None)
        }
    }

    async fn mark_succeeded(&self, job_id: Uuid) -> JobQueueResult<()> {
        let mut guard = self.jobs.lock().await;
        if let Some(job) = guard.iter_mut().find(|job| job.id == job_id) {
            job.status = STATUS_SUCCEEDED.to_string();
            job.last_error = None;
            job.updated_at = now();
        }
        Ok(())
    }

    async fn retry_after(
        &self,
        job_id: Uuid,
        delay: Duration,
        error_message: &str,
    ) -> JobQueueResult<()> {
        let mut guard = self.jobs.lock().await;
        if let Some(job) = guard.iter_mut().find(|job| job.id == job_id) {
            job.status = STATUS_QUEUED.to_string();
            job.run_after = now() + chrono::Duration::from_std(delay).unwrap();
            job.last_error = Some(error_message.to_string());
            job.updated_at = now();
        }
        Ok(())
    }

    async fn mark_failed(&self, job_id: Uuid, error_message: &str) -> JobQueueResult<()> {
        let mut guard = self.jobs.lock().await;
        if let Some(job) = guard.iter_mut().find(|job| job.id == job_id) {
            job.status = STATUS_FAILED.to_string();
            job.last_error = Some(error_message.to_string());
            job.updated_at = now();
        }
        Ok(())
    }
}

#[allow(dead_code)]
#[derive(Clone, Debug)]
pub struct SentEmail {
    pub ticket_id: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct FakeTicketing {
    pub emails: Mutex<Vec<SentEmail>>,
    pub notes: Mutex<Vec<(String, String)>>,
    tickets_created: AtomicUsize,
    fail_sends: AtomicBool,
    fail_tickets: AtomicBool,
}

impl FakeTicketing {
    #[allow(dead_code)]
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn set_fail_tickets(&self, fail: bool) {
        self.fail_tickets.store(fail, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub async fn email_count(&self) -> usize {
        self.emails.lock().await.len()
    }
}

#[async_trait]
impl Ticketing for FakeTicketing {
    async fn create_ticket(&self, _subject: &str, _body: &str) -> Result<String> {
        if self.fail_tickets.load(Ordering::SeqCst) {
            return Err(anyhow!("zendesk unavailable"));
        }
        let n = self.tickets_created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("ticket-{n}"))
    }

    async fn send_side_conversation(
        &self,
        ticket_id: &str,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<String> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(anyhow!("side conversation rejected"));
        }
        let mut guard = self.emails.lock().await;
        guard.push(SentEmail {
            ticket_id: ticket_id.to_string(),
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(format!("sc-{}", guard.len()))
    }

    async fn add_internal_note(&self, ticket_id: &str, body: &str) -> Result<()> {
        let mut guard = self.notes.lock().await;
        guard.push((ticket_id.to_string(), body.to_string()));
        Ok(())
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        database_max_pool_size: DEFAULT_MAX_POOL_SIZE,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        jwt_secret: "test-secret".to_string(),
        jwt_issuer: "test-issuer".to_string(),
        jwt_audience: "test-audience".to_string(),
        jwt_expiry_minutes: 60,
        portal_base_url: "http://localhost:5173".to_string(),
        portal_token_expiry_days: 30,
        confirmation_deadline_days: 14,
        email_send_delay_ms: 0,
        cors_allowed_origin: None,
        zendesk_subdomain: None,
        zendesk_email: None,
        zendesk_api_token: None,
        zendesk_request_timeout_secs: 30,
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    pub store: Arc<MemoryClientStore>,
    pub queue: Arc<MemoryJobQueue>,
    pub ticketing: Arc<FakeTicketing>,
}

impl TestApp {
    pub fn new() -> Self {
        let config = test_config();
        let store = Arc::new(MemoryClientStore::default());
        let queue = Arc::new(MemoryJobQueue::default());
        let ticketing = Arc::new(FakeTicketing::default());
        let jwt = JwtService::from_config(&config).expect("jwt service");

        let state = AppState::new(
            config,
            store.clone(),
            queue.clone(),
            Some(ticketing.clone()),
            jwt,
        );
        let router = routes::create_router(state.clone());

        Self {
            state,
            router,
            store,
            queue,
            ticketing,
        }
    }

    pub async fn insert_client(&self, client: &Client) {
        self.store
            .insert(client)
            .await
            .expect("failed to seed client");
    }

    #[allow(dead_code)]
    pub async fn stored_client(&self, id: Uuid) -> Client {
        self.store
            .find(&id.to_string())
            .await
            .expect("lookup failed")
            .expect("client missing")
    }

    pub fn admin_token(&self) -> String {
        self.state
            .jwt
            .generate_token(Uuid::new_v4(), "admin@kanzlei", ROLE_ADMIN)
            .expect("admin token")
    }

    #[allow(dead_code)]
    pub fn client_token(&self, client: &Client) -> String {
        self.state
            .jwt
            .generate_token(client.id, &client.name, ROLE_CLIENT)
            .expect("client token")
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::PATCH)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    Ok(body.collect().await?.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn body_to_json(body: Body) -> Result<Value> {
    let bytes = body_to_vec(body).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn sample_client(status: ClientStatus) -> Client {
    let suffix = Uuid::new_v4().simple().to_string();
    let mut client = Client::new(
        format!("AZ-{}", &suffix[..8]),
        "Max Mustermann".to_string(),
        Some("max@example.com".to_string()),
    );
    client.current_status = status;
    client
}

#[allow(dead_code)]
pub fn sample_creditor(name: &str, email: Option<&str>, amount: f64) -> Creditor {
    build_creditor(
        CreditorFields {
            sender_name: name.to_string(),
            sender_email: email.map(str::to_string),
            sender_address: None,
            reference_number: Some("REF-1".to_string()),
            claim_amount: amount,
            is_representative: false,
            actual_creditor: None,
            correction_notes: None,
            source_document_id: None,
        },
        CreditorOrigin::AdminManualEntry,
        "admin@kanzlei",
    )
}

#[allow(dead_code)]
pub fn confirmable_client() -> Client {
    let mut client = sample_client(ClientStatus::AwaitingClientConfirmation);
    client.admin_approved = true;
    client
        .final_creditor_list
        .push(sample_creditor("Sparkasse Leipzig", Some("sl@spk.de"), 1500.0));
    client
        .final_creditor_list
        .push(sample_creditor("Telekom", Some("inkasso@telekom.de"), 89.5));
    client
}
