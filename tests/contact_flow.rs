mod common;

use std::sync::Arc;

use anyhow::Result;
use axum::http::StatusCode;
use common::{body_to_json, confirmable_client, sample_client, TestApp};
use kanzlei_backend::jobs::{JobQueue, JOB_CREDITOR_CONTACT};
use kanzlei_backend::models::{ClientStatus, ContactSendStatus};
use kanzlei_backend::workers::{contact::CreditorContactJob, JobExecution, JobHandler};
use serde_json::json;

#[tokio::test]
async fn resend_before_contact_start_is_rejected() -> Result<()> {
    let app = TestApp::new();
    let client = sample_client(ClientStatus::CreditorContactInitiated);
    app.insert_client(&client).await;

    let response = app
        .post_json(
            &format!("/api/clients/{}/resend-creditor-emails", client.id),
            &json!({}),
            Some(&app.admin_token()),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.ticketing.email_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn contact_start_requires_eligible_state() -> Result<()> {
    let app = TestApp::new();
    let client = sample_client(ClientStatus::CreditorReview);
    app.insert_client(&client).await;

    let response = app
        .post_json(
            &format!("/api/clients/{}/start-creditor-contact", client.id),
            &json!({}),
            Some(&app.admin_token()),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.ticketing.email_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn admin_contact_start_sends_one_email_per_creditor() -> Result<()> {
    let app = TestApp::new();
    let mut client = confirmable_client();
    client.client_confirmed_creditors = true;
    client.current_status = ClientStatus::CreditorContactInitiated;
    app.insert_client(&client).await;

    let response = app
        .post_json(
            &format!("/api/clients/{}/start-creditor-contact", client.id),
            &json!({}),
            Some(&app.admin_token()),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await?;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["emails_sent"], json!(2));
    assert_eq!(body["main_ticket_id"], json!("ticket-1"));

    let emails = app.ticketing.emails.lock().await;
    assert_eq!(emails.len(), 2);
    assert!(emails.iter().any(|e| e.recipient == "sl@spk.de"));
    assert!(emails[0].subject.contains(&client.aktenzeichen));
    drop(emails);

    let stored = app.stored_client(client.id).await;
    assert!(stored.creditor_contact_started);
    assert_eq!(stored.current_status, ClientStatus::CreditorContactActive);
    assert_eq!(stored.creditor_contacts.len(), 2);
    assert!(stored
        .creditor_contacts
        .iter()
        .all(|c| c.status == ContactSendStatus::Sent));

    // audit note went to the main ticket
    let notes = app.ticketing.notes.lock().await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].0, "ticket-1");
    Ok(())
}

#[tokio::test]
async fn contact_job_is_idempotent() -> Result<()> {
    let app = TestApp::new();
    let client = confirmable_client();
    app.insert_client(&client).await;

    // confirm through the API so the job lands in the queue
    let response = app
        .post_json(
            &format!("/api/clients/{}/confirm-creditors", client.id),
            &json!({}),
            Some(&app.client_token(&client)),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let job = app
        .queue
        .reserve(&[JOB_CREDITOR_CONTACT])
        .await?
        .expect("job queued");

    let handler = CreditorContactJob::new();
    let state = Arc::new(app.state.clone());

    let first = handler.handle(state.clone(), job.clone()).await;
    assert!(matches!(first, JobExecution::Success));
    assert_eq!(app.ticketing.email_count().await, 2);

    // redelivery of the same job must not send anything again
    let second = handler.handle(state, job).await;
    assert!(matches!(second, JobExecution::Success));
    assert_eq!(app.ticketing.email_count().await, 2);
    Ok(())
}

#[tokio::test]
async fn contact_job_fails_permanently_without_email_creditors() -> Result<()> {
    let app = TestApp::new();
    let mut client = sample_client(ClientStatus::AwaitingClientConfirmation);
    client.admin_approved = true;
    app.insert_client(&client).await;

    // an empty creditor list can still be confirmed
    let response = app
        .post_json(
            &format!("/api/clients/{}/confirm-creditors", client.id),
            &json!({}),
            Some(&app.client_token(&client)),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let job = app
        .queue
        .reserve(&[JOB_CREDITOR_CONTACT])
        .await?
        .expect("job queued");

    // nothing to send and nothing that a retry could fix
    let handler = CreditorContactJob::new();
    let result = handler.handle(Arc::new(app.state.clone()), job).await;
    assert!(matches!(result, JobExecution::Failed { .. }));
    assert_eq!(app.ticketing.email_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn contact_job_retries_when_ticketing_is_down() -> Result<()> {
    let app = TestApp::new();
    let mut client = confirmable_client();
    client.client_confirmed_creditors = true;
    client.current_status = ClientStatus::CreditorContactInitiated;
    app.insert_client(&client).await;
    app.ticketing.set_fail_tickets(true);

    let job = app
        .queue
        .enqueue(
            JOB_CREDITOR_CONTACT,
            json!({ "client_id": client.id }),
            None,
        )
        .await?;

    let handler = CreditorContactJob::new();
    let result = handler.handle(Arc::new(app.state.clone()), job).await;
    assert!(matches!(result, JobExecution::Retry { .. }));

    let stored = app.stored_client(client.id).await;
    assert!(!stored.creditor_contact_started);
    Ok(())
}

#[tokio::test]
async fn partial_send_failures_are_collected_not_fatal() -> Result<()> {
    let app = TestApp::new();
    let mut client = confirmable_client();
    client.client_confirmed_creditors = true;
    client.current_status = ClientStatus::CreditorContactInitiated;
    app.insert_client(&client).await;
    app.ticketing.set_fail_sends(true);

    let response = app
        .post_json(
            &format!("/api/clients/{}/start-creditor-contact", client.id),
            &json!({}),
            Some(&app.admin_token()),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await?;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["emails_sent"], json!(0));
    assert_eq!(body["emails_failed"], json!(2));
    assert_eq!(body["results"].as_array().unwrap().len(), 2);

    // the transition itself still committed
    let stored = app.stored_client(client.id).await;
    assert!(stored.creditor_contact_started);
    assert!(stored
        .creditor_contacts
        .iter()
        .all(|c| c.status == ContactSendStatus::Failed));
    Ok(())
}

#[tokio::test]
async fn resend_reports_per_creditor_results() -> Result<()> {
    let app = TestApp::new();
    let mut client = confirmable_client();
    client.client_confirmed_creditors = true;
    client.current_status = ClientStatus::CreditorContactInitiated;
    app.insert_client(&client).await;

    let start = app
        .post_json(
            &format!("/api/clients/{}/start-creditor-contact", client.id),
            &json!({}),
            Some(&app.admin_token()),
        )
        .await?;
    assert_eq!(start.status(), StatusCode::OK);

    let response = app
        .post_json(
            &format!("/api/clients/{}/resend-creditor-emails", client.id),
            &json!({}),
            Some(&app.admin_token()),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await?;
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["emails_sent"], json!(2));
    assert!(body["results"]
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["success"] == json!(true)));

    // 2 initial sends + 2 resends
    assert_eq!(app.ticketing.email_count().await, 4);
    Ok(())
}

#[tokio::test]
async fn contact_status_and_debt_summary_include_client_info() -> Result<()> {
    let app = TestApp::new();
    let mut client = confirmable_client();
    client.client_confirmed_creditors = true;
    client.current_status = ClientStatus::CreditorContactInitiated;
    app.insert_client(&client).await;

    app.post_json(
        &format!("/api/clients/{}/start-creditor-contact", client.id),
        &json!({}),
        Some(&app.admin_token()),
    )
    .await?;

    let response = app
        .get(
            &format!("/api/clients/{}/creditor-contact-status", client.id),
            Some(&app.admin_token()),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await?;
    assert_eq!(body["contact_started"], json!(true));
    assert_eq!(body["emails_sent"], json!(2));
    assert_eq!(body["client_info"]["aktenzeichen"], json!(client.aktenzeichen));

    let response = app
        .get(
            &format!("/api/clients/{}/final-debt-summary", client.id),
            Some(&app.client_token(&client)),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_json(response.into_body()).await?;
    assert_eq!(body["creditor_count"], json!(2));
    assert_eq!(body["total_debt"], json!(1589.5));
    assert_eq!(body["client_info"]["name"], json!("Max Mustermann"));
    Ok(())
}
