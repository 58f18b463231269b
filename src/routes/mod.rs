use axum::http::HeaderValue;
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod admin;
pub mod clients;
pub mod health;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        let allow_origin = AllowOrigin::list(headers);

        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let clients_routes = Router::new()
        .route(
            "/:client_id/creditor-confirmation",
            get(clients::get_creditor_confirmation),
        )
        .route(
            "/:client_id/confirm-creditors",
            post(clients::confirm_creditors),
        )
        .route(
            "/:client_id/start-creditor-contact",
            post(clients::start_creditor_contact),
        )
        .route(
            "/:client_id/resend-creditor-emails",
            post(clients::resend_creditor_emails),
        )
        .route(
            "/:client_id/creditor-contact-status",
            get(clients::creditor_contact_status),
        )
        .route(
            "/:client_id/final-debt-summary",
            get(clients::final_debt_summary),
        )
        .route(
            "/:client_id/creditors",
            get(clients::list_creditors).post(clients::add_creditor),
        );

    let admin_routes = Router::new()
        .route(
            "/clients",
            get(admin::list_clients).post(admin::create_client),
        )
        .route("/clients/:client_id", get(admin::get_client))
        .route("/clients/:client_id/add-creditor", post(admin::add_creditor))
        .route(
            "/clients/:client_id/approve-creditors",
            post(admin::approve_creditors),
        )
        .route(
            "/clients/:client_id/portal-link",
            post(admin::create_portal_link),
        )
        .route(
            "/clients/:client_id/documents",
            post(admin::register_document),
        )
        .route(
            "/clients/:client_id/documents/:document_id",
            patch(admin::update_document),
        );

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/clients", clients_routes)
        .nest("/api/admin", admin_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
}
