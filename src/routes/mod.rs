use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{catalog, health_check, invoices, payments};
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/events", post(catalog::create_event))
        .route("/people", post(catalog::create_person))
        .route(
            "/events/:event_id/ticket-types",
            get(catalog::list_ticket_types).post(catalog::create_ticket_type),
        )
        .route(
            "/events/:event_id/ticket-types/:ticket_type_id",
            put(catalog::update_ticket_type),
        )
        .route("/invoices", post(invoices::create_invoice))
        .route("/invoices/:invoice_id", get(invoices::get_invoice))
        .route(
            "/installments/:installment_id/payments",
            post(payments::pay_installment),
        )
        .route(
            "/installments/:installment_id/checkout",
            post(payments::start_checkout),
        )
        .route("/webhooks/gateway", post(payments::gateway_confirmation))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
