//! Payment provider webhook

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use tracing::{info, warn};

use super::error::ApiError;
use super::AppState;
use crate::billing::{parse_event, BillingEvent, WebhookError, WebhookHeaders};
use crate::error::MindMapError;

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub message: String,
}

pub fn create_webhook_router() -> Router<AppState> {
    Router::new().route("/api/webhook", post(receive))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let verifier = state
        .webhook
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("webhook secret not configured".to_string()))?;

    let signed = WebhookHeaders {
        id: header(&headers, "webhook-id"),
        timestamp: header(&headers, "webhook-timestamp"),
        signature: header(&headers, "webhook-signature"),
    };
    verifier.verify(&signed, &body)?;

    let event = parse_event(&body)?;
    let credits = event
        .credits()
        .ok_or_else(|| WebhookError::BadPayload("quantity is too large".to_string()))?;
    match event {
        BillingEvent::TopUp { email, quantity } => {
            match state
                .orchestrator
                .store()
                .add_map_credits(&email, credits)
                .await
            {
                Ok(account) => info!(
                    "Added {} map credits ({} units) to {}; limit is now {}",
                    credits, quantity, email, account.map_limit
                ),
                // Redelivery cannot fix an unknown customer
                Err(MindMapError::NotFound(_)) => {
                    warn!("Payment for unknown customer {}", email)
                }
                Err(e) => return Err(e.into()),
            }
        }
        BillingEvent::Other { event_type } => {
            info!("Ignoring webhook event {}", event_type);
        }
    }

    Ok(Json(WebhookResponse {
        message: "Webhook processed successfully".to_string(),
    }))
}
