use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use tracing::warn;

use crate::error::AppError;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

pub async fn webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    match state.billing.handle_webhook(signature, &body).await {
        Ok(_) => Ok(HttpResponse::Ok().json(json!({ "received": true }))),
        Err(e) => {
            warn!(error = %e, "Webhook rejected");
            Err(e.into())
        }
    }
}
