use actix_web::{web, HttpRequest, HttpResponse};
use std::net::IpAddr;

use crate::error::AppError;
use crate::proxy::gateway::ChatRequest;
use crate::AppState;

/// First `X-Forwarded-For` hop if it is an IP address, else the peer IP
/// without its port.
pub fn client_address(req: &HttpRequest) -> String {
    req.headers()
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.split(',').next())
        .and_then(|hop| hop.trim().parse::<IpAddr>().ok())
        .or_else(|| req.peer_addr().map(|addr| addr.ip()))
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn chat(
    req: HttpRequest,
    body: web::Json<ChatRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let token = req
        .cookie(&state.config.auth.cookie_name)
        .map(|c| c.value().to_string());
    let address = client_address(&req);

    let outcome = state
        .gateway
        .handle(body.into_inner(), token.as_deref(), &address)
        .await?;

    let mut response = HttpResponse::Ok();
    outcome.rate_limit.apply_headers(&mut response);
    Ok(response.json(outcome.completion.body))
}
