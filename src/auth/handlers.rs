use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::token::session_cookie;
use crate::db::Tier;
use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub email: String,
    pub subscription_tier: Tier,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserSummary,
}

pub async fn register(
    req: web::Json<CredentialsRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received registration request");

    match state.auth_service.register(&req.email, &req.password).await {
        Ok(user) => {
            info!(user_id = %user.id, "Registration successful");
            Ok(HttpResponse::Created().json(RegisterResponse {
                message: "User created successfully".to_string(),
            }))
        }
        Err(e) => {
            warn!(error = %e, "Registration failed");
            Err(e)
        }
    }
}

pub async fn login(
    req: web::Json<CredentialsRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let outcome = match state.auth_service.login(&req.email, &req.password).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, "Login failed");
            return Err(e);
        }
    };
    info!(user_id = %outcome.user.id, "Login successful");

    let auth = &state.config.auth;
    let cookie = session_cookie(
        &auth.cookie_name,
        &outcome.token,
        state.auth_service.session_ttl().num_seconds(),
        auth.secure_cookie,
    );

    Ok(HttpResponse::Ok().cookie(cookie).json(LoginResponse {
        token: outcome.token,
        user: UserSummary {
            email: outcome.user.email,
            subscription_tier: outcome.user.subscription_tier,
        },
    }))
}
