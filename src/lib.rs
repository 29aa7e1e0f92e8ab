pub mod auth;
pub mod billing;
pub mod config;
pub mod db;
pub mod error;
pub mod proxy;
pub mod usage;

use actix_cors::Cors;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use auth::AuthService;
pub use billing::BillingService;
pub use db::{Store, User};
pub use proxy::{ChatGateway, CompletionProvider, TogetherProvider};

use config::CorsConfig;

/// Health check endpoint handler
/// Returns a JSON response with server status and timestamp
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

/// Application state shared across all components
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub store: Arc<dyn Store>,
    pub auth_service: Arc<AuthService>,
    pub gateway: Arc<ChatGateway>,
    pub billing: Arc<BillingService>,
}

impl AppState {
    pub async fn new(config: Settings) -> Result<Self> {
        let store = db::connect(&config.database).await?;
        let provider = Arc::new(TogetherProvider::new(&config.llm)?);
        Ok(Self::with_backends(config, store, provider))
    }

    /// Wires the services around an already opened store and provider.
    pub fn with_backends(
        config: Settings,
        store: Arc<dyn Store>,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        let auth_service = Arc::new(AuthService::new(store.clone(), &config.auth));
        let gateway = Arc::new(ChatGateway::new(
            &config,
            auth_service.clone(),
            store.clone(),
            provider,
        ));
        let billing = Arc::new(BillingService::new(store.clone(), config.billing.clone()));

        Self {
            config: Arc::new(config),
            store,
            auth_service,
            gateway,
            billing,
        }
    }

    /// Deletes expired sessions and rate-limit hits outside every window.
    pub async fn run_maintenance(&self) -> Result<()> {
        let now = Utc::now();
        let sessions = self.store.cleanup_expired_sessions(now).await?;
        let hits = self.gateway.rate_limiter().purge_stale(now).await?;
        info!(sessions, hits, "Maintenance pass complete");
        Ok(())
    }
}

/// Registers every route. Shared by the binary and the integration tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    let json = web::JsonConfig::default()
        .error_handler(|err, _req| AppError::ValidationError(err.to_string()).into());

    cfg.app_data(json)
        .route("/health", web::get().to(health_check))
        .route("/auth/register", web::post().to(auth::handlers::register))
        .route("/auth/login", web::post().to(auth::handlers::login))
        .route("/chat", web::post().to(proxy::handlers::chat))
        .route(
            "/subscription/webhook",
            web::post().to(billing::handlers::webhook),
        );
}

pub fn cors(config: &CorsConfig) -> Cors {
    if !config.enabled {
        return Cors::default();
    }

    let cors = if config.allow_any_origin {
        Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .expose_any_header()
            .supports_credentials()
    } else {
        config
            .allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec!["Authorization", "Content-Type", "Stripe-Signature"])
            .expose_headers(vec![
                "X-RateLimit-Limit",
                "X-RateLimit-Remaining",
                "X-RateLimit-Reset",
            ])
            .supports_credentials()
    };

    cors.max_age(config.max_age as usize)
}
