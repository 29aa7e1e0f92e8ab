#![allow(dead_code, unused_macros)]

use chatgate_server::{AppState, Settings};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PASSWORD: &str = "correct horse battery staple";

/// State on the in-memory store, talking to `server` as the completion API.
pub async fn test_state(server: &MockServer) -> AppState {
    let mut config = Settings::new_for_test().expect("Failed to load test config");
    config.llm.api_base = server.uri();
    AppState::new(config).await.expect("Failed to build app state")
}

pub fn completion_body(content: &str) -> Value {
    json!({
        "id": "cmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
    })
}

/// Answers every completion call with `content`, expecting exactly `calls` of them.
pub async fn mount_completion(server: &MockServer, content: &str, calls: u64) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(content)))
        .expect(calls)
        .mount(server)
        .await;
}

pub fn chat_body(text: &str) -> Value {
    json!({ "messages": [{"role": "user", "content": text}] })
}

/// Builds the app the way `main` does, minus CORS.
macro_rules! init_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($state.clone()))
                .configure(chatgate_server::configure),
        )
        .await
    };
}

/// Registers `$email` and logs in, yielding the session token.
macro_rules! register_and_login {
    ($app:expr, $email:expr) => {{
        let resp = actix_web::test::TestRequest::post()
            .uri("/auth/register")
            .set_json(serde_json::json!({"email": $email, "password": common::PASSWORD}))
            .send_request(&$app)
            .await;
        assert_eq!(resp.status(), 201);

        let resp = actix_web::test::TestRequest::post()
            .uri("/auth/login")
            .set_json(serde_json::json!({"email": $email, "password": common::PASSWORD}))
            .send_request(&$app)
            .await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = actix_web::test::read_body_json(resp).await;
        body["token"].as_str().expect("login returns a token").to_string()
    }};
}
