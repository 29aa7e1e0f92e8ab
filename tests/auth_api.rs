#[macro_use]
mod common;

use actix_web::test;
use chatgate_server::db::{Tier, UserStore};
use serde_json::{json, Value};
use wiremock::MockServer;

#[actix_web::test]
async fn test_register_and_login() {
    let server = MockServer::start().await;
    let state = common::test_state(&server).await;
    let app = init_app!(state);

    let resp = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({"email": "Fresh@Example.com", "password": common::PASSWORD}))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 201);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "User created successfully");

    let resp = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({"email": "fresh@example.com", "password": common::PASSWORD}))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 200);

    let cookie = resp
        .response()
        .cookies()
        .find(|c| c.name() == "session")
        .expect("login sets the session cookie");
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.path(), Some("/"));
    assert_eq!(cookie.max_age().map(|age| age.whole_seconds()), Some(24 * 60 * 60));
    let cookie_value = cookie.value().to_string();

    let body: Value = test::read_body_json(resp).await;
    let token = body["token"].as_str().unwrap();
    assert_eq!(token, cookie_value);
    assert_eq!(body["user"]["email"], "fresh@example.com");
    assert_eq!(body["user"]["subscriptionTier"], "free");

    let user = state
        .auth_service
        .resolve(Some(token))
        .await
        .expect("token resolves to its user");
    assert_eq!(user.email, "fresh@example.com");
    assert_eq!(user.subscription_tier, Tier::Free);
}

#[actix_web::test]
async fn test_duplicate_registration_conflicts() {
    let server = MockServer::start().await;
    let state = common::test_state(&server).await;
    let app = init_app!(state);

    let first = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({"email": "dup@example.com", "password": common::PASSWORD}))
        .send_request(&app)
        .await;
    assert_eq!(first.status(), 201);
    let original = state
        .store
        .get_user_by_email("dup@example.com")
        .await
        .unwrap()
        .unwrap();

    let second = test::TestRequest::post()
        .uri("/auth/register")
        .set_json(json!({"email": "DUP@example.com", "password": "another password"}))
        .send_request(&app)
        .await;
    assert_eq!(second.status(), 409);
    let body: Value = test::read_body_json(second).await;
    assert!(body["error"].is_string());

    let stored = state
        .store
        .get_user_by_email("dup@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.id, original.id);
    assert_eq!(stored.password_hash, original.password_hash);

    let resp = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({"email": "dup@example.com", "password": common::PASSWORD}))
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 200);
}

#[actix_web::test]
async fn test_invalid_login_does_not_reveal_which_part_failed() {
    let server = MockServer::start().await;
    let state = common::test_state(&server).await;
    let app = init_app!(state);
    register_and_login!(app, "known@example.com");

    let unknown = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({"email": "nonexistent@example.com", "password": common::PASSWORD}))
        .send_request(&app)
        .await;
    assert_eq!(unknown.status(), 401);
    let unknown: Value = test::read_body_json(unknown).await;

    let wrong = test::TestRequest::post()
        .uri("/auth/login")
        .set_json(json!({"email": "known@example.com", "password": "wrongpassword"}))
        .send_request(&app)
        .await;
    assert_eq!(wrong.status(), 401);
    let wrong: Value = test::read_body_json(wrong).await;

    assert_eq!(unknown, wrong);
}

#[actix_web::test]
async fn test_invalid_registration() {
    let server = MockServer::start().await;
    let state = common::test_state(&server).await;
    let app = init_app!(state);

    for body in [
        json!({"email": "test@example.com", "password": ""}),
        json!({"email": "", "password": common::PASSWORD}),
        json!({"email": "not-an-email", "password": common::PASSWORD}),
        json!({"password": common::PASSWORD}),
    ] {
        let resp = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(body)
            .send_request(&app)
            .await;
        assert_eq!(resp.status(), 400);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].is_string());
    }
}

#[actix_web::test]
async fn test_malformed_json_is_a_bad_request() {
    let server = MockServer::start().await;
    let state = common::test_state(&server).await;
    let app = init_app!(state);

    let resp = test::TestRequest::post()
        .uri("/auth/login")
        .insert_header(("Content-Type", "application/json"))
        .set_payload("{not json")
        .send_request(&app)
        .await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].is_string());
}
