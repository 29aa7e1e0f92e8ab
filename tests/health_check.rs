#[macro_use]
mod common;

use actix_web::test;
use chrono::DateTime;
use wiremock::MockServer;

#[actix_web::test]
async fn test_health_check() {
    let server = MockServer::start().await;
    let state = common::test_state(&server).await;
    let app = init_app!(state);

    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["status"], "healthy");
    assert!(DateTime::parse_from_rfc3339(json["timestamp"].as_str().unwrap()).is_ok());
}

#[actix_web::test]
async fn test_unknown_route_is_not_found() {
    let server = MockServer::start().await;
    let state = common::test_state(&server).await;
    let app = init_app!(state);

    let resp = test::TestRequest::get().uri("/nope").send_request(&app).await;
    assert_eq!(resp.status(), 404);
}
