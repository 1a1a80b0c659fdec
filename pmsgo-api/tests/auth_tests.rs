/// Signup, signin and the bearer token gate, driven through the full router

mod common;

use axum::http::StatusCode;
use common::{unique_email, TestContext, JWT_SECRET};
use pmsgo_shared::auth::jwt::{create_token, validate_token, Claims, TOKEN_TTL_SECS};
use pmsgo_shared::models::{AccountProfile, AccountType};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_signup_returns_profile_without_secrets() {
    let ctx = TestContext::new();
    let email = unique_email();

    let profile = ctx.signup("Acme", &email).await;

    assert_eq!(profile["name"], "Acme");
    assert_eq!(profile["email"], email);
    assert_eq!(profile["type"], "company");
    assert!(profile["id"].is_string());
    assert!(profile.get("password").is_none());
    assert!(profile.get("password_hash").is_none());
}

#[tokio::test]
async fn test_duplicate_email_reported_before_schema() {
    let ctx = TestContext::new();
    let email = unique_email();
    ctx.signup("Acme", &email).await;

    // Also schema-invalid: no name, short password
    let (status, body) = ctx
        .json(
            "POST",
            "/api/v1/auth/signup",
            None,
            Some(json!({ "email": email.to_uppercase(), "password": "x" })),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "Email must be unique");
    assert!(body.get("details").is_none());
}

#[tokio::test]
async fn test_short_password_cites_password() {
    let ctx = TestContext::new();

    let (status, body) = ctx
        .json(
            "POST",
            "/api/v1/auth/signup",
            None,
            Some(json!({
                "name": "Acme",
                "email": unique_email(),
                "workspace_name": "Acme HQ",
                "password": "  abc  ",
            })),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    let details = body["details"].as_array().unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["field"], "password");
}

#[tokio::test]
async fn test_overlong_name_is_validation_error() {
    let ctx = TestContext::new();

    let (status, body) = ctx
        .json(
            "POST",
            "/api/v1/auth/signup",
            None,
            Some(json!({
                "name": "n".repeat(256),
                "email": unique_email(),
                "workspace_name": "Acme HQ",
                "password": "secret1",
            })),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"][0]["field"], "name");
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let ctx = TestContext::new();

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v1/auth/signup")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();

    let response = ctx.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = common::body_json(response).await;
    assert_eq!(body["status_code"], 400);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_signin_issues_day_long_token() {
    let ctx = TestContext::new();
    let email = unique_email();
    let profile = ctx.signup("Acme", &email).await;

    let (status, body) = ctx
        .json(
            "POST",
            "/api/v1/auth/signin",
            None,
            Some(json!({ "email": email, "password": "secret1", "type": "company" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["data"],
        json!({ "id": profile["id"], "name": "Acme", "email": email, "type": "company" })
    );

    let claims = validate_token(body["token"].as_str().unwrap(), JWT_SECRET).unwrap();
    assert_eq!(claims.exp - claims.iat, TOKEN_TTL_SECS);
    assert_eq!(claims.data.len(), 1);
    assert_eq!(claims.data[0].email, email);
}

#[tokio::test]
async fn test_signin_failures_are_indistinguishable() {
    let ctx = TestContext::new();
    let email = unique_email();
    ctx.signup("Acme", &email).await;

    let attempts = [
        json!({ "email": email, "password": "wrong-password", "type": "company" }),
        json!({ "email": unique_email(), "password": "secret1", "type": "company" }),
        json!({ "email": email, "password": "secret1", "type": "member" }),
        json!({ "email": email, "password": "secret1", "type": "admin" }),
    ];

    for attempt in attempts {
        let (status, body) = ctx
            .json("POST", "/api/v1/auth/signin", None, Some(attempt))
            .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Login Failed");
    }
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let ctx = TestContext::new();

    let (status, body) = ctx.json("GET", "/api/v1/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = ctx
        .json("GET", "/api/v1/tasks", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_and_forged_tokens_rejected() {
    let ctx = TestContext::new();
    let profile = AccountProfile {
        id: Uuid::new_v4(),
        name: "Acme".to_string(),
        email: unique_email(),
        account_type: AccountType::Company,
    };

    let issued_long_ago = chrono::Utc::now().timestamp() - TOKEN_TTL_SECS - 60;
    let expired =
        create_token(&Claims::issued_at(profile.clone(), issued_long_ago), JWT_SECRET).unwrap();
    let (status, body) = ctx
        .json("GET", "/api/v1/users/me", Some(&expired), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Token expired");

    let forged = create_token(
        &Claims::new(profile),
        "some-other-secret-that-is-long-enough!",
    )
    .unwrap();
    let (status, _) = ctx
        .json("GET", "/api/v1/users/me", Some(&forged), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_read_and_update() {
    let ctx = TestContext::new();
    let (email, token) = ctx.account().await;

    let (status, body) = ctx
        .json("GET", "/api/v1/users/me", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], email);
    assert_eq!(body["data"]["workspace_name"], "Acme HQ");

    let (status, body) = ctx
        .json(
            "PATCH",
            "/api/v1/users/me",
            Some(&token),
            Some(json!({ "workspace_name": "  Acme Labs  " })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["workspace_name"], "Acme Labs");
    assert_eq!(body["data"]["name"], "Acme");

    let (status, _) = ctx
        .json("PATCH", "/api/v1/users/me", Some(&token), Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = ctx
        .json(
            "PATCH",
            "/api/v1/users/me",
            Some(&token),
            Some(json!({ "name": "   " })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"][0]["field"], "name");
}
