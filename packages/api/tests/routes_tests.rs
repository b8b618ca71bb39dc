#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use label_core::{DeliveryState, LabelRequest};
use tower::ServiceExt;

use api::LabelServer;

fn post_print(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/print")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

async fn body_json(response: Response) -> Result<serde_json::Value, Box<dyn Error>> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn pending_jobs(server: &LabelServer) -> Result<u64, Box<dyn Error>> {
    let counts = server.state.coordinator.jobs().count_by_state().await?;
    Ok(counts.get(&DeliveryState::Pending).copied().unwrap_or(0))
}

async fn published(server: &LabelServer) -> Result<u64, Box<dyn Error>> {
    Ok(server.state.coordinator.bus().stats().await?.published)
}

#[tokio::test]
async fn test_welcome() -> Result<(), Box<dyn Error>> {
    let server = common::setup_server().await?;

    let response = server
        .router()
        .oneshot(Request::builder().uri("/").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(&bytes[..], api::WELCOME.as_bytes());

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_valid_submission_creates_pending_job() -> Result<(), Box<dyn Error>> {
    let server = common::setup_server().await?;
    let body = common::signed_body(&common::sample_label(), common::HMAC_SECRET);

    let response = server.router().oneshot(post_print(body)).await?;

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    assert!(bytes.is_empty());
    assert_eq!(pending_jobs(&server).await?, 1);
    assert_eq!(published(&server).await?, 1);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_wrong_secret_is_rejected_before_store() -> Result<(), Box<dyn Error>> {
    let server = common::setup_server().await?;
    let body = common::signed_body(&common::sample_label(), "someone-else");

    let response = server.router().oneshot(post_print(body)).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await?,
        serde_json::json!({ "message": "invalid signature" })
    );
    assert_eq!(pending_jobs(&server).await?, 0);
    assert_eq!(published(&server).await?, 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_missing_fields_are_listed() -> Result<(), Box<dyn Error>> {
    let server = common::setup_server().await?;

    let response = server
        .router()
        .oneshot(post_print(r#"{"data": "", "signature": "  "}"#))
        .await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await?,
        serde_json::json!([
            { "failedField": "PrintRequest.data", "tag": "required", "value": "" },
            { "failedField": "PrintRequest.signature", "tag": "notblank", "value": "" },
        ])
    );

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_incomplete_label_is_rejected() -> Result<(), Box<dyn Error>> {
    let server = common::setup_server().await?;
    let label = LabelRequest {
        human_name: " ".into(),
        ..common::sample_label()
    };
    let body = common::signed_body(&label, common::HMAC_SECRET);

    let response = server.router().oneshot(post_print(body)).await?;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let errors = body_json(response).await?;
    assert_eq!(errors[0]["failedField"], "LabelRequest.humanName");
    assert_eq!(errors[0]["tag"], "notblank");
    assert_eq!(pending_jobs(&server).await?, 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_malformed_payloads_are_rejected() -> Result<(), Box<dyn Error>> {
    let server = common::setup_server().await?;
    let gate = label_core::SignatureGate::new(common::HMAC_SECRET.as_bytes().to_vec());

    // Correctly signed, but not base64.
    let data = "not base64!";
    let body = serde_json::json!({ "data": data, "signature": gate.sign(data)? }).to_string();
    let response = server.router().oneshot(post_print(body)).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await?["message"].is_string());

    // Signature that is not base64.
    let body = serde_json::json!({ "data": "e30=", "signature": "%%%" }).to_string();
    let response = server.router().oneshot(post_print(body)).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Not JSON at all.
    let response = server.router().oneshot(post_print("print please")).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(pending_jobs(&server).await?, 0);

    server.shutdown().await;
    Ok(())
}
