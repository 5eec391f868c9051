//! `AppError` rendering, called directly through `IntoResponse`.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use editlock_api::error::AppError;
use editlock_core::error::CoreError;
use editlock_core::protocol::ErrorBody;
use http_body_util::BodyExt;

async fn render(err: impl Into<AppError>) -> (StatusCode, ErrorBody) {
    let response = err.into().into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn client_errors_keep_their_message() {
    let cases = [
        (
            CoreError::NotFound {
                entity: "Record",
                id: "story/42".into(),
            },
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Record with id story/42 not found",
        ),
        (
            CoreError::Validation("entity_id must be positive, got 0".into()),
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "entity_id must be positive, got 0",
        ),
        (
            CoreError::Conflict("Lock on story/1 kept changing, try again".into()),
            StatusCode::CONFLICT,
            "CONFLICT",
            "Lock on story/1 kept changing, try again",
        ),
        (
            CoreError::Unauthorized("Token has expired".into()),
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "Token has expired",
        ),
        (
            CoreError::Forbidden("Lock administration requires the admin role".into()),
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "Lock administration requires the admin role",
        ),
    ];

    for (err, status, code, message) in cases {
        let (got_status, body) = render(err).await;
        assert_eq!(got_status, status);
        assert_eq!(body.code, code);
        assert_eq!(body.error, message);
    }
}

#[tokio::test]
async fn store_outage_is_503_without_details() {
    let (status, body) = render(CoreError::StoreUnavailable(
        "password authentication failed for user editlock".into(),
    ))
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body.code, "STORE_UNAVAILABLE");
    assert!(!body.error.contains("password"));
}

#[tokio::test]
async fn internal_errors_are_sanitized() {
    for err in [
        AppError::InternalError("secret database credentials leaked".into()),
        AppError::Core(CoreError::Internal("secret signing key missing".into())),
    ] {
        let (status, body) = render(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "INTERNAL_ERROR");
        assert_eq!(body.error, "An internal error occurred");
    }
}

#[tokio::test]
async fn bad_request_is_400() {
    let (status, body) = render(AppError::BadRequest("missing body".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body.code, "BAD_REQUEST");
}
