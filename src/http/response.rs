//! Synthesized responses.

use axum::body::Body;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Response, StatusCode};

use crate::error::AccelError;

/// `200 OK` with an empty JSON array, the safe answer for a plugin listing.
pub fn empty_json_list() -> Response<Body> {
    let mut response = Response::new(Body::from("[]"));
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// `Err(NonSuccessStatus)` unless `status` is 2xx.
pub fn ensure_success(status: StatusCode) -> Result<(), AccelError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(AccelError::NonSuccessStatus(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_list_is_json() {
        let response = empty_json_list();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        let body = axum::body::to_bytes(response.into_body(), 16).await.unwrap();
        assert_eq!(&body[..], b"[]");
    }

    #[test]
    fn only_success_statuses_pass() {
        assert!(ensure_success(StatusCode::OK).is_ok());
        assert!(ensure_success(StatusCode::NO_CONTENT).is_ok());
        let err = ensure_success(StatusCode::BAD_GATEWAY).unwrap_err();
        assert!(matches!(err, AccelError::NonSuccessStatus(StatusCode::BAD_GATEWAY)));
        assert_eq!(err.to_string(), "upstream answered 502 Bad Gateway");
    }
}
