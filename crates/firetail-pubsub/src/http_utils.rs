// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{http, Response, StatusCode};
use serde_json::json;
use tracing::{debug, error};

pub type HttpResponse = Response<Full<Bytes>>;

/// Does two things:
/// 1. Logs the given message. A success status code (within 200-299) will cause a debug log to be
///    written, otherwise error will be written.
/// 2. Returns the given message in the body of JSON response with the given status code.
///
/// Response body format:
/// {
///     "message": message
/// }
pub fn log_and_create_http_response(
    message: &str,
    status: StatusCode,
) -> http::Result<HttpResponse> {
    if status.is_success() {
        debug!("{message}");
    } else {
        error!("{message}");
    }
    let body = json!({ "message": message }).to_string();
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn get_response_body_as_string(response: HttpResponse) -> String {
        let body = response.into_body();
        let bytes = body.collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.into_iter().collect()).unwrap()
    }

    #[tokio::test]
    async fn test_log_and_create_http_response() {
        let response =
            log_and_create_http_response("Shipped 1 log", StatusCode::OK).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            get_response_body_as_string(response).await,
            "{\"message\":\"Shipped 1 log\"}"
        );
    }

    #[tokio::test]
    async fn test_log_and_create_error_response() {
        let response =
            log_and_create_http_response("Bad envelope", StatusCode::BAD_REQUEST).unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            get_response_body_as_string(response).await,
            "{\"message\":\"Bad envelope\"}"
        );
    }
}
