// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pull subscription client.
//!
//! [`Subscriber`] is the seam the consumer loop is written against. The
//! [`PubSubSubscriber`] implementation talks to the Pub/Sub REST API and
//! retries transient failures with exponential backoff until a deadline.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::access_token::AccessTokenSource;
use crate::error::SubscriberError;

pub const DEFAULT_PUBSUB_URL: &str = "https://pubsub.googleapis.com";
pub const DEFAULT_RETRY_DEADLINE: Duration = Duration::from_secs(300);
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const BACKOFF_MULTIPLIER: f64 = 1.3;

/// Opaque token used to acknowledge one pulled message.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AckId(String);

impl AckId {
    pub fn new(ack_id: impl Into<String>) -> Self {
        Self(ack_id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Ack ids are long and meaningless in logs.
impl fmt::Debug for AckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "AckId({prefix}..)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulledMessage {
    pub ack_id: AckId,
    pub message_id: String,
    pub data: Vec<u8>,
}

#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Pulls at most `max_messages` messages. An empty result means nothing
    /// was available.
    async fn pull(&self, max_messages: usize) -> Result<Vec<PulledMessage>, SubscriberError>;

    async fn acknowledge(&self, ack_ids: &[AckId]) -> Result<(), SubscriberError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    max_messages: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<ReceivedMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivedMessage {
    ack_id: AckId,
    #[serde(default)]
    message: PubsubMessage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PubsubMessage {
    #[serde(default)]
    data: String,
    #[serde(default)]
    message_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcknowledgeRequest<'a> {
    ack_ids: &'a [AckId],
}

/// REST client for one Pub/Sub subscription.
#[derive(Debug)]
pub struct PubSubSubscriber {
    client: reqwest::Client,
    subscription_url: String,
    access_token: AccessTokenSource,
    retry_deadline: Duration,
}

impl PubSubSubscriber {
    /// `base_url` is [`DEFAULT_PUBSUB_URL`] or the emulator address.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        project_id: &str,
        subscription_id: &str,
        access_token: AccessTokenSource,
    ) -> Self {
        let subscription_url = format!(
            "{}/v1/projects/{project_id}/subscriptions/{subscription_id}",
            base_url.trim_end_matches('/')
        );
        PubSubSubscriber {
            client,
            subscription_url,
            access_token,
            retry_deadline: DEFAULT_RETRY_DEADLINE,
        }
    }

    #[must_use]
    pub fn with_retry_deadline(mut self, retry_deadline: Duration) -> Self {
        self.retry_deadline = retry_deadline;
        self
    }

    /// POSTs `body` to `{subscription}:{method}`, retrying transient failures
    /// until the retry deadline has passed.
    async fn call<B, R>(&self, method: &str, body: &B) -> Result<R, SubscriberError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned + Default,
    {
        let url = format!("{}:{method}", self.subscription_url);
        let deadline = Instant::now() + self.retry_deadline;
        let mut backoff = INITIAL_BACKOFF;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let err = match self.call_once(&url, body).await {
                Ok(response) => return Ok(response),
                Err(err) if is_retryable(&err, self.access_token.is_refreshable()) => err,
                Err(err) => return Err(err),
            };

            if let SubscriberError::Status { status: 401, .. } = err {
                self.access_token.invalidate().await;
            }
            if Instant::now() + backoff >= deadline {
                return Err(SubscriberError::DeadlineExceeded(
                    self.retry_deadline,
                    err.to_string(),
                ));
            }
            warn!("Pub/Sub {method} attempt {attempts} failed, retrying in {backoff:?}: {err}");
            tokio::time::sleep(backoff).await;
            backoff = MAX_BACKOFF.min(backoff.mul_f64(BACKOFF_MULTIPLIER));
        }
    }

    async fn call_once<B, R>(&self, url: &str, body: &B) -> Result<R, SubscriberError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned + Default,
    {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = self.access_token.token().await? {
            request = request.bearer_auth(token);
        }
        let resp = request
            .send()
            .await
            .map_err(|e| SubscriberError::Transport(e.to_string()))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SubscriberError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(SubscriberError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(R::default());
        }
        serde_json::from_slice(&bytes).map_err(|e| SubscriberError::InvalidResponse(e.to_string()))
    }
}

// A 401 is only worth retrying with a freshly fetched token.
fn is_retryable(err: &SubscriberError, refreshable_token: bool) -> bool {
    match err {
        SubscriberError::Transport(_) => true,
        SubscriberError::Status { status, .. } => StatusCode::from_u16(*status).is_ok_and(|s| {
            (s == StatusCode::UNAUTHORIZED && refreshable_token)
                || s == StatusCode::TOO_MANY_REQUESTS
                || s.is_server_error()
        }),
        _ => false,
    }
}

#[async_trait]
impl Subscriber for PubSubSubscriber {
    async fn pull(&self, max_messages: usize) -> Result<Vec<PulledMessage>, SubscriberError> {
        let response: PullResponse = self.call("pull", &PullRequest { max_messages }).await?;
        debug!("Pulled {} messages", response.received_messages.len());

        response
            .received_messages
            .into_iter()
            .map(|received| {
                let data = STANDARD.decode(received.message.data.as_bytes()).map_err(|e| {
                    SubscriberError::InvalidResponse(format!(
                        "message {} data is not base64: {e}",
                        received.message.message_id
                    ))
                })?;
                Ok(PulledMessage {
                    ack_id: received.ack_id,
                    message_id: received.message.message_id,
                    data,
                })
            })
            .collect()
    }

    async fn acknowledge(&self, ack_ids: &[AckId]) -> Result<(), SubscriberError> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        let _: serde_json::Value = self
            .call("acknowledge", &AcknowledgeRequest { ack_ids })
            .await?;
        debug!("Acknowledged {} messages", ack_ids.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    const SUBSCRIPTION_PATH: &str = "/v1/projects/my-project/subscriptions/my-sub";

    fn subscriber(server: &Server, token: AccessTokenSource) -> PubSubSubscriber {
        PubSubSubscriber::new(
            reqwest::Client::new(),
            &server.url(),
            "my-project",
            "my-sub",
            token,
        )
        .with_retry_deadline(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_pull_decodes_messages() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", format!("{SUBSCRIPTION_PATH}:pull").as_str())
            .match_header("authorization", "Bearer t0k3n")
            .match_body(Matcher::Json(json!({ "maxMessages": 10 })))
            .with_status(200)
            .with_body(
                json!({
                    "receivedMessages": [
                        { "ackId": "ack-1", "message": { "data": STANDARD.encode("{\"a\":1}"), "messageId": "1" } },
                        { "ackId": "ack-2", "message": { "data": STANDARD.encode("{}"), "messageId": "2" } }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let messages = subscriber(&server, AccessTokenSource::Static("t0k3n".to_string()))
            .pull(10)
            .await
            .unwrap();

        assert_eq!(
            messages,
            vec![
                PulledMessage {
                    ack_id: AckId::new("ack-1"),
                    message_id: "1".to_string(),
                    data: b"{\"a\":1}".to_vec(),
                },
                PulledMessage {
                    ack_id: AckId::new("ack-2"),
                    message_id: "2".to_string(),
                    data: b"{}".to_vec(),
                },
            ]
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_pull_empty_response() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", format!("{SUBSCRIPTION_PATH}:pull").as_str())
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let messages = subscriber(&server, AccessTokenSource::Anonymous)
            .pull(10)
            .await
            .unwrap();

        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn test_pull_retries_server_errors() {
        let mut server = Server::new_async().await;
        let failing = server
            .mock("POST", format!("{SUBSCRIPTION_PATH}:pull").as_str())
            .with_status(503)
            .expect(1)
            .create_async()
            .await;
        let succeeding = server
            .mock("POST", format!("{SUBSCRIPTION_PATH}:pull").as_str())
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let messages = subscriber(&server, AccessTokenSource::Anonymous)
            .pull(1)
            .await
            .unwrap();

        assert!(messages.is_empty());
        failing.assert_async().await;
        succeeding.assert_async().await;
    }

    #[tokio::test]
    async fn test_pull_does_not_retry_client_errors() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", format!("{SUBSCRIPTION_PATH}:pull").as_str())
            .with_status(404)
            .with_body("Resource not found")
            .expect(1)
            .create_async()
            .await;

        let err = subscriber(&server, AccessTokenSource::Anonymous)
            .pull(1)
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriberError::Status { status: 404, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_static_token_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", format!("{SUBSCRIPTION_PATH}:pull").as_str())
            .match_header("authorization", "Bearer ya29.expired")
            .with_status(401)
            .with_body("Request had invalid authentication credentials")
            .expect(1)
            .create_async()
            .await;

        let err = subscriber(&server, AccessTokenSource::Static("ya29.expired".to_string()))
            .pull(1)
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriberError::Status { status: 401, .. }));
        mock.assert_async().await;
    }

    #[test]
    fn test_only_metadata_tokens_are_refreshable() {
        assert!(!AccessTokenSource::Anonymous.is_refreshable());
        assert!(!AccessTokenSource::Static("ya29.token".to_string()).is_refreshable());
        assert!(AccessTokenSource::metadata(reqwest::Client::new(), None).is_refreshable());
    }

    #[tokio::test]
    async fn test_pull_gives_up_after_deadline() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", format!("{SUBSCRIPTION_PATH}:pull").as_str())
            .with_status(500)
            .create_async()
            .await;

        let err = subscriber(&server, AccessTokenSource::Anonymous)
            .with_retry_deadline(Duration::from_millis(350))
            .pull(1)
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriberError::DeadlineExceeded(_, _)));
    }

    #[tokio::test]
    async fn test_pull_rejects_invalid_base64() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", format!("{SUBSCRIPTION_PATH}:pull").as_str())
            .with_status(200)
            .with_body(r#"{"receivedMessages":[{"ackId":"a","message":{"data":"***","messageId":"9"}}]}"#)
            .create_async()
            .await;

        let err = subscriber(&server, AccessTokenSource::Anonymous)
            .pull(1)
            .await
            .unwrap_err();

        assert!(matches!(err, SubscriberError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_acknowledge_sends_ack_ids() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", format!("{SUBSCRIPTION_PATH}:acknowledge").as_str())
            .match_body(Matcher::Json(json!({ "ackIds": ["ack-1", "ack-2"] })))
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        subscriber(&server, AccessTokenSource::Anonymous)
            .acknowledge(&[AckId::new("ack-1"), AckId::new("ack-2")])
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_acknowledge_nothing_makes_no_request() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        subscriber(&server, AccessTokenSource::Anonymous)
            .acknowledge(&[])
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[test]
    fn test_ack_id_debug_is_truncated() {
        let ack_id = AckId::new("RVNEUAYWLF1GSFE3GQhoUQ5PXiM_NSAoRRIJB08CKF15MEorQVh0Dn");
        assert_eq!(format!("{ack_id:?}"), "AckId(RVNEUAYW..)");
    }
}
