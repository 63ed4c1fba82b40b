// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Single-event handling for push deliveries.
//!
//! A push subscription (or Eventarc trigger) delivers one message per request,
//! either as a bare Pub/Sub push envelope
//! `{"message": {"data": "<base64>"}, "subscription": "..."}` or wrapped in a
//! structured CloudEvent `{"specversion": "1.0", "data": {"message": ...}}`.
//! There is no ack id to manage: answering with a success status acknowledges
//! the message and an error status makes the runtime retry it.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use firetail_logs::flusher::LogShipper;
use firetail_logs::log::normalize;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::EventError;

#[derive(Debug, Deserialize)]
struct PushMessage {
    data: Option<String>,
    #[serde(default, rename = "messageId")]
    message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PushMessage,
}

#[derive(Debug, Deserialize)]
struct CloudEvent {
    data: PushEnvelope,
}

/// Extracts the base64-decoded message payload from an event body.
///
/// # Errors
///
/// Fails if the body matches neither envelope or the data is not base64.
pub fn decode_event(body: &[u8]) -> Result<Vec<u8>, EventError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| EventError::Envelope(e.to_string()))?;

    let envelope = if value.get("message").is_some() {
        PushEnvelope::deserialize(value)
    } else {
        CloudEvent::deserialize(value).map(|event| event.data)
    }
    .map_err(|e| EventError::Envelope(e.to_string()))?;

    let data = envelope
        .message
        .data
        .ok_or_else(|| EventError::Envelope("message has no data".to_string()))?;
    debug!(
        "Decoding pushed message {}",
        envelope.message.message_id.as_deref().unwrap_or("<unknown>")
    );
    STANDARD
        .decode(data.as_bytes())
        .map_err(|e| EventError::Envelope(format!("message data is not base64: {e}")))
}

/// Normalizes the log carried by one event and ships it as a batch of one.
///
/// Returns the ingestion response body.
///
/// # Errors
///
/// Fails loudly on an invalid envelope, a payload that is not a log entry, or
/// a delivery failure.
pub async fn handle_event(
    shipper: &dyn LogShipper,
    body: &[u8],
) -> Result<Option<Value>, EventError> {
    let payload = decode_event(body)?;
    let record = normalize(&payload)?;
    Ok(shipper.ship(vec![record]).await?)
}
