// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of canonical records to the FireTail ingestion endpoint.
//!
//! Each batch is sent as one newline-delimited JSON body. The endpoint answers
//! `201 Created` on success; every other outcome is a failure and nothing is
//! retried here. Recovery is left to the caller, which for the queue consumer
//! means not acknowledging and letting the queue redeliver.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, error};

use crate::aggregator::batch;
use crate::constants::{APP_KEY_HEADER, NDJSON_CONTENT_TYPE};
use crate::errors::ShipError;
use crate::http::build_client;
use crate::log::CanonicalLogRecord;

#[async_trait]
pub trait LogShipper: Send + Sync {
    /// Sends one batch in a single request.
    ///
    /// Returns the parsed response body, or `None` if the body was not JSON.
    async fn deliver(&self, batch: &[CanonicalLogRecord]) -> Result<Option<Value>, ShipError>;

    /// Ships `records` in ingestion-sized batches, in order, stopping at the
    /// first failed batch.
    ///
    /// Returns the response of the final batch. Shipping nothing is a no-op
    /// that makes no request.
    async fn ship(&self, records: Vec<CanonicalLogRecord>) -> Result<Option<Value>, ShipError> {
        if records.is_empty() {
            debug!("No logs to ship");
            return Ok(None);
        }
        let n_records = records.len();
        let mut response = None;
        for a_batch in batch(records) {
            response = self.deliver(&a_batch).await?;
        }
        debug!("Successfully shipped {n_records} logs");
        Ok(response)
    }
}

pub struct FlusherConfig {
    /// FireTail app token sent with every batch
    pub app_key: String,
    pub endpoint: String,
    pub https_proxy: Option<String>,
    pub timeout: Duration,
}

/// HTTP shipper owning a pooled client, reused for every batch.
#[derive(Clone)]
pub struct Flusher {
    client: reqwest::Client,
    endpoint: String,
    app_key: String,
}

// The app token stays out of logs.
impl fmt::Debug for Flusher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flusher")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl Flusher {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built, e.g. for an invalid proxy.
    pub fn new(config: FlusherConfig) -> Result<Self, ShipError> {
        let client = build_client(config.https_proxy.as_deref(), config.timeout)
            .map_err(|e| ShipError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Flusher {
            client,
            endpoint: config.endpoint,
            app_key: config.app_key,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl LogShipper for Flusher {
    async fn deliver(&self, batch: &[CanonicalLogRecord]) -> Result<Option<Value>, ShipError> {
        let body = to_ndjson(batch)?;

        debug!("Sending batch of {} logs to {}", batch.len(), self.endpoint);
        let resp = self
            .client
            .post(&self.endpoint)
            .header(APP_KEY_HEADER, &self.app_key)
            .header(CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to send logs to FireTail: {e}");
                ShipError::Transport(e.to_string())
            })?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| ShipError::Transport(format!("failed to read response body: {e}")))?;

        if status != StatusCode::CREATED {
            let detail = String::from_utf8_lossy(&body).into_owned();
            error!("{status}: Failed to push logs to FireTail: {detail:?}");
            return Err(ShipError::Destination(status, detail));
        }
        Ok(serde_json::from_slice(&body).ok())
    }
}

/// Serializes records as newline-delimited JSON, without a trailing newline.
///
/// # Errors
///
/// Returns [`ShipError::Payload`] if a record cannot be serialized.
pub fn to_ndjson(records: &[CanonicalLogRecord]) -> Result<Vec<u8>, ShipError> {
    let mut body = Vec::new();
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            body.push(b'\n');
        }
        serde_json::to_writer(&mut body, record).map_err(|e| ShipError::Payload(e.to_string()))?;
    }
    Ok(body)
}
