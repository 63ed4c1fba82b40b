// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Raised when a queue or event payload is not a JSON log entry at all.
///
/// Individual malformed fields never produce this error, they are defaulted
/// during normalization.
#[derive(Debug, thiserror::Error)]
#[error("payload is not a JSON log entry: {0}")]
pub struct DecodeError(#[from] pub serde_json::Error);

/// Failure to deliver a batch to the ingestion endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ShipError {
    #[error("failed to serialize batch: {0}")]
    Payload(String),

    #[error("failed to reach ingestion endpoint: {0}")]
    Transport(String),

    #[error("ingestion endpoint responded with {0}: {1}")]
    Destination(StatusCode, String),
}

impl ShipError {
    /// Raw response body (or transport message) for diagnostics.
    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::Payload(detail) | Self::Transport(detail) | Self::Destination(_, detail) => {
                detail
            }
        }
    }
}
