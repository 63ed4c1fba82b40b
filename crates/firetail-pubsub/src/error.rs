// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use firetail_logs::errors::{DecodeError, ShipError};

/// Errors from the Pub/Sub REST API.
#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("Pub/Sub request failed: {0}")]
    Transport(String),

    #[error("Pub/Sub responded with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Pub/Sub retry deadline of {0:?} exceeded: {1}")]
    DeadlineExceeded(std::time::Duration, String),

    #[error("Invalid Pub/Sub response: {0}")]
    InvalidResponse(String),

    #[error("Failed to obtain access token: {0}")]
    AccessToken(String),
}

/// Errors that end a pull cycle. None of them acknowledge the messages held
/// by the cycle, so Pub/Sub redelivers them.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("Failed to pull messages: {0}")]
    Pull(#[source] SubscriberError),

    #[error("Failed to acknowledge messages: {0}")]
    Acknowledge(#[source] SubscriberError),

    #[error("Failed to decode message {message_id}: {source}")]
    Decode {
        message_id: String,
        #[source]
        source: DecodeError,
    },

    #[error("Failed to deliver logs: {0}")]
    Delivery(#[from] ShipError),
}

/// Errors handling a single pushed event.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Invalid event envelope: {0}")]
    Envelope(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Failed to deliver logs: {0}")]
    Delivery(#[from] ShipError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    MissingVar(&'static str),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}
