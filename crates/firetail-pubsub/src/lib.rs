// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pub/Sub side of the FireTail API Gateway integration: the pull consumer
//! that acknowledges messages only once their logs are delivered, and the
//! push endpoint handling one event per request.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod access_token;
pub mod config;
pub mod consumer;
pub mod error;
pub mod event;
pub mod http_utils;
pub mod push_server;
pub mod subscriber;
