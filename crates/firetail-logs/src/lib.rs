// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Normalization and delivery of Google Cloud API Gateway request logs to the
//! FireTail logging API.
//!
//! Raw Cloud Logging entries are decoded into a [`raw::RawLogRecord`],
//! normalized into a [`log::CanonicalLogRecord`], chunked by the
//! [`aggregator`] and shipped by a [`flusher::LogShipper`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod aggregator;
pub mod constants;
pub mod errors;
pub mod flusher;
pub mod http;
pub mod log;
pub mod raw;
pub mod resource_path;
