// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;

/// Builds a reqwest client with optional proxy configuration and timeout.
///
/// The client keeps a connection pool, so callers should build one and reuse
/// it for the lifetime of the process.
///
/// # Errors
///
/// Fails if the proxy URL is invalid or the TLS backend cannot be initialized.
pub fn build_client(
    proxy_url: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder().use_rustls_tls().timeout(timeout);
    if let Some(proxy) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    builder.build()
}
