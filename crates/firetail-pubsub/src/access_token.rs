// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! OAuth access tokens for the Pub/Sub REST API.

use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::SubscriberError;

const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
pub struct CachedToken {
    token: String,
    refresh_at: Instant,
}

#[derive(Debug)]
pub enum AccessTokenSource {
    /// No `Authorization` header, used against the Pub/Sub emulator.
    Anonymous,
    Static(String),
    /// Service account token from the GCE metadata server, cached until
    /// shortly before it expires.
    Metadata {
        client: reqwest::Client,
        url: String,
        cached: Mutex<Option<CachedToken>>,
    },
}

impl AccessTokenSource {
    #[must_use]
    pub fn metadata(client: reqwest::Client, metadata_host: Option<&str>) -> Self {
        let host = metadata_host.unwrap_or(DEFAULT_METADATA_HOST);
        let url = if host.contains("://") {
            format!("{host}{TOKEN_PATH}")
        } else {
            format!("http://{host}{TOKEN_PATH}")
        };
        Self::Metadata {
            client,
            url,
            cached: Mutex::new(None),
        }
    }

    /// Only metadata tokens can be replaced after a `401`.
    #[must_use]
    pub fn is_refreshable(&self) -> bool {
        matches!(self, Self::Metadata { .. })
    }

    /// Returns the bearer token to send, if any.
    ///
    /// # Errors
    ///
    /// Fails if the metadata server cannot be reached or returns no token.
    pub async fn token(&self) -> Result<Option<String>, SubscriberError> {
        match self {
            Self::Anonymous => Ok(None),
            Self::Static(token) => Ok(Some(token.clone())),
            Self::Metadata {
                client,
                url,
                cached,
            } => {
                let mut cached = cached.lock().await;
                if let Some(token) = cached.as_ref() {
                    if Instant::now() < token.refresh_at {
                        return Ok(Some(token.token.clone()));
                    }
                }

                debug!("Fetching Pub/Sub access token from metadata server");
                let fetched = fetch_metadata_token(client, url).await?;
                let lifetime = Duration::from_secs(fetched.expires_in).saturating_sub(EXPIRY_MARGIN);
                *cached = Some(CachedToken {
                    token: fetched.access_token.clone(),
                    refresh_at: Instant::now() + lifetime,
                });
                Ok(Some(fetched.access_token))
            }
        }
    }

    /// Drops a cached token, e.g. after Pub/Sub rejected it.
    pub async fn invalidate(&self) {
        if let Self::Metadata { cached, .. } = self {
            *cached.lock().await = None;
        }
    }
}

async fn fetch_metadata_token(
    client: &reqwest::Client,
    url: &str,
) -> Result<MetadataToken, SubscriberError> {
    let resp = client
        .get(url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| SubscriberError::AccessToken(e.to_string()))?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(SubscriberError::AccessToken(format!("{status}: {body}")));
    }
    resp.json()
        .await
        .map_err(|e| SubscriberError::AccessToken(e.to_string()))
}
