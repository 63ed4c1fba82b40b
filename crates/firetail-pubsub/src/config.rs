// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::str::FromStr;
use std::time::Duration;

use firetail_logs::constants::DEFAULT_FIRETAIL_API;

use crate::consumer::DEFAULT_MAX_MESSAGES;
use crate::error::ConfigError;
use crate::push_server::DEFAULT_MAX_REQUEST_CONTENT_LENGTH;
use crate::subscriber::DEFAULT_PUBSUB_URL;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Pull batches from a subscription, acknowledging after delivery.
    Pull {
        project_id: String,
        subscription_id: String,
        /// As configured; the consumer bounds it to one batch.
        max_messages: usize,
    },
    /// Serve push deliveries, one message per request.
    Push { port: u16 },
}

#[derive(Debug)]
pub struct Config {
    pub firetail_api: String,
    pub app_token: String,
    pub mode: Mode,
    /// Base URL of the Pub/Sub REST API
    pub pubsub_url: String,
    /// Set when talking to the emulator, which takes no credentials
    pub pubsub_emulator: bool,
    pub access_token: Option<String>,
    /// Overrides `metadata.google.internal` when fetching tokens
    pub metadata_host: Option<String>,
    pub request_timeout: Duration,
    pub max_request_content_length: usize,
    pub proxy_url: Option<String>,
}

impl Config {
    pub fn new() -> Result<Config, ConfigError> {
        let app_token = required_var("FIRETAIL_APP_TOKEN")?;
        let firetail_api = optional_var("FIRETAIL_API")
            .unwrap_or_else(|| DEFAULT_FIRETAIL_API.to_string());

        let mode = match optional_var("FIRETAIL_MODE")
            .map(|mode| mode.to_ascii_lowercase())
            .as_deref()
        {
            None | Some("pull") => Mode::Pull {
                project_id: required_var("PROJECT_ID")?,
                subscription_id: required_var("SUBSCRIPTION_ID")?,
                max_messages: parse_var("MAX_MESSAGES")?.unwrap_or(DEFAULT_MAX_MESSAGES),
            },
            Some("push") => Mode::Push {
                port: parse_var("PORT")?.unwrap_or(DEFAULT_PORT),
            },
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "FIRETAIL_MODE",
                    value: other.to_string(),
                })
            }
        };

        let emulator_host = optional_var("PUBSUB_EMULATOR_HOST");
        let pubsub_url = match &emulator_host {
            Some(host) if host.contains("://") => host.trim_end_matches('/').to_string(),
            Some(host) => format!("http://{host}"),
            None => DEFAULT_PUBSUB_URL.to_string(),
        };

        let request_timeout = Duration::from_secs(
            parse_var("FIRETAIL_REQUEST_TIMEOUT_SECS")?.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );

        Ok(Config {
            firetail_api,
            app_token,
            mode,
            pubsub_url,
            pubsub_emulator: emulator_host.is_some(),
            access_token: optional_var("GOOGLE_OAUTH_ACCESS_TOKEN"),
            metadata_host: optional_var("GCE_METADATA_HOST"),
            request_timeout,
            max_request_content_length: DEFAULT_MAX_REQUEST_CONTENT_LENGTH,
            proxy_url: optional_var("HTTPS_PROXY").or_else(|| optional_var("https_proxy")),
        })
    }
}

/// Unset and empty variables are treated the same.
fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn required_var(name: &'static str) -> Result<String, ConfigError> {
    optional_var(name).ok_or(ConfigError::MissingVar(name))
}

fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    optional_var(name)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidValue { name, value })
        })
        .transpose()
}
