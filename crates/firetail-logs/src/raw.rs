// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tolerant decoding of Cloud Logging entries written by API Gateway.
//!
//! Every field is optional. A missing key, a missing nested object or a value
//! of an unexpected JSON type all decode to `None`, so the only way decoding
//! fails is a payload that is not a JSON object.

use serde::de::{self, DeserializeOwned, Deserializer, Unexpected};
use serde::Deserialize;
use serde_json::Value;

use crate::errors::DecodeError;

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLogRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub log_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub http_request: Option<HttpRequest>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub json_payload: Option<JsonPayload>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub resource: Option<Resource>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub request_method: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub request_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub protocol: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_agent: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub remote_ip: Option<String>,
    #[serde(default, deserialize_with = "lenient_status")]
    pub status: Option<u16>,
    /// Cloud Logging encodes int64 values as strings.
    #[serde(default, deserialize_with = "lenient_string")]
    pub response_size: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonPayload {
    #[serde(default, deserialize_with = "lenient_string")]
    pub api: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub api_config: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub api_key: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub api_method: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub consumer_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub response_details: Option<String>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub backend_request: Option<BackendRequest>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct BackendRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub duration: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub hostname: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub path: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct Resource {
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub resource_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_object")]
    pub labels: Option<ResourceLabels>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct ResourceLabels {
    #[serde(default, deserialize_with = "lenient_string")]
    pub gateway_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub resource_container: Option<String>,
}

impl RawLogRecord {
    /// Decodes a serialized log entry.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the payload is not a JSON object.
    pub fn from_slice(payload: &[u8]) -> Result<Self, DecodeError> {
        // derived structs would also accept a JSON array, filled by position
        match serde_json::from_slice(payload)? {
            value @ Value::Object(_) => Ok(serde_json::from_value(value)?),
            other => Err(DecodeError(<serde_json::Error as de::Error>::invalid_type(
                unexpected(&other),
                &"a JSON object",
            ))),
        }
    }

    #[must_use]
    pub fn backend_request(&self) -> Option<&BackendRequest> {
        self.json_payload.as_ref()?.backend_request.as_ref()
    }

    #[must_use]
    pub fn labels(&self) -> Option<&ResourceLabels> {
        self.resource.as_ref()?.labels.as_ref()
    }
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(_) => Unexpected::Other("number"),
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
        Value::Object(_) => Unexpected::Map,
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_status<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        value @ Value::Object(_) => serde_json::from_value(value).ok(),
        _ => None,
    })
}
