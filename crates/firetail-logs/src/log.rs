// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Canonical FireTail log record and the normalization that produces it.
//!
//! Normalization is total: every field degrades to a default on its own when
//! the raw entry is missing or malformed, so a record is always produced and
//! always serializes with the same set of keys.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::constants::{
    CONTENT_LENGTH_HEADER, DEFAULT_BACKEND_DURATION, DEFAULT_BACKEND_PATH, DEFAULT_RESOURCE_TYPE,
    DEFAULT_RESPONSE_SIZE, LOG_VERSION, USER_AGENT_HEADER,
};
use crate::errors::DecodeError;
use crate::raw::RawLogRecord;
use crate::resource_path::{decode_plus, infer_resource_path, request_path};

pub type Headers = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalLogRecord {
    pub version: String,
    pub metadata: Metadata,
    pub request: Request,
    pub response: Response,
    pub execution_time: i64,
    pub date_created: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub api_id: Option<String>,
    pub api_config: Option<String>,
    pub api_key: Option<String>,
    pub api_method: Option<String>,
    pub backend_request_duration: String,
    pub backend_request_hostname: Option<String>,
    pub backend_request_path: String,
    pub consumer_number: Option<String>,
    pub response_details: Option<String>,
    pub log_name: String,
    pub resource_type: String,
    /// Bodies are never captured by this integration.
    pub request_payload: bool,
    pub response_payload: bool,
    pub gateway_id: Option<String>,
    pub location: Option<String>,
    pub resource_container: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub method: String,
    pub http_protocol: String,
    pub uri: String,
    pub resource: String,
    pub ip: String,
    pub headers: Headers,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status_code: u16,
    pub headers: Headers,
}

/// Decodes a raw Cloud Logging entry and normalizes it.
///
/// # Errors
///
/// Returns [`DecodeError`] if `payload` is not a JSON object. Malformed or
/// missing fields never fail.
pub fn normalize(payload: &[u8]) -> Result<CanonicalLogRecord, DecodeError> {
    let raw = RawLogRecord::from_slice(payload)?;
    Ok(CanonicalLogRecord::from_raw(&raw))
}

impl CanonicalLogRecord {
    #[must_use]
    pub fn from_raw(raw: &RawLogRecord) -> Self {
        let backend = raw.backend_request();
        let duration = backend
            .and_then(|b| b.duration.as_deref())
            .unwrap_or(DEFAULT_BACKEND_DURATION);

        CanonicalLogRecord {
            version: LOG_VERSION.to_string(),
            metadata: Metadata::from_raw(raw),
            request: Request::from_raw(raw),
            response: Response::from_raw(raw),
            execution_time: parse_execution_time(duration),
            date_created: parse_date_created(raw.timestamp.as_deref()),
        }
    }
}

impl Metadata {
    fn from_raw(raw: &RawLogRecord) -> Self {
        let payload = raw.json_payload.as_ref();
        let backend = raw.backend_request();
        let labels = raw.labels();

        Metadata {
            api_id: payload.and_then(|p| p.api.clone()),
            api_config: payload.and_then(|p| p.api_config.clone()),
            api_key: payload.and_then(|p| p.api_key.clone()),
            api_method: payload.and_then(|p| p.api_method.clone()),
            backend_request_duration: backend
                .and_then(|b| b.duration.clone())
                .unwrap_or_else(|| DEFAULT_BACKEND_DURATION.to_string()),
            backend_request_hostname: backend.and_then(|b| b.hostname.clone()),
            backend_request_path: decode_plus(
                backend
                    .and_then(|b| b.path.as_deref())
                    .unwrap_or(DEFAULT_BACKEND_PATH),
            ),
            consumer_number: payload.and_then(|p| p.consumer_number.clone()),
            response_details: payload.and_then(|p| p.response_details.clone()),
            log_name: raw.log_name.clone().unwrap_or_default(),
            resource_type: raw
                .resource
                .as_ref()
                .and_then(|r| r.resource_type.clone())
                .unwrap_or_else(|| DEFAULT_RESOURCE_TYPE.to_string()),
            request_payload: false,
            response_payload: false,
            gateway_id: labels.and_then(|l| l.gateway_id.clone()),
            location: labels.and_then(|l| l.location.clone()),
            resource_container: labels.and_then(|l| l.resource_container.clone()),
        }
    }
}

impl Request {
    fn from_raw(raw: &RawLogRecord) -> Self {
        let http = raw.http_request.clone().unwrap_or_default();
        let uri = decode_plus(http.request_url.as_deref().unwrap_or_default());
        // the backend path stays encoded so query values compare as logged
        let backend_path = raw
            .backend_request()
            .and_then(|b| b.path.as_deref())
            .unwrap_or(DEFAULT_BACKEND_PATH);
        let resource = infer_resource_path(request_path(&uri), backend_path);

        let mut headers = Headers::new();
        headers.insert(
            USER_AGENT_HEADER.to_string(),
            vec![http.user_agent.unwrap_or_default()],
        );

        Request {
            method: http.request_method.unwrap_or_default(),
            http_protocol: http.protocol.unwrap_or_default(),
            uri,
            resource,
            ip: http.remote_ip.unwrap_or_default(),
            headers,
        }
    }
}

impl Response {
    fn from_raw(raw: &RawLogRecord) -> Self {
        let http = raw.http_request.as_ref();

        let mut headers = Headers::new();
        headers.insert(
            CONTENT_LENGTH_HEADER.to_string(),
            vec![http
                .and_then(|h| h.response_size.clone())
                .unwrap_or_else(|| DEFAULT_RESPONSE_SIZE.to_string())],
        );

        Response {
            status_code: http.and_then(|h| h.status).unwrap_or_default(),
            headers,
        }
    }
}

/// Parses a backend duration such as `"29ms"` into milliseconds.
///
/// Only millisecond durations are understood, anything else yields `0`.
#[must_use]
pub fn parse_execution_time(duration: &str) -> i64 {
    duration
        .trim()
        .strip_suffix("ms")
        .and_then(|millis| millis.trim().parse().ok())
        .unwrap_or(0)
}

/// Converts a log timestamp into epoch milliseconds.
///
/// Falls back to the current time when the timestamp is missing or cannot be
/// parsed, so the result is not deterministic in that case.
#[must_use]
pub fn parse_date_created(timestamp: Option<&str>) -> i64 {
    match timestamp.and_then(parse_timestamp) {
        Some(parsed) => parsed.timestamp_millis(),
        None => {
            warn!("Unparseable log timestamp {timestamp:?}, using current time");
            Utc::now().timestamp_millis()
        }
    }
}

const OFFSET_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f %z",
    "%Y-%m-%d %H:%M:%S%.f %z",
];

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Zone names equivalent to a zero offset.
const UTC_ZONE_SUFFIXES: [&str; 3] = ["UTC", "GMT", "Z"];

/// Accepts RFC 3339, RFC 2822 and ISO 8601 forms with a `+hhmm` or `+hh:mm`
/// offset, a UTC zone name or no zone at all. Zone-less values are read as
/// UTC.
fn parse_timestamp(timestamp: &str) -> Option<DateTime<Utc>> {
    let timestamp = timestamp.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(timestamp) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(timestamp, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    let naive = UTC_ZONE_SUFFIXES
        .iter()
        .find_map(|zone| timestamp.strip_suffix(zone))
        .map_or(timestamp, str::trim_end);
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}
