// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Inference of the templated resource path of a request.
//!
//! API Gateway rewrites path parameters into the query string of the backend
//! request, e.g. a call to `/pets/1/67` routed to a backend using
//! `path_translation: CONSTANT_ADDRESS` shows up as `/?pet_id=1&pet2_id=67`. The
//! query pairs describe the trailing path segments, in order, so walking both
//! from the end lets us put the parameter names back in place:
//!
//! ```
//! use firetail_logs::resource_path::infer_resource_path;
//!
//! assert_eq!(
//!     infer_resource_path("/pets/1/67", "/?pet_id=1&pet2_id=67"),
//!     "/pets/{pet_id}/{pet2_id}"
//! );
//! ```
//!
//! Segments are only substituted when their literal value matches, so a
//! backend that declares fewer parameters than the path has segments does not
//! shift names onto the wrong segment. Two segments sharing the same literal
//! value can still be confused; no attempt is made to disambiguate them.

/// Maps a request path and the gateway backend path to a templated path.
///
/// `request_path` must already be percent-decoded. When `backend_path` has no
/// query component the request path is returned unchanged.
#[must_use]
pub fn infer_resource_path(request_path: &str, backend_path: &str) -> String {
    let Some((_, query)) = backend_path.split_once('?') else {
        return request_path.to_string();
    };
    if query.is_empty() {
        return request_path.to_string();
    }

    let params = query_pairs(query);
    let mut segments: Vec<String> = request_path.split('/').map(str::to_string).collect();

    for (i, (key, value)) in params.iter().rev().enumerate() {
        let Some(position) = segments.len().checked_sub(1 + i) else {
            break;
        };
        if segments[position] == *value {
            segments[position] = format!("{{{key}}}");
        }
    }

    segments.join("/")
}

/// Splits a query string into ordered `(key, value)` pairs.
///
/// A token without `=` becomes a key with an empty value so that it still
/// occupies its position.
fn query_pairs(query: &str) -> Vec<(&str, &str)> {
    query
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .collect()
}

/// Returns the path component of a request URI.
///
/// Accepts absolute URLs (`https://host/path?query`) as well as bare paths.
#[must_use]
pub fn request_path(uri: &str) -> &str {
    let without_authority = match uri.split_once("://") {
        Some((scheme, rest)) if is_scheme(scheme) => {
            match rest.find(['/', '?', '#']) {
                Some(start) => &rest[start..],
                None => "",
            }
        }
        _ => uri,
    };
    match without_authority.find(['?', '#']) {
        Some(end) => &without_authority[..end],
        None => without_authority,
    }
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Percent-decodes `value`, treating `+` as a space.
///
/// Invalid UTF-8 sequences are replaced rather than rejected.
#[must_use]
pub fn decode_plus(value: &str) -> String {
    let spaced = value.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}
