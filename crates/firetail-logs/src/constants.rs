// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Schema revision tag written into every canonical record.
pub const LOG_VERSION: &str = "1.0.0-alpha";

/// Maximum number of records sent in a single ingestion request.
pub const MAX_BATCH_ENTRIES: usize = 100;

pub const DEFAULT_FIRETAIL_API: &str =
    "https://api.logging.eu-west-1.prod.firetail.app/aws/lb/bulk";

/// Header carrying the FireTail application token.
pub const APP_KEY_HEADER: &str = "x-ft-app-key";

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

pub const DEFAULT_BACKEND_DURATION: &str = "0ms";
pub const DEFAULT_BACKEND_PATH: &str = "/";
pub const DEFAULT_RESOURCE_TYPE: &str = "apigateway.googleapis.com/Gateway";
pub const DEFAULT_RESPONSE_SIZE: &str = "0";

pub const USER_AGENT_HEADER: &str = "User-Agent";
pub const CONTENT_LENGTH_HEADER: &str = "Content-Length";
