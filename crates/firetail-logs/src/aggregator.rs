// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Grouping of normalized records into ingestion-sized batches.
//!
//! Batches are contiguous, keep the order records were added in and never
//! exceed [`MAX_BATCH_ENTRIES`] entries. Nothing is deduplicated.

use crate::constants::MAX_BATCH_ENTRIES;

/// Splits `records` into chunks of at most [`MAX_BATCH_ENTRIES`].
///
/// An empty input yields no chunks.
#[must_use]
pub fn batch<T>(records: Vec<T>) -> Vec<Vec<T>> {
    let mut batches = Vec::with_capacity(records.len().div_ceil(MAX_BATCH_ENTRIES));
    let mut records = records.into_iter();
    loop {
        let next: Vec<T> = records.by_ref().take(MAX_BATCH_ENTRIES).collect();
        if next.is_empty() {
            return batches;
        }
        batches.push(next);
    }
}
