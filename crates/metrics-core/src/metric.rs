// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::{SystemTime, UNIX_EPOCH};

use ustr::Ustr;

use crate::tag_map::TagMap;

/// A single observation produced by a metric source.
#[derive(Clone, Debug, PartialEq)]
pub struct Metric {
    pub name: Ustr,
    pub tags: TagMap,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub value: f64,
}

impl Metric {
    pub fn new(name: &str, tags: TagMap, timestamp: i64, value: f64) -> Self {
        Self {
            name: Ustr::from(name),
            tags,
            timestamp,
            value,
        }
    }

    /// Creates a metric stamped with the current time.
    pub fn now(name: &str, tags: TagMap, value: f64) -> Self {
        Self::new(name, tags, now_millis(), value)
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}
