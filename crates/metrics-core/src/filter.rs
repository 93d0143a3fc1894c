// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Predicates selecting which metrics a source should return.

use regex::Regex;

use crate::tag_map::TagMap;

/// Decides whether a metric with the given name and tags should be collected.
///
/// Implementations must be pure: the same filter is shared by every source queried during a
/// poll, concurrently.
pub trait MetricFilter: Send + Sync {
    fn matches(&self, name: &str, tags: &TagMap) -> bool;
}

/// Matches every metric.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllMetricFilter;

impl MetricFilter for AllMetricFilter {
    fn matches(&self, _name: &str, _tags: &TagMap) -> bool {
        true
    }
}

/// Matches a regular expression against either the metric name or the value of one tag.
///
/// The expression must match the whole value. When a tag key is configured and the metric does
/// not carry that tag, `match_if_missing_tag` is the outcome. `invert` flips the final result.
#[derive(Clone, Debug)]
pub struct RegexMetricFilter {
    tag_key: Option<String>,
    pattern: Regex,
    match_if_missing_tag: bool,
    invert: bool,
}

impl RegexMetricFilter {
    pub fn new(
        tag_key: Option<String>,
        pattern: &str,
        match_if_missing_tag: bool,
        invert: bool,
    ) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self {
            tag_key,
            pattern,
            match_if_missing_tag,
            invert,
        })
    }

    /// Filter on the metric name.
    pub fn on_name(pattern: &str) -> Result<Self, regex::Error> {
        Self::new(None, pattern, false, false)
    }
}

impl MetricFilter for RegexMetricFilter {
    fn matches(&self, name: &str, tags: &TagMap) -> bool {
        let value = match &self.tag_key {
            None => Some(name),
            Some(key) => tags.get(key).map(|tag| tag.value()),
        };

        let matched = value.map_or(self.match_if_missing_tag, |v| self.pattern.is_match(v));
        matched ^ self.invert
    }
}
