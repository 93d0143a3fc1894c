// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Hard ceiling on the number of tags a single tag map can hold.
pub const MAX_TAGS: usize = 32;

/// Slot count a fresh tag map builder starts with.
pub const INITIAL_TAG_CAPACITY: usize = 8;

/// Tag key used to label failure counters with the name of the source that failed.
pub const POLLER_TAG_KEY: &str = "PollerName";

/// Per-source wait used when no timeout is configured, in milliseconds.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 1_000;

// Environment overrides read by `MetricsConfig::from_env`
pub const POLL_TIMEOUT_ENV: &str = "METRICS_POLLER_TIMEOUT_MS";
pub const INITIAL_TAG_CAPACITY_ENV: &str = "METRICS_TAG_MAP_INITIAL_CAPACITY";
