// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use crate::constants::{
    DEFAULT_POLL_TIMEOUT_MS, INITIAL_TAG_CAPACITY, INITIAL_TAG_CAPACITY_ENV, MAX_TAGS,
    POLL_TIMEOUT_ENV,
};
use crate::errors::Creation;
use crate::tag_map::Builder;

/// Construction-time settings for tag maps and composite pollers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsConfig {
    /// How long a composite poller waits on each source
    pub poll_timeout: Duration,
    /// Slot count new tag map builders start with
    pub initial_tag_capacity: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            initial_tag_capacity: INITIAL_TAG_CAPACITY,
        }
    }
}

impl MetricsConfig {
    /// Create configuration from environment variables, falling back to defaults for unset ones
    pub fn from_env() -> Result<Self, Creation> {
        let defaults = Self::default();

        let poll_timeout = match env::var(POLL_TIMEOUT_ENV) {
            Ok(val) => Duration::from_millis(parse_env(POLL_TIMEOUT_ENV, &val)?),
            Err(_) => defaults.poll_timeout,
        };
        let initial_tag_capacity = match env::var(INITIAL_TAG_CAPACITY_ENV) {
            Ok(val) => parse_env(INITIAL_TAG_CAPACITY_ENV, &val)?,
            Err(_) => defaults.initial_tag_capacity,
        };

        let config = Self {
            poll_timeout,
            initial_tag_capacity,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), Creation> {
        if self.poll_timeout.is_zero() {
            return Err(Creation::InvalidConfig(
                "poll timeout must be greater than 0".to_string(),
            ));
        }

        if !(1..=MAX_TAGS).contains(&self.initial_tag_capacity) {
            return Err(Creation::InvalidConfig(format!(
                "initial tag capacity {} must be between 1 and {MAX_TAGS}",
                self.initial_tag_capacity
            )));
        }

        Ok(())
    }

    /// A tag map builder sized according to this configuration
    pub fn tag_map_builder(&self) -> Builder {
        Builder::with_capacity(self.initial_tag_capacity)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, val: &str) -> Result<T, Creation> {
    val.trim()
        .parse::<T>()
        .map_err(|_| Creation::InvalidConfig(format!("{name} has an invalid value '{val}'")))
}
