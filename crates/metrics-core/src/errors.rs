// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while parsing tags from their `key:value` text form.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty tag key in '{0}'")]
    EmptyKey(String),
}

/// Errors raised while building a composite poller or its configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Creation {
    #[error("duplicate metric source name '{0}'")]
    DuplicateSource(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
