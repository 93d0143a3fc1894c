// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use async_trait::async_trait;

use crate::filter::MetricFilter;
use crate::metric::Metric;

/// Failure reported by a metric source while polling.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("{0}")]
    Source(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Something that can produce a batch of metrics on demand.
///
/// A poll may fail, panic, or never complete; callers that aggregate several sources have to
/// guard against all three.
///
/// `poll` runs as a task on a tokio runtime and must not block its worker thread. Synchronous
/// or otherwise blocking work goes through [`tokio::task::spawn_blocking`] or a dedicated
/// thread. A source that blocks inside `poll` holds the worker until it returns, and on a
/// current-thread runtime that also stops the caller's timers, so a hung source is never timed
/// out.
#[async_trait]
pub trait MetricPoller: Send + Sync {
    /// Returns the current metrics accepted by `filter`.
    async fn poll(&self, filter: Arc<dyn MetricFilter>) -> Result<Vec<Metric>, PollError>;
}
