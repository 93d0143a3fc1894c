// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fan-out/gather over several named metric sources.
//!
//! Every call to [`CompositeMetricPoller::poll`] spawns one task per source on a shared runtime,
//! then waits on the tasks one after another, each for at most the configured timeout. A source
//! that fails, panics or is too slow contributes nothing to the result; the failure is logged
//! and counted, and collection carries on with the remaining sources.
//!
//! Timed-out tasks are not aborted. Their `JoinHandle` is dropped, which detaches the task, so a
//! hung source keeps running in the background and its eventual result is discarded.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use derive_more::Display;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::MetricsConfig;
use crate::constants::POLLER_TAG_KEY;
use crate::counters::FailureCounter;
use crate::errors::Creation;
use crate::filter::MetricFilter;
use crate::metric::Metric;
use crate::poller::{MetricPoller, PollError};
use crate::tag::Tag;
use crate::tag_map::TagMap;

/// Why a source contributed nothing to a poll.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The source returned an error or panicked
    ExecutionFailure,
    /// The source did not answer within the timeout
    Timeout,
    /// The task was cancelled while being waited on, e.g. because the runtime shut down
    Interrupted,
}

impl FailureKind {
    /// Name of the counter incremented for this kind of failure, e.g. `TimeoutCount`.
    pub fn counter_name(&self) -> String {
        format!("{self}Count")
    }
}

type PollTask = JoinHandle<Result<Vec<Metric>, PollError>>;

/// Combines the results of several metric sources.
pub struct CompositeMetricPoller {
    sources: Vec<(String, Arc<dyn MetricPoller>)>,
    runtime: Handle,
    timeout: Duration,
    counters: Arc<dyn FailureCounter>,
}

impl CompositeMetricPoller {
    /// Creates a poller over `sources`, queried in the order given.
    ///
    /// The source name identifies the source in logs and failure counters, so names must be
    /// unique. Tasks are spawned on `runtime`, which the poller neither owns nor sizes.
    ///
    /// The per-source timeout only fires while the awaiting task gets scheduled. `runtime` should
    /// therefore be a multi-thread runtime, or a different runtime from the one awaiting
    /// [`poll`](Self::poll). With a current-thread runtime shared with the caller, a source that
    /// blocks its thread stalls the whole poll and is never counted as a timeout. See
    /// [`MetricPoller`] for the matching rule on sources.
    pub fn new<I>(
        sources: I,
        runtime: Handle,
        timeout: Duration,
        counters: Arc<dyn FailureCounter>,
    ) -> Result<Self, Creation>
    where
        I: IntoIterator<Item = (String, Arc<dyn MetricPoller>)>,
    {
        if timeout.is_zero() {
            return Err(Creation::InvalidConfig(
                "poll timeout must be greater than 0".to_string(),
            ));
        }

        let mut configured: Vec<(String, Arc<dyn MetricPoller>)> = Vec::new();
        for (name, source) in sources {
            if configured.iter().any(|(existing, _)| *existing == name) {
                return Err(Creation::DuplicateSource(name));
            }
            configured.push((name, source));
        }

        Ok(Self {
            sources: configured,
            runtime,
            timeout,
            counters,
        })
    }

    /// Creates a poller using the timeout from `config`, after validating it.
    pub fn from_config<I>(
        sources: I,
        runtime: Handle,
        config: &MetricsConfig,
        counters: Arc<dyn FailureCounter>,
    ) -> Result<Self, Creation>
    where
        I: IntoIterator<Item = (String, Arc<dyn MetricPoller>)>,
    {
        config.validate()?;
        Self::new(sources, runtime, config.poll_timeout, counters)
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|(name, _)| name.as_str())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Polls every source concurrently and concatenates whatever they returned.
    ///
    /// Never fails: a source that errors, panics, times out or is cancelled contributes an
    /// empty list.
    pub async fn poll(&self, filter: Arc<dyn MetricFilter>) -> Vec<Metric> {
        let tasks: Vec<(&str, PollTask)> = self
            .sources
            .iter()
            .map(|(name, source)| {
                let source = Arc::clone(source);
                let filter = Arc::clone(&filter);
                let task = self
                    .runtime
                    .spawn(async move { source.poll(filter).await });
                (name.as_str(), task)
            })
            .collect();

        let mut all_metrics = Vec::new();
        for (name, task) in tasks {
            all_metrics.extend(self.wait_for(name, task).await);
        }

        debug!(
            "Collected {} metrics from {} sources",
            all_metrics.len(),
            self.sources.len()
        );
        all_metrics
    }

    async fn wait_for(&self, name: &str, task: PollTask) -> Vec<Metric> {
        let (kind, cause) = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(metrics))) => return metrics,
            Ok(Ok(Err(e))) => (FailureKind::ExecutionFailure, e.to_string()),
            Ok(Err(e)) if e.is_cancelled() => (FailureKind::Interrupted, e.to_string()),
            Ok(Err(e)) => (FailureKind::ExecutionFailure, e.to_string()),
            // dropping the handle detaches the task, it is not aborted
            Err(elapsed) => (FailureKind::Timeout, elapsed.to_string()),
        };

        self.record_failure(name, kind, &cause);
        Vec::new()
    }

    fn record_failure(&self, name: &str, kind: FailureKind, cause: &str) {
        let tags = TagMap::builder()
            .add(Tag::new(POLLER_TAG_KEY, name))
            .build();
        self.counters.increment(&kind.counter_name(), &tags);

        match kind {
            FailureKind::ExecutionFailure => {
                warn!(poller = name, "Uncaught error from poll method for {name}: {cause}");
            }
            FailureKind::Timeout => {
                warn!(poller = name, "Timeout executing poll method for {name}: {cause}");
            }
            FailureKind::Interrupted => {
                warn!(poller = name, "Interrupted while waiting on poll method for {name}: {cause}");
            }
        }
    }
}

#[async_trait]
impl MetricPoller for CompositeMetricPoller {
    async fn poll(&self, filter: Arc<dyn MetricFilter>) -> Result<Vec<Metric>, PollError> {
        Ok(Self::poll(self, filter).await)
    }
}
