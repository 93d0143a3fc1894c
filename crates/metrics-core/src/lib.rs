// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tag storage and metric collection.
//!
//! - [`tag_map`]: a small immutable open-addressing map holding the tags of a metric
//! - [`composite_poller`]: concurrent fan-out over named metric sources with per-source
//!   timeouts and failure isolation

#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(missing_copy_implementations)]

pub mod composite_poller;
pub mod config;
pub mod constants;
pub mod counters;
pub mod errors;
pub mod filter;
pub mod metric;
pub mod poller;
pub mod tag;
pub mod tag_map;

pub use composite_poller::{CompositeMetricPoller, FailureKind};
pub use filter::{AllMetricFilter, MetricFilter, RegexMetricFilter};
pub use metric::Metric;
pub use poller::{MetricPoller, PollError};
pub use tag::Tag;
pub use tag_map::TagMap;
