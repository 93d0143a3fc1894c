// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Mutex;

use fnv::FnvBuildHasher;
use ustr::Ustr;

use crate::tag_map::TagMap;

/// Sink for counters about collection failures. Purely observational.
pub trait FailureCounter: Send + Sync {
    fn increment(&self, name: &str, tags: &TagMap);
}

/// Discards every increment.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopFailureCounter;

impl FailureCounter for NoopFailureCounter {
    fn increment(&self, _name: &str, _tags: &TagMap) {}
}

/// In-memory counters keyed by counter name and tags.
#[derive(Debug, Default)]
pub struct FailureCounters {
    counts: Mutex<hashbrown::HashMap<(Ustr, TagMap), u64, FnvBuildHasher>>,
}

impl FailureCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of the counter with exactly these tags.
    pub fn get(&self, name: &str, tags: &TagMap) -> u64 {
        #[allow(clippy::expect_used)]
        let counts = self.counts.lock().expect("lock poisoned");
        counts
            .get(&(Ustr::from(name), tags.clone()))
            .copied()
            .unwrap_or_default()
    }

    /// Sum of the counter across all tag combinations.
    pub fn total(&self, name: &str) -> u64 {
        let name = Ustr::from(name);
        #[allow(clippy::expect_used)]
        let counts = self.counts.lock().expect("lock poisoned");
        counts
            .iter()
            .filter(|((counter, _), _)| *counter == name)
            .map(|(_, count)| *count)
            .sum()
    }

    pub fn snapshot(&self) -> Vec<(String, TagMap, u64)> {
        #[allow(clippy::expect_used)]
        let counts = self.counts.lock().expect("lock poisoned");
        counts
            .iter()
            .map(|((name, tags), count)| (name.to_string(), tags.clone(), *count))
            .collect()
    }
}

impl FailureCounter for FailureCounters {
    fn increment(&self, name: &str, tags: &TagMap) {
        #[allow(clippy::expect_used)]
        let mut counts = self.counts.lock().expect("lock poisoned");
        *counts
            .entry((Ustr::from(name), tags.clone()))
            .or_insert(0) += 1;
    }
}
