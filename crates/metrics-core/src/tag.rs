// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::hash::Hasher;

use derive_more::Display;
use fnv::FnvHasher;
use ustr::Ustr;

use crate::errors::ParseError;

/// An immutable key/value label attached to a metric.
///
/// Keys and values are interned, so tags are `Copy` and compare in constant time.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("{key}={value}")]
pub struct Tag {
    key: Ustr,
    value: Ustr,
}

impl Tag {
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: Ustr::from(key),
            value: Ustr::from(value),
        }
    }

    /// Parses a single `key:value` tag. Everything after the first colon is the value, a tag
    /// without a colon gets an empty value.
    pub fn parse(tag: &str) -> Result<Self, ParseError> {
        let (key, value) = tag.split_once(':').unwrap_or((tag, ""));
        if key.is_empty() {
            return Err(ParseError::EmptyKey(tag.to_string()));
        }
        Ok(Self::new(key, value))
    }

    pub fn key(&self) -> &str {
        self.key.as_str()
    }

    pub fn value(&self) -> &str {
        self.value.as_str()
    }

    pub(crate) fn interned_key(&self) -> Ustr {
        self.key
    }

    /// Stable hash of the whole tag. Tag maps sum these to build their own hash, so it must not
    /// depend on process-level hash seeds.
    pub fn hash_code(&self) -> u64 {
        let mut hasher = FnvHasher::default();
        hasher.write(self.key.as_bytes());
        hasher.write_u8(0xff);
        hasher.write(self.value.as_bytes());
        hasher.finish()
    }
}

/// Native hash of a tag key, as a signed value. Signed so the slot computation has to deal with
/// `i64::MIN`, which has no positive counterpart of the same width.
pub(crate) fn key_hash(key: &str) -> i64 {
    let mut hasher = FnvHasher::default();
    hasher.write(key.as_bytes());
    hasher.finish() as i64
}

impl From<(&str, &str)> for Tag {
    fn from((key, value): (&str, &str)) -> Self {
        Self::new(key, value)
    }
}
