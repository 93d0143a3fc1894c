// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Small immutable tag map.
//!
//! A [`TagMap`] holds at most [`MAX_TAGS`] tags in a single flat arena and resolves collisions
//! with open addressing and linear probing. It is meant for the handful of tags attached to a
//! metric, where a probe over a few contiguous slots beats a general purpose hash map.
//!
//! Maps are only created through a [`Builder`]. The builder grows by rehashing into a fresh
//! arena of twice the size; once [`Builder::build`] has been called the resulting map never
//! changes and can be shared between threads without locking.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use fnv::FnvBuildHasher;
use tracing::error;

use crate::constants::{INITIAL_TAG_CAPACITY, MAX_TAGS};
use crate::errors::ParseError;
use crate::tag::{key_hash, Tag};

/// Unordered view of the tags in a map.
pub type TagSet = hashbrown::HashSet<Tag, FnvBuildHasher>;

type Arena = Box<[Option<Tag>]>;

fn empty_arena(capacity: usize) -> Arena {
    vec![None; capacity].into_boxed_slice()
}

/// Maps a native key hash onto a slot in `0..capacity`.
///
/// The hash is widened to 128 bits before taking its absolute value, otherwise `i64::MIN` would
/// stay negative.
pub fn slot_index(native_hash: i64, capacity: usize) -> usize {
    debug_assert!(capacity > 0);
    let magnitude = i128::from(native_hash).unsigned_abs();
    (magnitude % capacity as u128) as usize
}

enum Insert {
    Added,
    Replaced,
    Full,
}

fn insert_into(slots: &mut [Option<Tag>], tag: Tag) -> Insert {
    let capacity = slots.len();
    let pos = slot_index(key_hash(tag.key()), capacity);
    let mut i = pos;
    loop {
        match slots[i] {
            None => {
                slots[i] = Some(tag);
                return Insert::Added;
            }
            Some(existing) if existing.interned_key() == tag.interned_key() => {
                slots[i] = Some(tag);
                return Insert::Replaced;
            }
            Some(_) => {}
        }
        i = (i + 1) % capacity;
        if i == pos {
            return Insert::Full;
        }
    }
}

/// Mutable accumulator for a [`TagMap`].
#[derive(Clone, Debug)]
pub struct Builder {
    slots: Arena,
    len: usize,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_TAG_CAPACITY)
    }

    /// Starts with `capacity` slots, clamped to `1..=MAX_TAGS`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: empty_arena(capacity.clamp(1, MAX_TAGS)),
            len: 0,
        }
    }

    /// Adds a tag, replacing any tag already stored under the same key.
    ///
    /// When the map already holds [`MAX_TAGS`] distinct keys the tag is dropped and an error is
    /// logged; nothing is returned to the caller.
    pub fn add(&mut self, tag: Tag) -> &mut Self {
        match insert_into(&mut self.slots, tag) {
            Insert::Added => self.len += 1,
            Insert::Replaced => {}
            Insert::Full => self.grow_and_add(tag),
        }
        self
    }

    pub fn add_all<I>(&mut self, tags: I) -> &mut Self
    where
        I: IntoIterator<Item = Tag>,
    {
        for tag in tags {
            self.add(tag);
        }
        self
    }

    fn grow_and_add(&mut self, tag: Tag) {
        let capacity = self.slots.len();
        if capacity >= MAX_TAGS {
            error!("Cannot add tag {tag}: maximum number of tags ({MAX_TAGS}) reached");
            return;
        }

        let previous = std::mem::replace(
            &mut self.slots,
            empty_arena((capacity * 2).min(MAX_TAGS)),
        );
        self.len = 0;
        for existing in previous.iter().flatten() {
            self.add(*existing);
        }
        self.add(tag);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Freezes a snapshot of the current slots. The builder can keep accumulating afterwards
    /// without affecting the returned map.
    pub fn build(&self) -> TagMap {
        TagMap {
            slots: self.slots.clone(),
            len: self.len,
            hash: OnceLock::new(),
            tag_set: OnceLock::new(),
        }
    }
}

impl Extend<Tag> for Builder {
    fn extend<I: IntoIterator<Item = Tag>>(&mut self, iter: I) {
        self.add_all(iter);
    }
}

/// Immutable, capacity-bounded map from tag key to [`Tag`].
#[derive(Clone)]
pub struct TagMap {
    slots: Arena,
    len: usize,
    hash: OnceLock<u64>,
    tag_set: OnceLock<TagSet>,
}

impl TagMap {
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Parses a comma separated `key:value` list, e.g. `env:prod,service:web`.
    pub fn parse(tags_section: &str) -> Result<Self, ParseError> {
        let mut builder = Builder::new();
        for part in tags_section.split(',').filter(|s| !s.is_empty()) {
            builder.add(Tag::parse(part)?);
        }
        Ok(builder.build())
    }

    pub fn get(&self, key: &str) -> Option<&Tag> {
        let capacity = self.slots.len();
        let pos = slot_index(key_hash(key), capacity);
        let mut i = pos;
        loop {
            match &self.slots[i] {
                Some(tag) if tag.key() == key => return Some(tag),
                Some(_) => {}
                None => return None,
            }
            i = (i + 1) % capacity;
            if i == pos {
                return None;
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Tags in slot order, which is neither insertion nor key order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            slots: self.slots.iter(),
            remaining: self.len,
        }
    }

    /// Tags as a set, computed on first use and cached.
    pub fn tag_set(&self) -> &TagSet {
        self.tag_set.get_or_init(|| self.iter().copied().collect())
    }

    /// Sum of the tags' hash codes, computed on first use and cached.
    pub fn hash_code(&self) -> u64 {
        *self.hash.get_or_init(|| {
            self.iter()
                .fold(0u64, |acc, tag| acc.wrapping_add(tag.hash_code()))
        })
    }
}

impl Default for TagMap {
    fn default() -> Self {
        Builder::new().build()
    }
}

impl PartialEq for TagMap {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        // cheap length check before building either set
        self.len == other.len && self.tag_set() == other.tag_set()
    }
}

impl Eq for TagMap {}

impl Hash for TagMap {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_code());
    }
}

impl fmt::Debug for TagMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for TagMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagMap{{")?;
        for (i, tag) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{tag}")?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<Tag> for TagMap {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Builder::new().add_all(iter).build()
    }
}

impl<'a> IntoIterator for &'a TagMap {
    type Item = &'a Tag;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the occupied slots of a [`TagMap`].
pub struct Iter<'a> {
    slots: std::slice::Iter<'a, Option<Tag>>,
    remaining: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Tag;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let tag = self.slots.by_ref().find_map(Option::as_ref)?;
        self.remaining -= 1;
        Some(tag)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::hash_map::DefaultHasher;
    use tracing_test::traced_test;

    fn tags(n: usize) -> Vec<Tag> {
        (0..n)
            .map(|i| Tag::new(&format!("key{i}"), &format!("value{i}")))
            .collect()
    }

    fn std_hash(map: &TagMap) -> u64 {
        let mut hasher = DefaultHasher::new();
        map.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_round_trip_two_tags() {
        let map = TagMap::builder()
            .add(Tag::new("a", "1"))
            .add(Tag::new("b", "2"))
            .build();

        assert_eq!(map.len(), 2);
        assert!(!map.is_empty());
        assert_eq!(map.get("a"), Some(&Tag::new("a", "1")));

        let mut seen: Vec<Tag> = map.iter().copied().collect();
        seen.sort();
        assert_eq!(seen, vec![Tag::new("a", "1"), Tag::new("b", "2")]);
    }

    #[test]
    fn test_missing_key_is_none() {
        let map = TagMap::parse("env:prod").unwrap();
        assert_eq!(map.get("service"), None);
        assert!(!map.contains_key("service"));
        assert!(map.contains_key("env"));

        let empty = TagMap::default();
        assert!(empty.is_empty());
        assert_eq!(empty.get("env"), None);
        assert_eq!(empty.iter().count(), 0);
    }

    #[test]
    fn test_duplicate_key_overwrites() {
        let map = TagMap::builder()
            .add(Tag::new("env", "staging"))
            .add(Tag::new("service", "web"))
            .add(Tag::new("env", "prod"))
            .build();

        assert_eq!(map.len(), 2);
        assert_eq!(map.get("env").unwrap().value(), "prod");
    }

    #[test]
    fn test_builder_extend() {
        let mut builder = Builder::new();
        builder.add(Tag::new("env", "staging"));
        builder.extend(tags(20));
        builder.extend([Tag::new("env", "prod")]);

        let map = builder.build();
        assert_eq!(map.len(), 21);
        assert_eq!(map.capacity(), MAX_TAGS);
        assert_eq!(map.get("env").unwrap().value(), "prod");
        assert_eq!(map.get("key19"), Some(&Tag::new("key19", "value19")));

        builder.extend(tags(MAX_TAGS + 8).into_iter().skip(20));
        assert_eq!(builder.len(), MAX_TAGS);
    }

    #[test]
    fn test_colliding_keys_probe_linearly() {
        let target = slot_index(key_hash("key0"), INITIAL_TAG_CAPACITY);
        let colliding: Vec<Tag> = (0..200)
            .map(|i| format!("key{i}"))
            .filter(|k| slot_index(key_hash(k), INITIAL_TAG_CAPACITY) == target)
            .take(3)
            .map(|k| Tag::new(&k, "v"))
            .collect();
        assert_eq!(colliding.len(), 3);

        let map: TagMap = colliding.iter().copied().collect();
        assert_eq!(map.capacity(), INITIAL_TAG_CAPACITY);
        assert_eq!(map.len(), 3);
        for tag in &colliding {
            assert_eq!(map.get(tag.key()), Some(tag));
        }
    }

    #[test]
    fn test_growth_doubles_capacity() {
        let mut builder = Builder::new();
        builder.add_all(tags(8));
        assert_eq!(builder.capacity(), 8);
        assert_eq!(builder.len(), 8);

        builder.add_all(tags(9));
        assert_eq!(builder.capacity(), 16);
        assert_eq!(builder.len(), 9);

        builder.add_all(tags(17));
        assert_eq!(builder.capacity(), 32);
        assert_eq!(builder.len(), 17);

        let map = builder.build();
        for tag in tags(17) {
            assert_eq!(map.get(tag.key()), Some(&tag));
        }
    }

    #[test]
    fn test_initial_capacity_is_clamped() {
        assert_eq!(Builder::with_capacity(0).capacity(), 1);
        assert_eq!(Builder::with_capacity(100).capacity(), MAX_TAGS);

        // 3 -> 6 -> 12 -> 24 -> 32, never above the ceiling
        let mut builder = Builder::with_capacity(3);
        builder.add_all(tags(40));
        assert_eq!(builder.capacity(), MAX_TAGS);
        assert_eq!(builder.len(), MAX_TAGS);
    }

    #[test]
    #[traced_test]
    fn test_tags_beyond_ceiling_are_dropped() {
        let all = tags(MAX_TAGS + 5);
        let map: TagMap = all.iter().copied().collect();

        assert_eq!(map.len(), MAX_TAGS);
        for tag in &all[..MAX_TAGS] {
            assert_eq!(map.get(tag.key()), Some(tag));
        }
        for tag in &all[MAX_TAGS..] {
            assert!(!map.contains_key(tag.key()));
        }
        assert!(logs_contain("maximum number of tags (32) reached"));
    }

    #[test]
    fn test_overwrite_still_works_at_ceiling() {
        let mut builder = Builder::new();
        builder.add_all(tags(MAX_TAGS));
        builder.add(Tag::new("key3", "updated"));

        let map = builder.build();
        assert_eq!(map.len(), MAX_TAGS);
        assert_eq!(map.get("key3").unwrap().value(), "updated");
    }

    #[test]
    fn test_build_is_a_snapshot() {
        let mut builder = Builder::new();
        builder.add(Tag::new("env", "prod"));
        let first = builder.build();

        builder.add(Tag::new("service", "web"));
        builder.add(Tag::new("env", "dev"));
        let second = builder.build();

        assert_eq!(first.len(), 1);
        assert_eq!(first.get("env").unwrap().value(), "prod");
        assert_eq!(second.len(), 2);
        assert_eq!(second.get("env").unwrap().value(), "dev");
    }

    #[test]
    fn test_slot_index_handles_extremes() {
        for capacity in [1, 7, 8, 16, 32] {
            for hash in [i64::MIN, i64::MIN + 1, -1, 0, 1, i64::MAX] {
                assert!(slot_index(hash, capacity) < capacity);
            }
        }
        // |i64::MIN| = 2^63
        assert_eq!(slot_index(i64::MIN, 8), 0);
        assert_eq!(slot_index(i64::MIN, 7), ((1u128 << 63) % 7) as usize);
        assert_eq!(slot_index(-9, 8), 1);
    }

    #[test]
    fn test_equality_ignores_layout() {
        let small: TagMap = tags(5).into_iter().collect();
        let mut big = Builder::with_capacity(32);
        big.add_all(tags(5).into_iter().rev());
        let big = big.build();

        assert_ne!(small.capacity(), big.capacity());
        assert_eq!(small, big);
        assert_eq!(small.hash_code(), big.hash_code());
        assert_eq!(std_hash(&small), std_hash(&big));
    }

    #[test]
    fn test_inequality() {
        let a = TagMap::parse("env:prod,service:web").unwrap();
        let b = TagMap::parse("env:prod,service:api").unwrap();
        let c = TagMap::parse("env:prod").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_tag_set_is_cached() {
        let map = TagMap::parse("env:prod,service:web").unwrap();
        let first: *const TagSet = map.tag_set();
        let second: *const TagSet = map.tag_set();
        assert_eq!(first, second);
        assert!(map.tag_set().contains(&Tag::new("env", "prod")));
    }

    #[test]
    fn test_hash_code_of_empty_map() {
        let empty = TagMap::default();
        assert_eq!(empty.hash_code(), 0);
        assert_eq!(empty, TagMap::builder().build());
    }

    #[test]
    fn test_iter_is_restartable_and_exact() {
        let map: TagMap = tags(10).into_iter().collect();
        let first: Vec<&Tag> = map.iter().collect();
        let second: Vec<&Tag> = (&map).into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(map.iter().len(), 10);
    }

    #[test]
    fn test_display() {
        let map = TagMap::parse("env:prod").unwrap();
        assert_eq!(map.to_string(), "TagMap{env=prod}");
        assert_eq!(TagMap::default().to_string(), "TagMap{}");
    }

    #[test]
    fn test_parse() {
        let map = TagMap::parse("env:prod,,debug,service:web").unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("debug").unwrap().value(), "");

        assert!(TagMap::parse("").unwrap().is_empty());
        assert_eq!(
            TagMap::parse("env:prod,:web"),
            Err(ParseError::EmptyKey(":web".to_string()))
        );
    }

    #[test]
    fn test_shared_across_threads() {
        let map = std::sync::Arc::new(TagMap::parse("a:1,b:2,c:3").unwrap());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let map = std::sync::Arc::clone(&map);
                std::thread::spawn(move || (map.hash_code(), map.tag_set().len()))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|r| *r == results[0]));
        assert_eq!(results[0].1, 3);
    }

    fn tag_strategy() -> impl Strategy<Value = Vec<(u8, u8)>> {
        prop::collection::vec((0u8..24, any::<u8>()), 0..64)
    }

    proptest! {
        #[test]
        fn prop_last_write_wins(pairs in tag_strategy()) {
            let mut builder = Builder::new();
            let mut expected = std::collections::HashMap::new();
            for (k, v) in &pairs {
                let tag = Tag::new(&format!("k{k}"), &v.to_string());
                builder.add(tag);
                expected.insert(tag.key().to_string(), tag);
            }
            let map = builder.build();
            prop_assert_eq!(map.len(), expected.len());
            for (key, tag) in &expected {
                prop_assert_eq!(map.get(key), Some(tag));
            }
        }

        #[test]
        fn prop_size_never_exceeds_ceiling(n in 0usize..80) {
            let map: TagMap = tags(n).into_iter().collect();
            prop_assert_eq!(map.len(), n.min(MAX_TAGS));
            prop_assert!(map.capacity() <= MAX_TAGS);
        }

        #[test]
        fn prop_order_independent(
            n in 0usize..=MAX_TAGS,
            seed in any::<u64>(),
        ) {
            let ordered = tags(n);
            let mut shuffled = ordered.clone();
            // deterministic Fisher-Yates driven by the seed
            let mut state = seed | 1;
            for i in (1..shuffled.len()).rev() {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                shuffled.swap(i, (state % (i as u64 + 1)) as usize);
            }

            let a: TagMap = ordered.into_iter().collect();
            let b: TagMap = shuffled.into_iter().collect();
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a.hash_code(), b.hash_code());
        }

        #[test]
        fn prop_slot_index_in_range(hash in any::<i64>(), capacity in 1usize..=MAX_TAGS) {
            prop_assert!(slot_index(hash, capacity) < capacity);
        }
    }
}
