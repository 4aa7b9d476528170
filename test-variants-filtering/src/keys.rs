// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::KeyParseError;
use serde::Deserialize;
use std::{borrow::Borrow, cmp::Ordering, collections::HashMap, fmt, str::FromStr};
use test_variants_metadata::{TestVariant, TestVariantStatus};

/// A property of a test variant that views can sort or group by.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum PropKey {
    /// The aggregate status. Compared by severity, not by name.
    Status,

    /// The display name: the metadata name if set, otherwise the test ID.
    Name,

    /// The value of a variant parameter. Missing parameters read as empty.
    Variant(String),
}

impl PropKey {
    const VARIANT_PREFIX: &'static str = "v.";

    /// Parses a property key.
    ///
    /// `v.<key>` (with a case-insensitive prefix) selects a variant parameter;
    /// the rest of the input is used as the parameter key verbatim. Otherwise
    /// the key is matched case-insensitively against the built-in properties.
    pub fn parse(input: &str) -> Result<Self, KeyParseError> {
        if input.is_empty() {
            return Err(KeyParseError::EmptyKey);
        }

        let prefix_len = Self::VARIANT_PREFIX.len();
        if input
            .get(..prefix_len)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(Self::VARIANT_PREFIX))
        {
            let variant_key = &input[prefix_len..];
            if variant_key.is_empty() {
                return Err(KeyParseError::EmptyVariantKey {
                    input: input.to_owned(),
                });
            }
            return Ok(Self::Variant(variant_key.to_owned()));
        }

        match input.to_ascii_lowercase().as_str() {
            "status" => Ok(Self::Status),
            "name" => Ok(Self::Name),
            _ => Err(KeyParseError::UnknownKey {
                input: input.to_owned(),
            }),
        }
    }

    /// Reads this property from a test variant.
    pub fn value<'a>(&self, variant: &'a TestVariant) -> PropValue<'a> {
        match self {
            Self::Status => PropValue::Status(variant.status),
            Self::Name => PropValue::Text(variant.display_name()),
            Self::Variant(key) => PropValue::Text(variant.variant_value(key).unwrap_or("")),
        }
    }

    /// Compares two test variants by this property.
    pub fn compare(&self, a: &TestVariant, b: &TestVariant) -> Ordering {
        self.value(a).cmp(&self.value(b))
    }
}

impl FromStr for PropKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status => write!(f, "status"),
            Self::Name => write!(f, "name"),
            Self::Variant(key) => write!(f, "{}{key}", Self::VARIANT_PREFIX),
        }
    }
}

/// The value of a [`PropKey`] for one test variant.
///
/// Two values read with the same key are always the same variant of this
/// enum, so the derived ordering compares statuses by severity and text
/// byte-wise.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum PropValue<'a> {
    /// A status.
    Status(TestVariantStatus),
    /// A text value.
    Text(&'a str),
}

impl fmt::Display for PropValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "{status}"),
            Self::Text(text) => write!(f, "{text}"),
        }
    }
}

/// A single sort key: a property and a direction.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SortKey {
    /// The property to sort by.
    pub prop: PropKey,
    /// Whether to sort in descending order.
    pub descending: bool,
}

impl SortKey {
    /// Parses a sort key of the form `[-]<property key>`.
    pub fn parse(input: &str) -> Result<Self, KeyParseError> {
        match input.strip_prefix('-') {
            Some(rest) => Ok(Self {
                prop: PropKey::parse(rest)?,
                descending: true,
            }),
            None => Ok(Self {
                prop: PropKey::parse(input)?,
                descending: false,
            }),
        }
    }

    /// Compares two test variants by this key, taking the direction into
    /// account.
    pub fn compare(&self, a: &TestVariant, b: &TestVariant) -> Ordering {
        let ordering = self.prop.compare(a, b);
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

impl FromStr for SortKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "-")?;
        }
        write!(f, "{}", self.prop)
    }
}

/// An ordered list of sort keys.
///
/// Ties on one key are broken by the next. If every key ties, the two test
/// variants compare equal, and a stable sort keeps them in arrival order.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(try_from = "Vec<String>")]
pub struct SortingKeys {
    keys: Vec<SortKey>,
}

impl SortingKeys {
    /// Creates sorting keys from already-parsed keys.
    pub fn new(keys: impl IntoIterator<Item = SortKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Parses a list of sort keys.
    pub fn parse<I, S>(keys: I) -> Result<Self, KeyParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = keys
            .into_iter()
            .map(|key| SortKey::parse(key.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(Self { keys })
    }

    /// Parses a comma-separated list of sort keys, such as `-status,v.os,name`.
    ///
    /// Empty segments are skipped.
    pub fn parse_comma_separated(input: &str) -> Result<Self, KeyParseError> {
        Self::parse(input.split(',').filter(|key| !key.is_empty()))
    }

    /// Returns the default sorting keys for a presentation with the given
    /// columns: status first, then each column, then the name.
    pub fn default_for_columns(columns: &[PropKey]) -> Self {
        let keys = std::iter::once(PropKey::Status)
            .chain(columns.iter().cloned())
            .chain(std::iter::once(PropKey::Name))
            .map(|prop| SortKey {
                prop,
                descending: false,
            })
            .collect();
        Self { keys }
    }

    /// Returns true if there are no keys, in which case all test variants
    /// compare equal.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterates over the keys in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &SortKey> {
        self.keys.iter()
    }

    /// Compares two test variants.
    pub fn compare(&self, a: &TestVariant, b: &TestVariant) -> Ordering {
        self.keys
            .iter()
            .map(|key| key.compare(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    /// Stable-sorts a slice of test variants by these keys.
    pub fn sort<T: Borrow<TestVariant>>(&self, items: &mut [T]) {
        if self.is_empty() {
            return;
        }
        items.sort_by(|a, b| self.compare(a.borrow(), b.borrow()));
    }
}

impl TryFrom<Vec<String>> for SortingKeys {
    type Error = KeyParseError;

    fn try_from(keys: Vec<String>) -> Result<Self, Self::Error> {
        Self::parse(keys)
    }
}

impl fmt::Display for SortingKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, key) in self.keys.iter().enumerate() {
            if index > 0 {
                write!(f, ",")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}

/// An ordered list of group keys.
///
/// Grouping is a multi-level partition: the first key splits the input into
/// groups, then each of those groups is split again by the second key, and
/// so on. Groups appear in the order their first member appeared in the
/// input.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(try_from = "Vec<String>")]
pub struct GroupingKeys {
    keys: Vec<PropKey>,
}

impl GroupingKeys {
    /// Creates grouping keys from already-parsed keys.
    pub fn new(keys: impl IntoIterator<Item = PropKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Parses a list of group keys.
    pub fn parse<I, S>(keys: I) -> Result<Self, KeyParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = keys
            .into_iter()
            .map(|key| PropKey::parse(key.as_ref()))
            .collect::<Result<_, _>>()?;
        Ok(Self { keys })
    }

    /// Parses a comma-separated list of group keys. Empty segments are
    /// skipped.
    pub fn parse_comma_separated(input: &str) -> Result<Self, KeyParseError> {
        Self::parse(input.split(',').filter(|key| !key.is_empty()))
    }

    /// The default grouping: by status.
    pub fn default_by_status() -> Self {
        Self {
            keys: vec![PropKey::Status],
        }
    }

    /// Returns true if there are no keys.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterates over the keys in the order they're applied.
    pub fn iter(&self) -> impl Iterator<Item = &PropKey> {
        self.keys.iter()
    }

    /// Partitions `items` by each key in turn.
    ///
    /// Returns no groups for empty input, and a single group containing
    /// everything if there are no keys.
    pub fn partition<T: Borrow<TestVariant>>(&self, items: Vec<T>) -> Vec<Vec<T>> {
        if items.is_empty() {
            return Vec::new();
        }

        let mut groups = vec![items];
        for key in &self.keys {
            groups = groups
                .into_iter()
                .flat_map(|group| split_group(key, group))
                .collect();
        }
        groups
    }
}

impl TryFrom<Vec<String>> for GroupingKeys {
    type Error = KeyParseError;

    fn try_from(keys: Vec<String>) -> Result<Self, Self::Error> {
        Self::parse(keys)
    }
}

fn split_group<T: Borrow<TestVariant>>(key: &PropKey, group: Vec<T>) -> Vec<Vec<T>> {
    // Slot indexes are handed out in order of first appearance.
    let slots: Vec<usize> = {
        let mut slot_for_value = HashMap::new();
        group
            .iter()
            .map(|item| {
                let next_slot = slot_for_value.len();
                *slot_for_value
                    .entry(key.value(item.borrow()))
                    .or_insert(next_slot)
            })
            .collect()
    };

    let slot_count = slots.iter().max().map_or(0, |max| max + 1);
    let mut out: Vec<Vec<T>> = (0..slot_count).map(|_| Vec::new()).collect();
    for (item, slot) in group.into_iter().zip(slots) {
        out[slot].push(item);
    }
    out
}
