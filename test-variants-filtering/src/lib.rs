// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing for the keys and queries used to present test variants.
//!
//! Keys are parsed once, when a view is configured, into [`PropKey`],
//! [`SortingKeys`] and [`GroupingKeys`]. Comparisons and partitions then run
//! against the parsed form without looking at key strings again.

pub mod errors;
mod keys;
mod parsing;
mod search;

pub use keys::{GroupingKeys, PropKey, PropValue, SortKey, SortingKeys};
pub use search::{SearchMatcher, SearchQuery, SearchTerm};
