// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{errors::SearchQueryParseErrors, parsing::parse_terms};
use std::collections::BTreeSet;
use test_variants_metadata::{TestVariant, TestVariantStatus};

/// Matches one property of a test variant.
///
/// Text matchers store their needle lowercased and match case-insensitively.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SearchMatcher {
    /// `ID:<text>`: the test ID contains the text.
    TestId(String),

    /// `NAME:<text>`: the display name contains the text.
    Name(String),

    /// `STATUS:<a>,<b>`: the status is one of the listed statuses.
    Status(BTreeSet<TestVariantStatus>),

    /// `V:<key>=<value>` or `V:<key>`: the variant parameter equals the value,
    /// or is present if no value is given.
    Variant {
        /// The variant key.
        key: String,
        /// The value to match exactly.
        value: Option<String>,
    },

    /// Free text: the test ID or the display name contains the text.
    Text(String),
}

impl SearchMatcher {
    fn is_match(&self, variant: &TestVariant) -> bool {
        match self {
            Self::TestId(needle) => contains_ignore_case(&variant.test_id, needle),
            Self::Name(needle) => contains_ignore_case(variant.display_name(), needle),
            Self::Status(statuses) => statuses.contains(&variant.status),
            Self::Variant { key, value } => match (variant.variant_value(key), value) {
                (Some(actual), Some(expected)) => actual == expected,
                (Some(_), None) => true,
                (None, _) => false,
            },
            Self::Text(needle) => {
                contains_ignore_case(&variant.test_id, needle)
                    || contains_ignore_case(variant.display_name(), needle)
            }
        }
    }
}

fn contains_ignore_case(haystack: &str, lowercase_needle: &str) -> bool {
    haystack.to_lowercase().contains(lowercase_needle)
}

/// A single term of a search query.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SearchTerm {
    /// Whether the term was prefixed with `-`.
    pub negated: bool,
    /// What the term matches.
    pub matcher: SearchMatcher,
}

impl SearchTerm {
    /// Returns true if the test variant satisfies this term.
    pub fn is_match(&self, variant: &TestVariant) -> bool {
        self.matcher.is_match(variant) != self.negated
    }
}

/// A parsed search query: a conjunction of [`SearchTerm`]s.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SearchQuery {
    input: String,
    terms: Vec<SearchTerm>,
}

impl SearchQuery {
    /// Parses a search query.
    ///
    /// All errors in the query are reported together.
    pub fn parse(input: &str) -> Result<Self, SearchQueryParseErrors> {
        let terms =
            parse_terms(input).map_err(|errors| SearchQueryParseErrors::new(input, errors))?;
        Ok(Self {
            input: input.to_owned(),
            terms,
        })
    }

    /// Returns the query as it was written.
    pub fn as_str(&self) -> &str {
        &self.input
    }

    /// Returns the parsed terms.
    pub fn terms(&self) -> &[SearchTerm] {
        &self.terms
    }

    /// Returns true if the query has no terms and so matches everything.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Returns true if the test variant satisfies every term.
    pub fn matches(&self, variant: &TestVariant) -> bool {
        self.terms.iter().all(|term| term.is_match(variant))
    }
}
