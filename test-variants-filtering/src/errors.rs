// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced while parsing keys and search queries.

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// An error that occurs while parsing a sort or group key.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum KeyParseError {
    /// The key was empty.
    #[error("empty property key")]
    EmptyKey,

    /// A variant key (`v.<key>`) had nothing after the prefix.
    #[error("variant property key `{input}` does not name a variant key")]
    EmptyVariantKey {
        /// The input that failed to parse.
        input: String,
    },

    /// The key isn't a known property.
    #[error(
        "unknown property key `{input}`\n\
         (known keys: status, name, v.<variant key>)"
    )]
    UnknownKey {
        /// The input that failed to parse.
        input: String,
    },
}

/// Errors returned while parsing a search query.
#[derive(Clone, Debug, Error)]
#[error("failed to parse search query `{input}`")]
#[non_exhaustive]
pub struct SearchQueryParseErrors {
    /// The input string.
    pub input: String,

    /// The individual parse errors, in the order they appear in the input.
    pub errors: Vec<ParseSingleError>,
}

impl SearchQueryParseErrors {
    pub(crate) fn new(input: impl Into<String>, errors: Vec<ParseSingleError>) -> Self {
        Self {
            input: input.into(),
            errors,
        }
    }
}

/// A single error within a search query.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseSingleError {
    /// A `-` wasn't followed by a term.
    #[error("expected search term")]
    ExpectedTerm(#[label("missing term after '-'")] SourceSpan),

    /// A prefix such as `ID:` wasn't followed by a value.
    #[error("expected value for `{prefix}:`")]
    ExpectedValue {
        /// The prefix, as written.
        prefix: String,

        /// The location of the term.
        #[label("missing value")]
        span: SourceSpan,
    },

    /// A `STATUS:` term named an unknown status.
    #[error("unknown test variant status `{name}`")]
    UnknownStatus {
        /// The status name, as written.
        name: String,

        /// The location of the status name.
        #[label("unknown status")]
        span: SourceSpan,
    },

    /// A `V:` term had an empty variant key.
    #[error("expected variant key")]
    ExpectedVariantKey(#[label("missing variant key")] SourceSpan),

    /// An error that couldn't be attributed to a location.
    #[error("unknown parsing error")]
    Unknown,
}
