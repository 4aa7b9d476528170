// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{TestVariant, TestVariantStatus};
use serde::{Deserialize, Serialize};

/// The page size the endpoint uses when a request doesn't specify one.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Returns the resource name of an invocation.
pub fn invocation_name(invocation_id: &str) -> String {
    format!("invocations/{invocation_id}")
}

/// Restricts the test variants returned by the endpoint.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestVariantPredicate {
    /// Only return test variants with this status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TestVariantStatus>,
}

/// A request for one page of test variants.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTestVariantsRequest {
    /// Resource names of the invocations to query.
    pub invocations: Vec<String>,

    /// An optional predicate, fixed for all pages of one query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<TestVariantPredicate>,

    /// The maximum number of test variants to return. The endpoint uses
    /// [`DEFAULT_PAGE_SIZE`] if this is unset or zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,

    /// The continuation token. Empty for the first page.
    #[serde(default)]
    pub page_token: String,
}

impl QueryTestVariantsRequest {
    /// Creates a request for the first page of test variants in the given
    /// invocations.
    pub fn new(invocations: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            invocations: invocations.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Returns the page size the endpoint will use for this request.
    ///
    /// Zero is the protobuf default for an unset field, so it means the same
    /// as `None`.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size
            .filter(|&page_size| page_size != 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    /// Returns a copy of this request that fetches the page at `page_token`.
    pub fn with_page_token(&self, page_token: impl Into<String>) -> Self {
        Self {
            page_token: page_token.into(),
            ..self.clone()
        }
    }
}

/// One page of test variants.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryTestVariantsResponse {
    /// The test variants, ordered by status and then by test ID.
    #[serde(default)]
    pub test_variants: Vec<TestVariant>,

    /// The token for the next page. Absent on the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl QueryTestVariantsResponse {
    /// Returns the token for the next page, or `None` if this is the last
    /// page.
    ///
    /// An empty token is treated the same as an absent one, since the JSON
    /// form of the response omits empty strings.
    pub fn next_page_token(&self) -> Option<&str> {
        self.next_page_token
            .as_deref()
            .filter(|token| !token.is_empty())
    }
}
