// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The query endpoint consumed by the loader.

use std::{error, future::Future, sync::Arc};
use test_variants_metadata::{QueryTestVariantsRequest, QueryTestVariantsResponse};

/// A service that answers paginated test variant queries.
///
/// Implementations are expected to return test variants ordered by status,
/// from [`Unexpected`](test_variants_metadata::TestVariantStatus::Unexpected)
/// to [`Expected`](test_variants_metadata::TestVariantStatus::Expected),
/// across page boundaries. The loader relies on this ordering to know when a
/// status bucket is complete.
pub trait QueryTestVariants {
    /// The error returned by a failed query.
    type Error: error::Error + Send + Sync + 'static;

    /// Fetches one page of test variants.
    ///
    /// The loader drops the returned future if the caller stops waiting for
    /// it or the fetch times out.
    fn query_test_variants(
        &self,
        request: &QueryTestVariantsRequest,
    ) -> impl Future<Output = Result<QueryTestVariantsResponse, Self::Error>> + Send;
}

impl<T: QueryTestVariants> QueryTestVariants for Arc<T> {
    type Error = T::Error;

    fn query_test_variants(
        &self,
        request: &QueryTestVariantsRequest,
    ) -> impl Future<Output = Result<QueryTestVariantsResponse, Self::Error>> + Send {
        (**self).query_test_variants(request)
    }
}

impl<T: QueryTestVariants> QueryTestVariants for &T {
    type Error = T::Error;

    fn query_test_variants(
        &self,
        request: &QueryTestVariantsRequest,
    ) -> impl Future<Output = Result<QueryTestVariantsResponse, Self::Error>> + Send {
        (**self).query_test_variants(request)
    }
}
