// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::LoadingStage;
use crate::helpers::plural;
use std::sync::Arc;
use test_variants_metadata::{TestVariant, TestVariantStatus};
use tracing::debug;

/// Everything the loader has received so far, sorted into buckets by status.
///
/// Buckets are append-only and keep arrival order. A test variant lives in
/// exactly one status bucket, and non-expected test variants are also
/// recorded in `non_expected`.
#[derive(Clone, Debug, Default)]
pub(super) struct LoaderState {
    stage: LoadingStage,
    // Includes test variants with an unspecified status, which aren't stored.
    unfiltered_count: usize,
    unexpected: Vec<Arc<TestVariant>>,
    unexpectedly_skipped: Vec<Arc<TestVariant>>,
    flaky: Vec<Arc<TestVariant>>,
    exonerated: Vec<Arc<TestVariant>>,
    expected: Vec<Arc<TestVariant>>,
    non_expected: Vec<Arc<TestVariant>>,
}

impl LoaderState {
    pub(super) fn stage(&self) -> LoadingStage {
        self.stage
    }

    pub(super) fn unfiltered_count(&self) -> usize {
        self.unfiltered_count
    }

    /// Returns the bucket for `status`. Test variants with an unspecified
    /// status aren't stored, so that bucket is always empty.
    pub(super) fn bucket(&self, status: TestVariantStatus) -> &[Arc<TestVariant>] {
        match status {
            TestVariantStatus::Unspecified => &[],
            TestVariantStatus::Unexpected => &self.unexpected,
            TestVariantStatus::UnexpectedlySkipped => &self.unexpectedly_skipped,
            TestVariantStatus::Flaky => &self.flaky,
            TestVariantStatus::Exonerated => &self.exonerated,
            TestVariantStatus::Expected => &self.expected,
        }
    }

    pub(super) fn non_expected(&self) -> &[Arc<TestVariant>] {
        &self.non_expected
    }

    /// Iterates over the status buckets, excluding `non_expected`.
    pub(super) fn status_buckets(&self) -> impl Iterator<Item = &[Arc<TestVariant>]> {
        [
            &self.unexpected,
            &self.unexpectedly_skipped,
            &self.flaky,
            &self.exonerated,
            &self.expected,
        ]
        .into_iter()
        .map(Vec::as_slice)
    }

    pub(super) fn first_page_loaded(&self) -> bool {
        !self.unexpected.is_empty() || self.stage.has_loaded_all(TestVariantStatus::Unexpected)
    }

    pub(super) fn first_page_is_empty(&self) -> bool {
        self.stage.has_loaded_all(TestVariantStatus::Unexpected) && self.non_expected.is_empty()
    }

    /// Applies a page of test variants.
    ///
    /// `has_next_page` is false once the endpoint stops returning a
    /// continuation token. `page_size` is the number of test variants that was
    /// requested.
    pub(super) fn apply_page(
        &mut self,
        test_variants: Vec<TestVariant>,
        has_next_page: bool,
        page_size: u32,
    ) {
        let received = test_variants.len();
        self.process_test_variants(test_variants);

        if !has_next_page {
            debug!(
                "received final page ({received} {}), all test variants loaded",
                plural::test_variants_str(received),
            );
            self.stage = LoadingStage::Done;
            return;
        }

        // A short page followed by more pages only happens at the boundary
        // where the endpoint switches to serving expected test variants.
        if u32::try_from(received).is_ok_and(|received| received < page_size) {
            debug!(
                "received short page ({received} of {page_size} {}), \
                 only expected test variants remain",
                plural::test_variants_str(page_size as usize),
            );
            self.stage.advance_to(LoadingStage::LoadingExpected);
            return;
        }

        debug!(
            "received page ({received} {}), stage is now {}",
            plural::test_variants_str(received),
            self.stage,
        );
    }

    fn process_test_variants(&mut self, test_variants: Vec<TestVariant>) {
        self.unfiltered_count += test_variants.len();
        for test_variant in test_variants {
            let status = test_variant.status;
            let test_variant = Arc::new(test_variant);
            let bucket = match status {
                TestVariantStatus::Unspecified => {
                    debug!(
                        test_id = %test_variant.test_id,
                        "skipping test variant with unspecified status",
                    );
                    continue;
                }
                TestVariantStatus::Unexpected => &mut self.unexpected,
                TestVariantStatus::UnexpectedlySkipped => &mut self.unexpectedly_skipped,
                TestVariantStatus::Flaky => &mut self.flaky,
                TestVariantStatus::Exonerated => &mut self.exonerated,
                TestVariantStatus::Expected => &mut self.expected,
            };

            if status.is_non_expected() {
                self.non_expected.push(Arc::clone(&test_variant));
            }
            bucket.push(test_variant);
            self.stage.advance_to(LoadingStage::for_status(status));
        }
    }
}
