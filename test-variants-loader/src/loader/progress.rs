// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::LoadingStage;
use test_variants_metadata::TestVariantStatus;

/// A snapshot of a loader's progress, published whenever it changes.
///
/// Obtained through [`TestLoader::subscribe`](super::TestLoader::subscribe).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LoadProgress {
    /// The current loading stage.
    pub stage: LoadingStage,

    /// True while a load is queued or running and there are more pages to
    /// load.
    pub is_loading: bool,

    /// True once a load has been requested.
    pub first_request_sent: bool,

    /// The number of test variants received, regardless of filter or status.
    pub unfiltered_test_variant_count: usize,
}

impl LoadProgress {
    /// Returns true if every page has been loaded.
    pub fn loaded_all_variants(&self) -> bool {
        self.stage.is_done()
    }

    /// Returns true if every test variant with `status` has been loaded.
    pub fn loaded_all(&self, status: TestVariantStatus) -> bool {
        self.stage.has_loaded_all(status)
    }
}
