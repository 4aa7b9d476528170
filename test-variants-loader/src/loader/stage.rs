// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;
use test_variants_metadata::TestVariantStatus;

// Note: the order here matters -- a later stage means every bucket for an
// earlier stage is complete.
/// How far into the status-ordered stream of test variants the loader has
/// progressed.
///
/// While the stage is `LoadingX`, the next test variant to arrive will have a
/// status no worse than `X`.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(test, derive(test_strategy::Arbitrary))]
pub enum LoadingStage {
    /// Unexpected test variants may still arrive.
    #[default]
    LoadingUnexpected,

    /// All unexpected test variants have arrived.
    LoadingUnexpectedlySkipped,

    /// All unexpectedly skipped test variants have arrived.
    LoadingFlaky,

    /// All flaky test variants have arrived.
    LoadingExonerated,

    /// Only expected test variants remain.
    LoadingExpected,

    /// Every page has been loaded.
    Done,
}

impl LoadingStage {
    /// Returns the stage the loader is in while test variants of `status` are
    /// arriving.
    ///
    /// Unspecified statuses sort with unexpected ones.
    pub fn for_status(status: TestVariantStatus) -> Self {
        match status {
            TestVariantStatus::Unspecified | TestVariantStatus::Unexpected => {
                Self::LoadingUnexpected
            }
            TestVariantStatus::UnexpectedlySkipped => Self::LoadingUnexpectedlySkipped,
            TestVariantStatus::Flaky => Self::LoadingFlaky,
            TestVariantStatus::Exonerated => Self::LoadingExonerated,
            TestVariantStatus::Expected => Self::LoadingExpected,
        }
    }

    /// Returns true if every test variant with `status` has been loaded.
    ///
    /// This is the case once the loader has moved past the stage for
    /// `status`.
    pub fn has_loaded_all(self, status: TestVariantStatus) -> bool {
        self > Self::for_status(status)
    }

    /// Returns true if every page has been loaded.
    pub fn is_done(self) -> bool {
        self == Self::Done
    }

    /// Advances to `other` if it's a later stage. Stages never move
    /// backwards.
    pub(crate) fn advance_to(&mut self, other: Self) {
        *self = (*self).max(other);
    }

    pub(crate) fn to_static_str(self) -> &'static str {
        match self {
            Self::LoadingUnexpected => "loading unexpected",
            Self::LoadingUnexpectedlySkipped => "loading unexpectedly skipped",
            Self::LoadingFlaky => "loading flaky",
            Self::LoadingExonerated => "loading exonerated",
            Self::LoadingExpected => "loading expected",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for LoadingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_static_str())
    }
}
