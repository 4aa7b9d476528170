// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Utilities for pluralizing various words based on count.
pub(crate) mod plural {
    /// Returns "page" if `count` is 1, otherwise "pages".
    pub(crate) fn pages_str(count: usize) -> &'static str {
        if count == 1 { "page" } else { "pages" }
    }

    /// Returns "test variant" if `count` is 1, otherwise "test variants".
    pub(crate) fn test_variants_str(count: usize) -> &'static str {
        if count == 1 {
            "test variant"
        } else {
            "test variants"
        }
    }

    /// Returns "column" if `count` is 1, otherwise "columns".
    pub(crate) fn columns_str(count: usize) -> &'static str {
        if count == 1 { "column" } else { "columns" }
    }
}
