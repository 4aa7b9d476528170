// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::TestVariantStatus;
use std::{error, fmt};

/// An error that occurs while parsing a [`TestVariantStatus`] from a string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestVariantStatusParseError {
    input: String,
}

impl TestVariantStatusParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }

    /// Returns the input that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl fmt::Display for TestVariantStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unrecognized test variant status: {}\n(known values: ", self.input)?;
        for (index, name) in TestVariantStatus::variants().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            f.write_str(name)?;
        }
        f.write_str(")")
    }
}

impl error::Error for TestVariantStatusParseError {}
