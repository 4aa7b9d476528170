// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::TestVariantStatusParseError;
use serde::{Deserialize, Deserializer, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// The aggregate status of a test variant.
///
/// Variants are declared in severity order, and the derived `Ord` follows it:
/// the query endpoint returns test variants sorted by this order, and sorting
/// by status compares positions in it rather than the wire names.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[cfg_attr(feature = "proptest1", derive(test_strategy::Arbitrary))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestVariantStatus {
    /// The status was not set, or the endpoint returned a status this crate
    /// does not know about.
    #[default]
    #[serde(rename = "TEST_VARIANT_STATUS_UNSPECIFIED")]
    Unspecified,

    /// All results of the test variant were unexpected.
    Unexpected,

    /// All results of the test variant were unexpectedly skipped.
    UnexpectedlySkipped,

    /// The test variant has both expected and unexpected results.
    Flaky,

    /// The test variant has unexpected results, but was exonerated.
    Exonerated,

    /// All results of the test variant were expected.
    Expected,
}

impl TestVariantStatus {
    /// All statuses, in severity order.
    pub const ALL: [Self; 6] = [
        Self::Unspecified,
        Self::Unexpected,
        Self::UnexpectedlySkipped,
        Self::Flaky,
        Self::Exonerated,
        Self::Expected,
    ];

    /// Returns the name of this status as used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "TEST_VARIANT_STATUS_UNSPECIFIED",
            Self::Unexpected => "UNEXPECTED",
            Self::UnexpectedlySkipped => "UNEXPECTEDLY_SKIPPED",
            Self::Flaky => "FLAKY",
            Self::Exonerated => "EXONERATED",
            Self::Expected => "EXPECTED",
        }
    }

    /// Returns true if test variants with this status are shown among the
    /// non-expected test variants.
    pub fn is_non_expected(self) -> bool {
        matches!(
            self,
            Self::Unexpected | Self::UnexpectedlySkipped | Self::Flaky | Self::Exonerated
        )
    }

    /// Returns the known status names, for use in error messages.
    pub fn variants() -> impl Iterator<Item = &'static str> {
        Self::ALL.into_iter().map(Self::as_str)
    }
}

impl fmt::Display for TestVariantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestVariantStatus {
    type Err = TestVariantStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TestVariantStatusParseError::new(s))
    }
}

// Unknown statuses deserialize to `Unspecified`. `#[serde(other)]` only works
// on the last variant, and `Unspecified` has to come first for `Ord`.
impl<'de> Deserialize<'de> for TestVariantStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or_default())
    }
}

/// The status of an individual test result.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    /// The test passed.
    Pass,
    /// The test failed.
    Fail,
    /// The test binary crashed.
    Crash,
    /// The test was aborted, for example due to a timeout.
    Abort,
    /// The test was skipped.
    Skip,
    /// The status was not set or is not known.
    #[default]
    #[serde(other)]
    StatusUnspecified,
}

/// A set of key-value pairs identifying one configuration of a test.
///
/// Keys are unique and iterate in sorted order.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Variant {
    /// The key-value pairs.
    #[serde(default)]
    pub def: BTreeMap<String, String>,
}

/// A key-value tag attached to a test result.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Tag {
    /// The tag key.
    pub key: String,
    /// The tag value.
    pub value: String,
}

/// A single execution of a test variant.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// Resource name of the result.
    #[serde(default)]
    pub name: String,
    /// The test identifier.
    #[serde(default)]
    pub test_id: String,
    /// Identifies the result within its test variant.
    #[serde(default)]
    pub result_id: String,
    /// The variant the result was produced for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    /// Whether the result was expected.
    #[serde(default)]
    pub expected: bool,
    /// The outcome of the execution.
    #[serde(default)]
    pub status: TestStatus,
    /// A human-readable HTML summary.
    #[serde(default)]
    pub summary_html: String,
    /// The time the execution started, as an RFC 3339 timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    /// The duration of the execution, in the JSON form of a protobuf
    /// `Duration` (for example `"1.500s"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    /// Tags attached to the result.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

/// Wrapper around a [`TestResult`], as the endpoint returns it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TestResultBundle {
    /// The result.
    pub result: TestResult,
}

/// A waiver that stops a failing test variant from counting against the
/// health of a build.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestExoneration {
    /// Resource name of the exoneration.
    #[serde(default)]
    pub name: String,
    /// The exonerated test.
    #[serde(default)]
    pub test_id: String,
    /// The exonerated variant, if the exoneration is variant-specific.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    /// Identifies the exoneration.
    #[serde(default)]
    pub exoneration_id: String,
    /// HTML explaining why the test was exonerated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation_html: Option<String>,
}

/// The location of a test's source code.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestLocation {
    /// The repository containing the test.
    #[serde(default)]
    pub repo: String,
    /// The file name, relative to the repository root.
    #[serde(default)]
    pub file_name: String,
    /// The line number, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Display metadata for a test.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestMetadata {
    /// A human-readable name for the test.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Where the test is defined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<TestLocation>,
}

/// A test identifier together with one parameterization of it, and the
/// results recorded for that pair.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestVariant {
    /// The test identifier.
    pub test_id: String,
    /// The variant parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    /// A hash of the variant parameters.
    #[serde(default)]
    pub variant_hash: String,
    /// The aggregate status.
    #[serde(default)]
    pub status: TestVariantStatus,
    /// Individual results, in the order the endpoint returned them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<TestResultBundle>,
    /// Exonerations that apply to this test variant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exonerations: Vec<TestExoneration>,
    /// Display metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_metadata: Option<TestMetadata>,
}

impl TestVariant {
    /// Returns the name to show for this test variant: the metadata name if
    /// one is set, otherwise the test identifier.
    pub fn display_name(&self) -> &str {
        self.test_metadata
            .as_ref()
            .and_then(|metadata| metadata.name.as_deref())
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.test_id)
    }

    /// Looks up a variant parameter.
    pub fn variant_value(&self, key: &str) -> Option<&str> {
        self.variant
            .as_ref()
            .and_then(|variant| variant.def.get(key))
            .map(String::as_str)
    }

    /// Returns true if all results of this test variant were expected.
    pub fn is_expected(&self) -> bool {
        self.status == TestVariantStatus::Expected
    }
}
