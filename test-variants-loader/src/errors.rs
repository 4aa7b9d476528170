// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the test variant loader.

use camino::Utf8PathBuf;
use config::ConfigError;
use std::{error, fmt, time::Duration};
use test_variants_filtering::errors::KeyParseError;
use test_variants_metadata::QueryTestVariantsRequest;
use thiserror::Error;

/// An error that occurred while loading a page of test variants.
///
/// The loader's state is unchanged by a failed page load: the page cursor is
/// not advanced, so calling
/// [`load_next_test_variants`](crate::loader::TestLoader::load_next_test_variants)
/// again retries the same page.
#[derive(Debug, Error)]
#[error("error when loading test variants (page token `{}`)", .request.page_token)]
pub struct LoadTestVariantsError {
    request: QueryTestVariantsRequest,
    #[source]
    kind: LoadTestVariantsErrorKind,
}

impl LoadTestVariantsError {
    pub(crate) fn new(request: QueryTestVariantsRequest, kind: LoadTestVariantsErrorKind) -> Self {
        Self { request, kind }
    }

    /// Returns the request that failed.
    pub fn request(&self) -> &QueryTestVariantsRequest {
        &self.request
    }

    /// Returns the reason the request failed.
    pub fn kind(&self) -> &LoadTestVariantsErrorKind {
        &self.kind
    }
}

/// The reason a page load failed.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadTestVariantsErrorKind {
    /// The query service returned an error.
    #[error("query service returned an error")]
    Service(#[source] Box<dyn error::Error + Send + Sync>),

    /// The query service didn't respond within the configured timeout.
    #[error("query service did not respond within {}", humantime::format_duration(*.timeout))]
    TimedOut {
        /// The timeout that elapsed.
        timeout: Duration,
    },
}

/// An error that occurred while reading loader configuration.
#[derive(Debug, Error)]
#[error("failed to parse loader config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file that failed to parse.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of [`ConfigParseError`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// The config sources could not be combined.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// A value in the config had the wrong shape.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// The page size was zero.
    #[error("`loader.page-size` must be greater than zero")]
    ZeroPageSize,

    /// A sort, group or column key was not recognized.
    #[error("invalid key in `view.{section}`")]
    InvalidKey {
        /// The config key the invalid entry was found under.
        section: &'static str,

        /// The underlying error.
        #[source]
        err: KeyParseError,
    },
}

/// Displays an error along with the chain of errors that caused it.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E> fmt::Display for DisplayErrorChain<E>
where
    E: error::Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut source = self.error.source();
        while let Some(err) = source {
            write!(f, "\n  caused by: {err}")?;
            source = err.source();
        }

        Ok(())
    }
}
