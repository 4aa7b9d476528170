// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::fetch_timeout::deserialize_fetch_timeout;
use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    helpers::plural,
};
use camino::Utf8Path;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{collections::BTreeSet, num::NonZeroU32, time::Duration};
use test_variants_filtering::{GroupingKeys, PropKey, SortingKeys};
use test_variants_metadata::DEFAULT_PAGE_SIZE;
use tracing::warn;

/// Trait for handling configuration warnings.
///
/// The default implementation logs warnings with `tracing`; tests can collect
/// them instead.
pub trait ConfigWarnings {
    /// Handles unknown configuration keys found in a config file.
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>);
}

/// Logs configuration warnings with `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultConfigWarnings;

impl ConfigWarnings for DefaultConfigWarnings {
    fn unknown_config_keys(&mut self, config_file: &Utf8Path, unknown: &BTreeSet<String>) {
        let unknown_str = if unknown.len() == 1 {
            // Print this on the same line.
            format!("key: {}", unknown.iter().next().map_or("", String::as_str))
        } else {
            let mut keys = String::from("keys:\n");
            for ignored_key in unknown {
                keys.push_str("\n  - ");
                keys.push_str(ignored_key);
            }
            keys
        };

        warn!(
            "in config file {}, ignoring unknown configuration {unknown_str}",
            config_file,
        );
    }
}

/// Settings for a [`TestLoader`](crate::loader::TestLoader).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoaderConfig {
    page_size: NonZeroU32,
    fetch_timeout: Option<Duration>,
    column_keys: Vec<PropKey>,
    sorting_keys: SortingKeys,
    grouping_keys: GroupingKeys,
}

impl LoaderConfig {
    /// The default location of the config file, relative to the directory
    /// passed into [`Self::from_sources`].
    pub const CONFIG_PATH: &'static str = ".config/test-variants.toml";

    /// Contents of the default config, as embedded in this crate.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Reads the config from `dir`, layering it over the embedded defaults.
    ///
    /// If `file` is `None`, the file at [`Self::CONFIG_PATH`] under `dir` is
    /// read if it exists. If `file` is specified, it must exist.
    ///
    /// Unknown keys are logged as warnings.
    pub fn from_sources(
        dir: impl AsRef<Utf8Path>,
        file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        Self::from_sources_with_warnings(dir, file, &mut DefaultConfigWarnings)
    }

    /// Reads the config, reporting unknown keys to `warnings`.
    pub fn from_sources_with_warnings(
        dir: impl AsRef<Utf8Path>,
        file: Option<&Utf8Path>,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = dir.as_ref().join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        Self::read(&builder, &config_file, warnings)
    }

    /// Returns the embedded default config.
    pub fn default_config() -> Self {
        Self::default()
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn read(
        builder: &ConfigBuilder<DefaultState>,
        config_file: &Utf8Path,
        warnings: &mut impl ConfigWarnings,
    ) -> Result<Self, ConfigParseError> {
        let (deserialized, ignored) = Self::build_and_deserialize_config(builder)
            .map_err(|kind| ConfigParseError::new(config_file, kind))?;
        if !ignored.is_empty() {
            warnings.unknown_config_keys(config_file, &ignored);
        }

        let config = deserialized
            .compile()
            .map_err(|kind| ConfigParseError::new(config_file, kind))?;
        tracing::debug!(
            "read loader config from {config_file}: page size {}, {}",
            config.page_size,
            match config.fetch_timeout {
                Some(timeout) => format!("fetch timeout {}", humantime::format_duration(timeout)),
                None => "no fetch timeout".to_owned(),
            },
        );
        Ok(config)
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(LoaderConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: LoaderConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // The config crate also reports the key; drop it so the path
                // only shows up once.
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }

    /// Returns a copy of this config with a different page size.
    pub fn with_page_size(mut self, page_size: NonZeroU32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Returns a copy of this config with a different fetch timeout.
    pub fn with_fetch_timeout(mut self, fetch_timeout: Option<Duration>) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// The number of test variants to request per page.
    pub fn page_size(&self) -> NonZeroU32 {
        self.page_size
    }

    /// How long to wait for a single page, if bounded.
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout
    }

    /// The presentation's variant columns.
    pub fn column_keys(&self) -> &[PropKey] {
        &self.column_keys
    }

    /// The sorting keys, with the default applied if none were configured.
    pub fn sorting_keys(&self) -> SortingKeys {
        if self.sorting_keys.is_empty() {
            SortingKeys::default_for_columns(&self.column_keys)
        } else {
            self.sorting_keys.clone()
        }
    }

    /// The grouping keys, with the default applied if none were configured.
    pub fn grouping_keys(&self) -> GroupingKeys {
        if self.grouping_keys.is_empty() {
            GroupingKeys::default_by_status()
        } else {
            self.grouping_keys.clone()
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            page_size: NonZeroU32::new(DEFAULT_PAGE_SIZE).unwrap_or(NonZeroU32::MIN),
            fetch_timeout: None,
            column_keys: Vec::new(),
            sorting_keys: SortingKeys::default(),
            grouping_keys: GroupingKeys::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct LoaderConfigDeserialize {
    loader: LoaderSectionDeserialize,
    #[serde(default)]
    view: ViewSectionDeserialize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct LoaderSectionDeserialize {
    page_size: u32,
    #[serde(default, deserialize_with = "deserialize_fetch_timeout")]
    fetch_timeout: Option<Duration>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ViewSectionDeserialize {
    #[serde(default)]
    column_keys: Vec<String>,
    #[serde(default)]
    sorting_keys: Vec<String>,
    #[serde(default)]
    grouping_keys: Vec<String>,
}

impl LoaderConfigDeserialize {
    fn compile(self) -> Result<LoaderConfig, ConfigParseErrorKind> {
        let page_size =
            NonZeroU32::new(self.loader.page_size).ok_or(ConfigParseErrorKind::ZeroPageSize)?;

        let column_keys = self
            .view
            .column_keys
            .iter()
            .map(|key| PropKey::parse(key))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| ConfigParseErrorKind::InvalidKey {
                section: "column-keys",
                err,
            })?;
        let sorting_keys = SortingKeys::parse(&self.view.sorting_keys).map_err(|err| {
            ConfigParseErrorKind::InvalidKey {
                section: "sorting-keys",
                err,
            }
        })?;
        let grouping_keys = GroupingKeys::parse(&self.view.grouping_keys).map_err(|err| {
            ConfigParseErrorKind::InvalidKey {
                section: "grouping-keys",
                err,
            }
        })?;

        if !self.view.column_keys.is_empty() {
            tracing::debug!(
                "configured {} {}",
                column_keys.len(),
                plural::columns_str(column_keys.len()),
            );
        }

        Ok(LoaderConfig {
            page_size,
            fetch_timeout: self.loader.fetch_timeout,
            column_keys,
            sorting_keys,
            grouping_keys,
        })
    }
}
