// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the test variant loader.
//!
//! Configuration is read from an embedded default layered under an optional
//! TOML file. See `default-config.toml` in this crate for the available keys.

mod fetch_timeout;
mod imp;

pub use imp::*;
