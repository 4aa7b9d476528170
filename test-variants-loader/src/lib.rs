// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Incremental loading of test variants for result views.
//!
//! The main entry point is [`TestLoader`](loader::TestLoader). It pages
//! through a [`QueryTestVariants`](service::QueryTestVariants) endpoint one
//! request at a time, sorts each test variant into a bucket for its status,
//! and tracks how much of each bucket is known to be fully loaded.

pub mod config;
pub mod errors;
mod helpers;
pub mod loader;
pub mod service;
