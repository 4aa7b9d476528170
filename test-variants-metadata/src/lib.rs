// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to the data returned by the test variant query endpoint.
//!
//! The types in this crate mirror the JSON form of the endpoint's messages:
//! field names are camelCase and enum values are the SCREAMING_SNAKE_CASE
//! names used on the wire.

mod errors;
mod query;
mod test_variant;

pub use errors::*;
pub use query::*;
pub use test_variant::*;
