// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test variant loader and its loading stages.

mod buckets;
mod imp;
mod progress;
mod stage;
mod view;

pub use imp::*;
pub use progress::*;
pub use stage::*;
pub use view::TestVariantFilter;
