// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::config::LoaderConfig;
use debug_ignore::DebugIgnore;
use std::sync::Arc;
use test_variants_filtering::{GroupingKeys, SearchQuery, SortingKeys};
use test_variants_metadata::TestVariant;

/// A predicate deciding which test variants are visible.
pub type TestVariantFilter = Arc<dyn Fn(&TestVariant) -> bool + Send + Sync>;

/// How loaded test variants are presented: which are visible, how they're
/// grouped and how each group is ordered.
///
/// Changing the view never refetches; it applies on the next read.
#[derive(Clone, Debug)]
pub(super) struct ViewConfig {
    filter: DebugIgnore<Option<TestVariantFilter>>,
    search_query: Option<SearchQuery>,
    sorting_keys: SortingKeys,
    grouping_keys: GroupingKeys,
}

impl ViewConfig {
    pub(super) fn new(config: &LoaderConfig) -> Self {
        Self {
            filter: DebugIgnore(None),
            search_query: None,
            sorting_keys: config.sorting_keys(),
            grouping_keys: config.grouping_keys(),
        }
    }

    pub(super) fn set_filter(&mut self, filter: TestVariantFilter) {
        self.filter = DebugIgnore(Some(filter));
        self.search_query = None;
    }

    pub(super) fn set_search_query(&mut self, query: SearchQuery) {
        self.filter = DebugIgnore(None);
        self.search_query = (!query.is_empty()).then_some(query);
    }

    pub(super) fn clear_filter(&mut self) {
        self.filter = DebugIgnore(None);
        self.search_query = None;
    }

    pub(super) fn search_query(&self) -> Option<&SearchQuery> {
        self.search_query.as_ref()
    }

    pub(super) fn sorting_keys(&self) -> &SortingKeys {
        &self.sorting_keys
    }

    pub(super) fn set_sorting_keys(&mut self, sorting_keys: SortingKeys) {
        self.sorting_keys = sorting_keys;
    }

    pub(super) fn grouping_keys(&self) -> &GroupingKeys {
        &self.grouping_keys
    }

    pub(super) fn set_grouping_keys(&mut self, grouping_keys: GroupingKeys) {
        self.grouping_keys = grouping_keys;
    }

    pub(super) fn is_visible(&self, test_variant: &TestVariant) -> bool {
        if let Some(filter) = &*self.filter {
            return filter(test_variant);
        }
        match &self.search_query {
            Some(query) => query.matches(test_variant),
            None => true,
        }
    }

    pub(super) fn filtered(&self, bucket: &[Arc<TestVariant>]) -> Vec<Arc<TestVariant>> {
        bucket
            .iter()
            .filter(|test_variant| self.is_visible(test_variant))
            .cloned()
            .collect()
    }

    pub(super) fn count_visible(&self, bucket: &[Arc<TestVariant>]) -> usize {
        bucket
            .iter()
            .filter(|test_variant| self.is_visible(test_variant))
            .count()
    }

    pub(super) fn sorted(&self, bucket: &[Arc<TestVariant>]) -> Vec<Arc<TestVariant>> {
        let mut visible = self.filtered(bucket);
        self.sorting_keys.sort(&mut visible);
        visible
    }

    /// Partitions the visible test variants in `bucket` by the grouping keys,
    /// then sorts each group.
    pub(super) fn grouped(&self, bucket: &[Arc<TestVariant>]) -> Vec<Vec<Arc<TestVariant>>> {
        let mut groups = self.grouping_keys.partition(self.filtered(bucket));
        for group in &mut groups {
            self.sorting_keys.sort(group);
        }
        groups
    }
}
