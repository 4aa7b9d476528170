// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    init_tracing,
    mock::{ScriptedService, page_token, variant},
};
use pretty_assertions::assert_eq;
use std::{
    num::NonZeroU32,
    sync::{Arc, Mutex},
    time::Duration,
};
use test_variants_loader::{
    config::LoaderConfig,
    errors::LoadTestVariantsErrorKind,
    loader::{LoadProgress, LoadingStage, TestLoader},
};
use test_variants_metadata::{
    QueryTestVariantsRequest,
    TestVariantStatus::{self, *},
};

fn config_with_page_size(page_size: u32) -> LoaderConfig {
    LoaderConfig::default_config()
        .with_page_size(NonZeroU32::new(page_size).expect("page size is non-zero"))
}

fn one_per_page(statuses: &[TestVariantStatus]) -> Vec<Vec<test_variants_metadata::TestVariant>> {
    statuses
        .iter()
        .enumerate()
        .map(|(index, status)| vec![variant(&format!("test-{index}"), *status)])
        .collect()
}

#[tokio::test]
async fn load_until_flaky_stops_at_first_flaky_page() {
    init_tracing();
    let service = Arc::new(ScriptedService::paged(one_per_page(&[
        Unexpected, Unexpected, Unexpected, Flaky, Expected,
    ])));
    let loader = TestLoader::for_invocation("build-1", service.clone(), &config_with_page_size(1));

    loader
        .load_next_test_variants(Some(Flaky))
        .await
        .expect("load succeeded");

    assert_eq!(service.requested_tokens().len(), 4);
    assert_eq!(loader.stage(), LoadingStage::LoadingFlaky);
    assert!(loader.loaded_all_unexpected_variants());
    assert!(loader.loaded_all_unexpectedly_skipped_variants());
    assert!(!loader.loaded_all_flaky_variants());
    assert_eq!(loader.unexpected_test_variants().len(), 3);
    assert_eq!(loader.flaky_test_variants().len(), 1);
    assert_eq!(loader.non_expected_test_variants().len(), 4);
    assert!(loader.expected_test_variants().is_empty());
}

#[tokio::test]
async fn load_without_status_loads_one_page() {
    let service = Arc::new(ScriptedService::paged(one_per_page(&[
        Unexpected, Unexpected, Expected,
    ])));
    let loader = TestLoader::for_invocation("build-1", service.clone(), &config_with_page_size(1));

    loader
        .load_next_test_variants(None)
        .await
        .expect("load succeeded");
    assert_eq!(service.requested_tokens(), [page_token(0)]);
    assert_eq!(loader.test_variant_count(), 1);
    assert!(loader.first_page_loaded());
    assert!(!loader.first_page_is_empty());
}

#[tokio::test]
async fn requests_carry_scope_and_page_size() {
    let service = Arc::new(ScriptedService::paged(one_per_page(&[Unexpected, Expected])));
    let loader = TestLoader::for_invocation("build-1", service.clone(), &config_with_page_size(1));

    loader
        .load_next_test_variants(Some(Expected))
        .await
        .expect("load succeeded");

    let requests = service.requests();
    assert_eq!(requests.len(), 2);
    for (index, request) in requests.iter().enumerate() {
        assert_eq!(request.invocations, ["invocations/build-1"]);
        assert_eq!(request.page_size, Some(1));
        assert_eq!(request.page_token, page_token(index));
    }
}

#[tokio::test]
async fn concurrent_loads_are_serialized() {
    let service = Arc::new(ScriptedService::paged(one_per_page(&[
        Unexpected, Unexpected, Flaky,
    ])));
    let loader = TestLoader::for_invocation("build-1", service.clone(), &config_with_page_size(1));

    // The scripted service panics if a second fetch starts while the first
    // is still in flight.
    let (first, second) = tokio::join!(
        loader.load_next_test_variants(None),
        loader.load_next_test_variants(None),
    );
    first.expect("first load succeeded");
    second.expect("second load succeeded");

    assert_eq!(
        service.requested_tokens(),
        [page_token(0), page_token(1)],
        "pages are requested in order"
    );
    assert_eq!(loader.unexpected_test_variants().len(), 2);
    assert!(!loader.is_loading());
}

#[tokio::test]
async fn short_page_jumps_to_expected() {
    let service = Arc::new(
        ScriptedService::default()
            .page("", vec![variant("a", Unexpected)], Some("page-1"))
            .page("page-1", vec![variant("b", Expected)], None),
    );
    let loader = TestLoader::for_invocation("build-1", service.clone(), &config_with_page_size(3));

    loader
        .load_next_test_variants(None)
        .await
        .expect("load succeeded");

    // Only unexpected test variants were seen, but the short page means the
    // rest are expected.
    assert_eq!(loader.stage(), LoadingStage::LoadingExpected);
    assert!(loader.loaded_all_exonerated_variants());
    assert!(!loader.loaded_all_expected_variants());
    assert_eq!(service.requested_tokens().len(), 1);
}

#[tokio::test]
async fn zero_page_size_uses_configured_page_size() {
    let service = Arc::new(
        ScriptedService::default()
            .page("", vec![variant("a", Unexpected)], Some("page-1"))
            .page("page-1", vec![variant("b", Expected)], None),
    );
    let request = QueryTestVariantsRequest {
        page_size: Some(0),
        ..QueryTestVariantsRequest::new(["invocations/build-1"])
    };
    let loader = TestLoader::new(request, service.clone(), &config_with_page_size(3));

    loader
        .load_next_test_variants(None)
        .await
        .expect("load succeeded");

    // One of three is a short page.
    assert_eq!(loader.stage(), LoadingStage::LoadingExpected);
    assert_eq!(service.requests()[0].page_size, Some(3));
}

#[tokio::test]
async fn loads_run_in_call_order() {
    let service = Arc::new(ScriptedService::paged(one_per_page(&[
        Unexpected, Unexpected, Flaky, Expected,
    ])));
    let loader = TestLoader::for_invocation("build-1", service.clone(), &config_with_page_size(1));
    let finished = Mutex::new(Vec::new());

    let until_flaky = loader.load_next_test_variants(Some(Flaky));
    let next = loader.load_next_test_variants(None);
    // Poll the later call first: it still waits for the earlier one.
    tokio::join!(
        async {
            next.await.expect("second load succeeded");
            finished.lock().unwrap().push("next");
        },
        async {
            until_flaky.await.expect("first load succeeded");
            finished.lock().unwrap().push("until flaky");
        },
    );

    assert_eq!(*finished.lock().unwrap(), ["until flaky", "next"]);
    assert_eq!(
        service.requested_tokens(),
        [page_token(0), page_token(1), page_token(2), page_token(3)]
    );
    assert!(loader.loaded_all_variants());
}

#[tokio::test]
async fn dropped_load_gives_up_its_turn() {
    let service = Arc::new(ScriptedService::paged(one_per_page(&[
        Unexpected, Unexpected, Expected,
    ])));
    let loader = TestLoader::for_invocation("build-1", service.clone(), &config_with_page_size(1));

    let first = loader.load_next_test_variants(Some(Expected));
    let second = loader.load_next_test_variants(None);
    drop(first);
    assert!(loader.is_loading(), "second load is still queued");

    second.await.expect("second load succeeded");
    assert_eq!(service.requested_tokens(), [page_token(0)]);
    assert!(!loader.is_loading());

    // Later loads aren't held up either.
    loader
        .load_next_test_variants(None)
        .await
        .expect("third load succeeded");
    assert_eq!(service.requested_tokens(), [page_token(0), page_token(1)]);
}

#[tokio::test]
async fn end_of_stream_stops_fetching() {
    let service = Arc::new(ScriptedService::paged(one_per_page(&[Unexpected, Expected])));
    let loader = TestLoader::for_invocation("build-1", service.clone(), &config_with_page_size(1));

    loader
        .load_next_test_variants(Some(Expected))
        .await
        .expect("load succeeded");
    assert_eq!(loader.stage(), LoadingStage::Done);
    assert!(loader.loaded_all_variants());
    for status in TestVariantStatus::ALL {
        assert!(loader.loaded_all(status), "all {status} variants loaded");
    }

    // Further loads complete without fetching, and don't count as loading.
    let fut = loader.load_next_test_variants(None);
    assert!(!loader.is_loading());
    fut.await.expect("load succeeded");
    loader
        .load_next_test_variants(Some(Expected))
        .await
        .expect("load succeeded");
    assert_eq!(service.requested_tokens().len(), 2);
}

#[tokio::test]
async fn load_until_expected_fetches_past_full_non_expected_page() {
    // The first page is exactly full of non-expected test variants. The next
    // page is empty but not final, so the stage jumps to expected without any
    // expected test variant having arrived.
    let service = Arc::new(
        ScriptedService::default()
            .page(
                "",
                vec![variant("a", Unexpected), variant("b", Flaky)],
                Some("page-1"),
            )
            .page("page-1", Vec::new(), Some("page-2"))
            .page("page-2", vec![variant("c", Expected)], None),
    );
    let loader = TestLoader::for_invocation("build-1", service.clone(), &config_with_page_size(2));

    loader
        .load_next_test_variants(Some(Expected))
        .await
        .expect("load succeeded");

    assert_eq!(
        service.requested_tokens(),
        [page_token(0), page_token(1), page_token(2)]
    );
    assert_eq!(loader.expected_test_variants().len(), 1);
    assert_eq!(loader.stage(), LoadingStage::Done);
}

#[tokio::test]
async fn load_continues_until_a_visible_variant_arrives() {
    let service = Arc::new(ScriptedService::paged(one_per_page(&[
        Unexpected, Unexpected, Flaky, Expected,
    ])));
    let loader = TestLoader::for_invocation("build-1", service.clone(), &config_with_page_size(1));
    loader.set_filter(|test_variant| test_variant.status == Flaky);

    loader
        .load_next_test_variants(None)
        .await
        .expect("load succeeded");

    assert_eq!(service.requested_tokens().len(), 3);
    assert_eq!(loader.test_variant_count(), 1);
    assert_eq!(loader.unfiltered_test_variant_count(), 3);
    assert!(loader.unexpected_test_variants().is_empty());
}

#[tokio::test]
async fn failed_fetch_can_be_retried() {
    let service = Arc::new(
        ScriptedService::paged(one_per_page(&[Unexpected, Expected])).fail_first("page-1"),
    );
    let loader = TestLoader::for_invocation("build-1", service.clone(), &config_with_page_size(1));

    loader
        .load_next_test_variants(None)
        .await
        .expect("first page loaded");
    let stage_before = loader.stage();

    let error = loader
        .load_next_test_variants(None)
        .await
        .expect_err("second page fails");
    assert_eq!(error.request().page_token, "page-1");
    assert!(matches!(error.kind(), LoadTestVariantsErrorKind::Service(_)));
    assert_eq!(loader.stage(), stage_before);
    assert_eq!(loader.unfiltered_test_variant_count(), 1);
    assert!(!loader.is_loading(), "failed load is no longer in flight");

    // The cursor didn't move, so the retry asks for the same page.
    loader
        .load_next_test_variants(None)
        .await
        .expect("retry succeeded");
    assert_eq!(
        service.requested_tokens(),
        [page_token(0), page_token(1), page_token(1)]
    );
    assert!(loader.loaded_all_variants());
}

#[tokio::test]
async fn queued_load_runs_after_failed_load() {
    let service = Arc::new(
        ScriptedService::paged(one_per_page(&[Unexpected, Expected])).fail_first(""),
    );
    let loader = TestLoader::for_invocation("build-1", service.clone(), &config_with_page_size(1));

    let (first, second) = tokio::join!(
        loader.load_next_test_variants(None),
        loader.load_next_test_variants(None),
    );
    first.expect_err("first load fails");
    second.expect("queued load retries the same page");
    assert_eq!(service.requested_tokens(), [page_token(0), page_token(0)]);
    assert_eq!(loader.unexpected_test_variants().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn fetch_timeout() {
    let service = Arc::new(
        ScriptedService::paged(one_per_page(&[Unexpected])).hang_first(""),
    );
    let config = config_with_page_size(1).with_fetch_timeout(Some(Duration::from_secs(30)));
    let loader = TestLoader::for_invocation("build-1", service.clone(), &config);

    let error = loader
        .load_next_test_variants(None)
        .await
        .expect_err("fetch times out");
    match error.kind() {
        LoadTestVariantsErrorKind::TimedOut { timeout } => {
            assert_eq!(*timeout, Duration::from_secs(30));
        }
        other => panic!("unexpected error kind: {other:?}"),
    }
    assert_eq!(loader.stage(), LoadingStage::LoadingUnexpected);
    assert!(!loader.is_loading());

    loader
        .load_next_test_variants(None)
        .await
        .expect("retry succeeded");
    assert!(loader.loaded_all_variants());
}

#[tokio::test(start_paused = true)]
async fn dropping_load_cancels_fetch() {
    let service = Arc::new(
        ScriptedService::paged(one_per_page(&[Unexpected, Expected])).hang_first(""),
    );
    let loader = TestLoader::for_invocation("build-1", service.clone(), &config_with_page_size(1));

    tokio::time::timeout(
        Duration::from_secs(5),
        loader.load_next_test_variants(None),
    )
    .await
    .expect_err("caller gives up waiting");

    assert!(!loader.is_loading());
    assert_eq!(loader.unfiltered_test_variant_count(), 0);
    assert!(loader.first_request_sent());

    loader
        .load_next_test_variants(None)
        .await
        .expect("load succeeded");
    assert_eq!(service.requested_tokens(), [page_token(0), page_token(0)]);
    assert_eq!(loader.unexpected_test_variants().len(), 1);
}

#[tokio::test]
async fn progress_is_published() {
    let service = Arc::new(ScriptedService::paged(one_per_page(&[Unexpected, Expected])));
    let loader = TestLoader::for_invocation("build-1", service.clone(), &config_with_page_size(1));
    let mut progress = loader.subscribe();
    assert_eq!(*progress.borrow_and_update(), LoadProgress::default());

    let fut = loader.load_next_test_variants(None);
    assert!(progress.has_changed().expect("sender alive"));
    assert_eq!(
        *progress.borrow_and_update(),
        LoadProgress {
            stage: LoadingStage::LoadingUnexpected,
            is_loading: true,
            first_request_sent: true,
            unfiltered_test_variant_count: 0,
        }
    );

    fut.await.expect("load succeeded");
    assert_eq!(
        *progress.borrow_and_update(),
        LoadProgress {
            stage: LoadingStage::LoadingUnexpected,
            is_loading: false,
            first_request_sent: true,
            unfiltered_test_variant_count: 1,
        }
    );

    loader
        .load_next_test_variants(Some(Expected))
        .await
        .expect("load succeeded");
    let last = *progress.borrow_and_update();
    assert!(last.loaded_all_variants());
    assert!(last.loaded_all(Expected));
    assert!(!last.is_loading);
    assert_eq!(last.unfiltered_test_variant_count, 2);
    assert_eq!(last, loader.progress());
}
