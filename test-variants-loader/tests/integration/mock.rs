// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use maplit::btreemap;
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use test_variants_loader::service::QueryTestVariants;
use test_variants_metadata::{
    QueryTestVariantsRequest, QueryTestVariantsResponse, TestMetadata, TestVariant,
    TestVariantStatus, Variant,
};
use thiserror::Error;

pub(crate) fn variant(test_id: &str, status: TestVariantStatus) -> TestVariant {
    TestVariant {
        test_id: test_id.to_owned(),
        status,
        ..Default::default()
    }
}

pub(crate) fn named_variant(
    test_id: &str,
    name: &str,
    status: TestVariantStatus,
    os: &str,
) -> TestVariant {
    TestVariant {
        test_id: test_id.to_owned(),
        status,
        variant: Some(Variant {
            def: btreemap! { "os".to_owned() => os.to_owned() },
        }),
        test_metadata: Some(TestMetadata {
            name: Some(name.to_owned()),
            location: None,
        }),
        ..Default::default()
    }
}

/// Returns the token the scripted service uses for page `index`.
pub(crate) fn page_token(index: usize) -> String {
    if index == 0 {
        String::new()
    } else {
        format!("page-{index}")
    }
}

#[derive(Debug)]
enum Reply {
    Page(QueryTestVariantsResponse),
    Fail,
    Hang,
}

#[derive(Debug, Error)]
#[error("scripted failure for page token `{page_token}`")]
pub(crate) struct ScriptedError {
    page_token: String,
}

/// A query service that replays scripted replies, keyed by page token.
///
/// Panics if a fetch starts while another is still in flight, or if a page is
/// requested that has no reply left.
#[derive(Debug, Default)]
pub(crate) struct ScriptedService {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<QueryTestVariantsRequest>>,
    in_flight: AtomicBool,
}

impl ScriptedService {
    /// Scripts a chain of pages. The last page has no continuation token.
    pub(crate) fn paged(pages: impl IntoIterator<Item = Vec<TestVariant>>) -> Self {
        let pages: Vec<_> = pages.into_iter().collect();
        let last = pages.len().saturating_sub(1);
        pages
            .into_iter()
            .enumerate()
            .fold(Self::default(), |service, (index, test_variants)| {
                let next = (index != last).then(|| page_token(index + 1));
                service.page(&page_token(index), test_variants, next.as_deref())
            })
    }

    pub(crate) fn page(
        self,
        page_token: &str,
        test_variants: Vec<TestVariant>,
        next_page_token: Option<&str>,
    ) -> Self {
        self.reply(
            page_token,
            Reply::Page(QueryTestVariantsResponse {
                test_variants,
                next_page_token: next_page_token.map(str::to_owned),
            }),
        )
    }

    /// Scripts a failure. Replies for a token are used in the order they were
    /// scripted, so a failure scripted before a page fails the first attempt.
    pub(crate) fn fail_first(self, page_token: &str) -> Self {
        self.reply_first(page_token, Reply::Fail)
    }

    /// Scripts a reply that never arrives.
    pub(crate) fn hang_first(self, page_token: &str) -> Self {
        self.reply_first(page_token, Reply::Hang)
    }

    fn reply(self, page_token: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(page_token.to_owned())
            .or_default()
            .push_back(reply);
        self
    }

    fn reply_first(self, page_token: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(page_token.to_owned())
            .or_default()
            .push_front(reply);
        self
    }

    /// Returns the page tokens requested so far, in order.
    pub(crate) fn requested_tokens(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.page_token.clone())
            .collect()
    }

    pub(crate) fn requests(&self) -> Vec<QueryTestVariantsRequest> {
        self.requests.lock().unwrap().clone()
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl QueryTestVariants for ScriptedService {
    type Error = ScriptedError;

    async fn query_test_variants(
        &self,
        request: &QueryTestVariantsRequest,
    ) -> Result<QueryTestVariantsResponse, Self::Error> {
        assert!(
            !self.in_flight.swap(true, Ordering::SeqCst),
            "fetch for page token `{}` started while another fetch was in flight",
            request.page_token,
        );
        let _in_flight = InFlight(&self.in_flight);

        self.requests.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&request.page_token)
            .and_then(VecDeque::pop_front);

        // Give any other queued loads a chance to run.
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }

        match reply {
            Some(Reply::Page(response)) => Ok(response),
            Some(Reply::Fail) => Err(ScriptedError {
                page_token: request.page_token.clone(),
            }),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                panic!("hanging fetch should have been cancelled");
            }
            None => panic!(
                "no scripted reply left for page token `{}`",
                request.page_token
            ),
        }
    }
}
