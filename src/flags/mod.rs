//! # Flag Sync Coordinator
//!
//! Drives a paged sequence of remote "read"-flag mutations over a narrow
//! to completion, tolerant of rate limiting and partial progress.
//!
//! ## State machine
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      BULK FLAG SYNC                                 │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │   idle ──► paging ──► response                                      │
//! │              ▲           │                                          │
//! │              │           ├─ found_newest ─────────► idle (done)     │
//! │              │           ├─ more remain ──────────► paging          │
//! │              │           │   (anchor advanced,                      │
//! │              │           │    cumulative carried)                   │
//! │              │           ├─ RATE_LIMIT_HIT ───────► retry-wait      │
//! │              └───────────┴──(backoff elapsed,                       │
//! │                              same request)                          │
//! │                          └─ other error ──────────► failed          │
//! │                                                     (reported once) │
//! │                                                                     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The request is anchored at the logical start of the narrow rather than
//! the client's first unread, so older muted-unread messages are never
//! stranded. A progress surface is engaged only once the first page fails
//! to complete the whole narrow; single-page operations finish silently.

use parking_lot::{Mutex, RwLock};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::config::BatchSizes;
use crate::error::{Error, Result};
use crate::narrow::{Anchor, Narrow};
use crate::transport::{Transport, TransportError, UpdateFlagsResponse};
use crate::types::MessageId;

/// Endpoint for narrow-scoped flag mutations.
const FLAGS_NARROW_PATH: &str = "/messages/flags/narrow";

/// Direction of a flag mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagOp {
    /// Set the flag (mark read).
    Add,
    /// Unset the flag (mark unread).
    Remove,
}

impl FlagOp {
    fn wire(self) -> &'static str {
        match self {
            FlagOp::Add => "add",
            FlagOp::Remove => "remove",
        }
    }
}

/// Final accounting for one bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkFlagSummary {
    /// Messages examined across all pages.
    pub processed_count: u64,
    /// Messages whose flag actually changed.
    pub updated_count: u64,
    /// Pages issued (retries of the same page count once).
    pub pages: u32,
}

/// Progress surface for multi-page operations.
///
/// `progress` fires after each page of an operation that did not finish
/// on its first page. `finished`/`failed` tear the surface down. Closing
/// the surface clears the observer; the request sequence runs on.
pub trait FlagSyncObserver: Send + Sync {
    /// Another page completed; `processed` is the cumulative count.
    fn progress(&self, processed: u64);
    /// The narrow finished.
    fn finished(&self, summary: &BulkFlagSummary);
    /// The operation hit a terminal error.
    fn failed(&self, message: &str);
}

/// The coordinator.
pub struct FlagSyncCoordinator {
    transport: Arc<dyn Transport>,
    batch: BatchSizes,
    observer: RwLock<Option<Arc<dyn FlagSyncObserver>>>,
    in_flight: Mutex<HashSet<(String, FlagOp)>>,
}

impl FlagSyncCoordinator {
    /// Create a coordinator over the given transport.
    pub fn new(transport: Arc<dyn Transport>, batch: BatchSizes) -> Self {
        Self {
            transport,
            batch,
            observer: RwLock::new(None),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Attach the progress surface.
    pub fn set_observer(&self, observer: Arc<dyn FlagSyncObserver>) {
        *self.observer.write() = Some(observer);
    }

    /// Detach the progress surface. In-flight operations continue; they
    /// just stop surfacing progress text.
    pub fn clear_observer(&self) {
        *self.observer.write() = None;
    }

    /// Apply `op` to the "read" flag across every message matching
    /// `narrow`.
    ///
    /// Pages from the oldest end of the narrow until the server reports
    /// `found_newest`. A second call for the same (narrow, op) while one
    /// is in flight is refused.
    pub async fn bulk_set_flag(&self, narrow: &Narrow, op: FlagOp) -> Result<BulkFlagSummary> {
        self.run_guarded(narrow, op, Anchor::Oldest, true).await
    }

    /// Mark a single conversation unread from `anchor` onward: the same
    /// batch/anchor/backoff protocol with the flag operation reversed.
    pub async fn mark_unread_from(
        &self,
        narrow: &Narrow,
        anchor: MessageId,
    ) -> Result<BulkFlagSummary> {
        self.run_guarded(narrow, FlagOp::Remove, Anchor::Id(anchor), true)
            .await
    }

    async fn run_guarded(
        &self,
        narrow: &Narrow,
        op: FlagOp,
        start: Anchor,
        include_anchor: bool,
    ) -> Result<BulkFlagSummary> {
        let guard_key = (narrow.dedup_key(), op);
        {
            let mut in_flight = self.in_flight.lock();
            if !in_flight.insert(guard_key.clone()) {
                return Err(Error::FlagSyncInFlight);
            }
        }
        let result = self.run_pages(narrow, op, start, include_anchor).await;
        self.in_flight.lock().remove(&guard_key);
        result
    }

    /// The explicit page loop. One iteration = one outstanding request;
    /// a rate-limited page sleeps and repeats itself with an untouched
    /// cursor.
    async fn run_pages(
        &self,
        narrow: &Narrow,
        op: FlagOp,
        start: Anchor,
        mut include_anchor: bool,
    ) -> Result<BulkFlagSummary> {
        let mut anchor = start;
        let mut num_after = self.batch.first;
        let mut summary = BulkFlagSummary::default();
        let mut surface_engaged = false;

        loop {
            let body = json!({
                "anchor": anchor.to_wire(),
                "include_anchor": include_anchor,
                "num_before": 0,
                "num_after": num_after,
                "narrow": narrow.to_wire(),
                "op": op.wire(),
                "flag": "read",
            });

            let value = match self.transport.post(FLAGS_NARROW_PATH, body).await {
                Ok(value) => value,
                Err(err) => {
                    if let Some(backoff) = err.rate_limit_backoff() {
                        // Retry-wait: same request after the server's
                        // interval, cursor untouched.
                        tracing::debug!(
                            backoff,
                            op = op.wire(),
                            "Flag sync rate limited; backing off"
                        );
                        tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                        continue;
                    }
                    if matches!(err, TransportError::Aborted) {
                        // Expected during navigation/shutdown.
                        tracing::debug!(op = op.wire(), "Flag sync request aborted");
                        return Err(Error::RequestAborted);
                    }
                    let msg = err.to_string();
                    tracing::warn!(op = op.wire(), error = %msg, "Flag sync failed");
                    self.with_observer(|o| o.failed(&msg));
                    return Err(Error::FlagUpdateFailed(msg));
                }
            };

            let response = UpdateFlagsResponse::from_value(&value)
                .map_err(|e| Error::UnexpectedResponse(e.to_string()))?;

            summary.processed_count += response.processed_count;
            summary.updated_count += response.updated_count;
            summary.pages += 1;

            if response.found_newest {
                tracing::info!(
                    processed = summary.processed_count,
                    updated = summary.updated_count,
                    pages = summary.pages,
                    op = op.wire(),
                    "Flag sync complete"
                );
                if surface_engaged {
                    self.with_observer(|o| o.finished(&summary));
                }
                return Ok(summary);
            }

            // More remain: advance the anchor, carry the cumulative
            // count, switch to the steady-state batch size.
            let last = response.last_processed_id.ok_or_else(|| {
                Error::UnexpectedResponse(
                    "found_newest=false without last_processed_id".to_string(),
                )
            })?;
            anchor = Anchor::Id(last);
            include_anchor = false;
            num_after = self.batch.rest;
            surface_engaged = true;
            self.with_observer(|o| o.progress(summary.processed_count));
        }
    }

    fn with_observer(&self, f: impl FnOnce(&dyn FlagSyncObserver)) {
        if let Some(observer) = self.observer.read().as_ref() {
            f(observer.as_ref());
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StreamId;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::collections::VecDeque;

    struct MockTransport {
        requests: Mutex<Vec<Value>>,
        responses: Mutex<VecDeque<std::result::Result<Value, TransportError>>>,
    }

    impl MockTransport {
        fn new(
            responses: Vec<std::result::Result<Value, TransportError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                responses: Mutex::new(responses.into()),
            })
        }

        fn requests(&self) -> Vec<Value> {
            self.requests.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn post(&self, _path: &str, body: Value) -> std::result::Result<Value, TransportError> {
            self.requests.lock().push(body);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Network("no scripted response".into())))
        }

        async fn get(&self, _path: &str, _params: Value) -> std::result::Result<Value, TransportError> {
            Err(TransportError::Network("unexpected get".into()))
        }

        async fn patch(&self, _path: &str, _body: Value) -> std::result::Result<Value, TransportError> {
            Err(TransportError::Network("unexpected patch".into()))
        }

        async fn delete(&self, _path: &str, _params: Value) -> std::result::Result<Value, TransportError> {
            Err(TransportError::Network("unexpected delete".into()))
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        progress: Mutex<Vec<u64>>,
        finished: Mutex<Vec<BulkFlagSummary>>,
        failed: Mutex<Vec<String>>,
    }

    impl FlagSyncObserver for RecordingObserver {
        fn progress(&self, processed: u64) {
            self.progress.lock().push(processed);
        }
        fn finished(&self, summary: &BulkFlagSummary) {
            self.finished.lock().push(*summary);
        }
        fn failed(&self, message: &str) {
            self.failed.lock().push(message.to_string());
        }
    }

    fn page(processed: u64, found_newest: bool, last: Option<u64>) -> std::result::Result<Value, TransportError> {
        let mut body = serde_json::json!({
            "processed_count": processed,
            "updated_count": processed,
            "found_newest": found_newest,
        });
        if let Some(last) = last {
            body["last_processed_id"] = serde_json::json!(last);
        }
        Ok(body)
    }

    fn small_batches() -> BatchSizes {
        BatchSizes { first: 1000, rest: 1000 }
    }

    #[tokio::test]
    async fn test_pagination_scenario_2500_messages() {
        // 2500 unread messages with batch sizes 1000/1000: exactly three
        // requests, anchors advancing through the responses.
        let transport = MockTransport::new(vec![
            page(1000, false, Some(1000)),
            page(1000, false, Some(2000)),
            page(500, true, Some(2500)),
        ]);
        let coordinator = FlagSyncCoordinator::new(transport.clone(), small_batches());
        let observer = Arc::new(RecordingObserver::default());
        coordinator.set_observer(observer.clone());

        let narrow = Narrow::channel(StreamId(5));
        let summary = coordinator.bulk_set_flag(&narrow, FlagOp::Add).await.unwrap();

        assert_eq!(summary.processed_count, 2500);
        assert_eq!(summary.pages, 3);

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0]["anchor"], serde_json::json!("oldest"));
        assert_eq!(requests[0]["num_after"], serde_json::json!(1000));
        assert_eq!(requests[0]["include_anchor"], serde_json::json!(true));
        assert_eq!(requests[0]["op"], serde_json::json!("add"));
        assert_eq!(requests[0]["flag"], serde_json::json!("read"));

        assert_eq!(requests[1]["anchor"], serde_json::json!(1000));
        assert_eq!(requests[1]["include_anchor"], serde_json::json!(false));
        assert_eq!(requests[2]["anchor"], serde_json::json!(2000));

        // Cumulative counts carried forward through the progress surface
        assert_eq!(*observer.progress.lock(), vec![1000, 2000]);
        assert_eq!(observer.finished.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_single_page_is_silent() {
        let transport = MockTransport::new(vec![page(40, true, Some(40))]);
        let coordinator = FlagSyncCoordinator::new(transport, small_batches());
        let observer = Arc::new(RecordingObserver::default());
        coordinator.set_observer(observer.clone());

        let summary = coordinator
            .bulk_set_flag(&Narrow::all(), FlagOp::Add)
            .await
            .unwrap();

        assert_eq!(summary.pages, 1);
        assert!(observer.progress.lock().is_empty());
        assert!(observer.finished.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_reissues_identical_request_after_backoff() {
        let transport = MockTransport::new(vec![
            Err(TransportError::Api {
                code: crate::transport::RATE_LIMIT_CODE.to_string(),
                msg: "slow down".to_string(),
                retry_after: Some(2.0),
            }),
            page(10, true, Some(10)),
        ]);
        let coordinator = FlagSyncCoordinator::new(transport.clone(), small_batches());

        let start = tokio::time::Instant::now();
        let narrow = Narrow::topic(StreamId(5), "lunch");
        let summary = coordinator.bulk_set_flag(&narrow, FlagOp::Add).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(summary.processed_count, 10);
        // Retry of the same page counts once
        assert_eq!(summary.pages, 1);

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1], "retry must be the identical request");
    }

    #[tokio::test]
    async fn test_terminal_error_reported_once_and_abandoned() {
        let transport = MockTransport::new(vec![Err(TransportError::Api {
            code: "BAD_NARROW".to_string(),
            msg: "invalid operator".to_string(),
            retry_after: None,
        })]);
        let coordinator = FlagSyncCoordinator::new(transport.clone(), small_batches());
        let observer = Arc::new(RecordingObserver::default());
        coordinator.set_observer(observer.clone());

        let err = coordinator
            .bulk_set_flag(&Narrow::all(), FlagOp::Add)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::FlagUpdateFailed(_)));
        assert_eq!(observer.failed.lock().len(), 1);
        // No auto-retry
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_aborted_request_is_quietly_expected() {
        let transport = MockTransport::new(vec![Err(TransportError::Aborted)]);
        let coordinator = FlagSyncCoordinator::new(transport, small_batches());
        let observer = Arc::new(RecordingObserver::default());
        coordinator.set_observer(observer.clone());

        let err = coordinator
            .bulk_set_flag(&Narrow::all(), FlagOp::Add)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RequestAborted));
        // Not surfaced as a failure
        assert!(observer.failed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_double_start_over_same_narrow_refused() {
        // First operation parks on a rate-limit sleep; the second must be
        // refused while it is in flight.
        let transport = MockTransport::new(vec![
            Err(TransportError::Api {
                code: crate::transport::RATE_LIMIT_CODE.to_string(),
                msg: "slow down".to_string(),
                retry_after: Some(60.0),
            }),
            page(1, true, Some(1)),
        ]);
        let coordinator = Arc::new(FlagSyncCoordinator::new(transport, small_batches()));
        let narrow = Narrow::channel(StreamId(5));

        let first = {
            let coordinator = coordinator.clone();
            let narrow = narrow.clone();
            tokio::spawn(async move { coordinator.bulk_set_flag(&narrow, FlagOp::Add).await })
        };
        // Let the first operation issue its request and start waiting.
        tokio::task::yield_now().await;

        let second = coordinator.bulk_set_flag(&narrow, FlagOp::Add).await;
        assert!(matches!(second, Err(Error::FlagSyncInFlight)));

        // The reversed op over the same narrow is a different cursor and
        // is allowed; it only fails because the scripted response queue
        // ran dry, not because of the guard.
        first.abort();
    }

    #[tokio::test]
    async fn test_mark_unread_from_anchor() {
        let transport = MockTransport::new(vec![page(12, true, Some(112))]);
        let coordinator = FlagSyncCoordinator::new(transport.clone(), small_batches());

        let narrow = Narrow::topic(StreamId(5), "lunch");
        let summary = coordinator
            .mark_unread_from(&narrow, MessageId(100))
            .await
            .unwrap();

        assert_eq!(summary.processed_count, 12);
        let requests = transport.requests();
        assert_eq!(requests[0]["anchor"], serde_json::json!(100));
        assert_eq!(requests[0]["include_anchor"], serde_json::json!(true));
        assert_eq!(requests[0]["op"], serde_json::json!("remove"));
    }

    #[tokio::test]
    async fn test_missing_last_processed_id_is_terminal() {
        let transport = MockTransport::new(vec![page(10, false, None)]);
        let coordinator = FlagSyncCoordinator::new(transport, small_batches());

        let err = coordinator
            .bulk_set_flag(&Narrow::all(), FlagOp::Add)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }
}
