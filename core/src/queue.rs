//! Shared dispatch queue: runs requests on a bounded worker pool and
//! cancels them by tag.
//!
//! # Design
//! Each added request gets an id and a cancellation flag, registered in an
//! in-flight table together with its optional tag. A worker from the
//! runtime's blocking pool executes the request through the `Transport`,
//! then removes the entry from the table and checks the flag under the same
//! lock. Once an entry is removed, the worker owns delivery. `cancel` only
//! flips flags of entries still in the table, so a cancelled request never
//! reaches its completion, and a request whose response was already claimed
//! is delivered normally.
//!
//! Completions run on the worker thread, outside the table lock, so a
//! completion may add or cancel requests.
//!
//! Dropping the queue never discards work. If requests are still in the
//! table, a named helper thread keeps the runtime alive until the table
//! drains, then shuts it down.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::{Transport, TransportError, UreqTransport};

/// Opaque caller-chosen label used to cancel groups of requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(String);

impl Tag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Tag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for Tag {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

impl From<Uuid> for Tag {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Invoked once with the transport result, on a worker thread.
pub type Completion = Box<dyn FnOnce(Result<HttpResponse, TransportError>) + Send + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("failed to start dispatch workers: {0}")]
    Runtime(#[from] std::io::Error),
}

struct InFlight {
    tag: Option<Tag>,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct InFlightTable {
    entries: Mutex<HashMap<Uuid, InFlight>>,
    drained: Condvar,
}

impl InFlightTable {
    /// Forget `id`, waking anyone waiting for the table to drain.
    fn finish(&self, id: &Uuid) {
        let mut entries = lock(self);
        entries.remove(id);
        if entries.is_empty() {
            self.drained.notify_all();
        }
    }

    fn wait_drained(&self) {
        let mut entries = lock(self);
        while !entries.is_empty() {
            entries = self.drained.wait(entries).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

pub struct RequestQueue {
    runtime: Option<Runtime>,
    transport: Arc<dyn Transport>,
    in_flight: Arc<InFlightTable>,
    thread_name: String,
}

impl RequestQueue {
    pub fn new(config: &QueueConfig) -> Result<Self, QueueError> {
        Self::with_transport(config, Arc::new(UreqTransport::new(config.timeout())))
    }

    pub fn with_transport(config: &QueueConfig, transport: Arc<dyn Transport>) -> Result<Self, QueueError> {
        let max_workers = config.max_workers.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(max_workers)
            .thread_name(config.thread_name.clone())
            .build()?;
        info!(max_workers, thread_name = %config.thread_name, "request queue started");
        Ok(Self {
            runtime: Some(runtime),
            transport,
            in_flight: Arc::new(InFlightTable::default()),
            thread_name: config.thread_name.clone(),
        })
    }

    /// Enqueue `request`. Returns at once; `on_complete` runs on a worker
    /// unless the request is cancelled first.
    pub fn add(&self, request: HttpRequest, tag: Option<Tag>, on_complete: Completion) -> Uuid {
        let id = Uuid::new_v4();
        let cancelled = Arc::new(AtomicBool::new(false));
        lock(&self.in_flight).insert(
            id,
            InFlight {
                tag: tag.clone(),
                cancelled: Arc::clone(&cancelled),
            },
        );

        let Some(runtime) = self.runtime.as_ref() else {
            self.in_flight.finish(&id);
            return id;
        };

        let transport = Arc::clone(&self.transport);
        let in_flight = Arc::clone(&self.in_flight);
        let span = tracing::debug_span!(
            "dispatch",
            %id,
            method = %request.method,
            url = %request.url,
            tag = tag.as_ref().map(Tag::as_str).unwrap_or("-"),
        );

        runtime.spawn_blocking(move || {
            let _entered = span.enter();
            if cancelled.load(Ordering::Acquire) {
                in_flight.finish(&id);
                debug!("request cancelled before dispatch");
                return;
            }

            let result = transport.execute(&request);

            let claimed = {
                let mut entries = lock(&in_flight);
                entries.remove(&id);
                if entries.is_empty() {
                    in_flight.drained.notify_all();
                }
                !cancelled.load(Ordering::Acquire)
            };
            if !claimed {
                debug!("dropping response of cancelled request");
                return;
            }

            match &result {
                Ok(response) => debug!(status = response.status, "request completed"),
                Err(err) => debug!(error = %err, "request failed without response"),
            }
            on_complete(result);
        });
        id
    }

    /// Cancel every in-flight request carrying `tag`. Returns how many were
    /// cancelled.
    pub fn cancel(&self, tag: &Tag) -> usize {
        let count = cancel_where(&self.in_flight, |entry| entry.tag.as_ref() == Some(tag));
        debug!(%tag, count, "cancelled tagged requests");
        count
    }

    /// Cancel every in-flight request, tagged or not.
    pub fn cancel_all(&self) -> usize {
        let count = cancel_where(&self.in_flight, |_| true);
        debug!(count, "cancelled all requests");
        count
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Requests added but not yet delivered or cancelled.
    pub fn pending(&self) -> usize {
        lock(&self.in_flight)
            .values()
            .filter(|entry| !entry.cancelled.load(Ordering::Acquire))
            .count()
    }
}

impl Drop for RequestQueue {
    fn drop(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        // Workers already past the table finish on their own after a
        // background shutdown; only queued work needs the runtime.
        if lock(&self.in_flight).is_empty() {
            runtime.shutdown_background();
            return;
        }

        let in_flight = Arc::clone(&self.in_flight);
        let runtime = Arc::new(Mutex::new(Some(runtime)));
        let held = Arc::clone(&runtime);
        let drain = thread::Builder::new()
            .name(format!("{}-drain", self.thread_name))
            .spawn(move || {
                in_flight.wait_drained();
                debug!("request queue drained");
                shutdown(&held);
            });
        if let Err(err) = drain {
            warn!(error = %err, "cannot wait for in-flight requests, dropping queued work");
            shutdown(&runtime);
        }
    }
}

fn shutdown(slot: &Mutex<Option<Runtime>>) {
    if let Some(runtime) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
        runtime.shutdown_background();
    }
}

impl fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestQueue")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

fn cancel_where(table: &InFlightTable, mut predicate: impl FnMut(&InFlight) -> bool) -> usize {
    let table = lock(table);
    let mut count = 0;
    for entry in table.values().filter(|entry| predicate(entry)) {
        if !entry.cancelled.swap(true, Ordering::AcqRel) {
            count += 1;
        }
    }
    count
}

fn lock(table: &InFlightTable) -> MutexGuard<'_, HashMap<Uuid, InFlight>> {
    table.entries.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::mpsc;
    use std::time::Duration;

    use super::*;
    use crate::http::HttpMethod;

    /// Answers every request with the same response.
    pub(crate) struct StubTransport {
        pub(crate) response: Result<HttpResponse, String>,
    }

    impl StubTransport {
        pub(crate) fn ok(status: u16, content_type: &str, body: &[u8]) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(HttpResponse {
                    status,
                    headers: vec![("Content-Type".to_string(), content_type.to_string())],
                    body: body.to_vec(),
                }),
            })
        }

        pub(crate) fn unreachable() -> Arc<Self> {
            Arc::new(Self {
                response: Err("connection refused".to_string()),
            })
        }
    }

    impl Transport for StubTransport {
        fn execute(&self, _request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.response.clone().map_err(TransportError::Io)
        }
    }

    /// Holds every request until `release` is called.
    pub(crate) struct GatedTransport {
        gate: Mutex<bool>,
        opened: std::sync::Condvar,
        pub(crate) seen: Mutex<Vec<HttpRequest>>,
    }

    impl GatedTransport {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                gate: Mutex::new(false),
                opened: std::sync::Condvar::new(),
                seen: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn release(&self) {
            *self.gate.lock().unwrap() = true;
            self.opened.notify_all();
        }
    }

    impl Transport for GatedTransport {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            let mut open = self.gate.lock().unwrap();
            while !*open {
                open = self.opened.wait(open).unwrap();
            }
            Ok(HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: b"released".to_vec(),
            })
        }
    }

    pub(crate) fn get(url: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    fn queue(transport: Arc<dyn Transport>) -> RequestQueue {
        RequestQueue::with_transport(&QueueConfig::default(), transport).unwrap()
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn completion_receives_transport_response() {
        let queue = queue(StubTransport::ok(200, "text/plain", b"pong"));
        let (tx, rx) = mpsc::channel();
        queue.add(get("http://stub/ping"), None, Box::new(move |result| {
            tx.send(result.map(|r| r.body)).unwrap();
        }));
        assert_eq!(rx.recv_timeout(WAIT).unwrap().unwrap(), b"pong".to_vec());
    }

    #[test]
    fn transport_errors_are_delivered() {
        let queue = queue(StubTransport::unreachable());
        let (tx, rx) = mpsc::channel();
        queue.add(get("http://stub/ping"), None, Box::new(move |result| {
            tx.send(result.is_err()).unwrap();
        }));
        assert!(rx.recv_timeout(WAIT).unwrap());
    }

    #[test]
    fn cancelled_request_never_completes() {
        let transport = GatedTransport::new();
        let queue = queue(transport.clone());
        let (tx, rx) = mpsc::channel();

        let tx_cancelled = tx.clone();
        queue.add(get("http://stub/a"), Some(Tag::from("screen")), Box::new(move |_| {
            tx_cancelled.send("cancelled").unwrap();
        }));
        queue.add(get("http://stub/b"), Some(Tag::from("other")), Box::new(move |_| {
            tx.send("kept").unwrap();
        }));

        assert_eq!(queue.cancel(&Tag::from("screen")), 1);
        assert_eq!(queue.pending(), 1);
        transport.release();

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), "kept");
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn cancel_unknown_tag_is_a_noop() {
        let queue = queue(StubTransport::ok(200, "text/plain", b""));
        assert_eq!(queue.cancel(&Tag::from("nothing")), 0);
        assert_eq!(queue.cancel_all(), 0);
    }

    #[test]
    fn cancel_all_covers_untagged_requests() {
        let transport = GatedTransport::new();
        let queue = queue(transport.clone());
        let (tx, rx) = mpsc::channel::<()>();
        for _ in 0..3 {
            let tx = tx.clone();
            queue.add(get("http://stub/x"), None, Box::new(move |_| {
                let _ = tx.send(());
            }));
        }
        drop(tx);
        assert_eq!(queue.cancel_all(), 3);
        assert_eq!(queue.pending(), 0);
        transport.release();
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn completion_may_enqueue_more_work() {
        let queue = Arc::new(queue(StubTransport::ok(200, "text/plain", b"ok")));
        let (tx, rx) = mpsc::channel();
        let (first_done, first_rx) = mpsc::channel();
        let inner = Arc::clone(&queue);
        queue.add(get("http://stub/first"), None, Box::new(move |_| {
            inner.add(get("http://stub/second"), None, Box::new(move |result| {
                tx.send(result.is_ok()).unwrap();
            }));
            drop(inner);
            first_done.send(()).unwrap();
        }));
        first_rx.recv_timeout(WAIT).unwrap();
        assert!(rx.recv_timeout(WAIT).unwrap());
    }

    #[test]
    fn dropping_the_queue_still_delivers_queued_work() {
        let transport = GatedTransport::new();
        let config = QueueConfig {
            max_workers: 1,
            ..QueueConfig::default()
        };
        let queue = RequestQueue::with_transport(&config, transport.clone()).unwrap();
        let (tx, rx) = mpsc::channel();
        for n in 0..3 {
            let tx = tx.clone();
            queue.add(get("http://stub/x"), None, Box::new(move |result| {
                tx.send((n, result.is_ok())).unwrap();
            }));
        }
        drop(tx);
        drop(queue);
        transport.release();

        let mut delivered: Vec<_> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        delivered.sort();
        assert_eq!(delivered, vec![(0, true), (1, true), (2, true)]);
    }

    #[test]
    fn dropping_an_idle_queue_returns_at_once() {
        let queue = queue(StubTransport::ok(200, "text/plain", b""));
        assert_eq!(queue.pending(), 0);
        drop(queue);
    }

    #[test]
    fn tags_convert_from_strings_and_ids() {
        assert_eq!(Tag::from("ping"), Tag::new("ping".to_string()));
        assert_eq!(Tag::from(Uuid::nil()).as_str(), "00000000-0000-0000-0000-000000000000");
    }
}
