//! Per-download job state and progress fan-out
//!
//! A [`Job`] holds everything observable about one in-flight download: the
//! last progress line, a line counter, the artifact paths discovered so far,
//! and the set of attached listeners. Listeners attach through
//! [`Job::subscribe`], which hands back a [`Subscription`] — an RAII guard
//! that detaches on drop and implements [`futures::Stream`] so it can be fed
//! straight into an SSE response body.
//!
//! Fan-out is non-blocking: each listener gets a bounded channel and a slow
//! consumer has lines dropped rather than stalling the producer. The first
//! line a lagged listener receives after catching up is the [`MISSED_MARKER`]
//! so it can tell its view has a gap.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use utoipa::ToSchema;

/// Capacity of each listener's progress-line channel
pub const LISTENER_BUFFER: usize = 64;

/// Marker line delivered to a listener whose channel overflowed, in place of
/// the lines it missed
pub const MISSED_MARKER: &str = "…";

/// Shared state of a single download job
///
/// Cheap to share: wrap it in an [`Arc`] and clone the handle. All mutation
/// goes through a single internal mutex whose critical sections are short and
/// never await.
pub struct Job {
    id: String,
    line_count: AtomicU32,
    next_slot: AtomicU64,
    inner: Mutex<Inner>,
}

struct Inner {
    last_line: Option<String>,
    media_path: Option<String>,
    subtitles: Vec<String>,
    listeners: Vec<Listener>,
    done: bool,
}

struct Listener {
    slot: u64,
    tx: mpsc::Sender<String>,
    lagged: bool,
}

/// Serializable point-in-time view of a [`Job`], as exposed by `GET /state`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobSnapshot {
    /// Stable media id of the job
    pub id: String,
    /// Public path of the main media artifact, if discovered yet
    pub media_path: Option<String>,
    /// Public paths of subtitle artifacts discovered so far
    pub subtitles: Vec<String>,
    /// Most recent progress line
    pub last_line: Option<String>,
    /// Total number of progress lines emitted
    pub line_count: u32,
    /// Number of currently attached listeners
    pub listeners: usize,
    /// Whether the job has reached its terminal state
    pub done: bool,
}

impl Job {
    /// Create a new job for the given media id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            line_count: AtomicU32::new(0),
            next_slot: AtomicU64::new(0),
            inner: Mutex::new(Inner {
                last_line: None,
                media_path: None,
                subtitles: Vec::new(),
                listeners: Vec::new(),
                done: false,
            }),
        }
    }

    /// Stable media id of this job
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether any progress line has been emitted yet
    pub fn started(&self) -> bool {
        self.line_count.load(Ordering::Relaxed) > 0
    }

    /// Total number of progress lines emitted so far
    pub fn line_count(&self) -> u32 {
        self.line_count.load(Ordering::Relaxed)
    }

    /// Whether the job has reached its terminal state
    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    /// Most recent progress line, if any
    pub fn last_line(&self) -> Option<String> {
        self.lock().last_line.clone()
    }

    /// Public path of the main media artifact, if one has been discovered
    pub fn media_path(&self) -> Option<String> {
        self.lock().media_path.clone()
    }

    /// Public paths of the subtitle artifacts discovered so far
    pub fn subtitles(&self) -> Vec<String> {
        self.lock().subtitles.clone()
    }

    /// Attach a listener
    ///
    /// The subscription's first line is the job's current last line (if any),
    /// seeded under the same lock that orders broadcasts, so a subscriber
    /// always observes a contiguous suffix of the progress stream. Subscribing
    /// to a job that is already done yields a subscription whose stream ends
    /// immediately.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let slot = self.next_slot.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(LISTENER_BUFFER);

        {
            let mut inner = self.lock();
            if !inner.done {
                if let Some(last) = &inner.last_line {
                    // fresh channel, cannot be full
                    let _ = tx.try_send(last.clone());
                }
                inner.listeners.push(Listener {
                    slot,
                    tx,
                    lagged: false,
                });
            }
            // done: tx is dropped here and the stream ends at once
        }

        Subscription {
            job: Arc::clone(self),
            slot,
            rx,
        }
    }

    /// Broadcast a progress line to all attached listeners
    ///
    /// Never blocks: a listener whose channel is full misses the line and is
    /// marked lagged; it will receive [`MISSED_MARKER`] before the next line
    /// that fits. Listeners whose receiving side is gone are removed.
    /// No-op once the job is done.
    pub fn send_log(&self, line: impl Into<String>) {
        let line = line.into();
        {
            let mut inner = self.lock();
            if inner.done {
                return;
            }

            inner.listeners.retain_mut(|listener| {
                if listener.lagged {
                    match listener.tx.try_send(MISSED_MARKER.to_string()) {
                        Ok(()) => listener.lagged = false,
                        // still backed up, this line is missed too
                        Err(TrySendError::Full(_)) => return true,
                        Err(TrySendError::Closed(_)) => return false,
                    }
                }
                match listener.tx.try_send(line.clone()) {
                    Ok(()) => true,
                    Err(TrySendError::Full(_)) => {
                        listener.lagged = true;
                        true
                    }
                    Err(TrySendError::Closed(_)) => false,
                }
            });

            inner.last_line = Some(line);
        }
        self.line_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a discovered media artifact path, keeping the shortest seen
    ///
    /// yt-dlp reports intermediate artifacts (separate audio/video streams,
    /// fixups) with longer names than the final merged file; the shortest
    /// candidate is the one worth handing to clients.
    pub fn record_media(&self, path: impl Into<String>) {
        let path = path.into();
        let mut inner = self.lock();
        let keep = match &inner.media_path {
            Some(current) => path.len() < current.len(),
            None => true,
        };
        if keep {
            inner.media_path = Some(path);
        }
    }

    /// Record a discovered subtitle artifact path (deduplicated)
    pub fn record_subtitle(&self, path: impl Into<String>) {
        let path = path.into();
        let mut inner = self.lock();
        if !inner.subtitles.contains(&path) {
            inner.subtitles.push(path);
        }
    }

    /// Transition the job to its terminal state
    ///
    /// Closes every listener channel exactly once; subsequent calls and
    /// subsequent [`Job::send_log`] calls are no-ops.
    pub fn mark_done(&self) {
        let mut inner = self.lock();
        if inner.done {
            return;
        }
        inner.done = true;
        // dropping the senders closes each listener's stream
        inner.listeners.clear();
    }

    /// Point-in-time snapshot for the debug/state endpoint
    pub fn snapshot(&self) -> JobSnapshot {
        let inner = self.lock();
        JobSnapshot {
            id: self.id.clone(),
            media_path: inner.media_path.clone(),
            subtitles: inner.subtitles.clone(),
            last_line: inner.last_line.clone(),
            line_count: self.line_count.load(Ordering::Relaxed),
            listeners: inner.listeners.len(),
            done: inner.done,
        }
    }

    fn remove_slot(&self, slot: u64) {
        let mut inner = self.lock();
        inner.listeners.retain(|listener| listener.slot != slot);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // no panic can happen while the lock is held, but recover regardless
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("line_count", &self.line_count.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// A live attachment to a [`Job`]'s progress stream
///
/// Yields progress lines in emission order, starting with the catch-up line.
/// The stream ends when the job reaches its terminal state. Dropping the
/// subscription detaches the listener.
pub struct Subscription {
    job: Arc<Job>,
    slot: u64,
    rx: mpsc::Receiver<String>,
}

impl Subscription {
    /// Handle to the job this subscription observes
    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }

    /// Receive the next progress line, or `None` once the job is done
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

impl futures::Stream for Subscription {
    type Item = String;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.job.remove_slot(self.slot);
    }
}
