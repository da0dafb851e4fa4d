//! Fan-out/fan-in execution of prerolled queries.
//!
//! A feeder hands queries one at a time to a bounded channel. Each worker
//! runs on the blocking pool with one pooled connection of its own and pulls
//! until the channel closes. Worker outputs are merged by one forwarding
//! task per worker; the merged channel closes when the last forwarder is
//! done. A single collator owns the result list and cancels the job as soon
//! as the cap is exceeded.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::compiler::{PrerolledQuery, SearchId};
use crate::corpus::{AuthorId, OtherHasher};
use crate::error::{Result, SearchError};
use crate::interface::CancelToken;
use crate::progress::{ProgressEvent, ProgressKind, ProgressSink};
use crate::storage::{LineConnection, LineKey, LineStore, WorkLine};

/// How a pass came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Termination {
    /// Every query ran to completion.
    Exhausted,
    /// More lines were available than the cap allows.
    CapReached,
    /// The caller cancelled the search.
    Cancelled,
}

impl Termination {
    /// How a result fed by two passes ended. Cancellation wins, then a cap
    /// reached by either pass.
    pub fn merge(self, other: Termination) -> Termination {
        match (self, other) {
            (Termination::Cancelled, _) | (_, Termination::Cancelled) => Termination::Cancelled,
            (Termination::CapReached, _) | (_, Termination::CapReached) => Termination::CapReached,
            _ => Termination::Exhausted,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collated {
    pub lines: Vec<WorkLine>,
    pub termination: Termination,
}

impl Collated {
    pub fn empty() -> Self {
        Self {
            lines: Vec::new(),
            termination: Termination::Exhausted,
        }
    }
}

#[derive(Debug)]
pub struct LineBundle {
    pub table: AuthorId,
    pub lines: Vec<WorkLine>,
}

#[derive(Debug)]
pub struct QueryFailure {
    pub table: AuthorId,
    pub message: String,
}

type Batch = std::result::Result<LineBundle, QueryFailure>;

/// Everything one pass needs to run.
#[derive(Debug)]
pub struct ExecutionPlan {
    pub search: SearchId,
    pub phase: u8,
    pub queries: Vec<PrerolledQuery>,
    pub width: usize,
    pub cap: usize,
    /// Keep only the first line a query returns.
    pub one_hit: bool,
    pub progress_every: usize,
}

pub(crate) type SharedQueue<T> = Arc<Mutex<mpsc::Receiver<T>>>;

pub async fn execute<S: LineStore>(
    store: Arc<S>,
    plan: ExecutionPlan,
    cancel: &CancelToken,
    progress: Arc<dyn ProgressSink>,
) -> Result<Collated> {
    let ExecutionPlan {
        search,
        phase,
        queries,
        width,
        cap,
        one_hit,
        progress_every,
    } = plan;
    let total = queries.len();
    progress.emit(ProgressEvent {
        search,
        phase,
        kind: ProgressKind::Launched(total),
    });
    if total == 0 {
        progress.emit(ProgressEvent { search, phase, kind: ProgressKind::Finished });
        return Ok(Collated::empty());
    }

    let width = width.clamp(1, total);
    debug!(search, phase, queries = total, width, cap, "pass launched");
    let job = cancel.child();

    let every = progress_every.max(1);
    let feeder_progress = Arc::clone(&progress);
    let queue = feed(queries, width, job.clone(), move |remaining| {
        if remaining % every == 0 {
            feeder_progress.emit(ProgressEvent {
                search,
                phase,
                kind: ProgressKind::Remaining(remaining),
            });
        }
    });

    let mut outputs = Vec::with_capacity(width);
    for _ in 0..width {
        let (found, output) = mpsc::channel::<Batch>(1);
        let store = Arc::clone(&store);
        let queue = Arc::clone(&queue);
        let job = job.clone();
        tokio::task::spawn_blocking(move || search_worker(store, queue, found, job));
        outputs.push(output);
    }
    let merged = aggregate(outputs, job.clone());

    let collated = collate(merged, cap, one_hit && phase == 1, &job, |hits| {
        progress.emit(ProgressEvent {
            search,
            phase,
            kind: ProgressKind::Hits(hits),
        })
    })
    .await;
    // stop whatever is still queued or running
    job.cancel();
    progress.emit(ProgressEvent { search, phase, kind: ProgressKind::Finished });
    collated
}

/// Emit `items` one at a time onto a channel of `capacity`, stopping early
/// on cancellation. `on_emit` sees how many items are left before each send.
pub(crate) fn feed<T: Send + 'static>(
    items: Vec<T>,
    capacity: usize,
    cancel: CancelToken,
    on_emit: impl Fn(usize) + Send + 'static,
) -> SharedQueue<T> {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        let total = items.len();
        for (i, item) in items.into_iter().enumerate() {
            on_emit(total - i);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = tx.send(item) => if sent.is_err() { break },
            }
        }
    });
    Arc::new(Mutex::new(rx))
}

/// Blocking receive from a queue shared by several workers.
pub(crate) fn pull<T>(queue: &Mutex<mpsc::Receiver<T>>) -> Option<T> {
    queue.lock().ok()?.blocking_recv()
}

/// Merge per-worker outputs into one channel that closes when every
/// forwarder has finished.
pub(crate) fn aggregate<T: Send + 'static>(
    outputs: Vec<mpsc::Receiver<T>>,
    cancel: CancelToken,
) -> mpsc::Receiver<T> {
    let (tx, merged) = mpsc::channel(outputs.len().max(1));
    for mut output in outputs {
        let tx = tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    next = output.recv() => next,
                };
                let Some(item) = next else { return };
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });
    }
    merged
}

fn search_worker<S: LineStore>(
    store: Arc<S>,
    queue: SharedQueue<PrerolledQuery>,
    found: mpsc::Sender<Batch>,
    cancel: CancelToken,
) {
    let mut conn = match store.acquire() {
        Ok(conn) => conn,
        Err(e) => {
            let _ = found.blocking_send(Err(QueryFailure {
                table: String::from("(pool)"),
                message: e.to_string(),
            }));
            return;
        }
    };
    while !cancel.is_cancelled() {
        let Some(query) = pull(&queue) else { break };
        let batch = match conn.fetch(&query) {
            Ok(lines) if lines.is_empty() => continue,
            Ok(lines) => Ok(LineBundle {
                table: query.table,
                lines,
            }),
            Err(e) => {
                warn!(table = %query.table, error = %e, "query failed");
                Err(QueryFailure {
                    table: query.table,
                    message: e.to_string(),
                })
            }
        };
        let failed = batch.is_err();
        if found.blocking_send(batch).is_err() || failed {
            break;
        }
    }
}

async fn collate(
    mut merged: mpsc::Receiver<Batch>,
    cap: usize,
    first_line_only: bool,
    job: &CancelToken,
    on_hits: impl Fn(usize),
) -> Result<Collated> {
    let mut lines: Vec<WorkLine> = Vec::new();
    // lemma forms can find the same line twice; only the first one counts
    let mut seen: HashSet<LineKey, OtherHasher> = HashSet::default();
    loop {
        let next = tokio::select! {
            biased;
            _ = job.cancelled() => {
                return Ok(Collated { lines, termination: Termination::Cancelled });
            }
            next = merged.recv() => next,
        };
        match next {
            None => {
                return Ok(Collated {
                    lines,
                    termination: Termination::Exhausted,
                });
            }
            Some(Err(failure)) => {
                job.cancel();
                return Err(SearchError::Execution {
                    table: failure.table,
                    message: failure.message,
                    collected: lines,
                });
            }
            Some(Ok(bundle)) => {
                let take = if first_line_only { 1 } else { bundle.lines.len() };
                lines.extend(
                    bundle
                        .lines
                        .into_iter()
                        .take(take)
                        .filter(|line| seen.insert(line.key())),
                );
                on_hits(lines.len());
                if lines.len() > cap {
                    lines.truncate(cap);
                    job.cancel();
                    return Ok(Collated {
                        lines,
                        termination: Termination::CapReached,
                    });
                }
            }
        }
    }
}
