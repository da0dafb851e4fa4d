//! Progress events and their sinks.
//!
//! Workers never touch a shared counter. Events are emitted into a
//! [`ProgressSink`]; the [`ProgressBoard`] sink forwards them over a channel
//! to one task that owns every counter and answers snapshot requests.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::compiler::SearchId;
use crate::corpus::OtherHasher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProgressKind {
    /// A pass started with this many queries.
    Launched(usize),
    /// Queries not yet handed to a worker.
    Remaining(usize),
    /// Lines collected so far in the pass.
    Hits(usize),
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub search: SearchId,
    pub phase: u8,
    pub kind: ProgressKind,
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Writes events to the `tracing` subscriber at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: ProgressEvent) {
        debug!(search = event.search, phase = event.phase, kind = ?event.kind, "progress");
    }
}

// ------------- Board -------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub phase: u8,
    pub queries: usize,
    pub remaining: usize,
    pub hits: usize,
    pub finished: bool,
}

enum BoardMessage {
    Event(ProgressEvent),
    Snapshot(SearchId, oneshot::Sender<Option<Progress>>),
    Forget(SearchId),
}

/// Live per-search counters with a single writer.
#[derive(Debug, Clone)]
pub struct ProgressBoard {
    tx: mpsc::UnboundedSender<BoardMessage>,
}

impl std::fmt::Debug for BoardMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoardMessage::Event(e) => write!(f, "Event({e:?})"),
            BoardMessage::Snapshot(id, _) => write!(f, "Snapshot({id})"),
            BoardMessage::Forget(id) => write!(f, "Forget({id})"),
        }
    }
}

impl ProgressBoard {
    /// Start the counter task on the current runtime.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<BoardMessage>();
        tokio::spawn(async move {
            let mut board: HashMap<SearchId, Progress, OtherHasher> = HashMap::default();
            while let Some(message) = rx.recv().await {
                match message {
                    BoardMessage::Event(event) => apply(&mut board, event),
                    BoardMessage::Snapshot(id, reply) => {
                        let _ = reply.send(board.get(&id).cloned());
                    }
                    BoardMessage::Forget(id) => {
                        board.remove(&id);
                    }
                }
            }
        });
        Self { tx }
    }

    pub async fn snapshot(&self, search: SearchId) -> Option<Progress> {
        let (reply, answer) = oneshot::channel();
        self.tx.send(BoardMessage::Snapshot(search, reply)).ok()?;
        answer.await.ok().flatten()
    }

    pub fn forget(&self, search: SearchId) {
        let _ = self.tx.send(BoardMessage::Forget(search));
    }
}

impl ProgressSink for ProgressBoard {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(BoardMessage::Event(event));
    }
}

fn apply(board: &mut HashMap<SearchId, Progress, OtherHasher>, event: ProgressEvent) {
    let entry = board.entry(event.search).or_default();
    match event.kind {
        ProgressKind::Launched(queries) => {
            *entry = Progress {
                phase: event.phase,
                queries,
                remaining: queries,
                hits: 0,
                finished: false,
            };
        }
        ProgressKind::Remaining(n) => entry.remaining = n,
        ProgressKind::Hits(n) => entry.hits = n,
        ProgressKind::Finished => {
            entry.remaining = 0;
            entry.finished = true;
        }
    }
}
