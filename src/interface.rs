//! Asynchronous interface for submitting and controlling searches.
//!
//! Every search runs as its own task on the tokio runtime and can be
//! cancelled by id. Cancellation is cooperative: it halts query submission
//! and lets workers exit at their next loop iteration, but a query already
//! executing in storage runs to completion.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::{Engine, SearchOutcome, SearchRequest};
use crate::error::{Result, SearchError};
use crate::storage::LineStore;

/// Cancellation token shared by everything working on one search. A child
/// token is cancelled with its parent, but cancelling the child leaves the
/// parent alone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<watch::Sender<bool>>,
    parent: Option<Box<CancelToken>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

async fn raised(mut flag: watch::Receiver<bool>) {
    let _ = flag.wait_for(|cancelled| *cancelled).await;
}

impl CancelToken {
    pub fn new() -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
            parent: None,
        }
    }
    pub fn child(&self) -> Self {
        let (flag, _) = watch::channel(false);
        Self {
            flag: Arc::new(flag),
            parent: Some(Box::new(self.clone())),
        }
    }
    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }
    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow() || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }
    /// Resolves once this token or any ancestor is cancelled.
    pub fn cancelled(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let own = self.flag.subscribe();
        Box::pin(async move {
            match &self.parent {
                None => raised(own).await,
                Some(parent) => {
                    tokio::select! {
                        _ = raised(own) => {}
                        _ = parent.cancelled() => {}
                    }
                }
            }
        })
    }
}

/// Opaque search ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TicketId(u64);

/// Handle to a running or completed search.
pub struct SearchHandle {
    pub id: TicketId,
    cancel: CancelToken,
    started: Instant,
    join: JoinHandle<Result<SearchOutcome>>,
}

impl SearchHandle {
    /// Request cancellation. Lines collected so far are still returned.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
    /// Wait for the search to finish.
    pub async fn join(self) -> Result<SearchOutcome> {
        self.join.await?
    }
    /// Elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Search submission options.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub timeout: Option<Duration>,
}

type ActiveSearches = Arc<Mutex<HashMap<TicketId, CancelToken>>>;

/// Registry managing search lifecycles.
pub struct SearchInterface<S: LineStore> {
    engine: Arc<Engine<S>>,
    next_id: Mutex<u64>,
    active: ActiveSearches,
}

impl<S: LineStore> SearchInterface<S> {
    pub fn new(engine: Arc<Engine<S>>) -> Self {
        Self {
            engine,
            next_id: Mutex::new(0),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn engine(&self) -> &Arc<Engine<S>> {
        &self.engine
    }

    fn allocate_id(&self) -> Result<TicketId> {
        let mut g = self
            .next_id
            .lock()
            .map_err(|e| SearchError::Lock(e.to_string()))?;
        *g += 1;
        Ok(TicketId(*g))
    }

    /// Submit a search to run on its own task.
    pub fn start(&self, request: SearchRequest, options: SearchOptions) -> Result<SearchHandle> {
        let id = self.allocate_id()?;
        let cancel = CancelToken::new();
        self.active
            .lock()
            .map_err(|e| SearchError::Lock(e.to_string()))?
            .insert(id, cancel.clone());

        if let Some(timeout) = options.timeout {
            let timer = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        warn!(ticket = id.0, ms = timeout.as_millis() as u64, "search timed out");
                        timer.cancel();
                    }
                    _ = timer.cancelled() => {}
                }
            });
        }

        let engine = Arc::clone(&self.engine);
        let active = Arc::clone(&self.active);
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            let outcome = engine.search(&request, &token).await;
            // wakes the timer, if any
            token.cancel();
            if let Ok(mut active) = active.lock() {
                active.remove(&id);
            }
            outcome
        });
        info!(ticket = id.0, "search submitted");
        Ok(SearchHandle {
            id,
            cancel,
            started: Instant::now(),
            join,
        })
    }

    /// Run a search on the current task.
    pub async fn run(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        self.engine.search(request, &CancelToken::new()).await
    }

    /// Cancel a search by id.
    pub fn cancel(&self, id: TicketId) -> bool {
        match self.active.lock() {
            Ok(active) => match active.get(&id) {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().map(|a| a.len()).unwrap_or(0)
    }
}
