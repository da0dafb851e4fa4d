//! The search engine facade.
//!
//! An [`Engine`] owns the metadata read model, the term expander, the line
//! store and the progress sink. Every search runs one or two passes, each
//! going through resolution, compilation and execution.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::compiler::{QueryPlanner, SearchId};
use crate::config::EngineConfig;
use crate::corpus::CorpusMetadata;
use crate::error::{Result, SearchError};
use crate::executor::{ExecutionPlan, Termination, execute};
use crate::interface::CancelToken;
use crate::phrase::{self, PhraseMatcher};
use crate::progress::{NullSink, ProgressSink};
use crate::proximity::{self, Polarity, ProximityScope};
use crate::resolver::{Unit, resolve};
use crate::selection::Selection;
use crate::storage::{LineConnection, LineStore, WorkLine};
use crate::term::{ExpandedTerm, Term, TermExpander};

// ------------- Requests -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProximitySpec {
    pub distance: usize,
    #[serde(default)]
    pub scope: ProximityScope,
    #[serde(default)]
    pub polarity: Polarity,
}

impl Default for ProximitySpec {
    fn default() -> Self {
        Self {
            distance: 1,
            scope: ProximityScope::Lines,
            polarity: Polarity::Near,
        }
    }
}

/// A search as a caller describes it: box A, an optional box B, and the
/// selection to search in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub seeking: String,
    pub lemma: String,
    pub proximate: String,
    pub proximate_lemma: String,
    pub proximity: Option<ProximitySpec>,
    pub selection: Selection,
    pub limit: Option<usize>,
    pub one_hit: bool,
}

/// What a request turns into once its boxes are cleaned up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchPlan {
    Simple(Term),
    Proximity {
        anchor: Term,
        target: Term,
        spec: ProximitySpec,
    },
}

fn box_term(literal: &str, lemma: &str) -> Result<Option<Term>> {
    let literal = literal.to_lowercase();
    let lemma = lemma.trim().to_lowercase();
    match (literal.trim().is_empty(), lemma.is_empty()) {
        (true, true) => Ok(None),
        (false, true) => Ok(Some(Term::Literal(literal))),
        (true, false) => Ok(Some(Term::Lemma(lemma))),
        (false, false) => Err(SearchError::Input(format!(
            "'{literal}' and lemma '{lemma}' cannot share one search box"
        ))),
    }
}

impl SearchRequest {
    pub fn plan(&self) -> Result<SearchPlan> {
        let first = box_term(&self.seeking, &self.lemma)?;
        let second = box_term(&self.proximate, &self.proximate_lemma)?;
        match (first, second) {
            (None, None) => Err(SearchError::Input("nothing to search for".into())),
            (Some(term), None) | (None, Some(term)) => Ok(SearchPlan::Simple(term)),
            (Some(anchor), Some(target)) => Ok(SearchPlan::Proximity {
                anchor,
                target,
                spec: self.proximity.unwrap_or_default(),
            }),
        }
    }
}

// ------------- Outcomes -------------
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub search: SearchId,
    pub launched: DateTime<Utc>,
    pub elapsed_ms: f64,
    pub lines: Vec<WorkLine>,
    pub termination: Termination,
    pub works_searched: usize,
    pub queries: usize,
}

impl SearchOutcome {
    pub fn truncated(&self) -> bool {
        self.termination == Termination::CapReached
    }
}

pub(crate) struct Pass<'a> {
    pub search: SearchId,
    pub phase: u8,
    pub term: &'a ExpandedTerm,
    pub units: Vec<Unit>,
    pub limit: usize,
    pub one_hit: bool,
}

#[derive(Debug)]
pub(crate) struct PassOutcome {
    pub lines: Vec<WorkLine>,
    pub termination: Termination,
    pub queries: usize,
}

/// Bookkeeping shared by every kind of search.
pub(crate) struct Launch {
    pub search: SearchId,
    pub launched: DateTime<Utc>,
    started: Instant,
}

// ------------- Engine -------------
pub struct Engine<S: LineStore> {
    config: EngineConfig,
    corpus: Arc<dyn CorpusMetadata>,
    lexicon: Arc<dyn TermExpander>,
    store: Arc<S>,
    progress: Arc<dyn ProgressSink>,
    next_id: AtomicU64,
}

impl<S: LineStore> Engine<S> {
    pub fn new(
        config: EngineConfig,
        corpus: Arc<dyn CorpusMetadata>,
        lexicon: Arc<dyn TermExpander>,
        store: Arc<S>,
    ) -> Self {
        Self {
            config,
            corpus,
            lexicon,
            store,
            progress: Arc::new(NullSink),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
    pub fn corpus(&self) -> &dyn CorpusMetadata {
        self.corpus.as_ref()
    }
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn allocate_id(&self) -> SearchId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn launch(&self) -> Launch {
        Launch {
            search: self.allocate_id(),
            launched: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Expand a term and make sure its patterns compile before any query
    /// carries them into storage.
    pub fn expand(&self, term: &Term) -> Result<ExpandedTerm> {
        let expanded = ExpandedTerm::expand(term, self.lexicon.as_ref())?;
        expanded.matcher()?;
        Ok(expanded)
    }

    /// Run whatever the request describes.
    pub async fn search(&self, request: &SearchRequest, cancel: &CancelToken) -> Result<SearchOutcome> {
        let limit = request.limit.unwrap_or(self.config.hit_limit);
        match request.plan()? {
            SearchPlan::Simple(term) => {
                self.simple_search(&term, &request.selection, limit, request.one_hit, cancel)
                    .await
            }
            SearchPlan::Proximity {
                anchor,
                target,
                spec,
            } => {
                let (anchor, target) =
                    if self.config.optimize_pair_order && spec.polarity == Polarity::Near {
                        proximity::quickest_first(anchor, target)
                    } else {
                        (anchor, target)
                    };
                match spec.scope {
                    ProximityScope::Lines => {
                        proximity::within_lines(
                            self,
                            &anchor,
                            &target,
                            spec.distance,
                            spec.polarity,
                            &request.selection,
                            limit,
                            cancel,
                        )
                        .await
                    }
                    ProximityScope::Words => {
                        proximity::within_words(
                            self,
                            &anchor,
                            &target,
                            spec.distance,
                            spec.polarity,
                            &request.selection,
                            limit,
                            cancel,
                        )
                        .await
                    }
                }
            }
        }
    }

    pub async fn simple_search(
        &self,
        term: &Term,
        selection: &Selection,
        limit: usize,
        one_hit: bool,
        cancel: &CancelToken,
    ) -> Result<SearchOutcome> {
        let launch = self.launch();
        let term = self.expand(term)?;
        let scope = resolve(selection, self.corpus())?;
        let units = scope.units(self.corpus())?;
        let pass = self
            .run_pass(
                Pass {
                    search: launch.search,
                    phase: 1,
                    term: &term,
                    units,
                    limit,
                    one_hit,
                },
                cancel,
            )
            .await?;
        Ok(self.finish(launch, pass.lines, pass.termination, scope.works_searched, pass.queries))
    }

    /// Every line of a selection, up to `limit`.
    pub async fn gather_lines(
        &self,
        selection: &Selection,
        limit: usize,
        cancel: &CancelToken,
    ) -> Result<SearchOutcome> {
        self.simple_search(&Term::Everything, selection, limit, false, cancel)
            .await
    }

    pub(crate) async fn run_pass(&self, pass: Pass<'_>, cancel: &CancelToken) -> Result<PassOutcome> {
        let phrase = pass.term.is_phrase();
        let cap = self.config.active_cap(pass.limit, phrase);
        let queries = QueryPlanner {
            search: pass.search,
            phase: pass.phase,
            column: self.config.search_column,
            limit: cap,
            temp_table_threshold: self.config.temp_table_threshold,
            corpus: self.corpus(),
        }
        .compile_all(&pass.units, pass.term);
        let issued = queries.len();

        let collated = execute(
            Arc::clone(&self.store),
            ExecutionPlan {
                search: pass.search,
                phase: pass.phase,
                queries,
                width: self.config.worker_count,
                cap,
                one_hit: pass.one_hit,
                progress_every: self.config.progress_every_n_tables,
            },
            cancel,
            Arc::clone(&self.progress),
        )
        .await?;

        let mut lines = collated.lines;
        if phrase && !lines.is_empty() {
            lines = self.prune_phrase(lines, pass.term).await?;
        }
        let mut termination = collated.termination;
        if lines.len() > pass.limit {
            lines.truncate(pass.limit);
            termination = Termination::CapReached;
        }
        Ok(PassOutcome {
            lines,
            termination,
            queries: issued,
        })
    }

    async fn prune_phrase(&self, lines: Vec<WorkLine>, term: &ExpandedTerm) -> Result<Vec<WorkLine>> {
        let Some(form) = term.forms.iter().find(|f| f.phrase) else {
            return Ok(lines);
        };
        let matcher = PhraseMatcher::new(&form.pattern, &term.words())?;
        let column = self.config.search_column;
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || {
            let mut conn = store.acquire()?;
            phrase::prune(lines, &matcher, column, |table, index| conn.line(table, index))
        })
        .await?
    }

    pub(crate) fn finish(
        &self,
        launch: Launch,
        lines: Vec<WorkLine>,
        termination: Termination,
        works_searched: usize,
        queries: usize,
    ) -> SearchOutcome {
        let elapsed_ms = launch.started.elapsed().as_secs_f64() * 1000.0;
        info!(
            search = launch.search,
            ms = elapsed_ms,
            hits = lines.len(),
            ?termination,
            works = works_searched,
            queries,
            "search complete"
        );
        SearchOutcome {
            search: launch.search,
            launched: launch.launched,
            elapsed_ms,
            lines,
            termination,
            works_searched,
            queries,
        }
    }
}
