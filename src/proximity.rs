//! Two-phase proximity searches: "A within N lines of B" and "A within N
//! words of B", each with a near and a not-near polarity.
//!
//! Both run an anchor pass for A, build a synthetic scope around every
//! anchor hit and run a neighborhood pass inside it. The second pass never
//! starts before the first has finished.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::corpus::OtherHasher;
use crate::engine::{Engine, Pass, SearchOutcome};
use crate::error::Result;
use crate::executor::{Termination, aggregate, feed, pull};
use crate::interface::CancelToken;
use crate::resolver::{Scope, resolve};
use crate::selection::{Boundary, Passage, Selection};
use crate::storage::{LineStore, WorkLine};
use crate::term::{ExpandedTerm, Term};
use crate::window::WindowChecker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    #[default]
    Near,
    NotNear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityScope {
    #[default]
    Lines,
    Words,
}

/// Put the term that should be cheaper to find first. Only valid for
/// "near", where the pair is symmetric.
pub fn quickest_first(anchor: Term, target: Term) -> (Term, Term) {
    let swap = match (&anchor, &target) {
        (Term::Lemma(_), Term::Literal(_)) => true,
        (Term::Literal(a), Term::Literal(b)) => {
            !a.trim().contains(' ') && !b.trim().contains(' ') && b.trim().len() > a.trim().len()
        }
        _ => false,
    };
    if swap { (target, anchor) } else { (anchor, target) }
}

/// The windows `[index - distance, index + distance]` around every hit.
pub fn windows(hits: &[WorkLine], distance: i64) -> Vec<Passage> {
    hits.iter()
        .map(|hit| Passage {
            author: hit.author().to_string(),
            boundary: Boundary::around(hit.index, distance),
        })
        .collect()
}

/// Sorted line indices per work, each paired with the line's position in
/// the slice it was built from.
struct Positions<'a> {
    by_work: HashMap<&'a str, Vec<(i64, usize)>, OtherHasher>,
}

impl<'a> Positions<'a> {
    fn new(lines: &'a [WorkLine]) -> Self {
        let mut by_work: HashMap<&str, Vec<(i64, usize)>, OtherHasher> = HashMap::default();
        for (position, line) in lines.iter().enumerate() {
            by_work
                .entry(line.work.as_str())
                .or_default()
                .push((line.index, position));
        }
        for indices in by_work.values_mut() {
            indices.sort_unstable();
        }
        Self { by_work }
    }

    /// The lines of `work` at most `distance` away from `index`.
    fn around(&self, work: &str, index: i64, distance: i64) -> &[(i64, usize)] {
        let Some(indices) = self.by_work.get(work) else {
            return &[];
        };
        let from = indices.partition_point(|&(i, _)| i < index.saturating_sub(distance));
        let to = indices.partition_point(|&(i, _)| i <= index.saturating_add(distance));
        &indices[from..to]
    }
}

/// Anchors with no `found` line of the same work within `distance` lines.
pub fn not_near_lines(anchors: Vec<WorkLine>, found: &[WorkLine], distance: i64) -> Vec<WorkLine> {
    let found = Positions::new(found);
    anchors
        .into_iter()
        .filter(|anchor| found.around(&anchor.work, anchor.index, distance).is_empty())
        .collect()
}

/// Both terms expanded, so a bad B fails before A is searched.
fn checked_pair<S: LineStore>(
    engine: &Engine<S>,
    anchor: &Term,
    target: &Term,
) -> Result<(ExpandedTerm, ExpandedTerm)> {
    Ok((engine.expand(anchor)?, engine.expand(target)?))
}

// ------------- Lines -------------
#[allow(clippy::too_many_arguments)]
pub async fn within_lines<S: LineStore>(
    engine: &Engine<S>,
    anchor: &Term,
    target: &Term,
    distance: usize,
    polarity: Polarity,
    selection: &Selection,
    limit: usize,
    cancel: &CancelToken,
) -> Result<SearchOutcome> {
    let launch = engine.launch();
    let config = engine.config();
    let (anchor, target) = checked_pair(engine, anchor, target)?;
    let scope = resolve(selection, engine.corpus())?;

    let first = engine
        .run_pass(
            Pass {
                search: launch.search,
                phase: 1,
                term: &anchor,
                units: scope.units(engine.corpus())?,
                limit: config.first_search_limit,
                one_hit: false,
            },
            cancel,
        )
        .await?;
    if first.lines.is_empty() || cancel.is_cancelled() {
        let termination = if cancel.is_cancelled() { Termination::Cancelled } else { first.termination };
        return Ok(engine.finish(launch, Vec::new(), termination, scope.works_searched, first.queries));
    }

    let distance = i64::try_from(distance).unwrap_or(i64::MAX);
    let neighborhood = Scope::from_passages(windows(&first.lines, distance));
    // a capped B pass could let anchors through that a full one would drop
    let second_limit = match polarity {
        Polarity::Near => limit,
        Polarity::NotNear => config.first_search_limit,
    };
    let second = engine
        .run_pass(
            Pass {
                search: launch.search,
                phase: 2,
                term: &target,
                units: neighborhood.units(engine.corpus())?,
                limit: second_limit,
                one_hit: false,
            },
            cancel,
        )
        .await?;
    debug!(
        search = launch.search,
        anchors = first.lines.len(),
        found = second.lines.len(),
        "line neighborhoods searched"
    );

    let queries = first.queries + second.queries;
    // dropped anchors and missing neighbors both leave the result short
    let mut termination = first.termination.merge(second.termination);
    let mut lines = match polarity {
        Polarity::Near => second.lines,
        Polarity::NotNear => not_near_lines(first.lines, &second.lines, distance),
    };
    if lines.len() > limit {
        lines.truncate(limit);
        termination = Termination::CapReached;
    }
    Ok(engine.finish(launch, lines, termination, scope.works_searched, queries))
}

// ------------- Words -------------
#[allow(clippy::too_many_arguments)]
pub async fn within_words<S: LineStore>(
    engine: &Engine<S>,
    anchor: &Term,
    target: &Term,
    distance: usize,
    polarity: Polarity,
    selection: &Selection,
    limit: usize,
    cancel: &CancelToken,
) -> Result<SearchOutcome> {
    let launch = engine.launch();
    let config = engine.config();
    let (anchor, target) = checked_pair(engine, anchor, target)?;
    let target_words = target.words().len();
    let headroom = if target_words > 1 { distance + target_words } else { distance };
    let checker = Arc::new(WindowChecker::new(
        &anchor.alternation(),
        &target.alternation(),
        headroom,
        polarity,
    )?);
    let scope = resolve(selection, engine.corpus())?;

    let first = engine
        .run_pass(
            Pass {
                search: launch.search,
                phase: 1,
                term: &anchor,
                units: scope.units(engine.corpus())?,
                limit: config.first_search_limit,
                one_hit: false,
            },
            cancel,
        )
        .await?;
    if first.lines.is_empty() || cancel.is_cancelled() {
        let termination = if cancel.is_cancelled() { Termination::Cancelled } else { first.termination };
        return Ok(engine.finish(launch, Vec::new(), termination, scope.works_searched, first.queries));
    }

    // whole lines on either side, generous enough to hold `distance` words
    let need = (2 + distance / config.avg_words_per_line.max(1)) as i64;
    let neighborhood = windows(&first.lines, need);

    let everything = engine.expand(&Term::Everything)?;
    let second = engine
        .run_pass(
            Pass {
                search: launch.search,
                phase: 2,
                term: &everything,
                units: Scope::from_passages(neighborhood).units(engine.corpus())?,
                limit: config.first_search_limit,
                one_hit: false,
            },
            cancel,
        )
        .await?;

    let column = config.search_column;
    let anchors = Positions::new(&first.lines);
    let mut bundles: Vec<Vec<&WorkLine>> = vec![Vec::new(); first.lines.len()];
    for line in &second.lines {
        for &(_, anchor_id) in anchors.around(&line.work, line.index, need) {
            bundles[anchor_id].push(line);
        }
    }
    let texts: Vec<(usize, String)> = bundles
        .into_iter()
        .enumerate()
        .map(|(anchor_id, mut lines)| {
            lines.sort_by_key(|l| l.index);
            let text = lines
                .iter()
                .map(|l| l.text(column))
                .collect::<Vec<_>>()
                .join(" ");
            (anchor_id, text)
        })
        .collect();
    debug!(
        search = launch.search,
        anchors = first.lines.len(),
        neighborhood_lines = second.lines.len(),
        "word neighborhoods assembled"
    );

    let (mut hits, capped) = check_windows(texts, checker, config.worker_count, limit, cancel).await;
    hits.sort_unstable();
    hits.truncate(limit);
    let termination = if cancel.is_cancelled() {
        Termination::Cancelled
    } else if capped {
        Termination::CapReached
    } else {
        first.termination.merge(second.termination)
    };
    let lines = hits
        .into_iter()
        .map(|anchor_id| first.lines[anchor_id].clone())
        .collect();
    Ok(engine.finish(
        launch,
        lines,
        termination,
        scope.works_searched,
        first.queries + second.queries,
    ))
}

/// Test every neighborhood with `width` blocking workers. Returns the ids of
/// the hits and whether collection stopped because there were more than
/// `limit` of them.
async fn check_windows(
    texts: Vec<(usize, String)>,
    checker: Arc<WindowChecker>,
    width: usize,
    limit: usize,
    cancel: &CancelToken,
) -> (Vec<usize>, bool) {
    if texts.is_empty() {
        return (Vec::new(), false);
    }
    let width = width.clamp(1, texts.len());
    let job = cancel.child();
    let queue = feed(texts, width, job.clone(), |_| {});

    let mut outputs = Vec::with_capacity(width);
    for _ in 0..width {
        let (found, output) = mpsc::channel::<usize>(1);
        let queue = Arc::clone(&queue);
        let checker = Arc::clone(&checker);
        let job = job.clone();
        tokio::task::spawn_blocking(move || {
            while !job.is_cancelled() {
                let Some((anchor_id, text)) = pull(&queue) else { break };
                if checker.is_hit(&text) && found.blocking_send(anchor_id).is_err() {
                    break;
                }
            }
        });
        outputs.push(output);
    }
    let mut merged = aggregate(outputs, job.clone());

    let mut hits = Vec::new();
    let mut capped = false;
    loop {
        let next = tokio::select! {
            biased;
            _ = job.cancelled() => None,
            next = merged.recv() => next,
        };
        let Some(anchor_id) = next else { break };
        hits.push(anchor_id);
        if hits.len() > limit {
            capped = true;
            break;
        }
    }
    job.cancel();
    (hits, capped)
}
