//! Scope resolution: from declarative criteria to concrete search units.
//!
//! The resolver runs in a fixed order:
//! 1. inclusion categories, or every active work when none is given;
//! 2. date pruning;
//! 3. explicit authors, works and passages, which bypass every filter;
//! 4. the authentic-only filter when spuria are disallowed;
//! 5. exclusions, expanded to works and subtracted;
//! 6. whole-author collapse.
//!
//! An author whose works are all excluded ends up in neither output list.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::corpus::{AuthorId, CorpusMetadata, INCERTA_DATE, OtherHasher, VARIA_DATE, WorkId};
use crate::error::{Result, SearchError};
use crate::selection::{Boundary, Criteria, Passage, Selection};

// ------------- Scope -------------
/// The resolved set of units a search runs against.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    /// Authors searched in full.
    pub authors: Vec<AuthorId>,
    /// Individual works of authors not searched in full.
    pub works: Vec<WorkId>,
    pub passages: Vec<Passage>,
    pub excluded_works: Vec<WorkId>,
    pub excluded_passages: Vec<Passage>,
    /// Works in scope before whole-author collapse.
    pub works_searched: usize,
}

/// One author table plus the boundaries that restrict it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    pub author: AuthorId,
    /// Empty means the whole table.
    pub inclusions: Vec<Boundary>,
    pub exclusions: Vec<Boundary>,
}

impl Unit {
    pub fn whole(author: &str) -> Self {
        Self {
            author: author.to_string(),
            inclusions: Vec::new(),
            exclusions: Vec::new(),
        }
    }
    pub fn boundary_count(&self) -> usize {
        self.inclusions.len() + self.exclusions.len()
    }
}

impl Scope {
    /// A scope made of nothing but passages, as used by a neighborhood pass.
    pub fn from_passages(passages: Vec<Passage>) -> Self {
        Self {
            passages,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty() && self.works.is_empty() && self.passages.is_empty()
    }

    /// Group the scope into per-author units: whole authors first, then
    /// bounded authors in id order.
    pub fn units(&self, corpus: &dyn CorpusMetadata) -> Result<Vec<Unit>> {
        let whole: HashSet<&str, OtherHasher> = self.authors.iter().map(String::as_str).collect();

        let mut inclusions: BTreeMap<&str, Vec<Boundary>> = BTreeMap::new();
        for id in &self.works {
            let work = corpus
                .work(id)
                .ok_or_else(|| SearchError::MalformedSelection(format!("unknown work '{id}'")))?;
            inclusions
                .entry(work.author())
                .or_default()
                .push(Boundary::new(work.first_line, work.last_line)?);
        }
        let mut passage_authors: HashSet<&str, OtherHasher> = HashSet::default();
        for passage in &self.passages {
            passage_authors.insert(&passage.author);
            inclusions
                .entry(&passage.author)
                .or_default()
                .push(passage.boundary);
        }

        let mut exclusions: BTreeMap<&str, Vec<Boundary>> = BTreeMap::new();
        for id in &self.excluded_works {
            let Some(work) = corpus.work(id) else { continue };
            // excluded works were already subtracted; they only carve up passages
            if passage_authors.contains(work.author()) {
                exclusions
                    .entry(work.author())
                    .or_default()
                    .push(Boundary::new(work.first_line, work.last_line)?);
            }
        }
        for passage in &self.excluded_passages {
            exclusions
                .entry(&passage.author)
                .or_default()
                .push(passage.boundary);
        }

        let mut units = Vec::with_capacity(self.authors.len() + inclusions.len());
        for author in &self.authors {
            units.push(Unit {
                author: author.clone(),
                inclusions: Vec::new(),
                exclusions: exclusions.get(author.as_str()).cloned().unwrap_or_default(),
            });
        }
        for (author, mut bounds) in inclusions {
            if whole.contains(author) {
                continue;
            }
            bounds.sort();
            bounds.dedup();
            units.push(Unit {
                author: author.to_string(),
                inclusions: bounds,
                exclusions: exclusions.get(author).cloned().unwrap_or_default(),
            });
        }
        Ok(units)
    }
}

// ------------- Resolution -------------
pub fn resolve(selection: &Selection, corpus: &dyn CorpusMetadata) -> Result<Scope> {
    let inc = &selection.inclusions;
    let exc = &selection.exclusions;
    check_members(inc, corpus)?;
    check_members(exc, corpus)?;
    let passages = inc.parsed_passages()?;
    let excluded_passages = exc.parsed_passages()?;
    for passage in passages.iter().chain(excluded_passages.iter()) {
        if corpus.author(&passage.author).is_none() {
            return Err(SearchError::MalformedSelection(format!(
                "passage '{passage}' names an unknown author"
            )));
        }
    }

    let mut works: Vec<WorkId> = Vec::new();
    if inc.has_categories() {
        works = matching_works(inc, selection, corpus);
        works = prune_by_date(works, selection, corpus);
    } else if inc.is_empty() {
        works = active_works(selection, corpus);
        works = prune_by_date(works, selection, corpus);
    }

    for author in &inc.authors {
        if let Some(author) = corpus.author(author) {
            works.extend(author.works.iter().cloned());
        }
    }
    works.extend(inc.works.iter().cloned());

    if !selection.spuria {
        works.retain(|w| corpus.work(w).is_some_and(|w| w.authentic));
    }

    let excluded = excluded_works(exc, selection, corpus);
    works.retain(|w| !excluded.contains(w));
    let works = unique(works);
    let works_searched = works.len();

    let (authors, works) = collapse_whole_authors(&works, corpus);
    let mut excluded_works: Vec<WorkId> = excluded.into_iter().collect();
    excluded_works.sort();

    debug!(
        authors = authors.len(),
        works = works.len(),
        passages = passages.len(),
        works_searched,
        "scope resolved"
    );
    Ok(Scope {
        authors,
        works,
        passages: unique(passages),
        excluded_works,
        excluded_passages: unique(excluded_passages),
        works_searched,
    })
}

fn check_members(criteria: &Criteria, corpus: &dyn CorpusMetadata) -> Result<()> {
    if let Some(id) = criteria.authors.iter().find(|a| corpus.author(a).is_none()) {
        return Err(SearchError::MalformedSelection(format!("unknown author '{id}'")));
    }
    if let Some(id) = criteria.works.iter().find(|w| corpus.work(w).is_none()) {
        return Err(SearchError::MalformedSelection(format!("unknown work '{id}'")));
    }
    Ok(())
}

fn active_works(selection: &Selection, corpus: &dyn CorpusMetadata) -> Vec<WorkId> {
    corpus
        .authors()
        .filter(|a| selection.is_active(a.corpus()))
        .flat_map(|a| a.works.iter().cloned())
        .collect()
}

/// Works named by genre or location categories within the active corpora.
fn matching_works(
    criteria: &Criteria,
    selection: &Selection,
    corpus: &dyn CorpusMetadata,
) -> Vec<WorkId> {
    let mut found = Vec::new();
    for author in corpus.authors().filter(|a| selection.is_active(a.corpus())) {
        if criteria.author_genres.iter().any(|g| author.has_genre(g))
            || criteria.author_locations.contains(&author.location)
        {
            found.extend(author.works.iter().cloned());
        }
        for work in author.works.iter().filter_map(|w| corpus.work(w)) {
            if criteria.work_genres.contains(&work.genre)
                || criteria.work_locations.contains(&work.location)
            {
                found.push(work.id.clone());
            }
        }
    }
    found
}

fn excluded_works(
    criteria: &Criteria,
    selection: &Selection,
    corpus: &dyn CorpusMetadata,
) -> HashSet<WorkId, OtherHasher> {
    let mut excluded: HashSet<WorkId, OtherHasher> = HashSet::default();
    for author in &criteria.authors {
        if let Some(author) = corpus.author(author) {
            excluded.extend(author.works.iter().cloned());
        }
    }
    excluded.extend(matching_works(criteria, selection, corpus));
    excluded.extend(criteria.works.iter().cloned());
    excluded
}

/// Keep works whose author or own date lies in range, then re-admit the
/// undated classes whose toggles are on.
pub fn prune_by_date(
    works: Vec<WorkId>,
    selection: &Selection,
    corpus: &dyn CorpusMetadata,
) -> Vec<WorkId> {
    if selection.dates_are_default() {
        return works;
    }
    let latest = selection.latest;
    let earliest = selection.earliest.min(latest);
    let in_range = |d: i64| earliest <= d && d <= latest;

    works
        .into_iter()
        .filter(|id| {
            let Some(work) = corpus.work(id) else { return false };
            let Some(author) = corpus.author(work.author()) else { return false };
            if in_range(author.date) || in_range(work.date) {
                return true;
            }
            (selection.varia && author.undated() && work.date == VARIA_DATE)
                || (selection.incerta && author.undated() && work.date == INCERTA_DATE)
        })
        .collect()
}

/// Replace the works of every fully covered author with the author itself.
pub fn collapse_whole_authors(
    works: &[WorkId],
    corpus: &dyn CorpusMetadata,
) -> (Vec<AuthorId>, Vec<WorkId>) {
    let works = unique(works.to_vec());
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for id in &works {
        if let Some(work) = corpus.work(id) {
            *counts.entry(work.author()).or_default() += 1;
        }
    }
    let whole: Vec<AuthorId> = counts
        .into_iter()
        .filter(|(author, n)| {
            corpus
                .author(author)
                .is_some_and(|a| !a.works.is_empty() && a.works.len() == *n)
        })
        .map(|(author, _)| author.to_string())
        .collect();
    let remaining = works
        .iter()
        .filter(|id| {
            corpus
                .work(id)
                .is_none_or(|w| !whole.iter().any(|a| a == w.author()))
        })
        .cloned()
        .collect();
    (whole, remaining)
}

fn unique<T: Clone + Eq + std::hash::Hash>(items: Vec<T>) -> Vec<T> {
    let mut seen: HashSet<T, OtherHasher> = HashSet::default();
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}
