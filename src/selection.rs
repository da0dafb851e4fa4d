//! Declarative search criteria as the user states them.
//!
//! Nothing here looks at the corpus; the [`crate::resolver`] turns a
//! [`Selection`] into a concrete [`crate::resolver::Scope`].

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::corpus::{AuthorId, MAX_DATE, MIN_DATE, WorkId, is_author_id};
use crate::error::{Result, SearchError};

// ------------- Boundary -------------
/// Inclusive `[start, stop]` range of line indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Boundary {
    pub start: i64,
    pub stop: i64,
}

impl Boundary {
    /// Line indices start at 1; anything lower is clamped.
    pub fn new(start: i64, stop: i64) -> Result<Self> {
        let start = start.max(1);
        if stop < start {
            return Err(SearchError::MalformedSelection(format!(
                "range {start}..{stop} ends before it starts"
            )));
        }
        Ok(Self { start, stop })
    }

    /// The proximity window `[index - distance, index + distance]`.
    pub fn around(index: i64, distance: i64) -> Self {
        let distance = distance.max(0);
        let stop = index.saturating_add(distance).max(1);
        Self {
            start: index.saturating_sub(distance).max(1).min(stop),
            stop,
        }
    }

    pub fn contains(&self, index: i64) -> bool {
        self.start <= index && index <= self.stop
    }
}

// ------------- Passage -------------
lazy_static! {
    static ref PASSAGE: Regex =
        Regex::new(r"^(?P<auth>[A-Za-z0-9]{6})_FROM_(?P<start>-?\d+)_TO_(?P<stop>-?\d+)$")
            .expect("passage pattern");
}

/// An explicit stretch of one author table, written `gr0001_FROM_40_TO_60`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Passage {
    pub author: AuthorId,
    pub boundary: Boundary,
}

impl Passage {
    pub fn new(author: &str, boundary: Boundary) -> Result<Self> {
        if !is_author_id(author) {
            return Err(SearchError::MalformedSelection(format!(
                "'{author}' is not an author id"
            )));
        }
        Ok(Self {
            author: author.to_string(),
            boundary,
        })
    }
}

impl FromStr for Passage {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || SearchError::MalformedSelection(format!("unparsable passage '{s}'"));
        let caps = PASSAGE.captures(s).ok_or_else(malformed)?;
        let start: i64 = caps["start"].parse().map_err(|_| malformed())?;
        let stop: i64 = caps["stop"].parse().map_err(|_| malformed())?;
        Passage::new(&caps["auth"], Boundary::new(start, stop)?)
    }
}

impl fmt::Display for Passage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_FROM_{}_TO_{}",
            self.author, self.boundary.start, self.boundary.stop
        )
    }
}

// ------------- Criteria -------------
/// One side of a selection: what to include, or what to exclude.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Criteria {
    pub author_genres: Vec<String>,
    pub work_genres: Vec<String>,
    pub author_locations: Vec<String>,
    pub work_locations: Vec<String>,
    pub authors: Vec<AuthorId>,
    pub works: Vec<WorkId>,
    pub passages: Vec<String>,
}

impl Criteria {
    pub fn is_empty(&self) -> bool {
        self.author_genres.is_empty()
            && self.work_genres.is_empty()
            && self.author_locations.is_empty()
            && self.work_locations.is_empty()
            && self.authors.is_empty()
            && self.works.is_empty()
            && self.passages.is_empty()
    }

    /// Genre and location categories only.
    pub fn has_categories(&self) -> bool {
        !(self.author_genres.is_empty()
            && self.work_genres.is_empty()
            && self.author_locations.is_empty()
            && self.work_locations.is_empty())
    }

    pub fn parsed_passages(&self) -> Result<Vec<Passage>> {
        self.passages.iter().map(|p| p.parse()).collect()
    }
}

// ------------- Selection -------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selection {
    pub inclusions: Criteria,
    pub exclusions: Criteria,
    /// Corpus prefixes to search; empty means all of them.
    pub corpora: Vec<String>,
    pub earliest: i64,
    pub latest: i64,
    pub varia: bool,
    pub incerta: bool,
    pub spuria: bool,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            inclusions: Criteria::default(),
            exclusions: Criteria::default(),
            corpora: Vec::new(),
            earliest: MIN_DATE,
            latest: MAX_DATE,
            varia: true,
            incerta: true,
            spuria: true,
        }
    }
}

impl Selection {
    pub fn is_active(&self, corpus: &str) -> bool {
        self.corpora.is_empty() || self.corpora.iter().any(|c| c == corpus)
    }

    pub fn dates_are_default(&self) -> bool {
        self.earliest == MIN_DATE && self.latest == MAX_DATE && self.varia && self.incerta
    }
}
