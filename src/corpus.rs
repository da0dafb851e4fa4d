//! The immutable corpus metadata read model.
//!
//! Every author owns one storage table named after its fixed-width id, and
//! every work covers a contiguous range of line indices in that table. The
//! model is loaded once and then shared by reference into the resolver and
//! the compiler; nothing mutates it afterwards.

use core::hash::{BuildHasher, BuildHasherDefault};
use std::collections::HashMap;
use std::collections::hash_map::RandomState;
use std::hash::Hash;

use seahash::SeaHasher;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

// ------------- Identifiers -------------
pub type AuthorId = String;
pub type WorkId = String;

pub type OtherHasher = BuildHasherDefault<SeaHasher>;

pub const AUTHOR_ID_WIDTH: usize = 6;
pub const WORK_ID_WIDTH: usize = 10;

// numeric dates that are not dates
pub const INCERTA_DATE: i64 = 2500;
pub const VARIA_DATE: i64 = 2000;
pub const MIN_DATE: i64 = -850;
pub const MAX_DATE: i64 = 1500;

pub fn is_author_id(id: &str) -> bool {
    id.len() == AUTHOR_ID_WIDTH && id.bytes().all(|b| b.is_ascii_alphanumeric())
}

pub fn is_work_id(id: &str) -> bool {
    id.len() == WORK_ID_WIDTH
        && id.is_ascii()
        && is_author_id(&id[..AUTHOR_ID_WIDTH])
        && id.as_bytes()[AUTHOR_ID_WIDTH] == b'w'
        && id[AUTHOR_ID_WIDTH + 1..].bytes().all(|b| b.is_ascii_alphanumeric())
}

/// The author id embedded in a work id.
pub fn author_of(work: &str) -> Option<&str> {
    if is_work_id(work) {
        Some(&work[..AUTHOR_ID_WIDTH])
    } else {
        None
    }
}

/// Two-letter corpus prefix shared by an author and its works.
pub fn corpus_of(id: &str) -> &str {
    id.get(..2).unwrap_or(id)
}

// ------------- Author -------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: AuthorId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub location: String,
    #[serde(default = "incerta")]
    pub date: i64,
    // filled in when the corpus map is assembled
    #[serde(default, skip_deserializing)]
    pub works: Vec<WorkId>,
}

fn incerta() -> i64 {
    INCERTA_DATE
}

impl Author {
    pub fn corpus(&self) -> &str {
        corpus_of(&self.id)
    }
    pub fn has_genre(&self, genre: &str) -> bool {
        self.genres.iter().any(|g| g == genre)
    }
    pub fn undated(&self) -> bool {
        self.date == INCERTA_DATE || self.date == VARIA_DATE
    }
}

// ------------- Work -------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub id: WorkId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub location: String,
    #[serde(default = "incerta")]
    pub date: i64,
    pub first_line: i64,
    pub last_line: i64,
    #[serde(default = "authentic")]
    pub authentic: bool,
}

fn authentic() -> bool {
    true
}

impl Work {
    pub fn author(&self) -> &str {
        self.id.get(..AUTHOR_ID_WIDTH).unwrap_or(&self.id)
    }
    pub fn corpus(&self) -> &str {
        corpus_of(&self.id)
    }
}

// ------------- Lookups -------------
/// One key to many values, values kept in insertion order without repeats.
#[derive(Debug)]
pub struct Lookup<K, V, H = RandomState> {
    index: HashMap<K, Vec<V>, H>,
}
impl<K: Eq + Hash, V: PartialEq, H: BuildHasher + Default> Lookup<K, V, H> {
    pub fn new() -> Self {
        Self {
            index: HashMap::<K, Vec<V>, H>::default(),
        }
    }
    pub fn insert(&mut self, key: K, value: V) {
        let values = self.index.entry(key).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }
    pub fn lookup(&self, key: &K) -> &[V] {
        self.index.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
    pub fn len(&self) -> usize {
        self.index.len()
    }
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
impl<K: Eq + Hash, V: PartialEq, H: BuildHasher + Default> Default for Lookup<K, V, H> {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Read model -------------
/// Read access to corpus metadata.
pub trait CorpusMetadata: Send + Sync {
    fn author(&self, id: &str) -> Option<&Author>;
    fn work(&self, id: &str) -> Option<&Work>;
    fn authors(&self) -> Box<dyn Iterator<Item = &Author> + '_>;

    /// First and last line of everything an author wrote.
    fn line_range(&self, author: &str) -> Option<(i64, i64)> {
        let author = self.author(author)?;
        author
            .works
            .iter()
            .filter_map(|w| self.work(w))
            .fold(None, |range, w| match range {
                None => Some((w.first_line, w.last_line)),
                Some((first, last)) => Some((first.min(w.first_line), last.max(w.last_line))),
            })
    }
}

#[derive(Debug, Deserialize)]
struct CorpusDocument {
    authors: Vec<Author>,
    works: Vec<Work>,
}

#[derive(Debug, Default)]
pub struct CorpusMap {
    authors: HashMap<AuthorId, Author, OtherHasher>,
    works: HashMap<WorkId, Work, OtherHasher>,
    // authors in id order, so scans over the corpus are reproducible
    ordered: Vec<AuthorId>,
}

impl CorpusMap {
    pub fn new(authors: Vec<Author>, works: Vec<Work>) -> Result<Self> {
        let mut map = CorpusMap::default();
        for mut author in authors {
            if !is_author_id(&author.id) {
                return Err(SearchError::MalformedSelection(format!(
                    "author id '{}' is not {AUTHOR_ID_WIDTH} alphanumerics",
                    author.id
                )));
            }
            author.works.clear();
            map.ordered.push(author.id.clone());
            map.authors.insert(author.id.clone(), author);
        }
        let mut works_of: Lookup<AuthorId, WorkId, OtherHasher> = Lookup::new();
        let mut sorted = works;
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        for work in sorted {
            let owner = match author_of(&work.id) {
                Some(owner) if map.authors.contains_key(owner) => owner.to_string(),
                _ => {
                    return Err(SearchError::MalformedSelection(format!(
                        "work '{}' does not belong to a known author",
                        work.id
                    )));
                }
            };
            if work.first_line > work.last_line {
                return Err(SearchError::MalformedSelection(format!(
                    "work '{}' ends before it starts",
                    work.id
                )));
            }
            works_of.insert(owner, work.id.clone());
            map.works.insert(work.id.clone(), work);
        }
        for (id, author) in map.authors.iter_mut() {
            author.works = works_of.lookup(id).to_vec();
        }
        map.ordered.sort();
        map.ordered.dedup();
        Ok(map)
    }

    /// Parse `{"authors": [...], "works": [...]}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let document: CorpusDocument = serde_json::from_str(json)?;
        Self::new(document.authors, document.works)
    }

    pub fn author_count(&self) -> usize {
        self.authors.len()
    }
    pub fn work_count(&self) -> usize {
        self.works.len()
    }
}

impl CorpusMetadata for CorpusMap {
    fn author(&self, id: &str) -> Option<&Author> {
        self.authors.get(id)
    }
    fn work(&self, id: &str) -> Option<&Work> {
        self.works.get(id)
    }
    fn authors(&self) -> Box<dyn Iterator<Item = &Author> + '_> {
        Box::new(self.ordered.iter().filter_map(|id| self.authors.get(id)))
    }
}
