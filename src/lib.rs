//! Concordance – full-text search over a corpus partitioned into one storage
//! table per author.
//!
//! A search moves through four stages:
//! * [`resolver`] – turns inclusion/exclusion criteria ([`selection::Selection`])
//!   and the corpus metadata read model ([`corpus::CorpusMetadata`]) into a
//!   [`resolver::Scope`] of whole authors, works and passages, grouped into
//!   per-author [`resolver::Unit`]s.
//! * [`compiler`] – turns one unit plus one search form into a
//!   [`compiler::PrerolledQuery`], choosing among six fixed templates and
//!   materializing a temp-table allow-list when a unit has many boundaries.
//! * [`executor`] – runs the prerolled queries with a bounded pool of
//!   workers, each holding one pooled connection, and collates the lines
//!   under a cap with cooperative cancellation.
//! * [`proximity`] – two-phase "A near B" searches by line or word distance,
//!   built from two full passes through the stages above.
//!
//! The [`engine::Engine`] ties the stages together and the
//! [`interface::SearchInterface`] runs searches as cancellable tasks.
//!
//! ## Terms
//! A [`term::Term`] is a literal pattern, a lemma, or "everything". Lemmata
//! are expanded through a [`term::TermExpander`] into surface forms, and each
//! form is compiled and executed as a query of its own rather than merged
//! into one alternation.
//!
//! ## Storage
//! Lines live in SQLite (through `rusqlite`), one table per author, with a
//! `regexp` function registered on every connection. See [`storage`].
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use concordance::config::EngineConfig;
//! use concordance::corpus::{Author, CorpusMap, Work};
//! use concordance::engine::Engine;
//! use concordance::interface::CancelToken;
//! use concordance::selection::Selection;
//! use concordance::storage::{LinePool, WorkLine};
//! use concordance::term::{LemmaMap, Term};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let author = Author { id: "lt0690".into(), name: "Vergil".into(), genres: vec![],
//!     location: String::new(), date: -19, works: vec![] };
//! let work = Work { id: "lt0690w003".into(), title: "Aeneid".into(), genre: "Epic.".into(),
//!     location: String::new(), date: -19, first_line: 1, last_line: 2, authentic: true };
//! let corpus = CorpusMap::new(vec![author], vec![work]).unwrap();
//!
//! let pool = LinePool::in_memory("quickstart").unwrap();
//! pool.create_author_table("lt0690").unwrap();
//! pool.insert_lines("lt0690", &[
//!     WorkLine::new("lt0690w003", 1, "arma virumque cano troiae qui primus ab oris"),
//!     WorkLine::new("lt0690w003", 2, "italiam fato profugus laviniaque venit"),
//! ]).unwrap();
//!
//! let engine = Engine::new(EngineConfig::default(), Arc::new(corpus),
//!     Arc::new(LemmaMap::new()), Arc::new(pool));
//! let outcome = engine
//!     .simple_search(&Term::Literal("cano".into()), &Selection::default(), 10, false, &CancelToken::new())
//!     .await
//!     .unwrap();
//! assert_eq!(outcome.lines.len(), 1);
//! # });
//! ```

pub mod compiler;
pub mod config;
pub mod corpus;
pub mod engine;
pub mod error;
pub mod executor;
pub mod interface;
pub mod phrase;
pub mod progress;
pub mod proximity;
pub mod resolver;
pub mod selection;
pub mod storage;
pub mod term;
pub mod window;
