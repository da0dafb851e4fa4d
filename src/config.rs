//! Engine configuration.
//!
//! Tuning constants (temp-table threshold, words per line, caps) are not
//! protocol, so they all live here. Values are layered with the `config`
//! crate: built-in defaults, then an optional TOML file, then environment
//! variables prefixed `CONCORDANCE_` (for example `CONCORDANCE_HIT_LIMIT=500`).

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::SearchColumn;

pub const DEFAULT_HIT_LIMIT: usize = 250;
pub const FIRST_SEARCH_LIMIT: usize = 750_000;
pub const TEMP_TABLE_THRESHOLD: usize = 100;
pub const AVG_WORDS_PER_LINE: usize = 8;
pub const PHRASE_CAP_MULTIPLIER: usize = 3;
pub const POLL_EVERY_N_TABLES: usize = 34;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub worker_count: usize,
    pub hit_limit: usize,
    pub first_search_limit: usize,
    pub temp_table_threshold: usize,
    pub avg_words_per_line: usize,
    pub phrase_cap_multiplier: usize,
    pub progress_every_n_tables: usize,
    pub search_column: SearchColumn,
    pub optimize_pair_order: bool,
    pub max_connections: usize,
    pub database: PathBuf,
    pub corpus_metadata: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexicon: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            worker_count: workers,
            hit_limit: DEFAULT_HIT_LIMIT,
            first_search_limit: FIRST_SEARCH_LIMIT,
            temp_table_threshold: TEMP_TABLE_THRESHOLD,
            avg_words_per_line: AVG_WORDS_PER_LINE,
            phrase_cap_multiplier: PHRASE_CAP_MULTIPLIER,
            progress_every_n_tables: POLL_EVERY_N_TABLES,
            search_column: SearchColumn::Stripped,
            optimize_pair_order: false,
            max_connections: 16,
            database: PathBuf::from("concordance.db"),
            corpus_metadata: PathBuf::from("corpus.json"),
            lexicon: None,
            timeout_ms: None,
        }
    }
}

impl EngineConfig {
    /// Layer defaults, the optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(path) = path {
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }
        let settings = builder
            .add_source(Environment::with_prefix("CONCORDANCE").try_parsing(true))
            .build()?;
        let mut loaded: EngineConfig = settings.try_deserialize()?;
        loaded.worker_count = loaded.worker_count.max(1);
        loaded.avg_words_per_line = loaded.avg_words_per_line.max(1);
        loaded.phrase_cap_multiplier = loaded.phrase_cap_multiplier.max(1);
        loaded.progress_every_n_tables = loaded.progress_every_n_tables.max(1);
        Ok(loaded)
    }

    /// Cap for a pass over `phrase` terms.
    pub fn active_cap(&self, nominal: usize, phrase: bool) -> usize {
        if phrase {
            nominal.saturating_mul(self.phrase_cap_multiplier)
        } else {
            nominal
        }
    }
}
