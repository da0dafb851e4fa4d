#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use concordance::config::EngineConfig;
use concordance::corpus::{Author, CorpusMap, Work};
use concordance::engine::Engine;
use concordance::storage::{LinePool, WorkLine};
use concordance::term::LemmaMap;

static DATABASES: AtomicUsize = AtomicUsize::new(0);

pub fn author(id: &str, genres: &[&str], location: &str, date: i64) -> Author {
    Author {
        id: id.to_string(),
        name: format!("author {id}"),
        genres: genres.iter().map(|g| g.to_string()).collect(),
        location: location.to_string(),
        date,
        works: Vec::new(),
    }
}

pub fn work(id: &str, genre: &str, location: &str, date: i64, first: i64, last: i64) -> Work {
    Work {
        id: id.to_string(),
        title: format!("work {id}"),
        genre: genre.to_string(),
        location: location.to_string(),
        date,
        first_line: first,
        last_line: last,
        authentic: true,
    }
}

/// A shared-cache memory pool no other test can see.
pub fn pool(tag: &str) -> LinePool {
    let n = DATABASES.fetch_add(1, Ordering::Relaxed);
    LinePool::in_memory(&format!("{tag}_{n}")).unwrap()
}

/// Lines `first..=last` of a work, filler text unless `planted` says otherwise.
pub fn lines(work: &str, first: i64, last: i64, planted: &[(i64, &str)]) -> Vec<WorkLine> {
    let planted: HashMap<i64, &str> = planted.iter().cloned().collect();
    (first..=last)
        .map(|i| match planted.get(&i) {
            Some(text) => WorkLine::new(work, i, text),
            None => WorkLine::new(work, i, &format!("lorem ipsum dolor {i}")),
        })
        .collect()
}

/// Create the table of every author in `corpus` and load `lines` into it.
pub fn load(pool: &LinePool, authors: &[&str], lines: Vec<WorkLine>) {
    for author in authors {
        pool.create_author_table(author).unwrap();
        let own: Vec<WorkLine> = lines.iter().filter(|l| l.author() == *author).cloned().collect();
        pool.insert_lines(author, &own).unwrap();
    }
}

pub fn engine(config: EngineConfig, corpus: CorpusMap, lexicon: LemmaMap, pool: LinePool) -> Engine<LinePool> {
    Engine::new(config, Arc::new(corpus), Arc::new(lexicon), Arc::new(pool))
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        worker_count: 4,
        ..EngineConfig::default()
    }
}

/// Two epic authors, one tragedian, one Latin elegist and one undated author.
pub fn sample_corpus() -> CorpusMap {
    let authors = vec![
        author("gr0001", &["Epic."], "Ionia", -750),
        author("gr0002", &["Tragic."], "Athens", -450),
        author("gr0003", &["Epic."], "Alexandria", 2500),
        author("gr0004", &["Epic.", "Hymn."], "Ionia", -700),
        author("lt0001", &["Elegiac."], "Roma", -20),
    ];
    let mut spurious = work("gr0004w002", "Hymn.", "Ionia", -700, 51, 80);
    spurious.authentic = false;
    let works = vec![
        work("gr0001w001", "Epic.", "Ionia", -750, 1, 100),
        work("gr0001w002", "Epic.", "Ionia", -750, 101, 200),
        work("gr0002w001", "Tragic.", "Athens", -450, 1, 50),
        work("gr0002w002", "Satyr.", "Athens", -440, 51, 120),
        work("gr0003w001", "Epic.", "Alexandria", 2000, 1, 30),
        work("gr0003w002", "Epic.", "Alexandria", 2500, 31, 60),
        work("gr0004w001", "Epic.", "Ionia", -700, 1, 50),
        spurious,
        work("lt0001w001", "Elegiac.", "Roma", -20, 1, 80),
    ];
    CorpusMap::new(authors, works).unwrap()
}
