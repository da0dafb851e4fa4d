use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use concordance::config::EngineConfig;
use concordance::corpus::CorpusMap;
use concordance::engine::{Engine, SearchRequest};
use concordance::error::{Result, SearchError};
use concordance::interface::{SearchInterface, SearchOptions};
use concordance::progress::TracingSink;
use concordance::storage::{LinePool, StorageMode};
use concordance::term::LemmaMap;

fn read_file(path: &PathBuf) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| SearchError::Config(format!("cannot read {}: {e}", path.display())))
}

fn read_request(path: Option<String>) -> Result<SearchRequest> {
    let json = match path {
        Some(path) => read_file(&PathBuf::from(path))?,
        None => {
            let mut json = String::new();
            std::io::stdin()
                .read_to_string(&mut json)
                .map_err(|e| SearchError::Input(e.to_string()))?;
            json
        }
    };
    Ok(serde_json::from_str(&json)?)
}

async fn run() -> Result<()> {
    let config_path = std::env::var_os("CONCORDANCE_CONFIG").map(PathBuf::from);
    let config = EngineConfig::load(config_path.as_deref())?;
    info!(database = %config.database.display(), workers = config.worker_count, "configuration loaded");

    let corpus = CorpusMap::from_json(&read_file(&config.corpus_metadata)?)?;
    let lexicon = match &config.lexicon {
        Some(path) => LemmaMap::from_json(&read_file(path)?)?,
        None => LemmaMap::new(),
    };
    info!(
        authors = corpus.author_count(),
        works = corpus.work_count(),
        lemmata = lexicon.len(),
        "metadata loaded"
    );

    // every worker holds a connection, phrase pruning needs one more
    let store = LinePool::open(
        StorageMode::File(config.database.clone()),
        config.max_connections.max(config.worker_count + 1),
    )?;
    let timeout = config.timeout_ms.map(Duration::from_millis);
    let engine = Engine::new(config, Arc::new(corpus), Arc::new(lexicon), Arc::new(store))
        .with_progress(Arc::new(TracingSink));
    let interface = SearchInterface::new(Arc::new(engine));

    let request = read_request(std::env::args().nth(1))?;
    let handle = interface.start(request, SearchOptions { timeout })?;
    let outcome = handle.join().await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "search failed");
            ExitCode::FAILURE
        }
    }
}
