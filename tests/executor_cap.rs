mod common;

use std::sync::Arc;

use concordance::compiler::{PrerolledQuery, QueryPlanner};
use concordance::corpus::CorpusMap;
use concordance::error::SearchError;
use concordance::executor::{ExecutionPlan, Termination, execute};
use concordance::interface::CancelToken;
use concordance::progress::{NullSink, ProgressBoard, ProgressSink};
use concordance::resolver::Unit;
use concordance::storage::{LinePool, SearchColumn};
use concordance::term::{ExpandedTerm, LemmaMap, Term};

fn table(n: usize) -> String {
    format!("gr{:04}", 100 + n)
}

/// `authors` tables of `per_author` filler lines each.
fn filled_pool(tag: &str, authors: usize, per_author: i64) -> LinePool {
    let pool = common::pool(tag);
    for n in 0..authors {
        let author = table(n);
        pool.create_author_table(&author).unwrap();
        pool.insert_lines(&author, &common::lines(&format!("{author}w001"), 1, per_author, &[]))
            .unwrap();
    }
    pool
}

fn queries(search: u64, tables: impl IntoIterator<Item = String>) -> Vec<PrerolledQuery> {
    let corpus = CorpusMap::default();
    let planner = QueryPlanner {
        search,
        phase: 1,
        column: SearchColumn::Stripped,
        limit: 10_000,
        temp_table_threshold: 100,
        corpus: &corpus,
    };
    let term = ExpandedTerm::expand(&Term::Literal("dolor".into()), &LemmaMap::new()).unwrap();
    tables
        .into_iter()
        .map(|t| planner.compile(&Unit::whole(&t), &term.forms[0], 0))
        .collect()
}

fn plan(search: u64, queries: Vec<PrerolledQuery>, cap: usize) -> ExecutionPlan {
    ExecutionPlan {
        search,
        phase: 1,
        queries,
        width: 10,
        cap,
        one_hit: false,
        progress_every: 1,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stops_at_the_cap() {
    let store = Arc::new(filled_pool("cap", 20, 60));
    let queries = queries(1, (0..20).map(table));
    let collated = execute(store, plan(1, queries, 200), &CancelToken::new(), Arc::new(NullSink))
        .await
        .unwrap();
    assert_eq!(collated.lines.len(), 200);
    assert_eq!(collated.termination, Termination::CapReached);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exhausts_below_the_cap() {
    let store = Arc::new(filled_pool("under", 3, 10));
    let board = ProgressBoard::spawn();
    let sink: Arc<dyn ProgressSink> = Arc::new(board.clone());
    let collated = execute(store, plan(2, queries(2, (0..3).map(table)), 250), &CancelToken::new(), sink)
        .await
        .unwrap();
    assert_eq!(collated.termination, Termination::Exhausted);
    assert_eq!(collated.lines.len(), 30);
    for n in 0..3 {
        let indices: Vec<i64> = collated
            .lines
            .iter()
            .filter(|l| l.author() == table(n))
            .map(|l| l.index)
            .collect();
        assert_eq!(indices, (1..=10).collect::<Vec<_>>(), "each table arrives in index order");
    }

    let progress = board.snapshot(2).await.unwrap();
    assert!(progress.finished);
    assert_eq!(progress.queries, 3);
    assert_eq!(progress.hits, 30);
    board.forget(2);
    assert_eq!(board.snapshot(2).await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_hit_keeps_a_line_per_query() {
    let store = Arc::new(filled_pool("onehit", 3, 10));
    let mut plan = plan(3, queries(3, (0..3).map(table)), 250);
    plan.one_hit = true;
    let collated = execute(store, plan, &CancelToken::new(), Arc::new(NullSink)).await.unwrap();
    assert_eq!(collated.lines.len(), 3);
    assert!(collated.lines.iter().all(|l| l.index == 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn missing_table_is_an_execution_error() {
    let store = Arc::new(filled_pool("missing", 1, 10));
    let queries = queries(4, [table(0), "gr0999".to_string()]);
    let mut plan = plan(4, queries, 250);
    plan.width = 1;
    let result = execute(store, plan, &CancelToken::new(), Arc::new(NullSink)).await;
    match result {
        Err(SearchError::Execution { table, collected, .. }) => {
            assert_eq!(table, "gr0999");
            assert_eq!(collected.len(), 10, "lines found before the failure are kept");
        }
        other => panic!("expected an execution error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_before_launch() {
    let store = Arc::new(filled_pool("cancelled", 5, 10));
    let cancel = CancelToken::new();
    cancel.cancel();
    let collated = execute(store, plan(5, queries(5, (0..5).map(table)), 250), &cancel, Arc::new(NullSink))
        .await
        .unwrap();
    assert_eq!(collated.termination, Termination::Cancelled);
    assert!(collated.lines.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_plan_finishes_at_once() {
    let store = Arc::new(common::pool("empty"));
    let collated = execute(store, plan(6, Vec::new(), 250), &CancelToken::new(), Arc::new(NullSink))
        .await
        .unwrap();
    assert!(collated.lines.is_empty());
    assert_eq!(collated.termination, Termination::Exhausted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeats_do_not_count_toward_the_cap() {
    let store = Arc::new(filled_pool("repeats", 1, 10));
    // the same table searched twice finds the same ten lines
    let queries = queries(7, [table(0), table(0)]);
    let collated = execute(store, plan(7, queries, 15), &CancelToken::new(), Arc::new(NullSink))
        .await
        .unwrap();
    assert_eq!(collated.termination, Termination::Exhausted);
    let indices: Vec<i64> = collated.lines.iter().map(|l| l.index).collect();
    assert_eq!(indices, (1..=10).collect::<Vec<_>>());
}

#[test]
fn merged_terminations() {
    use Termination::*;
    assert_eq!(Exhausted.merge(Exhausted), Exhausted);
    assert_eq!(Exhausted.merge(CapReached), CapReached);
    assert_eq!(CapReached.merge(Exhausted), CapReached);
    assert_eq!(CapReached.merge(Cancelled), Cancelled);
    assert_eq!(Cancelled.merge(Exhausted), Cancelled);
}
