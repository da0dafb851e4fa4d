mod common;

use std::sync::Arc;

use concordance::engine::{Engine, ProximitySpec, SearchPlan, SearchRequest};
use concordance::error::SearchError;
use concordance::executor::Termination;
use concordance::interface::{CancelToken, SearchInterface, SearchOptions};
use concordance::proximity::{Polarity, ProximityScope};
use concordance::selection::Selection;
use concordance::storage::LinePool;
use concordance::term::{LemmaMap, Term};

fn engine(tag: &str) -> Engine<LinePool> {
    let pool = common::pool(tag);
    let mut lines = common::lines(
        "gr0001w001",
        1,
        100,
        &[(3, "cano canit"), (5, "cano"), (6, "cano"), (9, "arma")],
    );
    lines.extend(common::lines("gr0001w002", 101, 200, &[(150, "cano")]));
    common::load(&pool, &["gr0001"], lines);

    let mut lexicon = LemmaMap::new();
    lexicon.insert("cano", &["cano", "canit", "cano"]);
    common::engine(common::test_config(), common::sample_corpus(), lexicon, pool)
}

fn seeking(text: &str) -> SearchRequest {
    let mut request = SearchRequest {
        seeking: text.into(),
        ..Default::default()
    };
    request.selection.inclusions.authors = vec!["gr0001".into()];
    request
}

#[test]
fn requests_normalize_into_plans() {
    let request = SearchRequest {
        seeking: "Arma ".into(),
        ..Default::default()
    };
    assert_eq!(request.plan().unwrap(), SearchPlan::Simple(Term::Literal("arma ".into())));

    let request = SearchRequest {
        proximate_lemma: "  Cano ".into(),
        ..Default::default()
    };
    assert_eq!(request.plan().unwrap(), SearchPlan::Simple(Term::Lemma("cano".into())));

    let request = SearchRequest {
        seeking: "arma".into(),
        proximate: "virum".into(),
        ..Default::default()
    };
    assert_eq!(
        request.plan().unwrap(),
        SearchPlan::Proximity {
            anchor: Term::Literal("arma".into()),
            target: Term::Literal("virum".into()),
            spec: ProximitySpec::default(),
        }
    );
}

#[test]
fn unusable_requests_are_input_errors() {
    let blank = SearchRequest {
        seeking: "   ".into(),
        ..Default::default()
    };
    assert!(matches!(blank.plan(), Err(SearchError::Input(_))));

    let crowded = SearchRequest {
        seeking: "arma".into(),
        lemma: "arma".into(),
        ..Default::default()
    };
    assert!(matches!(crowded.plan(), Err(SearchError::Input(_))));
}

#[test]
fn requests_read_from_json() {
    let json = r#"{
        "seeking": "arma",
        "proximate": "virum",
        "proximity": {"distance": 3, "scope": "words", "polarity": "not_near"},
        "selection": {"inclusions": {"authors": ["gr0001"]}, "spuria": false},
        "limit": 20
    }"#;
    let request: SearchRequest = serde_json::from_str(json).unwrap();
    assert_eq!(request.limit, Some(20));
    assert!(!request.selection.spuria);
    assert!(request.selection.varia, "unspecified toggles keep their defaults");
    match request.plan().unwrap() {
        SearchPlan::Proximity { spec, .. } => {
            assert_eq!(spec.distance, 3);
            assert_eq!(spec.scope, ProximityScope::Words);
            assert_eq!(spec.polarity, Polarity::NotNear);
        }
        other => panic!("expected a proximity plan, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn submitted_searches_complete() {
    let interface = SearchInterface::new(Arc::new(engine("submit")));
    let handle = interface.start(seeking(" cano "), SearchOptions::default()).unwrap();
    let outcome = handle.join().await.unwrap();
    let found: Vec<i64> = outcome.lines.iter().map(|l| l.index).collect();
    assert_eq!(found, vec![3, 5, 6, 150]);
    assert_eq!(outcome.termination, Termination::Exhausted);
    assert_eq!(outcome.works_searched, 2);
    assert_eq!(interface.active_count(), 0, "finished searches leave the registry");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_searches_surface_through_join() {
    let interface = SearchInterface::new(Arc::new(engine("failed")));
    let handle = interface.start(SearchRequest::default(), SearchOptions::default()).unwrap();
    assert!(matches!(handle.join().await, Err(SearchError::Input(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn limit_bounds_the_result() {
    let interface = SearchInterface::new(Arc::new(engine("limit")));
    let mut request = seeking(" cano ");
    request.limit = Some(2);
    let outcome = interface.run(&request).await.unwrap();
    let found: Vec<i64> = outcome.lines.iter().map(|l| l.index).collect();
    assert_eq!(found, vec![3, 5]);
    assert_eq!(outcome.termination, Termination::CapReached, "line 6 was left behind");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn passages_gather_every_line() {
    let engine = engine("gather");
    let mut selection = Selection::default();
    selection.inclusions.passages = vec!["gr0001_FROM_5_TO_8".into()];
    let outcome = engine.gather_lines(&selection, 100, &CancelToken::new()).await.unwrap();
    let found: Vec<i64> = outcome.lines.iter().map(|l| l.index).collect();
    assert_eq!(found, vec![5, 6, 7, 8]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lemma_forms_do_not_repeat_lines() {
    let engine = engine("lemma");
    let mut request = seeking("");
    request.lemma = "cano".into();
    let outcome = engine.search(&request, &CancelToken::new()).await.unwrap();
    let mut found: Vec<i64> = outcome.lines.iter().map(|l| l.index).collect();
    found.sort();
    assert_eq!(found, vec![3, 5, 6, 150]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_lines_do_not_use_up_the_limit() {
    let engine = engine("lemmacap");
    let mut request = seeking("");
    request.lemma = "cano".into();
    // line 3 is found by both forms, four distinct lines in all
    request.limit = Some(4);
    let outcome = engine.search(&request, &CancelToken::new()).await.unwrap();
    let mut found: Vec<i64> = outcome.lines.iter().map(|l| l.index).collect();
    found.sort();
    assert_eq!(found, vec![3, 5, 6, 150]);
    assert_eq!(outcome.termination, Termination::Exhausted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_hit_per_table() {
    let engine = engine("onehit");
    let mut request = seeking(" cano ");
    request.one_hit = true;
    let outcome = engine.search(&request, &CancelToken::new()).await.unwrap();
    let found: Vec<i64> = outcome.lines.iter().map(|l| l.index).collect();
    assert_eq!(found, vec![3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancelled_search_keeps_what_it_has() {
    let engine = engine("cancel");
    let cancel = CancelToken::new();
    cancel.cancel();
    let outcome = engine.search(&seeking(" cano "), &cancel).await.unwrap();
    assert_eq!(outcome.termination, Termination::Cancelled);
    assert!(outcome.lines.is_empty());
}
