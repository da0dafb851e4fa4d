mod common;

use concordance::corpus::CorpusMetadata;
use concordance::error::SearchError;
use concordance::resolver::{Unit, collapse_whole_authors, resolve};
use concordance::selection::{Boundary, Passage, Selection};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn whole_author_selection_collapses() {
    let corpus = common::sample_corpus();
    let mut selection = Selection::default();
    selection.inclusions.authors = strings(&["gr0001"]);
    let scope = resolve(&selection, &corpus).unwrap();
    assert_eq!(scope.authors, strings(&["gr0001"]), "both works selected means the author");
    assert!(scope.works.is_empty(), "collapsed works are not scanned twice");
    assert_eq!(scope.works_searched, 2, "pre-collapse count is reported");
}

#[test]
fn single_work_stays_a_work() {
    let corpus = common::sample_corpus();
    let mut selection = Selection::default();
    selection.inclusions.works = strings(&["gr0001w001"]);
    let scope = resolve(&selection, &corpus).unwrap();
    assert!(scope.authors.is_empty());
    assert_eq!(scope.works, strings(&["gr0001w001"]));
}

#[test]
fn author_genre_expands_to_whole_authors() {
    let corpus = common::sample_corpus();
    let mut selection = Selection::default();
    selection.inclusions.author_genres = strings(&["Epic."]);
    let scope = resolve(&selection, &corpus).unwrap();
    assert_eq!(scope.authors, strings(&["gr0001", "gr0003", "gr0004"]));
    assert!(scope.works.is_empty());
    assert_eq!(scope.works_searched, 6);
}

#[test]
fn exclusions_never_overlap_inclusions() {
    let corpus = common::sample_corpus();
    let mut selection = Selection::default();
    selection.inclusions.author_genres = strings(&["Epic."]);
    selection.exclusions.works = strings(&["gr0001w002"]);
    selection.exclusions.work_genres = strings(&["Hymn."]);
    let scope = resolve(&selection, &corpus).unwrap();

    assert_eq!(scope.authors, strings(&["gr0003"]));
    assert_eq!(scope.works, strings(&["gr0001w001", "gr0004w001"]));
    for excluded in &scope.excluded_works {
        assert!(!scope.works.contains(excluded), "{excluded} is both in and out");
        let owner = corpus.work(excluded).unwrap().author().to_string();
        assert!(!scope.authors.contains(&owner), "{owner} cannot be whole");
    }
}

#[test]
fn collapse_is_idempotent() {
    let corpus = common::sample_corpus();
    let works = strings(&["gr0001w001", "gr0001w002", "gr0002w001", "lt0001w001", "gr0001w001"]);
    let (authors, rest) = collapse_whole_authors(&works, &corpus);
    assert_eq!(authors, strings(&["gr0001", "lt0001"]));
    assert_eq!(rest, strings(&["gr0002w001"]));

    let (again, unchanged) = collapse_whole_authors(&rest, &corpus);
    assert!(again.is_empty(), "nothing left to collapse");
    assert_eq!(unchanged, rest);
}

#[test]
fn date_range_readmits_undated_classes() {
    let corpus = common::sample_corpus();
    let mut selection = Selection::default();
    selection.earliest = -500;
    selection.latest = 0;
    let scope = resolve(&selection, &corpus).unwrap();
    assert_eq!(scope.authors, strings(&["gr0002", "gr0003", "lt0001"]));
    assert!(scope.works.is_empty());

    selection.varia = false;
    let scope = resolve(&selection, &corpus).unwrap();
    assert_eq!(scope.authors, strings(&["gr0002", "lt0001"]));
    assert_eq!(scope.works, strings(&["gr0003w002"]), "only the incerta work is re-admitted");
}

#[test]
fn earliest_after_latest_is_clamped() {
    let corpus = common::sample_corpus();
    let mut selection = Selection::default();
    selection.earliest = 100;
    selection.latest = -450;
    let scope = resolve(&selection, &corpus).unwrap();
    assert_eq!(scope.authors, strings(&["gr0002", "gr0003"]));
}

#[test]
fn spuria_filter_blocks_collapse() {
    let corpus = common::sample_corpus();
    let mut selection = Selection::default();
    selection.inclusions.authors = strings(&["gr0004"]);
    selection.spuria = false;
    let scope = resolve(&selection, &corpus).unwrap();
    assert!(scope.authors.is_empty());
    assert_eq!(scope.works, strings(&["gr0004w001"]));
}

#[test]
fn fully_excluded_author_disappears() {
    let corpus = common::sample_corpus();
    let mut selection = Selection::default();
    selection.inclusions.authors = strings(&["gr0002"]);
    selection.exclusions.works = strings(&["gr0002w001", "gr0002w002"]);
    let scope = resolve(&selection, &corpus).unwrap();
    assert!(scope.is_empty(), "empty scope, not an error");
    assert!(scope.units(&corpus).unwrap().is_empty());
}

#[test]
fn passages_bypass_date_filters() {
    let corpus = common::sample_corpus();
    let mut selection = Selection::default();
    selection.earliest = -100;
    selection.latest = 0;
    selection.inclusions.passages = strings(&["gr0001_FROM_5_TO_9"]);
    let scope = resolve(&selection, &corpus).unwrap();
    assert!(scope.authors.is_empty());
    assert!(scope.works.is_empty());
    assert_eq!(
        scope.passages,
        vec![Passage::new("gr0001", Boundary::new(5, 9).unwrap()).unwrap()]
    );
}

#[test]
fn active_corpora_limit_the_default_scope() {
    let corpus = common::sample_corpus();
    let mut selection = Selection::default();
    selection.corpora = strings(&["lt"]);
    let scope = resolve(&selection, &corpus).unwrap();
    assert_eq!(scope.authors, strings(&["lt0001"]));
}

#[test]
fn malformed_members_are_rejected() {
    let corpus = common::sample_corpus();
    for bad in ["gr0001_FROM_x_TO_9", "gr0001_FROM_9_TO_5", "gr9999_FROM_1_TO_5", "gr0001 40-60"] {
        let mut selection = Selection::default();
        selection.inclusions.passages = strings(&[bad]);
        let result = resolve(&selection, &corpus);
        assert!(
            matches!(result, Err(SearchError::MalformedSelection(_))),
            "{bad} should be rejected"
        );
    }
    let mut selection = Selection::default();
    selection.exclusions.works = strings(&["gr0001w999"]);
    assert!(matches!(
        resolve(&selection, &corpus),
        Err(SearchError::MalformedSelection(_))
    ));
}

#[test]
fn passage_ids_clamp_and_print() {
    let passage: Passage = "gr0001_FROM_-3_TO_5".parse().unwrap();
    assert_eq!(passage.boundary, Boundary { start: 1, stop: 5 });
    assert_eq!(passage.to_string(), "gr0001_FROM_1_TO_5");
}

#[test]
fn units_put_whole_authors_first() {
    let corpus = common::sample_corpus();
    let mut selection = Selection::default();
    selection.inclusions.authors = strings(&["gr0003"]);
    selection.inclusions.works = strings(&["gr0001w001"]);
    selection.inclusions.passages = strings(&["gr0002_FROM_1_TO_10"]);
    selection.exclusions.passages = strings(&["gr0002_FROM_4_TO_5"]);
    let units = resolve(&selection, &corpus).unwrap().units(&corpus).unwrap();
    assert_eq!(
        units,
        vec![
            Unit::whole("gr0003"),
            Unit {
                author: "gr0001".into(),
                inclusions: vec![Boundary { start: 1, stop: 100 }],
                exclusions: vec![],
            },
            Unit {
                author: "gr0002".into(),
                inclusions: vec![Boundary { start: 1, stop: 10 }],
                exclusions: vec![Boundary { start: 4, stop: 5 }],
            },
        ]
    );
}

#[test]
fn passages_inside_whole_authors_are_redundant() {
    let corpus = common::sample_corpus();
    let mut selection = Selection::default();
    selection.inclusions.authors = strings(&["gr0001"]);
    selection.inclusions.passages = strings(&["gr0001_FROM_1_TO_5"]);
    let units = resolve(&selection, &corpus).unwrap().units(&corpus).unwrap();
    assert_eq!(units, vec![Unit::whole("gr0001")]);
}
