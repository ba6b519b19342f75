use std::collections::VecDeque;

use super::*;
use crate::scoring::IteratorState;

struct Scripted {
    hits: VecDeque<(DocId, f32)>,
    state: IteratorState,
}

impl Scripted {
    fn new(hits: &[(DocId, f32)]) -> Self {
        Self {
            hits: hits.iter().copied().collect(),
            state: IteratorState::Unpositioned,
        }
    }
}

impl ScoringIterator for Scripted {
    fn next_doc(&mut self) -> Result<DocId> {
        match self.hits.pop_front() {
            Some((doc, score)) => {
                self.state = IteratorState::Positioned { doc, score };
                Ok(doc)
            }
            None => {
                self.state = IteratorState::Exhausted;
                Ok(NO_MORE_DOCS)
            }
        }
    }

    fn state(&self) -> IteratorState {
        self.state
    }

    fn cost(&self) -> u64 {
        self.hits.len() as u64
    }
}

fn pairs(results: &SortedResults) -> Vec<(DocId, f32)> {
    results.hits.iter().map(|hit| (hit.doc, hit.score)).collect()
}

fn sample() -> Vec<(DocId, f32)> {
    vec![
        (0, 0.3),
        (1, 0.9),
        (2, 0.1),
        (3, 0.9),
        (4, 0.5),
        (5, 0.7),
        (6, 0.2),
    ]
}

#[test]
fn zero_k_is_rejected() {
    assert!(matches!(
        TopKSelector::new(0),
        Err(SearchError::InvalidArgument(_))
    ));
    let mut iterator = Scripted::new(&sample());
    assert!(select_top_k(&mut iterator, 0).is_err());
}

#[test]
fn top_k_returns_at_most_k_in_non_increasing_order() {
    for k in 1..=9 {
        let mut iterator = Scripted::new(&sample());
        let results = select_top_k(&mut iterator, k).expect("select");
        assert!(results.len() <= k);
        assert_eq!(results.len(), k.min(7));
        assert!(results
            .hits
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score));
        assert_eq!(results.total.value, results.len() as u64);
        assert_eq!(results.total.relation, TotalHitsRelation::EqualTo);
    }

    let mut iterator = Scripted::new(&sample());
    let results = select_top_k(&mut iterator, 3).expect("select");
    assert_eq!(pairs(&results), vec![(1, 0.9), (3, 0.9), (5, 0.7)]);
}

#[test]
fn equal_scores_do_not_evict_the_incumbent() {
    let mut selector = TopKSelector::new(2).expect("selector");
    selector.collect(4, 1.0);
    selector.collect(9, 2.0);
    selector.collect(1, 1.0);
    let results = selector.finish();
    assert_eq!(pairs(&results), vec![(9, 2.0), (4, 1.0)]);
}

#[test]
fn eviction_among_equal_scores_drops_the_higher_doc() {
    let mut selector = TopKSelector::new(2).expect("selector");
    selector.collect(3, 1.0);
    selector.collect(7, 1.0);
    selector.collect(8, 5.0);
    assert_eq!(pairs(&selector.finish()), vec![(8, 5.0), (3, 1.0)]);
}

#[test]
fn negative_scores_survive_while_empty_slots_are_dropped() {
    let mut selector = TopKSelector::new(5).expect("selector");
    assert_eq!(selector.capacity(), 5);
    selector.collect(0, -4.0);
    selector.collect(1, 0.0);
    selector.collect(2, -1.0);
    let results = selector.finish();
    assert_eq!(pairs(&results), vec![(1, 0.0), (2, -1.0), (0, -4.0)]);
}

#[test]
fn negative_infinity_still_fills_an_empty_slot() {
    let mut selector = TopKSelector::new(2).expect("selector");
    selector.collect(5, f32::NEG_INFINITY);
    assert_eq!(pairs(&selector.finish()), vec![(5, f32::NEG_INFINITY)]);
}

#[test]
fn collect_all_keeps_everything_sorted() {
    let mut iterator = Scripted::new(&sample());
    let results = collect_all(&mut iterator).expect("collect");
    assert_eq!(results.len(), 7);
    assert_eq!(results.docs(), vec![1, 3, 5, 4, 0, 6, 2]);
}

#[test]
fn radius_filter_keeps_scores_at_or_above_threshold() {
    let filter = RadiusFilter::new(0.5, 100).expect("filter");
    let mut iterator = Scripted::new(&sample());
    let results = filter.collect(&mut iterator).expect("collect");
    assert_eq!(
        pairs(&results),
        vec![(1, 0.9), (3, 0.9), (5, 0.7), (4, 0.5)]
    );
    assert_eq!(results.total.relation, TotalHitsRelation::EqualTo);
}

#[test]
fn radius_filter_agrees_with_unbounded_top_k() {
    let hits: Vec<(DocId, f32)> = (0..200)
        .map(|doc| (doc, ((doc * 37) % 101) as f32 / 100.0))
        .collect();
    let threshold = 0.42;

    let filter = RadiusFilter::new(threshold, 10_000).expect("filter");
    let radius = filter
        .collect(&mut Scripted::new(&hits))
        .expect("radius");

    let everything = select_top_k(&mut Scripted::new(&hits), hits.len()).expect("top k");
    let expected: Vec<ScoredDoc> = everything
        .hits
        .into_iter()
        .filter(|hit| hit.score >= threshold)
        .collect();
    assert_eq!(radius.hits, expected);
}

#[test]
fn capped_radius_keeps_the_best_and_reports_a_lower_bound() {
    let hits: Vec<(DocId, f32)> = (0..50).map(|doc| (doc, doc as f32)).collect();
    let filter = RadiusFilter::new(10.0, 4).expect("filter");
    let results = filter
        .collect(&mut Scripted::new(&hits))
        .expect("radius");
    assert_eq!(results.docs(), vec![49, 48, 47, 46]);
    assert_eq!(
        results.total,
        TotalHits {
            value: 40,
            relation: TotalHitsRelation::GreaterThanOrEqualTo
        }
    );
}

#[test]
fn radius_filter_rejects_bad_parameters() {
    assert!(RadiusFilter::new(f32::NAN, 10).is_err());
    assert!(RadiusFilter::new(0.5, 0).is_err());
    assert_eq!(RadiusFilter::new(0.5, 1).expect("filter").threshold(), 0.5);
}

#[test]
fn empty_results_are_exact() {
    let results = SortedResults::empty();
    assert!(results.is_empty());
    assert_eq!(results.total.value, 0);
    let encoded = serde_json::to_string(&results.total).expect("serialize");
    assert_eq!(encoded, r#"{"value":0,"relation":"equal_to"}"#);
}
