use std::collections::VecDeque;
use std::sync::Arc;

use roaring::RoaringBitmap;

use super::*;
use crate::cursor::{BitmapCursor, Conjunction};
use crate::values::VectorStore;

/// Replays a fixed `(doc, score)` sequence.
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

fn drain(iterator: &mut impl ScoringIterator) -> Vec<(DocId, f32)> {
    let mut hits = Vec::new();
    loop {
        let doc = iterator.next_doc().expect("scan must succeed");
        if doc == NO_MORE_DOCS {
            return hits;
        }
        hits.push((doc, iterator.score()));
    }
}

fn float_store(vectors: &[(DocId, [f32; 2])]) -> VectorStore<f32> {
    let mut store = VectorStore::new();
    for (doc, vector) in vectors {
        store.push(*doc, vector).expect("push");
    }
    store
}

#[test]
fn flat_iterator_yields_increasing_ids_with_matching_scores() {
    let store = float_store(&[(0, [0.0, 0.0]), (3, [0.0, 1.0]), (8, [2.0, 0.0])]);
    let query = [1.0, 1.0];
    let similarity = SimilarityFunction::L2;
    let scorer = FloatScorer::new(&query, similarity).expect("scorer");
    let mut iterator = FlatIterator::new(store.values(), scorer);
    assert_eq!(iterator.state(), IteratorState::Unpositioned);
    assert_eq!(iterator.cost(), 3);

    let hits = drain(&mut iterator);
    let docs: Vec<DocId> = hits.iter().map(|&(doc, _)| doc).collect();
    assert_eq!(docs, vec![0, 3, 8]);
    for (doc, score) in hits {
        let (_, stored) = store
            .iter()
            .find(|&(stored_doc, _)| stored_doc == doc)
            .expect("stored vector");
        let expected = similarity.compare_f32(&query, stored).expect("compare");
        assert!((score - expected).abs() < 1e-6);
    }
}

fn deterministic_vector(seed: usize, len: usize) -> Vec<f32> {
    (0..len)
        .map(|index| {
            let mixed = seed
                .wrapping_mul(1_103_515_245)
                .wrapping_add(index.wrapping_mul(12_345))
                .wrapping_add(97);
            (mixed % 10_000) as f32 / 5_000.0 - 1.0
        })
        .collect()
}

#[test]
fn float_scores_equal_compare_exactly_at_wide_dimensions() {
    for dimension in [16usize, 24, 128, 131] {
        let mut store = VectorStore::<f32>::new();
        for doc in 0..50u32 {
            store
                .push(doc, &deterministic_vector(doc as usize + 3, dimension))
                .expect("push");
        }
        let query = deterministic_vector(7, dimension);
        for similarity in [
            SimilarityFunction::L2,
            SimilarityFunction::NegativeSquaredL2,
            SimilarityFunction::Cosine,
            SimilarityFunction::InnerProduct,
            SimilarityFunction::L1,
            SimilarityFunction::LInf,
        ] {
            let scorer = FloatScorer::new(&query, similarity).expect("scorer");
            let mut iterator = FlatIterator::new(store.values(), scorer);
            let hits = drain(&mut iterator);
            assert_eq!(hits.len(), 50);
            for ((doc, score), (stored_doc, stored)) in hits.into_iter().zip(store.iter()) {
                assert_eq!(doc, stored_doc);
                let expected = similarity.compare_f32(&query, stored).expect("compare");
                assert_eq!(
                    score, expected,
                    "{similarity:?} dimension {dimension} doc {doc}"
                );
            }
        }
    }
}

#[test]
fn score_is_stable_between_calls_and_exhaustion_is_sticky() {
    let store = float_store(&[(1, [1.0, 0.0]), (2, [0.0, 1.0])]);
    let scorer =
        FloatScorer::new(&[1.0, 0.0], SimilarityFunction::InnerProduct).expect("scorer");
    let mut iterator = FlatIterator::new(store.values(), scorer);

    assert_eq!(iterator.next_doc().expect("first"), 1);
    let first = iterator.score();
    assert_eq!(iterator.score(), first);
    assert_eq!(iterator.score(), 2.0);
    assert_eq!(
        iterator.state(),
        IteratorState::Positioned { doc: 1, score: 2.0 }
    );

    assert_eq!(iterator.next_doc().expect("second"), 2);
    assert_eq!(iterator.score(), 1.0);
    assert_eq!(iterator.next_doc().expect("end"), NO_MORE_DOCS);
    assert_eq!(iterator.next_doc().expect("still end"), NO_MORE_DOCS);
    assert_eq!(iterator.state(), IteratorState::Exhausted);
    assert_eq!(iterator.score(), f32::NEG_INFINITY);
}

#[test]
fn filtered_flat_iterator_scores_only_the_intersection() {
    let store = float_store(&[
        (0, [0.0, 0.0]),
        (1, [1.0, 0.0]),
        (2, [2.0, 0.0]),
        (5, [5.0, 0.0]),
    ]);
    let filter: RoaringBitmap = [1u32, 4, 5, 6].into_iter().collect();
    let values = Conjunction::new(store.values(), BitmapCursor::new(&filter));
    let scorer =
        FloatScorer::new(&[0.0, 0.0], SimilarityFunction::NegativeSquaredL2).expect("scorer");
    let mut iterator = FlatIterator::new(values, scorer);
    assert_eq!(drain(&mut iterator), vec![(1, -1.0), (5, -25.0)]);
}

#[test]
fn dedup_keeps_the_best_child_of_each_parent() {
    // children 0, 1, 2 belong to parent 3
    let parents: ParentGroup = [3u32].into_iter().collect();
    let inner = Scripted::new(&[(0, 3.1), (1, 7.4), (2, 2.0)]);
    let mut nested = NestedIterator::new(inner, &parents, NestedMode::Dedup).expect("nested");
    assert_eq!(nested.mode(), NestedMode::Dedup);

    assert_eq!(nested.next_doc().expect("group"), 1);
    assert_eq!(nested.score(), 7.4);
    assert_eq!(nested.parent(), Some(3));
    assert_eq!(nested.next_doc().expect("end"), NO_MORE_DOCS);
    assert_eq!(nested.parent(), None);
}

#[test]
fn expand_returns_every_child_with_its_parent() {
    let parents: ParentGroup = [3u32].into_iter().collect();
    let inner = Scripted::new(&[(0, 3.1), (1, 7.4), (2, 2.0)]);
    let mut nested = NestedIterator::new(inner, &parents, NestedMode::Expand).expect("nested");

    let mut seen = Vec::new();
    loop {
        let doc = nested.next_doc().expect("child");
        if doc == NO_MORE_DOCS {
            break;
        }
        assert_eq!(nested.parent(), Some(3));
        seen.push((doc, nested.score()));
    }
    assert_eq!(seen, vec![(0, 3.1), (1, 7.4), (2, 2.0)]);
}

#[test]
fn expand_steps_over_candidates_that_are_parents() {
    // doc 3 is a parent that also owns a vector
    let parents: ParentGroup = [3u32].into_iter().collect();
    let hits = [(0, 0.1), (1, 0.2), (2, 0.5), (3, 1.0)];

    let mut dedup =
        NestedIterator::new(Scripted::new(&hits), &parents, NestedMode::Dedup).expect("nested");
    assert_eq!(drain(&mut dedup), vec![(2, 0.5)]);

    let mut expand =
        NestedIterator::new(Scripted::new(&hits), &parents, NestedMode::Expand).expect("nested");
    assert_eq!(drain(&mut expand), vec![(0, 0.1), (1, 0.2), (2, 0.5)]);
}

#[test]
fn children_after_the_last_parent_have_no_parent_id() {
    let parents: ParentGroup = [2u32].into_iter().collect();
    for mode in [NestedMode::Expand, NestedMode::Dedup] {
        let inner = Scripted::new(&[(1, 1.0), (5, 2.0)]);
        let mut nested = NestedIterator::new(inner, &parents, mode).expect("nested");
        assert_eq!(nested.next_doc().expect("first"), 1);
        assert_eq!(nested.parent(), Some(2));
        assert_eq!(nested.next_doc().expect("orphan"), 5);
        assert_eq!(nested.parent(), None);
    }
}

#[test]
fn dedup_walks_multiple_groups_and_skips_empty_ones() {
    // parents 2, 5, 9; group of parent 5 has no candidates
    let parents: ParentGroup = [2u32, 5, 9].into_iter().collect();
    let inner = Scripted::new(&[(0, 1.0), (1, 0.5), (6, -3.0), (8, -1.0)]);
    let mut nested = NestedIterator::new(inner, &parents, NestedMode::Dedup).expect("nested");
    assert_eq!(drain(&mut nested), vec![(0, 1.0), (8, -1.0)]);
}

#[test]
fn dedup_ties_keep_the_first_child() {
    let parents: ParentGroup = [4u32].into_iter().collect();
    let inner = Scripted::new(&[(1, 2.0), (2, 2.0), (3, 1.0)]);
    let mut nested = NestedIterator::new(inner, &parents, NestedMode::Dedup).expect("nested");
    assert_eq!(drain(&mut nested), vec![(1, 2.0)]);
}

#[test]
fn dedup_steps_over_candidates_that_are_parents() {
    let parents: ParentGroup = [2u32, 5].into_iter().collect();
    let inner = Scripted::new(&[(2, 9.0), (3, 1.0), (4, 4.0)]);
    let mut nested = NestedIterator::new(inner, &parents, NestedMode::Dedup).expect("nested");
    assert_eq!(drain(&mut nested), vec![(4, 4.0)]);
}

#[test]
fn nested_decorator_wraps_real_flat_iterators() {
    let store = float_store(&[
        (0, [0.0, 3.0]),
        (1, [0.0, 1.0]),
        (3, [0.0, 2.0]),
        (4, [0.0, 0.5]),
    ]);
    let parents: ParentGroup = [2u32, 5].into_iter().collect();
    let scorer =
        FloatScorer::new(&[0.0, 0.0], SimilarityFunction::NegativeSquaredL2).expect("scorer");
    let flat: Box<dyn ScoringIterator + '_> = Box::new(FlatIterator::new(store.values(), scorer));
    let mut nested = NestedIterator::new(flat, &parents, NestedMode::Dedup).expect("nested");
    assert_eq!(drain(&mut nested), vec![(1, -1.0), (4, -0.25)]);
}

#[test]
fn hamming_scorer_rejects_codes_of_the_wrong_length() {
    let mut store = VectorStore::<u8>::new();
    store.push(0, &[0b1111_0000]).expect("push");
    store.push(1, &[0b1111_0000, 0x00]).expect("push");
    let scorer = HammingScorer::new(vec![0b1010_0000]).expect("scorer");
    let mut iterator = FlatIterator::new(store.values(), scorer);

    assert_eq!(iterator.next_doc().expect("first"), 0);
    assert!((iterator.score() - 1.0 / 3.0).abs() < 1e-6);
    let error = iterator.next_doc().expect_err("malformed code must abort");
    assert!(matches!(
        error,
        SearchError::MalformedQuantizedData {
            doc: 1,
            expected: 1,
            got: 2
        }
    ));
}

#[test]
fn symmetric_quantized_scores_are_commutative() {
    let context = Arc::new(
        QuantizationContext::one_bit(vec![0.0, 0.0, 0.0, 0.0], vec![-1.0; 4], vec![1.0; 4])
            .expect("context"),
    );
    let left = [0.3, -0.2, 0.9, -0.7];
    let right = [-0.1, -0.4, 0.2, 0.8];
    let left_code = context.quantize(&left).expect("left");
    let right_code = context.quantize(&right).expect("right");

    let forward = HammingScorer::quantized(&left, Arc::clone(&context))
        .expect("scorer")
        .score(0, &right_code)
        .expect("forward");
    let backward = HammingScorer::quantized(&right, Arc::clone(&context))
        .expect("scorer")
        .score(0, &left_code)
        .expect("backward");
    assert_eq!(forward, backward);
}

#[test]
fn adc_scorer_transforms_query_once() {
    let context = Arc::new(
        QuantizationContext::one_bit(vec![0.0, 0.0], vec![-1.0, -1.0], vec![1.0, 1.0])
            .expect("context"),
    );
    let scorer = AdcScorer::new(&[1.0, -1.0], Arc::clone(&context), SimilarityFunction::InnerProduct)
        .expect("scorer");
    // transformed query is [1.0, 0.0]
    assert_eq!(scorer.score(0, &[0b1000_0000]).expect("score"), 2.0);
    assert_eq!(scorer.score(0, &[0b0100_0000]).expect("score"), 1.0);
    assert!(matches!(
        scorer.score(4, &[0, 0]),
        Err(SearchError::MalformedQuantizedData { doc: 4, .. })
    ));
    assert!(matches!(
        AdcScorer::new(&[1.0, -1.0], context, SimilarityFunction::L1),
        Err(SearchError::UnsupportedComparison(_))
    ));
}

#[test]
fn byte_scorer_matches_compare() {
    let mut store = VectorStore::<i8>::new();
    store.push(2, &[1, 2]).expect("push");
    store.push(7, &[-3, 4]).expect("push");
    let scorer = ByteScorer::new(vec![1, 1], SimilarityFunction::L2).expect("scorer");
    let mut iterator = FlatIterator::new(store.values(), scorer);
    assert_eq!(drain(&mut iterator), vec![(2, 0.5), (7, 1.0 / 26.0)]);
}

#[test]
fn scorers_reject_unusable_queries() {
    assert!(matches!(
        FloatScorer::new(&[0.0, 0.0], SimilarityFunction::Cosine),
        Err(SearchError::InvalidArgument(_))
    ));
    assert!(matches!(
        FloatScorer::new(&[1.0], SimilarityFunction::Hamming),
        Err(SearchError::UnsupportedComparison(_))
    ));
    assert!(matches!(
        ByteScorer::new(vec![0, 0], SimilarityFunction::Cosine),
        Err(SearchError::InvalidArgument(_))
    ));
    assert!(HammingScorer::new(Vec::new()).is_err());
}

#[test]
fn float_scorer_reports_dimension_mismatch() {
    let store = {
        let mut store = VectorStore::<f32>::new();
        store.push(0, &[1.0, 2.0, 3.0]).expect("push");
        store
    };
    let scorer = FloatScorer::new(&[1.0, 2.0], SimilarityFunction::L2).expect("scorer");
    let mut iterator = FlatIterator::new(store.values(), scorer);
    assert!(matches!(
        iterator.next_doc(),
        Err(SearchError::InvalidArgument(_))
    ));
}
