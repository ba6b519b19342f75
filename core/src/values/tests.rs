use roaring::RoaringBitmap;

use super::*;
use crate::cursor::{BitmapCursor, NO_MORE_DOCS};

fn sample_store() -> VectorStore<f32> {
    let mut store = VectorStore::new();
    store.push(1, &[1.0, 1.5]).expect("push 1");
    store.push(4, &[4.0, 4.5]).expect("push 4");
    store.push(9, &[9.0, 9.5]).expect("push 9");
    store
}

#[test]
fn cursor_exposes_vector_of_current_doc() {
    let store = sample_store();
    let mut values = store.values();
    assert_eq!(values.doc(), 1);
    assert_eq!(values.vector_value(), &[1.0, 1.5]);
    assert_eq!(values.advance(5), 9);
    assert_eq!(values.vector_value(), &[9.0, 9.5]);
    assert_eq!(values.next_doc(), NO_MORE_DOCS);
    assert!(values.vector_value().is_empty());
}

#[test]
fn independent_cursors_do_not_share_position() {
    let store = sample_store();
    let mut first = store.values();
    let second = store.values();
    first.next_doc();
    assert_eq!(first.doc(), 4);
    assert_eq!(second.doc(), 1);
}

#[test]
fn push_rejects_non_increasing_ids() {
    let mut store = sample_store();
    assert!(matches!(
        store.push(9, &[0.0, 0.0]),
        Err(SearchError::InvalidArgument(_))
    ));
    assert!(matches!(
        store.push(NO_MORE_DOCS, &[0.0, 0.0]),
        Err(SearchError::InvalidArgument(_))
    ));
    assert_eq!(store.len(), 3);
}

#[test]
fn ragged_codes_are_kept_as_given() {
    let mut store = VectorStore::<u8>::new();
    store.push(0, &[0xAA]).expect("push 0");
    store.push(2, &[0xBB, 0xCC]).expect("push 2");
    let stored: Vec<(DocId, &[u8])> = store.iter().collect();
    assert_eq!(stored, vec![(0, &[0xAA][..]), (2, &[0xBB, 0xCC][..])]);
    let mut values = store.values();
    assert_eq!(values.vector_value(), &[0xAA]);
    values.next_doc();
    assert_eq!(values.vector_value(), &[0xBB, 0xCC]);
}

#[test]
fn filtered_values_read_through_the_lead() {
    let store = sample_store();
    let filter: RoaringBitmap = [2u32, 4, 9, 11].into_iter().collect();
    let mut filtered = Conjunction::new(store.values(), BitmapCursor::new(&filter));
    assert_eq!(filtered.doc(), 4);
    assert_eq!(filtered.vector_value(), &[4.0, 4.5]);
    assert_eq!(filtered.next_doc(), 9);
    assert_eq!(filtered.vector_value(), &[9.0, 9.5]);
    assert_eq!(filtered.next_doc(), NO_MORE_DOCS);
}

#[test]
fn empty_store_starts_exhausted() {
    let store = VectorStore::<i8>::default();
    assert!(store.is_empty());
    let values = store.values();
    assert_eq!(values.doc(), NO_MORE_DOCS);
    assert!(values.vector_value().is_empty());
}

#[test]
fn iter_visits_docs_in_order() {
    let store = sample_store();
    let docs: Vec<DocId> = store.iter().map(|(doc, _)| doc).collect();
    assert_eq!(docs, vec![1, 4, 9]);
    let last = store.iter().last().expect("last entry");
    assert_eq!(last.1, &[9.0, 9.5]);
}
