//! Per-field vector cursors and the in-memory store backing them.

use crate::cursor::{Conjunction, DocCursor, DocId, SortedDocsCursor};
use crate::error::{Result, SearchError};

/// A [`DocCursor`] over the documents owning a vector, exposing the vector
/// of the current document. Reading a vector while exhausted yields an
/// empty slice.
pub trait VectorValues: DocCursor {
    type Element;

    fn vector_value(&self) -> &[Self::Element];
}

impl<V: VectorValues + ?Sized> VectorValues for Box<V> {
    type Element = V::Element;

    #[inline]
    fn vector_value(&self) -> &[Self::Element] {
        (**self).vector_value()
    }
}

impl<V: VectorValues, F: DocCursor> VectorValues for Conjunction<V, F> {
    type Element = V::Element;

    #[inline]
    fn vector_value(&self) -> &[Self::Element] {
        self.lead().vector_value()
    }
}

/// Vectors keyed by strictly increasing doc id, stored contiguously.
///
/// Lengths are not forced to agree: a packed code store holds whatever the
/// codec handed over and scorers validate lengths as they read.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorStore<T> {
    docs: Vec<DocId>,
    offsets: Vec<usize>,
    data: Vec<T>,
}

impl<T> Default for VectorStore<T> {
    fn default() -> Self {
        Self {
            docs: Vec::new(),
            offsets: vec![0],
            data: Vec::new(),
        }
    }
}

impl<T: Copy> VectorStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, doc: DocId, vector: &[T]) -> Result<()> {
        if doc == crate::cursor::NO_MORE_DOCS {
            return Err(SearchError::invalid_argument(
                "doc id collides with the end-of-cursor sentinel",
            ));
        }
        if let Some(&last) = self.docs.last() {
            if doc <= last {
                return Err(SearchError::invalid_argument(format!(
                    "doc ids must strictly increase: {doc} after {last}"
                )));
            }
        }
        self.docs.push(doc);
        self.data.extend_from_slice(vector);
        self.offsets.push(self.data.len());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn docs(&self) -> &[DocId] {
        &self.docs
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocId, &[T])> + '_ {
        self.docs
            .iter()
            .zip(self.offsets.windows(2))
            .map(|(&doc, bounds)| (doc, &self.data[bounds[0]..bounds[1]]))
    }

    /// Fresh cursor positioned on the first stored document.
    pub fn values(&self) -> SliceVectorValues<'_, T> {
        SliceVectorValues {
            cursor: SortedDocsCursor::new(&self.docs),
            offsets: &self.offsets,
            data: &self.data,
        }
    }
}

/// Borrowed cursor over a [`VectorStore`]. Each search builds its own.
#[derive(Debug, Clone)]
pub struct SliceVectorValues<'a, T> {
    cursor: SortedDocsCursor<'a>,
    offsets: &'a [usize],
    data: &'a [T],
}

impl<T> DocCursor for SliceVectorValues<'_, T> {
    #[inline]
    fn doc(&self) -> DocId {
        self.cursor.doc()
    }

    #[inline]
    fn next_doc(&mut self) -> DocId {
        self.cursor.next_doc()
    }

    #[inline]
    fn advance(&mut self, target: DocId) -> DocId {
        self.cursor.advance(target)
    }

    fn cost(&self) -> u64 {
        self.cursor.cost()
    }
}

impl<T> VectorValues for SliceVectorValues<'_, T> {
    type Element = T;

    #[inline]
    fn vector_value(&self) -> &[T] {
        let ordinal = self.cursor.position();
        match (self.offsets.get(ordinal), self.offsets.get(ordinal + 1)) {
            (Some(&start), Some(&end)) => &self.data[start..end],
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests;
