//! Scoring iterators: cursors that yield `(doc, score)` in increasing doc
//! order.
//!
//! A [`FlatIterator`] pairs a [`VectorValues`] cursor with a
//! [`VectorScorer`] for one representation. [`NestedIterator`] wraps any
//! [`ScoringIterator`] and either keeps the best child per parent or passes
//! every child through together with its parent.

use std::sync::Arc;

use crate::cursor::{DocId, ParentGroup, NO_MORE_DOCS};
use crate::error::{Result, SearchError};
use crate::kernels::{hamming_distance, l1_f32, linf_f32, PreparedQuery, VectorError};
use crate::quantization::QuantizationContext;
use crate::similarity::{
    score_from_cosine_parts, score_from_distance, score_from_hamming, score_from_inner_product,
    score_from_l2_squared, SimilarityFunction, VectorDataType,
};
use crate::values::VectorValues;

/// Where an iterator stands after its latest `next_doc` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IteratorState {
    /// Built, candidate pre-fetched, nothing returned yet.
    Unpositioned,
    /// `doc` was the last id returned and `score` is its score.
    Positioned { doc: DocId, score: f32 },
    Exhausted,
}

pub trait ScoringIterator {
    /// Returns the next document and makes its score available through
    /// [`score`](Self::score). Yields [`NO_MORE_DOCS`] once done, and keeps
    /// yielding it.
    fn next_doc(&mut self) -> Result<DocId>;

    fn state(&self) -> IteratorState;

    /// Score of the most recently returned document. Negative infinity when
    /// no document is current.
    fn score(&self) -> f32 {
        match self.state() {
            IteratorState::Positioned { score, .. } => score,
            IteratorState::Unpositioned | IteratorState::Exhausted => f32::NEG_INFINITY,
        }
    }

    /// Owning parent of the current document, when the iterator tracks one.
    fn parent(&self) -> Option<DocId> {
        None
    }

    /// Upper bound on documents left to visit.
    fn cost(&self) -> u64;
}

impl<I: ScoringIterator + ?Sized> ScoringIterator for Box<I> {
    #[inline]
    fn next_doc(&mut self) -> Result<DocId> {
        (**self).next_doc()
    }

    #[inline]
    fn state(&self) -> IteratorState {
        (**self).state()
    }

    #[inline]
    fn score(&self) -> f32 {
        (**self).score()
    }

    #[inline]
    fn parent(&self) -> Option<DocId> {
        (**self).parent()
    }

    #[inline]
    fn cost(&self) -> u64 {
        (**self).cost()
    }
}

/// Compares the query held by the scorer against one stored vector.
pub trait VectorScorer {
    type Element;

    fn score(&self, doc: DocId, vector: &[Self::Element]) -> Result<f32>;
}

/// Full-precision float scoring against a pre-packed query.
#[derive(Debug, Clone)]
pub struct FloatScorer {
    query: Vec<f32>,
    prepared: PreparedQuery,
    similarity: SimilarityFunction,
}

impl FloatScorer {
    pub fn new(query: &[f32], similarity: SimilarityFunction) -> Result<Self> {
        similarity.ensure_supports(VectorDataType::Float)?;
        let prepared = PreparedQuery::new(query);
        if similarity == SimilarityFunction::Cosine && prepared.sq_sum() == 0.0 {
            return Err(VectorError::ZeroNorm.into());
        }
        Ok(Self {
            query: query.to_vec(),
            prepared,
            similarity,
        })
    }
}

impl VectorScorer for FloatScorer {
    type Element = f32;

    #[inline]
    fn score(&self, _doc: DocId, vector: &[f32]) -> Result<f32> {
        if vector.len() != self.query.len() {
            return Err(VectorError::DimensionMismatch {
                expected: self.query.len(),
                got: vector.len(),
            }
            .into());
        }
        Ok(match self.similarity {
            SimilarityFunction::L2 => score_from_l2_squared(self.prepared.l2_squared(vector)),
            SimilarityFunction::NegativeSquaredL2 => -self.prepared.l2_squared(vector),
            SimilarityFunction::Cosine => {
                let (dot, doc_sq) = self.prepared.dot_and_right_sq_sum(vector);
                score_from_cosine_parts(dot, self.prepared.sq_sum(), doc_sq)
            }
            SimilarityFunction::InnerProduct => score_from_inner_product(self.prepared.dot(vector)),
            SimilarityFunction::L1 => score_from_distance(l1_f32(&self.query, vector)),
            SimilarityFunction::LInf => score_from_distance(linf_f32(&self.query, vector)),
            SimilarityFunction::Hamming => {
                return Err(SearchError::unsupported(
                    "hamming is not defined for float vectors",
                ))
            }
        })
    }
}

/// Signed byte scoring. Float queries are cast down before reaching here.
#[derive(Debug, Clone)]
pub struct ByteScorer {
    query: Vec<i8>,
    similarity: SimilarityFunction,
}

impl ByteScorer {
    pub fn new(query: Vec<i8>, similarity: SimilarityFunction) -> Result<Self> {
        similarity.ensure_supports(VectorDataType::Byte)?;
        if similarity == SimilarityFunction::Cosine && query.iter().all(|&value| value == 0) {
            return Err(VectorError::ZeroNorm.into());
        }
        Ok(Self { query, similarity })
    }
}

impl VectorScorer for ByteScorer {
    type Element = i8;

    #[inline]
    fn score(&self, _doc: DocId, vector: &[i8]) -> Result<f32> {
        self.similarity.compare_i8(&self.query, vector)
    }
}

/// Hamming scoring over packed codes, either raw binary fields or
/// symmetric quantization. A code of the wrong length aborts the scan.
#[derive(Debug, Clone)]
pub struct HammingScorer {
    query: Vec<u8>,
    context: Option<Arc<QuantizationContext>>,
}

impl HammingScorer {
    pub fn new(query: Vec<u8>) -> Result<Self> {
        if query.is_empty() {
            return Err(VectorError::EmptyVector.into());
        }
        Ok(Self {
            query,
            context: None,
        })
    }

    /// Quantizes `query` with `context` so both sides share a code space.
    /// Stored codes are then checked against the context's code length.
    pub fn quantized(query: &[f32], context: Arc<QuantizationContext>) -> Result<Self> {
        let mut scorer = Self::new(context.quantize(query)?)?;
        scorer.context = Some(context);
        Ok(scorer)
    }
}

impl VectorScorer for HammingScorer {
    type Element = u8;

    #[inline]
    fn score(&self, doc: DocId, code: &[u8]) -> Result<f32> {
        match &self.context {
            Some(context) => context.validate_code(doc, code)?,
            None if code.len() != self.query.len() => {
                return Err(SearchError::MalformedQuantizedData {
                    doc,
                    expected: self.query.len(),
                    got: code.len(),
                })
            }
            None => {}
        }
        Ok(score_from_hamming(hamming_distance(&self.query, code)))
    }
}

/// Asymmetric scoring of a transformed float query against one-bit codes.
#[derive(Debug, Clone)]
pub struct AdcScorer {
    query: Vec<f32>,
    similarity: SimilarityFunction,
    context: Arc<QuantizationContext>,
}

impl AdcScorer {
    /// The query is transformed once here, outside the scan.
    pub fn new(
        query: &[f32],
        context: Arc<QuantizationContext>,
        similarity: SimilarityFunction,
    ) -> Result<Self> {
        if !matches!(
            similarity,
            SimilarityFunction::L2 | SimilarityFunction::InnerProduct | SimilarityFunction::Cosine
        ) {
            return Err(SearchError::unsupported(format!(
                "asymmetric distance computation is not defined for [{}]",
                similarity.name()
            )));
        }
        Ok(Self {
            query: context.transform_for_adc(query, similarity)?,
            similarity,
            context,
        })
    }
}

impl VectorScorer for AdcScorer {
    type Element = u8;

    #[inline]
    fn score(&self, doc: DocId, code: &[u8]) -> Result<f32> {
        self.context.validate_code(doc, code)?;
        self.similarity.compare_adc(&self.query, code)
    }
}

/// One scorer over one cursor, no nesting.
///
/// The cursor is already on its first candidate when this is built. Each
/// `next_doc` scores the candidate it returns and only then steps the
/// cursor, so nothing is scored until it is consumed.
#[derive(Debug)]
pub struct FlatIterator<V, S> {
    values: V,
    scorer: S,
    state: IteratorState,
}

impl<V, S> FlatIterator<V, S>
where
    V: VectorValues,
    S: VectorScorer<Element = V::Element>,
{
    pub fn new(values: V, scorer: S) -> Self {
        Self {
            values,
            scorer,
            state: IteratorState::Unpositioned,
        }
    }
}

impl<V, S> ScoringIterator for FlatIterator<V, S>
where
    V: VectorValues,
    S: VectorScorer<Element = V::Element>,
{
    fn next_doc(&mut self) -> Result<DocId> {
        if self.state == IteratorState::Exhausted {
            return Ok(NO_MORE_DOCS);
        }
        let doc = self.values.doc();
        if doc == NO_MORE_DOCS {
            self.state = IteratorState::Exhausted;
            return Ok(NO_MORE_DOCS);
        }
        let score = self.scorer.score(doc, self.values.vector_value())?;
        self.values.next_doc();
        self.state = IteratorState::Positioned { doc, score };
        Ok(doc)
    }

    #[inline]
    fn state(&self) -> IteratorState {
        self.state
    }

    fn cost(&self) -> u64 {
        self.values.cost()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestedMode {
    /// One result per parent: its best-scoring child.
    Dedup,
    /// Every child, each tagged with its parent.
    Expand,
}

/// Groups the children of any scoring iterator by parent.
///
/// The inner iterator runs one document ahead: the first child is fetched at
/// construction so the owning parent of the next group is always known
/// before the caller asks for it.
pub struct NestedIterator<'a, I> {
    inner: I,
    parents: &'a ParentGroup,
    mode: NestedMode,
    pending: Option<(DocId, f32)>,
    state: IteratorState,
    parent: Option<DocId>,
}

impl<'a, I: ScoringIterator> NestedIterator<'a, I> {
    pub fn new(mut inner: I, parents: &'a ParentGroup, mode: NestedMode) -> Result<Self> {
        let pending = fetch(&mut inner)?;
        Ok(Self {
            inner,
            parents,
            mode,
            pending,
            state: IteratorState::Unpositioned,
            parent: None,
        })
    }

    pub fn mode(&self) -> NestedMode {
        self.mode
    }

    fn finish(&mut self) -> DocId {
        self.state = IteratorState::Exhausted;
        self.parent = None;
        NO_MORE_DOCS
    }

    fn next_expanded(&mut self) -> Result<DocId> {
        loop {
            let Some((doc, score)) = self.pending else {
                return Ok(self.finish());
            };
            self.pending = fetch(&mut self.inner)?;
            if self.parents.is_parent(doc) {
                continue;
            }
            self.parent = owner(self.parents.parent_of(doc));
            self.state = IteratorState::Positioned { doc, score };
            return Ok(doc);
        }
    }

    fn next_deduplicated(&mut self) -> Result<DocId> {
        loop {
            let Some((first, first_score)) = self.pending else {
                return Ok(self.finish());
            };
            let parent = self.parents.parent_of(first);

            let mut best: Option<(DocId, f32)> = None;
            let mut current = Some((first, first_score));
            while let Some((doc, score)) = current {
                if doc >= parent {
                    break;
                }
                if best.map_or(true, |(_, best_score)| score > best_score) {
                    best = Some((doc, score));
                }
                current = fetch(&mut self.inner)?;
            }

            match best {
                Some((doc, score)) => {
                    self.pending = current;
                    self.parent = owner(parent);
                    self.state = IteratorState::Positioned { doc, score };
                    return Ok(doc);
                }
                // A matching parent doc is not a child of anything; step over it.
                None => self.pending = fetch(&mut self.inner)?,
            }
        }
    }
}

/// Children after the last parent have no owner.
fn owner(parent: DocId) -> Option<DocId> {
    (parent != NO_MORE_DOCS).then_some(parent)
}

fn fetch<I: ScoringIterator>(inner: &mut I) -> Result<Option<(DocId, f32)>> {
    let doc = inner.next_doc()?;
    if doc == NO_MORE_DOCS {
        Ok(None)
    } else {
        Ok(Some((doc, inner.score())))
    }
}

impl<I: ScoringIterator> ScoringIterator for NestedIterator<'_, I> {
    fn next_doc(&mut self) -> Result<DocId> {
        if self.state == IteratorState::Exhausted {
            return Ok(NO_MORE_DOCS);
        }
        match self.mode {
            NestedMode::Dedup => self.next_deduplicated(),
            NestedMode::Expand => self.next_expanded(),
        }
    }

    #[inline]
    fn state(&self) -> IteratorState {
        self.state
    }

    fn parent(&self) -> Option<DocId> {
        self.parent
    }

    fn cost(&self) -> u64 {
        self.inner.cost() + u64::from(self.pending.is_some())
    }
}

#[cfg(test)]
mod tests;
