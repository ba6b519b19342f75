//! Reducing a scoring iterator to a sorted result list.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cursor::{DocId, NO_MORE_DOCS};
use crate::error::{Result, SearchError};
use crate::scoring::ScoringIterator;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredDoc {
    pub doc: DocId,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalHitsRelation {
    EqualTo,
    /// More documents matched than were returned.
    GreaterThanOrEqualTo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalHits {
    pub value: u64,
    pub relation: TotalHitsRelation,
}

/// Hits ordered by score descending, then doc ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortedResults {
    pub hits: Vec<ScoredDoc>,
    pub total: TotalHits,
}

impl SortedResults {
    pub fn empty() -> Self {
        Self::exact(Vec::new())
    }

    fn exact(mut hits: Vec<ScoredDoc>) -> Self {
        sort_hits(&mut hits);
        let value = hits.len() as u64;
        Self {
            hits,
            total: TotalHits {
                value,
                relation: TotalHitsRelation::EqualTo,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn docs(&self) -> Vec<DocId> {
        self.hits.iter().map(|hit| hit.doc).collect()
    }
}

fn compare_hits(left: &ScoredDoc, right: &ScoredDoc) -> Ordering {
    right
        .score
        .total_cmp(&left.score)
        .then_with(|| left.doc.cmp(&right.doc))
}

fn sort_hits(hits: &mut [ScoredDoc]) {
    hits.sort_unstable_by(compare_hits);
}

/// Heap slot. Ordered so the heap top is the slot to evict next: unfilled
/// slots first, then the lowest score, then the highest doc.
#[derive(Debug, Clone, Copy)]
struct Slot {
    doc: DocId,
    score: f32,
    filled: bool,
}

impl Slot {
    const EMPTY: Self = Self {
        doc: NO_MORE_DOCS,
        score: f32::NEG_INFINITY,
        filled: false,
    };
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Slot {}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Slot {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .filled
            .cmp(&self.filled)
            .then_with(|| other.score.total_cmp(&self.score))
            .then_with(|| self.doc.cmp(&other.doc))
    }
}

/// Bounded best-k reduction.
///
/// The heap starts with `k` empty slots. A candidate takes over the heap top
/// when that slot is empty or holds a strictly lower score, so an equal
/// score never evicts the incumbent. Empty slots are dropped on `finish`;
/// negative scores are real results and are kept.
#[derive(Debug)]
pub struct TopKSelector {
    heap: BinaryHeap<Slot>,
}

impl TopKSelector {
    pub fn new(k: usize) -> Result<Self> {
        if k == 0 {
            return Err(SearchError::invalid_argument("k must be at least 1"));
        }
        Ok(Self {
            heap: std::iter::repeat(Slot::EMPTY).take(k).collect(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn collect(&mut self, doc: DocId, score: f32) {
        if let Some(mut top) = self.heap.peek_mut() {
            if !top.filled || score > top.score {
                *top = Slot {
                    doc,
                    score,
                    filled: true,
                };
            }
        }
    }

    pub fn finish(self) -> SortedResults {
        let hits = self
            .heap
            .into_vec()
            .into_iter()
            .filter(|slot| slot.filled)
            .map(|slot| ScoredDoc {
                doc: slot.doc,
                score: slot.score,
            })
            .collect();
        SortedResults::exact(hits)
    }
}

/// Drains `iterator` into the best `k` hits. No more slots are seeded than
/// the iterator could ever fill.
pub fn select_top_k(iterator: &mut dyn ScoringIterator, k: usize) -> Result<SortedResults> {
    if k == 0 {
        return Err(SearchError::invalid_argument("k must be at least 1"));
    }
    let bound = usize::try_from(iterator.cost()).unwrap_or(usize::MAX).max(1);
    let mut selector = TopKSelector::new(k.min(bound))?;
    loop {
        let doc = iterator.next_doc()?;
        if doc == NO_MORE_DOCS {
            break;
        }
        selector.collect(doc, iterator.score());
    }
    Ok(selector.finish())
}

/// Scores every candidate and keeps all of them.
pub fn collect_all(iterator: &mut dyn ScoringIterator) -> Result<SortedResults> {
    let mut hits = Vec::new();
    loop {
        let doc = iterator.next_doc()?;
        if doc == NO_MORE_DOCS {
            break;
        }
        hits.push(ScoredDoc {
            doc,
            score: iterator.score(),
        });
    }
    Ok(SortedResults::exact(hits))
}

/// Keeps every candidate scoring at or above a threshold, up to a result
/// window. When more match, the best `max_window` are kept and the total is
/// reported as a lower bound.
#[derive(Debug, Clone, Copy)]
pub struct RadiusFilter {
    threshold: f32,
    max_window: usize,
}

impl RadiusFilter {
    pub fn new(threshold: f32, max_window: usize) -> Result<Self> {
        if threshold.is_nan() {
            return Err(SearchError::invalid_argument("score threshold is NaN"));
        }
        if max_window == 0 {
            return Err(SearchError::invalid_argument(
                "result window must be at least 1",
            ));
        }
        Ok(Self {
            threshold,
            max_window,
        })
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn collect(&self, iterator: &mut dyn ScoringIterator) -> Result<SortedResults> {
        let mut hits = Vec::new();
        let mut matched = 0u64;
        loop {
            let doc = iterator.next_doc()?;
            if doc == NO_MORE_DOCS {
                break;
            }
            let score = iterator.score();
            if score >= self.threshold {
                matched += 1;
                hits.push(ScoredDoc { doc, score });
                if hits.len() >= self.max_window * 2 {
                    self.trim(&mut hits);
                }
            }
        }

        if hits.len() > self.max_window {
            self.trim(&mut hits);
        }
        if matched > self.max_window as u64 {
            warn!(
                matched,
                max_result_window = self.max_window,
                threshold = self.threshold,
                "radius search matched more documents than the result window"
            );
            sort_hits(&mut hits);
            return Ok(SortedResults {
                hits,
                total: TotalHits {
                    value: matched,
                    relation: TotalHitsRelation::GreaterThanOrEqualTo,
                },
            });
        }
        Ok(SortedResults::exact(hits))
    }

    fn trim(&self, hits: &mut Vec<ScoredDoc>) {
        if hits.len() > self.max_window {
            hits.select_nth_unstable_by(self.max_window, compare_hits);
            hits.truncate(self.max_window);
        }
    }
}

#[cfg(test)]
mod tests;
