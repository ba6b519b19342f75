//! Forward-only cursors over sorted document ids.
//!
//! Every cursor is positioned on its first document as soon as it is built,
//! so `doc()` is meaningful right away. Ids strictly increase across calls and
//! [`NO_MORE_DOCS`] is sticky once reached.

use roaring::RoaringBitmap;

pub type DocId = u32;

/// Terminal sentinel returned by exhausted cursors.
pub const NO_MORE_DOCS: DocId = DocId::MAX;

pub trait DocCursor {
    /// Current document, or [`NO_MORE_DOCS`] once exhausted.
    fn doc(&self) -> DocId;

    /// Moves to the next document and returns it.
    fn next_doc(&mut self) -> DocId;

    /// Moves to the first document `>= target`. A cursor already at or past
    /// `target` stays where it is; backward seeks never move.
    fn advance(&mut self, target: DocId) -> DocId {
        let mut doc = self.doc();
        while doc < target {
            doc = self.next_doc();
        }
        doc
    }

    /// Upper bound on the number of documents left to visit.
    fn cost(&self) -> u64;
}

impl<C: DocCursor + ?Sized> DocCursor for Box<C> {
    #[inline]
    fn doc(&self) -> DocId {
        (**self).doc()
    }

    #[inline]
    fn next_doc(&mut self) -> DocId {
        (**self).next_doc()
    }

    #[inline]
    fn advance(&mut self, target: DocId) -> DocId {
        (**self).advance(target)
    }

    #[inline]
    fn cost(&self) -> u64 {
        (**self).cost()
    }
}

/// Cursor over a borrowed, strictly increasing slice of ids.
#[derive(Debug, Clone)]
pub struct SortedDocsCursor<'a> {
    docs: &'a [DocId],
    position: usize,
}

impl<'a> SortedDocsCursor<'a> {
    pub fn new(docs: &'a [DocId]) -> Self {
        debug_assert!(docs.windows(2).all(|pair| pair[0] < pair[1]));
        Self { docs, position: 0 }
    }

    /// Ordinal of the current document within the slice.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }
}

impl DocCursor for SortedDocsCursor<'_> {
    #[inline]
    fn doc(&self) -> DocId {
        self.docs
            .get(self.position)
            .copied()
            .unwrap_or(NO_MORE_DOCS)
    }

    #[inline]
    fn next_doc(&mut self) -> DocId {
        if self.position < self.docs.len() {
            self.position += 1;
        }
        self.doc()
    }

    fn advance(&mut self, target: DocId) -> DocId {
        if self.doc() >= target {
            return self.doc();
        }
        let remaining = &self.docs[self.position..];
        self.position += remaining.partition_point(|&doc| doc < target);
        self.doc()
    }

    fn cost(&self) -> u64 {
        self.docs.len().saturating_sub(self.position) as u64
    }
}

/// Cursor over a roaring bitmap. Steps with the bitmap's own iterator and
/// seeks with `advance_to`, which skips whole containers.
#[derive(Clone)]
pub struct BitmapCursor<'a> {
    iter: roaring::bitmap::Iter<'a>,
    doc: DocId,
}

impl<'a> BitmapCursor<'a> {
    pub fn new(bitmap: &'a RoaringBitmap) -> Self {
        let mut iter = bitmap.iter();
        let doc = iter.next().unwrap_or(NO_MORE_DOCS);
        Self { iter, doc }
    }
}

impl std::fmt::Debug for BitmapCursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitmapCursor")
            .field("doc", &self.doc)
            .field("remaining", &self.iter.len())
            .finish()
    }
}

impl DocCursor for BitmapCursor<'_> {
    #[inline]
    fn doc(&self) -> DocId {
        self.doc
    }

    #[inline]
    fn next_doc(&mut self) -> DocId {
        if self.doc != NO_MORE_DOCS {
            self.doc = self.iter.next().unwrap_or(NO_MORE_DOCS);
        }
        self.doc
    }

    fn advance(&mut self, target: DocId) -> DocId {
        if self.doc >= target {
            return self.doc;
        }
        self.iter.advance_to(target);
        self.doc = self.iter.next().unwrap_or(NO_MORE_DOCS);
        self.doc
    }

    fn cost(&self) -> u64 {
        self.iter.len() as u64 + u64::from(self.doc != NO_MORE_DOCS)
    }
}

/// Leapfrog intersection of two cursors. The lead drives iteration and
/// stays reachable so callers can read per-document data from it.
#[derive(Debug)]
pub struct Conjunction<L, R> {
    lead: L,
    other: R,
}

impl<L: DocCursor, R: DocCursor> Conjunction<L, R> {
    pub fn new(lead: L, other: R) -> Self {
        let mut conjunction = Self { lead, other };
        let start = conjunction.lead.doc();
        conjunction.align(start);
        conjunction
    }

    pub fn lead(&self) -> &L {
        &self.lead
    }

    fn align(&mut self, mut candidate: DocId) -> DocId {
        loop {
            if candidate == NO_MORE_DOCS {
                return NO_MORE_DOCS;
            }
            let other = self.other.advance(candidate);
            if other == candidate || other == NO_MORE_DOCS {
                return other;
            }
            candidate = self.lead.advance(other);
        }
    }
}

impl<L: DocCursor, R: DocCursor> DocCursor for Conjunction<L, R> {
    fn doc(&self) -> DocId {
        let doc = self.lead.doc();
        if doc == NO_MORE_DOCS || self.other.doc() == NO_MORE_DOCS {
            NO_MORE_DOCS
        } else {
            doc
        }
    }

    fn next_doc(&mut self) -> DocId {
        let candidate = self.lead.next_doc();
        self.align(candidate)
    }

    fn advance(&mut self, target: DocId) -> DocId {
        let candidate = self.lead.advance(target);
        self.align(candidate)
    }

    fn cost(&self) -> u64 {
        self.lead.cost().min(self.other.cost())
    }
}

/// Marks which ids are parents in a nested layout. Children of a parent are
/// the non-parent ids between the previous parent (exclusive) and the parent
/// itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParentGroup {
    parents: RoaringBitmap,
}

impl ParentGroup {
    pub fn new(parents: RoaringBitmap) -> Self {
        Self { parents }
    }

    pub fn is_parent(&self, doc: DocId) -> bool {
        self.parents.contains(doc)
    }

    /// First parent id `>= doc`, i.e. the owner of child `doc`. Children
    /// after the last parent have no owner and map to [`NO_MORE_DOCS`].
    pub fn parent_of(&self, doc: DocId) -> DocId {
        let preceding = match doc {
            0 => 0,
            doc => self.parents.rank(doc - 1),
        };
        select_or_end(&self.parents, preceding)
    }

    pub fn len(&self) -> u64 {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

fn select_or_end(bitmap: &RoaringBitmap, index: u64) -> DocId {
    u32::try_from(index)
        .ok()
        .and_then(|index| bitmap.select(index))
        .unwrap_or(NO_MORE_DOCS)
}

impl FromIterator<DocId> for ParentGroup {
    fn from_iter<I: IntoIterator<Item = DocId>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
