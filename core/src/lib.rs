#![forbid(unsafe_code)]
//! Exact k-nearest-neighbor scoring for segment-based search engines.
//!
//! Every candidate vector of a segment is scored against the query, with
//! optional filtering, nested parent/child grouping, radius thresholds and
//! quantized code comparison. Segments are supplied by the caller through
//! [`VectorSegment`]; this crate owns none of the storage.

pub mod config;
pub mod cursor;
pub mod error;
pub mod kernels;
pub mod quantization;
pub mod scoring;
pub mod search;
pub mod segment;
pub mod selection;
pub mod similarity;
pub mod values;

pub use config::ExactSearchConfig;
pub use cursor::{
    BitmapCursor, Conjunction, DocCursor, DocId, ParentGroup, SortedDocsCursor, NO_MORE_DOCS,
};
pub use error::{Result, SearchError};
pub use kernels::{VectorError, VectorSide};
pub use quantization::{QuantizationContext, QuantizationParams};
pub use scoring::{IteratorState, NestedMode, ScoringIterator};
pub use search::{ExactSearcher, QueryContext, QueryVector, SegmentRequest};
pub use segment::{FieldMetadata, InMemorySegment, VectorSegment};
pub use selection::{ScoredDoc, SortedResults, TopKSelector, TotalHits, TotalHitsRelation};
pub use similarity::{Engine, EngineCapabilities, SimilarityFunction, VectorDataType};
pub use values::{VectorStore, VectorValues};
