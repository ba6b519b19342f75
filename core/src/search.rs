//! Exact search over one segment, or many in parallel.

use std::sync::Arc;

use rayon::prelude::*;
use roaring::RoaringBitmap;
use tracing::{debug, trace};

use crate::config::ExactSearchConfig;
use crate::cursor::{BitmapCursor, Conjunction, ParentGroup};
use crate::error::{Result, SearchError};
use crate::kernels::{validate_float_query, VectorError};
use crate::scoring::{
    AdcScorer, ByteScorer, FlatIterator, FloatScorer, HammingScorer, NestedIterator, NestedMode,
    ScoringIterator, VectorScorer,
};
use crate::segment::{FieldMetadata, VectorSegment};
use crate::selection::{collect_all, select_top_k, RadiusFilter, SortedResults};
use crate::similarity::{cast_query_to_i8, EngineCapabilities, SimilarityFunction, VectorDataType};
use crate::values::VectorValues;

#[derive(Debug, Clone, PartialEq)]
pub enum QueryVector {
    Float(Vec<f32>),
    Byte(Vec<i8>),
    /// Packed bits for binary fields.
    Binary(Vec<u8>),
}

/// Everything one search call needs. Built once, then only read.
#[derive(Debug, Clone)]
pub struct QueryContext {
    pub query: QueryVector,
    pub k: usize,
    /// Distance radius, or a score floor when `radius_is_score` is set.
    pub radius: Option<f32>,
    pub radius_is_score: bool,
    /// Candidate restriction. Under nesting these are child ids.
    pub filter: Option<Arc<RoaringBitmap>>,
    pub parents: Option<Arc<ParentGroup>>,
    /// Score stored quantized codes when the segment has them.
    pub use_quantized: bool,
    /// Overrides the field's similarity.
    pub similarity: Option<SimilarityFunction>,
    pub expand_nested: bool,
}

impl QueryContext {
    pub fn new(query: QueryVector, k: usize) -> Self {
        Self {
            query,
            k,
            radius: None,
            radius_is_score: false,
            filter: None,
            parents: None,
            use_quantized: true,
            similarity: None,
            expand_nested: false,
        }
    }

    pub fn float(query: Vec<f32>, k: usize) -> Self {
        Self::new(QueryVector::Float(query), k)
    }

    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = Some(radius);
        self.radius_is_score = false;
        self
    }

    /// Radius already expressed in score space; it is used as-is.
    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.radius = Some(threshold);
        self.radius_is_score = true;
        self
    }

    pub fn with_filter(mut self, filter: Arc<RoaringBitmap>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_parents(mut self, parents: Arc<ParentGroup>) -> Self {
        self.parents = Some(parents);
        self
    }

    pub fn with_quantized(mut self, use_quantized: bool) -> Self {
        self.use_quantized = use_quantized;
        self
    }

    pub fn with_similarity(mut self, similarity: SimilarityFunction) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn expanding_nested(mut self) -> Self {
        self.expand_nested = true;
        self
    }

    fn validate(&self) -> Result<()> {
        match self.radius {
            Some(radius) if !(radius.is_finite() && radius > 0.0) => Err(
                SearchError::invalid_argument(format!("radius must be positive, got {radius}")),
            ),
            Some(_) => Ok(()),
            None if self.k == 0 => Err(SearchError::invalid_argument("k must be at least 1")),
            None => Ok(()),
        }
    }
}

/// One segment-level search of a multi-segment request.
#[derive(Clone, Copy)]
pub struct SegmentRequest<'a> {
    pub segment: &'a dyn VectorSegment,
    pub field: &'a str,
    pub context: &'a QueryContext,
}

/// Exact scoring entry point. Holds no per-query state, so one instance
/// serves any number of concurrent searches.
#[derive(Debug, Clone, Default)]
pub struct ExactSearcher {
    capabilities: EngineCapabilities,
    config: ExactSearchConfig,
}

impl ExactSearcher {
    pub fn new(capabilities: EngineCapabilities, config: ExactSearchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            capabilities,
            config,
        })
    }

    pub fn config(&self) -> &ExactSearchConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &EngineCapabilities {
        &self.capabilities
    }

    /// Scores `field` of one segment. A field without vectors here yields
    /// an empty result, not an error.
    pub fn search(
        &self,
        segment: &dyn VectorSegment,
        field: &str,
        context: &QueryContext,
    ) -> Result<SortedResults> {
        context.validate()?;
        let Some(info) = segment.field_info(field) else {
            debug!(segment = segment.name(), field, "field has no vectors in segment");
            return Ok(SortedResults::empty());
        };
        let similarity = context.similarity.unwrap_or(info.similarity);
        if context.radius.is_some() {
            self.capabilities.ensure_radius(info.engine)?;
        }

        let mut iterator = match self.build_iterator(segment, info, similarity, context) {
            Ok(iterator) => iterator,
            Err(SearchError::FieldNotFound { field: missing }) => {
                debug!(
                    segment = segment.name(),
                    field = missing.as_str(),
                    "field has no vectors of the requested kind in segment"
                );
                return Ok(SortedResults::empty());
            }
            Err(error) => return Err(error),
        };

        let results = match context.radius {
            Some(radius) => {
                // A pre-translated radius must not be translated again.
                let threshold = if context.radius_is_score {
                    radius
                } else {
                    similarity.score_translation(radius)
                };
                RadiusFilter::new(threshold, self.config.max_result_window)?
                    .collect(iterator.as_mut())?
            }
            None if context
                .filter
                .as_ref()
                .is_some_and(|filter| filter.len() <= context.k as u64) =>
            {
                collect_all(iterator.as_mut())?
            }
            None => select_top_k(iterator.as_mut(), context.k)?,
        };

        debug!(
            segment = segment.name(),
            field,
            max_doc = segment.max_doc(),
            hits = results.len(),
            total = results.total.value,
            "exact search finished"
        );
        Ok(results)
    }

    /// Runs independent segment searches, in parallel when configured.
    /// Results line up with `requests`.
    pub fn search_segments(&self, requests: &[SegmentRequest<'_>]) -> Vec<Result<SortedResults>> {
        let run = |request: &SegmentRequest<'_>| {
            self.search(request.segment, request.field, request.context)
        };
        if self.config.parallel_segments {
            requests.par_iter().map(run).collect()
        } else {
            requests.iter().map(run).collect()
        }
    }

    fn build_iterator<'a>(
        &self,
        segment: &'a dyn VectorSegment,
        info: &FieldMetadata,
        similarity: SimilarityFunction,
        context: &'a QueryContext,
    ) -> Result<Box<dyn ScoringIterator + 'a>> {
        let field = info.name.as_str();
        let filter = context.filter.as_deref();

        let (flat, variant) = match info.data_type {
            VectorDataType::Binary => {
                similarity.ensure_supports(VectorDataType::Binary)?;
                let query = binary_query(&context.query, info.stored_len())?;
                let scorer = HammingScorer::new(query)?;
                (flat(segment.binary_values(field)?, filter, scorer), "binary")
            }
            VectorDataType::Byte => {
                let query = byte_query(&context.query, info.dimension)?;
                let scorer = ByteScorer::new(query, similarity)?;
                (flat(segment.byte_values(field)?, filter, scorer), "byte")
            }
            VectorDataType::Float => {
                let query = float_query(&context.query)?;
                validate_float_query(&query, info.dimension, self.config.strict_finite)?;
                let quantization = segment
                    .quantization_context(field)
                    .filter(|_| context.use_quantized);
                match quantization {
                    Some(quantization) if info.adc_enabled => {
                        self.capabilities.ensure_adc(similarity)?;
                        let scorer = AdcScorer::new(&query, quantization, similarity)?;
                        (
                            flat(segment.quantized_values(field)?, filter, scorer),
                            "quantized_adc",
                        )
                    }
                    Some(quantization) => {
                        let scorer = HammingScorer::quantized(&query, quantization)?;
                        (
                            flat(segment.quantized_values(field)?, filter, scorer),
                            "quantized_hamming",
                        )
                    }
                    None => {
                        let scorer = FloatScorer::new(&query, similarity)?;
                        (flat(segment.float_values(field)?, filter, scorer), "float")
                    }
                }
            }
        };

        let Some(parents) = context.parents.as_deref() else {
            trace!(variant, nested = "none", "selected scoring iterator");
            return Ok(flat);
        };
        let mode = if context.expand_nested {
            NestedMode::Expand
        } else {
            NestedMode::Dedup
        };
        trace!(variant, nested = ?mode, "selected scoring iterator");
        Ok(Box::new(NestedIterator::new(flat, parents, mode)?))
    }
}

fn flat<'a, T, S>(
    values: Box<dyn VectorValues<Element = T> + 'a>,
    filter: Option<&'a RoaringBitmap>,
    scorer: S,
) -> Box<dyn ScoringIterator + 'a>
where
    T: 'a,
    S: VectorScorer<Element = T> + 'a,
{
    match filter {
        Some(filter) => Box::new(FlatIterator::new(
            Conjunction::new(values, BitmapCursor::new(filter)),
            scorer,
        )),
        None => Box::new(FlatIterator::new(values, scorer)),
    }
}

fn float_query(query: &QueryVector) -> Result<Vec<f32>> {
    match query {
        QueryVector::Float(values) => Ok(values.clone()),
        QueryVector::Byte(values) => Ok(values.iter().map(|&value| f32::from(value)).collect()),
        QueryVector::Binary(_) => Err(SearchError::invalid_argument(
            "binary query cannot be scored against a float field",
        )),
    }
}

fn byte_query(query: &QueryVector, dimension: usize) -> Result<Vec<i8>> {
    let values = match query {
        QueryVector::Byte(values) => values.clone(),
        QueryVector::Float(values) => cast_query_to_i8(values),
        QueryVector::Binary(_) => {
            return Err(SearchError::invalid_argument(
                "binary query cannot be scored against a byte field",
            ))
        }
    };
    check_query_len(values.len(), dimension)?;
    Ok(values)
}

fn binary_query(query: &QueryVector, code_len: usize) -> Result<Vec<u8>> {
    let values = match query {
        QueryVector::Binary(values) => values.clone(),
        QueryVector::Byte(values) => values.iter().map(|&value| value as u8).collect(),
        QueryVector::Float(_) => {
            return Err(SearchError::invalid_argument(
                "float query cannot be scored against a binary field",
            ))
        }
    };
    check_query_len(values.len(), code_len)?;
    Ok(values)
}

fn check_query_len(got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(VectorError::DimensionMismatch { expected, got }.into());
    }
    Ok(())
}
