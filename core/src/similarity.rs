//! Similarity functions and the engine capability table.
//!
//! Every `compare_*` returns a score where higher means more similar. The
//! `score_translation` of each function turns a raw engine distance into the
//! score floor used by radius search. For every function except `Cosine` that
//! floor lives in the `compare_*` score space.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::kernels::{
    dot_and_norms_f32, dot_and_norms_i8, dot_f32, dot_i8, hamming_distance, inner_product_adc,
    l1_f32, l1_i8, l2_squared_adc, l2_squared_f32, l2_squared_i8, linf_f32, linf_i8,
    VectorError,
};

/// Storage representation of a vector field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorDataType {
    Float,
    Byte,
    Binary,
}

/// Backing engine of a field. Only used to look up capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    Faiss,
    Lucene,
    Nmslib,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityFunction {
    /// `1 / (1 + squared euclidean distance)`
    L2,
    /// Raw negated squared euclidean distance.
    NegativeSquaredL2,
    /// `(1 + cosine) / 2`
    Cosine,
    /// Maximum inner product, scaled to stay positive.
    InnerProduct,
    /// `1 / (1 + differing bits)`, binary codes only.
    Hamming,
    L1,
    LInf,
}

impl SimilarityFunction {
    pub fn name(self) -> &'static str {
        match self {
            Self::L2 => "l2",
            Self::NegativeSquaredL2 => "negative_squared_l2",
            Self::Cosine => "cosine",
            Self::InnerProduct => "inner_product",
            Self::Hamming => "hamming",
            Self::L1 => "l1",
            Self::LInf => "linf",
        }
    }

    /// Whether this function has a formula for the given representation.
    pub fn supports(self, data_type: VectorDataType) -> bool {
        match data_type {
            VectorDataType::Binary => matches!(self, Self::Hamming),
            VectorDataType::Float | VectorDataType::Byte => !matches!(self, Self::Hamming),
        }
    }

    pub fn ensure_supports(self, data_type: VectorDataType) -> Result<()> {
        if self.supports(data_type) {
            Ok(())
        } else {
            Err(self.not_defined_for(data_type))
        }
    }

    fn not_defined_for(self, data_type: VectorDataType) -> SearchError {
        SearchError::unsupported(format!(
            "similarity [{}] is not defined for {data_type:?} vectors",
            self.name()
        ))
    }

    /// Converts a raw distance reported by the approximate engine into a
    /// radius-search score floor, matching the engine's own cut-off.
    ///
    /// `Cosine` is the exception: the floor is `1 / (2 - r)` while
    /// `compare_f32` scores `(1 + cos) / 2`, so the two scales differ and a
    /// radius `r` admits documents with `cos` somewhat below `r`.
    pub fn score_translation(self, raw_distance: f32) -> f32 {
        match self {
            Self::L2 | Self::Hamming | Self::L1 | Self::LInf => 1.0 / (1.0 + raw_distance),
            Self::NegativeSquaredL2 => -raw_distance,
            // The engine reports cosine similarity; distance is `1 - cos`.
            Self::Cosine => 1.0 / (1.0 + (1.0 - raw_distance)),
            // The engine reports inner product as a negated distance.
            Self::InnerProduct => inner_product_translation(-raw_distance),
        }
    }

    pub fn compare_f32(self, query: &[f32], doc: &[f32]) -> Result<f32> {
        check_dimensions(query.len(), doc.len())?;
        Ok(match self {
            Self::L2 => score_from_l2_squared(l2_squared_f32(query, doc)),
            Self::NegativeSquaredL2 => -l2_squared_f32(query, doc),
            Self::Cosine => {
                let (dot, query_sq, doc_sq) = dot_and_norms_f32(query, doc);
                score_from_cosine_parts(dot, query_sq, doc_sq)
            }
            Self::InnerProduct => score_from_inner_product(dot_f32(query, doc)),
            Self::L1 => score_from_distance(l1_f32(query, doc)),
            Self::LInf => score_from_distance(linf_f32(query, doc)),
            Self::Hamming => return Err(self.not_defined_for(VectorDataType::Float)),
        })
    }

    pub fn compare_i8(self, query: &[i8], doc: &[i8]) -> Result<f32> {
        check_dimensions(query.len(), doc.len())?;
        Ok(match self {
            Self::L2 => score_from_l2_squared(l2_squared_i8(query, doc) as f32),
            Self::NegativeSquaredL2 => -(l2_squared_i8(query, doc) as f32),
            Self::Cosine => {
                let (dot, query_sq, doc_sq) = dot_and_norms_i8(query, doc);
                score_from_cosine_parts(dot as f32, query_sq as f32, doc_sq as f32)
            }
            Self::InnerProduct => score_from_inner_product(dot_i8(query, doc) as f32),
            Self::L1 => score_from_distance(l1_i8(query, doc) as f32),
            Self::LInf => score_from_distance(linf_i8(query, doc) as f32),
            Self::Hamming => return Err(self.not_defined_for(VectorDataType::Byte)),
        })
    }

    pub fn compare_binary(self, query: &[u8], doc: &[u8]) -> Result<f32> {
        self.ensure_supports(VectorDataType::Binary)?;
        check_dimensions(query.len(), doc.len())?;
        Ok(score_from_hamming(hamming_distance(query, doc)))
    }

    /// Compares an ADC-transformed float query against a packed 1-bit code.
    pub fn compare_adc(self, query: &[f32], code: &[u8]) -> Result<f32> {
        let expected = query.len().div_ceil(8);
        if code.len() != expected {
            return Err(VectorError::DimensionMismatch {
                expected,
                got: code.len(),
            }
            .into());
        }
        match self {
            Self::L2 => Ok(score_from_l2_squared(l2_squared_adc(query, code))),
            Self::InnerProduct | Self::Cosine => {
                Ok(score_from_inner_product(inner_product_adc(query, code)))
            }
            other => Err(SearchError::unsupported(format!(
                "asymmetric distance computation is not defined for [{}]",
                other.name()
            ))),
        }
    }
}

fn check_dimensions(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(VectorError::DimensionMismatch { expected, got }.into());
    }
    Ok(())
}

#[inline]
pub(crate) fn score_from_distance(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

#[inline]
pub(crate) fn score_from_l2_squared(squared: f32) -> f32 {
    score_from_distance(squared)
}

#[inline]
pub(crate) fn score_from_hamming(distance: u32) -> f32 {
    score_from_distance(distance as f32)
}

/// Stored vectors with a zero norm score as orthogonal instead of aborting
/// the scan; zero-norm queries are rejected before scoring starts.
#[inline]
pub(crate) fn score_from_cosine_parts(dot: f32, query_sq: f32, doc_sq: f32) -> f32 {
    let denominator = (query_sq * doc_sq).sqrt();
    let cosine = if denominator > 0.0 {
        dot / denominator
    } else {
        0.0
    };
    (1.0 + cosine) / 2.0
}

#[inline]
pub(crate) fn score_from_inner_product(dot: f32) -> f32 {
    if dot < 0.0 {
        1.0 / (1.0 - dot)
    } else {
        dot + 1.0
    }
}

/// Translation of an engine-reported inner product "distance".
fn inner_product_translation(raw: f32) -> f32 {
    if raw >= 0.0 {
        1.0 / (1.0 + raw)
    } else {
        -raw + 1.0
    }
}

/// Casts a float query to signed bytes the way byte-backed storage expects:
/// truncate toward zero, saturate into `i32`, then keep the low 8 bits.
pub fn cast_query_to_i8(query: &[f32]) -> Vec<i8> {
    query.iter().map(|&value| value as i32 as i8).collect()
}

/// Which engines and functions support the optional search modes.
///
/// Passed into the searcher explicitly instead of being looked up from a
/// process-wide registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCapabilities {
    radius_engines: Vec<Engine>,
    adc_functions: Vec<SimilarityFunction>,
}

impl Default for EngineCapabilities {
    fn default() -> Self {
        Self {
            radius_engines: vec![Engine::Faiss],
            adc_functions: vec![
                SimilarityFunction::L2,
                SimilarityFunction::InnerProduct,
                SimilarityFunction::Cosine,
            ],
        }
    }
}

impl EngineCapabilities {
    pub fn new(radius_engines: Vec<Engine>, adc_functions: Vec<SimilarityFunction>) -> Self {
        Self {
            radius_engines,
            adc_functions,
        }
    }

    pub fn supports_radius(&self, engine: Engine) -> bool {
        self.radius_engines.contains(&engine)
    }

    pub fn supports_adc(&self, similarity: SimilarityFunction) -> bool {
        self.adc_functions.contains(&similarity)
    }

    pub fn ensure_radius(&self, engine: Engine) -> Result<()> {
        if self.supports_radius(engine) {
            Ok(())
        } else {
            Err(SearchError::unsupported(format!(
                "engine [{engine:?}] does not support radial search"
            )))
        }
    }

    pub fn ensure_adc(&self, similarity: SimilarityFunction) -> Result<()> {
        if self.supports_adc(similarity) {
            Ok(())
        } else {
            Err(SearchError::unsupported(format!(
                "asymmetric distance computation is not enabled for [{}]",
                similarity.name()
            )))
        }
    }
}
