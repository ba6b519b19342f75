//! Query-time application of trained scalar quantization.
//!
//! A context is loaded once per segment from the codec's opaque state blob
//! and then shared read-only, usually behind an `Arc`, by every search that
//! touches the segment.

use serde::{Deserialize, Serialize};

use crate::cursor::DocId;
use crate::error::{Result, SearchError};
use crate::kernels::VectorError;
use crate::similarity::SimilarityFunction;

const ADC_CORRECTION_EXPONENT: i32 = 2;

/// Serialized form of a trained quantizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuantizationParams {
    /// One bit per component. The means of the training values falling
    /// below and above each threshold drive asymmetric scoring.
    OneBit {
        thresholds: Vec<f32>,
        below_means: Vec<f32>,
        above_means: Vec<f32>,
    },
    /// `bits` threshold rows, one bit per row per component.
    MultiBit { bits: u8, thresholds: Vec<Vec<f32>> },
}

/// Validated quantization parameters for one field of one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "QuantizationParams", into = "QuantizationParams")]
pub struct QuantizationContext {
    params: QuantizationParams,
    dimension: usize,
}

impl TryFrom<QuantizationParams> for QuantizationContext {
    type Error = SearchError;

    fn try_from(params: QuantizationParams) -> Result<Self> {
        let dimension = match &params {
            QuantizationParams::OneBit {
                thresholds,
                below_means,
                above_means,
            } => {
                let dimension = thresholds.len();
                if below_means.len() != dimension || above_means.len() != dimension {
                    return Err(SearchError::invalid_argument(format!(
                        "one-bit means must match {dimension} thresholds, got {} below and {} above",
                        below_means.len(),
                        above_means.len()
                    )));
                }
                dimension
            }
            QuantizationParams::MultiBit { bits, thresholds } => {
                if !matches!(bits, 2 | 4) {
                    return Err(SearchError::invalid_argument(format!(
                        "multi-bit quantization supports 2 or 4 bits, got {bits}"
                    )));
                }
                if thresholds.len() != usize::from(*bits) {
                    return Err(SearchError::invalid_argument(format!(
                        "expected {bits} threshold rows, got {}",
                        thresholds.len()
                    )));
                }
                let dimension = thresholds[0].len();
                if thresholds.iter().any(|row| row.len() != dimension) {
                    return Err(SearchError::invalid_argument(
                        "threshold rows must share one dimension",
                    ));
                }
                dimension
            }
        };
        if dimension == 0 {
            return Err(SearchError::invalid_argument(
                "quantization thresholds must not be empty",
            ));
        }
        Ok(Self { params, dimension })
    }
}

impl From<QuantizationContext> for QuantizationParams {
    fn from(context: QuantizationContext) -> Self {
        context.params
    }
}

impl QuantizationContext {
    pub fn one_bit(
        thresholds: Vec<f32>,
        below_means: Vec<f32>,
        above_means: Vec<f32>,
    ) -> Result<Self> {
        Self::try_from(QuantizationParams::OneBit {
            thresholds,
            below_means,
            above_means,
        })
    }

    pub fn multi_bit(bits: u8, thresholds: Vec<Vec<f32>>) -> Result<Self> {
        Self::try_from(QuantizationParams::MultiBit { bits, thresholds })
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn params(&self) -> &QuantizationParams {
        &self.params
    }

    pub fn bits(&self) -> u8 {
        match &self.params {
            QuantizationParams::OneBit { .. } => 1,
            QuantizationParams::MultiBit { bits, .. } => *bits,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn bytes_per_vector(&self) -> usize {
        (usize::from(self.bits()) * self.dimension).div_ceil(8)
    }

    /// Packs `query` into the code space of stored vectors. Bit
    /// `row * dimension + j` is set when `query[j]` exceeds that row's
    /// threshold; bits fill each byte from the most significant end.
    pub fn quantize(&self, query: &[f32]) -> Result<Vec<u8>> {
        self.check_dimension(query.len())?;
        let mut code = vec![0u8; self.bytes_per_vector()];
        let rows: &[Vec<f32>] = match &self.params {
            QuantizationParams::OneBit { thresholds, .. } => std::slice::from_ref(thresholds),
            QuantizationParams::MultiBit { thresholds, .. } => thresholds,
        };
        for (row_index, row) in rows.iter().enumerate() {
            for (j, (&value, &threshold)) in query.iter().zip(row).enumerate() {
                if value > threshold {
                    let bit = row_index * self.dimension + j;
                    code[bit / 8] |= 1 << (7 - bit % 8);
                }
            }
        }
        Ok(code)
    }

    /// Linear decode of a one-bit code: `bias + bit * scale` per component,
    /// with `bias` the below-threshold mean and `scale` the gap to the
    /// above-threshold mean.
    pub fn reconstruct(&self, code: &[u8]) -> Result<Vec<f32>> {
        let (below_means, above_means) = self.one_bit_means("reconstruction")?;
        if code.len() != self.bytes_per_vector() {
            return Err(VectorError::DimensionMismatch {
                expected: self.bytes_per_vector(),
                got: code.len(),
            }
            .into());
        }
        Ok(below_means
            .iter()
            .zip(above_means)
            .enumerate()
            .map(|(j, (&below, &above))| {
                if crate::kernels::bit_at(code, j) {
                    above
                } else {
                    below
                }
            })
            .collect())
    }

    /// Maps a full-precision query into the `[0, 1]` bit space of stored
    /// one-bit codes so it can be scored against them directly. L2 also gets
    /// a per-component correction scaled by the squared bucket gap.
    pub fn transform_for_adc(
        &self,
        query: &[f32],
        similarity: SimilarityFunction,
    ) -> Result<Vec<f32>> {
        let (below_means, above_means) = self.one_bit_means("asymmetric distance computation")?;
        self.check_dimension(query.len())?;
        let corrected = similarity == SimilarityFunction::L2;

        query
            .iter()
            .zip(below_means.iter().zip(above_means))
            .enumerate()
            .map(|(j, (&value, (&below, &above)))| {
                let scale = above - below;
                if scale == 0.0 || !scale.is_finite() {
                    return Err(SearchError::invalid_argument(format!(
                        "quantization bucket {j} has no spread ({below} to {above})"
                    )));
                }
                let unit = (value - below) / scale;
                if corrected {
                    Ok(scale.powi(ADC_CORRECTION_EXPONENT) * (unit - 0.5) + 0.5)
                } else {
                    Ok(unit)
                }
            })
            .collect()
    }

    /// Rejects stored codes whose length does not fit this context.
    pub fn validate_code(&self, doc: DocId, code: &[u8]) -> Result<()> {
        let expected = self.bytes_per_vector();
        if code.len() != expected {
            return Err(SearchError::MalformedQuantizedData {
                doc,
                expected,
                got: code.len(),
            });
        }
        Ok(())
    }

    fn one_bit_means(&self, operation: &str) -> Result<(&[f32], &[f32])> {
        match &self.params {
            QuantizationParams::OneBit {
                below_means,
                above_means,
                ..
            } => Ok((below_means, above_means)),
            QuantizationParams::MultiBit { bits, .. } => Err(SearchError::unsupported(format!(
                "{operation} is only defined for one-bit quantization, got {bits} bits"
            ))),
        }
    }

    fn check_dimension(&self, got: usize) -> Result<()> {
        if got != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                got,
            }
            .into());
        }
        Ok(())
    }
}
