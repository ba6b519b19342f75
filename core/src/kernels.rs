//! Distance kernels shared by every scorer.
//!
//! Float kernels run 8 lanes at a time through `wide::f32x8` with a scalar
//! tail; byte kernels accumulate in `i32`; binary kernels work on packed codes
//! whose bit `i` lives in byte `i / 8` at position `7 - i % 8`.

use wide::f32x8;

/// Identifies which input vector triggered a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorSide {
    Query,
    Document,
}

impl std::fmt::Display for VectorSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query => f.write_str("query"),
            Self::Document => f.write_str("document"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VectorError {
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("vector is empty")]
    EmptyVector,
    #[error("non-finite value in {side} vector at index {index}: {value}")]
    NonFinite {
        side: VectorSide,
        index: usize,
        value: f32,
    },
    #[error("zero vector is not supported for cosine similarity")]
    ZeroNorm,
}

/// Checks a float query against the field dimension and, in strict mode,
/// rejects NaN and infinities.
pub fn validate_float_query(
    query: &[f32],
    dimension: usize,
    strict_finite: bool,
) -> Result<(), VectorError> {
    if query.is_empty() {
        return Err(VectorError::EmptyVector);
    }
    if query.len() != dimension {
        return Err(VectorError::DimensionMismatch {
            expected: dimension,
            got: query.len(),
        });
    }
    if strict_finite {
        if let Some((index, value)) = query
            .iter()
            .copied()
            .enumerate()
            .find(|(_, value)| !value.is_finite())
        {
            return Err(VectorError::NonFinite {
                side: VectorSide::Query,
                index,
                value,
            });
        }
    }
    Ok(())
}

const SIMD_WIDTH: usize = 8;

/// Pre-packed query for repeated float comparisons against stored vectors.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    len: usize,
    simd_query: Vec<f32x8>,
    tail: [f32; SIMD_WIDTH],
    tail_len: usize,
    sq_sum: f32,
}

impl PreparedQuery {
    pub fn new(query: &[f32]) -> Self {
        let (simd_query, tail, tail_len) = prepare_simd_query(query);
        Self {
            len: query.len(),
            simd_query,
            tail,
            tail_len,
            sq_sum: dot_f32(query, query),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Squared L2 norm of the query.
    pub fn sq_sum(&self) -> f32 {
        self.sq_sum
    }

    /// Accumulates in the same order as [`l2_squared_f32`], so both agree
    /// to the bit.
    pub fn l2_squared(&self, right: &[f32]) -> f32 {
        debug_assert_eq!(right.len(), self.len);
        let simd_prefix_len = self.simd_query.len() * SIMD_WIDTH;

        let mut simd_sum = f32x8::ZERO;
        for (query_v, right_chunk) in self
            .simd_query
            .iter()
            .zip(right[..simd_prefix_len].chunks_exact(SIMD_WIDTH))
        {
            let delta = *query_v - load_f32x8(right_chunk);
            simd_sum += delta * delta;
        }

        let mut scalar_sum = 0.0f32;
        for (index, right_value) in right[simd_prefix_len..]
            .iter()
            .enumerate()
            .take(self.tail_len)
        {
            let delta = self.tail[index] - *right_value;
            scalar_sum += delta * delta;
        }

        simd_sum.reduce_add() + scalar_sum
    }

    /// Same accumulation order as [`dot_f32`].
    pub fn dot(&self, right: &[f32]) -> f32 {
        debug_assert_eq!(right.len(), self.len);
        let simd_prefix_len = self.simd_query.len() * SIMD_WIDTH;

        let mut simd_sum = f32x8::ZERO;
        for (query_v, right_chunk) in self
            .simd_query
            .iter()
            .zip(right[..simd_prefix_len].chunks_exact(SIMD_WIDTH))
        {
            simd_sum += *query_v * load_f32x8(right_chunk);
        }

        let mut scalar_sum = 0.0f32;
        for (index, right_value) in right[simd_prefix_len..]
            .iter()
            .enumerate()
            .take(self.tail_len)
        {
            scalar_sum += self.tail[index] * *right_value;
        }

        simd_sum.reduce_add() + scalar_sum
    }

    /// Returns `(query · right, right · right)` in a single pass.
    pub fn dot_and_right_sq_sum(&self, right: &[f32]) -> (f32, f32) {
        debug_assert_eq!(right.len(), self.len);
        let simd_prefix_len = self.simd_query.len() * SIMD_WIDTH;

        let mut dot_sum = f32x8::ZERO;
        let mut right_sq_sum = f32x8::ZERO;
        for (query_v, right_chunk) in self
            .simd_query
            .iter()
            .zip(right[..simd_prefix_len].chunks_exact(SIMD_WIDTH))
        {
            let right_v = load_f32x8(right_chunk);
            dot_sum += *query_v * right_v;
            right_sq_sum += right_v * right_v;
        }

        let mut dot_scalar = 0.0f32;
        let mut right_sq_scalar = 0.0f32;
        for (index, right_value) in right[simd_prefix_len..]
            .iter()
            .enumerate()
            .take(self.tail_len)
        {
            dot_scalar += self.tail[index] * *right_value;
            right_sq_scalar += right_value * right_value;
        }

        (
            dot_sum.reduce_add() + dot_scalar,
            right_sq_sum.reduce_add() + right_sq_scalar,
        )
    }
}

fn prepare_simd_query(query: &[f32]) -> (Vec<f32x8>, [f32; SIMD_WIDTH], usize) {
    let mut chunks = query.chunks_exact(SIMD_WIDTH);
    let simd_query = chunks.by_ref().map(load_f32x8).collect();
    let remainder = chunks.remainder();

    let mut tail = [0.0f32; SIMD_WIDTH];
    tail[..remainder.len()].copy_from_slice(remainder);
    (simd_query, tail, remainder.len())
}

fn load_f32x8(values: &[f32]) -> f32x8 {
    debug_assert_eq!(values.len(), SIMD_WIDTH);
    f32x8::from([
        values[0], values[1], values[2], values[3], values[4], values[5], values[6], values[7],
    ])
}

fn simd_scan(
    left: &[f32],
    right: &[f32],
    mut simd_step: impl FnMut(f32x8, f32x8),
    mut scalar_step: impl FnMut(f32, f32),
) {
    let mut left_chunks = left.chunks_exact(SIMD_WIDTH);
    let mut right_chunks = right.chunks_exact(SIMD_WIDTH);

    for (left_chunk, right_chunk) in left_chunks.by_ref().zip(right_chunks.by_ref()) {
        simd_step(load_f32x8(left_chunk), load_f32x8(right_chunk));
    }

    for (&left_value, &right_value) in left_chunks.remainder().iter().zip(right_chunks.remainder())
    {
        scalar_step(left_value, right_value);
    }
}

pub fn dot_f32(left: &[f32], right: &[f32]) -> f32 {
    debug_assert_eq!(left.len(), right.len());
    let mut simd_sum = f32x8::ZERO;
    let mut scalar_sum = 0.0;

    simd_scan(
        left,
        right,
        |left_v, right_v| simd_sum += left_v * right_v,
        |left_value, right_value| scalar_sum += left_value * right_value,
    );

    simd_sum.reduce_add() + scalar_sum
}

pub fn l2_squared_f32(left: &[f32], right: &[f32]) -> f32 {
    debug_assert_eq!(left.len(), right.len());
    let mut simd_sum = f32x8::ZERO;
    let mut scalar_sum = 0.0;

    simd_scan(
        left,
        right,
        |left_v, right_v| {
            let delta = left_v - right_v;
            simd_sum += delta * delta;
        },
        |left_value, right_value| {
            let delta = left_value - right_value;
            scalar_sum += delta * delta;
        },
    );

    simd_sum.reduce_add() + scalar_sum
}

/// Returns `(left · right, left · left, right · right)`.
pub fn dot_and_norms_f32(left: &[f32], right: &[f32]) -> (f32, f32, f32) {
    debug_assert_eq!(left.len(), right.len());
    let mut dot_sum = f32x8::ZERO;
    let mut left_sq_sum = f32x8::ZERO;
    let mut right_sq_sum = f32x8::ZERO;
    let mut dot_scalar = 0.0;
    let mut left_sq_scalar = 0.0;
    let mut right_sq_scalar = 0.0;

    simd_scan(
        left,
        right,
        |left_v, right_v| {
            dot_sum += left_v * right_v;
            left_sq_sum += left_v * left_v;
            right_sq_sum += right_v * right_v;
        },
        |left_value, right_value| {
            dot_scalar += left_value * right_value;
            left_sq_scalar += left_value * left_value;
            right_sq_scalar += right_value * right_value;
        },
    );

    (
        dot_sum.reduce_add() + dot_scalar,
        left_sq_sum.reduce_add() + left_sq_scalar,
        right_sq_sum.reduce_add() + right_sq_scalar,
    )
}

pub fn l1_f32(left: &[f32], right: &[f32]) -> f32 {
    debug_assert_eq!(left.len(), right.len());
    let mut simd_sum = f32x8::ZERO;
    let mut scalar_sum = 0.0;

    simd_scan(
        left,
        right,
        |left_v, right_v| simd_sum += (left_v - right_v).abs(),
        |left_value, right_value| scalar_sum += (left_value - right_value).abs(),
    );

    simd_sum.reduce_add() + scalar_sum
}

pub fn linf_f32(left: &[f32], right: &[f32]) -> f32 {
    debug_assert_eq!(left.len(), right.len());
    let mut simd_max = f32x8::ZERO;
    let mut scalar_max = 0.0f32;

    simd_scan(
        left,
        right,
        |left_v, right_v| simd_max = simd_max.max((left_v - right_v).abs()),
        |left_value, right_value| scalar_max = scalar_max.max((left_value - right_value).abs()),
    );

    simd_max
        .to_array()
        .into_iter()
        .fold(scalar_max, f32::max)
}

pub fn dot_i8(left: &[i8], right: &[i8]) -> i32 {
    debug_assert_eq!(left.len(), right.len());
    left.iter()
        .zip(right)
        .map(|(&l, &r)| i32::from(l) * i32::from(r))
        .sum()
}

pub fn l2_squared_i8(left: &[i8], right: &[i8]) -> i32 {
    debug_assert_eq!(left.len(), right.len());
    left.iter()
        .zip(right)
        .map(|(&l, &r)| {
            let delta = i32::from(l) - i32::from(r);
            delta * delta
        })
        .sum()
}

/// Returns `(left · right, left · left, right · right)` over byte lanes.
pub fn dot_and_norms_i8(left: &[i8], right: &[i8]) -> (i32, i32, i32) {
    debug_assert_eq!(left.len(), right.len());
    left.iter()
        .zip(right)
        .fold((0, 0, 0), |(dot, left_sq, right_sq), (&l, &r)| {
            let (l, r) = (i32::from(l), i32::from(r));
            (dot + l * r, left_sq + l * l, right_sq + r * r)
        })
}

pub fn l1_i8(left: &[i8], right: &[i8]) -> i32 {
    debug_assert_eq!(left.len(), right.len());
    left.iter()
        .zip(right)
        .map(|(&l, &r)| (i32::from(l) - i32::from(r)).abs())
        .sum()
}

pub fn linf_i8(left: &[i8], right: &[i8]) -> i32 {
    debug_assert_eq!(left.len(), right.len());
    left.iter()
        .zip(right)
        .map(|(&l, &r)| (i32::from(l) - i32::from(r)).abs())
        .max()
        .unwrap_or(0)
}

/// Number of differing bits between two equal-length packed codes.
pub fn hamming_distance(left: &[u8], right: &[u8]) -> u32 {
    debug_assert_eq!(left.len(), right.len());
    let mut left_words = left.chunks_exact(8);
    let mut right_words = right.chunks_exact(8);

    let mut count = 0u32;
    for (left_word, right_word) in left_words.by_ref().zip(right_words.by_ref()) {
        count += (load_u64(left_word) ^ load_u64(right_word)).count_ones();
    }
    for (&l, &r) in left_words.remainder().iter().zip(right_words.remainder()) {
        count += (l ^ r).count_ones();
    }
    count
}

fn load_u64(bytes: &[u8]) -> u64 {
    debug_assert_eq!(bytes.len(), 8);
    u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

/// Reads bit `index` of a packed code.
#[inline]
pub fn bit_at(code: &[u8], index: usize) -> bool {
    code[index / 8] & (1 << (7 - index % 8)) != 0
}

/// Squared L2 distance between a float query and a packed 1-bit code whose
/// bits are read as 0.0 / 1.0.
pub fn l2_squared_adc(query: &[f32], code: &[u8]) -> f32 {
    debug_assert!(code.len() * 8 >= query.len());
    query
        .iter()
        .enumerate()
        .map(|(index, &value)| {
            let bit = if bit_at(code, index) { 1.0 } else { 0.0 };
            let delta = bit - value;
            delta * delta
        })
        .sum()
}

/// Inner product between a float query and a packed 1-bit code.
pub fn inner_product_adc(query: &[f32], code: &[u8]) -> f32 {
    debug_assert!(code.len() * 8 >= query.len());
    query
        .iter()
        .enumerate()
        .filter(|(index, _)| bit_at(code, *index))
        .map(|(_, &value)| value)
        .sum()
}
