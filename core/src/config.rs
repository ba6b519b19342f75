use std::env;

use crate::error::{Result, SearchError};

const MAX_RESULT_WINDOW_DEFAULT: usize = 10_000;
const STRICT_FINITE_DEFAULT: bool = true;
const PARALLEL_SEGMENTS_DEFAULT: bool = true;

/// Runtime knobs for [`ExactSearcher`](crate::ExactSearcher).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExactSearchConfig {
    /// Most hits a radius search returns from one segment.
    pub max_result_window: usize,
    /// Reject queries containing NaN or infinities.
    pub strict_finite: bool,
    /// Score independent segments on the rayon pool.
    pub parallel_segments: bool,
}

impl Default for ExactSearchConfig {
    fn default() -> Self {
        Self {
            max_result_window: MAX_RESULT_WINDOW_DEFAULT,
            strict_finite: STRICT_FINITE_DEFAULT,
            parallel_segments: PARALLEL_SEGMENTS_DEFAULT,
        }
    }
}

impl ExactSearchConfig {
    pub fn from_env() -> Result<Self> {
        let max_result_window =
            parse_usize("KNN_EXACT_MAX_RESULT_WINDOW", MAX_RESULT_WINDOW_DEFAULT)?;
        let strict_finite = parse_bool_env("KNN_EXACT_STRICT_FINITE", STRICT_FINITE_DEFAULT)?;
        let parallel_segments =
            parse_bool_env("KNN_EXACT_PARALLEL_SEGMENTS", PARALLEL_SEGMENTS_DEFAULT)?;

        let config = Self {
            max_result_window,
            strict_finite,
            parallel_segments,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_result_window == 0 {
            return Err(SearchError::InvalidConfig(
                "KNN_EXACT_MAX_RESULT_WINDOW must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_usize(key: &str, default: usize) -> Result<usize> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim().parse().map_err(|_| {
        SearchError::InvalidConfig(format!("{key} must be a positive integer, got '{raw}'"))
    })
}

fn parse_bool_env(key: &str, default: bool) -> Result<bool> {
    let Ok(raw) = env::var(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SearchError::InvalidConfig(format!(
            "{key} must be a boolean, got '{raw}'"
        ))),
    }
}
