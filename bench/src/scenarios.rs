use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};

use knn_exact_core::{
    DocId, Engine, ExactSearchConfig, ExactSearcher, EngineCapabilities, FieldMetadata,
    InMemorySegment, ParentGroup, QuantizationContext, QueryContext, SimilarityFunction,
    SortedResults, VectorDataType,
};
use roaring::RoaringBitmap;

const FIELD: &str = "embedding";
const CHILDREN_PER_PARENT: u32 = 4;

const DEFAULT_DIMENSION: usize = 128;
const DEFAULT_DATASET_SIZE: usize = 10_000;
const DEFAULT_K: usize = 10;
const DEFAULT_WARMUP_RUNS: usize = 5;
const DEFAULT_MEASURED_RUNS: usize = 30;

#[derive(Clone, Copy)]
struct BenchConfig {
    dimension: usize,
    dataset_size: usize,
    k: usize,
    warmup_runs: usize,
    measured_runs: usize,
}

fn load_config() -> BenchConfig {
    BenchConfig {
        dimension: read_usize_env_with_min("KNN_EXACT_BENCH_DIMENSION", DEFAULT_DIMENSION, 8),
        dataset_size: read_usize_env_with_min(
            "KNN_EXACT_BENCH_DATASET_SIZE",
            DEFAULT_DATASET_SIZE,
            16,
        ),
        k: read_usize_env_with_min("KNN_EXACT_BENCH_K", DEFAULT_K, 1),
        warmup_runs: read_usize_env_with_min("KNN_EXACT_BENCH_WARMUP_RUNS", DEFAULT_WARMUP_RUNS, 0),
        measured_runs: read_usize_env_with_min(
            "KNN_EXACT_BENCH_MEASURED_RUNS",
            DEFAULT_MEASURED_RUNS,
            1,
        ),
    }
}

#[derive(Clone, Copy)]
pub(crate) enum Scenario {
    FlatTopK,
    Filtered,
    Nested,
    Hamming,
    Adc,
    Radius,
}

pub(crate) const ALL: [Scenario; 6] = [
    Scenario::FlatTopK,
    Scenario::Filtered,
    Scenario::Nested,
    Scenario::Hamming,
    Scenario::Adc,
    Scenario::Radius,
];

impl Scenario {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::FlatTopK => "flat_topk",
            Self::Filtered => "filtered",
            Self::Nested => "nested",
            Self::Hamming => "hamming",
            Self::Adc => "adc",
            Self::Radius => "radius",
        }
    }

    pub(crate) fn run(self, mode: &str) -> bool {
        let config = load_config();
        let searcher = match ExactSearchConfig::from_env()
            .and_then(|search_config| ExactSearcher::new(EngineCapabilities::default(), search_config))
        {
            Ok(value) => value,
            Err(error) => {
                eprintln!("error=searcher_config_failed detail=\"{error}\"");
                return false;
            }
        };
        let Some((segment, context)) = self.prepare(&config) else {
            return false;
        };

        for _ in 0..config.warmup_runs {
            if run_once(&searcher, &segment, &context).is_none() {
                return false;
            }
        }

        let mut elapsed_samples = Vec::with_capacity(config.measured_runs);
        let mut total_duration = Duration::from_secs(0);
        let mut last = SortedResults::empty();

        for _ in 0..config.measured_runs {
            let Some((elapsed, results)) = run_once(&searcher, &segment, &context) else {
                return false;
            };
            elapsed_samples.push(elapsed.as_secs_f64() * 1_000.0);
            total_duration += elapsed;
            last = results;
        }

        let (p50_ms, p95_ms, avg_ms) = summarize_ms(&elapsed_samples);
        let qps = config.measured_runs as f64 / total_duration.as_secs_f64();
        let scanned_per_sec =
            (config.measured_runs * config.dataset_size) as f64 / total_duration.as_secs_f64();
        let (best_doc, best_score) = last
            .hits
            .first()
            .map_or((-1i64, f32::NAN), |hit| (i64::from(hit.doc), hit.score));

        println!(
            "bench={} mode={mode} dataset_size={} dimension={} k={} warmup_runs={} measured_runs={} p50_ms={p50_ms:.6} p95_ms={p95_ms:.6} avg_ms={avg_ms:.6} qps={qps:.2} scanned_per_sec={scanned_per_sec:.2} hits={} total={} best_doc={best_doc} best_score={best_score:.6}",
            self.name(),
            config.dataset_size,
            config.dimension,
            config.k,
            config.warmup_runs,
            config.measured_runs,
            last.len(),
            last.total.value
        );

        true
    }

    fn prepare(self, config: &BenchConfig) -> Option<(InMemorySegment, QueryContext)> {
        let query = QueryContext::float(deterministic_vector(42, config.dimension), config.k);
        match self {
            Self::FlatTopK => Some((float_segment(config, all_docs(config), false)?, query)),
            Self::Filtered => {
                let filter: RoaringBitmap = (0..config.dataset_size as u32).step_by(2).collect();
                Some((
                    float_segment(config, all_docs(config), false)?,
                    query.with_filter(Arc::new(filter)),
                ))
            }
            Self::Nested => {
                let group = CHILDREN_PER_PARENT + 1;
                let (parents, children): (Vec<DocId>, Vec<DocId>) =
                    (0..config.dataset_size as u32).partition(|doc| doc % group == CHILDREN_PER_PARENT);
                let parents: ParentGroup = parents.into_iter().collect();
                Some((
                    float_segment(config, children, false)?,
                    query.with_parents(Arc::new(parents)),
                ))
            }
            Self::Hamming => Some((quantized_segment(config, false)?, query)),
            Self::Adc => Some((quantized_segment(config, true)?, query)),
            Self::Radius => {
                // values are uniform in [0, 1), so squared distances center on dim / 6
                let radius = config.dimension as f32 / 8.0;
                Some((
                    float_segment(config, all_docs(config), false)?,
                    query.with_radius(radius),
                ))
            }
        }
    }
}

fn run_once(
    searcher: &ExactSearcher,
    segment: &InMemorySegment,
    context: &QueryContext,
) -> Option<(Duration, SortedResults)> {
    let started_at = Instant::now();
    match searcher.search(segment, FIELD, context) {
        Ok(results) => Some((started_at.elapsed(), results)),
        Err(error) => {
            eprintln!("error=search_failed detail=\"{error}\"");
            None
        }
    }
}

fn all_docs(config: &BenchConfig) -> Vec<DocId> {
    (0..config.dataset_size as u32).collect()
}

fn float_segment(config: &BenchConfig, docs: Vec<DocId>, adc: bool) -> Option<InMemorySegment> {
    let metadata = FieldMetadata::new(
        FIELD,
        VectorDataType::Float,
        SimilarityFunction::L2,
        Engine::Faiss,
        config.dimension,
    )
    .with_adc(adc);
    let mut segment = InMemorySegment::new("bench");
    let vectors = docs
        .into_iter()
        .map(|doc| (doc, deterministic_vector(u64::from(doc), config.dimension)));
    if let Err(error) = segment.add_float_field(metadata, vectors) {
        eprintln!("error=segment_build_failed detail=\"{error}\"");
        return None;
    }
    Some(segment)
}

fn quantized_segment(config: &BenchConfig, adc: bool) -> Option<InMemorySegment> {
    let mut segment = float_segment(config, all_docs(config), adc)?;
    let context = match QuantizationContext::one_bit(
        vec![0.5; config.dimension],
        vec![0.25; config.dimension],
        vec![0.75; config.dimension],
    ) {
        Ok(value) => value,
        Err(error) => {
            eprintln!("error=quantization_context_failed detail=\"{error}\"");
            return None;
        }
    };
    if let Err(error) = segment.quantize_field(FIELD, context) {
        eprintln!("error=quantize_field_failed detail=\"{error}\"");
        return None;
    }
    Some(segment)
}

fn summarize_ms(samples_ms: &[f64]) -> (f64, f64, f64) {
    let p50_ms = percentile_ms(samples_ms, 0.50);
    let p95_ms = percentile_ms(samples_ms, 0.95);
    let avg_ms = samples_ms.iter().sum::<f64>() / samples_ms.len() as f64;
    (p50_ms, p95_ms, avg_ms)
}

fn percentile_ms(samples_ms: &[f64], quantile: f64) -> f64 {
    if samples_ms.is_empty() {
        return 0.0;
    }

    let mut sorted = samples_ms.to_vec();
    sorted.sort_by(f64::total_cmp);
    let last_index = sorted.len().saturating_sub(1);
    let position = (quantile.clamp(0.0, 1.0) * last_index as f64).round() as usize;
    sorted[position]
}

fn deterministic_vector(seed: u64, dimension: usize) -> Vec<f32> {
    (0..dimension)
        .map(|index| {
            let mixed = (seed as usize)
                .wrapping_mul(2_654_435_761)
                .wrapping_add(index.wrapping_mul(40_503))
                % 10_000;
            mixed as f32 / 10_000.0
        })
        .collect()
}

fn read_usize_env_with_min(name: &str, default: usize, min: usize) -> usize {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<usize>() {
            Ok(value) if value >= min => value,
            Ok(value) => {
                eprintln!(
                    "warn=invalid_env value={value} env={name} reason=\"must be >= {min}\" using_default={default}"
                );
                default
            }
            Err(_) => {
                eprintln!(
                    "warn=invalid_env value=\"{raw}\" env={name} reason=\"not an integer\" using_default={default}"
                );
                default
            }
        },
        Err(_) => default,
    }
}
