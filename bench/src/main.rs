#![forbid(unsafe_code)]
//! Exact search benchmarks for knn-exact.
//!
//! Scenarios:
//! - `flat_topk`: float L2 scan + top-k
//! - `filtered`: top-k over a filter holding half of the documents
//! - `nested`: best child per parent, 4 children per parent
//! - `hamming`: 1-bit symmetric quantization
//! - `adc`: 1-bit asymmetric distance computation under L2
//! - `radius`: radius search with a distance bound

use std::env;
use std::process;

use tracing_subscriber::EnvFilter;

mod scenarios;

const SCENARIOS: &str = "all,flat_topk,filtered,nested,hamming,adc,radius";

fn main() {
    if cfg!(debug_assertions) && env::var("KNN_EXACT_ALLOW_DEBUG_BENCH").as_deref() != Ok("1") {
        eprintln!(
            "error=debug_build_not_allowed message=\"run `cargo run --release -p knn-exact-bench`\""
        );
        process::exit(2);
    }
    init_tracing();

    let mode = if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    };

    let scenario = env::var("KNN_EXACT_BENCH_SCENARIO").unwrap_or_else(|_| "all".to_string());
    let ok = match scenario.as_str() {
        "all" => scenarios::ALL.iter().all(|scenario| scenario.run(mode)),
        name => match scenarios::ALL.iter().find(|scenario| scenario.name() == name) {
            Some(scenario) => scenario.run(mode),
            None => {
                eprintln!("error=invalid_scenario scenario=\"{scenario}\" allowed=\"{SCENARIOS}\"");
                false
            }
        },
    };

    if !ok {
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if let Err(error) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        eprintln!("warn=tracing_init_failed detail=\"{error}\"");
    }
}
