//! seedfire - cloud seeding, precipitation, and wildfire causal analysis
//!
//! A batch pipeline that loads three flat-file sources (wildfire incidents,
//! precipitation measurements, cloud-seeding logs), outer-joins them on
//! (region, time window), runs one or more causal estimators over the joined
//! table, and renders the results.
//!
//! Data flows strictly Loader -> Joiner -> Estimator -> Visualizer.

pub mod config;
pub mod estimators;
pub mod io;
pub mod join;
pub mod loader;
pub mod model;
pub mod pipeline;
pub mod summary;
pub mod synth;
pub mod visualize;
pub mod window;

use std::path::PathBuf;

use thiserror::Error;

pub use config::PipelineConfig;
pub use estimators::{EstimationSpec, EstimatorOutput, Method};
pub use join::outer_join;
pub use model::{
    CausalEstimate, CausalGraph, JoinedObservation, PrecipitationRecord, Region, SeedingEvent,
    Variable, WildfireRecord,
};
pub use pipeline::{run_pipeline, RunReport};
pub use window::TimeWindow;

#[derive(Debug, Error)]
pub enum SeedfireError {
    #[error("{source_name} file {path} is missing required column(s): {}", missing.join(", "))]
    SchemaMismatch {
        path: PathBuf,
        source_name: &'static str,
        missing: Vec<String>,
    },
    #[error("malformed record in {path} at line {line}: {reason}")]
    MalformedRecord {
        path: PathBuf,
        line: u64,
        reason: String,
    },
    #[error(
        "treated region {region} has {found} pre-treatment period(s) before {treatment_start}, need at least {required}"
    )]
    InsufficientPreperiodData {
        region: Region,
        treatment_start: TimeWindow,
        found: usize,
        required: usize,
    },
    #[error("no untreated region shares comparable pre-treatment trends with treated region {region}")]
    NoValidDonorPool { region: Region },
    #[error("{method}: no {group} units found for treatment starting {treatment_start}")]
    EmptyGroup {
        method: &'static str,
        group: &'static str,
        treatment_start: TimeWindow,
    },
    #[error("{method}: need at least {needed} complete observations, got {got}")]
    InsufficientObservations {
        method: &'static str,
        needed: usize,
        got: usize,
    },
    #[error("{method}: variable {variable} is constant across complete observations")]
    DegenerateVariable {
        method: &'static str,
        variable: Variable,
    },
    #[error("time window {other} does not share the granularity of {first}")]
    GranularityMismatch { first: TimeWindow, other: TimeWindow },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("plot error: {0}")]
    Plot(String),
}

pub type Result<T> = std::result::Result<T, SeedfireError>;
