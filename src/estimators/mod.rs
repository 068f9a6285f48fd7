//! Causal estimators over the joined analysis table.
//!
//! The method is a tagged variant: every method consumes the same
//! `JoinedObservation` slice and `EstimationSpec`; difference-in-differences
//! and synthetic control yield a point estimate, causal discovery yields a
//! graph.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{CausalEstimate, CausalGraph, JoinedObservation, Variable};
use crate::window::TimeWindow;
use crate::{Result, SeedfireError};

pub mod did;
pub mod discovery;
pub mod panel;
pub mod stats;
pub mod synthetic;

pub const METHOD_ORDER: [&str; 3] = ["did", "synthetic_control", "causal_discovery"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    CausalDiscovery,
    DifferenceInDifferences,
    SyntheticControl,
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CausalDiscovery => "causal_discovery",
            Self::DifferenceInDifferences => "did",
            Self::SyntheticControl => "synthetic_control",
        }
    }

    pub fn estimate(
        &self,
        table: &[JoinedObservation],
        spec: &EstimationSpec,
        settings: &MethodSettings,
    ) -> Result<EstimatorOutput> {
        info!(method = self.name(), rows = table.len(), "running estimator");
        let output = match self {
            Self::DifferenceInDifferences => EstimatorOutput::Effect(did::estimate(table, spec)?),
            Self::SyntheticControl => EstimatorOutput::Effect(synthetic::estimate(
                table,
                spec,
                &settings.synthetic,
            )?),
            Self::CausalDiscovery => {
                EstimatorOutput::Graph(discovery::discover(table, &settings.discovery)?)
            }
        };
        Ok(output)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "did" | "difference_in_differences" => Ok(Self::DifferenceInDifferences),
            "synthetic_control" | "sc" => Ok(Self::SyntheticControl),
            "causal_discovery" | "pc" => Ok(Self::CausalDiscovery),
            other => Err(format!(
                "unknown method '{other}'. valid methods: {}",
                METHOD_ORDER.join(",")
            )),
        }
    }
}

/// Parses a list of method names and returns them deduplicated in
/// canonical order.
pub fn canonical_method_list(raw: &[String]) -> std::result::Result<Vec<Method>, String> {
    let requested = raw
        .iter()
        .map(|m| m.parse::<Method>())
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut out = Vec::new();
    for name in METHOD_ORDER {
        let method: Method = name.parse()?;
        if requested.contains(&method) {
            out.push(method);
        }
    }
    Ok(out)
}

/// Output of one estimator: a point estimate or a candidate graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EstimatorOutput {
    Effect(CausalEstimate),
    Graph(CausalGraph),
}

impl EstimatorOutput {
    pub fn as_effect(&self) -> Option<&CausalEstimate> {
        match self {
            Self::Effect(e) => Some(e),
            Self::Graph(_) => None,
        }
    }

    pub fn as_graph(&self) -> Option<&CausalGraph> {
        match self {
            Self::Graph(g) => Some(g),
            Self::Effect(_) => None,
        }
    }
}

/// Which columns play treatment and outcome, and where the pre/post
/// boundary falls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationSpec {
    pub treatment: Variable,
    pub outcome: Variable,
    /// First post-treatment window; everything earlier is pre-period.
    pub treatment_start: TimeWindow,
    /// A unit counts as treated in a window when its treatment value
    /// exceeds this threshold.
    pub treatment_threshold: f64,
    pub min_pre_periods: usize,
    pub confidence_level: f64,
}

impl EstimationSpec {
    pub fn new(treatment: Variable, outcome: Variable, treatment_start: TimeWindow) -> Self {
        Self {
            treatment,
            outcome,
            treatment_start,
            treatment_threshold: 0.5,
            min_pre_periods: 2,
            confidence_level: 0.95,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.treatment == self.outcome {
            return Err(SeedfireError::InvalidConfig(format!(
                "treatment and outcome must differ, both are {}",
                self.outcome
            )));
        }
        if self.min_pre_periods == 0 {
            return Err(SeedfireError::InvalidConfig(
                "min_pre_periods must be > 0".to_string(),
            ));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(SeedfireError::InvalidConfig(
                "confidence_level must be in (0, 1)".to_string(),
            ));
        }
        if !self.treatment_threshold.is_finite() {
            return Err(SeedfireError::InvalidConfig(
                "treatment_threshold must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticControlParams {
    /// Largest allowed gap between donor and treated pre-period slopes,
    /// relative to `max(1, |treated slope|)`.
    pub max_trend_gap: f64,
    pub max_iter: usize,
    pub tolerance: f64,
}

impl Default for SyntheticControlParams {
    fn default() -> Self {
        Self {
            max_trend_gap: 1.0,
            max_iter: 10_000,
            tolerance: 1e-10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryParams {
    pub variables: Vec<Variable>,
    pub alpha: f64,
    pub max_condition_size: usize,
}

impl Default for DiscoveryParams {
    fn default() -> Self {
        Self {
            variables: Variable::ALL.to_vec(),
            alpha: 0.05,
            max_condition_size: 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodSettings {
    pub synthetic: SyntheticControlParams,
    pub discovery: DiscoveryParams,
}
