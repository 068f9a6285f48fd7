//! Record types shared by every pipeline stage.
//!
//! All records are created once per run and never mutated afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::estimators::Method;
use crate::window::TimeWindow;

/// Stable spatial identifier (county, state code, or grid cell label).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecipitationKind {
    Snowpack,
    Rainfall,
    /// Duplicate rows for one key disagreed on the kind.
    Mixed,
}

impl PrecipitationKind {
    pub fn merge(self, other: Self) -> Self {
        if self == other {
            self
        } else {
            Self::Mixed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Snowpack => "snowpack",
            Self::Rainfall => "rainfall",
            Self::Mixed => "mixed",
        }
    }
}

impl FromStr for PrecipitationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snowpack" | "snow" => Ok(Self::Snowpack),
            "rainfall" | "rain" => Ok(Self::Rainfall),
            "mixed" => Ok(Self::Mixed),
            other => Err(format!("unknown precipitation type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedingTarget {
    Warm,
    Cold,
    /// Duplicate rows for one key targeted both seasons.
    Both,
}

impl SeedingTarget {
    pub fn merge(self, other: Self) -> Self {
        if self == other {
            self
        } else {
            Self::Both
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warm => "warm",
            Self::Cold => "cold",
            Self::Both => "both",
        }
    }
}

impl FromStr for SeedingTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warm" | "warm_season" => Ok(Self::Warm),
            "cold" | "cold_season" => Ok(Self::Cold),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown seeding target '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecipitationRecord {
    pub region: Region,
    pub window: TimeWindow,
    pub precipitation_mm: f64,
    pub kind: PrecipitationKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedingEvent {
    pub region: Region,
    pub window: TimeWindow,
    pub seeded: bool,
    pub target: Option<SeedingTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WildfireRecord {
    pub region: Region,
    pub window: TimeWindow,
    pub fire_count: u64,
    pub acres_burned: f64,
}

/// One row of the analysis table: the outer join of all three sources on
/// (region, window). A source with no row for the key leaves its fields
/// `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedObservation {
    pub region: Region,
    pub window: TimeWindow,
    pub precipitation_mm: Option<f64>,
    pub precipitation_kind: Option<PrecipitationKind>,
    pub seeded: Option<bool>,
    pub seeding_target: Option<SeedingTarget>,
    pub fire_count: Option<u64>,
    pub acres_burned: Option<f64>,
}

impl JoinedObservation {
    pub fn empty(region: Region, window: TimeWindow) -> Self {
        Self {
            region,
            window,
            precipitation_mm: None,
            precipitation_kind: None,
            seeded: None,
            seeding_target: None,
            fire_count: None,
            acres_burned: None,
        }
    }
}

/// Analysis column selectable as treatment, outcome, or discovery variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Seeded,
    PrecipitationMm,
    WildfireCount,
    AcresBurned,
}

impl Variable {
    pub const ALL: [Variable; 4] = [
        Variable::Seeded,
        Variable::PrecipitationMm,
        Variable::WildfireCount,
        Variable::AcresBurned,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Seeded => "seeded",
            Self::PrecipitationMm => "precipitation_mm",
            Self::WildfireCount => "wildfire_count",
            Self::AcresBurned => "acres_burned",
        }
    }

    /// Numeric value of this column for one observation; the seeding flag
    /// maps to 1.0 / 0.0.
    pub fn value(&self, obs: &JoinedObservation) -> Option<f64> {
        match self {
            Self::Seeded => obs.seeded.map(|s| if s { 1.0 } else { 0.0 }),
            Self::PrecipitationMm => obs.precipitation_mm,
            Self::WildfireCount => obs.fire_count.map(|c| c as f64),
            Self::AcresBurned => obs.acres_burned,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "seeded" | "seeding" => Ok(Self::Seeded),
            "precipitation_mm" | "precipitation" => Ok(Self::PrecipitationMm),
            "wildfire_count" | "fire_count" => Ok(Self::WildfireCount),
            "acres_burned" | "acres" => Ok(Self::AcresBurned),
            _ => Err(format!(
                "unknown variable '{s}'. valid variables: seeded,precipitation_mm,wildfire_count,acres_burned"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConfidenceInterval {
    pub level: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimateScope {
    pub treated_regions: Vec<Region>,
    pub control_regions: Vec<Region>,
    pub first_window: TimeWindow,
    pub last_window: TimeWindow,
    pub treatment_start: TimeWindow,
}

/// Effect attributed to a single treated region; drives the choropleth.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitEffect {
    pub region: Region,
    pub effect: f64,
}

/// Treated outcome against its counterfactual for one window; drives the
/// comparison plot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub window: TimeWindow,
    pub treated: f64,
    pub counterfactual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DonorWeight {
    pub treated: Region,
    pub donor: Region,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CausalEstimate {
    pub method: Method,
    pub treatment: Variable,
    pub outcome: Variable,
    pub effect: f64,
    pub interval: ConfidenceInterval,
    pub scope: EstimateScope,
    pub unit_effects: Vec<UnitEffect>,
    pub series: Vec<SeriesPoint>,
    pub donor_weights: Vec<DonorWeight>,
}

impl CausalEstimate {
    pub fn n_treated(&self) -> usize {
        self.scope.treated_regions.len()
    }

    pub fn n_control(&self) -> usize {
        self.scope.control_regions.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Directed,
    Undirected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub from: Variable,
    pub to: Variable,
    pub kind: EdgeKind,
    /// Absolute marginal correlation between the endpoints.
    pub strength: f64,
}

/// Candidate causal structure over the analysis variables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CausalGraph {
    pub variables: Vec<Variable>,
    pub edges: Vec<GraphEdge>,
    pub n_observations: usize,
    pub alpha: f64,
}

impl CausalGraph {
    pub fn adjacent(&self, a: Variable, b: Variable) -> bool {
        self.edges
            .iter()
            .any(|e| (e.from == a && e.to == b) || (e.from == b && e.to == a))
    }

    pub fn directed(&self, from: Variable, to: Variable) -> bool {
        self.edges
            .iter()
            .any(|e| e.kind == EdgeKind::Directed && e.from == from && e.to == to)
    }
}

/// Bounding box of a region in longitude/latitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionGeometry {
    pub region: Region,
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_policies_escalate_on_disagreement() {
        assert_eq!(
            PrecipitationKind::Rainfall.merge(PrecipitationKind::Rainfall),
            PrecipitationKind::Rainfall
        );
        assert_eq!(
            PrecipitationKind::Rainfall.merge(PrecipitationKind::Snowpack),
            PrecipitationKind::Mixed
        );
        assert_eq!(SeedingTarget::Cold.merge(SeedingTarget::Warm), SeedingTarget::Both);
    }

    #[test]
    fn variable_values_follow_nullability() {
        let mut obs = JoinedObservation::empty(Region::new("CA-Butte"), TimeWindow::annual(2018));
        assert_eq!(Variable::Seeded.value(&obs), None);
        obs.seeded = Some(true);
        obs.fire_count = Some(3);
        assert_eq!(Variable::Seeded.value(&obs), Some(1.0));
        assert_eq!(Variable::WildfireCount.value(&obs), Some(3.0));
        assert_eq!(Variable::AcresBurned.value(&obs), None);
    }

    #[test]
    fn variable_parses_aliases() {
        assert_eq!("fire_count".parse::<Variable>().unwrap(), Variable::WildfireCount);
        assert_eq!("Precipitation".parse::<Variable>().unwrap(), Variable::PrecipitationMm);
        assert!("humidity".parse::<Variable>().is_err());
    }
}
