use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::estimators::{canonical_method_list, EstimationSpec, Method, MethodSettings};
use crate::loader::LoadOptions;
use crate::model::Variable;
use crate::visualize::ChoroplethMetric;
use crate::window::TimeWindow;
use crate::{Result, SeedfireError};

pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// Run configuration, read from TOML. Every field has a default so a
/// config file only needs to name what differs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub schema_version: String,
    /// Directory holding the source files.
    pub data_dir: PathBuf,
    pub wildfire_file: String,
    pub precipitation_file: String,
    pub seeding_file: String,
    /// Optional region geometry file; regions fall back to a grid layout.
    pub regions_file: Option<String>,
    /// Base directory for run outputs; each run gets a timestamped child.
    pub output_dir: PathBuf,
    pub methods: Vec<String>,
    pub treatment: Variable,
    pub outcome: Variable,
    pub treatment_start: TimeWindow,
    pub treatment_threshold: f64,
    pub min_pre_periods: usize,
    pub confidence_level: f64,
    pub min_fire_acres: Option<f64>,
    pub render_plots: bool,
    pub choropleth_metrics: Vec<ChoroplethMetric>,
    /// Restricts metric maps to one window; all windows when unset.
    pub choropleth_window: Option<TimeWindow>,
    pub settings: MethodSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION.to_string(),
            data_dir: PathBuf::from("data"),
            wildfire_file: "wildfires.csv".to_string(),
            precipitation_file: "precipitation.csv".to_string(),
            seeding_file: "seeding.csv".to_string(),
            regions_file: None,
            output_dir: PathBuf::from("data_visualizations"),
            methods: vec![
                "did".to_string(),
                "synthetic_control".to_string(),
                "causal_discovery".to_string(),
            ],
            treatment: Variable::Seeded,
            outcome: Variable::WildfireCount,
            treatment_start: TimeWindow::annual(2010),
            treatment_threshold: 0.5,
            min_pre_periods: 2,
            confidence_level: 0.95,
            min_fire_acres: None,
            render_plots: true,
            choropleth_metrics: vec![ChoroplethMetric::TotalAcres, ChoroplethMetric::FireCount],
            choropleth_window: None,
            settings: MethodSettings::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let cfg: PipelineConfig = toml::from_str(&raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(SeedfireError::InvalidConfig(msg.to_string()));

        if self.schema_version != CONFIG_SCHEMA_VERSION {
            return Err(SeedfireError::InvalidConfig(format!(
                "config schema_version {} does not match {}",
                self.schema_version, CONFIG_SCHEMA_VERSION
            )));
        }
        if self.wildfire_file.trim().is_empty()
            || self.precipitation_file.trim().is_empty()
            || self.seeding_file.trim().is_empty()
        {
            return invalid("source file names must be non-empty");
        }
        if self.methods.is_empty() {
            return invalid("methods list cannot be empty");
        }
        canonical_method_list(&self.methods).map_err(SeedfireError::InvalidConfig)?;
        if let Some(min) = self.min_fire_acres {
            if !min.is_finite() || min < 0.0 {
                return invalid("min_fire_acres must be >= 0");
            }
        }
        let s = &self.settings.synthetic;
        if !s.max_trend_gap.is_finite() || s.max_trend_gap < 0.0 {
            return invalid("settings.synthetic.max_trend_gap must be >= 0");
        }
        if s.max_iter == 0 {
            return invalid("settings.synthetic.max_iter must be > 0");
        }
        if !(s.tolerance > 0.0) {
            return invalid("settings.synthetic.tolerance must be > 0");
        }
        let d = &self.settings.discovery;
        if !(d.alpha > 0.0 && d.alpha < 1.0) {
            return invalid("settings.discovery.alpha must be in (0, 1)");
        }
        if d.variables.len() < 2 {
            return invalid("settings.discovery.variables needs at least two variables");
        }
        self.estimation_spec().validate()
    }

    pub fn methods(&self) -> Result<Vec<Method>> {
        canonical_method_list(&self.methods).map_err(SeedfireError::InvalidConfig)
    }

    pub fn estimation_spec(&self) -> EstimationSpec {
        EstimationSpec {
            treatment: self.treatment,
            outcome: self.outcome,
            treatment_start: self.treatment_start,
            treatment_threshold: self.treatment_threshold,
            min_pre_periods: self.min_pre_periods,
            confidence_level: self.confidence_level,
        }
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            min_fire_acres: self.min_fire_acres,
        }
    }

    pub fn wildfire_path(&self) -> PathBuf {
        self.data_dir.join(&self.wildfire_file)
    }

    pub fn precipitation_path(&self) -> PathBuf {
        self.data_dir.join(&self.precipitation_file)
    }

    pub fn seeding_path(&self) -> PathBuf {
        self.data_dir.join(&self.seeding_file)
    }

    pub fn regions_path(&self) -> Option<PathBuf> {
        self.regions_file.as_ref().map(|f| self.data_dir.join(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn bundled_default_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("configs")
            .join("default.toml");
        let cfg = PipelineConfig::from_toml_file(&path).unwrap();
        assert_eq!(cfg.regions_file.as_deref(), Some("regions.csv"));
        assert_eq!(cfg.methods().unwrap().len(), 3);
        assert_eq!(cfg.choropleth_metrics.len(), 4);
        assert!(cfg.choropleth_window.is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.toml");
        fs::write(
            &path,
            r#"
schema_version = "1.0.0"
data_dir = "fixtures"
methods = ["did"]
outcome = "acres_burned"
treatment_start = "2018-Q3"

[settings.discovery]
alpha = 0.01
"#,
        )
        .unwrap();

        let cfg = PipelineConfig::from_toml_file(&path).unwrap();
        assert_eq!(cfg.outcome, Variable::AcresBurned);
        assert_eq!(cfg.treatment, Variable::Seeded);
        assert_eq!(cfg.treatment_start, TimeWindow::quarter(2018, 3).unwrap());
        assert_eq!(cfg.wildfire_path(), PathBuf::from("fixtures").join("wildfires.csv"));
        assert_eq!(cfg.settings.discovery.alpha, 0.01);
        assert_eq!(cfg.settings.synthetic.max_iter, 10_000);
        assert_eq!(cfg.methods().unwrap(), vec![Method::DifferenceInDifferences]);
    }

    #[test]
    fn rejects_bad_values() {
        let mut cfg = PipelineConfig::default();
        cfg.methods = vec!["bogus".to_string()];
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.confidence_level = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.outcome = Variable::Seeded;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.schema_version = "0.9.0".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn malformed_window_in_toml_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "treatment_start = \"2018-Q7\"\n").unwrap();
        assert!(matches!(
            PipelineConfig::from_toml_file(&path),
            Err(SeedfireError::Toml(_))
        ));
    }
}
