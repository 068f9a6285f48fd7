use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use csv::WriterBuilder;
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::estimators::EstimatorOutput;
use crate::model::{CausalEstimate, CausalGraph, EdgeKind, JoinedObservation};
use crate::summary::DataSummary;
use crate::Result;

pub const OUTPUT_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub schema_version: String,
    pub crate_version: String,
    pub created_utc: String,
    pub config: PipelineConfig,
    pub methods: Vec<String>,
    pub summary: DataSummary,
    pub results: Vec<EstimatorOutput>,
    pub files: Vec<String>,
}

fn fmt_f64(v: f64) -> String {
    format!("{v:.10}")
}

fn fmt_opt(v: Option<f64>) -> String {
    match v {
        Some(x) => fmt_f64(x),
        None => "NA".to_string(),
    }
}

fn fmt_opt_str(v: Option<&str>) -> String {
    v.map(str::to_string).unwrap_or_else(|| "NA".to_string())
}

pub fn ensure_outdir(outdir: &Path) -> Result<()> {
    fs::create_dir_all(outdir)?;
    Ok(())
}

/// Creates `<root>/<UTC stamp>`, adding a counter suffix when a run with
/// the same stamp already exists.
pub fn create_timestamped_output_dir(root: &Path) -> Result<PathBuf> {
    ensure_outdir(root)?;

    let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let mut output_dir = root.join(&timestamp);
    let mut counter = 1_u32;

    while output_dir.exists() {
        output_dir = root.join(format!("{timestamp}-{counter:02}"));
        counter += 1;
    }

    fs::create_dir_all(&output_dir)?;
    Ok(output_dir)
}

pub fn write_joined_csv(path: &Path, table: &[JoinedObservation]) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_path(path)?;

    wtr.write_record([
        "region",
        "time_window",
        "precipitation_mm",
        "precipitation_type",
        "seeded",
        "seeding_target",
        "fire_count",
        "acres_burned",
    ])?;

    for row in table {
        wtr.write_record([
            row.region.as_str(),
            &row.window.to_string(),
            &fmt_opt(row.precipitation_mm),
            &fmt_opt_str(row.precipitation_kind.as_ref().map(|k| k.as_str())),
            &fmt_opt_str(row.seeded.map(|s| if s { "true" } else { "false" })),
            &fmt_opt_str(row.seeding_target.as_ref().map(|t| t.as_str())),
            &row
                .fire_count
                .map(|c| c.to_string())
                .unwrap_or_else(|| "NA".to_string()),
            &fmt_opt(row.acres_burned),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_estimates_csv(path: &Path, estimates: &[&CausalEstimate]) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_path(path)?;

    wtr.write_record([
        "method",
        "treatment",
        "outcome",
        "effect",
        "ci_level",
        "ci_lower",
        "ci_upper",
        "n_treated",
        "n_control",
        "first_window",
        "last_window",
        "treatment_start",
        "schema_version",
    ])?;

    for est in estimates {
        wtr.write_record([
            est.method.name(),
            est.treatment.name(),
            est.outcome.name(),
            &fmt_f64(est.effect),
            &fmt_f64(est.interval.level),
            &fmt_f64(est.interval.lower),
            &fmt_f64(est.interval.upper),
            &est.n_treated().to_string(),
            &est.n_control().to_string(),
            &est.scope.first_window.to_string(),
            &est.scope.last_window.to_string(),
            &est.scope.treatment_start.to_string(),
            OUTPUT_SCHEMA_VERSION,
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

/// One row per treated region and method. Synthetic-control rows also list
/// that region's donors as `donor:weight` pairs.
pub fn write_unit_effects_csv(path: &Path, estimates: &[&CausalEstimate]) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_path(path)?;

    wtr.write_record(["method", "region", "effect", "donors", "schema_version"])?;

    for est in estimates {
        for unit in &est.unit_effects {
            let donors: Vec<String> = est
                .donor_weights
                .iter()
                .filter(|w| w.treated == unit.region)
                .map(|w| format!("{}:{:.6}", w.donor, w.weight))
                .collect();
            let donors = if donors.is_empty() {
                "NA".to_string()
            } else {
                donors.join(";")
            };
            wtr.write_record([
                est.method.name(),
                unit.region.as_str(),
                &fmt_f64(unit.effect),
                &donors,
                OUTPUT_SCHEMA_VERSION,
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_graph_edges_csv(path: &Path, graphs: &[&CausalGraph]) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_path(path)?;

    wtr.write_record([
        "from",
        "to",
        "kind",
        "strength",
        "n_observations",
        "alpha",
        "schema_version",
    ])?;

    for graph in graphs {
        for edge in &graph.edges {
            wtr.write_record([
                edge.from.name(),
                edge.to.name(),
                match edge.kind {
                    EdgeKind::Directed => "directed",
                    EdgeKind::Undirected => "undirected",
                },
                &fmt_f64(edge.strength),
                &graph.n_observations.to_string(),
                &fmt_f64(graph.alpha),
                OUTPUT_SCHEMA_VERSION,
            ])?;
        }
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_summary_csv(path: &Path, summary: &DataSummary) -> Result<()> {
    let mut wtr = WriterBuilder::new().has_headers(false).from_path(path)?;

    wtr.write_record([
        "time_window",
        "regions",
        "fire_count",
        "acres_burned",
        "mean_precipitation_mm",
        "seeded_regions",
        "schema_version",
    ])?;

    for row in &summary.per_window {
        wtr.write_record([
            &row.window.to_string(),
            &row.regions.to_string(),
            &row.fire_count.to_string(),
            &fmt_f64(row.acres_burned),
            &fmt_opt(row.mean_precipitation_mm),
            &row.seeded_regions.to_string(),
            OUTPUT_SCHEMA_VERSION,
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn write_manifest_json(outdir: &Path, manifest: &Manifest) -> Result<PathBuf> {
    let path = outdir.join("manifest.json");
    let payload = serde_json::to_string_pretty(manifest)?;
    fs::write(&path, payload)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::Method;
    use crate::model::{
        ConfidenceInterval, DonorWeight, EstimateScope, GraphEdge, Region, UnitEffect, Variable,
    };
    use crate::window::TimeWindow;
    use tempfile::TempDir;

    fn estimate() -> CausalEstimate {
        CausalEstimate {
            method: Method::SyntheticControl,
            treatment: Variable::Seeded,
            outcome: Variable::WildfireCount,
            effect: -4.0,
            interval: ConfidenceInterval {
                level: 0.95,
                lower: -5.0,
                upper: -3.0,
            },
            scope: EstimateScope {
                treated_regions: vec![Region::new("CA")],
                control_regions: vec![Region::new("NV"), Region::new("OR")],
                first_window: TimeWindow::annual(2000),
                last_window: TimeWindow::annual(2005),
                treatment_start: TimeWindow::annual(2003),
            },
            unit_effects: vec![UnitEffect {
                region: Region::new("CA"),
                effect: -4.0,
            }],
            series: Vec::new(),
            donor_weights: vec![
                DonorWeight {
                    treated: Region::new("CA"),
                    donor: Region::new("NV"),
                    weight: 0.25,
                },
                DonorWeight {
                    treated: Region::new("CA"),
                    donor: Region::new("OR"),
                    weight: 0.75,
                },
            ],
        }
    }

    #[test]
    fn joined_csv_marks_missing_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("joined.csv");
        let mut row = JoinedObservation::empty(Region::new("CA-Butte"), TimeWindow::annual(2018));
        row.fire_count = Some(3);
        write_joined_csv(&path, &[row]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("region,time_window,precipitation_mm"));
        assert_eq!(lines[1], "CA-Butte,2018,NA,NA,NA,NA,3,NA");
    }

    #[test]
    fn estimate_tables_have_expected_rows() {
        let dir = TempDir::new().unwrap();
        let est = estimate();

        let path = dir.path().join("estimates.csv");
        write_estimates_csv(&path, &[&est]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text
            .lines()
            .nth(1)
            .unwrap()
            .starts_with("synthetic_control,seeded,wildfire_count,-4.0000000000"));

        let path = dir.path().join("unit_effects.csv");
        write_unit_effects_csv(&path, &[&est]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("NV:0.250000;OR:0.750000"));
    }

    #[test]
    fn graph_edges_csv_lists_kinds() {
        let dir = TempDir::new().unwrap();
        let graph = CausalGraph {
            variables: vec![Variable::PrecipitationMm, Variable::WildfireCount],
            edges: vec![GraphEdge {
                from: Variable::PrecipitationMm,
                to: Variable::WildfireCount,
                kind: EdgeKind::Directed,
                strength: 0.5,
            }],
            n_observations: 40,
            alpha: 0.05,
        };
        let path = dir.path().join("graph_edges.csv");
        write_graph_edges_csv(&path, &[&graph]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("precipitation_mm,wildfire_count,directed,0.5000000000,40"));
    }

    #[test]
    fn timestamped_dirs_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let a = create_timestamped_output_dir(dir.path()).unwrap();
        let b = create_timestamped_output_dir(dir.path()).unwrap();
        assert_ne!(a, b);
        assert!(a.is_dir() && b.is_dir());
    }
}
