//! One batch run: load, join, summarise, estimate, then write tables,
//! manifest and plots into a fresh timestamped directory.
//!
//! Every stage error aborts the run. Nothing is written until all
//! estimators have succeeded.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::estimators::{EstimatorOutput, Method};
use crate::io::{
    create_timestamped_output_dir, write_estimates_csv, write_graph_edges_csv, write_joined_csv,
    write_manifest_json, write_summary_csv, write_unit_effects_csv, Manifest,
    OUTPUT_SCHEMA_VERSION,
};
use crate::join::outer_join;
use crate::loader::{load_precipitation, load_regions, load_seeding, load_wildfires};
use crate::model::{
    CausalEstimate, CausalGraph, JoinedObservation, PrecipitationRecord, RegionGeometry,
    SeedingEvent, WildfireRecord,
};
use crate::summary::{summarize, DataSummary};
use crate::visualize::{
    render_comparison, render_effect_choropleth, render_graph, render_metric_choropleth,
};
use crate::Result;

const LARGEST_BURNS: usize = 10;

#[derive(Debug, Clone)]
pub struct Sources {
    pub precipitation: Vec<PrecipitationRecord>,
    pub seeding: Vec<SeedingEvent>,
    pub wildfires: Vec<WildfireRecord>,
    pub geometry: Vec<RegionGeometry>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub output_dir: PathBuf,
    pub rows: usize,
    pub summary: DataSummary,
    pub results: Vec<EstimatorOutput>,
    pub outputs: Vec<PathBuf>,
}

pub fn load_sources(cfg: &PipelineConfig) -> Result<Sources> {
    let wildfires = load_wildfires(&cfg.wildfire_path(), &cfg.load_options())?;
    let precipitation = load_precipitation(&cfg.precipitation_path())?;
    let seeding = load_seeding(&cfg.seeding_path())?;
    let geometry = match cfg.regions_path() {
        Some(path) if path.exists() => load_regions(&path)?,
        Some(path) => {
            warn!(path = %path.display(), "regions file not found, using grid layout");
            Vec::new()
        }
        None => Vec::new(),
    };
    info!(
        wildfires = wildfires.len(),
        precipitation = precipitation.len(),
        seeding = seeding.len(),
        regions = geometry.len(),
        "loaded sources"
    );
    Ok(Sources {
        precipitation,
        seeding,
        wildfires,
        geometry,
    })
}

/// Runs every configured estimator over the joined table, in canonical
/// method order.
pub fn estimate_all(
    cfg: &PipelineConfig,
    table: &[JoinedObservation],
) -> Result<Vec<EstimatorOutput>> {
    let spec = cfg.estimation_spec();
    let mut results = Vec::new();
    for method in cfg.methods()? {
        let output = method.estimate(table, &spec, &cfg.settings)?;
        match &output {
            EstimatorOutput::Effect(est) => info!(
                method = method.name(),
                effect = est.effect,
                lower = est.interval.lower,
                upper = est.interval.upper,
                treated = est.n_treated(),
                control = est.n_control(),
                "estimate"
            ),
            EstimatorOutput::Graph(graph) => info!(
                method = method.name(),
                edges = graph.edges.len(),
                observations = graph.n_observations,
                "graph"
            ),
        }
        results.push(output);
    }
    Ok(results)
}

fn render_plots(
    outdir: &Path,
    cfg: &PipelineConfig,
    table: &[JoinedObservation],
    geometry: &[RegionGeometry],
    effects: &[&CausalEstimate],
    graphs: &[&CausalGraph],
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    for est in effects {
        let path = outdir.join(format!("effect_map_{}.png", est.method));
        render_effect_choropleth(&path, est, geometry)?;
        written.push(path);

        if est.series.is_empty() {
            warn!(method = est.method.name(), "no comparison series to plot");
        } else {
            let path = outdir.join(format!("comparison_{}.png", est.method));
            render_comparison(&path, est)?;
            written.push(path);
        }
    }

    for graph in graphs {
        let path = outdir.join("causal_graph.png");
        render_graph(&path, graph)?;
        written.push(path);
    }

    for metric in &cfg.choropleth_metrics {
        let path = match cfg.choropleth_window {
            Some(window) => outdir.join(format!("map_{metric}_{window}.png")),
            None => outdir.join(format!("map_{metric}.png")),
        };
        render_metric_choropleth(&path, table, *metric, cfg.choropleth_window, geometry)?;
        written.push(path);
    }

    Ok(written)
}

pub fn run_pipeline(cfg: &PipelineConfig) -> Result<RunReport> {
    cfg.validate()?;

    let sources = load_sources(cfg)?;
    let table = outer_join(&sources.precipitation, &sources.seeding, &sources.wildfires)?;
    info!(rows = table.len(), "joined sources");

    let summary = summarize(&table, LARGEST_BURNS);
    if summary.missing.precipitation + summary.missing.seeding + summary.missing.wildfire > 0 {
        info!(
            missing_precipitation = summary.missing.precipitation,
            missing_seeding = summary.missing.seeding,
            missing_wildfire = summary.missing.wildfire,
            "joined table has gaps"
        );
    }

    let results = estimate_all(cfg, &table)?;
    let effects: Vec<&CausalEstimate> = results.iter().filter_map(|r| r.as_effect()).collect();
    let graphs: Vec<&CausalGraph> = results.iter().filter_map(|r| r.as_graph()).collect();

    let outdir = create_timestamped_output_dir(&cfg.output_dir)?;
    let mut outputs = Vec::new();

    let path = outdir.join("joined.csv");
    write_joined_csv(&path, &table)?;
    outputs.push(path);

    let path = outdir.join("summary.csv");
    write_summary_csv(&path, &summary)?;
    outputs.push(path);

    if !effects.is_empty() {
        let path = outdir.join("estimates.csv");
        write_estimates_csv(&path, &effects)?;
        outputs.push(path);

        let path = outdir.join("unit_effects.csv");
        write_unit_effects_csv(&path, &effects)?;
        outputs.push(path);
    }

    if !graphs.is_empty() {
        let path = outdir.join("graph_edges.csv");
        write_graph_edges_csv(&path, &graphs)?;
        outputs.push(path);
    }

    if cfg.render_plots {
        outputs.extend(render_plots(
            &outdir,
            cfg,
            &table,
            &sources.geometry,
            &effects,
            &graphs,
        )?);
    }

    let manifest = Manifest {
        schema_version: OUTPUT_SCHEMA_VERSION.to_string(),
        crate_version: env!("CARGO_PKG_VERSION").to_string(),
        created_utc: Utc::now().to_rfc3339(),
        config: cfg.clone(),
        methods: results
            .iter()
            .map(|r| match r {
                EstimatorOutput::Effect(e) => e.method.name().to_string(),
                EstimatorOutput::Graph(_) => Method::CausalDiscovery.name().to_string(),
            })
            .collect(),
        summary: summary.clone(),
        results: results.clone(),
        files: outputs
            .iter()
            .filter_map(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect(),
    };
    outputs.push(write_manifest_json(&outdir, &manifest)?);

    info!(dir = %outdir.display(), files = outputs.len(), "run complete");
    Ok(RunReport {
        output_dir: outdir,
        rows: table.len(),
        summary,
        results,
        outputs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{generate, write_demo_csvs, SynthConfig};
    use crate::window::TimeWindow;
    use crate::SeedfireError;
    use std::fs;
    use tempfile::TempDir;

    fn demo_config(root: &Path) -> PipelineConfig {
        let synth = SynthConfig::default();
        let panel = generate(&synth).unwrap();
        write_demo_csvs(&root.join("data"), &panel).unwrap();

        PipelineConfig {
            data_dir: root.join("data"),
            regions_file: Some("regions.csv".to_string()),
            output_dir: root.join("out"),
            treatment_start: synth.treatment_start(),
            render_plots: false,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn end_to_end_on_demo_panel() {
        let dir = TempDir::new().unwrap();
        let cfg = demo_config(dir.path());

        let report = run_pipeline(&cfg).unwrap();
        let synth = SynthConfig::default();
        assert_eq!(report.rows, synth.n_regions * synth.n_years);
        assert_eq!(report.results.len(), 3);

        let did = report.results[0].as_effect().unwrap();
        assert_eq!(did.method, Method::DifferenceInDifferences);
        assert!((did.effect - synth.fire_effect).abs() < 1.0);
        let sc = report.results[1].as_effect().unwrap();
        assert_eq!(sc.method, Method::SyntheticControl);
        assert!(sc.effect < 0.0);
        assert!(report.results[2].as_graph().is_some());

        for name in [
            "joined.csv",
            "summary.csv",
            "estimates.csv",
            "unit_effects.csv",
            "graph_edges.csv",
            "manifest.json",
        ] {
            assert!(report.output_dir.join(name).is_file(), "missing {name}");
        }
        let manifest = fs::read_to_string(report.output_dir.join("manifest.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&manifest).unwrap();
        assert_eq!(json["schema_version"], OUTPUT_SCHEMA_VERSION);
        assert_eq!(json["results"][0]["kind"], "effect");
        assert_eq!(json["results"][2]["kind"], "graph");
    }

    #[test]
    fn end_to_end_with_plots() {
        let dir = TempDir::new().unwrap();
        let cfg = PipelineConfig {
            render_plots: true,
            choropleth_window: Some(TimeWindow::annual(2012)),
            ..demo_config(dir.path())
        };

        let report = run_pipeline(&cfg).unwrap();
        for name in [
            "effect_map_did.png",
            "comparison_did.png",
            "effect_map_synthetic_control.png",
            "comparison_synthetic_control.png",
            "causal_graph.png",
            "map_total_acres_2012.png",
            "map_fire_count_2012.png",
        ] {
            let path = report.output_dir.join(name);
            assert!(path.is_file(), "missing {name}");
            assert!(report.outputs.contains(&path));
        }
    }

    #[test]
    fn quarterly_start_over_annual_data_is_rejected() {
        let dir = TempDir::new().unwrap();
        let cfg = PipelineConfig {
            treatment_start: TimeWindow::quarter(2010, 1).unwrap(),
            ..demo_config(dir.path())
        };
        assert!(matches!(
            run_pipeline(&cfg),
            Err(SeedfireError::GranularityMismatch { .. })
        ));
        assert!(!cfg.output_dir.exists());
    }

    #[test]
    fn malformed_source_aborts_before_writing() {
        let dir = TempDir::new().unwrap();
        let cfg = demo_config(dir.path());
        fs::write(
            cfg.precipitation_path(),
            "region,time_window,precipitation_mm\nCA,2001,12.5\nNV,2001,lots\n",
        )
        .unwrap();

        match run_pipeline(&cfg) {
            Err(SeedfireError::MalformedRecord { path, line, .. }) => {
                assert_eq!(path, cfg.precipitation_path());
                assert_eq!(line, 3);
            }
            other => panic!("expected MalformedRecord, got {other:?}"),
        }
        assert!(!cfg.output_dir.exists());
    }

    #[test]
    fn only_requested_methods_run() {
        let dir = TempDir::new().unwrap();
        let cfg = PipelineConfig {
            methods: vec!["causal_discovery".to_string()],
            ..demo_config(dir.path())
        };
        let report = run_pipeline(&cfg).unwrap();
        assert_eq!(report.results.len(), 1);
        assert!(!report.output_dir.join("estimates.csv").exists());
        assert!(report.output_dir.join("graph_edges.csv").is_file());
    }
}
