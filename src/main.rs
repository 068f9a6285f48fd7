use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use seedfire::config::PipelineConfig;
use seedfire::estimators::METHOD_ORDER;
use seedfire::model::EdgeKind;
use seedfire::synth::{generate, write_demo_csvs, SynthConfig};
use seedfire::{run_pipeline, EstimatorOutput, TimeWindow, Variable};

#[derive(Debug, Parser)]
#[command(name = "seedfire")]
#[command(about = "Causal analysis of cloud seeding, precipitation, and wildfire activity")]
struct Cli {
    /// TOML run configuration; defaults to configs/default.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(long)]
    outdir: Option<PathBuf>,

    /// Comma-separated subset of did,synthetic_control,causal_discovery.
    #[arg(long)]
    methods: Option<String>,

    #[arg(long)]
    outcome: Option<Variable>,

    #[arg(long)]
    treatment: Option<Variable>,

    /// First post-treatment window: YYYY, YYYY-Qn, or YYYY-MM.
    #[arg(long)]
    treatment_start: Option<TimeWindow>,

    #[arg(long, default_value_t = false)]
    no_plots: bool,

    /// Write a synthetic demo panel into this directory and exit.
    #[arg(long)]
    generate_demo: Option<PathBuf>,

    /// Seed for --generate-demo.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default = if verbose { "seedfire=debug" } else { "seedfire=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

fn resolve_default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from("configs").join("default.toml");
    if local.exists() {
        return Some(local);
    }

    let bundled = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("configs")
        .join("default.toml");
    bundled.exists().then_some(bundled)
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let path = cli.config.clone().or_else(resolve_default_config_path);
    let mut cfg = match &path {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(dir) = &cli.data_dir {
        cfg.data_dir = dir.clone();
    }
    if let Some(dir) = &cli.outdir {
        cfg.output_dir = dir.clone();
    }
    if let Some(raw) = &cli.methods {
        let requested: Vec<String> = raw
            .split(',')
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .collect();
        if requested.is_empty() {
            bail!(
                "--methods is empty. valid methods: {}",
                METHOD_ORDER.join(",")
            );
        }
        cfg.methods = requested;
    }
    if let Some(outcome) = cli.outcome {
        cfg.outcome = outcome;
    }
    if let Some(treatment) = cli.treatment {
        cfg.treatment = treatment;
    }
    if let Some(start) = cli.treatment_start {
        cfg.treatment_start = start;
    }
    if cli.no_plots {
        cfg.render_plots = false;
    }

    cfg.validate().context("invalid run configuration")?;
    Ok(cfg)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    if let Some(dir) = &cli.generate_demo {
        let synth = SynthConfig {
            seed: cli.seed,
            ..SynthConfig::default()
        };
        let panel = generate(&synth).context("failed to generate demo panel")?;
        let paths = write_demo_csvs(dir, &panel)
            .with_context(|| format!("failed to write demo panel to {}", dir.display()))?;
        for path in paths {
            println!("{}", path.display());
        }
        println!(
            "treatment start: {} (injected fire_count effect {})",
            synth.treatment_start(),
            synth.fire_effect
        );
        return Ok(());
    }

    let cfg = load_config(&cli)?;
    let report = match run_pipeline(&cfg) {
        Ok(report) => report,
        Err(err) => {
            tracing::error!(error = %err, "pipeline failed");
            return Err(err).context("seedfire run failed");
        }
    };

    for result in &report.results {
        match result {
            EstimatorOutput::Effect(est) => println!(
                "{}: effect of {} on {} = {:.4} ({:.0}% CI {:.4} .. {:.4}; {} treated, {} control)",
                est.method,
                est.treatment,
                est.outcome,
                est.effect,
                est.interval.level * 100.0,
                est.interval.lower,
                est.interval.upper,
                est.n_treated(),
                est.n_control()
            ),
            EstimatorOutput::Graph(graph) => {
                println!(
                    "causal_discovery: {} edge(s) over {} complete rows",
                    graph.edges.len(),
                    graph.n_observations
                );
                for edge in &graph.edges {
                    let arrow = match edge.kind {
                        EdgeKind::Directed => "->",
                        EdgeKind::Undirected => "--",
                    };
                    println!("  {} {arrow} {} ({:.3})", edge.from, edge.to, edge.strength);
                }
            }
        }
    }

    println!("output: {}", report.output_dir.display());
    for path in &report.outputs {
        println!("  {}", path.display());
    }
    Ok(())
}
