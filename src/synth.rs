//! Deterministic mock panel with a known seeding effect.
//!
//! Regions are US state codes with precipitation and fire baselines drawn
//! per climate group. Fire counts follow an additive common trend, so the
//! injected effect is what difference-in-differences should recover.

use std::fs;
use std::path::{Path, PathBuf};

use csv::Writer;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, Uniform};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{
    PrecipitationKind, PrecipitationRecord, Region, RegionGeometry, SeedingEvent, SeedingTarget,
    WildfireRecord,
};
use crate::window::TimeWindow;
use crate::{Result, SeedfireError};

/// Western states first so a small panel keeps its fire-prone treated units.
const STATES: [&str; 51] = [
    "CA", "OR", "WA", "NV", "AZ", "NM", "CO", "UT", "ID", "MT", "WY", "FL", "GA", "AL", "MS",
    "LA", "SC", "NC", "TN", "KY", "ME", "NH", "VT", "MA", "RI", "CT", "NY", "NJ", "PA", "MD",
    "DE", "OH", "MI", "IN", "IL", "WI", "MN", "IA", "MO", "ND", "SD", "NE", "KS", "AK", "HI",
    "AR", "OK", "TX", "VA", "WV", "DC",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Climate {
    West,
    Southeast,
    Northeast,
    Midwest,
    Islands,
    Other,
}

fn climate(state: &str) -> Climate {
    match state {
        "CA" | "OR" | "WA" | "NV" | "AZ" | "NM" | "CO" | "UT" | "ID" | "MT" | "WY" => {
            Climate::West
        }
        "FL" | "GA" | "AL" | "MS" | "LA" | "SC" | "NC" | "TN" | "KY" => Climate::Southeast,
        "ME" | "NH" | "VT" | "MA" | "RI" | "CT" | "NY" | "NJ" | "PA" | "MD" | "DE" => {
            Climate::Northeast
        }
        "OH" | "MI" | "IN" | "IL" | "WI" | "MN" | "IA" | "MO" | "ND" | "SD" | "NE" | "KS" => {
            Climate::Midwest
        }
        "AK" | "HI" => Climate::Islands,
        _ => Climate::Other,
    }
}

/// (mean, sd) of annual precipitation in mm.
fn precipitation_baseline(c: Climate) -> (f64, f64) {
    match c {
        Climate::West => (600.0, 120.0),
        Climate::Southeast => (1300.0, 200.0),
        Climate::Northeast => (1100.0, 200.0),
        Climate::Midwest => (900.0, 180.0),
        Climate::Islands => (1500.0, 300.0),
        Climate::Other => (800.0, 200.0),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub seed: u64,
    pub n_regions: usize,
    /// The first `n_treated` regions are seeded from `treatment_year` on.
    pub n_treated: usize,
    pub first_year: i32,
    pub n_years: usize,
    pub treatment_year: i32,
    /// Additive change in annual fire count for seeded region-years.
    pub fire_effect: f64,
    /// Relative precipitation uplift for seeded region-years.
    pub precipitation_uplift: f64,
    /// Common increase in fires per year for every region.
    pub fire_trend_per_year: f64,
    pub fire_noise_sd: f64,
    pub mean_fire_size_acres: f64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            n_regions: 24,
            n_treated: 8,
            first_year: 2000,
            n_years: 16,
            treatment_year: 2010,
            fire_effect: -6.0,
            precipitation_uplift: 0.08,
            fire_trend_per_year: 1.5,
            fire_noise_sd: 1.0,
            mean_fire_size_acres: 40.0,
        }
    }
}

impl SynthConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_regions < 2 || self.n_regions > STATES.len() {
            return Err(SeedfireError::InvalidConfig(format!(
                "n_regions must be in 2..={}",
                STATES.len()
            )));
        }
        if self.n_treated == 0 || self.n_treated >= self.n_regions {
            return Err(SeedfireError::InvalidConfig(
                "n_treated must be in 1..n_regions".to_string(),
            ));
        }
        let last_year = self.first_year + self.n_years as i32 - 1;
        if self.treatment_year <= self.first_year || self.treatment_year > last_year {
            return Err(SeedfireError::InvalidConfig(format!(
                "treatment_year must fall in ({}, {last_year}]",
                self.first_year
            )));
        }
        if !(self.fire_noise_sd >= 0.0) || !(self.mean_fire_size_acres > 0.0) {
            return Err(SeedfireError::InvalidConfig(
                "fire_noise_sd must be >= 0 and mean_fire_size_acres > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn treatment_start(&self) -> TimeWindow {
        TimeWindow::annual(self.treatment_year)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticPanel {
    pub precipitation: Vec<PrecipitationRecord>,
    pub seeding: Vec<SeedingEvent>,
    pub wildfires: Vec<WildfireRecord>,
    pub geometry: Vec<RegionGeometry>,
}

/// Cell on a coarse lon/lat lattice over the continental US.
fn grid_cell(region: Region, i: usize) -> RegionGeometry {
    const COLS: usize = 8;
    const SIZE_DEG: f64 = 3.0;
    let min_lon = -124.0 + (i % COLS) as f64 * SIZE_DEG;
    let min_lat = 48.0 - (i / COLS + 1) as f64 * SIZE_DEG;
    RegionGeometry {
        region,
        min_lon,
        min_lat,
        max_lon: min_lon + SIZE_DEG,
        max_lat: min_lat + SIZE_DEG,
    }
}

pub fn generate(cfg: &SynthConfig) -> Result<SyntheticPanel> {
    cfg.validate()?;
    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
    let unit_noise = Normal::new(0.0, 1.0).map_err(|e| SeedfireError::InvalidConfig(e.to_string()))?;
    let fire_noise = Normal::new(0.0, cfg.fire_noise_sd)
        .map_err(|e| SeedfireError::InvalidConfig(e.to_string()))?;
    let fire_base = Uniform::new(20.0, 60.0);

    let mut panel = SyntheticPanel {
        precipitation: Vec::new(),
        seeding: Vec::new(),
        wildfires: Vec::new(),
        geometry: Vec::new(),
    };

    for (i, state) in STATES.iter().take(cfg.n_regions).enumerate() {
        let region = Region::new(*state);
        let treated_unit = i < cfg.n_treated;
        let (precip_mean, precip_sd) = precipitation_baseline(climate(state));
        let base_precip = (precip_mean + precip_sd * unit_noise.sample(&mut rng)).max(50.0);
        let base_fires: f64 = fire_base.sample(&mut rng);
        panel.geometry.push(grid_cell(region.clone(), i));

        for offset in 0..cfg.n_years {
            let year = cfg.first_year + offset as i32;
            let window = TimeWindow::annual(year);
            let seeded = treated_unit && year >= cfg.treatment_year;

            let mut precip = base_precip * (1.0 + 0.08 * unit_noise.sample(&mut rng));
            if seeded {
                precip *= 1.0 + cfg.precipitation_uplift;
            }
            panel.precipitation.push(PrecipitationRecord {
                region: region.clone(),
                window,
                precipitation_mm: precip.max(0.0),
                kind: if rng.gen_bool(0.5) {
                    PrecipitationKind::Snowpack
                } else {
                    PrecipitationKind::Rainfall
                },
            });

            panel.seeding.push(SeedingEvent {
                region: region.clone(),
                window,
                seeded,
                target: seeded.then_some(SeedingTarget::Cold),
            });

            let mut fires = base_fires
                + cfg.fire_trend_per_year * offset as f64
                + fire_noise.sample(&mut rng);
            if seeded {
                fires += cfg.fire_effect;
            }
            let fire_count = fires.round().max(0.0) as u64;
            let size = cfg.mean_fire_size_acres * (1.0 + 0.2 * unit_noise.sample(&mut rng));
            panel.wildfires.push(WildfireRecord {
                region: region.clone(),
                window,
                fire_count,
                acres_burned: fire_count as f64 * size.max(1.0),
            });
        }
    }

    info!(
        regions = cfg.n_regions,
        treated = cfg.n_treated,
        years = cfg.n_years,
        seed = cfg.seed,
        "generated synthetic panel"
    );
    Ok(panel)
}

fn fmt_f64(v: f64) -> String {
    format!("{v:.10}")
}

/// Writes the panel as the four source files the loader reads and returns
/// their paths.
pub fn write_demo_csvs(dir: &Path, panel: &SyntheticPanel) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let wildfire_path = dir.join("wildfires.csv");
    let mut wtr = Writer::from_path(&wildfire_path)?;
    wtr.write_record(["region", "time_window", "fire_count", "acres_burned"])?;
    for r in &panel.wildfires {
        wtr.write_record([
            r.region.as_str(),
            &r.window.to_string(),
            &r.fire_count.to_string(),
            &fmt_f64(r.acres_burned),
        ])?;
    }
    wtr.flush()?;

    let precipitation_path = dir.join("precipitation.csv");
    let mut wtr = Writer::from_path(&precipitation_path)?;
    wtr.write_record(["region", "time_window", "precipitation_mm", "precipitation_type"])?;
    for r in &panel.precipitation {
        wtr.write_record([
            r.region.as_str(),
            &r.window.to_string(),
            &fmt_f64(r.precipitation_mm),
            r.kind.as_str(),
        ])?;
    }
    wtr.flush()?;

    let seeding_path = dir.join("seeding.csv");
    let mut wtr = Writer::from_path(&seeding_path)?;
    wtr.write_record(["region", "time_window", "seeded", "target"])?;
    for r in &panel.seeding {
        wtr.write_record([
            r.region.as_str(),
            &r.window.to_string(),
            if r.seeded { "true" } else { "false" },
            r.target.map(|t| t.as_str()).unwrap_or(""),
        ])?;
    }
    wtr.flush()?;

    let regions_path = dir.join("regions.csv");
    let mut wtr = Writer::from_path(&regions_path)?;
    wtr.write_record(["region", "min_lon", "min_lat", "max_lon", "max_lat"])?;
    for g in &panel.geometry {
        wtr.write_record([
            g.region.as_str(),
            &fmt_f64(g.min_lon),
            &fmt_f64(g.min_lat),
            &fmt_f64(g.max_lon),
            &fmt_f64(g.max_lat),
        ])?;
    }
    wtr.flush()?;

    Ok(vec![
        wildfire_path,
        precipitation_path,
        seeding_path,
        regions_path,
    ])
}
