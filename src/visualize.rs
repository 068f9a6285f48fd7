//! PNG rendering of estimates, graphs and raw metrics.
//!
//! Every plot is 1280x720. Choropleth cells come from region bounding
//! boxes when every plotted region has one, otherwise regions are laid out
//! on a square grid in sorted order.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use plotters::coord::Shift;
use plotters::drawing::DrawingAreaErrorKind;
use plotters::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{
    CausalEstimate, CausalGraph, EdgeKind, JoinedObservation, Region, RegionGeometry,
};
use crate::window::TimeWindow;
use crate::{Result, SeedfireError};

const SIZE: (u32, u32) = (1280, 720);
const MAP_WIDTH: i32 = 1120;
const NODE_RADIUS: f64 = 0.14;

impl<E: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<E>> for SeedfireError {
    fn from(err: DrawingAreaErrorKind<E>) -> Self {
        SeedfireError::Plot(err.to_string())
    }
}

/// Raw quantity shaded on a metric choropleth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoroplethMetric {
    FireCount,
    TotalAcres,
    AvgFireSize,
    Precipitation,
}

impl ChoroplethMetric {
    pub fn name(&self) -> &'static str {
        match self {
            Self::FireCount => "fire_count",
            Self::TotalAcres => "total_acres",
            Self::AvgFireSize => "avg_fire_size",
            Self::Precipitation => "precipitation",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::FireCount => "Number of fires",
            Self::TotalAcres => "Total acres burned",
            Self::AvgFireSize => "Average fire size [acres]",
            Self::Precipitation => "Mean precipitation [mm]",
        }
    }
}

impl fmt::Display for ChoroplethMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChoroplethMetric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fire_count" => Ok(Self::FireCount),
            "total_acres" | "acres" => Ok(Self::TotalAcres),
            "avg_fire_size" => Ok(Self::AvgFireSize),
            "precipitation" | "precipitation_mm" => Ok(Self::Precipitation),
            other => Err(format!(
                "unknown metric '{other}'. valid metrics: fire_count,total_acres,avg_fire_size,precipitation"
            )),
        }
    }
}

/// Aggregates one metric per region, over every window or only `window`.
/// Regions with nothing to aggregate are left out.
pub fn metric_by_region(
    table: &[JoinedObservation],
    metric: ChoroplethMetric,
    window: Option<TimeWindow>,
) -> BTreeMap<Region, f64> {
    let mut acc: BTreeMap<Region, (f64, f64)> = BTreeMap::new();
    for obs in table.iter().filter(|o| window.map_or(true, |w| o.window == w)) {
        let (num, den) = match metric {
            ChoroplethMetric::FireCount => match obs.fire_count {
                Some(c) => (c as f64, 1.0),
                None => continue,
            },
            ChoroplethMetric::TotalAcres => match obs.acres_burned {
                Some(a) => (a, 1.0),
                None => continue,
            },
            ChoroplethMetric::AvgFireSize => match (obs.acres_burned, obs.fire_count) {
                (Some(a), Some(c)) => (a, c as f64),
                _ => continue,
            },
            ChoroplethMetric::Precipitation => match obs.precipitation_mm {
                Some(p) => (p, 1.0),
                None => continue,
            },
        };
        let slot = acc.entry(obs.region.clone()).or_insert((0.0, 0.0));
        slot.0 += num;
        slot.1 += den;
    }

    acc.into_iter()
        .filter_map(|(region, (num, den))| {
            let value = match metric {
                ChoroplethMetric::FireCount | ChoroplethMetric::TotalAcres => num,
                ChoroplethMetric::AvgFireSize | ChoroplethMetric::Precipitation => {
                    if den <= 0.0 {
                        return None;
                    }
                    num / den
                }
            };
            Some((region, value))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub region: Region,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Cell {
    fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }
}

pub fn layout_cells(regions: &[Region], geometry: &[RegionGeometry]) -> Vec<Cell> {
    let by_region: HashMap<&Region, &RegionGeometry> =
        geometry.iter().map(|g| (&g.region, g)).collect();

    if !regions.is_empty() && regions.iter().all(|r| by_region.contains_key(r)) {
        return regions
            .iter()
            .filter_map(|r| by_region.get(r))
            .map(|g| Cell {
                region: g.region.clone(),
                x0: g.min_lon,
                y0: g.min_lat,
                x1: g.max_lon,
                y1: g.max_lat,
            })
            .collect();
    }
    if !geometry.is_empty() {
        debug!("region geometry incomplete, using grid layout");
    }

    let cols = (regions.len() as f64).sqrt().ceil().max(1.0) as usize;
    regions
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let col = (i % cols) as f64;
            let row = (i / cols) as f64;
            Cell {
                region: r.clone(),
                x0: col,
                y0: -row - 1.0,
                x1: col + 1.0,
                y1: -row,
            }
        })
        .collect()
}

fn lerp(a: u8, b: u8, t: f64) -> u8 {
    (a as f64 + (b as f64 - a as f64) * t.clamp(0.0, 1.0)).round() as u8
}

/// Blue for negative, white at zero, red for positive.
pub fn diverging_color(value: f64, max_abs: f64) -> RGBColor {
    if max_abs <= 0.0 || !value.is_finite() {
        return RGBColor(255, 255, 255);
    }
    let t = (value.abs() / max_abs).min(1.0);
    if value < 0.0 {
        RGBColor(lerp(255, 33, t), lerp(255, 102, t), lerp(255, 172, t))
    } else {
        RGBColor(lerp(255, 178, t), lerp(255, 24, t), lerp(255, 43, t))
    }
}

/// Pale yellow to dark red.
pub fn sequential_color(value: f64, min: f64, max: f64) -> RGBColor {
    let t = if max > min { (value - min) / (max - min) } else { 0.5 };
    RGBColor(lerp(255, 189, t), lerp(255, 0, t), lerp(204, 38, t))
}

fn padded(min: f64, max: f64) -> (f64, f64) {
    if (max - min).abs() < 1e-12 {
        (min - 1.0, max + 1.0)
    } else {
        let pad = 0.05 * (max - min);
        (min - pad, max + pad)
    }
}

fn draw_cells<F: Fn(&Region) -> RGBColor>(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    caption: &str,
    cells: &[Cell],
    color: F,
) -> Result<()> {
    if cells.is_empty() {
        return Ok(());
    }
    let (x_min, x_max) = padded(
        cells.iter().map(|c| c.x0).fold(f64::INFINITY, f64::min),
        cells.iter().map(|c| c.x1).fold(f64::NEG_INFINITY, f64::max),
    );
    let (y_min, y_max) = padded(
        cells.iter().map(|c| c.y0).fold(f64::INFINITY, f64::min),
        cells.iter().map(|c| c.y1).fold(f64::NEG_INFINITY, f64::max),
    );

    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 34).into_font())
        .margin(20)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart.draw_series(cells.iter().map(|c| {
        Rectangle::new([(c.x0, c.y0), (c.x1, c.y1)], color(&c.region).filled())
    }))?;
    chart.draw_series(
        cells
            .iter()
            .map(|c| Rectangle::new([(c.x0, c.y0), (c.x1, c.y1)], BLACK.stroke_width(1))),
    )?;
    chart.draw_series(cells.iter().map(|c| {
        Text::new(
            c.region.to_string(),
            c.center(),
            ("sans-serif", 14).into_font(),
        )
    }))?;
    Ok(())
}

fn draw_color_bar<F: Fn(f64) -> RGBColor>(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    min: f64,
    max: f64,
    color: F,
) -> Result<()> {
    let (lo, hi) = if max > min { (min, max) } else { (min - 1.0, min + 1.0) };
    let mut chart = ChartBuilder::on(area)
        .margin_top(80)
        .margin_bottom(40)
        .margin_right(10)
        .y_label_area_size(90)
        .build_cartesian_2d(0.0..1.0, lo..hi)?;
    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .disable_x_axis()
        .draw()?;

    const STEPS: usize = 64;
    let step = (hi - lo) / STEPS as f64;
    chart.draw_series((0..STEPS).map(|i| {
        let y0 = lo + i as f64 * step;
        Rectangle::new([(0.0, y0), (1.0, y0 + step)], color(y0 + step / 2.0).filled())
    }))?;
    Ok(())
}

/// Shades each treated region by its unit-level effect.
pub fn render_effect_choropleth(
    path: &Path,
    estimate: &CausalEstimate,
    geometry: &[RegionGeometry],
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let effects: BTreeMap<Region, f64> = estimate
        .unit_effects
        .iter()
        .map(|u| (u.region.clone(), u.effect))
        .collect();
    let regions: Vec<Region> = effects.keys().cloned().collect();
    let cells = layout_cells(&regions, geometry);
    let max_abs = effects
        .values()
        .map(|v| v.abs())
        .fold(0.0_f64, f64::max)
        .max(1e-9);

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let (map_area, bar_area) = root.split_horizontally(MAP_WIDTH);

    let caption = format!(
        "Effect of {} on {} ({})",
        estimate.treatment, estimate.outcome, estimate.method
    );
    draw_cells(&map_area, &caption, &cells, |r| {
        diverging_color(effects.get(r).copied().unwrap_or(0.0), max_abs)
    })?;
    draw_color_bar(&bar_area, -max_abs, max_abs, |v| diverging_color(v, max_abs))?;

    root.present()?;
    Ok(())
}

/// Shades every region by a raw metric, over all windows or one window.
pub fn render_metric_choropleth(
    path: &Path,
    table: &[JoinedObservation],
    metric: ChoroplethMetric,
    window: Option<TimeWindow>,
    geometry: &[RegionGeometry],
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let values = metric_by_region(table, metric, window);
    let regions: Vec<Region> = values.keys().cloned().collect();
    let cells = layout_cells(&regions, geometry);
    let min = values.values().copied().fold(f64::INFINITY, f64::min);
    let max = values.values().copied().fold(f64::NEG_INFINITY, f64::max);

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let (map_area, bar_area) = root.split_horizontally(MAP_WIDTH);

    let caption = match window {
        Some(w) => format!("{} ({w})", metric.label()),
        None => format!("{} (all windows)", metric.label()),
    };
    draw_cells(&map_area, &caption, &cells, |r| {
        values
            .get(r)
            .map(|v| sequential_color(*v, min, max))
            .unwrap_or(RGBColor(230, 230, 230))
    })?;
    if min.is_finite() && max.is_finite() {
        draw_color_bar(&bar_area, min, max, |v| sequential_color(v, min, max))?;
    }

    root.present()?;
    Ok(())
}

/// Treated outcome against its counterfactual, with a vertical marker at
/// the treatment start.
pub fn render_comparison(path: &Path, estimate: &CausalEstimate) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let series = &estimate.series;
    let labels: Vec<String> = series.iter().map(|p| p.window.to_string()).collect();
    let x_max = (series.len().max(2) - 1) as f64;
    let (y_min, y_max) = padded(
        series
            .iter()
            .map(|p| p.treated.min(p.counterfactual))
            .fold(f64::INFINITY, f64::min),
        series
            .iter()
            .map(|p| p.treated.max(p.counterfactual))
            .fold(f64::NEG_INFINITY, f64::max),
    );
    let (y_min, y_max) = if y_min.is_finite() && y_max.is_finite() {
        (y_min, y_max)
    } else {
        (0.0, 1.0)
    };
    let start_x = series
        .iter()
        .position(|p| p.window >= estimate.scope.treatment_start)
        .map(|i| i as f64 - 0.5);

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!(
                "{}: treated vs counterfactual {}",
                estimate.method, estimate.outcome
            ),
            ("sans-serif", 34).into_font(),
        )
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(0.0..x_max, y_min..y_max)?;

    let label_of = |x: &f64| {
        let i = x.round();
        if (x - i).abs() > 1e-6 || i < 0.0 {
            return String::new();
        }
        labels.get(i as usize).cloned().unwrap_or_default()
    };
    chart
        .configure_mesh()
        .x_labels(labels.len().clamp(2, 16))
        .x_label_formatter(&label_of)
        .x_desc("Time window")
        .y_desc(estimate.outcome.name())
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            series.iter().enumerate().map(|(i, p)| (i as f64, p.treated)),
            RED.stroke_width(2),
        ))?
        .label("Treated")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 25, y)], RED.stroke_width(3)));

    chart
        .draw_series(LineSeries::new(
            series
                .iter()
                .enumerate()
                .map(|(i, p)| (i as f64, p.counterfactual)),
            BLUE.stroke_width(2),
        ))?
        .label("Counterfactual")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 25, y)], BLUE.stroke_width(3)));

    if let Some(x) = start_x {
        chart
            .draw_series(std::iter::once(PathElement::new(
                vec![(x, y_min), (x, y_max)],
                BLACK.stroke_width(2),
            )))?
            .label("Treatment start")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 25, y)], BLACK.stroke_width(3)));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Node positions on the unit circle, starting at the top and going
/// clockwise.
pub fn circle_layout(n: usize) -> Vec<(f64, f64)> {
    (0..n)
        .map(|i| {
            let theta = std::f64::consts::FRAC_PI_2
                - 2.0 * std::f64::consts::PI * i as f64 / n.max(1) as f64;
            (theta.cos(), theta.sin())
        })
        .collect()
}

/// Segment between two node centres, trimmed to the node boundaries.
fn trimmed(from: (f64, f64), to: (f64, f64)) -> ((f64, f64), (f64, f64)) {
    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let len = (dx * dx + dy * dy).sqrt().max(1e-9);
    let (ux, uy) = (dx / len, dy / len);
    (
        (from.0 + ux * NODE_RADIUS, from.1 + uy * NODE_RADIUS),
        (to.0 - ux * NODE_RADIUS, to.1 - uy * NODE_RADIUS),
    )
}

fn arrow_head(tail: (f64, f64), tip: (f64, f64)) -> Vec<(f64, f64)> {
    const LEN: f64 = 0.08;
    const HALF_WIDTH: f64 = 0.04;
    let (dx, dy) = (tip.0 - tail.0, tip.1 - tail.1);
    let len = (dx * dx + dy * dy).sqrt().max(1e-9);
    let (ux, uy) = (dx / len, dy / len);
    let base = (tip.0 - ux * LEN, tip.1 - uy * LEN);
    vec![
        tip,
        (base.0 - uy * HALF_WIDTH, base.1 + ux * HALF_WIDTH),
        (base.0 + uy * HALF_WIDTH, base.1 - ux * HALF_WIDTH),
    ]
}

/// Variables on a circle; directed edges carry arrowheads, edge width
/// follows the marginal correlation strength.
pub fn render_graph(path: &Path, graph: &CausalGraph) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let positions = circle_layout(graph.variables.len());
    let position: HashMap<_, _> = graph
        .variables
        .iter()
        .copied()
        .zip(positions.iter().copied())
        .collect();

    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!(
                "Candidate causal graph (n = {}, alpha = {})",
                graph.n_observations, graph.alpha
            ),
            ("sans-serif", 34).into_font(),
        )
        .margin(20)
        .build_cartesian_2d(-1.8..1.8, -1.3..1.3)?;

    for edge in &graph.edges {
        let (Some(&a), Some(&b)) = (position.get(&edge.from), position.get(&edge.to)) else {
            continue;
        };
        let (tail, tip) = trimmed(a, b);
        let width = 1 + (edge.strength.clamp(0.0, 1.0) * 5.0).round() as u32;
        chart.draw_series(std::iter::once(PathElement::new(
            vec![tail, tip],
            BLACK.stroke_width(width),
        )))?;
        if edge.kind == EdgeKind::Directed {
            chart.draw_series(std::iter::once(Polygon::new(
                arrow_head(tail, tip),
                BLACK.filled(),
            )))?;
        }
    }

    chart.draw_series(positions.iter().map(|&(x, y)| {
        Circle::new((x, y), 34, RGBColor(198, 219, 239).filled())
    }))?;
    chart.draw_series(
        graph
            .variables
            .iter()
            .zip(positions.iter())
            .map(|(v, &(x, y))| {
                Text::new(
                    v.name().to_string(),
                    (x - 0.12, y),
                    ("sans-serif", 18).into_font(),
                )
            }),
    )?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::{did, EstimationSpec};
    use crate::model::{GraphEdge, Variable};
    use tempfile::TempDir;

    fn obs(region: &str, year: i32, fires: u64, acres: f64, precip: Option<f64>) -> JoinedObservation {
        let mut o = JoinedObservation::empty(Region::new(region), TimeWindow::annual(year));
        o.fire_count = Some(fires);
        o.acres_burned = Some(acres);
        o.precipitation_mm = precip;
        o
    }

    #[test]
    fn metrics_aggregate_per_region() {
        let table = vec![
            obs("CA", 2015, 10, 500.0, Some(200.0)),
            obs("CA", 2016, 30, 100.0, Some(400.0)),
            obs("NV", 2015, 0, 0.0, None),
        ];

        let counts = metric_by_region(&table, ChoroplethMetric::FireCount, None);
        assert_eq!(counts[&Region::new("CA")], 40.0);
        assert_eq!(counts[&Region::new("NV")], 0.0);

        let avg = metric_by_region(&table, ChoroplethMetric::AvgFireSize, None);
        assert!((avg[&Region::new("CA")] - 15.0).abs() < 1e-12);
        assert!(!avg.contains_key(&Region::new("NV")));

        let precip = metric_by_region(&table, ChoroplethMetric::Precipitation, None);
        assert_eq!(precip[&Region::new("CA")], 300.0);
        assert!(!precip.contains_key(&Region::new("NV")));

        let one_year =
            metric_by_region(&table, ChoroplethMetric::TotalAcres, Some(TimeWindow::annual(2016)));
        assert_eq!(one_year.len(), 1);
        assert_eq!(one_year[&Region::new("CA")], 100.0);
    }

    #[test]
    fn layout_uses_geometry_only_when_complete() {
        let regions = vec![Region::new("A"), Region::new("B"), Region::new("C")];
        let geometry = vec![RegionGeometry {
            region: Region::new("A"),
            min_lon: -120.0,
            min_lat: 35.0,
            max_lon: -119.0,
            max_lat: 36.0,
        }];

        let grid = layout_cells(&regions, &geometry);
        assert_eq!(grid.len(), 3);
        assert_eq!((grid[0].x0, grid[0].y1), (0.0, 0.0));
        assert_eq!((grid[2].x0, grid[2].y1), (0.0, -1.0));

        let geo = layout_cells(&regions[..1], &geometry);
        assert_eq!(geo[0].x0, -120.0);
        assert_eq!(geo[0].center(), (-119.5, 35.5));
    }

    #[test]
    fn diverging_scale_is_white_at_zero() {
        assert_eq!(diverging_color(0.0, 5.0), RGBColor(255, 255, 255));
        let cool = diverging_color(-5.0, 5.0);
        let warm = diverging_color(5.0, 5.0);
        assert!(cool.2 > cool.0);
        assert!(warm.0 > warm.2);
    }

    #[test]
    fn arrow_points_at_target() {
        let head = arrow_head((0.0, 0.0), (1.0, 0.0));
        assert_eq!(head[0], (1.0, 0.0));
        assert!(head[1].0 < 1.0 && head[2].0 < 1.0);
        assert!((head[1].1 + head[2].1).abs() < 1e-12);

        let nodes = circle_layout(4);
        assert!((nodes[0].1 - 1.0).abs() < 1e-12);
        assert!((nodes[1].0 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn metric_names_parse() {
        assert_eq!(
            "avg_fire_size".parse::<ChoroplethMetric>().unwrap(),
            ChoroplethMetric::AvgFireSize
        );
        assert!("rainbow".parse::<ChoroplethMetric>().is_err());
    }

    fn butte_vs_shasta() -> (Vec<JoinedObservation>, CausalEstimate) {
        let mut table = Vec::new();
        for (quarter, butte, shasta) in [(1u8, 8, 8), (2, 8, 8), (3, 2, 9)] {
            let window = TimeWindow::quarter(2018, quarter).unwrap();
            for (region, fires) in [("CA-Butte", butte), ("CA-Shasta", shasta)] {
                let mut o = JoinedObservation::empty(Region::new(region), window);
                o.seeded = Some(region == "CA-Butte" && quarter == 3);
                o.fire_count = Some(fires);
                o.acres_burned = Some(fires as f64 * 25.0);
                o.precipitation_mm = Some(12.0);
                table.push(o);
            }
        }
        let spec = EstimationSpec::new(
            Variable::Seeded,
            Variable::WildfireCount,
            TimeWindow::quarter(2018, 3).unwrap(),
        );
        let estimate = did::estimate(&table, &spec).unwrap();
        (table, estimate)
    }

    fn assert_png(path: &Path) {
        let bytes = fs::read(path).unwrap();
        assert!(bytes.len() > 8, "{} is empty", path.display());
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn renders_effect_plots() {
        let dir = TempDir::new().unwrap();
        let (table, estimate) = butte_vs_shasta();

        let map = dir.path().join("effect_map_did.png");
        render_effect_choropleth(&map, &estimate, &[]).unwrap();
        assert_png(&map);

        let comparison = dir.path().join("plots").join("comparison_did.png");
        render_comparison(&comparison, &estimate).unwrap();
        assert_png(&comparison);

        for metric in [ChoroplethMetric::FireCount, ChoroplethMetric::Precipitation] {
            let path = dir.path().join(format!("map_{metric}.png"));
            render_metric_choropleth(&path, &table, metric, None, &[]).unwrap();
            assert_png(&path);
        }
    }

    #[test]
    fn renders_metric_map_for_window_without_data() {
        let dir = TempDir::new().unwrap();
        let (table, _) = butte_vs_shasta();
        let path = dir.path().join("map_total_acres_2030-Q1.png");
        let window = TimeWindow::quarter(2030, 1);
        render_metric_choropleth(&path, &table, ChoroplethMetric::TotalAcres, window, &[]).unwrap();
        assert_png(&path);
    }

    #[test]
    fn renders_causal_graph() {
        let dir = TempDir::new().unwrap();
        let graph = CausalGraph {
            variables: vec![
                Variable::Seeded,
                Variable::PrecipitationMm,
                Variable::WildfireCount,
                Variable::AcresBurned,
            ],
            edges: vec![
                GraphEdge {
                    from: Variable::Seeded,
                    to: Variable::PrecipitationMm,
                    kind: EdgeKind::Directed,
                    strength: 0.6,
                },
                GraphEdge {
                    from: Variable::WildfireCount,
                    to: Variable::AcresBurned,
                    kind: EdgeKind::Undirected,
                    strength: 0.9,
                },
            ],
            n_observations: 48,
            alpha: 0.05,
        };
        let path = dir.path().join("causal_graph.png");
        render_graph(&path, &graph).unwrap();
        assert_png(&path);
    }
}
