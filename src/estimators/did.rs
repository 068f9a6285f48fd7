//! Difference-in-differences.
//!
//! Each unit contributes Δ = mean(post outcomes) - mean(pre outcomes); the
//! estimate is mean(Δ | treated) - mean(Δ | control). The interval uses a
//! Welch standard error over the unit-level Δs.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::estimators::panel::Panel;
use crate::estimators::stats::{mean, sample_variance, t_critical, welch_df};
use crate::estimators::{EstimationSpec, Method};
use crate::model::{
    CausalEstimate, ConfidenceInterval, EstimateScope, JoinedObservation, Region, SeriesPoint,
    UnitEffect,
};
use crate::window::TimeWindow;
use crate::{Result, SeedfireError};

const METHOD: &str = "did";

struct UnitDelta {
    region: Region,
    delta: f64,
}

fn values(points: &[(TimeWindow, f64)]) -> Vec<f64> {
    points.iter().map(|(_, y)| *y).collect()
}

pub fn estimate(table: &[JoinedObservation], spec: &EstimationSpec) -> Result<CausalEstimate> {
    spec.validate()?;
    let panel = Panel::build(table, spec)?;
    let start = spec.treatment_start;

    if panel.treated.is_empty() {
        return Err(SeedfireError::EmptyGroup {
            method: METHOD,
            group: "treated",
            treatment_start: start,
        });
    }

    let mut treated = Vec::new();
    for region in &panel.treated {
        let pre = panel.pre(region);
        if pre.len() < spec.min_pre_periods {
            return Err(SeedfireError::InsufficientPreperiodData {
                region: region.clone(),
                treatment_start: start,
                found: pre.len(),
                required: spec.min_pre_periods,
            });
        }
        let post = panel.post(region);
        if post.is_empty() {
            warn!(region = %region, "treated region has no post-period outcome, excluded");
            continue;
        }
        treated.push(UnitDelta {
            region: region.clone(),
            delta: mean(&values(&post)) - mean(&values(&pre)),
        });
    }
    if treated.is_empty() {
        return Err(SeedfireError::EmptyGroup {
            method: METHOD,
            group: "treated",
            treatment_start: start,
        });
    }

    let mut controls = Vec::new();
    for region in &panel.controls {
        let pre = panel.pre(region);
        let post = panel.post(region);
        if pre.is_empty() || post.is_empty() {
            debug!(region = %region, "control region lacks pre or post outcomes, excluded");
            continue;
        }
        controls.push(UnitDelta {
            region: region.clone(),
            delta: mean(&values(&post)) - mean(&values(&pre)),
        });
    }
    if controls.is_empty() {
        return Err(SeedfireError::EmptyGroup {
            method: METHOD,
            group: "control",
            treatment_start: start,
        });
    }

    let d_t: Vec<f64> = treated.iter().map(|u| u.delta).collect();
    let d_c: Vec<f64> = controls.iter().map(|u| u.delta).collect();
    let control_mean = mean(&d_c);
    let effect = mean(&d_t) - control_mean;

    let var_t = sample_variance(&d_t);
    let var_c = sample_variance(&d_c);
    let se = (var_t / d_t.len() as f64 + var_c / d_c.len() as f64).sqrt();
    let half_width = if se > 0.0 {
        t_critical(
            spec.confidence_level,
            welch_df(var_t, d_t.len(), var_c, d_c.len()),
        ) * se
    } else {
        0.0
    };

    let treated_regions: Vec<Region> = treated.iter().map(|u| u.region.clone()).collect();
    let control_regions: Vec<Region> = controls.iter().map(|u| u.region.clone()).collect();
    let series = comparison_series(&panel, &treated_regions, &control_regions, start);

    let windows = treated_regions
        .iter()
        .chain(control_regions.iter())
        .filter_map(|r| panel.outcomes.get(r))
        .flat_map(|s| s.keys().copied());
    let first_window = windows.clone().min().unwrap_or(start);
    let last_window = windows.max().unwrap_or(start);

    Ok(CausalEstimate {
        method: Method::DifferenceInDifferences,
        treatment: spec.treatment,
        outcome: spec.outcome,
        effect,
        interval: ConfidenceInterval {
            level: spec.confidence_level,
            lower: effect - half_width,
            upper: effect + half_width,
        },
        scope: EstimateScope {
            treated_regions,
            control_regions,
            first_window,
            last_window,
            treatment_start: start,
        },
        unit_effects: treated
            .iter()
            .map(|u| UnitEffect {
                region: u.region.clone(),
                effect: u.delta - control_mean,
            })
            .collect(),
        series,
        donor_weights: Vec::new(),
    })
}

/// Treated group mean per window against the control group mean shifted by
/// the pre-period gap (the parallel-trends counterfactual).
fn comparison_series(
    panel: &Panel,
    treated: &[Region],
    controls: &[Region],
    start: TimeWindow,
) -> Vec<SeriesPoint> {
    let group_means = |regions: &[Region]| -> BTreeMap<TimeWindow, f64> {
        let mut acc: BTreeMap<TimeWindow, (f64, usize)> = BTreeMap::new();
        for region in regions {
            if let Some(series) = panel.outcomes.get(region) {
                for (w, y) in series {
                    let slot = acc.entry(*w).or_insert((0.0, 0));
                    slot.0 += y;
                    slot.1 += 1;
                }
            }
        }
        acc.into_iter()
            .map(|(w, (sum, n))| (w, sum / n as f64))
            .collect()
    };

    let t_means = group_means(treated);
    let c_means = group_means(controls);

    let pre_gaps: Vec<f64> = t_means
        .iter()
        .filter(|(w, _)| **w < start)
        .filter_map(|(w, t)| c_means.get(w).map(|c| t - c))
        .collect();
    let shift = mean(&pre_gaps);

    t_means
        .iter()
        .filter_map(|(w, t)| {
            c_means.get(w).map(|c| SeriesPoint {
                window: *w,
                treated: *t,
                counterfactual: c + shift,
            })
        })
        .collect()
}
