//! Synthetic control.
//!
//! Each treated region gets a counterfactual built as a convex combination
//! of comparable untreated donors, fitted on the pre-period. A donor is
//! comparable when it observes every window the treated region observes and
//! its pre-period trend slope is close to the treated region's.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::estimators::panel::Panel;
use crate::estimators::stats::{mean, ols_slope, rms, z_critical};
use crate::estimators::{EstimationSpec, Method, SyntheticControlParams};
use crate::model::{
    CausalEstimate, ConfidenceInterval, DonorWeight, EstimateScope, JoinedObservation, Region,
    SeriesPoint, UnitEffect,
};
use crate::window::TimeWindow;
use crate::{Result, SeedfireError};

const METHOD: &str = "synthetic_control";

/// Donor weights below this are reported as zero.
const WEIGHT_FLOOR: f64 = 1e-6;

struct UnitFit {
    region: Region,
    effect: f64,
    pre_rmspe: f64,
    windows: Vec<TimeWindow>,
    actual: Vec<f64>,
    synthetic: Vec<f64>,
    n_post: usize,
    donors: Vec<(Region, f64)>,
}

/// Euclidean projection onto the probability simplex.
pub fn project_to_simplex(v: &DVector<f64>) -> DVector<f64> {
    let n = v.len();
    if n == 0 {
        return v.clone();
    }
    let mut sorted: Vec<f64> = v.iter().copied().collect();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (i, &u) in sorted.iter().enumerate() {
        cumulative += u;
        let candidate = (cumulative - 1.0) / (i + 1) as f64;
        if u - candidate > 0.0 {
            theta = candidate;
        }
    }
    v.map(|x| (x - theta).max(0.0))
}

/// Minimises ||y - X w||^2 over the simplex by projected gradient descent.
pub fn fit_simplex_weights(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    params: &SyntheticControlParams,
) -> DVector<f64> {
    let j = x.ncols();
    let mut w = DVector::from_element(j, 1.0 / j as f64);

    let gram = x.transpose() * x;
    let xty = x.transpose() * y;
    let lipschitz = 2.0 * gram.symmetric_eigenvalues().max();
    if !lipschitz.is_finite() || lipschitz <= 0.0 {
        return w;
    }
    let step = 1.0 / lipschitz;

    for _ in 0..params.max_iter {
        let grad = (&gram * &w - &xty) * 2.0;
        let next = project_to_simplex(&(&w - grad * step));
        let change = (&next - &w).norm();
        w = next;
        if change < params.tolerance {
            break;
        }
    }
    w
}

fn trend_slope(points: &[(TimeWindow, f64)]) -> f64 {
    let xs: Vec<f64> = points.iter().map(|(w, _)| w.ordinal() as f64).collect();
    let ys: Vec<f64> = points.iter().map(|(_, y)| *y).collect();
    ols_slope(&xs, &ys)
}

fn fit_unit(
    panel: &Panel,
    region: &Region,
    spec: &EstimationSpec,
    params: &SyntheticControlParams,
) -> Result<Option<UnitFit>> {
    let pre = panel.pre(region);
    if pre.len() < spec.min_pre_periods {
        return Err(SeedfireError::InsufficientPreperiodData {
            region: region.clone(),
            treatment_start: spec.treatment_start,
            found: pre.len(),
            required: spec.min_pre_periods,
        });
    }
    let post = panel.post(region);
    if post.is_empty() {
        warn!(region = %region, "treated region has no post-period outcome, excluded");
        return Ok(None);
    }

    let treated_slope = trend_slope(&pre);
    let allowed_gap = params.max_trend_gap * treated_slope.abs().max(1.0);

    let donors: Vec<&Region> = panel
        .controls
        .iter()
        .filter(|donor| {
            let covers = pre
                .iter()
                .chain(post.iter())
                .all(|(w, _)| panel.value(donor, *w).is_some());
            if !covers {
                return false;
            }
            let donor_pre: Vec<(TimeWindow, f64)> = pre
                .iter()
                .filter_map(|(w, _)| panel.value(donor, *w).map(|y| (*w, y)))
                .collect();
            (trend_slope(&donor_pre) - treated_slope).abs() <= allowed_gap
        })
        .collect();

    if donors.is_empty() {
        return Err(SeedfireError::NoValidDonorPool {
            region: region.clone(),
        });
    }
    debug!(region = %region, donors = donors.len(), "synthetic control donor pool");

    let column = |windows: &[(TimeWindow, f64)], donor: &Region| -> Vec<f64> {
        windows
            .iter()
            .map(|(w, _)| panel.value(donor, *w).unwrap_or(0.0))
            .collect()
    };
    let build = |windows: &[(TimeWindow, f64)]| -> DMatrix<f64> {
        let mut m = DMatrix::<f64>::zeros(windows.len(), donors.len());
        for (j, donor) in donors.iter().enumerate() {
            for (i, v) in column(windows, donor).into_iter().enumerate() {
                m[(i, j)] = v;
            }
        }
        m
    };

    let x_pre = build(&pre);
    let x_post = build(&post);
    let y_pre = DVector::from_iterator(pre.len(), pre.iter().map(|(_, y)| *y));
    let y_post = DVector::from_iterator(post.len(), post.iter().map(|(_, y)| *y));

    let weights = fit_simplex_weights(&x_pre, &y_pre, params);
    let synth_pre = &x_pre * &weights;
    let synth_post = &x_post * &weights;

    let pre_resid: Vec<f64> = (&y_pre - &synth_pre).iter().copied().collect();
    let gaps: Vec<f64> = (&y_post - &synth_post).iter().copied().collect();

    let windows: Vec<TimeWindow> = pre.iter().chain(post.iter()).map(|(w, _)| *w).collect();
    let actual: Vec<f64> = y_pre.iter().chain(y_post.iter()).copied().collect();
    let synthetic: Vec<f64> = synth_pre.iter().chain(synth_post.iter()).copied().collect();

    Ok(Some(UnitFit {
        region: region.clone(),
        effect: mean(&gaps),
        pre_rmspe: rms(&pre_resid),
        windows,
        actual,
        synthetic,
        n_post: post.len(),
        donors: donors
            .iter()
            .zip(weights.iter())
            .map(|(d, w)| ((*d).clone(), if *w < WEIGHT_FLOOR { 0.0 } else { *w }))
            .collect(),
    }))
}

pub fn estimate(
    table: &[JoinedObservation],
    spec: &EstimationSpec,
    params: &SyntheticControlParams,
) -> Result<CausalEstimate> {
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

    let mut fits = Vec::new();
    for region in &panel.treated {
        if let Some(fit) = fit_unit(&panel, region, spec, params)? {
            fits.push(fit);
        }
    }
    if fits.is_empty() {
        return Err(SeedfireError::EmptyGroup {
            method: METHOD,
            group: "treated",
            treatment_start: start,
        });
    }

    let effects: Vec<f64> = fits.iter().map(|f| f.effect).collect();
    let effect = mean(&effects);
    let pooled_rmspe = rms(&fits.iter().map(|f| f.pre_rmspe).collect::<Vec<_>>());
    let n_post: usize = fits.iter().map(|f| f.n_post).sum();
    let half_width = z_critical(spec.confidence_level) * pooled_rmspe / (n_post as f64).sqrt();

    let mut control_regions: Vec<Region> = fits
        .iter()
        .flat_map(|f| f.donors.iter().filter(|(_, w)| *w > 0.0).map(|(d, _)| d.clone()))
        .collect();
    control_regions.sort();
    control_regions.dedup();

    let first_window = fits
        .iter()
        .filter_map(|f| f.windows.first().copied())
        .min()
        .unwrap_or(start);
    let last_window = fits
        .iter()
        .filter_map(|f| f.windows.last().copied())
        .max()
        .unwrap_or(start);

    Ok(CausalEstimate {
        method: Method::SyntheticControl,
        treatment: spec.treatment,
        outcome: spec.outcome,
        effect,
        interval: ConfidenceInterval {
            level: spec.confidence_level,
            lower: effect - half_width,
            upper: effect + half_width,
        },
        scope: EstimateScope {
            treated_regions: fits.iter().map(|f| f.region.clone()).collect(),
            control_regions,
            first_window,
            last_window,
            treatment_start: start,
        },
        unit_effects: fits
            .iter()
            .map(|f| UnitEffect {
                region: f.region.clone(),
                effect: f.effect,
            })
            .collect(),
        series: averaged_series(&fits),
        donor_weights: fits
            .iter()
            .flat_map(|f| {
                f.donors.iter().map(|(donor, weight)| DonorWeight {
                    treated: f.region.clone(),
                    donor: donor.clone(),
                    weight: *weight,
                })
            })
            .collect(),
    })
}

/// Mean actual vs mean synthetic outcome per window across treated units.
fn averaged_series(fits: &[UnitFit]) -> Vec<SeriesPoint> {
    use std::collections::BTreeMap;

    let mut acc: BTreeMap<TimeWindow, (f64, f64, usize)> = BTreeMap::new();
    for fit in fits {
        for ((w, a), s) in fit.windows.iter().zip(&fit.actual).zip(&fit.synthetic) {
            let slot = acc.entry(*w).or_insert((0.0, 0.0, 0));
            slot.0 += a;
            slot.1 += s;
            slot.2 += 1;
        }
    }
    acc.into_iter()
        .map(|(window, (a, s, n))| SeriesPoint {
            window,
            treated: a / n as f64,
            counterfactual: s / n as f64,
        })
        .collect()
}
