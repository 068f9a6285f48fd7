//! Region x window outcome panel with treated/control assignment.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::estimators::EstimationSpec;
use crate::model::{JoinedObservation, Region};
use crate::window::TimeWindow;
use crate::{Result, SeedfireError};

#[derive(Debug, Clone)]
pub struct Panel {
    /// Non-null outcomes per region, ordered by window.
    pub outcomes: BTreeMap<Region, BTreeMap<TimeWindow, f64>>,
    /// Regions whose treatment exceeds the threshold at or after the start.
    pub treated: BTreeSet<Region>,
    /// Regions never over the threshold in any window.
    pub controls: BTreeSet<Region>,
    pub treatment_start: TimeWindow,
}

impl Panel {
    /// Regions treated only before the start are neither treated nor
    /// control; they would contaminate the comparison group.
    ///
    /// Every window must share the treatment start's granularity, otherwise
    /// the pre/post split is undefined.
    pub fn build(table: &[JoinedObservation], spec: &EstimationSpec) -> Result<Self> {
        let mut outcomes: BTreeMap<Region, BTreeMap<TimeWindow, f64>> = BTreeMap::new();
        let mut treated_post = BTreeSet::new();
        let mut treated_any = BTreeSet::new();
        let mut regions = BTreeSet::new();

        for obs in table {
            if obs.window.granularity() != spec.treatment_start.granularity() {
                return Err(SeedfireError::GranularityMismatch {
                    first: spec.treatment_start,
                    other: obs.window,
                });
            }
            regions.insert(obs.region.clone());
            if let Some(y) = spec.outcome.value(obs) {
                outcomes
                    .entry(obs.region.clone())
                    .or_default()
                    .insert(obs.window, y);
            }
            if let Some(d) = spec.treatment.value(obs) {
                if d > spec.treatment_threshold {
                    treated_any.insert(obs.region.clone());
                    if obs.window >= spec.treatment_start {
                        treated_post.insert(obs.region.clone());
                    }
                }
            }
        }

        let controls: BTreeSet<Region> = regions.difference(&treated_any).cloned().collect();
        let early = treated_any.difference(&treated_post).count();
        if early > 0 {
            debug!(
                regions = early,
                "excluded regions treated only before the treatment start"
            );
        }

        Ok(Self {
            outcomes,
            treated: treated_post,
            controls,
            treatment_start: spec.treatment_start,
        })
    }

    fn split(&self, region: &Region, post: bool) -> Vec<(TimeWindow, f64)> {
        let Some(series) = self.outcomes.get(region) else {
            return Vec::new();
        };
        series
            .iter()
            .filter(|(w, _)| (**w >= self.treatment_start) == post)
            .map(|(w, y)| (*w, *y))
            .collect()
    }

    pub fn pre(&self, region: &Region) -> Vec<(TimeWindow, f64)> {
        self.split(region, false)
    }

    pub fn post(&self, region: &Region) -> Vec<(TimeWindow, f64)> {
        self.split(region, true)
    }

    pub fn value(&self, region: &Region, window: TimeWindow) -> Option<f64> {
        self.outcomes.get(region).and_then(|s| s.get(&window)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Variable;

    fn obs(region: &str, year: i32, seeded: Option<bool>, fires: Option<u64>) -> JoinedObservation {
        let mut o = JoinedObservation::empty(Region::new(region), TimeWindow::annual(year));
        o.seeded = seeded;
        o.fire_count = fires;
        o
    }

    #[test]
    fn assigns_treated_control_and_excludes_early_adopters() {
        let table = vec![
            obs("T", 2000, Some(false), Some(5)),
            obs("T", 2001, Some(true), Some(3)),
            obs("C", 2000, None, Some(5)),
            obs("C", 2001, Some(false), Some(6)),
            obs("E", 2000, Some(true), Some(4)),
            obs("E", 2001, Some(false), Some(4)),
        ];
        let spec = EstimationSpec::new(
            Variable::Seeded,
            Variable::WildfireCount,
            TimeWindow::annual(2001),
        );
        let panel = Panel::build(&table, &spec).unwrap();

        assert!(panel.treated.contains(&Region::new("T")));
        assert!(panel.controls.contains(&Region::new("C")));
        assert!(!panel.treated.contains(&Region::new("E")));
        assert!(!panel.controls.contains(&Region::new("E")));
        assert_eq!(panel.pre(&Region::new("T")), vec![(TimeWindow::annual(2000), 5.0)]);
        assert_eq!(panel.post(&Region::new("T")), vec![(TimeWindow::annual(2001), 3.0)]);
    }

    #[test]
    fn start_granularity_must_match_data() {
        let mut table = Vec::new();
        for quarter in 1..=3 {
            let window = TimeWindow::quarter(2018, quarter).unwrap();
            let mut o = JoinedObservation::empty(Region::new("CA-Butte"), window);
            o.seeded = Some(quarter == 3);
            o.fire_count = Some(4);
            table.push(o);
        }
        let spec = EstimationSpec::new(
            Variable::Seeded,
            Variable::WildfireCount,
            TimeWindow::annual(2019),
        );
        match Panel::build(&table, &spec) {
            Err(SeedfireError::GranularityMismatch { first, other }) => {
                assert_eq!(first, TimeWindow::annual(2019));
                assert_eq!(other, TimeWindow::quarter(2018, 1).unwrap());
            }
            other => panic!("expected GranularityMismatch, got {other:?}"),
        }
    }
}
