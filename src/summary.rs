//! Exploration totals over the joined table: per-window fire counts,
//! acreage and precipitation, the windows with the most burned area, and
//! how much of the table each source left empty.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::model::{JoinedObservation, Region};
use crate::window::TimeWindow;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowSummary {
    pub window: TimeWindow,
    pub regions: usize,
    pub fire_count: u64,
    pub acres_burned: f64,
    pub mean_precipitation_mm: Option<f64>,
    pub seeded_regions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LargestBurn {
    pub region: Region,
    pub window: TimeWindow,
    pub acres_burned: f64,
    pub fire_count: u64,
}

/// Rows where each source contributed nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MissingCounts {
    pub precipitation: usize,
    pub seeding: usize,
    pub wildfire: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSummary {
    pub rows: usize,
    pub regions: usize,
    pub first_window: Option<TimeWindow>,
    pub last_window: Option<TimeWindow>,
    pub total_fire_count: u64,
    pub total_acres_burned: f64,
    pub per_window: Vec<WindowSummary>,
    pub largest_burns: Vec<LargestBurn>,
    pub missing: MissingCounts,
}

#[derive(Default)]
struct WindowAcc {
    regions: usize,
    fire_count: u64,
    acres_burned: f64,
    precip_sum: f64,
    precip_n: usize,
    seeded: usize,
}

/// Summarises the joined table, keeping the `top_n` region-windows with the
/// most acres burned.
pub fn summarize(table: &[JoinedObservation], top_n: usize) -> DataSummary {
    let mut by_window: BTreeMap<TimeWindow, WindowAcc> = BTreeMap::new();
    let mut regions = BTreeSet::new();
    let mut missing = MissingCounts::default();

    for obs in table {
        regions.insert(&obs.region);
        let acc = by_window.entry(obs.window).or_default();
        acc.regions += 1;
        acc.fire_count += obs.fire_count.unwrap_or(0);
        acc.acres_burned += obs.acres_burned.unwrap_or(0.0);
        if let Some(p) = obs.precipitation_mm {
            acc.precip_sum += p;
            acc.precip_n += 1;
        } else {
            missing.precipitation += 1;
        }
        match obs.seeded {
            Some(true) => acc.seeded += 1,
            Some(false) => {}
            None => missing.seeding += 1,
        }
        if obs.fire_count.is_none() && obs.acres_burned.is_none() {
            missing.wildfire += 1;
        }
    }

    let per_window: Vec<WindowSummary> = by_window
        .into_iter()
        .map(|(window, acc)| WindowSummary {
            window,
            regions: acc.regions,
            fire_count: acc.fire_count,
            acres_burned: acc.acres_burned,
            mean_precipitation_mm: (acc.precip_n > 0)
                .then(|| acc.precip_sum / acc.precip_n as f64),
            seeded_regions: acc.seeded,
        })
        .collect();

    let mut burns: Vec<LargestBurn> = table
        .iter()
        .filter_map(|obs| {
            obs.acres_burned.map(|acres| LargestBurn {
                region: obs.region.clone(),
                window: obs.window,
                acres_burned: acres,
                fire_count: obs.fire_count.unwrap_or(0),
            })
        })
        .collect();
    burns.sort_by(|a, b| {
        b.acres_burned
            .total_cmp(&a.acres_burned)
            .then_with(|| a.region.cmp(&b.region))
            .then_with(|| a.window.cmp(&b.window))
    });
    burns.truncate(top_n);

    DataSummary {
        rows: table.len(),
        regions: regions.len(),
        first_window: per_window.first().map(|w| w.window),
        last_window: per_window.last().map(|w| w.window),
        total_fire_count: per_window.iter().map(|w| w.fire_count).sum(),
        total_acres_burned: per_window.iter().map(|w| w.acres_burned).sum(),
        per_window,
        largest_burns: burns,
        missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(region: &str, year: i32, fires: Option<u64>, acres: Option<f64>) -> JoinedObservation {
        let mut o = JoinedObservation::empty(Region::new(region), TimeWindow::annual(year));
        o.fire_count = fires;
        o.acres_burned = acres;
        o
    }

    #[test]
    fn totals_per_window() {
        let mut a = obs("CA", 2015, Some(10), Some(500.0));
        a.precipitation_mm = Some(300.0);
        a.seeded = Some(true);
        let mut b = obs("NV", 2015, Some(4), Some(120.0));
        b.precipitation_mm = Some(100.0);
        b.seeded = Some(false);
        let c = obs("CA", 2016, None, None);

        let s = summarize(&[a, b, c], 5);
        assert_eq!(s.rows, 3);
        assert_eq!(s.regions, 2);
        assert_eq!(s.total_fire_count, 14);
        assert_eq!(s.per_window.len(), 2);

        let w = &s.per_window[0];
        assert_eq!(w.window, TimeWindow::annual(2015));
        assert_eq!(w.fire_count, 14);
        assert_eq!(w.mean_precipitation_mm, Some(200.0));
        assert_eq!(w.seeded_regions, 1);
        assert_eq!(s.per_window[1].mean_precipitation_mm, None);

        assert_eq!(
            s.missing,
            MissingCounts {
                precipitation: 1,
                seeding: 1,
                wildfire: 1
            }
        );
    }

    #[test]
    fn largest_burns_are_ranked() {
        let table = vec![
            obs("A", 2000, Some(1), Some(10.0)),
            obs("B", 2000, Some(1), Some(900.0)),
            obs("C", 2001, Some(2), Some(50.0)),
            obs("D", 2001, Some(2), None),
        ];
        let s = summarize(&table, 2);
        let ranked: Vec<&str> = s.largest_burns.iter().map(|b| b.region.as_str()).collect();
        assert_eq!(ranked, vec!["B", "C"]);
    }

    #[test]
    fn empty_table() {
        let s = summarize(&[], 3);
        assert_eq!(s.rows, 0);
        assert!(s.first_window.is_none());
        assert!(s.largest_burns.is_empty());
    }
}
