//! Spatiotemporal joiner.
//!
//! Produces the full outer join of the three sources on (region, window).
//! Duplicate keys inside a source are aggregated, never first-wins:
//!
//! | field              | duplicate policy                   |
//! |--------------------|------------------------------------|
//! | precipitation_mm   | sum                                |
//! | precipitation_kind | equal kinds kept, otherwise Mixed  |
//! | seeded             | logical OR                         |
//! | seeding_target     | equal targets kept, otherwise Both |
//! | fire_count         | sum                                |
//! | acres_burned       | sum                                |

use std::collections::BTreeMap;

use tracing::debug;

use crate::model::{
    JoinedObservation, PrecipitationRecord, Region, SeedingEvent, SeedingTarget, WildfireRecord,
};
use crate::window::TimeWindow;
use crate::{Result, SeedfireError};

type Key = (Region, TimeWindow);

fn merge_target(a: Option<SeedingTarget>, b: Option<SeedingTarget>) -> Option<SeedingTarget> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.merge(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// Rejects inputs whose windows do not all share one granularity, since
/// pre/post partitions are meaningless across them.
fn check_granularity<'a>(windows: impl Iterator<Item = &'a TimeWindow>) -> Result<()> {
    let mut first: Option<TimeWindow> = None;
    for window in windows {
        match first {
            None => first = Some(*window),
            Some(f) if f.granularity() != window.granularity() => {
                return Err(SeedfireError::GranularityMismatch {
                    first: f,
                    other: *window,
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Outer-joins the three sources. The result has exactly one row per
/// distinct (region, window) key, sorted by region then window.
pub fn outer_join(
    precipitation: &[PrecipitationRecord],
    seeding: &[SeedingEvent],
    wildfires: &[WildfireRecord],
) -> Result<Vec<JoinedObservation>> {
    check_granularity(
        precipitation
            .iter()
            .map(|r| &r.window)
            .chain(seeding.iter().map(|r| &r.window))
            .chain(wildfires.iter().map(|r| &r.window)),
    )?;

    let mut table: BTreeMap<Key, JoinedObservation> = BTreeMap::new();
    let mut duplicates = 0usize;

    fn slot<'t>(
        table: &'t mut BTreeMap<Key, JoinedObservation>,
        region: &Region,
        window: TimeWindow,
    ) -> &'t mut JoinedObservation {
        table
            .entry((region.clone(), window))
            .or_insert_with(|| JoinedObservation::empty(region.clone(), window))
    }

    for record in precipitation {
        let obs = slot(&mut table, &record.region, record.window);
        match (obs.precipitation_mm, obs.precipitation_kind) {
            (Some(total), Some(kind)) => {
                duplicates += 1;
                obs.precipitation_mm = Some(total + record.precipitation_mm);
                obs.precipitation_kind = Some(kind.merge(record.kind));
            }
            _ => {
                obs.precipitation_mm = Some(record.precipitation_mm);
                obs.precipitation_kind = Some(record.kind);
            }
        }
    }

    for event in seeding {
        let obs = slot(&mut table, &event.region, event.window);
        match obs.seeded {
            Some(seeded) => {
                duplicates += 1;
                obs.seeded = Some(seeded || event.seeded);
                obs.seeding_target = merge_target(obs.seeding_target, event.target);
            }
            None => {
                obs.seeded = Some(event.seeded);
                obs.seeding_target = event.target;
            }
        }
    }

    for record in wildfires {
        let obs = slot(&mut table, &record.region, record.window);
        match (obs.fire_count, obs.acres_burned) {
            (Some(count), Some(acres)) => {
                duplicates += 1;
                obs.fire_count = Some(count + record.fire_count);
                obs.acres_burned = Some(acres + record.acres_burned);
            }
            _ => {
                obs.fire_count = Some(record.fire_count);
                obs.acres_burned = Some(record.acres_burned);
            }
        }
    }

    debug!(
        rows = table.len(),
        aggregated_duplicates = duplicates,
        "joined sources"
    );
    Ok(table.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PrecipitationKind;
    use std::collections::BTreeSet;

    fn q(year: i32, quarter: u8) -> TimeWindow {
        TimeWindow::quarter(year, quarter).unwrap()
    }

    fn precip(region: &str, window: TimeWindow, mm: f64) -> PrecipitationRecord {
        PrecipitationRecord {
            region: Region::new(region),
            window,
            precipitation_mm: mm,
            kind: PrecipitationKind::Rainfall,
        }
    }

    fn seed(region: &str, window: TimeWindow, seeded: bool) -> SeedingEvent {
        SeedingEvent {
            region: Region::new(region),
            window,
            seeded,
            target: None,
        }
    }

    fn fire(region: &str, window: TimeWindow, count: u64) -> WildfireRecord {
        WildfireRecord {
            region: Region::new(region),
            window,
            fire_count: count,
            acres_burned: count as f64 * 10.0,
        }
    }

    #[test]
    fn row_count_equals_distinct_keys() {
        let p = vec![precip("A", q(2018, 1), 1.0), precip("B", q(2018, 1), 2.0)];
        let s = vec![seed("A", q(2018, 1), true), seed("C", q(2018, 2), false)];
        let w = vec![fire("B", q(2018, 1), 3), fire("D", q(2018, 3), 1)];

        let joined = outer_join(&p, &s, &w).unwrap();

        let keys: BTreeSet<(Region, TimeWindow)> = p
            .iter()
            .map(|r| (r.region.clone(), r.window))
            .chain(s.iter().map(|r| (r.region.clone(), r.window)))
            .chain(w.iter().map(|r| (r.region.clone(), r.window)))
            .collect();
        assert_eq!(joined.len(), keys.len());
        assert_eq!(joined.len(), 4);
    }

    #[test]
    fn missing_sources_stay_explicit_nulls() {
        let joined = outer_join(
            &[precip("A", q(2018, 1), 5.0)],
            &[],
            &[fire("B", q(2018, 1), 2)],
        )
        .unwrap();

        let a = &joined[0];
        assert_eq!(a.region, Region::new("A"));
        assert_eq!(a.precipitation_mm, Some(5.0));
        assert_eq!(a.seeded, None);
        assert_eq!(a.fire_count, None);

        let b = &joined[1];
        assert_eq!(b.precipitation_mm, None);
        assert_eq!(b.fire_count, Some(2));
    }

    #[test]
    fn duplicates_sum_and_or() {
        let mut snow = precip("A", q(2018, 1), 3.0);
        snow.kind = PrecipitationKind::Snowpack;
        let p = vec![precip("A", q(2018, 1), 2.0), snow];
        let s = vec![seed("A", q(2018, 1), false), seed("A", q(2018, 1), true)];
        let w = vec![fire("A", q(2018, 1), 2), fire("A", q(2018, 1), 5)];

        let joined = outer_join(&p, &s, &w).unwrap();
        assert_eq!(joined.len(), 1);
        let obs = &joined[0];
        assert_eq!(obs.precipitation_mm, Some(5.0));
        assert_eq!(obs.precipitation_kind, Some(PrecipitationKind::Mixed));
        assert_eq!(obs.seeded, Some(true));
        assert_eq!(obs.fire_count, Some(7));
        assert_eq!(obs.acres_burned, Some(70.0));
    }

    #[test]
    fn output_is_sorted_by_region_then_window() {
        let p = vec![
            precip("B", q(2018, 2), 1.0),
            precip("A", q(2018, 2), 1.0),
            precip("A", q(2018, 1), 1.0),
        ];
        let joined = outer_join(&p, &[], &[]).unwrap();
        let order: Vec<String> = joined
            .iter()
            .map(|o| format!("{}@{}", o.region, o.window))
            .collect();
        assert_eq!(order, vec!["A@2018-Q1", "A@2018-Q2", "B@2018-Q2"]);
    }

    #[test]
    fn mixed_granularity_is_rejected() {
        let p = vec![precip("A", q(2018, 1), 1.0)];
        let w = vec![fire("A", TimeWindow::annual(2018), 1)];
        assert!(matches!(
            outer_join(&p, &[], &w),
            Err(SeedfireError::GranularityMismatch { .. })
        ));
    }
}
