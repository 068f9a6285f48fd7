//! Dataset loader: typed records from the three flat-file sources.
//!
//! Headers are matched case-insensitively and each logical column accepts a
//! handful of aliases, so the raw NOAA/Kaggle/Zenodo extracts load without
//! renaming. Loading is a pure function of the file contents.

use std::collections::HashMap;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, info};

use crate::model::{
    PrecipitationKind, PrecipitationRecord, Region, RegionGeometry, SeedingEvent, SeedingTarget,
    WildfireRecord,
};
use crate::window::TimeWindow;
use crate::{Result, SeedfireError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Wildfire,
    Precipitation,
    Seeding,
    Regions,
}

impl SourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Wildfire => "wildfire",
            Self::Precipitation => "precipitation",
            Self::Seeding => "seeding",
            Self::Regions => "regions",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Wildfire incidents smaller than this many acres are skipped. Rows
    /// carrying a `fire_count` are aggregates and are never filtered.
    pub min_fire_acres: Option<f64>,
}

struct Column {
    name: &'static str,
    aliases: &'static [&'static str],
    required: bool,
}

const REGION: Column = Column {
    name: "region",
    aliases: &["region", "state", "county", "region_id"],
    required: true,
};

const WINDOW: Column = Column {
    name: "time_window",
    aliases: &["time_window", "window", "period", "year", "fire_year"],
    required: true,
};

const WILDFIRE_COLUMNS: [Column; 4] = [
    REGION,
    WINDOW,
    Column {
        name: "fire_count",
        aliases: &["fire_count", "wildfire_count", "count"],
        required: false,
    },
    Column {
        name: "acres_burned",
        aliases: &["acres_burned", "fire_size", "acres"],
        required: false,
    },
];

const PRECIPITATION_COLUMNS: [Column; 4] = [
    REGION,
    WINDOW,
    Column {
        name: "precipitation_mm",
        aliases: &["precipitation_mm", "precip_mm", "precipitation", "prcp"],
        required: true,
    },
    Column {
        name: "precipitation_type",
        aliases: &["precipitation_type", "type", "kind"],
        required: false,
    },
];

const SEEDING_COLUMNS: [Column; 4] = [
    REGION,
    WINDOW,
    Column {
        name: "seeded",
        aliases: &["seeded", "seeding", "seeding_flag"],
        required: false,
    },
    Column {
        name: "target",
        aliases: &["target", "target_type", "season"],
        required: false,
    },
];

const REGION_COLUMNS: [Column; 7] = [
    REGION,
    Column {
        name: "min_lon",
        aliases: &["min_lon"],
        required: false,
    },
    Column {
        name: "min_lat",
        aliases: &["min_lat"],
        required: false,
    },
    Column {
        name: "max_lon",
        aliases: &["max_lon"],
        required: false,
    },
    Column {
        name: "max_lat",
        aliases: &["max_lat"],
        required: false,
    },
    Column {
        name: "latitude",
        aliases: &["latitude", "lat"],
        required: false,
    },
    Column {
        name: "longitude",
        aliases: &["longitude", "lon"],
        required: false,
    },
];

/// Half-width in degrees of the cell drawn around a point-only region.
const POINT_CELL_HALF_DEG: f64 = 0.25;

/// Logical column name -> field index for one opened file.
struct Schema<'a> {
    path: &'a Path,
    indexes: HashMap<&'static str, usize>,
}

impl<'a> Schema<'a> {
    fn resolve(
        path: &'a Path,
        kind: SourceKind,
        headers: &StringRecord,
        columns: &[Column],
    ) -> Result<Self> {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| h.trim().trim_start_matches('\u{feff}').to_ascii_lowercase())
            .collect();

        let mut indexes = HashMap::new();
        let mut missing = Vec::new();
        for column in columns {
            let found = column
                .aliases
                .iter()
                .find_map(|alias| normalized.iter().position(|h| h == alias));
            match found {
                Some(idx) => {
                    indexes.insert(column.name, idx);
                }
                None if column.required => missing.push(column.name.to_string()),
                None => {}
            }
        }

        if !missing.is_empty() {
            return Err(SeedfireError::SchemaMismatch {
                path: path.to_path_buf(),
                source_name: kind.name(),
                missing,
            });
        }

        Ok(Self { path, indexes })
    }

    fn has(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    /// Trimmed cell for a logical column, `None` when the column is absent
    /// or the cell is empty.
    fn cell<'r>(&self, record: &'r StringRecord, name: &str) -> Option<&'r str> {
        self.indexes
            .get(name)
            .and_then(|&idx| record.get(idx))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn malformed(&self, line: u64, reason: impl Into<String>) -> SeedfireError {
        SeedfireError::MalformedRecord {
            path: self.path.to_path_buf(),
            line,
            reason: reason.into(),
        }
    }

    fn required<'r>(&self, record: &'r StringRecord, line: u64, name: &str) -> Result<&'r str> {
        self.cell(record, name)
            .ok_or_else(|| self.malformed(line, format!("empty value for column '{name}'")))
    }

    fn region(&self, record: &StringRecord, line: u64) -> Result<Region> {
        Ok(Region::new(self.required(record, line, REGION.name)?))
    }

    fn window(&self, record: &StringRecord, line: u64) -> Result<TimeWindow> {
        let raw = self.required(record, line, WINDOW.name)?;
        raw.parse::<TimeWindow>()
            .map_err(|e| self.malformed(line, e.to_string()))
    }

    fn non_negative(&self, record: &StringRecord, line: u64, name: &str) -> Result<Option<f64>> {
        let Some(raw) = self.cell(record, name) else {
            return Ok(None);
        };
        let value: f64 = raw
            .parse()
            .map_err(|_| self.malformed(line, format!("non-numeric {name} value '{raw}'")))?;
        if !value.is_finite() || value < 0.0 {
            return Err(self.malformed(
                line,
                format!("{name} must be a finite non-negative number, got '{raw}'"),
            ));
        }
        Ok(Some(value))
    }

    fn coordinate(&self, record: &StringRecord, line: u64, name: &str) -> Result<Option<f64>> {
        let Some(raw) = self.cell(record, name) else {
            return Ok(None);
        };
        let value: f64 = raw
            .parse()
            .map_err(|_| self.malformed(line, format!("non-numeric {name} value '{raw}'")))?;
        if !value.is_finite() {
            return Err(self.malformed(line, format!("{name} must be finite, got '{raw}'")));
        }
        Ok(Some(value))
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Opens `path`, resolves its schema, and hands every row with its 1-based
/// file line number to `parse_row`. At least one of `require_any` must be
/// present when it is non-empty.
fn read_rows<T>(
    path: &Path,
    kind: SourceKind,
    columns: &[Column],
    require_any: &[&'static str],
    mut parse_row: impl FnMut(&Schema<'_>, &StringRecord, u64) -> Result<Option<T>>,
) -> Result<Vec<T>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(false)
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    let schema = Schema::resolve(path, kind, &headers, columns)?;
    if !require_any.is_empty() && !require_any.iter().any(|name| schema.has(name)) {
        return Err(SeedfireError::SchemaMismatch {
            path: path.to_path_buf(),
            source_name: kind.name(),
            missing: require_any.iter().map(|name| name.to_string()).collect(),
        });
    }

    let mut out = Vec::new();
    let mut record = StringRecord::new();
    loop {
        let more = match reader.read_record(&mut record) {
            Ok(more) => more,
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or(0);
                return Err(schema.malformed(line, err.to_string()));
            }
        };
        if !more {
            break;
        }
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if let Some(row) = parse_row(&schema, &record, line)? {
            out.push(row);
        }
    }

    debug!(
        source = kind.name(),
        path = %path.display(),
        rows = out.len(),
        "parsed source file"
    );
    Ok(out)
}

/// Loads wildfire rows. A row without a `fire_count` column is a single
/// incident; its acreage comes from `acres_burned` (or Kaggle's `FIRE_SIZE`).
pub fn load_wildfires(path: &Path, options: &LoadOptions) -> Result<Vec<WildfireRecord>> {
    let mut skipped = 0usize;
    let records = read_rows(
        path,
        SourceKind::Wildfire,
        &WILDFIRE_COLUMNS,
        &["fire_count", "acres_burned"],
        |schema, record, line| {
            let region = schema.region(record, line)?;
            let window = schema.window(record, line)?;
            let fire_count = match schema.cell(record, "fire_count") {
                Some(raw) => raw.parse::<u64>().map_err(|_| {
                    schema.malformed(
                        line,
                        format!("fire_count must be a non-negative integer, got '{raw}'"),
                    )
                })?,
                None if schema.has("fire_count") => 0,
                None => 1,
            };
            let acres_burned = schema
                .non_negative(record, line, "acres_burned")?
                .unwrap_or(0.0);

            let incident = !schema.has("fire_count");
            if let Some(min_acres) = options.min_fire_acres.filter(|_| incident) {
                if acres_burned < min_acres {
                    skipped += 1;
                    return Ok(None);
                }
            }

            Ok(Some(WildfireRecord {
                region,
                window,
                fire_count,
                acres_burned,
            }))
        },
    )?;

    if skipped > 0 {
        info!(skipped, "dropped wildfire incidents below the minimum size");
    }
    Ok(records)
}

pub fn load_precipitation(path: &Path) -> Result<Vec<PrecipitationRecord>> {
    read_rows(
        path,
        SourceKind::Precipitation,
        &PRECIPITATION_COLUMNS,
        &[],
        |schema, record, line| {
            let region = schema.region(record, line)?;
            let window = schema.window(record, line)?;
            let precipitation_mm = schema
                .non_negative(record, line, "precipitation_mm")?
                .ok_or_else(|| schema.malformed(line, "empty value for column 'precipitation_mm'"))?;
            let kind = match schema.cell(record, "precipitation_type") {
                Some(raw) => raw
                    .parse::<PrecipitationKind>()
                    .map_err(|e| schema.malformed(line, e))?,
                None => PrecipitationKind::Rainfall,
            };
            Ok(Some(PrecipitationRecord {
                region,
                window,
                precipitation_mm,
                kind,
            }))
        },
    )
}

/// Loads seeding rows. Without a `seeded` column every row is a logged
/// seeding event.
pub fn load_seeding(path: &Path) -> Result<Vec<SeedingEvent>> {
    read_rows(path, SourceKind::Seeding, &SEEDING_COLUMNS, &[], |schema, record, line| {
        let region = schema.region(record, line)?;
        let window = schema.window(record, line)?;
        let seeded = match schema.cell(record, "seeded") {
            Some(raw) => parse_bool(raw)
                .ok_or_else(|| schema.malformed(line, format!("invalid seeding flag '{raw}'")))?,
            None if schema.has("seeded") => {
                return Err(schema.malformed(line, "empty value for column 'seeded'"));
            }
            None => true,
        };
        let target = schema
            .cell(record, "target")
            .map(|raw| raw.parse::<SeedingTarget>())
            .transpose()
            .map_err(|e| schema.malformed(line, e))?;
        Ok(Some(SeedingEvent {
            region,
            window,
            seeded,
            target,
        }))
    })
}

/// Loads region bounding boxes. Rows giving only a point (latitude and
/// longitude) get a small square cell around it.
pub fn load_regions(path: &Path) -> Result<Vec<RegionGeometry>> {
    read_rows(path, SourceKind::Regions, &REGION_COLUMNS, &[], |schema, record, line| {
        let region = schema.region(record, line)?;
        let bbox = (
            schema.coordinate(record, line, "min_lon")?,
            schema.coordinate(record, line, "min_lat")?,
            schema.coordinate(record, line, "max_lon")?,
            schema.coordinate(record, line, "max_lat")?,
        );
        let point = (
            schema.coordinate(record, line, "longitude")?,
            schema.coordinate(record, line, "latitude")?,
        );

        let geometry = match (bbox, point) {
            ((Some(min_lon), Some(min_lat), Some(max_lon), Some(max_lat)), _) => {
                if min_lon > max_lon || min_lat > max_lat {
                    return Err(schema.malformed(line, "bounding box minimum exceeds maximum"));
                }
                RegionGeometry {
                    region,
                    min_lon,
                    min_lat,
                    max_lon,
                    max_lat,
                }
            }
            (_, (Some(lon), Some(lat))) => RegionGeometry {
                region,
                min_lon: lon - POINT_CELL_HALF_DEG,
                min_lat: lat - POINT_CELL_HALF_DEG,
                max_lon: lon + POINT_CELL_HALF_DEG,
                max_lat: lat + POINT_CELL_HALF_DEG,
            },
            _ => {
                return Err(schema.malformed(
                    line,
                    "region needs min_lon/min_lat/max_lon/max_lat or latitude/longitude",
                ));
            }
        };
        Ok(Some(geometry))
    })
}
