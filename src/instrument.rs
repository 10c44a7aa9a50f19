//! File conventions of the BAECC campaign instruments.
//!
//! Each [`Instrument`] knows how its raw ASCII files are laid out and which
//! columns it declares, and provides the corrections applied to its data
//! before analysis.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::data::loader::{self, Delimiter, DelimitedFormat, ExtraColumns, HeaderMode, LoadSpec};
use crate::data::model::{ColumnKind, ColumnSpec, Dataset, Record, Schema, Value};
use crate::data::resample::{self, Aggregation};
use crate::data::{filter, precip};
use crate::data::time::TimestampSpec;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Instrument catalogue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Instrument {
    /// OTT Pluvio² weighing gauge; `name` is e.g. `pluvio200` or `pluvio400`.
    Pluvio { name: String },
    /// PIP particle tables.
    PipParticle,
    /// PIP particle size distribution tables.
    PipDsd,
    /// PIP velocity tables: fall velocity per particle and minute.
    PipVelocity,
    /// Jenoptik snow depth sensor.
    Jenoptik,
    /// Yankee hotplate precipitation sensor.
    Hotplate,
}

impl Instrument {
    pub fn pluvio(name: &str) -> Self {
        Instrument::Pluvio {
            name: name.to_ascii_lowercase(),
        }
    }

    /// Pluvio gauge named after the directory holding its files
    /// (`.../Pluvio200/pluvio200_02_20140215.txt` → `pluvio200`).
    pub fn pluvio_from_path(path: &Path) -> Self {
        let name = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .unwrap_or("pluvio");
        Instrument::pluvio(name)
    }

    /// Short name, also used as the dataset name.
    pub fn name(&self) -> &str {
        match self {
            Instrument::Pluvio { name } => name,
            Instrument::PipParticle => "pip_part",
            Instrument::PipDsd => "pip_dsd",
            Instrument::PipVelocity => "pip_vel",
            Instrument::Jenoptik => "jenoptik",
            Instrument::Hotplate => "hotplate",
        }
    }

    /// Layout and declared columns of the instrument's raw files.
    pub fn load_spec(&self) -> LoadSpec {
        match self {
            Instrument::Pluvio { name } => pluvio_spec(name),
            Instrument::PipParticle => pip_particle_spec(),
            Instrument::PipDsd => pip_dsd_spec(),
            Instrument::PipVelocity => pip_velocity_spec(),
            Instrument::Jenoptik => jenoptik_spec(),
            Instrument::Hotplate => hotplate_spec(),
        }
    }

    /// Load and merge raw files, then cut to the optional time span.
    ///
    /// DSD tables are deduplicated and put on a one-minute grid with empty
    /// minutes as zero concentration. Velocity tables are averaged per
    /// (minute, particle) and rows without a vertical velocity are dropped.
    pub fn load<P: AsRef<Path>>(
        &self,
        paths: &[P],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Dataset> {
        let data = loader::load_files(paths, &self.load_spec())?;
        let data = match self {
            Instrument::PipDsd => pip_dsd_grid(&data),
            Instrument::PipVelocity => match resample::mean_by(&data, "Part_ID") {
                Some(mean) => filter::retain(&mean, "vel_v", |_| true),
                None => data,
            },
            _ => data,
        };
        if start.is_none() && end.is_none() {
            return Ok(data);
        }
        Ok(filter::between(&data, start, end))
    }

    /// Data with the instrument's known corrections applied.
    pub fn good_data(&self, data: &Dataset) -> Dataset {
        match self {
            Instrument::Pluvio { name } => pluvio_good_data(name, data),
            Instrument::PipDsd => pip_dsd_good_data(data),
            Instrument::PipVelocity => filter::retain(data, "Wad_Dia", |d| d > PIP_VEL_MIN_DIAMETER),
            Instrument::Jenoptik => jenoptik_good_data(data),
            Instrument::PipParticle | Instrument::Hotplate => data.clone(),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Instrument {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "pip_part" | "pip_particle" => Ok(Instrument::PipParticle),
            "pip_dsd" | "dsd" => Ok(Instrument::PipDsd),
            "pip_vel" | "pip_velocity" => Ok(Instrument::PipVelocity),
            "jenoptik" => Ok(Instrument::Jenoptik),
            "hotplate" => Ok(Instrument::Hotplate),
            p if p.starts_with("pluvio") => Ok(Instrument::pluvio(p)),
            other => Err(format!("unknown instrument '{other}'")),
        }
    }
}

fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

// ---------------------------------------------------------------------------
// Pluvio
// ---------------------------------------------------------------------------

/// Positional columns of a Pluvio file.
pub const PLUVIO_COLUMNS: [&str; 13] = [
    "datestr",
    "i_rt",
    "acc_rt",
    "acc_nrt",
    "acc_tot_nrt",
    "bucket_rt",
    "bucket_nrt",
    "t_load",
    "heating",
    "status",
    "t_elec",
    "volt",
    "t_rim",
];

/// Precipitation columns scaled by the gain correction.
pub const PLUVIO_PRECIP_COLUMNS: [&str; 5] = ["acc_rt", "acc_nrt", "acc_tot_nrt", "bucket_rt", "bucket_nrt"];

/// `;`-separated, no header, every record written twice. `i_rt` is not
/// loaded (its real-time intensity is unreliable). Timestamps keep minutes only.
fn pluvio_spec(name: &str) -> LoadSpec {
    let mut format = DelimitedFormat::headerless(Delimiter::Byte(b';'), &PLUVIO_COLUMNS);
    format.row_stride = 2;
    let schema = Schema::new(vec![
        ColumnSpec::float("acc_rt", "mm"),
        ColumnSpec::float("acc_nrt", "mm"),
        ColumnSpec::float("acc_tot_nrt", "mm"),
        ColumnSpec::float("bucket_rt", "mm"),
        ColumnSpec::float("bucket_nrt", "mm"),
        ColumnSpec::float("t_load", "degC"),
        ColumnSpec::new("heating", ColumnKind::Integer),
        ColumnSpec::new("status", ColumnKind::Integer),
        ColumnSpec::float("t_elec", "degC"),
        ColumnSpec::float("volt", "V"),
        ColumnSpec::float("t_rim", "degC"),
    ]);
    let mut spec = LoadSpec::new(
        name,
        format,
        TimestampSpec::format(&["datestr"], "%Y%m%d%H%M%S"),
        schema,
    );
    spec.truncate_seconds = true;
    spec
}

/// Gauge weights were misconfigured between these dates.
fn pluvio_gain(name: &str, last: DateTime<Utc>) -> Option<f64> {
    let swap = utc(2014, 5, 16, 8);
    let swap_back = utc(2014, 8, 31, 8);
    if last <= swap || last >= swap_back {
        return None;
    }
    match name {
        "pluvio200" => Some(2.0),
        "pluvio400" => Some(0.5),
        _ => None,
    }
}

fn pluvio_good_data(name: &str, data: &Dataset) -> Dataset {
    let Some(gain) = data.last_timestamp().and_then(|last| pluvio_gain(name, last)) else {
        return data.clone();
    };
    PLUVIO_PRECIP_COLUMNS
        .iter()
        .fold(data.clone(), |acc, col| acc.map_column(col, |_, v| v * gain))
}

/// Pluvio NRT amounts are combined this many at a time.
pub const N_COMBINED_INTERVALS: usize = 2;

/// Precipitation amount (mm) from Pluvio data: positive `acc_nrt` values
/// summed `n_combined` at a time, then moved by `shift`.
pub fn pluvio_amount(data: &Dataset, n_combined: usize, shift: Duration) -> Option<Dataset> {
    let amount = precip::combined_amount(data, "acc_nrt", n_combined)?;
    Some(filter::shift(&amount, shift))
}

/// Accumulation (mm) from the bucket weight, counted from the first record.
///
/// The bucket is interpolated onto a one-minute grid and moved by `shift`.
/// Drops such as evaporation are removed so the result never decreases. The
/// last value of each `interval` is kept.
pub fn pluvio_acc(data: &Dataset, interval: Duration, shift: Duration) -> Option<Dataset> {
    let bucket = data.column("bucket_nrt")?;
    let raw = match bucket.into_iter().flatten().next() {
        Some(start) => data.map_column("bucket_nrt", |_, v| v - start),
        None => data.clone(),
    };
    let grid = precip::interpolate_minutes(&raw, "bucket_nrt")?;
    let acc = precip::monotone_acc(&filter::shift(&grid, shift), "bucket_nrt")?;
    resample::resample(&acc, interval, Aggregation::Last)
}

// ---------------------------------------------------------------------------
// PIP
// ---------------------------------------------------------------------------

/// Whitespace separated; eight preamble lines, the header, then a units line.
fn pip_particle_spec() -> LoadSpec {
    let mut format = DelimitedFormat::with_header(Delimiter::Whitespace);
    format.skip_lines = vec![0, 1, 2, 3, 4, 5, 6, 7, 9];
    LoadSpec::new(
        "pip_part",
        format,
        TimestampSpec::format(&["Year", "Month", "Day", "Hr", "Min", "Sec"], "%Y %m %d %H %M %S"),
        Schema::new(vec![
            ColumnSpec::new("Part_ID", ColumnKind::Integer),
            ColumnSpec::float("Wad_Dia", "mm"),
        ]),
    )
}

/// Tab separated; the date sits on line 6 of the preamble, the header is the
/// fourth line after it, the last line is a footer. Every column the header
/// names besides the bookkeeping ones is a size bin (centre diameter in mm).
fn pip_dsd_spec() -> LoadSpec {
    let mut format = DelimitedFormat::with_header(Delimiter::Byte(b'\t'));
    format.skip_rows = 8;
    format.header = HeaderMode::Row(3);
    format.skip_footer = 1;
    let mut spec = LoadSpec::new(
        "pip_dsd",
        format,
        TimestampSpec::DateFromHeader {
            line: 5,
            hour: "hr_d".into(),
            minute: "min_d".into(),
        },
        Schema::default(),
    );
    spec.extra = Some(ExtraColumns {
        kind: ColumnKind::Float,
        unit: Some("m-3 mm-1".into()),
        ignore: vec!["day_time".into(), "Num_d".into(), "Bin_cen".into()],
    });
    spec
}

/// Smallest size bin considered reliable, mm.
pub const DSD_MIN_DIAMETER: f64 = 0.3;

/// Before the firmware update on 2014-11-25 the reported concentrations
/// were half of the true value.
fn pip_dsd_gain(last: DateTime<Utc>) -> f64 {
    if last > utc(2014, 11, 25, 8) {
        1.0
    } else {
        2.0
    }
}

/// Size bins of a DSD dataset as (column name, diameter in mm).
pub fn dsd_bins(data: &Dataset) -> Vec<(String, f64)> {
    data.schema
        .names()
        .filter_map(|n| n.parse::<f64>().ok().map(|d| (n.to_string(), d)))
        .collect()
}

fn pip_dsd_grid(data: &Dataset) -> Dataset {
    let unique = filter::drop_duplicates(data);
    match resample::resample(&unique, Duration::minutes(1), Aggregation::Mean) {
        Some(grid) => filter::fill_nulls(&grid, 0.0),
        None => unique,
    }
}

/// Width, in bins, of the window used to find isolated large particles.
pub const ISOLATED_BIN_WINDOW: usize = 5;

/// Zero each record's size bins from the first isolated one onward.
///
/// A bin is isolated when it is the only non-zero value among itself and the
/// `window - 1` smaller bins. The first `window` bins are never isolated.
pub fn remove_isolated_bins(data: &Dataset, window: usize) -> Dataset {
    let positions: Vec<usize> = dsd_bins(data)
        .iter()
        .filter_map(|(name, _)| data.column_index(name))
        .collect();
    let records = data
        .records()
        .iter()
        .map(|r| {
            let filled: Vec<bool> = positions
                .iter()
                .map(|&i| r.values()[i].as_f64().is_some_and(|v| v != 0.0))
                .collect();
            let first_isolated = (window..filled.len()).find(|&j| {
                let from = (j + 1).saturating_sub(window);
                filled[from..=j].iter().filter(|&&f| f).count() == 1
            });
            let mut values = r.values().to_vec();
            if let Some(j) = first_isolated {
                for &i in &positions[j..] {
                    values[i] = Value::Float(0.0);
                }
            }
            Record::new(r.timestamp(), values)
        })
        .collect();
    Dataset::from_records(data.name.clone(), data.schema.clone(), records)
}

fn pip_dsd_good_data(data: &Dataset) -> Dataset {
    let gain = data.last_timestamp().map_or(1.0, pip_dsd_gain);
    let data = &remove_isolated_bins(data, ISOLATED_BIN_WINDOW);
    let bins = dsd_bins(data);
    let keep: Vec<&str> = bins
        .iter()
        .filter(|(_, d)| *d >= DSD_MIN_DIAMETER)
        .map(|(n, _)| n.as_str())
        .collect();
    let kept = data.select(&keep);
    keep.iter()
        .fold(kept, |acc, col| acc.map_column(col, |_, v| v * gain))
}

/// Tab separated; eight preamble lines, then the header. The date and hour
/// come from the file name, the minute from `minute_p`. The two velocity
/// column pairs of different firmware versions load under one name.
fn pip_velocity_spec() -> LoadSpec {
    let mut format = DelimitedFormat::with_header(Delimiter::Byte(b'\t'));
    format.skip_rows = 8;
    format.skip_footer = 1;
    let mut spec = LoadSpec::new(
        "pip_vel",
        format,
        TimestampSpec::FileNameHour {
            offset: 3,
            minute: "minute_p".into(),
        },
        Schema::new(vec![
            ColumnSpec::new("Part_ID", ColumnKind::Integer),
            ColumnSpec::float("Wad_Dia", "mm"),
            ColumnSpec::float("vel_v", "m s-1"),
            ColumnSpec::float("vel_h", "m s-1"),
        ]),
    );
    spec.aliases = ["vel_v_1", "vel_v_2"]
        .iter()
        .map(|a| (a.to_string(), "vel_v".to_string()))
        .chain(["vel_h_1", "vel_h_2"].iter().map(|a| (a.to_string(), "vel_h".to_string())))
        .collect();
    spec
}

/// Smallest particle diameter with reliable velocities, mm.
pub const PIP_VEL_MIN_DIAMETER: f64 = 0.375;

/// Sum of cubed particle diameters (mm³) per `interval`, a proxy for liquid
/// water content.
pub fn lwc(data: &Dataset, interval: Duration) -> Option<Dataset> {
    let cubed = data
        .select(&["Wad_Dia"])
        .map_column("Wad_Dia", |_, d| d.powi(3));
    let mut binned = resample::resample(&cubed, interval, Aggregation::Sum)?;
    let column = binned.schema.columns.first_mut()?;
    column.name = "lwc".into();
    column.unit = Some("mm3".into());
    Some(binned)
}

// ---------------------------------------------------------------------------
// Jenoptik
// ---------------------------------------------------------------------------

/// Zero level of the snow depth sensor, m.
pub const JENOPTIK_OFFSET: f64 = 0.034;

fn jenoptik_spec() -> LoadSpec {
    LoadSpec::new(
        "jenoptik",
        DelimitedFormat::headerless(
            Delimiter::Byte(b','),
            &["time", "snow_depth", "signal_strength", "temperature"],
        ),
        TimestampSpec::format(&["time"], "%Y-%m-%d %H:%M:%S"),
        Schema::new(vec![
            ColumnSpec::float("snow_depth", "m"),
            ColumnSpec::float("signal_strength", "%"),
            ColumnSpec::float("temperature", "degC"),
        ]),
    )
}

fn jenoptik_good_data(data: &Dataset) -> Dataset {
    data.map_column("snow_depth", |_, v| v - JENOPTIK_OFFSET)
}

// ---------------------------------------------------------------------------
// Hotplate
// ---------------------------------------------------------------------------

/// Positional columns of a hotplate record: timestamp, device number,
/// firmware, then the 34 measurement fields of the output format.
pub const HOTPLATE_COLUMNS: [&str; 37] = [
    "time",
    "device",
    "firmware",
    "output_format",
    "fault",
    "unix_time",
    "v_sensor",
    "v_ref",
    "i_sensor",
    "i_ref",
    "r_sensor",
    "r_ref",
    "p_sensor_1min",
    "p_ref_1min",
    "pwm_sensor",
    "pwm_ref",
    "t_ambient",
    "t_enclosure",
    "t_solar_ir",
    "solar_radiation",
    "net_ir",
    "pressure",
    "t_humidity",
    "rh",
    "wind_speed",
    "collection_efficiency",
    "p_offset",
    "p_offset_radiation",
    "raw_rate_1min",
    "p_sensor_5min",
    "p_ref_5min",
    "dp_5min",
    "t_ambient_5min",
    "p_offset_5min",
    "raw_rate_5min",
    "rate",
    "acc",
];

fn hotplate_spec() -> LoadSpec {
    let mut format = DelimitedFormat::headerless(Delimiter::Byte(b','), &HOTPLATE_COLUMNS);
    format.min_fields = HOTPLATE_COLUMNS.len();
    LoadSpec::new(
        "hotplate",
        format,
        TimestampSpec::format(&["time"], "%Y%m%d%H%M%S"),
        Schema::new(vec![
            ColumnSpec::new("fault", ColumnKind::Integer),
            ColumnSpec::float("t_ambient", "degC"),
            ColumnSpec::float("solar_radiation", "W m-2"),
            ColumnSpec::float("pressure", "mbar"),
            ColumnSpec::float("rh", "%"),
            ColumnSpec::float("wind_speed", "m s-1"),
            ColumnSpec::float("rate", "mm h-1"),
            ColumnSpec::float("acc", "mm"),
        ]),
    )
}
