//! Timestamp conventions used by the campaign instruments.

use std::path::Path;

use chrono::format::{Parsed, StrftimeItems};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};

/// How a record's timestamp is found in a data file.
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampSpec {
    /// One or more columns joined with a single space and parsed with a
    /// chrono format string, e.g. `%Y%m%d%H%M%S` or `%Y %m %d %H %M %S`.
    Format { columns: Vec<String>, format: String },
    /// Seconds since the Unix epoch.
    UnixSeconds { column: String },
    /// MATLAB serial date number (days since year 0).
    MatlabDatenum { column: String },
    /// Calendar date `Y M D` on a fixed 0-based line of the file header,
    /// time of day from the `hour` and `minute` columns.
    DateFromHeader {
        line: usize,
        hour: String,
        minute: String,
    },
    /// Date and hour `%Y%m%d%H` from the file name (the part before the
    /// first `_`, after `offset` leading characters), minute of the hour
    /// from the `minute` column.
    FileNameHour { offset: usize, minute: String },
}

impl TimestampSpec {
    pub fn format(columns: &[&str], format: &str) -> Self {
        TimestampSpec::Format {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            format: format.to_string(),
        }
    }

    /// Columns this spec reads from each data row.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            TimestampSpec::Format { columns, .. } => columns.iter().map(|c| c.as_str()).collect(),
            TimestampSpec::UnixSeconds { column } | TimestampSpec::MatlabDatenum { column } => {
                vec![column.as_str()]
            }
            TimestampSpec::DateFromHeader { hour, minute, .. } => vec![hour.as_str(), minute.as_str()],
            TimestampSpec::FileNameHour { minute, .. } => vec![minute.as_str()],
        }
    }
}

/// Year assumed when a format has none, as C `strptime` does.
pub const DEFAULT_YEAR: i64 = 1900;

/// Parse `s` with a chrono format. Numeric fields that were written as floats
/// (`20140215000100.0`) are accepted, as are date-only formats, formats
/// with an hour but no minute (`%Y %d %B %H UTC`) and formats without a
/// year (`%d %B %H UTC`, read as [`DEFAULT_YEAR`]).
pub fn parse_formatted(s: &str, format: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    let s = s.strip_suffix(".0").unwrap_or(s);
    let mut parsed = Parsed::new();
    chrono::format::parse(&mut parsed, s, StrftimeItems::new(format)).ok()?;
    if parsed.minute().is_none() {
        parsed.set_minute(0).ok()?;
    }
    if parsed.year().is_none() && parsed.year_mod_100().is_none() && parsed.isoyear().is_none() {
        parsed.set_year(DEFAULT_YEAR).ok()?;
    }
    if let Ok(dt) = parsed.to_naive_datetime_with_offset(0) {
        return Some(Utc.from_utc_datetime(&dt));
    }
    parsed
        .to_naive_date()
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}

/// Convert a MATLAB datenum to UTC.
pub fn datenum_to_datetime(datenum: f64) -> Option<DateTime<Utc>> {
    if !datenum.is_finite() {
        return None;
    }
    let days = datenum.floor();
    if days.abs() > f64::from(i32::MAX) {
        return None;
    }
    // MATLAB counts from year 0, chrono's day 1 is 0001-01-01.
    let date = NaiveDate::from_num_days_from_ce_opt((days as i32).checked_sub(366)?)?;
    let micros = ((datenum - days) * 86_400_000_000.0).round() as i64;
    let dt = date.and_hms_opt(0, 0, 0)? + Duration::microseconds(micros);
    Some(Utc.from_utc_datetime(&dt))
}

/// Seconds since the epoch, fractional part kept to the microsecond.
pub fn unix_to_datetime(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

/// Parse a whitespace separated `Y M D` line.
pub fn parse_date_line(line: &str) -> Option<NaiveDate> {
    let mut parts = line.split_whitespace().map(|p| p.parse::<i64>().ok());
    let year = parts.next()??;
    let month = parts.next()??;
    let day = parts.next()??;
    NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
}

/// Combine a date with hour and minute fields (which may be written as floats).
pub fn date_with_hour_minute(date: NaiveDate, hour: &str, minute: &str) -> Option<DateTime<Utc>> {
    let hh = hour.trim().parse::<f64>().ok()?;
    let mm = minute.trim().parse::<f64>().ok()?;
    let time = NaiveTime::from_hms_opt(hh as u32, mm as u32, 0)?;
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}

/// Date and hour encoded as `%Y%m%d%H` in a file name such as
/// `0042014021521_a_p_2.dat` (offset 3).
pub fn file_name_hour(path: &Path, offset: usize) -> Option<DateTime<Utc>> {
    let name = path.file_name()?.to_str()?;
    let stem = name.split('_').next()?;
    let digits = stem.get(offset..offset + 10)?;
    parse_formatted(digits, "%Y%m%d%H")
}

/// Drop seconds and sub-seconds.
pub fn truncate_to_minute(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_second(0)
        .and_then(|d| d.with_nanosecond(0))
        .unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pluvio_datestr() {
        let dt = parse_formatted("20140215000130", "%Y%m%d%H%M%S").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2014, 2, 15, 0, 1, 30).unwrap());
        let float_written = parse_formatted("20140215000130.0", "%Y%m%d%H%M%S").unwrap();
        assert_eq!(dt, float_written);
        assert_eq!(
            truncate_to_minute(dt),
            Utc.with_ymd_and_hms(2014, 2, 15, 0, 1, 0).unwrap()
        );
    }

    #[test]
    fn date_only_format() {
        let dt = parse_formatted("2014-02-15", "%Y-%m-%d").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2014, 2, 15, 0, 0, 0).unwrap());
        assert!(parse_formatted("not a date", "%Y-%m-%d").is_none());
    }

    #[test]
    fn hour_without_minutes() {
        let dt = parse_formatted("2014 21 February 21 UTC", "%Y %d %B %H UTC").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2014, 2, 21, 21, 0, 0).unwrap());
    }

    #[test]
    fn matlab_datenum() {
        let dt = datenum_to_datetime(735645.5).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2014, 2, 15, 12, 0, 0).unwrap());
        assert!(datenum_to_datetime(f64::NAN).is_none());
        assert!(datenum_to_datetime(-1e300).is_none());
        assert!(datenum_to_datetime(-2_147_483_000.0).is_none());
        assert!(datenum_to_datetime(1e12).is_none());
    }

    #[test]
    fn format_without_year() {
        let dt = parse_formatted("21 February 21 UTC", "%d %B %H UTC").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(1900, 2, 21, 21, 0, 0).unwrap());
    }

    #[test]
    fn hour_from_file_name() {
        let p = Path::new("/data/PIP/a_Velocity_Tables/00420140215/0042014021521_a_p_2.dat");
        assert_eq!(
            file_name_hour(p, 3),
            Some(Utc.with_ymd_and_hms(2014, 2, 15, 21, 0, 0).unwrap())
        );
        assert!(file_name_hour(Path::new("vel.dat"), 3).is_none());
    }

    #[test]
    fn unix_seconds() {
        let dt = unix_to_datetime(1_392_422_400.0).unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2014, 2, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn header_date_and_clock_columns() {
        let date = parse_date_line("  2014   2  15").unwrap();
        let dt = date_with_hour_minute(date, "13", "5.0").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2014, 2, 15, 13, 5, 0).unwrap());
        assert!(parse_date_line("2014 2").is_none());
    }
}
