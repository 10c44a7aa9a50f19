use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use csv::{ReaderBuilder, Trim};
use log::{debug, info, warn};
use serde_json::Value as JsonValue;

use super::columnar;
use super::model::{ColumnKind, ColumnSpec, Dataset, Record, Schema, Value};
use super::time::{self, TimestampSpec};
use crate::error::{LoadError, Result};

// ---------------------------------------------------------------------------
// Declared file layout
// ---------------------------------------------------------------------------

/// Field separator of a delimited text file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Byte(u8),
    /// Runs of spaces and tabs.
    Whitespace,
}

/// Where column names come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderMode {
    /// The n-th kept line (0-based, after skipping) is the header row.
    /// Kept lines before it are discarded.
    Row(usize),
    /// Headerless file; fields are named by position.
    Names(Vec<String>),
}

/// Layout of a delimited text file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedFormat {
    pub delimiter: Delimiter,
    pub header: HeaderMode,
    /// Leading lines ignored before anything else.
    pub skip_rows: usize,
    /// Individual 0-based line numbers to ignore.
    pub skip_lines: Vec<usize>,
    /// Keep every n-th data row (1 keeps all).
    pub row_stride: usize,
    /// Trailing rows ignored.
    pub skip_footer: usize,
    /// Rows with fewer fields are dropped with a warning (0 disables).
    pub min_fields: usize,
}

impl DelimitedFormat {
    /// A plain file with a header on the first line.
    pub fn with_header(delimiter: Delimiter) -> Self {
        DelimitedFormat {
            delimiter,
            header: HeaderMode::Row(0),
            skip_rows: 0,
            skip_lines: Vec::new(),
            row_stride: 1,
            skip_footer: 0,
            min_fields: 0,
        }
    }

    /// A headerless file with positional column names.
    pub fn headerless(delimiter: Delimiter, names: &[&str]) -> Self {
        DelimitedFormat {
            header: HeaderMode::Names(names.iter().map(|n| n.to_string()).collect()),
            ..DelimitedFormat::with_header(delimiter)
        }
    }
}

/// Everything the loader needs to turn a text file into a [`Dataset`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoadSpec {
    /// Name given to the loaded dataset.
    pub name: String,
    pub format: DelimitedFormat,
    pub timestamp: TimestampSpec,
    /// Declared measurement columns; each must be present in the file.
    pub schema: Schema,
    /// Header columns beyond the declared ones to load as well.
    pub extra: Option<ExtraColumns>,
    /// Drop seconds from parsed timestamps.
    pub truncate_seconds: bool,
    /// Header names read under another name, `(in file, loaded as)`.
    /// Several file names may map to one loaded name; the first one found wins.
    pub aliases: Vec<(String, String)>,
}

impl LoadSpec {
    pub fn new(name: &str, format: DelimitedFormat, timestamp: TimestampSpec, schema: Schema) -> Self {
        LoadSpec {
            name: name.to_string(),
            format,
            timestamp,
            schema,
            extra: None,
            truncate_seconds: false,
            aliases: Vec::new(),
        }
    }
}

/// Columns named only by the file header (e.g. size bins), appended to the
/// declared schema in header order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraColumns {
    pub kind: ColumnKind,
    pub unit: Option<String>,
    /// Header columns never loaded.
    pub ignore: Vec<String>,
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a self-describing dataset file. Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – table with a `datetime` timestamp column (see [`columnar`])
/// * `.json`    – `[{ "datetime": "2014-02-15T00:01:00Z", ...columns }, ...]`
///
/// Instrument text files need a declared layout, see [`load_file`].
pub fn load_path(path: &Path) -> Result<Dataset> {
    if !path.exists() {
        return Err(LoadError::MissingFile(path.to_path_buf()));
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let dataset = match ext.as_str() {
        "parquet" | "pq" => columnar::read_parquet(path)?,
        "json" => load_json(path)?,
        other => return Err(LoadError::UnsupportedFormat(other.to_string())),
    };
    check_time_order(path, dataset.records().iter().map(|r| (0, r.timestamp())))?;
    info!("loaded {} records from {}", dataset.len(), path.display());
    Ok(dataset)
}

/// Parse one delimited text file according to `spec`.
pub fn load_file(path: &Path, spec: &LoadSpec) -> Result<Dataset> {
    let text = read_text(path)?;
    let dataset = parse_delimited(path, &text, spec)?;
    info!(
        "loaded {} records from {} as '{}'",
        dataset.len(),
        path.display(),
        spec.name
    );
    Ok(dataset)
}

/// Load several files with the same layout into one dataset sorted by time.
///
/// Files are read in the given order; ties in time keep file order.
/// When the spec loads header-defined extra columns every file must yield
/// the same columns as the first one.
pub fn load_files<P: AsRef<Path>>(paths: &[P], spec: &LoadSpec) -> Result<Dataset> {
    let mut schema: Option<Schema> = None;
    let mut records = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let dataset = load_file(path, spec)?;
        match &schema {
            None => schema = Some(dataset.schema.clone()),
            Some(first) if *first != dataset.schema => {
                return Err(LoadError::SchemaMismatch {
                    path: path.to_path_buf(),
                    missing: first
                        .names()
                        .filter(|n| dataset.schema.index_of(n).is_none())
                        .map(str::to_string)
                        .collect(),
                    found: dataset.schema.names().map(str::to_string).collect(),
                });
            }
            Some(_) => {}
        }
        records.extend(dataset.into_records());
    }
    records.sort_by_key(|r| r.timestamp());
    let schema = schema.unwrap_or_else(|| spec.schema.clone());
    Ok(Dataset::from_records(spec.name.clone(), schema, records))
}

/// Whole file as UTF-8 text. Invalid bytes are a parse error on their line.
fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| open_error(path, e))?;
    String::from_utf8(bytes).map_err(|e| {
        let valid = e.utf8_error().valid_up_to();
        let line = e.as_bytes()[..valid].iter().filter(|&&b| b == b'\n').count() + 1;
        LoadError::parse(path, line, "invalid UTF-8")
    })
}

pub(crate) fn open_error(path: &Path, err: std::io::Error) -> LoadError {
    if err.kind() == std::io::ErrorKind::NotFound {
        LoadError::MissingFile(path.to_path_buf())
    } else {
        LoadError::Io(err)
    }
}

// ---------------------------------------------------------------------------
// Delimited text loader
// ---------------------------------------------------------------------------

/// One split line: 1-based line number and its fields.
type RawRow = (usize, Vec<String>);

fn parse_delimited(path: &Path, text: &str, spec: &LoadSpec) -> Result<Dataset> {
    let format = &spec.format;
    let mut rows: Vec<RawRow> = split_rows(text, format.delimiter)?
        .into_iter()
        .filter(|(line, _)| {
            let idx = line.saturating_sub(1);
            idx >= format.skip_rows && !format.skip_lines.contains(&idx)
        })
        .collect();
    rows.truncate(rows.len().saturating_sub(format.skip_footer));

    let (names, data) = match &format.header {
        HeaderMode::Row(n) => {
            let Some((_, header)) = rows.get(*n) else {
                return Err(LoadError::SchemaMismatch {
                    path: path.to_path_buf(),
                    missing: required_columns(spec),
                    found: Vec::new(),
                });
            };
            (header.clone(), &rows[n + 1..])
        }
        HeaderMode::Names(names) => (names.clone(), &rows[..]),
    };
    let names = apply_aliases(names, &spec.aliases);

    let layout = ColumnLayout::resolve(path, &names, spec)?;
    let header_date = match &spec.timestamp {
        TimestampSpec::DateFromHeader { line, .. } => Some(header_date(path, text, *line)?),
        _ => None,
    };
    let file_hour = match &spec.timestamp {
        TimestampSpec::FileNameHour { offset, .. } => Some(
            time::file_name_hour(path, *offset)
                .ok_or_else(|| LoadError::parse(path, 0, "file name does not start with a YYYYmmddHH date"))?,
        ),
        _ => None,
    };

    let stride = format.row_stride.max(1);
    let mut records = Vec::with_capacity(data.len() / stride);
    let mut previous: Option<DateTime<Utc>> = None;

    for (line, fields) in data.iter().step_by(stride) {
        if format.min_fields > 0 && fields.len() < format.min_fields {
            warn!(
                "{}:{line}: skipping row with {} fields (need {})",
                path.display(),
                fields.len(),
                format.min_fields
            );
            continue;
        }
        if fields.len() < layout.required_width {
            return Err(LoadError::parse(
                path,
                *line,
                format!("expected at least {} fields, found {}", layout.required_width, fields.len()),
            ));
        }

        let mut ts = layout.timestamp(path, *line, fields, &spec.timestamp, header_date, file_hour)?;
        if spec.truncate_seconds {
            ts = time::truncate_to_minute(ts);
        }
        if let Some(prev) = previous {
            if ts < prev {
                return Err(LoadError::parse(
                    path,
                    *line,
                    format!("timestamp {ts} is earlier than the previous record ({prev})"),
                ));
            }
        }
        previous = Some(ts);

        let values = layout
            .schema
            .columns
            .iter()
            .zip(&layout.value_indices)
            .map(|(col, &idx)| {
                parse_value(&fields[idx], col).map_err(|msg| LoadError::parse(path, *line, msg))
            })
            .collect::<Result<Vec<_>>>()?;
        records.push(Record::new(ts, values));
    }

    Ok(Dataset::from_records(spec.name.clone(), layout.schema, records))
}

fn split_rows(text: &str, delimiter: Delimiter) -> Result<Vec<RawRow>> {
    match delimiter {
        Delimiter::Whitespace => Ok(text
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, l)| (i + 1, l.split_whitespace().map(str::to_string).collect()))
            .collect()),
        Delimiter::Byte(b) => {
            let mut reader = ReaderBuilder::new()
                .delimiter(b)
                .has_headers(false)
                .flexible(true)
                .trim(Trim::All)
                .from_reader(text.as_bytes());
            let mut rows = Vec::new();
            for result in reader.records() {
                let record = result?;
                let line = record.position().map(|p| p.line() as usize).unwrap_or(0);
                rows.push((line, record.iter().map(str::to_string).collect()));
            }
            Ok(rows)
        }
    }
}

fn apply_aliases(names: Vec<String>, aliases: &[(String, String)]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let target = aliases
            .iter()
            .find(|(from, _)| *from == name)
            .map(|(_, to)| to.clone())
            .filter(|to| !out.contains(to));
        out.push(target.unwrap_or(name));
    }
    out
}

fn required_columns(spec: &LoadSpec) -> Vec<String> {
    spec.timestamp
        .columns()
        .into_iter()
        .map(str::to_string)
        .chain(spec.schema.names().map(str::to_string))
        .collect()
}

fn header_date(path: &Path, text: &str, line: usize) -> Result<NaiveDate> {
    text.lines()
        .nth(line)
        .and_then(time::parse_date_line)
        .ok_or_else(|| LoadError::parse(path, line + 1, "expected a 'Y M D' date line"))
}

/// Field positions of the timestamp and schema columns in a data row.
struct ColumnLayout {
    /// Declared columns followed by any extra header columns.
    schema: Schema,
    ts_indices: Vec<usize>,
    value_indices: Vec<usize>,
    required_width: usize,
}

impl ColumnLayout {
    /// Match the header against the declared columns. Fails before any
    /// record is parsed when a declared column is absent.
    fn resolve(path: &Path, names: &[String], spec: &LoadSpec) -> Result<Self> {
        let find = |name: &str| names.iter().position(|h| h == name);

        let missing: Vec<String> = required_columns(spec)
            .into_iter()
            .filter(|c| find(c.as_str()).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::SchemaMismatch {
                path: path.to_path_buf(),
                missing,
                found: names.to_vec(),
            });
        }

        let ts_indices: Vec<usize> = spec.timestamp.columns().into_iter().filter_map(find).collect();
        let mut value_indices: Vec<usize> = spec.schema.names().filter_map(find).collect();
        let mut schema = spec.schema.clone();

        if let Some(extra) = &spec.extra {
            for (i, name) in names.iter().enumerate() {
                if ts_indices.contains(&i)
                    || value_indices.contains(&i)
                    || extra.ignore.contains(name)
                    || schema.index_of(name).is_some()
                {
                    continue;
                }
                schema.columns.push(ColumnSpec {
                    name: name.clone(),
                    kind: extra.kind,
                    unit: extra.unit.clone(),
                });
                value_indices.push(i);
            }
        }

        let ignored: Vec<&String> = names
            .iter()
            .enumerate()
            .filter(|(i, _)| !ts_indices.contains(i) && !value_indices.contains(i))
            .map(|(_, n)| n)
            .collect();
        if !ignored.is_empty() {
            debug!("{}: ignoring columns {ignored:?}", path.display());
        }

        let required_width = ts_indices
            .iter()
            .chain(&value_indices)
            .max()
            .map_or(0, |m| m + 1);
        Ok(ColumnLayout {
            schema,
            ts_indices,
            value_indices,
            required_width,
        })
    }

    fn timestamp(
        &self,
        path: &Path,
        line: usize,
        fields: &[String],
        spec: &TimestampSpec,
        header_date: Option<NaiveDate>,
        file_hour: Option<DateTime<Utc>>,
    ) -> Result<DateTime<Utc>> {
        let raw: Vec<&str> = self.ts_indices.iter().map(|&i| fields[i].as_str()).collect();
        let joined = raw.join(" ");
        let parsed = match spec {
            TimestampSpec::Format { format, .. } => time::parse_formatted(&joined, format),
            TimestampSpec::UnixSeconds { .. } => {
                joined.parse::<f64>().ok().and_then(time::unix_to_datetime)
            }
            TimestampSpec::MatlabDatenum { .. } => {
                joined.parse::<f64>().ok().and_then(time::datenum_to_datetime)
            }
            TimestampSpec::DateFromHeader { .. } => {
                header_date.and_then(|d| time::date_with_hour_minute(d, raw[0], raw[1]))
            }
            TimestampSpec::FileNameHour { .. } => joined
                .parse::<f64>()
                .ok()
                .filter(|m| (0.0..60.0).contains(m))
                .and_then(|m| file_hour.map(|h| h + Duration::minutes(m as i64))),
        };
        parsed.ok_or_else(|| LoadError::parse(path, line, format!("invalid timestamp '{joined}'")))
    }
}

/// Parse one field according to its declared kind.
fn parse_value(raw: &str, col: &ColumnSpec) -> std::result::Result<Value, String> {
    let s = raw.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("na") {
        return Ok(Value::Null);
    }
    let bad = || format!("column '{}': '{s}' is not a valid {:?}", col.name, col.kind);
    match col.kind {
        ColumnKind::Float => s.parse::<f64>().map(Value::Float).map_err(|_| bad()),
        ColumnKind::Integer => match s.parse::<i64>() {
            Ok(i) => Ok(Value::Integer(i)),
            Err(_) => match s.parse::<f64>() {
                Ok(f) if f.fract() == 0.0 => Ok(Value::Integer(f as i64)),
                _ => Err(bad()),
            },
        },
        ColumnKind::Bool => match s {
            "true" | "True" | "TRUE" | "1" => Ok(Value::Bool(true)),
            "false" | "False" | "FALSE" | "0" => Ok(Value::Bool(false)),
            _ => Err(bad()),
        },
        ColumnKind::Text => Ok(Value::Text(s.to_string())),
    }
}

fn check_time_order(path: &Path, stamps: impl Iterator<Item = (usize, DateTime<Utc>)>) -> Result<()> {
    let mut previous: Option<DateTime<Utc>> = None;
    for (line, ts) in stamps {
        if previous.is_some_and(|p| ts < p) {
            return Err(LoadError::parse(path, line, format!("timestamp {ts} is out of order")));
        }
        previous = Some(ts);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, `df.to_json(orient='records', date_format='iso')`):
///
/// ```json
/// [
///   { "datetime": "2014-02-15T00:01:00Z", "acc_nrt": 0.12, "status": 0 },
///   ...
/// ]
/// ```
///
/// Column kinds are inferred: all integers → integer, any other numbers →
/// float, booleans → bool, anything else → text.
fn load_json(path: &Path) -> Result<Dataset> {
    let text = read_text(path)?;
    let root: JsonValue = serde_json::from_str(&text)?;

    let rows = root
        .as_array()
        .ok_or_else(|| LoadError::parse(path, 0, "expected top-level JSON array"))?;

    let mut kinds: BTreeMap<String, Option<ColumnKind>> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        let obj = row
            .as_object()
            .ok_or_else(|| LoadError::parse(path, 0, format!("row {i} is not a JSON object")))?;
        for (key, val) in obj {
            if key == columnar::DATETIME_COLUMN {
                continue;
            }
            let kind = kinds.entry(key.clone()).or_insert(None);
            *kind = merge_kind(*kind, val);
        }
    }

    let schema = Schema::new(
        kinds
            .iter()
            .map(|(name, kind)| ColumnSpec::new(name, kind.unwrap_or(ColumnKind::Float)))
            .collect(),
    );

    let mut records = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        // Already checked to be objects above.
        let Some(obj) = row.as_object() else { continue };
        let ts = obj
            .get(columnar::DATETIME_COLUMN)
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| LoadError::parse(path, 0, format!("row {i}: missing or invalid 'datetime'")))?;
        let values = schema
            .columns
            .iter()
            .map(|col| json_to_value(obj.get(&col.name), col.kind))
            .collect();
        records.push(Record::new(ts, values));
    }

    let name = path.file_stem().and_then(|s| s.to_str()).unwrap_or("dataset");
    Ok(Dataset::from_records(name, schema, records))
}

fn merge_kind(current: Option<ColumnKind>, val: &JsonValue) -> Option<ColumnKind> {
    let seen = match val {
        JsonValue::Null => return current,
        JsonValue::Bool(_) => ColumnKind::Bool,
        JsonValue::Number(n) if n.is_i64() => ColumnKind::Integer,
        JsonValue::Number(_) => ColumnKind::Float,
        _ => ColumnKind::Text,
    };
    Some(match (current, seen) {
        (None, k) => k,
        (Some(a), b) if a == b => a,
        (Some(ColumnKind::Integer), ColumnKind::Float) | (Some(ColumnKind::Float), ColumnKind::Integer) => {
            ColumnKind::Float
        }
        _ => ColumnKind::Text,
    })
}

fn json_to_value(val: Option<&JsonValue>, kind: ColumnKind) -> Value {
    let Some(val) = val else {
        return Value::Null;
    };
    match (kind, val) {
        (_, JsonValue::Null) => Value::Null,
        (ColumnKind::Integer, JsonValue::Number(n)) => n.as_i64().map_or(Value::Null, Value::Integer),
        (ColumnKind::Float, JsonValue::Number(n)) => n.as_f64().map_or(Value::Null, Value::Float),
        (ColumnKind::Bool, JsonValue::Bool(b)) => Value::Bool(*b),
        (_, JsonValue::String(s)) => Value::Text(s.clone()),
        (_, other) => Value::Text(other.to_string()),
    }
}
