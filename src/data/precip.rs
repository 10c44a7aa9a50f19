//! Precipitation accumulation, amount and intensity.

use chrono::{DateTime, Duration, Utc};

use super::model::{ColumnKind, ColumnSpec, Dataset, Record, Schema, Value};

/// Longest timestep an amount is spread over when computing intensity.
pub const MAX_TIMESTEP_MINUTES: i64 = 60;

/// Per-timestep amount (mm) from an accumulation column: difference to the
/// previous record. The first record, and any next to a missing value, is missing.
pub fn amount_from_acc(dataset: &Dataset, acc_column: &str) -> Option<Dataset> {
    let acc = dataset.column(acc_column)?;
    let mut prev: Option<f64> = None;
    let values = acc
        .into_iter()
        .map(|cur| {
            let v = match (prev, cur) {
                (Some(p), Some(c)) => Value::Float(c - p),
                _ => Value::Null,
            };
            prev = cur;
            v
        })
        .collect();
    Some(single_column(dataset, "amount", unit_of(dataset, acc_column), values))
}

/// Running total (mm) of an amount column. Missing amounts stay missing and
/// do not reset the total.
pub fn acc_from_amount(dataset: &Dataset, amount_column: &str) -> Option<Dataset> {
    let amount = dataset.column(amount_column)?;
    let mut total = 0.0;
    let values = amount
        .into_iter()
        .map(|a| match a {
            Some(v) => {
                total += v;
                Value::Float(total)
            }
            None => Value::Null,
        })
        .collect();
    Some(single_column(dataset, "acc", unit_of(dataset, amount_column), values))
}

/// Intensity (mm/h) from an amount column.
///
/// With a fixed `timestep` every amount is scaled by `1 h / timestep`. Without
/// one, each amount is spread over the time since the previous record, capped
/// at [`MAX_TIMESTEP_MINUTES`]; the first record uses the cap.
pub fn intensity(dataset: &Dataset, amount_column: &str, timestep: Option<Duration>) -> Option<Dataset> {
    let amount = dataset.column(amount_column)?;
    let cap = Duration::minutes(MAX_TIMESTEP_MINUTES);
    let stamps = dataset.timestamps();

    let values = amount
        .iter()
        .enumerate()
        .map(|(i, a)| {
            let step = match timestep {
                Some(step) => step,
                None if i == 0 => cap,
                None => (stamps[i] - stamps[i - 1]).min(cap),
            };
            let step_secs = step.num_milliseconds() as f64 / 1000.0;
            match a {
                Some(v) if step_secs > 0.0 => Value::Float(v * 3600.0 / step_secs),
                _ => Value::Null,
            }
        })
        .collect();
    Some(single_column(dataset, "intensity", Some("mm h-1".to_string()), values))
}

/// Sums of `n` consecutive positive amounts, labelled with the last
/// timestamp of each group. Zero, negative and missing amounts are skipped;
/// a trailing incomplete group is dropped. `None` if the column is unknown or
/// `n` is zero.
pub fn combined_amount(dataset: &Dataset, amount_column: &str, n: usize) -> Option<Dataset> {
    let idx = dataset.column_index(amount_column)?;
    if n == 0 {
        return None;
    }
    let positive: Vec<(DateTime<Utc>, f64)> = dataset
        .records()
        .iter()
        .filter_map(|r| {
            r.values()[idx]
                .as_f64()
                .filter(|v| *v > 0.0)
                .map(|v| (r.timestamp(), v))
        })
        .collect();
    let records = positive
        .chunks_exact(n)
        .map(|group| {
            let sum: f64 = group.iter().map(|(_, v)| v).sum();
            Record::new(group[n - 1].0, vec![Value::Float(sum)])
        })
        .collect();
    let schema = float_schema("amount", unit_of(dataset, amount_column));
    Some(Dataset::from_records(dataset.name.clone(), schema, records))
}

/// One record per minute from the first to the last timestamp, missing
/// minutes linearly interpolated. Values before the first known one stay
/// missing; values after the last known one repeat it.
pub fn interpolate_minutes(dataset: &Dataset, column: &str) -> Option<Dataset> {
    let idx = dataset.column_index(column)?;
    let unit = unit_of(dataset, column);
    let (Some(first), Some(last)) = (dataset.first_timestamp(), dataset.last_timestamp()) else {
        return Some(Dataset::empty(dataset.name.clone(), float_schema(column, unit)));
    };
    let minutes = usize::try_from((last - first).num_minutes()).unwrap_or(0);
    let mut grid: Vec<Option<f64>> = vec![None; minutes + 1];
    for record in dataset.records() {
        let offset = record.timestamp() - first;
        if offset.num_seconds() % 60 != 0 {
            continue;
        }
        let slot = usize::try_from(offset.num_minutes())
            .ok()
            .and_then(|i| grid.get_mut(i));
        if let (Some(slot), Some(v)) = (slot, record.values()[idx].as_f64()) {
            *slot = Some(v);
        }
    }

    let known: Vec<usize> = (0..grid.len()).filter(|&i| grid[i].is_some()).collect();
    for pair in known.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let (Some(va), Some(vb)) = (grid[a], grid[b]) else {
            continue;
        };
        for i in a + 1..b {
            grid[i] = Some(va + (vb - va) * (i - a) as f64 / (b - a) as f64);
        }
    }
    if let Some(&tail) = known.last() {
        let v = grid[tail];
        for slot in &mut grid[tail + 1..] {
            *slot = v;
        }
    }

    let records = grid
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            Record::new(
                first + Duration::minutes(i as i64),
                vec![v.map_or(Value::Null, Value::Float)],
            )
        })
        .collect();
    Some(Dataset::from_records(dataset.name.clone(), float_schema(column, unit), records))
}

/// Accumulation that never decreases: every drop (evaporation, emptying)
/// is added back to all later values. Missing values stay missing and do
/// not break the running correction.
pub fn monotone_acc(dataset: &Dataset, acc_column: &str) -> Option<Dataset> {
    let acc = dataset.column(acc_column)?;
    let mut prev: Option<f64> = None;
    let mut lost = 0.0;
    let values = acc
        .into_iter()
        .map(|cur| {
            let Some(c) = cur else {
                return Value::Null;
            };
            if let Some(p) = prev {
                if c < p {
                    lost += p - c;
                }
            }
            prev = Some(c);
            Value::Float(c + lost)
        })
        .collect();
    Some(single_column(dataset, "acc", unit_of(dataset, acc_column), values))
}

fn float_schema(name: &str, unit: Option<String>) -> Schema {
    let mut spec = ColumnSpec::new(name, ColumnKind::Float);
    spec.unit = unit;
    Schema::new(vec![spec])
}

fn unit_of(dataset: &Dataset, column: &str) -> Option<String> {
    dataset.schema.get(column).and_then(|c| c.unit.clone())
}

fn single_column(dataset: &Dataset, name: &str, unit: Option<String>, values: Vec<Value>) -> Dataset {
    let records = dataset
        .records()
        .iter()
        .zip(values)
        .map(|(r, v)| Record::new(r.timestamp(), vec![v]))
        .collect();
    Dataset::from_records(dataset.name.clone(), float_schema(name, unit), records)
}
