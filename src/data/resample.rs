//! Fixed-interval resampling and joins on the time index.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use super::model::{ColumnKind, ColumnSpec, Dataset, Record, Schema, Value};

/// How the values inside one resampling bin are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Mean,
    Sum,
    /// Last non-missing value in the bin.
    Last,
    /// Number of non-missing values.
    Count,
}

/// Resample the numeric columns of `dataset` onto a regular grid.
///
/// Bins are closed on the right and labelled with their right edge, aligned
/// to multiples of `interval` since the epoch: a record at 00:05 falls in the
/// 00:05 bin of a 5 minute grid, one at 00:05:01 in the 00:10 bin. Every bin
/// from the first to the last label is emitted. Non-numeric columns are
/// dropped. Returns `None` for a non-positive interval.
pub fn resample(dataset: &Dataset, interval: Duration, how: Aggregation) -> Option<Dataset> {
    let step = interval.num_microseconds().filter(|s| *s > 0)?;

    let numeric: Vec<(usize, &ColumnSpec)> = dataset
        .schema
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| matches!(c.kind, ColumnKind::Float | ColumnKind::Integer))
        .collect();
    let schema = Schema::new(
        numeric
            .iter()
            .map(|(_, c)| match how {
                Aggregation::Count => ColumnSpec::new(&c.name, ColumnKind::Integer),
                _ => ColumnSpec {
                    name: c.name.clone(),
                    kind: ColumnKind::Float,
                    unit: c.unit.clone(),
                },
            })
            .collect(),
    );

    // label (µs since epoch) → per-column accumulators
    let mut bins: BTreeMap<i64, Vec<Accumulator>> = BTreeMap::new();
    for record in dataset.records() {
        let label = bin_label(record.timestamp().timestamp_micros(), step);
        let accs = bins
            .entry(label)
            .or_insert_with(|| vec![Accumulator::default(); numeric.len()]);
        for (acc, (idx, _)) in accs.iter_mut().zip(&numeric) {
            if let Some(v) = record.values()[*idx].as_f64() {
                acc.push(v);
            }
        }
    }

    let (Some(&first), Some(&last)) = (bins.keys().next(), bins.keys().next_back()) else {
        return Some(Dataset::empty(dataset.name.clone(), schema));
    };

    let empty = vec![Accumulator::default(); numeric.len()];
    let mut records = Vec::with_capacity(((last - first) / step + 1) as usize);
    let mut label = first;
    while label <= last {
        let accs = bins.get(&label).unwrap_or(&empty);
        let values = accs.iter().map(|a| a.finish(how)).collect();
        if let Some(ts) = DateTime::from_timestamp_micros(label) {
            records.push(Record::new(ts, values));
        }
        label += step;
    }

    Some(Dataset::from_records(dataset.name.clone(), schema, records))
}

/// Right edge of the bin containing `micros`.
fn bin_label(micros: i64, step: i64) -> i64 {
    let q = micros.div_euclid(step);
    if micros.rem_euclid(step) == 0 {
        q * step
    } else {
        (q + 1) * step
    }
}

#[derive(Debug, Clone, Default)]
struct Accumulator {
    sum: f64,
    count: i64,
    last: Option<f64>,
}

impl Accumulator {
    fn push(&mut self, v: f64) {
        self.sum += v;
        self.count += 1;
        self.last = Some(v);
    }

    fn finish(&self, how: Aggregation) -> Value {
        match how {
            Aggregation::Sum => Value::Float(self.sum),
            Aggregation::Count => Value::Integer(self.count),
            Aggregation::Mean if self.count > 0 => Value::Float(self.sum / self.count as f64),
            Aggregation::Mean => Value::Null,
            Aggregation::Last => self.last.map_or(Value::Null, Value::Float),
        }
    }
}

/// Average records sharing a timestamp and a value of `key`.
///
/// Output is sorted by (timestamp, key). Other numeric columns become float
/// means over their non-missing cells; other columns keep their first value.
/// Returns `None` if `key` is not a column.
pub fn mean_by(dataset: &Dataset, key: &str) -> Option<Dataset> {
    let key_idx = dataset.column_index(key)?;
    let numeric: Vec<bool> = dataset
        .schema
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| i != key_idx && matches!(c.kind, ColumnKind::Float | ColumnKind::Integer))
        .collect();

    let mut groups: BTreeMap<(DateTime<Utc>, Value), (Vec<Accumulator>, &Record)> = BTreeMap::new();
    for record in dataset.records() {
        let group_key = (record.timestamp(), record.values()[key_idx].clone());
        let (accs, _) = groups
            .entry(group_key)
            .or_insert_with(|| (vec![Accumulator::default(); numeric.len()], record));
        for ((acc, value), &is_num) in accs.iter_mut().zip(record.values()).zip(&numeric) {
            if let (true, Some(v)) = (is_num, value.as_f64()) {
                acc.push(v);
            }
        }
    }

    let mut schema = dataset.schema.clone();
    for (col, &is_num) in schema.columns.iter_mut().zip(&numeric) {
        if is_num {
            col.kind = ColumnKind::Float;
        }
    }
    let records = groups
        .into_iter()
        .map(|((ts, _), (accs, first))| {
            let values = accs
                .iter()
                .zip(first.values())
                .zip(&numeric)
                .map(|((acc, v), &is_num)| if is_num { acc.finish(Aggregation::Mean) } else { v.clone() })
                .collect();
            Record::new(ts, values)
        })
        .collect();
    Some(Dataset::from_records(dataset.name.clone(), schema, records))
}

// ---------------------------------------------------------------------------
// Joins
// ---------------------------------------------------------------------------

/// Inner join of two datasets on identical timestamps.
///
/// Right-hand columns whose name is already used on the left get a
/// `_right` suffix. Left record order is kept; several right records with
/// the same timestamp each produce a row.
pub fn merge(left: &Dataset, right: &Dataset) -> Dataset {
    let mut columns = left.schema.columns.clone();
    for col in &right.schema.columns {
        let mut col = col.clone();
        while columns.iter().any(|c| c.name == col.name) {
            col.name = format!("{}_right", col.name);
        }
        columns.push(col);
    }

    let mut by_time: BTreeMap<DateTime<Utc>, Vec<&Record>> = BTreeMap::new();
    for r in right.records() {
        by_time.entry(r.timestamp()).or_default().push(r);
    }

    let mut records = Vec::new();
    for l in left.records() {
        let Some(matches) = by_time.get(&l.timestamp()) else {
            continue;
        };
        for r in matches {
            let mut values = l.values().to_vec();
            values.extend_from_slice(r.values());
            records.push(Record::new(l.timestamp(), values));
        }
    }

    Dataset::from_records(left.name.clone(), Schema::new(columns), records)
}

/// Merge any number of datasets pairwise, left to right.
pub fn merge_all(datasets: &[&Dataset]) -> Option<Dataset> {
    let (first, rest) = datasets.split_first()?;
    Some(rest.iter().fold((*first).clone(), |acc, ds| merge(&acc, ds)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 2, 15, h, m, s).unwrap()
    }

    fn amounts(rows: &[(DateTime<Utc>, Option<f64>)]) -> Dataset {
        let schema = Schema::new(vec![
            ColumnSpec::float("amount", "mm"),
            ColumnSpec::new("status", ColumnKind::Text),
        ]);
        let records = rows
            .iter()
            .map(|&(t, v)| Record::new(t, vec![v.map_or(Value::Null, Value::Float), Value::Text("ok".into())]))
            .collect();
        Dataset::from_records("pluvio200", schema, records)
    }

    #[test]
    fn bins_are_right_closed_and_right_labelled() {
        let ds = amounts(&[
            (ts(0, 5, 0), Some(1.0)),
            (ts(0, 5, 1), Some(2.0)),
            (ts(0, 9, 0), Some(3.0)),
            (ts(0, 21, 0), Some(4.0)),
        ]);
        let r = resample(&ds, Duration::minutes(5), Aggregation::Sum).unwrap();
        assert_eq!(
            r.timestamps(),
            vec![ts(0, 5, 0), ts(0, 10, 0), ts(0, 15, 0), ts(0, 20, 0), ts(0, 25, 0)]
        );
        assert_eq!(
            r.column("amount").unwrap(),
            vec![Some(1.0), Some(5.0), Some(0.0), Some(0.0), Some(4.0)]
        );
        // text columns are dropped, units kept
        assert_eq!(r.schema.len(), 1);
        assert_eq!(r.schema.columns[0].unit.as_deref(), Some("mm"));
    }

    #[test]
    fn sum_preserves_total() {
        let rows: Vec<_> = (0..60).map(|m| (ts(1, m, 30), Some(0.1))).collect();
        let ds = amounts(&rows);
        let r = resample(&ds, Duration::minutes(15), Aggregation::Sum).unwrap();
        let total: f64 = r.column("amount").unwrap().into_iter().flatten().sum();
        assert!((total - 6.0).abs() < 1e-9);
    }

    #[test]
    fn mean_last_count_skip_missing() {
        let ds = amounts(&[(ts(0, 1, 0), Some(1.0)), (ts(0, 2, 0), None), (ts(0, 3, 0), Some(3.0))]);
        let mean = resample(&ds, Duration::minutes(10), Aggregation::Mean).unwrap();
        assert_eq!(mean.column("amount").unwrap(), vec![Some(2.0)]);
        let last = resample(&ds, Duration::minutes(10), Aggregation::Last).unwrap();
        assert_eq!(last.column("amount").unwrap(), vec![Some(3.0)]);
        let count = resample(&ds, Duration::minutes(10), Aggregation::Count).unwrap();
        assert_eq!(count.values("amount").unwrap(), vec![&Value::Integer(2)]);
        assert!(resample(&ds, Duration::zero(), Aggregation::Sum).is_none());
    }

    #[test]
    fn merge_on_shared_timestamps() {
        let a = amounts(&[(ts(0, 1, 0), Some(1.0)), (ts(0, 2, 0), Some(2.0))]);
        let b = amounts(&[(ts(0, 2, 0), Some(20.0)), (ts(0, 3, 0), Some(30.0))]);
        let m = merge(&a, &b);
        assert_eq!(m.len(), 1);
        assert_eq!(m.schema.names().collect::<Vec<_>>(), vec!["amount", "status", "amount_right", "status_right"]);
        assert_eq!(m.column("amount_right").unwrap(), vec![Some(20.0)]);
        assert_eq!(merge_all(&[&a, &b, &b]).unwrap().len(), 1);
        assert!(merge_all(&[]).is_none());
    }

    #[test]
    fn mean_per_minute_and_particle() {
        let schema = Schema::new(vec![
            ColumnSpec::new("Part_ID", ColumnKind::Integer),
            ColumnSpec::float("vel_v", "m s-1"),
        ]);
        let row = |m: u32, id: i64, v: Option<f64>| {
            Record::new(ts(0, m, 0), vec![Value::Integer(id), v.map_or(Value::Null, Value::Float)])
        };
        let ds = Dataset::from_records(
            "pip_vel",
            schema,
            vec![
                row(1, 7, Some(1.0)),
                row(1, 3, Some(0.5)),
                row(1, 7, Some(2.0)),
                row(1, 7, None),
                row(2, 7, Some(4.0)),
            ],
        );
        let m = mean_by(&ds, "Part_ID").unwrap();
        assert_eq!(m.values("Part_ID").unwrap(), vec![&Value::Integer(3), &Value::Integer(7), &Value::Integer(7)]);
        assert_eq!(m.column("vel_v").unwrap(), vec![Some(0.5), Some(1.5), Some(4.0)]);
        assert_eq!(m.timestamps(), vec![ts(0, 1, 0), ts(0, 1, 0), ts(0, 2, 0)]);
        assert!(mean_by(&ds, "RecNum").is_none());
    }
}
