use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Duration, Utc};

use super::model::{ColumnKind, Dataset, Record, Value};

// ---------------------------------------------------------------------------
// Time span
// ---------------------------------------------------------------------------

/// Records with `start <= timestamp <= end`. Either bound may be open.
pub fn between(dataset: &Dataset, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Dataset {
    let indices: Vec<usize> = dataset
        .records()
        .iter()
        .enumerate()
        .filter(|(_, r)| {
            let ts = r.timestamp();
            start.map_or(true, |s| ts >= s) && end.map_or(true, |e| ts <= e)
        })
        .map(|(i, _)| i)
        .collect();
    take(dataset, &indices)
}

/// Stable sort by timestamp.
pub fn sort_by_time(dataset: &Dataset) -> Dataset {
    let mut records = dataset.records().to_vec();
    records.sort_by_key(Record::timestamp);
    Dataset::from_records(dataset.name.clone(), dataset.schema.clone(), records)
}

/// Append `other` to `base`. Both must share a schema; returns `None` otherwise.
pub fn concat(base: &Dataset, other: &Dataset) -> Option<Dataset> {
    if base.schema != other.schema {
        return None;
    }
    let mut records = base.records().to_vec();
    records.extend_from_slice(other.records());
    Some(Dataset::from_records(base.name.clone(), base.schema.clone(), records))
}

/// Remove records identical (timestamp and every value) to an earlier one.
pub fn drop_duplicates(dataset: &Dataset) -> Dataset {
    let mut seen: HashSet<(DateTime<Utc>, &[Value])> = HashSet::new();
    let indices: Vec<usize> = dataset
        .records()
        .iter()
        .enumerate()
        .filter(|(_, r)| seen.insert((r.timestamp(), r.values())))
        .map(|(i, _)| i)
        .collect();
    take(dataset, &indices)
}

/// Records at the given positions, in the given order.
pub fn take(dataset: &Dataset, indices: &[usize]) -> Dataset {
    let records = indices
        .iter()
        .filter_map(|&i| dataset.records().get(i).cloned())
        .collect();
    Dataset::from_records(dataset.name.clone(), dataset.schema.clone(), records)
}

/// Records whose numeric value in `column` satisfies `keep`. Missing and
/// non-numeric cells are dropped; an unknown column keeps nothing.
pub fn retain<F>(dataset: &Dataset, column: &str, keep: F) -> Dataset
where
    F: Fn(f64) -> bool,
{
    let Some(idx) = dataset.column_index(column) else {
        return Dataset::empty(dataset.name.clone(), dataset.schema.clone());
    };
    let indices: Vec<usize> = dataset
        .records()
        .iter()
        .enumerate()
        .filter(|(_, r)| r.values()[idx].as_f64().is_some_and(&keep))
        .map(|(i, _)| i)
        .collect();
    take(dataset, &indices)
}

/// Move every timestamp by `offset`.
pub fn shift(dataset: &Dataset, offset: Duration) -> Dataset {
    let records = dataset
        .records()
        .iter()
        .map(|r| Record::new(r.timestamp() + offset, r.values().to_vec()))
        .collect();
    Dataset::from_records(dataset.name.clone(), dataset.schema.clone(), records)
}

/// Replace missing cells of float and integer columns with `value`. An
/// integer column becomes a float column if `value` is not whole.
pub fn fill_nulls(dataset: &Dataset, value: f64) -> Dataset {
    let whole = value.fract() == 0.0;
    let mut schema = dataset.schema.clone();
    for col in schema.columns.iter_mut().filter(|c| c.kind == ColumnKind::Integer) {
        if !whole {
            col.kind = ColumnKind::Float;
        }
    }
    let fills: Vec<Option<Value>> = schema
        .columns
        .iter()
        .map(|c| match c.kind {
            ColumnKind::Float => Some(Value::Float(value)),
            ColumnKind::Integer => Some(Value::Integer(value as i64)),
            _ => None,
        })
        .collect();
    let records = dataset
        .records()
        .iter()
        .map(|r| {
            let values = r
                .values()
                .iter()
                .zip(&fills)
                .map(|(v, fill)| match (v, fill) {
                    (Value::Null, Some(fill)) => fill.clone(),
                    (other, _) => other.clone(),
                })
                .collect();
            Record::new(r.timestamp(), values)
        })
        .collect();
    Dataset::from_records(dataset.name.clone(), schema, records)
}

// ---------------------------------------------------------------------------
// Value selection: which unique values are selected per column
// ---------------------------------------------------------------------------

/// Per-column selection state: maps column_name → set of selected values.
/// If a column is absent it means "no filter" (show all).
pub type FilterState = BTreeMap<String, BTreeSet<Value>>;

/// Initialise a [`FilterState`] with all values selected (i.e., keep everything).
pub fn init_filter_state(dataset: &Dataset) -> FilterState {
    dataset.unique_values()
}

/// Return indices of records that pass all active filters.
///
/// A record passes a column filter when:
/// * The column is not present in `filters` → passes (no constraint)
/// * The filter set for that column is empty → nothing selected → fails
/// * The record's value for that column is in the selected set → passes
pub fn filtered_indices(dataset: &Dataset, filters: &FilterState) -> Vec<usize> {
    let active: Vec<(usize, &BTreeSet<Value>)> = filters
        .iter()
        .filter_map(|(col, selected)| dataset.column_index(col).map(|i| (i, selected)))
        .collect();

    dataset
        .records()
        .iter()
        .enumerate()
        .filter(|(_, r)| active.iter().all(|(i, selected)| selected.contains(&r.values()[*i])))
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{ColumnKind, ColumnSpec, Schema};
    use chrono::TimeZone;

    fn ts(min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 2, 15, 0, min, 0).unwrap()
    }

    fn dataset(rows: &[(u32, i64)]) -> Dataset {
        let schema = Schema::new(vec![ColumnSpec::new("status", ColumnKind::Integer)]);
        let records = rows
            .iter()
            .map(|&(m, s)| Record::new(ts(m), vec![Value::Integer(s)]))
            .collect();
        Dataset::from_records("pip", schema, records)
    }

    #[test]
    fn span_is_inclusive() {
        let ds = dataset(&[(0, 0), (1, 0), (2, 1), (3, 1)]);
        let cut = between(&ds, Some(ts(1)), Some(ts(2)));
        assert_eq!(cut.timestamps(), vec![ts(1), ts(2)]);
        assert_eq!(between(&ds, None, Some(ts(0))).len(), 1);
        assert_eq!(between(&ds, Some(ts(5)), None).len(), 0);
    }

    #[test]
    fn duplicates_and_sorting() {
        let ds = dataset(&[(2, 0), (1, 0), (2, 0), (2, 1)]);
        let unique = drop_duplicates(&ds);
        assert_eq!(unique.len(), 3);
        let sorted = sort_by_time(&unique);
        assert_eq!(sorted.timestamps(), vec![ts(1), ts(2), ts(2)]);
        assert_eq!(sorted.records()[1].values(), &[Value::Integer(0)]);
    }

    #[test]
    fn concat_requires_same_schema() {
        let a = dataset(&[(0, 0)]);
        let b = dataset(&[(1, 1)]);
        assert_eq!(concat(&a, &b).unwrap().len(), 2);
        let other = Dataset::empty("x", Schema::default());
        assert!(concat(&a, &other).is_none());
    }

    #[test]
    fn retain_shift_and_fill() {
        let ds = dataset(&[(0, 0), (1, 3), (2, 5)]);
        let kept = retain(&ds, "status", |s| s > 1.0);
        assert_eq!(kept.timestamps(), vec![ts(1), ts(2)]);
        assert!(retain(&ds, "nope", |_| true).is_empty());

        let later = shift(&ds, Duration::minutes(2));
        assert_eq!(later.first_timestamp(), Some(ts(2)));
        assert_eq!(later.records()[0].values(), ds.records()[0].values());

        let schema = Schema::new(vec![
            ColumnSpec::float("n", "m-3 mm-1"),
            ColumnSpec::new("note", ColumnKind::Text),
        ]);
        let gappy = Dataset::from_records(
            "pip_dsd",
            schema,
            vec![Record::new(ts(0), vec![Value::Null, Value::Null])],
        );
        let filled = fill_nulls(&gappy, 0.0);
        assert_eq!(filled.records()[0].values(), &[Value::Float(0.0), Value::Null]);
    }

    #[test]
    fn value_selection() {
        let ds = dataset(&[(0, 0), (1, 1), (2, 2)]);
        let mut filters = init_filter_state(&ds);
        assert_eq!(filtered_indices(&ds, &filters), vec![0, 1, 2]);
        filters.get_mut("status").unwrap().remove(&Value::Integer(1));
        assert_eq!(filtered_indices(&ds, &filters), vec![0, 2]);
        filters.insert("status".into(), BTreeSet::new());
        assert!(filtered_indices(&ds, &filters).is_empty());
    }
}
