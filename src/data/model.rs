use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Value – a single cell of a measurement column
// ---------------------------------------------------------------------------

/// A dynamically-typed measurement value.
/// Using `BTreeMap` / `BTreeSet` downstream so `Value` must be `Ord`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

// -- Manual Eq/Ord so we can put Value in BTreeSet --

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                Text(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Text(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Null => {}
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v:.4}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "<null>"),
        }
    }
}

impl Value {
    /// Numeric view of the value; NaN floats read as missing.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) if v.is_nan() => None,
            Value::Float(v) => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Schema – declared columns with types and units
// ---------------------------------------------------------------------------

/// Storage type of a measurement column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Float,
    Integer,
    Text,
    Bool,
}

/// One declared column: name, type, and physical unit (if any).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: &str, kind: ColumnKind) -> Self {
        ColumnSpec {
            name: name.to_string(),
            kind,
            unit: None,
        }
    }

    pub fn float(name: &str, unit: &str) -> Self {
        ColumnSpec::new(name, ColumnKind::Float).with_unit(unit)
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }
}

/// Ordered set of columns, declared once per dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<ColumnSpec>,
}

impl Schema {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Schema { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

// ---------------------------------------------------------------------------
// Record – one observation
// ---------------------------------------------------------------------------

/// A single observation: a timestamp plus one value per schema column.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    timestamp: DateTime<Utc>,
    values: Vec<Value>,
}

impl Record {
    pub fn new(timestamp: DateTime<Utc>, values: Vec<Value>) -> Self {
        Record { timestamp, values }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }
}

// ---------------------------------------------------------------------------
// Dataset – the complete loaded table
// ---------------------------------------------------------------------------

/// A named, time-indexed table of measurement records.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub schema: Schema,
    records: Vec<Record>,
}

impl Dataset {
    /// Build a dataset from records that already follow `schema`.
    pub fn from_records(name: impl Into<String>, schema: Schema, records: Vec<Record>) -> Self {
        debug_assert!(records.iter().all(|r| r.values.len() == schema.len()));
        Dataset {
            name: name.into(),
            schema,
            records,
        }
    }

    pub fn empty(name: impl Into<String>, schema: Schema) -> Self {
        Dataset::from_records(name, schema, Vec::new())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schema.index_of(name)
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.records.iter().map(|r| r.timestamp).collect()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.records.first().map(|r| r.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.records.last().map(|r| r.timestamp)
    }

    /// Raw values of one column, in record order.
    pub fn values(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.records.iter().map(|r| &r.values[idx]).collect())
    }

    /// Numeric view of one column; non-numeric and missing cells are `None`.
    pub fn column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let idx = self.column_index(name)?;
        Some(self.records.iter().map(|r| r.values[idx].as_f64()).collect())
    }

    /// For each column the sorted set of distinct values.
    pub fn unique_values(&self) -> BTreeMap<String, BTreeSet<Value>> {
        let mut unique: BTreeMap<String, BTreeSet<Value>> = BTreeMap::new();
        for (idx, col) in self.schema.columns.iter().enumerate() {
            let set = unique.entry(col.name.clone()).or_default();
            for r in &self.records {
                set.insert(r.values[idx].clone());
            }
        }
        unique
    }

    /// Same records under a different name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Keep only the named columns, in the given order. Unknown names are skipped.
    pub fn select(&self, columns: &[&str]) -> Dataset {
        let picks: Vec<usize> = columns
            .iter()
            .filter_map(|c| self.column_index(c))
            .collect();
        let schema = Schema::new(picks.iter().map(|&i| self.schema.columns[i].clone()).collect());
        let records = self
            .records
            .iter()
            .map(|r| Record::new(r.timestamp, picks.iter().map(|&i| r.values[i].clone()).collect()))
            .collect();
        Dataset::from_records(self.name.clone(), schema, records)
    }

    /// Return a copy where numeric cells of `name` are transformed by `f`.
    /// The column becomes a float column. Non-numeric cells are left as they are.
    pub fn map_column<F>(&self, name: &str, f: F) -> Dataset
    where
        F: Fn(DateTime<Utc>, f64) -> f64,
    {
        let Some(idx) = self.column_index(name) else {
            return self.clone();
        };
        let mut schema = self.schema.clone();
        schema.columns[idx].kind = ColumnKind::Float;
        let records = self
            .records
            .iter()
            .map(|r| {
                let mut values = r.values.clone();
                if let Some(v) = values[idx].as_f64() {
                    values[idx] = Value::Float(f(r.timestamp, v));
                }
                Record::new(r.timestamp, values)
            })
            .collect();
        Dataset::from_records(self.name.clone(), schema, records)
    }
}
