use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, Field, Float64Type, Int64Type, Schema as ArrowSchema, TimeUnit,
    TimestampMicrosecondType,
};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use log::debug;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use super::model::{ColumnKind, ColumnSpec, Dataset, Record, Schema, Value};
use crate::error::{LoadError, Result};

/// Name of the timestamp column in exported tables.
pub const DATETIME_COLUMN: &str = "datetime";
const UNIT_KEY: &str = "unit";
const DATASET_KEY: &str = "dataset";

// ---------------------------------------------------------------------------
// Dataset → Arrow
// ---------------------------------------------------------------------------

/// Convert a dataset to a single Arrow record batch.
///
/// The first column is `datetime` (UTC, microseconds); every schema column
/// follows, with its unit stored in the field metadata.
pub fn to_record_batch(dataset: &Dataset) -> Result<RecordBatch> {
    let mut fields = vec![Field::new(
        DATETIME_COLUMN,
        DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        false,
    )];
    let micros: Vec<i64> = dataset
        .records()
        .iter()
        .map(|r| r.timestamp().timestamp_micros())
        .collect();
    let mut columns: Vec<ArrayRef> =
        vec![Arc::new(TimestampMicrosecondArray::from(micros).with_timezone("UTC"))];

    for (idx, spec) in dataset.schema.columns.iter().enumerate() {
        let cells = dataset.records().iter().map(|r| &r.values()[idx]);
        let (data_type, array): (DataType, ArrayRef) = match spec.kind {
            ColumnKind::Float => (
                DataType::Float64,
                Arc::new(cells.map(Value::as_f64).collect::<Float64Array>()),
            ),
            ColumnKind::Integer => (
                DataType::Int64,
                Arc::new(
                    cells
                        .map(|v| match v {
                            Value::Integer(i) => Some(*i),
                            _ => None,
                        })
                        .collect::<Int64Array>(),
                ),
            ),
            ColumnKind::Bool => (
                DataType::Boolean,
                Arc::new(
                    cells
                        .map(|v| match v {
                            Value::Bool(b) => Some(*b),
                            _ => None,
                        })
                        .collect::<BooleanArray>(),
                ),
            ),
            ColumnKind::Text => (
                DataType::Utf8,
                Arc::new(
                    cells
                        .map(|v| match v {
                            Value::Null => None,
                            other => Some(other.to_string()),
                        })
                        .collect::<StringArray>(),
                ),
            ),
        };
        let mut field = Field::new(&spec.name, data_type, true);
        if let Some(unit) = &spec.unit {
            field = field.with_metadata(HashMap::from([(UNIT_KEY.to_string(), unit.clone())]));
        }
        fields.push(field);
        columns.push(array);
    }

    let schema = ArrowSchema::new(fields).with_metadata(HashMap::from([(
        DATASET_KEY.to_string(),
        dataset.name.clone(),
    )]));
    Ok(RecordBatch::try_new(Arc::new(schema), columns)?)
}

// ---------------------------------------------------------------------------
// Arrow → Dataset
// ---------------------------------------------------------------------------

/// Build a dataset from record batches of `arrow_schema`.
///
/// Requires a `datetime` timestamp column; numeric columns become float or
/// integer columns, strings become text, booleans stay booleans. With no
/// batches the dataset is empty but keeps the columns, units and name the
/// schema declares.
pub fn from_record_batches(
    path: &Path,
    fallback_name: &str,
    arrow_schema: &ArrowSchema,
    batches: &[RecordBatch],
) -> Result<Dataset> {
    let name = arrow_schema
        .metadata()
        .get(DATASET_KEY)
        .cloned()
        .unwrap_or_else(|| fallback_name.to_string());

    let ts_idx = arrow_schema.index_of(DATETIME_COLUMN).map_err(|_| LoadError::SchemaMismatch {
        path: path.to_path_buf(),
        missing: vec![DATETIME_COLUMN.to_string()],
        found: arrow_schema.fields().iter().map(|f| f.name().clone()).collect(),
    })?;

    let mut specs = Vec::new();
    let mut col_indices = Vec::new();
    for (i, field) in arrow_schema.fields().iter().enumerate() {
        if i == ts_idx {
            continue;
        }
        let Some(kind) = column_kind(field.data_type()) else {
            debug!("{}: skipping column '{}' of type {:?}", path.display(), field.name(), field.data_type());
            continue;
        };
        specs.push(ColumnSpec {
            name: field.name().clone(),
            kind,
            unit: field.metadata().get(UNIT_KEY).cloned(),
        });
        col_indices.push(i);
    }

    let mut records = Vec::new();
    for batch in batches {
        let timestamps = timestamp_column(path, batch.column(ts_idx))?;
        let columns: Vec<(ColumnKind, ArrayRef)> = specs
            .iter()
            .zip(&col_indices)
            .map(|(spec, &i)| Ok((spec.kind, normalise(batch.column(i), spec.kind)?)))
            .collect::<Result<_>>()?;

        for (row, ts) in timestamps.into_iter().enumerate() {
            let values = columns
                .iter()
                .map(|(kind, col)| cell(col, *kind, row))
                .collect();
            records.push(Record::new(ts, values));
        }
    }

    Ok(Dataset::from_records(name, Schema::new(specs), records))
}

fn column_kind(data_type: &DataType) -> Option<ColumnKind> {
    match data_type {
        DataType::Float16 | DataType::Float32 | DataType::Float64 => Some(ColumnKind::Float),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => Some(ColumnKind::Integer),
        DataType::Utf8 | DataType::LargeUtf8 => Some(ColumnKind::Text),
        DataType::Boolean => Some(ColumnKind::Bool),
        _ => None,
    }
}

/// Cast a column to the one Arrow type used per kind.
fn normalise(col: &ArrayRef, kind: ColumnKind) -> Result<ArrayRef> {
    let target = match kind {
        ColumnKind::Float => DataType::Float64,
        ColumnKind::Integer => DataType::Int64,
        ColumnKind::Text => DataType::Utf8,
        ColumnKind::Bool => DataType::Boolean,
    };
    Ok(cast(col, &target)?)
}

fn cell(col: &ArrayRef, kind: ColumnKind, row: usize) -> Value {
    if col.is_null(row) {
        return Value::Null;
    }
    match kind {
        ColumnKind::Float => {
            let v = col.as_primitive::<Float64Type>().value(row);
            if v.is_nan() {
                Value::Null
            } else {
                Value::Float(v)
            }
        }
        ColumnKind::Integer => Value::Integer(col.as_primitive::<Int64Type>().value(row)),
        ColumnKind::Text => Value::Text(col.as_string::<i32>().value(row).to_string()),
        ColumnKind::Bool => Value::Bool(col.as_boolean().value(row)),
    }
}

fn timestamp_column(path: &Path, col: &ArrayRef) -> Result<Vec<DateTime<Utc>>> {
    let DataType::Timestamp(_, tz) = col.data_type() else {
        return Err(LoadError::parse(
            path,
            0,
            format!("'{DATETIME_COLUMN}' must be a timestamp column, got {:?}", col.data_type()),
        ));
    };
    let micros = cast(col, &DataType::Timestamp(TimeUnit::Microsecond, tz.clone()))?;
    let micros = micros.as_primitive::<TimestampMicrosecondType>();
    (0..micros.len())
        .map(|row| {
            if micros.is_null(row) {
                return Err(LoadError::parse(path, 0, format!("null timestamp in row {row}")));
            }
            DateTime::from_timestamp_micros(micros.value(row))
                .ok_or_else(|| LoadError::parse(path, 0, format!("timestamp out of range in row {row}")))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parquet files
// ---------------------------------------------------------------------------

/// Write a dataset to a Parquet file, replacing any existing file.
pub fn write_parquet(dataset: &Dataset, path: &Path) -> Result<()> {
    let batch = to_record_batch(dataset)?;
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    debug!("wrote {} records of '{}' to {}", dataset.len(), dataset.name, path.display());
    Ok(())
}

/// Read a dataset previously written by [`write_parquet`] (or any Parquet
/// file with a `datetime` timestamp column).
pub fn read_parquet(path: &Path) -> Result<Dataset> {
    let file = File::open(path).map_err(|e| super::loader::open_error(path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    // Zero-row files yield no batches; the schema still describes the columns.
    let arrow_schema = builder.schema().clone();
    let reader = builder.build()?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    let fallback = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset");
    from_record_batches(path, fallback, &arrow_schema, &batches)
}
