//! Load-or-compute cache of datasets, stored as Parquet files under
//! `<root>/<start>-<end>/[extra dirs]/<name>.parquet`.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::data::columnar;
use crate::data::model::Dataset;
use crate::error::Result;

const SPAN_FORMAT: &str = "%Y%m%d%H%M";
const EXT: &str = "parquet";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cache {
    pub root: PathBuf,
    pub enabled: bool,
}

impl Cache {
    pub fn new(root: impl Into<PathBuf>, enabled: bool) -> Self {
        Cache {
            root: root.into(),
            enabled,
        }
    }

    /// Directory for one time span, created if missing.
    pub fn span_dir(&self, start: DateTime<Utc>, end: DateTime<Utc>, extra: &[&str]) -> Result<PathBuf> {
        let mut dir = self.root.join(format!(
            "{}-{}",
            start.format(SPAN_FORMAT),
            end.format(SPAN_FORMAT)
        ));
        for part in extra {
            dir.push(part);
        }
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Path of a cached dataset inside `dir`.
    pub fn entry_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.{EXT}"))
    }

    /// Read `name` from `dir` if cached, otherwise run `compute` and store
    /// its result. A disabled cache always computes and never writes.
    pub fn get_or_load<F>(&self, dir: &Path, name: &str, compute: F) -> Result<Dataset>
    where
        F: FnOnce() -> Result<Dataset>,
    {
        if !self.enabled {
            return compute();
        }
        let path = Cache::entry_path(dir, name);
        if path.exists() {
            debug!("cache hit {}", path.display());
            return columnar::read_parquet(&path);
        }
        let dataset = compute()?;
        columnar::write_parquet(&dataset, &path)?;
        info!("cached '{}' ({} records) at {}", name, dataset.len(), path.display());
        Ok(dataset)
    }

    /// Remove a cached entry; missing entries are fine.
    pub fn invalidate(&self, dir: &Path, name: &str) -> Result<()> {
        match fs::remove_file(Cache::entry_path(dir, name)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{ColumnSpec, Record, Schema, Value};
    use chrono::TimeZone;
    use std::cell::Cell;

    fn span() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2014, 2, 15, 21, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2014, 2, 16, 3, 0, 0).unwrap(),
        )
    }

    fn dataset() -> Dataset {
        let (t, _) = span();
        Dataset::from_records(
            "pluvio200",
            Schema::new(vec![ColumnSpec::float("acc_nrt", "mm")]),
            vec![Record::new(t, vec![Value::Float(0.3)])],
        )
    }

    #[test]
    fn span_dir_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Cache::new(tmp.path(), true);
        let (s, e) = span();
        let dir = cache.span_dir(s, e, &["pluvio200"]).unwrap();
        assert_eq!(dir, tmp.path().join("201402152100-201402160300").join("pluvio200"));
        assert!(dir.is_dir());
    }

    #[test]
    fn computes_once_then_reads() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Cache::new(tmp.path(), true);
        let calls = Cell::new(0);
        let load = || {
            calls.set(calls.get() + 1);
            Ok(dataset())
        };
        let first = cache.get_or_load(tmp.path(), "acc", load).unwrap();
        let second = cache.get_or_load(tmp.path(), "acc", load).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(first, second);

        cache.invalidate(tmp.path(), "acc").unwrap();
        cache.invalidate(tmp.path(), "acc").unwrap();
        cache.get_or_load(tmp.path(), "acc", load).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn disabled_cache_never_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Cache::new(tmp.path(), false);
        cache.get_or_load(tmp.path(), "acc", || Ok(dataset())).unwrap();
        assert!(!Cache::entry_path(tmp.path(), "acc").exists());
    }
}
