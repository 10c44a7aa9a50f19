//! Precipitation events (cases) listed in a CSV file.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use log::info;

use crate::data::filter;
use crate::data::loader::open_error;
use crate::data::model::Dataset;
use crate::data::time::parse_formatted;
use crate::error::{LoadError, Result};

/// One event: a closed time span plus whatever descriptive columns the
/// event list carries (e.g. `paper`, `comment`).
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attributes: BTreeMap<String, String>,
}

impl Event {
    /// Records of `dataset` inside the event span.
    pub fn slice(&self, dataset: &Dataset) -> Dataset {
        filter::between(dataset, Some(self.start), Some(self.end))
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Event list sorted by (start, end).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventsCollection {
    pub events: Vec<Event>,
}

impl EventsCollection {
    /// Read events from a CSV file with `start` and `end` columns written in
    /// the chrono format `dtformat` (e.g. `%Y %d %B %H UTC`).
    ///
    /// Each start is moved one second later so that back-to-back events do
    /// not share their boundary sample. A format without a year field
    /// (e.g. `%d %B %H UTC`) places events in year
    /// [`DEFAULT_YEAR`](crate::data::time::DEFAULT_YEAR).
    pub fn from_csv(path: &Path, dtformat: &str) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| open_error(path, e))?;
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(file);
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

        let position = |name: &str| headers.iter().position(|h| h == name);
        let (Some(start_idx), Some(end_idx)) = (position("start"), position("end")) else {
            return Err(LoadError::SchemaMismatch {
                path: path.to_path_buf(),
                missing: ["start", "end"]
                    .iter()
                    .filter(|c| position(**c).is_none())
                    .map(|c| c.to_string())
                    .collect(),
                found: headers.clone(),
            });
        };

        let mut events = Vec::new();
        for result in reader.records() {
            let record = result?;
            let line = record.position().map_or(0, |p| p.line() as usize);
            let parse = |idx: usize| {
                let raw = record.get(idx).unwrap_or("");
                parse_formatted(raw, dtformat)
                    .ok_or_else(|| LoadError::parse(path, line, format!("'{raw}' does not match '{dtformat}'")))
            };
            let start = parse(start_idx)? + Duration::seconds(1);
            let end = parse(end_idx)?;

            let attributes = headers
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != start_idx && *i != end_idx)
                .filter_map(|(i, h)| record.get(i).map(|v| (h.clone(), v.to_string())))
                .collect();
            events.push(Event { start, end, attributes });
        }

        events.sort_by_key(|e| (e.start, e.end));
        info!("read {} events from {}", events.len(), path.display());
        Ok(EventsCollection { events })
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// From the first start to the last end, widened by `margin` both ways.
    pub fn span(&self, margin: Duration) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.events.iter().map(|e| e.start).min()?;
        let end = self.events.iter().map(|e| e.end).max()?;
        Some((start - margin, end + margin))
    }

    /// One dataset per event, in event order.
    pub fn slices(&self, dataset: &Dataset) -> Vec<Dataset> {
        self.events.iter().map(|e| e.slice(dataset)).collect()
    }

    /// Append another collection, keeping the sort order.
    pub fn extend(&mut self, other: EventsCollection) {
        self.events.extend(other.events);
        self.events.sort_by_key(|e| (e.start, e.end));
    }
}
