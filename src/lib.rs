//! Tools for reading and exploring BAECC snowfall campaign data.
//!
//! Raw instrument files are parsed by [`data::loader`] into time-indexed
//! [`Dataset`]s following the layouts in [`instrument`]. Datasets can be cut
//! to event spans ([`events`]), resampled, merged, summarised, and cached as
//! Parquet ([`cache`]).

pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod instrument;

pub use config::CampaignConfig;
pub use data::model::{ColumnKind, ColumnSpec, Dataset, Record, Schema, Value};
pub use error::{LoadError, Result};
pub use instrument::Instrument;
