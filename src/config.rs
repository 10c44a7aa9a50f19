//! Campaign configuration: where the raw data and the cache live, and how
//! each instrument's files are named.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::cache::Cache;
use crate::data::loader::open_error;
use crate::error::Result;
use crate::instrument::Instrument;

/// Placeholder replaced by the date pattern in file patterns.
pub const DATE_PLACEHOLDER: &str = "{date}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub use_cache: bool,
    /// Instrument name → glob pattern relative to `data_dir`.
    pub patterns: BTreeMap<String, String>,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let patterns = [
            ("pluvio200", "Pluvio200/pluvio200_??_{date}*.txt"),
            ("pluvio400", "Pluvio400/pluvio400_??_{date}*.txt"),
            ("pip_dsd", "PIP/a_DSD_Tables/004{date}_a_d.dat"),
            ("pip_part", "PIP/a_Particle_Tables/004{date}*.dat"),
            ("pip_vel", "PIP/a_Velocity_Tables/004{date}/*2.dat"),
            ("jenoptik", "Jenoptik/{date}*"),
            ("hotplate", "Hotplate/hot_plate_100901_{date}*"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        CampaignConfig {
            data_dir: PathBuf::from("../DATA"),
            cache_dir: PathBuf::from("cache"),
            use_cache: true,
            patterns,
        }
    }
}

impl CampaignConfig {
    /// Read a JSON config. Missing keys take their default values.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| open_error(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn cache(&self) -> Cache {
        Cache::new(&self.cache_dir, self.use_cache)
    }

    /// Files of `instrument` whose names match `date_pattern` (a glob
    /// fragment such as `20140215` or `20140[2-3]??`), sorted by path.
    /// Instruments without a configured pattern match nothing.
    pub fn files_for(&self, instrument: &Instrument, date_pattern: &str) -> Result<Vec<PathBuf>> {
        let Some(pattern) = self.patterns.get(instrument.name()) else {
            return Ok(Vec::new());
        };
        let full = self
            .data_dir
            .join(pattern.replace(DATE_PLACEHOLDER, date_pattern));
        let full = full.to_string_lossy();
        let mut files: Vec<PathBuf> = glob::glob(&full)?.filter_map(|entry| entry.ok()).collect();
        files.sort();
        debug!("{} files match {}", files.len(), full);
        Ok(files)
    }
}
