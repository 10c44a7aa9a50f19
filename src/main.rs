use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{ArrayRef, Float64Array, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand};

use baecc::data::resample::{self, Aggregation};
use baecc::data::{columnar, filter, stats};
use baecc::{CampaignConfig, Dataset, Instrument};

#[derive(Parser)]
#[command(name = "baecc", version, about = "Inspect BAECC campaign instrument data")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Per-column count, mean, std, min and max
    Summary(Source),
    /// Print the first records
    Head {
        #[command(flatten)]
        source: Source,
        #[arg(short, long, default_value_t = 10)]
        n: usize,
    },
    /// Write the loaded data to a Parquet file
    Export {
        #[command(flatten)]
        source: Source,
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Resample numeric columns onto a fixed grid and print them
    Resample {
        #[command(flatten)]
        source: Source,
        /// Bin width in minutes
        #[arg(long, default_value_t = 60)]
        minutes: i64,
        /// mean, sum, last or count
        #[arg(long, default_value = "mean", value_parser = parse_aggregation)]
        how: Aggregation,
    },
}

#[derive(Args)]
struct Source {
    /// pluvio200, pluvio400, pip_dsd, pip_part, pip_vel, jenoptik or hotplate
    #[arg(short, long)]
    instrument: Instrument,
    /// Campaign config (JSON); used with --date
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Date glob fragment matched against configured file patterns, e.g. 201402??
    #[arg(short, long)]
    date: Option<String>,
    /// Keep records from this time on (RFC 3339)
    #[arg(long)]
    start: Option<DateTime<Utc>>,
    /// Keep records up to this time (RFC 3339)
    #[arg(long)]
    end: Option<DateTime<Utc>>,
    /// Apply the instrument's data corrections
    #[arg(long)]
    good: bool,
    /// Data files; overrides --date
    files: Vec<PathBuf>,
}

fn parse_aggregation(s: &str) -> std::result::Result<Aggregation, String> {
    match s {
        "mean" => Ok(Aggregation::Mean),
        "sum" => Ok(Aggregation::Sum),
        "last" => Ok(Aggregation::Last),
        "count" => Ok(Aggregation::Count),
        other => Err(format!("unknown aggregation '{other}'")),
    }
}

impl Source {
    fn load(&self) -> Result<Dataset> {
        let files = if !self.files.is_empty() {
            self.files.clone()
        } else if let Some(date) = &self.date {
            let config = match &self.config {
                Some(path) => CampaignConfig::from_file(path)
                    .with_context(|| format!("reading config {}", path.display()))?,
                None => CampaignConfig::default(),
            };
            config.files_for(&self.instrument, date)?
        } else {
            bail!("give data files or --date");
        };
        if files.is_empty() {
            bail!("no {} files found", self.instrument);
        }

        let data = self
            .instrument
            .load(&files, self.start, self.end)
            .with_context(|| format!("loading {} data", self.instrument))?;
        Ok(if self.good {
            self.instrument.good_data(&data)
        } else {
            data
        })
    }
}

fn bin_width(minutes: i64) -> Result<Duration> {
    let Some(width) = Duration::try_minutes(minutes) else {
        bail!("--minutes {minutes} is out of range");
    };
    Ok(width)
}

fn summary_batch(dataset: &Dataset) -> Result<RecordBatch> {
    let summary = stats::describe(dataset);
    let schema = Arc::new(Schema::new(vec![
        Field::new("column", DataType::Utf8, false),
        Field::new("unit", DataType::Utf8, true),
        Field::new("count", DataType::UInt64, false),
        Field::new("mean", DataType::Float64, true),
        Field::new("std", DataType::Float64, true),
        Field::new("min", DataType::Float64, true),
        Field::new("max", DataType::Float64, true),
    ]));
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(summary.iter().map(|s| s.name.as_str()))),
        Arc::new(summary.iter().map(|s| s.unit.as_deref()).collect::<StringArray>()),
        Arc::new(UInt64Array::from_iter_values(summary.iter().map(|s| s.count as u64))),
        Arc::new(summary.iter().map(|s| s.mean).collect::<Float64Array>()),
        Arc::new(summary.iter().map(|s| s.std).collect::<Float64Array>()),
        Arc::new(summary.iter().map(|s| s.min).collect::<Float64Array>()),
        Arc::new(summary.iter().map(|s| s.max).collect::<Float64Array>()),
    ];
    Ok(RecordBatch::try_new(schema, columns)?)
}

fn print_dataset(dataset: &Dataset) -> Result<()> {
    let batch = columnar::to_record_batch(dataset)?;
    println!("{}", pretty_format_batches(&[batch])?);
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Summary(source) => {
            let data = source.load()?;
            println!(
                "{}: {} records, {} .. {}",
                data.name,
                data.len(),
                data.first_timestamp().map_or("-".into(), |t| t.to_string()),
                data.last_timestamp().map_or("-".into(), |t| t.to_string()),
            );
            println!("{}", pretty_format_batches(&[summary_batch(&data)?])?);
        }
        Command::Head { source, n } => {
            let data = source.load()?;
            let indices: Vec<usize> = (0..n.min(data.len())).collect();
            print_dataset(&filter::take(&data, &indices))?;
        }
        Command::Export { source, out } => {
            let data = source.load()?;
            columnar::write_parquet(&data, &out)
                .with_context(|| format!("writing {}", out.display()))?;
            println!("Wrote {} records of {} to {}", data.len(), data.name, out.display());
        }
        Command::Resample { source, minutes, how } => {
            let data = source.load()?;
            let Some(binned) = resample::resample(&data, bin_width(minutes)?, how) else {
                bail!("--minutes must be positive");
            };
            print_dataset(&binned)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_width_bounds() {
        assert_eq!(bin_width(15).unwrap(), Duration::minutes(15));
        assert!(bin_width(i64::MAX).is_err());
        assert!(bin_width(i64::MIN).is_err());
    }

    #[test]
    fn aggregation_names() {
        assert_eq!(parse_aggregation("sum").unwrap(), Aggregation::Sum);
        assert!(parse_aggregation("median").is_err());
    }
}
