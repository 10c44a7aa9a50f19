//! Writes one synthetic campaign day (2014-02-15, a six hour snowfall event)
//! for every instrument, laid out the way `CampaignConfig::default()` expects,
//! plus a `baecc.json` pointing at it.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use clap::Parser;

use baecc::instrument::HOTPLATE_COLUMNS;
use baecc::CampaignConfig;

#[derive(Parser)]
#[command(about = "Generate a synthetic BAECC campaign day")]
struct Args {
    /// Output directory
    #[arg(default_value = "sample_data")]
    out: PathBuf,
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

const DATE: &str = "20140215";
const DSD_BINS: [f64; 8] = [0.125, 0.375, 0.625, 0.875, 1.125, 1.375, 1.625, 1.875];

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

fn day_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2014, 2, 15, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Liquid water equivalent rate in mm/h: a bell-shaped event peaking at 05:00.
fn snowfall_rate(t: DateTime<Utc>) -> f64 {
    let hours = (t - day_start()).num_seconds() as f64 / 3600.0;
    let rate = 1.2 * (-(hours - 5.0).powi(2) / (2.0 * 1.2f64.powi(2))).exp();
    if rate < 0.01 {
        0.0
    } else {
        rate
    }
}

fn minutes() -> impl Iterator<Item = DateTime<Utc>> {
    (0..24 * 60).map(|m| day_start() + Duration::minutes(m))
}

fn write(dir: &Path, name: &str, text: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(name);
    fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

/// `;`-separated, every record written twice, timestamps a few seconds past
/// the minute.
fn pluvio(out: &Path, name: &str, gauge_noise: f64, rng: &mut SimpleRng) -> Result<PathBuf> {
    let mut text = String::new();
    let mut acc_tot = 0.0;
    let mut bucket = 112.4;
    for t in minutes() {
        let amount = snowfall_rate(t) / 60.0;
        acc_tot += amount;
        bucket += amount;
        let acc_rt = (amount + rng.gauss(0.0, gauge_noise)).max(0.0);
        let t_load = -8.0 + rng.gauss(0.0, 0.2);
        let stamp = (t + Duration::seconds(30)).format("%Y%m%d%H%M%S");
        let line = format!(
            "{stamp};{:.2};{acc_rt:.2};{amount:.2};{acc_tot:.2};{:.2};{bucket:.2};{t_load:.1};0;0;{:.1};23.9;{:.1}\n",
            amount * 60.0,
            bucket + rng.gauss(0.0, gauge_noise),
            t_load + 4.0,
            t_load + 1.5,
        );
        text.push_str(&line);
        text.push_str(&line);
    }
    let dir = out.join(format!("{}{}", &name[..1].to_ascii_uppercase(), &name[1..]));
    write(&dir, &format!("{name}_02_{DATE}.txt"), &text)
}

fn jenoptik(out: &Path, rng: &mut SimpleRng) -> Result<PathBuf> {
    let mut text = String::new();
    let mut depth = 0.41;
    for t in minutes() {
        // ~1 cm of snow per mm of water
        depth += snowfall_rate(t) / 60.0 / 100.0;
        writeln!(
            text,
            "{},{:.4},{:.0},{:.1}",
            t.format("%Y-%m-%d %H:%M:%S"),
            depth + 0.034 + rng.gauss(0.0, 0.001),
            95.0 + rng.gauss(0.0, 1.0),
            -8.0 + rng.gauss(0.0, 0.3),
        )?;
    }
    write(&out.join("Jenoptik"), &format!("{DATE}_snowdepth.csv"), &text)
}

fn hotplate(out: &Path, rng: &mut SimpleRng) -> Result<PathBuf> {
    let mut text = String::new();
    let mut acc = 0.0;
    for t in minutes() {
        let rate = (snowfall_rate(t) + rng.gauss(0.0, 0.02)).max(0.0);
        acc += rate / 60.0;
        let mut fields: Vec<String> = vec![
            t.format("%Y%m%d%H%M%S").to_string(),
            "100901".into(),
            "2.14".into(),
            "1".into(),
            "0".into(),
            t.timestamp().to_string(),
        ];
        // Housekeeping channels the loader does not declare.
        while fields.len() < HOTPLATE_COLUMNS.len() - 2 {
            fields.push(format!("{:.3}", rng.gauss(10.0, 1.0)));
        }
        fields[16] = format!("{:.1}", -8.0 + rng.gauss(0.0, 0.3));
        fields[19] = "0.0".into();
        fields[21] = format!("{:.1}", 1002.0 + rng.gauss(0.0, 0.5));
        fields[23] = format!("{:.0}", 92.0 + rng.gauss(0.0, 2.0));
        fields[24] = format!("{:.1}", (2.5 + rng.gauss(0.0, 0.8)).max(0.0));
        fields.push(format!("{rate:.3}"));
        fields.push(format!("{acc:.3}"));
        text.push_str(&fields.join(","));
        text.push('\n');
    }
    write(&out.join("Hotplate"), &format!("hot_plate_100901_{DATE}.txt"), &text)
}

/// Exponential size distribution N0 exp(-lambda D), one row per minute.
fn pip_dsd(out: &Path, rng: &mut SimpleRng) -> Result<PathBuf> {
    let mut text = String::new();
    text.push_str("PIP DSD table\nsite 004 Hyytiala\nvideo 380 fps\nbins 0.25 mm\n\n2014 2 15\n\n\n");
    text.push_str("dsd\nunits m-3 mm-1\n-----\n");
    let bins: Vec<String> = DSD_BINS.iter().map(|d| format!("{d:.3}")).collect();
    writeln!(text, "day_time\thr_d\tmin_d\tNum_d\tBin_cen\t{}", bins.join("\t"))?;
    for t in minutes() {
        let rate = snowfall_rate(t);
        let n0 = 2000.0 * rate;
        let lambda = 2.5 / (rate + 0.3);
        let conc: Vec<String> = DSD_BINS
            .iter()
            .map(|d| format!("{:.2}", (n0 * (-lambda * d).exp() * (1.0 + rng.gauss(0.0, 0.1))).max(0.0)))
            .collect();
        let total: f64 = conc.iter().filter_map(|c| c.parse::<f64>().ok()).sum();
        writeln!(
            text,
            "{:.5}\t{}\t{}\t{:.0}\t0\t{}",
            (t - day_start()).num_minutes() as f64 / 1440.0,
            t.format("%H"),
            t.format("%M"),
            total,
            conc.join("\t"),
        )?;
    }
    text.push_str("end of table\n");
    write(&out.join("PIP").join("a_DSD_Tables"), &format!("004{DATE}_a_d.dat"), &text)
}

fn pip_particles(out: &Path, rng: &mut SimpleRng) -> Result<PathBuf> {
    let mut text = String::new();
    for line in ["PIP particle table", "site 004", "", "", "", "", "", ""] {
        text.push_str(line);
        text.push('\n');
    }
    text.push_str("Year Month Day Hr Min Sec Part_ID Wad_Dia\n");
    text.push_str("- - - - - - - mm\n");
    let mut id = 0;
    for t in minutes() {
        let count = (snowfall_rate(t) * 20.0).round() as usize;
        for i in 0..count {
            id += 1;
            let sec = i * 60 / count;
            let dia = (-rng.next_f64().max(1e-9).ln() * 0.8).max(0.1);
            writeln!(
                text,
                "{} {} {} {} {} {sec} {id} {dia:.3}",
                t.format("%Y"),
                t.format("%m"),
                t.format("%d"),
                t.format("%H"),
                t.format("%M"),
            )?;
        }
    }
    write(&out.join("PIP").join("a_Particle_Tables"), &format!("004{DATE}2100_01_P.dat"), &text)
}

/// Velocity tables: one file per hour, several records per particle.
fn pip_velocity(out: &Path, rng: &mut SimpleRng) -> Result<PathBuf> {
    let dir = out.join("PIP").join("a_Velocity_Tables").join(format!("004{DATE}"));
    let mut last = dir.clone();
    let mut id = 0;
    for hour in 0..24 {
        let mut text = String::from("PIP velocity table\nsite 004\n\n\n\n\n\n\n");
        text.push_str("minute_p\tPart_ID\tRecNum\tWad_Dia\tvel_v_1\tvel_h_1\n");
        for minute in 0..60 {
            let t = day_start() + Duration::minutes(hour * 60 + minute);
            let count = (snowfall_rate(t) * 5.0).round() as usize;
            for _ in 0..count {
                id += 1;
                let dia = (-rng.next_f64().max(1e-9).ln() * 0.8).max(0.1);
                let fall = 0.9 * dia.powf(0.2);
                for rec in 1..=2 {
                    writeln!(
                        text,
                        "{minute}\t{id}\t{rec}\t{dia:.3}\t{:.3}\t{:.3}",
                        fall + rng.gauss(0.0, 0.05),
                        rng.gauss(0.0, 0.1),
                    )?;
                }
            }
        }
        text.push_str("end of table\n");
        last = write(&dir, &format!("004{DATE}{hour:02}_a_p_2.dat"), &text)?;
    }
    Ok(last)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut rng = SimpleRng::new(args.seed);

    let written = vec![
        pluvio(&args.out, "pluvio200", 0.02, &mut rng)?,
        pluvio(&args.out, "pluvio400", 0.01, &mut rng)?,
        jenoptik(&args.out, &mut rng)?,
        hotplate(&args.out, &mut rng)?,
        pip_dsd(&args.out, &mut rng)?,
        pip_particles(&args.out, &mut rng)?,
        pip_velocity(&args.out, &mut rng)?,
    ];

    let config = CampaignConfig {
        data_dir: args.out.clone(),
        cache_dir: args.out.join("cache"),
        ..CampaignConfig::default()
    };
    let config_path = args.out.join("baecc.json");
    fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;

    for path in &written {
        println!("Wrote {}", path.display());
    }
    println!(
        "Try: baecc summary -i pluvio200 -c {} -d {DATE}",
        config_path.display()
    );
    Ok(())
}
