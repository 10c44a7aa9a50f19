//! Integration tests for loading campaign instrument files.

use std::path::{Path, PathBuf};

use baecc::cache::Cache;
use baecc::data::loader::{self, Delimiter, DelimitedFormat, LoadSpec};
use baecc::data::model::{ColumnKind, ColumnSpec, Schema, Value};
use baecc::data::resample::{self, Aggregation};
use baecc::data::time::TimestampSpec;
use baecc::data::{columnar, precip};
use baecc::events::EventsCollection;
use baecc::{CampaignConfig, Instrument, LoadError};
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2014, 2, 15, h, m, s).unwrap()
}

fn write(dir: &Path, rel: &str, body: &str) -> PathBuf {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, body).unwrap();
    path
}

fn pluvio_line(t: &str, acc_nrt: f64, acc_tot: f64) -> String {
    let line = format!("{t};0.00;{acc_nrt:.2};{acc_nrt:.2};{acc_tot:.2};112.40;112.40;-8.1;0;0;-4.0;23.9;-6.5\n");
    format!("{line}{line}")
}

fn depth_spec() -> LoadSpec {
    LoadSpec::new(
        "depth",
        DelimitedFormat::with_header(Delimiter::Byte(b',')),
        TimestampSpec::format(&["time"], "%Y-%m-%d %H:%M:%S"),
        Schema::new(vec![
            ColumnSpec::float("depth", "m"),
            ColumnSpec::new("flag", ColumnKind::Integer),
        ]),
    )
}

#[test]
fn test_records_in_file_order() {
    let tmp = TempDir::new().unwrap();
    let path = write(
        tmp.path(),
        "depth.csv",
        "time,depth,flag\n\
         2014-02-15 00:00:00,0.41,0\n\
         2014-02-15 00:01:00,nan,0\n\
         2014-02-15 00:01:00,0.43,1\n",
    );
    let ds = loader::load_file(&path, &depth_spec()).unwrap();
    assert_eq!(ds.len(), 3);
    assert_eq!(ds.timestamps(), vec![utc(0, 0, 0), utc(0, 1, 0), utc(0, 1, 0)]);
    assert_eq!(ds.column("depth").unwrap(), vec![Some(0.41), None, Some(0.43)]);
    assert_eq!(ds.values("flag").unwrap()[2], &Value::Integer(1));
}

#[test]
fn test_missing_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nope.csv");
    match loader::load_file(&path, &depth_spec()) {
        Err(LoadError::MissingFile(p)) => assert_eq!(p, path),
        other => panic!("expected MissingFile, got {other:?}"),
    }
    assert!(matches!(loader::load_path(&tmp.path().join("nope.parquet")), Err(LoadError::MissingFile(_))));
}

#[test]
fn test_schema_mismatch_before_parsing() {
    let tmp = TempDir::new().unwrap();
    // The data row is garbage: a schema error must win over a parse error.
    let path = write(tmp.path(), "depth.csv", "time,depth\nnot a time,not a number\n");
    match loader::load_file(&path, &depth_spec()) {
        Err(LoadError::SchemaMismatch { missing, found, .. }) => {
            assert_eq!(missing, vec!["flag".to_string()]);
            assert_eq!(found, vec!["time".to_string(), "depth".to_string()]);
        }
        other => panic!("expected SchemaMismatch, got {other:?}"),
    }
}

#[test]
fn test_reload_is_identical() {
    let tmp = TempDir::new().unwrap();
    let path = write(
        tmp.path(),
        "Pluvio200/pluvio200_02_20140215.txt",
        &(pluvio_line("20140215000030", 0.0, 0.0) + &pluvio_line("20140215000130", 0.1, 0.1)),
    );
    let inst = Instrument::pluvio_from_path(&path);
    let first = inst.load(&[&path], None, None).unwrap();
    let second = inst.load(&[&path], None, None).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_pluvio_file() {
    let tmp = TempDir::new().unwrap();
    let path = write(
        tmp.path(),
        "Pluvio400/pluvio400_02_20140215.txt",
        &(pluvio_line("20140215000012", 0.0, 3.0)
            + &pluvio_line("20140215000112", 0.05, 3.05)
            + &pluvio_line("20140215000212", 0.1, 3.15)),
    );
    let inst = Instrument::pluvio_from_path(&path);
    assert_eq!(inst.name(), "pluvio400");

    let ds = inst.load(&[&path], None, None).unwrap();
    assert_eq!(ds.name, "pluvio400");
    // Duplicated lines collapse to one record each, seconds dropped.
    assert_eq!(ds.timestamps(), vec![utc(0, 0, 0), utc(0, 1, 0), utc(0, 2, 0)]);
    assert_eq!(ds.column("acc_tot_nrt").unwrap(), vec![Some(3.0), Some(3.05), Some(3.15)]);
    assert_eq!(ds.values("status").unwrap()[0], &Value::Integer(0));
    assert!(ds.schema.get("i_rt").is_none());
    assert_eq!(ds.schema.get("acc_nrt").unwrap().unit.as_deref(), Some("mm"));

    let cut = inst.load(&[&path], Some(utc(0, 1, 0)), None).unwrap();
    assert_eq!(cut.len(), 2);

    let acc = precip::acc_from_amount(&ds, "acc_nrt").unwrap();
    let last = acc.column("acc").unwrap().last().copied().flatten().unwrap();
    assert!((last - 0.15).abs() < 1e-9);
}

#[test]
fn test_load_files_across_days() {
    let tmp = TempDir::new().unwrap();
    let day2 = write(tmp.path(), "Pluvio200/pluvio200_02_20140216.txt", &pluvio_line("20140216000030", 0.2, 5.2));
    let day1 = write(tmp.path(), "Pluvio200/pluvio200_02_20140215.txt", &pluvio_line("20140215235930", 0.1, 5.0));

    let ds = Instrument::pluvio("pluvio200").load(&[&day2, &day1], None, None).unwrap();
    assert_eq!(ds.len(), 2);
    assert_eq!(ds.first_timestamp(), Some(utc(23, 59, 0)));
    assert_eq!(ds.column("acc_tot_nrt").unwrap(), vec![Some(5.0), Some(5.2)]);
}

#[test]
fn test_pip_dsd_file() {
    let tmp = TempDir::new().unwrap();
    let body = "PIP DSD\nsite 004\n\n\n\n2014 2 15\n\n\n\
                dsd\nunits\n-----\n\
                day_time\thr_d\tmin_d\tNum_d\tBin_cen\t0.125\t0.375\t0.625\n\
                0.0\t0\t0\t3\t0\t4.0\t2.0\t1.0\n\
                0.0\t0\t0\t3\t0\t4.0\t2.0\t1.0\n\
                0.0014\t0\t2\t2\t0\t6.0\tnan\t0.5\n\
                footer\n";
    let path = write(tmp.path(), "PIP/a_DSD_Tables/00420140215_a_d.dat", body);

    let ds = Instrument::PipDsd.load(&[&path], None, None).unwrap();
    assert_eq!(ds.schema.names().collect::<Vec<_>>(), vec!["0.125", "0.375", "0.625"]);
    // The repeated minute is dropped; the missing one is filled with zeros.
    assert_eq!(ds.timestamps(), vec![utc(0, 0, 0), utc(0, 1, 0), utc(0, 2, 0)]);
    assert_eq!(ds.column("0.375").unwrap(), vec![Some(2.0), Some(0.0), Some(0.0)]);

    let good = Instrument::PipDsd.good_data(&ds);
    assert_eq!(good.schema.names().collect::<Vec<_>>(), vec!["0.375", "0.625"]);
    assert_eq!(good.column("0.625").unwrap(), vec![Some(2.0), Some(0.0), Some(1.0)]);
}

#[test]
fn test_pip_particle_file() {
    let tmp = TempDir::new().unwrap();
    let body = "PIP particle table\nsite 004\n\n\n\n\n\n\n\
                Year Month Day Hr Min Sec Part_ID Wad_Dia\n\
                - - - - - - - mm\n\
                2014 2 15 5 0 1 1 0.82\n\
                2014 2 15 5 0 7 2 1.3\n";
    let path = write(tmp.path(), "PIP/a_Particle_Tables/004201402152100_01_P.dat", body);
    let ds = Instrument::PipParticle.load(&[&path], None, None).unwrap();
    assert_eq!(ds.timestamps(), vec![utc(5, 0, 1), utc(5, 0, 7)]);
    assert_eq!(ds.values("Part_ID").unwrap(), vec![&Value::Integer(1), &Value::Integer(2)]);
    assert_eq!(ds.column("Wad_Dia").unwrap(), vec![Some(0.82), Some(1.3)]);
}

#[test]
fn test_jenoptik_file() {
    let tmp = TempDir::new().unwrap();
    let path = write(
        tmp.path(),
        "Jenoptik/20140215_snowdepth.csv",
        "2014-02-15 00:00:00,0.4440,95,-8.1\n2014-02-15 00:01:00,0.4450,94,-8.2\n",
    );
    let ds = Instrument::Jenoptik.load(&[&path], None, None).unwrap();
    let good = Instrument::Jenoptik.good_data(&ds);
    let depth = good.column("snow_depth").unwrap();
    assert!((depth[0].unwrap() - 0.41).abs() < 1e-9);
    assert!((depth[1].unwrap() - 0.411).abs() < 1e-9);
}

#[test]
fn test_hotplate_short_rows_skipped() {
    let tmp = TempDir::new().unwrap();
    let row = |stamp: &str, rate: &str, acc: &str| {
        let mut fields = vec![stamp.to_string(), "100901".into(), "2.14".into(), "1".into(), "0".into()];
        fields.extend((5..35).map(|i| format!("{i}.0")));
        fields.push(rate.into());
        fields.push(acc.into());
        fields.join(",")
    };
    let body = format!(
        "{}\n20140215000100,100901,reboot\n{}\n",
        row("20140215000000", "0.5", "0.01"),
        row("20140215000200", "0.7", "0.03"),
    );
    let path = write(tmp.path(), "Hotplate/hot_plate_100901_20140215.txt", &body);
    let ds = Instrument::Hotplate.load(&[&path], None, None).unwrap();
    assert_eq!(ds.len(), 2);
    assert_eq!(ds.column("rate").unwrap(), vec![Some(0.5), Some(0.7)]);
    assert_eq!(ds.column("t_ambient").unwrap(), vec![Some(16.0), Some(16.0)]);
}

#[test]
fn test_config_discovery_and_hourly_totals() {
    let tmp = TempDir::new().unwrap();
    let mut body = String::new();
    let mut acc = 0.0;
    for m in 0..120 {
        acc += 0.01;
        let t = utc(0, 0, 0) + Duration::minutes(m);
        body.push_str(&pluvio_line(&t.format("%Y%m%d%H%M%S").to_string(), 0.01, acc));
    }
    write(tmp.path(), "Pluvio200/pluvio200_02_20140215.txt", &body);
    let config = CampaignConfig {
        data_dir: tmp.path().to_path_buf(),
        ..CampaignConfig::default()
    };
    let inst: Instrument = "pluvio200".parse().unwrap();
    let files = config.files_for(&inst, "20140215").unwrap();
    assert_eq!(files.len(), 1);

    let ds = inst.load(&files, None, None).unwrap();
    let hourly = resample::resample(&ds, Duration::hours(1), Aggregation::Sum).unwrap();
    let sums = hourly.column("acc_nrt").unwrap();
    // Right-closed bins: 00:00 alone falls in the bin labelled 00:00.
    assert_eq!(hourly.first_timestamp(), Some(utc(0, 0, 0)));
    let total: f64 = sums.iter().flatten().sum();
    assert!((total - 1.2).abs() < 1e-9);
}

#[test]
fn test_event_cache_round_trip() {
    let tmp = TempDir::new().unwrap();
    let path = write(
        tmp.path(),
        "Pluvio200/pluvio200_02_20140215.txt",
        &(pluvio_line("20140215000030", 0.0, 0.0)
            + &pluvio_line("20140215010030", 0.1, 0.1)
            + &pluvio_line("20140215020030", 0.2, 0.3)),
    );
    let events = write(tmp.path(), "events.csv", "start,end\n2014 15 February 00 UTC,2014 15 February 02 UTC\n");
    let events = EventsCollection::from_csv(&events, "%Y %d %B %H UTC").unwrap();
    let (start, end) = events.span(Duration::zero()).unwrap();

    let cache = Cache::new(tmp.path().join("cache"), true);
    let dir = cache.span_dir(start, end, &[]).unwrap();
    let inst = Instrument::pluvio("pluvio200");
    let loaded = cache
        .get_or_load(&dir, inst.name(), || inst.load(&[&path], Some(start), Some(end)))
        .unwrap();
    assert_eq!(loaded.timestamps(), vec![utc(1, 0, 0), utc(2, 0, 0)]);

    // Second read comes from Parquet and must not touch the raw file.
    std::fs::remove_file(&path).unwrap();
    let cached = cache
        .get_or_load(&dir, inst.name(), || inst.load(&[&path], Some(start), Some(end)))
        .unwrap();
    assert_eq!(cached, loaded);
    assert_eq!(columnar::read_parquet(&Cache::entry_path(&dir, "pluvio200")).unwrap(), loaded);
}

#[test]
fn test_empty_event_cache_round_trip() {
    let tmp = TempDir::new().unwrap();
    let path = write(
        tmp.path(),
        "Pluvio200/pluvio200_02_20140215.txt",
        &pluvio_line("20140215000030", 0.0, 0.0),
    );
    let start = utc(5, 0, 0);
    let end = utc(6, 0, 0);
    let cache = Cache::new(tmp.path().join("cache"), true);
    let dir = cache.span_dir(start, end, &[]).unwrap();
    let inst = Instrument::pluvio("pluvio200");
    let loaded = cache
        .get_or_load(&dir, inst.name(), || inst.load(&[&path], Some(start), Some(end)))
        .unwrap();
    assert!(loaded.is_empty());

    std::fs::remove_file(&path).unwrap();
    let cached = cache
        .get_or_load(&dir, inst.name(), || inst.load(&[&path], Some(start), Some(end)))
        .unwrap();
    assert!(cached.is_empty());
    assert_eq!(cached.name, "pluvio200");
    assert_eq!(cached.schema, loaded.schema);
}

#[test]
fn test_pip_velocity_discovery() {
    let tmp = TempDir::new().unwrap();
    let body = "PIP velocity table\n\n\n\n\n\n\n\n\
                minute_p\tPart_ID\tRecNum\tWad_Dia\tvel_v_2\tvel_h_2\n\
                0\t1\t1\t0.9\t1.1\t0.1\n\
                1\t2\t1\t0.2\t0.7\t0.1\n\
                footer\n";
    write(tmp.path(), "PIP/a_Velocity_Tables/00420140215/0042014021505_a_p_2.dat", body);
    let config = CampaignConfig {
        data_dir: tmp.path().to_path_buf(),
        ..CampaignConfig::default()
    };
    let files = config.files_for(&Instrument::PipVelocity, "20140215").unwrap();
    assert_eq!(files.len(), 1);

    let ds = Instrument::PipVelocity.load(&files, None, None).unwrap();
    assert_eq!(ds.timestamps(), vec![utc(5, 0, 0), utc(5, 1, 0)]);
    assert_eq!(ds.column("vel_v").unwrap(), vec![Some(1.1), Some(0.7)]);
    let good = Instrument::PipVelocity.good_data(&ds);
    assert_eq!(good.values("Part_ID").unwrap(), vec![&Value::Integer(1)]);
}
