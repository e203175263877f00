//! Integration tests for TsFile
//!
//! These tests drive the writer, the reader and the query layer together
//! through real files on disk.

use std::path::{Path as FsPath, PathBuf};

use proptest::prelude::*;
use tempfile::TempDir;

use tsfile_common::error::codes::*;
use tsfile_common::types::{DataType, Path, Timestamp, Value};
use tsfile_query::{pull, Executor, Expression, Operator, ResultSet};
use tsfile_storage::{
    ColumnSchema, DeviceSchema, TableSchema, Tablet, TsFileContext, TsFileReader, TsRecord, TsFileWriter,
};

const START: Timestamp = 16_225_600;

/// Write `devices` x `measurements` int64 series; row `r` holds `r` at `START + r`
fn write_grid(path: &FsPath, devices: usize, measurements: usize, rows: usize) {
    let ctx = TsFileContext::default();
    let mut writer = TsFileWriter::open(&ctx, path).expect("Failed to open writer");

    for d in 0..devices {
        let device = format!("device{d}");
        let columns: Vec<ColumnSchema> = (0..measurements)
            .map(|m| ColumnSchema::field(format!("measurement{m}"), DataType::Int64))
            .collect();
        writer
            .register_device(&DeviceSchema::new(device.clone(), columns.clone()))
            .expect("Failed to register device");

        let mut tablet = Tablet::with_columns(device, columns, rows).expect("Failed to build tablet");
        for row in 0..rows {
            let offset = i64::try_from(row).unwrap();
            tablet.add_timestamp(row, START + offset).unwrap();
            for m in 0..measurements {
                tablet.add_value(row, m, offset).unwrap();
            }
        }
        writer.write_tablet(tablet).expect("Failed to write tablet");
    }

    writer.close().expect("Failed to close writer");
}

fn grid_file(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("grid.tsfile");
    write_grid(&path, 10, 10, 100);
    path
}

fn drain(mut rs: ResultSet) -> Vec<(Timestamp, Vec<Option<Value>>)> {
    let mut rows = Vec::new();
    while rs.next().unwrap() {
        let row = rs.current_row().unwrap();
        rows.push((
            row.timestamp(),
            row.fields().iter().map(|f| f.value().cloned()).collect(),
        ));
    }
    rows
}

// ============================================================================
// Write / Read Round Trip
// ============================================================================

#[test]
fn test_grid_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = grid_file(&dir);

    let ctx = TsFileContext::default();
    let reader = TsFileReader::open(&ctx, &path).unwrap();
    assert_eq!(reader.all_paths().len(), 100);
    assert_eq!(reader.timeseries_schema("device4").unwrap().len(), 10);

    let executor = Executor::new(&reader);
    let mut rs = executor
        .read_all(vec![Path::new("device4", "measurement4")])
        .unwrap();

    let mut expected = 0i64;
    while rs.next().unwrap() {
        assert_eq!(rs.timestamp().unwrap(), START + expected);
        assert_eq!(rs.get::<i64>("measurement4").unwrap(), expected);
        assert!(!rs.is_null(0usize).unwrap());
        expected += 1;
    }
    assert_eq!(expected, 100);
    assert_eq!(rs.rows_read(), 100);
    rs.close();
    reader.close();
}

#[test]
fn test_time_range_across_devices() {
    let dir = TempDir::new().unwrap();
    let path = grid_file(&dir);

    let ctx = TsFileContext::default();
    let reader = TsFileReader::open(&ctx, &path).unwrap();
    let executor = Executor::new(&reader);

    let rs = executor
        .query_time_range(
            vec![Path::new("device1", "measurement0"), Path::new("device7", "measurement9")],
            Some(START + 10),
            Some(START + 14),
        )
        .unwrap();
    let rows = drain(rs);
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0].0, START + 10);
    assert_eq!(rows[0].1, vec![Some(Value::Int64(10)), Some(Value::Int64(10))]);
    assert_eq!(rows[4].0, START + 14);

    let rs = executor
        .begin_end(vec![Path::new("device0", "measurement0")], START + 95, -1)
        .unwrap();
    assert_eq!(drain(rs).len(), 5);
}

#[test]
fn test_reopening_existing_file_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("twice.tsfile");
    let ctx = TsFileContext::default();

    let writer = TsFileWriter::open(&ctx, &path).unwrap();
    let err = TsFileWriter::open(&ctx, &path).err().unwrap();
    assert_eq!(err.code(), E_ALREADY_EXIST);

    writer.close().unwrap();
    let err = TsFileWriter::open(&ctx, &path).err().unwrap();
    assert_eq!(err.code(), E_ALREADY_EXIST);
}

#[test]
fn test_missing_file_fails_to_open() {
    let dir = TempDir::new().unwrap();
    let err = TsFileReader::open(&TsFileContext::default(), dir.path().join("absent.tsfile"))
        .err()
        .unwrap();
    assert_eq!(err.code(), E_FILE_OPEN_ERR);
}

// ============================================================================
// Sparse Data
// ============================================================================

#[test]
fn test_unwritten_cells_read_as_null() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sparse.tsfile");
    let ctx = TsFileContext::default();

    let mut writer = TsFileWriter::open(&ctx, &path).unwrap();
    writer
        .register_device(&DeviceSchema::new(
            "d1",
            vec![
                ColumnSchema::field("s1", DataType::Int32),
                ColumnSchema::field("s2", DataType::Double),
            ],
        ))
        .unwrap();

    let mut tablet = Tablet::new("d1", 4).unwrap();
    tablet.add_column("s1", DataType::Int32).unwrap();
    tablet.add_column("s2", DataType::Double).unwrap();
    for row in 0..4usize {
        let ts = i64::try_from(row).unwrap() * 10;
        tablet.add_timestamp(row, ts).unwrap();
        if row != 2 {
            tablet.add_value(row, "s1", i32::try_from(row).unwrap()).unwrap();
        }
        if row == 2 {
            tablet.add_value(row, "s2", 2.5f64).unwrap();
        }
    }
    writer.write_tablet(tablet).unwrap();
    writer.close().unwrap();

    let reader = TsFileReader::open(&ctx, &path).unwrap();
    let executor = Executor::new(&reader);
    let mut rs = executor
        .read_all(vec![Path::new("d1", "s1"), Path::new("d1", "s2")])
        .unwrap();

    assert!(rs.next().unwrap());
    assert!(rs.is_null("s2").unwrap());
    assert_eq!(rs.get::<f64>("s2").unwrap_err().code(), E_NOT_EXIST);

    assert!(rs.next().unwrap());
    assert!(rs.next().unwrap());
    assert_eq!(rs.timestamp().unwrap(), 20);
    assert!(rs.is_null("s1").unwrap());
    assert_eq!(rs.get::<f64>("s2").unwrap(), 2.5);

    assert!(rs.next().unwrap());
    assert!(!rs.next().unwrap());
}

// ============================================================================
// Records and Tables
// ============================================================================

#[test]
fn test_record_writes_are_readable() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("records.tsfile");
    let ctx = TsFileContext::default();

    let mut writer = TsFileWriter::open(&ctx, &path).unwrap();
    writer
        .register_timeseries("root.sg.d1", ColumnSchema::field("temperature", DataType::Float))
        .unwrap();
    writer
        .register_timeseries("root.sg.d1", ColumnSchema::field("status", DataType::Boolean))
        .unwrap();

    for i in 0..5i64 {
        let mut record = TsRecord::new("root.sg.d1", 1000 + i, 2);
        record.insert("temperature", 20.0f32 + i as f32).unwrap();
        if i % 2 == 1 {
            record.insert("status", true).unwrap();
        }
        writer.write_record(record).unwrap();
    }

    let mut unknown = TsRecord::new("root.sg.d9", 1, 1);
    unknown.insert("temperature", 1.0f32).unwrap();
    let rejected = writer.write_record(unknown).unwrap_err();
    assert_eq!(rejected.code(), E_DEVICE_NOT_EXIST);
    let (_, record) = rejected.into_parts();
    assert_eq!(record.device_id(), "root.sg.d9");
    writer.close().unwrap();

    let reader = TsFileReader::open(&ctx, &path).unwrap();
    let executor = Executor::new(&reader);
    let rows = drain(
        executor
            .query_timeseries("root.sg.d1", &["temperature", "status"], 1001, 1003)
            .unwrap(),
    );
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].1, vec![Some(Value::Float(21.0)), Some(Value::Boolean(true))]);
    assert_eq!(rows[1].1[1], None);
}

#[test]
fn test_table_model_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("table.tsfile");
    let ctx = TsFileContext::default();

    let columns = vec![
        ColumnSchema::tag("region", DataType::Text),
        ColumnSchema::field("temp", DataType::Double),
    ];
    let mut writer = TsFileWriter::open(&ctx, &path).unwrap();
    writer
        .register_table(TableSchema::new("weather", columns.clone()).unwrap())
        .unwrap();
    let err = writer
        .register_table(TableSchema::new("weather", columns.clone()).unwrap())
        .unwrap_err();
    assert_eq!(err.code(), E_ALREADY_EXIST);

    let mut tablet = Tablet::with_columns("weather", columns, 3).unwrap();
    for row in 0..3usize {
        let offset = i64::try_from(row).unwrap();
        tablet.add_timestamp(row, offset).unwrap();
        tablet.add_value(row, "region", "north").unwrap();
        tablet.add_value(row, "temp", 10.0 + offset as f64).unwrap();
    }
    writer.write_tablet(tablet).unwrap();

    let stray = Tablet::new("nowhere", 1).unwrap();
    assert_eq!(writer.write_tablet(stray).unwrap_err().code(), E_TABLE_NOT_EXIST);
    writer.close().unwrap();

    let reader = TsFileReader::open(&ctx, &path).unwrap();
    let schema = reader.table_schema("weather").unwrap();
    assert_eq!(schema.len(), 2);
    assert_eq!(reader.table_schema("rain").unwrap_err().code(), E_TABLE_NOT_EXIST);

    let executor = Executor::new(&reader);
    let filter = Expression::column_filter("weather", "temp", Operator::Ge, 11.0f64);
    let rows = drain(
        executor
            .query(vec![Path::new("weather", "region")], Some(filter))
            .unwrap(),
    );
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].1, vec![Some(Value::Text("north".to_string()))]);
}

// ============================================================================
// Filters
// ============================================================================

#[test]
fn test_binary_and_with_many_children() {
    let dir = TempDir::new().unwrap();
    let path = grid_file(&dir);

    let ctx = TsFileContext::default();
    let reader = TsFileReader::open(&ctx, &path).unwrap();
    let executor = Executor::new(&reader);

    let mut expr = Expression::and_group();
    expr.add_to_and_group(Expression::global_time(Operator::Ge, START + 20))
        .unwrap();
    expr.add_to_and_group(Expression::column_filter("device2", "measurement3", Operator::Lt, 40i64))
        .unwrap();
    expr.add_to_and_group(Expression::column_filter("device5", "measurement5", Operator::NotEq, 25i64))
        .unwrap();
    expr.add_to_and_group(Expression::time_filter("device0", "measurement0", Operator::Le, START + 30))
        .unwrap();
    assert_eq!(expr.filter_count(), 4);

    let rows = drain(
        executor
            .query(vec![Path::new("device2", "measurement3")], Some(expr))
            .unwrap(),
    );
    let values: Vec<i64> = rows
        .iter()
        .map(|(_, fields)| match &fields[0] {
            Some(Value::Int64(v)) => *v,
            other => panic!("unexpected field {other:?}"),
        })
        .collect();
    let expected: Vec<i64> = (20..=30).filter(|v| *v != 25).collect();
    assert_eq!(values, expected);
}

#[test]
fn test_or_of_disjoint_ranges() {
    let dir = TempDir::new().unwrap();
    let path = grid_file(&dir);

    let ctx = TsFileContext::default();
    let reader = TsFileReader::open(&ctx, &path).unwrap();
    let executor = Executor::new(&reader);

    let expr = Expression::any_of(vec![
        Expression::column_filter("device3", "measurement1", Operator::Lt, 3i64),
        Expression::column_filter("device3", "measurement1", Operator::Gt, 96i64),
    ])
    .unwrap();
    let rows = drain(
        executor
            .query(vec![Path::new("device3", "measurement1")], Some(expr))
            .unwrap(),
    );
    let timestamps: Vec<Timestamp> = rows.iter().map(|(ts, _)| ts - START).collect();
    assert_eq!(timestamps, vec![0, 1, 2, 97, 98, 99]);
}

// ============================================================================
// Batch Pull
// ============================================================================

#[test]
fn test_pull_batches_cover_all_rows() {
    let dir = TempDir::new().unwrap();
    let path = grid_file(&dir);

    let ctx = TsFileContext::default();
    let reader = TsFileReader::open(&ctx, &path).unwrap();
    let executor = Executor::new(&reader);
    let mut rs = executor
        .read_all(vec![Path::new("device6", "measurement2"), Path::new("device6", "measurement8")])
        .unwrap();

    let mut sizes = Vec::new();
    let mut next_value = 0i64;
    loop {
        let batch = pull(&mut rs, 30).unwrap();
        if batch.current_row_count() == 0 {
            break;
        }
        assert_eq!(batch.owner(), "device6");
        assert_eq!(batch.column_count(), 2);
        for (row, ts) in batch.rows() {
            assert_eq!(ts, START + next_value);
            assert_eq!(batch.get::<i64>(row, "device6.measurement8").unwrap(), Some(next_value));
            next_value += 1;
        }
        sizes.push(batch.current_row_count());
    }
    assert_eq!(sizes, vec![30, 30, 30, 10]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_time_range_returns_inclusive_window(begin in 0i64..100, len in 0i64..100) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prop.tsfile");
        write_grid(&path, 1, 1, 100);

        let reader = TsFileReader::open(&TsFileContext::default(), &path).unwrap();
        let executor = Executor::new(&reader);
        let end = begin + len;
        let rows = drain(
            executor
                .query_time_range(vec![Path::new("device0", "measurement0")], Some(START + begin), Some(START + end))
                .unwrap(),
        );

        let expected = usize::try_from(end.min(99) - begin + 1).unwrap();
        prop_assert_eq!(rows.len(), expected);
        prop_assert!(rows.windows(2).all(|w| w[0].0 < w[1].0));
    }
}
