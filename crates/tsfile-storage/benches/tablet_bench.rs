use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use tsfile_common::DataType;
use tsfile_storage::{ColumnSchema, DeviceSchema, Tablet, TsFileContext, TsFileWriter};

const MEASUREMENTS: usize = 10;

fn columns() -> Vec<ColumnSchema> {
    (0..MEASUREMENTS)
        .map(|i| ColumnSchema::field(format!("s{i}"), DataType::Int64))
        .collect()
}

fn fill(rows: usize) -> Tablet {
    let mut tablet = Tablet::with_columns("device0", columns(), rows).unwrap();
    for row in 0..rows {
        tablet.add_timestamp(row, row as i64).unwrap();
        for col in 0..MEASUREMENTS {
            tablet.add_value(row, col, (row * col) as i64).unwrap();
        }
    }
    tablet
}

fn bench_tablet_fill(c: &mut Criterion) {
    let mut group = c.benchmark_group("tablet_fill");
    for rows in [1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, &rows| {
            b.iter(|| black_box(fill(rows)));
        });
    }
    group.finish();
}

fn bench_write_tablet(c: &mut Criterion) {
    let ctx = TsFileContext::default();
    c.bench_function("write_tablet_10k", |b| {
        b.iter_batched(
            || {
                let dir = tempfile::tempdir().unwrap();
                let mut writer = TsFileWriter::open(&ctx, dir.path().join("bench.tsfile")).unwrap();
                writer
                    .register_device(&DeviceSchema::new("device0", columns()))
                    .unwrap();
                (dir, writer, fill(10_000))
            },
            |(dir, mut writer, tablet)| {
                writer.write_tablet(tablet).unwrap();
                writer.close().unwrap();
                drop(dir);
            },
            criterion::BatchSize::PerIteration,
        );
    });
}

criterion_group!(benches, bench_tablet_fill, bench_write_tablet);
criterion_main!(benches);
