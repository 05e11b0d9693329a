//! Benchmarks for the annotated CSV decode path.
//!
//! Runs entirely in memory; no server required. `cargo bench`.

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use influxdb_async::{flux_record, Reader, Value};
use tokio::runtime::Runtime;

const ROWS: usize = 10_000;

fn build_csv(rows: usize) -> String {
    let mut csv = String::with_capacity(rows * 96);
    csv.push_str("#datatype,string,long,dateTime:RFC3339,double,string\n");
    csv.push_str("#group,false,false,false,false,true\n");
    csv.push_str("#default,_result,,,,\n");
    csv.push_str(",result,table,_time,_value,host\n");
    for i in 0..rows {
        csv.push_str(&format!(
            ",,0,2023-11-14T12:{:02}:{:02}.000000000Z,{}.5,server{:02}\n",
            (i / 60) % 60,
            i % 60,
            i % 100,
            i % 10,
        ));
    }
    csv.push('\n');
    csv
}

flux_record! {
    #[derive(Debug)]
    struct Sample {
        table: i64 => "table",
        time: chrono::DateTime<chrono::FixedOffset> => "_time",
        value: f64 => "_value",
        host: String => "host",
    }
}

fn bench_decode(c: &mut Criterion) {
    let csv = build_csv(ROWS);
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(ROWS as u64));

    group.bench_function("records", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut reader = Reader::new(csv.as_bytes());
                let mut count = 0usize;
                while reader.next_section().await {
                    while reader.next_row().await {
                        let sample: Sample = reader.decode().unwrap();
                        std::hint::black_box(&sample);
                        count += 1;
                    }
                }
                assert_eq!(count, ROWS);
            })
        })
    });

    group.bench_function("dynamic_slice", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut reader = Reader::new(csv.as_bytes());
                let mut row: Vec<Value> = Vec::new();
                let mut count = 0usize;
                while reader.next_section().await {
                    while reader.next_row().await {
                        reader.decode_slice(&mut row).unwrap();
                        std::hint::black_box(&row);
                        count += 1;
                    }
                }
                assert_eq!(count, ROWS);
            })
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
