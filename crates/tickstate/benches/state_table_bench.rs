//! 状态表性能基准测试
//!
//! 写端一次发布的开销、读端读取最新值和历史的开销。

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tickstate::{StateHandle, StateTableBuilder, StateTableWriter};

type Joints = [f64; 6];

fn robot_table(history_length: usize) -> (StateTableWriter, StateHandle<Joints>, StateHandle<u64>) {
    let mut builder = StateTableBuilder::new("Bench", history_length);
    let position = builder.new_element("position", [0.0; 6]).unwrap();
    let counter = builder.new_element("counter", 0u64).unwrap();
    // 补几列，接近真实组件的行宽
    for k in 0..8 {
        builder.new_element(format!("aux{k}"), [0.0f64; 6]).unwrap();
    }
    (builder.build(), position, counter)
}

fn bench_advance(c: &mut Criterion) {
    let (mut writer, position, counter) = robot_table(1024);
    let mut k = 0u64;
    c.bench_function("advance (write 2 columns + publish)", |b| {
        b.iter(|| {
            k += 1;
            writer.start();
            writer.write(position, [k as f64; 6]).unwrap();
            writer.write(counter, k).unwrap();
            black_box(writer.advance())
        })
    });
}

fn bench_get_latest(c: &mut Criterion) {
    let (mut writer, position, _counter) = robot_table(1024);
    for _ in 0..100 {
        writer.advance();
    }
    let accessor = writer.reader().accessor(position).unwrap();
    c.bench_function("get_latest [f64; 6]", |b| {
        b.iter(|| black_box(accessor.get_latest().unwrap()))
    });
}

fn bench_get_history(c: &mut Criterion) {
    let (mut writer, position, _counter) = robot_table(1024);
    for _ in 0..2048 {
        writer.advance();
    }
    let accessor = writer.reader().accessor(position).unwrap();
    let end = writer.get_index_reader();

    let mut group = c.benchmark_group("get_history [f64; 6]");
    for n in [10usize, 100, 1000] {
        let mut history = tickstate::History::with_capacity(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                accessor.get_history_into(end, n, &mut history).unwrap();
                black_box(history.len())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_advance, bench_get_latest, bench_get_history);
criterion_main!(benches);
