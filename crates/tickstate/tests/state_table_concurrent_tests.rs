//! 状态表并发测试
//!
//! 一个写线程以随机节奏发布，多个读线程同时读取最新值和历史。
//! 校验失败的读取可以接受，校验通过的读取必须是一次完整发布的数据。

use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tickstate::{AccessorBase, StateError, StateHandle, StateTableBuilder};

/// 一行内所有元素都相同，撕裂读会表现为元素不一致
const WIDTH: usize = 16;

type Wide = [u64; WIDTH];

fn spawn_writer(
    mut writer: tickstate::StateTableWriter,
    column: StateHandle<Wide>,
    cycles: u64,
    done: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut rng = rand::thread_rng();
        for _ in 0..cycles {
            let ticks = writer.get_index_writer().ticks();
            writer.start();
            writer.write(column, [ticks; WIDTH]).unwrap();
            if rng.gen_bool(0.1) {
                thread::yield_now();
            }
            writer.advance();
        }
        done.store(true, Ordering::Release);
    })
}

/// 每次成功读取都是某次发布的完整一行，且值等于该行的 tick
#[test]
fn test_no_torn_reads_under_contention() {
    let mut builder = StateTableBuilder::new("Concurrent", 8);
    let column = builder.new_element("wide", [0u64; WIDTH]).unwrap();
    let writer = builder.build();
    let table = writer.reader();

    let done = Arc::new(AtomicBool::new(false));
    let stale = Arc::new(AtomicU64::new(0));
    let writer_handle = spawn_writer(writer, column, 50_000, done.clone());

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let accessor = table.accessor(column).unwrap();
            let done = done.clone();
            let stale = stale.clone();
            thread::spawn(move || {
                let mut last_ticks = 0;
                let mut successes = 0u64;
                while !done.load(Ordering::Acquire) {
                    match accessor.get_latest_with_index() {
                        Ok((index, value)) => {
                            assert!(value.iter().all(|v| *v == value[0]), "torn row {value:?}");
                            assert_eq!(value[0], index.ticks());
                            assert!(index.ticks() >= last_ticks, "reader index went backwards");
                            last_ticks = index.ticks();
                            successes += 1;
                        },
                        Err(StateError::StaleRead { .. }) => {
                            stale.fetch_add(1, Ordering::Relaxed);
                        },
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
                successes
            })
        })
        .collect();

    writer_handle.join().unwrap();
    let successes: u64 = readers.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(successes > 0);
}

/// 历史读取要么全部来自同一条时间线，要么整体失败
#[test]
fn test_history_reads_are_atomic() {
    let mut builder = StateTableBuilder::new("History", 16);
    let column = builder.new_element("wide", [0u64; WIDTH]).unwrap();
    let writer = builder.build();
    let table = writer.reader();

    let done = Arc::new(AtomicBool::new(false));
    let writer_handle = spawn_writer(writer, column, 30_000, done.clone());

    let readers: Vec<_> = (0..3)
        .map(|seed| {
            let accessor = table.accessor(column).unwrap();
            let done = done.clone();
            thread::spawn(move || {
                let mut history = tickstate::History::default();
                let n = 4 + seed * 4;
                let mut failures = 0u64;
                while !done.load(Ordering::Acquire) {
                    let end = accessor.index_reader();
                    match accessor.get_history_into(end, n, &mut history) {
                        Ok(()) => {
                            assert!(history.is_valid());
                            assert_eq!(history.len(), n);
                            for (index, value) in history.iter() {
                                assert!(value.iter().all(|v| *v == index.ticks()));
                            }
                        },
                        Err(StateError::StaleRead { .. } | StateError::RangeUnavailable { .. }) => {
                            assert!(!history.is_valid());
                            assert!(history.is_empty());
                            failures += 1;
                        },
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                }
                failures
            })
        })
        .collect();

    writer_handle.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
}

/// 发布之后开始的读取不会看到更早的行
#[test]
fn test_monotonic_visibility_across_threads() {
    let mut builder = StateTableBuilder::new("Visibility", 32);
    let counter = builder.new_element("counter", 0u64).unwrap();
    let mut writer = builder.build();
    let table = writer.reader();

    for round in 1..=200u64 {
        writer.write(counter, round).unwrap();
        let published = writer.advance();

        let reader = table.clone();
        let observed = thread::spawn(move || reader.get_index_reader().ticks())
            .join()
            .unwrap();
        assert!(observed >= published.ticks());
    }

    // 慢读者：读线程在写线程推进期间一直观察读索引
    let stop = Arc::new(AtomicBool::new(false));
    let reader = {
        let table = table.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let mut last = 0;
            while !stop.load(Ordering::Acquire) {
                let ticks = table.get_index_reader().ticks();
                assert!(ticks >= last);
                last = ticks;
            }
        })
    };
    for round in 0..10_000u64 {
        writer.write(counter, round).unwrap();
        writer.advance();
    }
    thread::sleep(Duration::from_millis(5));
    stop.store(true, Ordering::Release);
    reader.join().unwrap();
}
