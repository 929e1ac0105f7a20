//! 周期任务集成测试
//!
//! 两个组件：生成器以 500Hz 写正弦信号，监视器以 50Hz 通过提供接口读取生成器的
//! 最新值和历史，同时由采集器把生成器的状态表写到临时文件。

use serial_test::serial;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tickstate::task::{EventPublisher, HistoryFunction, Mailbox, ReadFunction};
use tickstate::{
    CollectorConfig, ComponentManager, CycleContext, DEFAULT_STATE_TABLE, StateCollector,
    StateHandle, TaskConfig, TaskError, TaskLogic, TaskState,
};

struct Generator {
    sample: StateHandle<f64>,
    counter: StateHandle<u64>,
    amplitude: Mailbox<f64>,
    wrapped: EventPublisher<u64>,
    gain: f64,
}

impl TaskLogic for Generator {
    type Error = TaskError;

    fn run(&mut self, ctx: &mut CycleContext<'_>) -> Result<(), TaskError> {
        if let Some(gain) = self.amplitude.latest() {
            self.gain = gain;
        }
        let cycle = ctx.cycle();
        let phase = cycle as f64 * 0.01;
        let table = ctx.state_table();
        table.write(self.sample, self.gain * phase.sin())?;
        table.write(self.counter, cycle)?;
        if cycle > 0 && cycle % 100 == 0 {
            self.wrapped.publish(cycle);
        }
        Ok(())
    }
}

struct Monitor {
    latest: ReadFunction<u64>,
    history: HistoryFunction<u64>,
    reads: Arc<AtomicU64>,
    gaps: Arc<AtomicU64>,
}

impl TaskLogic for Monitor {
    type Error = TaskError;

    fn run(&mut self, _ctx: &mut CycleContext<'_>) -> Result<(), TaskError> {
        self.latest.call()?;
        let history = self.history.call(5)?;
        // 历史中的计数器不回退、不跳号（启动前的初始行可能重复）
        let values = history.values();
        if values.windows(2).any(|w| w[1] < w[0] || w[1] > w[0] + 1) {
            self.gaps.fetch_add(1, Ordering::Relaxed);
        }
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[test]
#[serial]
fn test_generator_monitor_and_collector() {
    let manager = ComponentManager::new();

    // 生成器
    let mut builder = manager
        .task_builder(TaskConfig::new("generator", 500.0).with_history_length(512))
        .unwrap();
    let table = builder.state_table_mut();
    let sample = table.new_element("sample", 0.0f64).unwrap();
    let counter = table.new_element("counter", 0u64).unwrap();
    let events = table.collection_events(256);
    let interface = builder.provided_interface("Main");
    interface.add_command_read_state("GetCounter", counter).unwrap();
    interface.add_command_read_history("GetCounterHistory", counter).unwrap();
    let amplitude = interface.add_command_write::<f64>("SetAmplitude").unwrap();
    let wrapped = interface.add_event_write::<u64>("Wrapped").unwrap();
    let generator = builder
        .spawn(Generator {
            sample,
            counter,
            amplitude,
            wrapped,
            gain: 1.0,
        })
        .unwrap();
    manager.add_component(generator).unwrap();

    // 监视器
    let main = manager.interface("generator", "Main").unwrap();
    let wrapped_events = main.subscribe::<u64>("Wrapped", 16).unwrap();
    let reads = Arc::new(AtomicU64::new(0));
    let gaps = Arc::new(AtomicU64::new(0));
    let builder = manager.task_builder(TaskConfig::new("monitor", 50.0)).unwrap();
    let monitor = builder
        .spawn(Monitor {
            latest: main.read_function("GetCounter").unwrap(),
            history: main.history_function("GetCounterHistory").unwrap(),
            reads: reads.clone(),
            gaps: gaps.clone(),
        })
        .unwrap();
    manager.add_component(monitor).unwrap();

    // 采集器
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("generator.csv");
    let file = std::fs::File::create(&path).unwrap();
    let mut config = CollectorConfig::new("generator");
    config.signals = vec!["counter".to_string(), "sample".to_string()];
    let collector = StateCollector::new(
        manager.state_table("generator", DEFAULT_STATE_TABLE).unwrap(),
        events,
        Box::new(std::io::BufWriter::new(file)),
        &config,
    )
    .unwrap()
    .spawn()
    .unwrap();

    manager
        .wait_for_state_all(TaskState::Ready, Duration::from_secs(2))
        .unwrap();
    collector.start_collection(0.0);
    manager.start_all().unwrap();
    manager
        .wait_for_state_all(TaskState::Active, Duration::from_secs(2))
        .unwrap();

    main.write_function::<f64>("SetAmplitude").unwrap().call(2.0).unwrap();
    std::thread::sleep(Duration::from_millis(400));
    collector.stop_collection(0.0);
    std::thread::sleep(Duration::from_millis(50));

    assert!(reads.load(Ordering::Relaxed) > 5);
    assert_eq!(gaps.load(Ordering::Relaxed), 0);
    assert!(wrapped_events.try_iter().all(|cycle| cycle % 100 == 0));

    let generator_metrics = manager.component_metrics("generator").unwrap();
    assert!(generator_metrics.cycles_total > 50);

    let stats = collector.join().unwrap();
    manager.cleanup();
    assert!(stats.rows_written > 0);

    let text = std::fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("ticks,counter,sample"));
    let ticks: Vec<u64> = lines
        .map(|line| line.split(',').next().unwrap().parse().unwrap())
        .collect();
    assert_eq!(ticks.len() as u64, stats.rows_written);
    assert!(ticks.windows(2).all(|w| w[1] > w[0]));
}

#[test]
#[serial]
fn test_state_table_outlives_component() {
    struct Once {
        value: StateHandle<u32>,
    }

    impl TaskLogic for Once {
        type Error = TaskError;

        fn startup(&mut self, ctx: &mut CycleContext<'_>) -> Result<(), TaskError> {
            ctx.state_table().write(self.value, 11)?;
            Ok(())
        }

        fn run(&mut self, _ctx: &mut CycleContext<'_>) -> Result<(), TaskError> {
            Ok(())
        }
    }

    let manager = ComponentManager::new();
    let mut builder = manager.task_builder(TaskConfig::new("once", 100.0)).unwrap();
    let value = builder.state_table_mut().new_element("value", 0u32).unwrap();
    manager.add_component(builder.spawn(Once { value }).unwrap()).unwrap();
    manager
        .wait_for_state_all(TaskState::Ready, Duration::from_secs(2))
        .unwrap();

    let table = manager.state_table("once", DEFAULT_STATE_TABLE).unwrap();
    manager.cleanup();

    let accessor = table.accessor(value).unwrap();
    assert_eq!(accessor.get_latest().unwrap(), 11);
    let mut csv = Vec::new();
    let rows = table.csv_write(&mut csv, true).unwrap();
    assert!(rows >= 1);
}
