//! 周期任务
//!
//! 每个组件一个线程，固定频率运行用户逻辑。每个周期：
//!
//! ```text
//! start_if_automatic() -> TaskLogic::run() -> advance_if_automatic() -> 睡眠到下一个锚点
//! ```
//!
//! 睡眠使用绝对时间锚点（`next_tick += period`）消除累积漂移；执行时间超过周期时
//! 记为一次超时（Overrun），锚点重置到当前时间。

use crate::config::TaskConfig;
use crate::error::TaskError;
use crate::interface::{InterfaceProvided, InterfaceProvidedBuilder};
use crate::metrics::{TaskMetrics, TaskMetricsSnapshot};
use crate::state::{AtomicTaskState, TaskState};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{JoinHandle, Thread};
use std::time::{Duration, Instant};
use tickstate_table::{StateError, StateTable, StateTableBuilder, StateTableWriter, TimeServer};
use tracing::{debug, error, info, trace, warn};

/// 每个任务自带的默认状态表名
pub const DEFAULT_STATE_TABLE: &str = "StateTable";

/// 线程退出等待时间
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Ready 状态下线程的最长休眠时间
const IDLE_PARK: Duration = Duration::from_millis(50);

/// 带超时的线程 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> Result<(), TaskError>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> Result<(), TaskError> {
        let (tx, rx) = crossbeam_channel::bounded(1);

        // 看门狗线程代为 join；超时后它继续运行，进程退出时回收
        std::thread::spawn(move || {
            let panicked = self.join().is_err();
            let _ = tx.send(panicked);
        });

        match rx.recv_timeout(timeout) {
            Ok(false) => Ok(()),
            Ok(true) => Err(TaskError::Disconnected("task thread panicked".to_string())),
            Err(_) => Err(TaskError::Timeout),
        }
    }
}

/// 用户逻辑
///
/// 三个回调都在任务线程中执行，可以直接写状态表。
pub trait TaskLogic: Send + 'static {
    type Error: fmt::Display;

    /// 进入 Ready 之前执行一次，其写入随初始行一起发布
    fn startup(&mut self, _ctx: &mut CycleContext<'_>) -> Result<(), Self::Error> {
        Ok(())
    }

    /// 每个周期执行一次
    fn run(&mut self, ctx: &mut CycleContext<'_>) -> Result<(), Self::Error>;

    /// 进入 Finishing 后执行一次
    fn cleanup(&mut self, _ctx: &mut CycleContext<'_>) -> Result<(), Self::Error> {
        Ok(())
    }
}

type NamedWriters = SmallVec<[(String, StateTableWriter); 2]>;

/// 回调上下文：任务自己的状态表写端
pub struct CycleContext<'a> {
    name: &'a str,
    period: Duration,
    cycle: u64,
    tables: &'a mut NamedWriters,
}

impl CycleContext<'_> {
    /// 组件名
    pub fn name(&self) -> &str {
        self.name
    }

    /// 标称周期
    pub fn period(&self) -> Duration {
        self.period
    }

    /// 已完成的周期数（startup 中为 0）
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// 默认状态表
    pub fn state_table(&mut self) -> &mut StateTableWriter {
        &mut self.tables[0].1
    }

    /// 按名称查找状态表
    pub fn state_table_named(&mut self, name: &str) -> Option<&mut StateTableWriter> {
        self.tables
            .iter_mut()
            .find(|(table, _)| table == name)
            .map(|(_, writer)| writer)
    }
}

/// 周期任务构建器（注册阶段）
pub struct PeriodicTaskBuilder {
    config: TaskConfig,
    time_server: Arc<dyn TimeServer>,
    tables: Vec<(String, StateTableBuilder)>,
    interfaces: Vec<InterfaceProvidedBuilder>,
}

impl PeriodicTaskBuilder {
    /// 校验配置并创建默认状态表
    pub fn new(config: TaskConfig, time_server: Arc<dyn TimeServer>) -> Result<Self, TaskError> {
        config.validate()?;
        let default_table = StateTableBuilder::new(DEFAULT_STATE_TABLE, config.history_length)
            .with_time_server(time_server.clone())
            .statistics_interval(config.statistics_interval());
        Ok(Self {
            config,
            time_server,
            tables: vec![(DEFAULT_STATE_TABLE.to_string(), default_table)],
            interfaces: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// 默认状态表的构建器
    pub fn state_table_mut(&mut self) -> &mut StateTableBuilder {
        &mut self.tables[0].1
    }

    /// 按名称查找状态表构建器
    pub fn state_table_builder(&mut self, name: &str) -> Result<&mut StateTableBuilder, TaskError> {
        let component = self.config.name.clone();
        self.tables
            .iter_mut()
            .find(|(table, _)| table == name)
            .map(|(_, builder)| builder)
            .ok_or_else(|| TaskError::UnknownStateTable {
                component,
                table: name.to_string(),
            })
    }

    /// 添加一个额外的状态表
    pub fn add_state_table(
        &mut self,
        name: &str,
        history_length: usize,
    ) -> Result<&mut StateTableBuilder, TaskError> {
        if self.tables.iter().any(|(table, _)| table == name) {
            return Err(StateError::DuplicateName(name.to_string()).into());
        }
        let builder = StateTableBuilder::new(name, history_length)
            .with_time_server(self.time_server.clone())
            .statistics_interval(self.config.statistics_interval());
        self.tables.push((name.to_string(), builder));
        let last = self.tables.len() - 1;
        Ok(&mut self.tables[last].1)
    }

    /// 获取（不存在则创建）提供接口
    pub fn provided_interface(&mut self, name: &str) -> &mut InterfaceProvidedBuilder {
        let position = match self.interfaces.iter().position(|i| i.name() == name) {
            Some(position) => position,
            None => {
                self.interfaces.push(InterfaceProvidedBuilder::new(
                    &self.config.name,
                    name,
                    self.config.mailbox_capacity,
                ));
                self.interfaces.len() - 1
            },
        };
        &mut self.interfaces[position]
    }

    /// 构建状态表、绑定接口并启动任务线程
    ///
    /// 返回时线程已启动，任务随后进入 Ready，等待 [`PeriodicTask::start`]。
    pub fn spawn<L: TaskLogic>(self, logic: L) -> Result<PeriodicTask, TaskError> {
        let Self {
            config,
            tables,
            interfaces,
            ..
        } = self;

        let writers: NamedWriters =
            tables.into_iter().map(|(name, builder)| (name, builder.build())).collect();
        let readers: Vec<(String, StateTable)> =
            writers.iter().map(|(name, writer)| (name.clone(), writer.reader())).collect();
        let interfaces = interfaces
            .into_iter()
            .map(|builder| builder.bind(&readers))
            .collect::<Result<Vec<_>, _>>()?;

        let shared = Arc::new(TaskShared::new(config.name.clone()));
        let thread_shared = shared.clone();
        let thread_config = config.clone();

        let handle = std::thread::Builder::new()
            .name(format!("tickstate-{}", config.name))
            .spawn(move || task_loop(logic, writers, thread_shared, thread_config))
            .map_err(TaskError::Spawn)?;

        debug!(
            "Component '{}': spawned at {} Hz with {} state tables",
            config.name,
            config.frequency_hz,
            readers.len()
        );

        Ok(PeriodicTask {
            thread: handle.thread().clone(),
            handle: Mutex::new(Some(handle)),
            shared,
            tables: readers,
            interfaces,
            config,
        })
    }
}

impl fmt::Debug for PeriodicTaskBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicTaskBuilder")
            .field("config", &self.config)
            .field("tables", &self.tables.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>())
            .field("interfaces", &self.interfaces)
            .finish()
    }
}

/// 外部请求（任务线程在周期边界处理）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Request {
    Suspend = 0,
    Run = 1,
    Kill = 2,
}

impl Request {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Suspend,
            1 => Self::Run,
            _ => Self::Kill,
        }
    }
}

/// 任务线程与控制端共享的状态
#[derive(Debug)]
struct TaskShared {
    name: String,
    state: AtomicTaskState,
    request: AtomicU8,
    overran: AtomicBool,
    metrics: TaskMetrics,
}

impl TaskShared {
    fn new(name: String) -> Self {
        Self {
            name,
            state: AtomicTaskState::default(),
            request: AtomicU8::new(Request::Suspend as u8),
            overran: AtomicBool::new(false),
            metrics: TaskMetrics::new(),
        }
    }

    fn request(&self) -> Request {
        Request::from_u8(self.request.load(Ordering::Acquire))
    }
}

#[cfg(feature = "realtime")]
fn raise_priority(name: &str) {
    use thread_priority::*;

    match set_current_thread_priority(ThreadPriority::Max) {
        Ok(_) => info!("Component '{}': thread priority set to MAX (realtime)", name),
        Err(e) => warn!(
            "Component '{}': failed to set thread priority: {}. \
             On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
            name, e
        ),
    }
}

#[cfg(not(feature = "realtime"))]
fn raise_priority(name: &str) {
    warn!(
        "Component '{}': realtime requested but the `realtime` feature is disabled",
        name
    );
}

fn task_loop<L: TaskLogic>(
    mut logic: L,
    mut tables: NamedWriters,
    shared: Arc<TaskShared>,
    config: TaskConfig,
) {
    if config.realtime {
        raise_priority(&shared.name);
    }

    let period = config.period();
    shared.state.set(TaskState::Initializing);

    let mut ctx = CycleContext {
        name: &shared.name,
        period,
        cycle: 0,
        tables: &mut tables,
    };

    for (_, table) in ctx.tables.iter_mut() {
        table.start_if_automatic();
    }
    let startup = logic.startup(&mut ctx);
    for (_, table) in ctx.tables.iter_mut() {
        table.advance_if_automatic();
    }

    match startup {
        Ok(()) => {
            shared.state.set(TaskState::Ready);
            info!("Component '{}': ready", shared.name);
            run_cycles(&mut logic, &mut ctx, &shared, period);
        },
        Err(e) => error!("Component '{}': startup failed: {}", shared.name, e),
    }

    shared.state.set(TaskState::Finishing);
    if let Err(e) = logic.cleanup(&mut ctx) {
        error!("Component '{}': cleanup failed: {}", shared.name, e);
    }
    for (_, table) in ctx.tables.iter_mut() {
        table.cleanup();
    }
    shared.state.set(TaskState::Finished);
    info!("Component '{}': finished", shared.name);
}

fn run_cycles<L: TaskLogic>(
    logic: &mut L,
    ctx: &mut CycleContext<'_>,
    shared: &TaskShared,
    period: Duration,
) {
    let mut next_tick = Instant::now();
    let mut active = false;

    loop {
        match shared.request() {
            Request::Kill => break,
            Request::Suspend => {
                if active {
                    active = false;
                    shared.state.set(TaskState::Ready);
                    debug!("Component '{}': suspended", shared.name);
                }
                std::thread::park_timeout(IDLE_PARK);
                continue;
            },
            Request::Run => {
                if !active {
                    active = true;
                    next_tick = Instant::now();
                    shared.state.set(TaskState::Active);
                    debug!("Component '{}': active", shared.name);
                }
            },
        }

        // 1. 设定下一个锚点
        next_tick += period;
        let cycle_start = Instant::now();

        // 2. 一个周期
        for (_, table) in ctx.tables.iter_mut() {
            table.start_if_automatic();
        }
        if let Err(e) = logic.run(ctx) {
            shared.metrics.run_errors.fetch_add(1, Ordering::Relaxed);
            warn!("Component '{}': run failed: {}", shared.name, e);
        }
        for (_, table) in ctx.tables.iter_mut() {
            table.advance_if_automatic();
        }
        ctx.cycle += 1;
        shared.metrics.record_cycle(cycle_start.elapsed());

        // 3. 睡眠到下一个锚点
        let now = Instant::now();
        if next_tick > now {
            spin_sleep::sleep(next_tick - now);
        } else {
            shared.overran.store(true, Ordering::Relaxed);
            shared.metrics.overruns.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Component '{}': period overrun, cycle took {:?} (period {:?})",
                shared.name,
                now.duration_since(cycle_start),
                period
            );
            next_tick = now;
        }
        trace!("Component '{}': cycle {} done", shared.name, ctx.cycle);
    }
}

/// 运行中的周期任务（控制端）
///
/// Drop 时终止任务并最多等待 2 秒。
pub struct PeriodicTask {
    config: TaskConfig,
    shared: Arc<TaskShared>,
    thread: Thread,
    handle: Mutex<Option<JoinHandle<()>>>,
    tables: Vec<(String, StateTable)>,
    interfaces: Vec<InterfaceProvided>,
}

impl PeriodicTask {
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// 当前状态（任意线程）
    pub fn state(&self) -> TaskState {
        self.shared.state.get()
    }

    /// 请求进入 Active（下一次循环生效）
    pub fn start(&self) -> Result<(), TaskError> {
        self.request(Request::Run, TaskState::Active)
    }

    /// 请求回到 Ready
    pub fn suspend(&self) -> Result<(), TaskError> {
        self.request(Request::Suspend, TaskState::Ready)
    }

    /// 请求结束：执行 cleanup 后进入 Finished（可重复调用）
    pub fn kill(&self) {
        self.shared.request.store(Request::Kill as u8, Ordering::Release);
        self.thread.unpark();
    }

    fn request(&self, request: Request, to: TaskState) -> Result<(), TaskError> {
        let from = self.state();
        if from.is_terminating() || self.shared.request() == Request::Kill {
            return Err(TaskError::InvalidTransition { from, to });
        }
        self.shared.request.store(request as u8, Ordering::Release);
        self.thread.unpark();
        Ok(())
    }

    /// 轮询等待进入 `state`
    pub fn wait_for_state(&self, state: TaskState, timeout: Duration) -> Result<(), TaskError> {
        let deadline = Instant::now() + timeout;
        loop {
            let current = self.state();
            if current == state {
                return Ok(());
            }
            // 已结束的任务不会再进入其他状态
            if current == TaskState::Finished || Instant::now() >= deadline {
                return Err(TaskError::Timeout);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// 等待任务线程退出（需先 `kill()`）
    pub fn wait_to_terminate(&self, timeout: Duration) -> Result<(), TaskError> {
        match self.handle.lock().take() {
            Some(handle) => handle.join_timeout(timeout),
            None => Ok(()),
        }
    }

    /// 自上次复位以来是否发生过超时
    pub fn is_overran_period(&self) -> bool {
        self.shared.overran.load(Ordering::Relaxed)
    }

    pub fn reset_overran_period(&self) {
        self.shared.overran.store(false, Ordering::Relaxed);
    }

    /// 默认状态表的平均周期（秒）
    pub fn average_period(&self) -> f64 {
        self.tables[0].1.average_period()
    }

    /// 标称周期
    pub fn period(&self) -> Duration {
        self.config.period()
    }

    pub fn metrics(&self) -> TaskMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.shared.metrics.reset();
    }

    /// 按名称获取提供接口
    pub fn interface(&self, name: &str) -> Result<InterfaceProvided, TaskError> {
        self.interfaces
            .iter()
            .find(|i| i.name() == name)
            .cloned()
            .ok_or_else(|| TaskError::UnknownInterface {
                component: self.config.name.clone(),
                interface: name.to_string(),
            })
    }

    pub fn interface_names(&self) -> impl Iterator<Item = &str> {
        self.interfaces.iter().map(|i| i.name())
    }

    /// 按名称获取状态表读端
    pub fn state_table(&self, name: &str) -> Result<StateTable, TaskError> {
        self.tables
            .iter()
            .find(|(table, _)| table == name)
            .map(|(_, table)| table.clone())
            .ok_or_else(|| TaskError::UnknownStateTable {
                component: self.config.name.clone(),
                table: name.to_string(),
            })
    }

    /// 默认状态表读端
    pub fn default_state_table(&self) -> StateTable {
        self.tables[0].1.clone()
    }

    pub fn state_table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|(name, _)| name.as_str())
    }
}

impl fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .field("frequency_hz", &self.config.frequency_hz)
            .field("metrics", &self.metrics())
            .finish()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.kill();
        if let Some(handle) = self.handle.get_mut().take()
            && let Err(e) = handle.join_timeout(JOIN_TIMEOUT)
        {
            error!(
                "Component '{}': thread failed to shut down within {:?}: {}",
                self.config.name, JOIN_TIMEOUT, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tickstate_table::{StateHandle, SystemTimeServer};

    struct Counter {
        counter: StateHandle<u64>,
        value: u64,
        goal: crate::interface::Mailbox<u64>,
        cleaned: Arc<AtomicBool>,
    }

    impl TaskLogic for Counter {
        type Error = TaskError;

        fn startup(&mut self, ctx: &mut CycleContext<'_>) -> Result<(), TaskError> {
            self.value = 100;
            ctx.state_table().write(self.counter, self.value)?;
            Ok(())
        }

        fn run(&mut self, ctx: &mut CycleContext<'_>) -> Result<(), TaskError> {
            if let Some(goal) = self.goal.latest() {
                self.value = goal;
            }
            self.value += 1;
            ctx.state_table().write(self.counter, self.value)?;
            Ok(())
        }

        fn cleanup(&mut self, _ctx: &mut CycleContext<'_>) -> Result<(), TaskError> {
            self.cleaned.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn spawn_counter(frequency_hz: f64) -> (PeriodicTask, StateHandle<u64>, Arc<AtomicBool>) {
        let config = TaskConfig::new("counter", frequency_hz).with_history_length(16);
        let mut builder = PeriodicTaskBuilder::new(config, Arc::new(SystemTimeServer::new())).unwrap();
        let counter = builder.state_table_mut().new_element("counter", 0u64).unwrap();
        let interface = builder.provided_interface("Main");
        interface.add_command_read_state("GetCounter", counter).unwrap();
        let goal = interface.add_command_write::<u64>("SetCounter").unwrap();

        let cleaned = Arc::new(AtomicBool::new(false));
        let task = builder
            .spawn(Counter {
                counter,
                value: 0,
                goal,
                cleaned: cleaned.clone(),
            })
            .unwrap();
        (task, counter, cleaned)
    }

    #[test]
    #[serial]
    fn test_lifecycle() {
        let (task, counter, cleaned) = spawn_counter(200.0);
        task.wait_for_state(TaskState::Ready, Duration::from_secs(2)).unwrap();

        // startup 的写入随初始行发布
        let table = task.default_state_table();
        let accessor = table.accessor(counter).unwrap();
        assert_eq!(accessor.get_latest().unwrap(), 100);

        task.start().unwrap();
        task.wait_for_state(TaskState::Active, Duration::from_secs(2)).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert!(accessor.get_latest().unwrap() > 100);
        assert!(task.metrics().cycles_total > 0);

        task.suspend().unwrap();
        task.wait_for_state(TaskState::Ready, Duration::from_secs(2)).unwrap();
        let frozen = accessor.get_latest().unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(accessor.get_latest().unwrap(), frozen);

        task.kill();
        task.wait_for_state(TaskState::Finished, Duration::from_secs(2)).unwrap();
        task.wait_to_terminate(Duration::from_secs(2)).unwrap();
        assert!(cleaned.load(Ordering::SeqCst));
        assert!(matches!(
            task.start(),
            Err(TaskError::InvalidTransition { to: TaskState::Active, .. })
        ));
    }

    #[test]
    #[serial]
    fn test_interface_commands() {
        let (task, _counter, _cleaned) = spawn_counter(200.0);
        let interface = task.interface("Main").unwrap();
        let read = interface.read_function::<u64>("GetCounter").unwrap();
        let write = interface.write_function::<u64>("SetCounter").unwrap();

        task.start().unwrap();
        task.wait_for_state(TaskState::Active, Duration::from_secs(2)).unwrap();
        write.call(1_000_000).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert!(read.call().unwrap() > 1_000_000);

        assert!(matches!(
            task.interface("Missing"),
            Err(TaskError::UnknownInterface { .. })
        ));
        assert!(matches!(
            task.state_table("Missing"),
            Err(TaskError::UnknownStateTable { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_average_period_tracks_frequency() {
        let (task, _counter, _cleaned) = spawn_counter(100.0);
        task.start().unwrap();
        std::thread::sleep(Duration::from_millis(300));
        let average = task.average_period();
        assert!(average > 0.005 && average < 0.02, "average period {average}");
    }

    struct Slow;

    impl TaskLogic for Slow {
        type Error = TaskError;

        fn run(&mut self, _ctx: &mut CycleContext<'_>) -> Result<(), TaskError> {
            std::thread::sleep(Duration::from_millis(15));
            Ok(())
        }
    }

    #[test]
    #[serial]
    fn test_overrun_is_flagged() {
        let config = TaskConfig::new("slow", 200.0);
        let builder = PeriodicTaskBuilder::new(config, Arc::new(SystemTimeServer::new())).unwrap();
        let task = builder.spawn(Slow).unwrap();
        task.start().unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert!(task.is_overran_period());
        assert!(task.metrics().overruns > 0);
        task.suspend().unwrap();
        task.wait_for_state(TaskState::Ready, Duration::from_secs(2)).unwrap();
        task.reset_overran_period();
        assert!(!task.is_overran_period());
    }

    struct FailingStartup;

    impl TaskLogic for FailingStartup {
        type Error = String;

        fn startup(&mut self, _ctx: &mut CycleContext<'_>) -> Result<(), String> {
            Err("no hardware".to_string())
        }

        fn run(&mut self, _ctx: &mut CycleContext<'_>) -> Result<(), String> {
            Ok(())
        }
    }

    #[test]
    #[serial]
    fn test_failed_startup_finishes() {
        let builder = PeriodicTaskBuilder::new(
            TaskConfig::new("broken", 100.0),
            Arc::new(SystemTimeServer::new()),
        )
        .unwrap();
        let task = builder.spawn(FailingStartup).unwrap();
        task.wait_to_terminate(Duration::from_secs(2)).unwrap();
        assert_eq!(task.state(), TaskState::Finished);
    }

    #[test]
    fn test_builder_tables() {
        let mut builder = PeriodicTaskBuilder::new(
            TaskConfig::new("tables", 100.0),
            Arc::new(SystemTimeServer::new()),
        )
        .unwrap();
        builder.add_state_table("Fast", 8).unwrap();
        assert!(matches!(
            builder.add_state_table(DEFAULT_STATE_TABLE, 8),
            Err(TaskError::State(StateError::DuplicateName(_)))
        ));
        assert!(builder.state_table_builder("Fast").is_ok());
        assert!(builder.state_table_builder("Slow").is_err());

        let invalid = PeriodicTaskBuilder::new(
            TaskConfig::new("bad", -1.0),
            Arc::new(SystemTimeServer::new()),
        );
        assert!(matches!(invalid, Err(TaskError::Config(_))));
    }
}
