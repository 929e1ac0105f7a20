//! 示例组件
//!
//! 生成器按自身频率写一条三维圆周轨迹，并通过 `Main` 接口提供读取命令、
//! 幅值写命令和每圈一次的 `Wrapped` 事件。监视器通过该接口读取最近两行历史，
//! 估计速度并写入自己的状态表。

use crossbeam_channel::Receiver;
use std::f64::consts::TAU;
use std::time::Duration;
use tickstate::table::CollectionEvent;
use tickstate::task::{EventPublisher, HistoryFunction, Mailbox};
use tickstate::{
    ComponentManager, CycleContext, StateError, StateHandle, TaskConfig, TaskError, TaskLogic,
};
use tracing::{debug, info};

pub const GENERATOR: &str = "generator";
pub const MONITOR: &str = "monitor";
pub const MAIN_INTERFACE: &str = "Main";

/// 轨迹频率（圈/秒）
const SIGNAL_HZ: f64 = 0.5;

/// 采集事件通道容量
const COLLECTION_EVENT_CAPACITY: usize = 256;

pub fn default_generator_config() -> TaskConfig {
    TaskConfig::new(GENERATOR, 500.0).with_history_length(1024)
}

pub fn default_monitor_config() -> TaskConfig {
    TaskConfig::new(MONITOR, 20.0)
}

pub struct Generator {
    position: StateHandle<[f64; 3]>,
    counter: StateHandle<u64>,
    amplitude: Mailbox<f64>,
    wrapped: EventPublisher<u64>,
    gain: f64,
    cycles_per_turn: u64,
}

impl TaskLogic for Generator {
    type Error = TaskError;

    fn startup(&mut self, ctx: &mut CycleContext<'_>) -> Result<(), TaskError> {
        info!(
            "{}: generating {SIGNAL_HZ} Hz trajectory at {:?} period",
            ctx.name(),
            ctx.period()
        );
        Ok(())
    }

    fn run(&mut self, ctx: &mut CycleContext<'_>) -> Result<(), TaskError> {
        if let Some(gain) = self.amplitude.latest() {
            debug!("amplitude {} -> {}", self.gain, gain);
            self.gain = gain;
        }

        let cycle = ctx.cycle();
        let phase = TAU * (cycle % self.cycles_per_turn) as f64 / self.cycles_per_turn as f64;
        let position = [
            self.gain * phase.cos(),
            self.gain * phase.sin(),
            0.5 * self.gain * (2.0 * phase).sin(),
        ];

        let table = ctx.state_table();
        table.write(self.position, position)?;
        table.write(self.counter, cycle)?;

        if cycle > 0 && cycle % self.cycles_per_turn == 0 {
            self.wrapped.publish(cycle / self.cycles_per_turn);
        }
        Ok(())
    }
}

pub struct Monitor {
    history: HistoryFunction<[f64; 3]>,
    wrapped: Receiver<u64>,
    speed: StateHandle<f64>,
    turns: StateHandle<u64>,
    retries: StateHandle<u64>,
    generator_period: f64,
    turn_count: u64,
    retry_count: u64,
}

impl TaskLogic for Monitor {
    type Error = TaskError;

    fn run(&mut self, ctx: &mut CycleContext<'_>) -> Result<(), TaskError> {
        for turn in self.wrapped.try_iter() {
            debug!("generator completed turn {turn}");
            self.turn_count = turn;
        }

        let speed = match self.history.call(2) {
            Ok(history) => {
                let [p0, p1] = [history.values()[0], history.values()[1]];
                let distance = p0
                    .iter()
                    .zip(p1.iter())
                    .map(|(a, b)| (b - a) * (b - a))
                    .sum::<f64>()
                    .sqrt();
                Some(distance / self.generator_period)
            },
            Err(e) if is_retryable(&e) => {
                self.retry_count += 1;
                None
            },
            Err(e) => return Err(e),
        };

        let table = ctx.state_table();
        if let Some(speed) = speed {
            table.write(self.speed, speed)?;
        }
        table.write(self.turns, self.turn_count)?;
        table.write(self.retries, self.retry_count)?;
        Ok(())
    }
}

/// 读得太慢或者历史还不够长，下个周期再读
fn is_retryable(error: &TaskError) -> bool {
    matches!(
        error,
        TaskError::State(StateError::StaleRead { .. } | StateError::RangeUnavailable { .. })
    )
}

/// 注册并启动生成器，`collect` 时返回默认状态表的采集事件
pub fn spawn_generator(
    manager: &ComponentManager,
    config: TaskConfig,
    collect: bool,
) -> Result<Option<Receiver<CollectionEvent>>, TaskError> {
    let cycles_per_turn = ((config.frequency_hz / SIGNAL_HZ).round() as u64).max(1);
    let mut builder = manager.task_builder(config)?;

    let table = builder.state_table_mut();
    let position = table.new_element("position", [1.0, 0.0, 0.0])?;
    let counter = table.new_element("counter", 0u64)?;
    let events = collect.then(|| table.collection_events(COLLECTION_EVENT_CAPACITY));

    let interface = builder.provided_interface(MAIN_INTERFACE);
    interface.add_command_read_state("GetPosition", position)?;
    interface.add_command_read_history("GetPositionHistory", position)?;
    interface.add_command_read_state("GetCounter", counter)?;
    let amplitude = interface.add_command_write::<f64>("SetAmplitude")?;
    let wrapped = interface.add_event_write::<u64>("Wrapped")?;

    let task = builder.spawn(Generator {
        position,
        counter,
        amplitude,
        wrapped,
        gain: 1.0,
        cycles_per_turn,
    })?;
    manager.add_component(task)?;
    Ok(events)
}

/// 注册并启动监视器，生成器必须已经注册
///
/// `generator_period` 用于把相邻两行的位移换算成速度。
pub fn spawn_monitor(
    manager: &ComponentManager,
    config: TaskConfig,
    generator_period: Duration,
    collect: bool,
) -> Result<Option<Receiver<CollectionEvent>>, TaskError> {
    let main = manager.interface(GENERATOR, MAIN_INTERFACE)?;

    let mut builder = manager.task_builder(config)?;
    let table = builder.state_table_mut();
    let speed = table.new_element("speed", 0.0f64)?;
    let turns = table.new_element("turns", 0u64)?;
    let retries = table.new_element("retries", 0u64)?;
    let events = collect.then(|| table.collection_events(COLLECTION_EVENT_CAPACITY));

    let task = builder.spawn(Monitor {
        history: main.history_function("GetPositionHistory")?,
        wrapped: main.subscribe::<u64>("Wrapped", 16)?,
        speed,
        turns,
        retries,
        generator_period: generator_period.as_secs_f64(),
        turn_count: 0,
        retry_count: 0,
    })?;
    manager.add_component(task)?;
    Ok(events)
}
