//! 组件管理器
//!
//! 管理器拥有所有周期任务和一个共享时间源。接口与状态表的查找走 `ArcSwap`
//! 目录（无锁）；任务句柄本身放在 `Mutex` 后面，只在启停和清理时加锁。

use crate::config::TaskConfig;
use crate::error::TaskError;
use crate::interface::InterfaceProvided;
use crate::metrics::TaskMetricsSnapshot;
use crate::state::TaskState;
use crate::task::{PeriodicTask, PeriodicTaskBuilder};
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tickstate_table::{StateTable, SystemTimeServer, TimeServer};
use tracing::{debug, error, info};

/// 清理时每个任务的等待时间
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(2);

/// 目录项：组件对外可见的部分
#[derive(Debug)]
struct ComponentEntry {
    interfaces: Vec<InterfaceProvided>,
    tables: Vec<(String, StateTable)>,
}

type Directory = HashMap<String, Arc<ComponentEntry>>;

/// 组件管理器
///
/// # 示例
///
/// ```rust,no_run
/// use tickstate_task::{ComponentManager, CycleContext, TaskConfig, TaskLogic, TaskState};
/// use std::time::Duration;
///
/// struct Idle;
///
/// impl TaskLogic for Idle {
///     type Error = std::convert::Infallible;
///     fn run(&mut self, _ctx: &mut CycleContext<'_>) -> Result<(), Self::Error> {
///         Ok(())
///     }
/// }
///
/// let manager = ComponentManager::new();
/// let builder = manager.task_builder(TaskConfig::new("idle", 100.0))?;
/// manager.add_component(builder.spawn(Idle)?)?;
/// manager.start_all()?;
/// manager.wait_for_state_all(TaskState::Active, Duration::from_secs(1))?;
/// manager.cleanup();
/// # Ok::<(), tickstate_task::TaskError>(())
/// ```
pub struct ComponentManager {
    time_server: Arc<dyn TimeServer>,
    directory: ArcSwap<Directory>,
    tasks: Mutex<Vec<PeriodicTask>>,
}

impl ComponentManager {
    /// 使用系统单调时钟
    pub fn new() -> Self {
        Self::with_time_server(Arc::new(SystemTimeServer::new()))
    }

    pub fn with_time_server(time_server: Arc<dyn TimeServer>) -> Self {
        Self {
            time_server,
            directory: ArcSwap::from_pointee(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// 所有任务共享的时间源
    pub fn time_server(&self) -> Arc<dyn TimeServer> {
        self.time_server.clone()
    }

    /// 创建使用共享时间源的任务构建器
    pub fn task_builder(&self, config: TaskConfig) -> Result<PeriodicTaskBuilder, TaskError> {
        if self.directory.load().contains_key(&config.name) {
            return Err(TaskError::DuplicateComponent(config.name));
        }
        PeriodicTaskBuilder::new(config, self.time_server.clone())
    }

    /// 登记一个已启动线程的任务
    pub fn add_component(&self, task: PeriodicTask) -> Result<(), TaskError> {
        let mut tasks = self.tasks.lock();
        let name = task.name().to_string();
        if self.directory.load().contains_key(&name) {
            return Err(TaskError::DuplicateComponent(name));
        }

        let entry = Arc::new(ComponentEntry {
            interfaces: task
                .interface_names()
                .filter_map(|n| task.interface(n).ok())
                .collect(),
            tables: task
                .state_table_names()
                .filter_map(|n| task.state_table(n).ok().map(|t| (n.to_string(), t)))
                .collect(),
        });
        self.directory.rcu(|old| {
            let mut directory = Directory::clone(old);
            directory.insert(name.clone(), entry.clone());
            directory
        });
        tasks.push(task);
        debug!("Component '{}' added", name);
        Ok(())
    }

    /// 所有组件名（排序）
    pub fn component_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.directory.load().keys().cloned().collect();
        names.sort();
        names
    }

    fn entry(&self, component: &str) -> Result<Arc<ComponentEntry>, TaskError> {
        self.directory
            .load()
            .get(component)
            .cloned()
            .ok_or_else(|| TaskError::UnknownComponent(component.to_string()))
    }

    /// 查找组件的提供接口（无锁）
    pub fn interface(&self, component: &str, name: &str) -> Result<InterfaceProvided, TaskError> {
        self.entry(component)?
            .interfaces
            .iter()
            .find(|i| i.name() == name)
            .cloned()
            .ok_or_else(|| TaskError::UnknownInterface {
                component: component.to_string(),
                interface: name.to_string(),
            })
    }

    /// 查找组件的状态表（无锁）
    pub fn state_table(&self, component: &str, table: &str) -> Result<StateTable, TaskError> {
        self.entry(component)?
            .tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, t)| t.clone())
            .ok_or_else(|| TaskError::UnknownStateTable {
                component: component.to_string(),
                table: table.to_string(),
            })
    }

    fn with_task<R>(&self, name: &str, f: impl FnOnce(&PeriodicTask) -> R) -> Result<R, TaskError> {
        let tasks = self.tasks.lock();
        tasks
            .iter()
            .find(|t| t.name() == name)
            .map(f)
            .ok_or_else(|| TaskError::UnknownComponent(name.to_string()))
    }

    /// 组件当前状态
    pub fn component_state(&self, name: &str) -> Result<TaskState, TaskError> {
        self.with_task(name, |t| t.state())
    }

    /// 组件运行指标
    pub fn component_metrics(&self, name: &str) -> Result<TaskMetricsSnapshot, TaskError> {
        self.with_task(name, |t| t.metrics())
    }

    /// 所有组件的指标（按名称排序）
    pub fn metrics_all(&self) -> Vec<(String, TaskMetricsSnapshot)> {
        let tasks = self.tasks.lock();
        let mut metrics: Vec<_> = tasks
            .iter()
            .map(|t| (t.name().to_string(), t.metrics()))
            .collect();
        metrics.sort_by(|a, b| a.0.cmp(&b.0));
        metrics
    }

    /// 启动组件
    pub fn start(&self, name: &str) -> Result<(), TaskError> {
        self.with_task(name, |t| t.start())?
    }

    /// 启动所有组件
    pub fn start_all(&self) -> Result<(), TaskError> {
        let tasks = self.tasks.lock();
        for task in tasks.iter() {
            task.start()?;
        }
        info!("Started {} components", tasks.len());
        Ok(())
    }

    /// 暂停所有组件
    pub fn suspend_all(&self) -> Result<(), TaskError> {
        let tasks = self.tasks.lock();
        for task in tasks.iter() {
            task.suspend()?;
        }
        Ok(())
    }

    /// 终止所有组件（不等待）
    pub fn kill_all(&self) {
        let tasks = self.tasks.lock();
        for task in tasks.iter() {
            task.kill();
        }
    }

    /// 等待所有组件进入 `state`
    pub fn wait_for_state_all(&self, state: TaskState, timeout: Duration) -> Result<(), TaskError> {
        let deadline = Instant::now() + timeout;
        let tasks = self.tasks.lock();
        for task in tasks.iter() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            task.wait_for_state(state, remaining)?;
        }
        Ok(())
    }

    /// 终止并回收所有组件，清空目录
    ///
    /// 之后管理器可以继续添加新组件。
    pub fn cleanup(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        if tasks.is_empty() {
            return;
        }
        for task in &tasks {
            task.kill();
        }
        for task in &tasks {
            if let Err(e) = task.wait_to_terminate(CLEANUP_TIMEOUT) {
                error!("Component '{}' failed to terminate: {}", task.name(), e);
            }
        }
        self.directory.store(Arc::new(HashMap::new()));
        info!("Cleaned up {} components", tasks.len());
    }
}

impl Default for ComponentManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ComponentManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentManager")
            .field("components", &self.component_names())
            .finish()
    }
}

impl Drop for ComponentManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{CycleContext, DEFAULT_STATE_TABLE, TaskLogic};
    use serial_test::serial;
    use tickstate_table::StateHandle;

    struct Ramp {
        value: StateHandle<f64>,
    }

    impl TaskLogic for Ramp {
        type Error = TaskError;

        fn run(&mut self, ctx: &mut CycleContext<'_>) -> Result<(), TaskError> {
            let cycle = ctx.cycle() as f64;
            ctx.state_table().write(self.value, cycle)?;
            Ok(())
        }
    }

    fn add_ramp(manager: &ComponentManager, name: &str) {
        let mut builder = manager.task_builder(TaskConfig::new(name, 200.0)).unwrap();
        let value = builder.state_table_mut().new_element("value", 0.0f64).unwrap();
        builder
            .provided_interface("Main")
            .add_command_read_state("GetValue", value)
            .unwrap();
        manager.add_component(builder.spawn(Ramp { value }).unwrap()).unwrap();
    }

    #[test]
    #[serial]
    fn test_directory_lookups() {
        let manager = ComponentManager::new();
        add_ramp(&manager, "b");
        add_ramp(&manager, "a");
        assert_eq!(manager.component_names(), vec!["a", "b"]);

        assert!(manager.interface("a", "Main").is_ok());
        assert!(manager.state_table("a", DEFAULT_STATE_TABLE).is_ok());
        assert!(matches!(
            manager.interface("c", "Main"),
            Err(TaskError::UnknownComponent(_))
        ));
        assert!(matches!(
            manager.interface("a", "Other"),
            Err(TaskError::UnknownInterface { .. })
        ));
        assert!(matches!(
            manager.task_builder(TaskConfig::new("a", 10.0)),
            Err(TaskError::DuplicateComponent(_))
        ));
    }

    #[test]
    #[serial]
    fn test_start_suspend_cleanup() {
        let manager = ComponentManager::new();
        add_ramp(&manager, "ramp");
        manager
            .wait_for_state_all(TaskState::Ready, Duration::from_secs(2))
            .unwrap();

        manager.start_all().unwrap();
        manager
            .wait_for_state_all(TaskState::Active, Duration::from_secs(2))
            .unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let read = manager
            .interface("ramp", "Main")
            .unwrap()
            .read_function::<f64>("GetValue")
            .unwrap();
        assert!(read.call().unwrap() > 0.0);
        assert!(manager.component_metrics("ramp").unwrap().cycles_total > 0);

        manager.suspend_all().unwrap();
        manager
            .wait_for_state_all(TaskState::Ready, Duration::from_secs(2))
            .unwrap();

        manager.cleanup();
        assert!(manager.component_names().is_empty());
        assert!(matches!(
            manager.component_state("ramp"),
            Err(TaskError::UnknownComponent(_))
        ));
        // 读端在组件清理后仍可读最后发布的数据
        assert!(read.call().is_ok());
    }
}
