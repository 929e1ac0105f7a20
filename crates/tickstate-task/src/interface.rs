//! 提供接口：命令与事件
//!
//! 组件在注册阶段通过 [`InterfaceProvidedBuilder`] 声明命令和事件，`spawn()`
//! 时绑定到已构建的状态表，得到不可变、可克隆的 [`InterfaceProvided`]。
//!
//! | 种类 | 注册 | 调用端 | 执行位置 |
//! |------|------|--------|----------|
//! | 读状态 | `add_command_read_state` | [`ReadFunction`] | 调用线程（无锁读） |
//! | 读历史 | `add_command_read_history` | [`HistoryFunction`] | 调用线程（无锁读） |
//! | 写 | `add_command_write` | [`WriteFunction`] | 任务线程（排空 [`Mailbox`]） |
//! | 空命令 | `add_command_void` | [`VoidFunction`] | 任务线程 |
//! | 事件 | `add_event_write` / `add_event_void` | `subscribe` | 发布线程 `try_send` |
//!
//! 命令种类与参数类型只在绑定时检查一次，调用路径上没有类型判断。

use crate::error::TaskError;
use crate::task::DEFAULT_STATE_TABLE;
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tickstate_table::{Accessor, History, StateHandle, StateIndex, StateTable, StateValue};
use tracing::{debug, warn};

/// 命令种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    ReadState,
    ReadHistory,
    Write,
    Void,
    Event,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadState => "read-state",
            Self::ReadHistory => "read-history",
            Self::Write => "write",
            Self::Void => "void",
            Self::Event => "event",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 已绑定的命令
struct Command {
    kind: CommandKind,
    type_name: &'static str,
    payload: Arc<dyn Any + Send + Sync>,
}

/// 等待绑定到状态表的读命令
trait PendingRead: Send {
    fn bind(self: Box<Self>, tables: &[(String, StateTable)]) -> Result<Command, TaskError>;
}

struct PendingAccessor<T> {
    component: String,
    table: String,
    handle: StateHandle<T>,
    kind: CommandKind,
}

impl<T: StateValue> PendingRead for PendingAccessor<T> {
    fn bind(self: Box<Self>, tables: &[(String, StateTable)]) -> Result<Command, TaskError> {
        let table = tables
            .iter()
            .find(|(name, _)| *name == self.table)
            .map(|(_, table)| table)
            .ok_or_else(|| TaskError::UnknownStateTable {
                component: self.component.clone(),
                table: self.table.clone(),
            })?;
        let accessor: Accessor<T> = table.accessor(self.handle)?;
        Ok(Command {
            kind: self.kind,
            type_name: type_name::<T>(),
            payload: Arc::new(accessor),
        })
    }
}

enum Entry {
    Pending(Box<dyn PendingRead>),
    Ready(Command),
}

/// 提供接口构建器（注册阶段）
pub struct InterfaceProvidedBuilder {
    component: String,
    name: String,
    mailbox_capacity: usize,
    entries: Vec<(String, Entry)>,
}

impl InterfaceProvidedBuilder {
    pub(crate) fn new(component: &str, name: &str, mailbox_capacity: usize) -> Self {
        Self {
            component: component.to_string(),
            name: name.to_string(),
            mailbox_capacity: mailbox_capacity.max(1),
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn insert(&mut self, command: &str, entry: Entry) -> Result<(), TaskError> {
        if self.entries.iter().any(|(name, _)| name == command) {
            return Err(TaskError::DuplicateCommand(command.to_string()));
        }
        self.entries.push((command.to_string(), entry));
        Ok(())
    }

    fn pending<T: StateValue>(
        &mut self,
        command: &str,
        table: &str,
        handle: StateHandle<T>,
        kind: CommandKind,
    ) -> Result<(), TaskError> {
        let pending = PendingAccessor {
            component: self.component.clone(),
            table: table.to_string(),
            handle,
            kind,
        };
        self.insert(command, Entry::Pending(Box::new(pending)))
    }

    /// 读最新状态（默认状态表中的列）
    pub fn add_command_read_state<T: StateValue>(
        &mut self,
        command: &str,
        handle: StateHandle<T>,
    ) -> Result<(), TaskError> {
        self.pending(command, DEFAULT_STATE_TABLE, handle, CommandKind::ReadState)
    }

    /// 读最新状态（指定状态表中的列）
    pub fn add_command_read_state_from<T: StateValue>(
        &mut self,
        command: &str,
        table: &str,
        handle: StateHandle<T>,
    ) -> Result<(), TaskError> {
        self.pending(command, table, handle, CommandKind::ReadState)
    }

    /// 读一段历史（默认状态表中的列）
    pub fn add_command_read_history<T: StateValue>(
        &mut self,
        command: &str,
        handle: StateHandle<T>,
    ) -> Result<(), TaskError> {
        self.pending(command, DEFAULT_STATE_TABLE, handle, CommandKind::ReadHistory)
    }

    /// 读一段历史（指定状态表中的列）
    pub fn add_command_read_history_from<T: StateValue>(
        &mut self,
        command: &str,
        table: &str,
        handle: StateHandle<T>,
    ) -> Result<(), TaskError> {
        self.pending(command, table, handle, CommandKind::ReadHistory)
    }

    /// 写命令：返回任务逻辑排空的邮箱
    pub fn add_command_write<T: Send + 'static>(
        &mut self,
        command: &str,
    ) -> Result<Mailbox<T>, TaskError> {
        let (tx, rx) = crossbeam_channel::bounded::<T>(self.mailbox_capacity);
        self.insert(
            command,
            Entry::Ready(Command {
                kind: CommandKind::Write,
                type_name: type_name::<T>(),
                payload: Arc::new(tx),
            }),
        )?;
        Ok(Mailbox {
            command: command.to_string(),
            rx,
        })
    }

    /// 空命令（无参数）
    pub fn add_command_void(&mut self, command: &str) -> Result<Mailbox<()>, TaskError> {
        let (tx, rx) = crossbeam_channel::bounded::<()>(self.mailbox_capacity);
        self.insert(
            command,
            Entry::Ready(Command {
                kind: CommandKind::Void,
                type_name: type_name::<()>(),
                payload: Arc::new(tx),
            }),
        )?;
        Ok(Mailbox {
            command: command.to_string(),
            rx,
        })
    }

    /// 带参数的事件
    pub fn add_event_write<T: Clone + Send + 'static>(
        &mut self,
        event: &str,
    ) -> Result<EventPublisher<T>, TaskError> {
        let publisher = EventPublisher::new(event);
        self.insert(
            event,
            Entry::Ready(Command {
                kind: CommandKind::Event,
                type_name: type_name::<T>(),
                payload: Arc::new(publisher.clone()),
            }),
        )?;
        Ok(publisher)
    }

    /// 无参数事件
    pub fn add_event_void(&mut self, event: &str) -> Result<EventPublisher<()>, TaskError> {
        self.add_event_write::<()>(event)
    }

    /// 绑定到已构建的状态表
    pub(crate) fn bind(
        self,
        tables: &[(String, StateTable)],
    ) -> Result<InterfaceProvided, TaskError> {
        let mut commands = HashMap::with_capacity(self.entries.len());
        for (name, entry) in self.entries {
            let command = match entry {
                Entry::Pending(pending) => pending.bind(tables)?,
                Entry::Ready(command) => command,
            };
            commands.insert(name, command);
        }
        debug!(
            "Component '{}': interface '{}' bound with {} commands/events",
            self.component,
            self.name,
            commands.len()
        );
        Ok(InterfaceProvided {
            inner: Arc::new(ProvidedInner {
                component: self.component,
                name: self.name,
                commands,
            }),
        })
    }
}

impl fmt::Debug for InterfaceProvidedBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceProvidedBuilder")
            .field("component", &self.component)
            .field("name", &self.name)
            .field(
                "commands",
                &self.entries.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

struct ProvidedInner {
    component: String,
    name: String,
    commands: HashMap<String, Command>,
}

/// 已绑定的提供接口（可克隆，线程安全）
#[derive(Clone)]
pub struct InterfaceProvided {
    inner: Arc<ProvidedInner>,
}

impl InterfaceProvided {
    pub fn component(&self) -> &str {
        &self.inner.component
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// 所有命令和事件名
    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.inner.commands.keys().map(String::as_str)
    }

    /// 查找命令并检查种类和类型
    fn payload<P: Any + Send + Sync>(
        &self,
        command: &str,
        kind: CommandKind,
        requested: &'static str,
    ) -> Result<Arc<P>, TaskError> {
        let entry = self
            .inner
            .commands
            .get(command)
            .ok_or_else(|| TaskError::UnknownCommand(command.to_string()))?;
        if entry.kind != kind {
            return Err(TaskError::CommandKindMismatch {
                command: command.to_string(),
                expected: kind.as_str(),
                actual: entry.kind.as_str(),
            });
        }
        entry
            .payload
            .clone()
            .downcast::<P>()
            .map_err(|_| TaskError::TypeMismatch {
                command: command.to_string(),
                stored: entry.type_name,
                requested,
            })
    }

    pub fn read_function<T: StateValue>(&self, command: &str) -> Result<ReadFunction<T>, TaskError> {
        let accessor =
            self.payload::<Accessor<T>>(command, CommandKind::ReadState, type_name::<T>())?;
        Ok(ReadFunction {
            accessor: (*accessor).clone(),
        })
    }

    pub fn history_function<T: StateValue>(
        &self,
        command: &str,
    ) -> Result<HistoryFunction<T>, TaskError> {
        let accessor =
            self.payload::<Accessor<T>>(command, CommandKind::ReadHistory, type_name::<T>())?;
        Ok(HistoryFunction {
            accessor: (*accessor).clone(),
        })
    }

    pub fn write_function<T: Send + 'static>(
        &self,
        command: &str,
    ) -> Result<WriteFunction<T>, TaskError> {
        let tx = self.payload::<Sender<T>>(command, CommandKind::Write, type_name::<T>())?;
        Ok(WriteFunction {
            command: command.to_string(),
            tx: (*tx).clone(),
        })
    }

    pub fn void_function(&self, command: &str) -> Result<VoidFunction, TaskError> {
        let tx = self.payload::<Sender<()>>(command, CommandKind::Void, type_name::<()>())?;
        Ok(VoidFunction {
            inner: WriteFunction {
                command: command.to_string(),
                tx: (*tx).clone(),
            },
        })
    }

    /// 订阅事件，返回容量为 `capacity` 的接收端
    pub fn subscribe<T: Clone + Send + 'static>(
        &self,
        event: &str,
        capacity: usize,
    ) -> Result<Receiver<T>, TaskError> {
        let publisher =
            self.payload::<EventPublisher<T>>(event, CommandKind::Event, type_name::<T>())?;
        Ok(publisher.subscribe(capacity))
    }
}

impl fmt::Debug for InterfaceProvided {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceProvided")
            .field("component", &self.inner.component)
            .field("name", &self.inner.name)
            .field("commands", &self.inner.commands.len())
            .finish()
    }
}

/// 读最新状态
#[derive(Debug, Clone)]
pub struct ReadFunction<T> {
    accessor: Accessor<T>,
}

impl<T: StateValue> ReadFunction<T> {
    /// 读最新发布的值
    pub fn call(&self) -> Result<T, TaskError> {
        Ok(self.accessor.get_latest()?)
    }

    /// 读指定索引处的值
    pub fn call_at(&self, when: StateIndex) -> Result<T, TaskError> {
        Ok(self.accessor.get(when)?)
    }

    /// 读最新值并返回其索引
    pub fn call_with_index(&self) -> Result<(StateIndex, T), TaskError> {
        Ok(self.accessor.get_latest_with_index()?)
    }
}

/// 读历史
#[derive(Debug, Clone)]
pub struct HistoryFunction<T> {
    accessor: Accessor<T>,
}

impl<T: StateValue> HistoryFunction<T> {
    /// 以最新发布的行结尾的 `n` 行
    pub fn call(&self, n: usize) -> Result<History<T>, TaskError> {
        Ok(self.accessor.get_latest_history(n)?)
    }

    /// 以 `end` 结尾的 `n` 行
    pub fn call_at(&self, end: StateIndex, n: usize) -> Result<History<T>, TaskError> {
        Ok(self.accessor.get_history(end, n)?)
    }
}

/// 写命令调用端
///
/// 使用 `try_send`，调用线程永不阻塞。
#[derive(Debug, Clone)]
pub struct WriteFunction<T> {
    command: String,
    tx: Sender<T>,
}

impl<T: Send + 'static> WriteFunction<T> {
    pub fn call(&self, value: T) -> Result<(), TaskError> {
        self.tx.try_send(value).map_err(|e| match e {
            TrySendError::Full(_) => TaskError::MailboxFull(self.command.clone()),
            TrySendError::Disconnected(_) => TaskError::Disconnected(self.command.clone()),
        })
    }
}

/// 空命令调用端
#[derive(Debug, Clone)]
pub struct VoidFunction {
    inner: WriteFunction<()>,
}

impl VoidFunction {
    pub fn call(&self) -> Result<(), TaskError> {
        self.inner.call(())
    }
}

/// 写命令邮箱（任务线程持有）
#[derive(Debug)]
pub struct Mailbox<T> {
    command: String,
    rx: Receiver<T>,
}

impl<T> Mailbox<T> {
    pub fn command(&self) -> &str {
        &self.command
    }

    /// 取出一条命令
    pub fn try_recv(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// 取出当前所有命令
    pub fn drain(&self) -> impl Iterator<Item = T> + '_ {
        self.rx.try_iter()
    }

    /// 取出所有命令，只保留最后一条
    pub fn latest(&self) -> Option<T> {
        self.rx.try_iter().last()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// 事件发布端
///
/// 订阅者列表是写时复制的 `ArcSwap`，发布路径只有一次无锁加载。
pub struct EventPublisher<T> {
    event: Arc<str>,
    subscribers: Arc<ArcSwap<Vec<Sender<T>>>>,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for EventPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            event: self.event.clone(),
            subscribers: self.subscribers.clone(),
            dropped: self.dropped.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> EventPublisher<T> {
    fn new(event: &str) -> Self {
        Self {
            event: Arc::from(event),
            subscribers: Arc::new(ArcSwap::from_pointee(Vec::new())),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub(crate) fn subscribe(&self, capacity: usize) -> Receiver<T> {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        self.subscribers.rcu(|old| {
            let mut list = Vec::clone(old);
            list.push(tx.clone());
            list
        });
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load().len()
    }

    /// 因订阅者队列满而丢弃的事件数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 发给所有订阅者，返回成功投递数
    ///
    /// 已断开的订阅者会被移除。
    pub fn publish(&self, value: T) -> usize {
        let subscribers = self.subscribers.load();
        let mut delivered = 0;
        let mut closed: Vec<Sender<T>> = Vec::new();
        for tx in subscribers.iter() {
            match tx.try_send(value.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("Event '{}': subscriber queue full, event dropped", self.event);
                },
                Err(TrySendError::Disconnected(_)) => closed.push(tx.clone()),
            }
        }
        if !closed.is_empty() {
            debug!("Event '{}': removing {} closed subscribers", self.event, closed.len());
            self.subscribers.rcu(|old| {
                old.iter()
                    .filter(|tx| !closed.iter().any(|c| c.same_channel(tx)))
                    .cloned()
                    .collect::<Vec<_>>()
            });
        }
        delivered
    }
}

impl EventPublisher<()> {
    /// 发布无参数事件
    pub fn notify(&self) -> usize {
        self.publish(())
    }
}

impl<T> fmt::Debug for EventPublisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPublisher")
            .field("event", &self.event)
            .field("subscribers", &self.subscribers.load().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickstate_table::StateTableBuilder;

    fn bound_interface() -> (InterfaceProvided, tickstate_table::StateTableWriter, Mailbox<f64>) {
        let mut builder = StateTableBuilder::new(DEFAULT_STATE_TABLE, 8);
        let position = builder.new_element("position", 0.0f64).unwrap();
        let mut writer = builder.build();
        let tables = vec![(DEFAULT_STATE_TABLE.to_string(), writer.reader())];

        let mut interface = InterfaceProvidedBuilder::new("robot", "Main", 2);
        interface.add_command_read_state("GetPosition", position).unwrap();
        interface.add_command_read_history("GetPositionHistory", position).unwrap();
        let mailbox = interface.add_command_write::<f64>("SetGoal").unwrap();
        let bound = interface.bind(&tables).unwrap();

        for k in 1..=3 {
            writer.write(position, k as f64).unwrap();
            writer.advance();
        }
        (bound, writer, mailbox)
    }

    #[test]
    fn test_read_and_history_functions() {
        let (interface, _writer, _mailbox) = bound_interface();
        let read = interface.read_function::<f64>("GetPosition").unwrap();
        assert_eq!(read.call().unwrap(), 3.0);

        let history = interface.history_function::<f64>("GetPositionHistory").unwrap();
        assert_eq!(history.call(3).unwrap().values(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_write_function_and_mailbox() {
        let (interface, _writer, mailbox) = bound_interface();
        let write = interface.write_function::<f64>("SetGoal").unwrap();
        write.call(1.0).unwrap();
        write.call(2.0).unwrap();
        assert!(matches!(write.call(3.0), Err(TaskError::MailboxFull(_))));
        assert_eq!(mailbox.len(), 2);
        assert_eq!(mailbox.latest(), Some(2.0));
        assert!(mailbox.is_empty());

        drop(mailbox);
        assert!(matches!(write.call(4.0), Err(TaskError::Disconnected(_))));
    }

    #[test]
    fn test_bind_checks_kind_and_type() {
        let (interface, _writer, _mailbox) = bound_interface();
        assert!(matches!(
            interface.write_function::<f64>("GetPosition"),
            Err(TaskError::CommandKindMismatch { expected: "write", actual: "read-state", .. })
        ));
        assert!(matches!(
            interface.read_function::<f32>("GetPosition"),
            Err(TaskError::TypeMismatch { .. })
        ));
        assert!(matches!(
            interface.read_function::<f64>("Missing"),
            Err(TaskError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_duplicate_command_rejected() {
        let mut interface = InterfaceProvidedBuilder::new("robot", "Main", 4);
        interface.add_command_void("Home").unwrap();
        assert!(matches!(
            interface.add_event_void("Home"),
            Err(TaskError::DuplicateCommand(_))
        ));
    }

    #[test]
    fn test_unknown_table_at_bind() {
        let mut builder = StateTableBuilder::new("Other", 4);
        let value = builder.new_element("v", 0u32).unwrap();
        let _writer = builder.build();

        let mut interface = InterfaceProvidedBuilder::new("robot", "Main", 4);
        interface.add_command_read_state("GetV", value).unwrap();
        assert!(matches!(
            interface.bind(&[]),
            Err(TaskError::UnknownStateTable { .. })
        ));
    }

    #[test]
    fn test_events_reach_all_subscribers() {
        let mut builder = InterfaceProvidedBuilder::new("robot", "Main", 4);
        let publisher = builder.add_event_write::<u32>("Error").unwrap();
        let void = builder.add_event_void("Homed").unwrap();
        let interface = builder.bind(&[]).unwrap();

        let a = interface.subscribe::<u32>("Error", 4).unwrap();
        let b = interface.subscribe::<u32>("Error", 1).unwrap();
        assert_eq!(publisher.publish(7), 2);
        assert_eq!(publisher.publish(8), 1);
        assert_eq!(publisher.dropped(), 1);
        assert_eq!(a.try_iter().collect::<Vec<_>>(), vec![7, 8]);
        assert_eq!(b.try_recv().unwrap(), 7);

        drop(a);
        drop(b);
        assert_eq!(publisher.publish(9), 0);
        assert_eq!(publisher.subscriber_count(), 0);

        let homed = interface.subscribe::<()>("Homed", 1).unwrap();
        assert_eq!(void.notify(), 1);
        assert!(homed.try_recv().is_ok());
    }

    #[test]
    fn test_void_function() {
        let mut builder = InterfaceProvidedBuilder::new("robot", "Main", 4);
        let mailbox = builder.add_command_void("Home").unwrap();
        let interface = builder.bind(&[]).unwrap();
        interface.void_function("Home").unwrap().call().unwrap();
        assert_eq!(mailbox.drain().count(), 1);
    }
}
