//! # tickstate-table
//!
//! 固定容量、带时间戳的环形状态表：一个写线程每周期发布一行，任意多个读线程
//! 无锁读取历史快照。
//!
//! # 核心概念
//!
//! - **列**: 一个注册的状态变量（POD 类型），每行一个快照
//! - **行**: 一次 `advance()` 发布的所有列的值
//! - **tick**: 行的代数，读者拷贝数据后比较 tick 判断是否被覆盖
//!
//! # 使用流程
//!
//! ```rust
//! use tickstate_table::{StateTableBuilder, StateError};
//!
//! // 1. 注册阶段
//! let mut builder = StateTableBuilder::new("Controller", 128);
//! let q = builder.new_element("q", [0.0f64; 6]).unwrap();
//!
//! // 2. 构建：写端留在周期线程，读端可以克隆到任意线程
//! let mut writer = builder.build();
//! let table = writer.reader();
//! let q_reader = table.accessor(q).unwrap();
//!
//! // 3. 每个周期
//! writer.start();
//! writer.write(q, [0.1; 6]).unwrap();
//! writer.advance();
//!
//! // 4. 读者：先拷贝，后校验
//! match q_reader.get_latest() {
//!     Ok(q) => assert_eq!(q[0], 0.1),
//!     Err(StateError::StaleRead { .. }) => { /* 沿用上一次的值 */ },
//!     Err(e) => panic!("{e}"),
//! }
//! ```

mod accessor;
mod builder;
pub mod clock;
pub mod collection;
mod error;
mod export;
pub mod index;
mod slot;
pub mod statistics;
mod table;
mod value;
mod writer;

pub use accessor::{Accessor, AccessorBase, ColumnAccessor, History};
pub use builder::{BUILTIN_COLUMN_NAMES, DEFAULT_STATISTICS_INTERVAL, MIN_HISTORY_LENGTH, StateTableBuilder};
pub use clock::{ManualTimeServer, SystemTimeServer, TimeServer};
pub use collection::{CollectionEvent, CollectionRequest};
pub use error::StateError;
pub use export::CsvOptions;
pub use index::{ColumnId, IndexRange, StateIndex};
pub use slot::StateHandle;
pub use statistics::IntervalStatistics;
pub use table::StateTable;
pub use value::StateValue;
pub use writer::StateTableWriter;
