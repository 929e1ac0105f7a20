//! 行存储（arena）与列的类型化视图
//!
//! 所有列共享一块连续的 `AtomicU64` 数组，按行主序排列：
//!
//! ```text
//! row 0: | Toc | Tic | Period | PeriodStatistics ... | col 4 | col 5 ... |
//! row 1: | ...                                                          |
//! ```
//!
//! 每列在行内占固定步长（`ceil(size_of::<T>() / 8)` 个字），写线程每个周期
//! 把整行工作副本一次性拷入，读者按 (offset, stride) 取出自己的列。
//!
//! 数据字本身只用 `Relaxed` 访问；发布顺序由 [`StateTable`](crate::StateTable)
//! 的 tick/fence 协议保证。

use crate::index::ColumnId;
use bytemuck::Pod;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

const WORD: usize = std::mem::size_of::<u64>();

/// 类型 `T` 需要的字数
pub(crate) fn words_for<T>() -> usize {
    std::mem::size_of::<T>().div_ceil(WORD)
}

/// 把值编码进普通字缓冲（写线程的工作副本）
pub(crate) fn encode<T: Pod>(value: &T, dst: &mut [u64]) {
    let bytes = bytemuck::bytes_of(value);
    for (word, chunk) in dst.iter_mut().zip(bytes.chunks(WORD)) {
        let mut buf = [0u8; WORD];
        buf[..chunk.len()].copy_from_slice(chunk);
        *word = u64::from_ne_bytes(buf);
    }
}

/// 从普通字缓冲解码
pub(crate) fn decode<T: Pod>(src: &[u64]) -> T {
    let mut value = T::zeroed();
    let bytes = bytemuck::bytes_of_mut(&mut value);
    for (word, chunk) in src.iter().zip(bytes.chunks_mut(WORD)) {
        let buf = word.to_ne_bytes();
        chunk.copy_from_slice(&buf[..chunk.len()]);
    }
    value
}

/// 列在行内的位置（单位：字）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SlotLayout {
    pub offset: usize,
    pub stride: usize,
}

/// 所有列的历史数据
pub(crate) struct SlotArena {
    words: Box<[AtomicU64]>,
    row_stride: usize,
    history_length: usize,
}

impl SlotArena {
    /// 用初始行填满全部历史
    pub(crate) fn new(history_length: usize, initial_row: &[u64]) -> Self {
        let row_stride = initial_row.len();
        let words = (0..history_length)
            .flat_map(|_| initial_row.iter().map(|w| AtomicU64::new(*w)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            words,
            row_stride,
            history_length,
        }
    }

    pub(crate) fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub(crate) fn history_length(&self) -> usize {
        self.history_length
    }

    #[inline]
    pub(crate) fn cell(&self, row: usize, layout: SlotLayout) -> &[AtomicU64] {
        let start = row * self.row_stride + layout.offset;
        &self.words[start..start + layout.stride]
    }

    #[inline]
    fn row(&self, row: usize) -> &[AtomicU64] {
        let start = row * self.row_stride;
        &self.words[start..start + self.row_stride]
    }

    /// 写线程：整行拷入
    pub(crate) fn store_row(&self, row: usize, src: &[u64]) {
        for (dst, word) in self.row(row).iter().zip(src) {
            dst.store(*word, Ordering::Relaxed);
        }
    }

    /// 拷出整行（可能是撕裂的，由调用方校验）
    pub(crate) fn copy_row(&self, row: usize, dst: &mut [u64]) {
        for (word, src) in dst.iter_mut().zip(self.row(row)) {
            *word = src.load(Ordering::Relaxed);
        }
    }

    /// 拷出一个单元格（可能是撕裂的，由调用方校验）
    pub(crate) fn copy_cell(&self, row: usize, layout: SlotLayout, dst: &mut [u64]) {
        for (word, src) in dst.iter_mut().zip(self.cell(row, layout)) {
            *word = src.load(Ordering::Relaxed);
        }
    }
}

impl fmt::Debug for SlotArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotArena")
            .field("history_length", &self.history_length)
            .field("row_stride", &self.row_stride)
            .finish()
    }
}

/// 单列的类型化视图：知道自己的偏移和步长
pub struct TimestampedSlot<T> {
    layout: SlotLayout,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Pod> TimestampedSlot<T> {
    pub(crate) fn new(layout: SlotLayout) -> Self {
        Self {
            layout,
            _marker: PhantomData,
        }
    }

    /// 第 `row` 行的值（O(1) 拷贝，不做校验）
    #[inline]
    pub(crate) fn element(&self, arena: &SlotArena, row: usize) -> T {
        let mut value = T::zeroed();
        let bytes = bytemuck::bytes_of_mut(&mut value);
        for (chunk, word) in bytes.chunks_mut(WORD).zip(arena.cell(row, self.layout)) {
            let buf = word.load(Ordering::Relaxed).to_ne_bytes();
            chunk.copy_from_slice(&buf[..chunk.len()]);
        }
        value
    }
}

impl<T> TimestampedSlot<T> {
    pub(crate) fn layout(&self) -> SlotLayout {
        self.layout
    }
}

impl<T> Clone for TimestampedSlot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TimestampedSlot<T> {}

/// 已注册列的类型化句柄
///
/// 由 [`StateTableBuilder::new_element`](crate::StateTableBuilder::new_element) 返回，
/// 写线程用它写入，读者用它绑定 [`Accessor`](crate::Accessor)。句柄记录所属表，
/// 用在别的表上会得到 [`StateError::InvalidColumn`](crate::StateError::InvalidColumn)。
pub struct StateHandle<T> {
    pub(crate) table: u64,
    pub(crate) id: ColumnId,
    pub(crate) slot: TimestampedSlot<T>,
}

impl<T> StateHandle<T> {
    /// 列 ID
    pub fn id(&self) -> ColumnId {
        self.id
    }
}

impl<T> Clone for StateHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StateHandle<T> {}

impl<T> fmt::Debug for StateHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateHandle")
            .field("id", &self.id)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}
