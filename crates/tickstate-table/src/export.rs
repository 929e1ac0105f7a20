//! 文本导出：表结构描述、调试转储、CSV
//!
//! 导出与读者走同一套“拷贝整行、校验 tick”的路径，不参与并发约束；
//! 导出过程中被写线程覆盖的行直接跳过。

use crate::error::StateError;
use crate::index::ColumnId;
use crate::table::StateTable;
use std::fmt::{self, Write as _};
use std::io;
use tracing::trace;

/// CSV 导出选项
#[derive(Debug, Clone)]
pub struct CsvOptions {
    /// 字段分隔符
    pub delimiter: char,
    /// 跳过从未发布过的初始快照行（tick 0）
    pub non_zero_only: bool,
    /// 只导出这些列（`None` 表示全部）
    pub columns: Option<Vec<ColumnId>>,
    /// 是否写列头
    pub header: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            non_zero_only: false,
            columns: None,
            header: true,
        }
    }
}

impl StateTable {
    /// 表结构描述：`State Table: <name>` 与 `[id]name` 列表
    pub fn to_stream(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "State Table: {}", self.name())?;
        out.write_str("Ticks")?;
        for (i, column) in self.shared.columns.iter().enumerate() {
            if !column.name.is_empty() {
                write!(out, " : [{}]{}", i, column.name)?;
            }
        }
        out.write_char('\n')
    }

    /// 调试转储：按物理行输出，`R` 标记读索引，`W` 标记写行
    ///
    /// 写行和转储期间被覆盖的行只输出 tick，不输出数据。
    pub fn debug_dump(
        &self,
        out: &mut dyn fmt::Write,
        columns: Option<&[ColumnId]>,
    ) -> Result<(), StateError> {
        let shared = &self.shared;
        let selected = self.selected_columns(columns)?;
        let reader = self.get_index_reader();

        self.to_stream(out)?;
        let mut row_buf = vec![0u64; shared.arena.row_stride()];
        for row in 0..self.history_length() {
            let ticks = shared.ticks[row].load(std::sync::atomic::Ordering::Acquire);
            let marker = if row == reader.row() {
                'R'
            } else if ticks > reader.ticks() {
                'W'
            } else {
                ' '
            };
            write!(out, "{marker}{row:>4} {ticks:>8}:")?;

            let index = shared.index(ticks);
            if marker == 'W' || index.row() != row {
                out.write_char('\n')?;
                continue;
            }
            match shared.read_row(index, |arena, r| arena.copy_row(r, &mut row_buf)) {
                Ok(()) => {
                    for id in &selected {
                        let column = &shared.columns[id.get()];
                        let layout = column.layout;
                        write!(out, " [{id}] ")?;
                        column.format.write_words(
                            &row_buf[layout.offset..layout.offset + layout.stride],
                            ' ',
                            out,
                        )?;
                    }
                },
                Err(_) => out.write_str(" (overwritten)")?,
            }
            out.write_char('\n')?;
        }
        Ok(())
    }

    /// 导出全部列为 CSV（时间顺序，最旧在前），返回写出的数据行数
    pub fn csv_write(&self, out: &mut dyn io::Write, non_zero_only: bool) -> io::Result<usize> {
        self.csv_write_with(
            out,
            &CsvOptions {
                non_zero_only,
                ..CsvOptions::default()
            },
        )
    }

    /// 导出指定列为 CSV
    pub fn csv_write_columns(
        &self,
        out: &mut dyn io::Write,
        columns: &[ColumnId],
        non_zero_only: bool,
    ) -> io::Result<usize> {
        self.csv_write_with(
            out,
            &CsvOptions {
                non_zero_only,
                columns: Some(columns.to_vec()),
                ..CsvOptions::default()
            },
        )
    }

    /// 按选项导出 CSV
    pub fn csv_write_with(&self, out: &mut dyn io::Write, options: &CsvOptions) -> io::Result<usize> {
        let shared = &self.shared;
        let selected = self
            .selected_columns(options.columns.as_deref())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let d = options.delimiter;
        let mut line = String::new();

        if options.header {
            line.push_str("ticks");
            for id in &selected {
                let column = &shared.columns[id.get()];
                line.push(d);
                column
                    .format
                    .write_header(&column.name, d, &mut line)
                    .map_err(io::Error::other)?;
            }
            line.push('\n');
            out.write_all(line.as_bytes())?;
        }

        let published = shared.published();
        let mut first = shared.oldest_ticks(published);
        if options.non_zero_only {
            first = first.max(1);
        }

        let mut rows = 0;
        let mut row_buf = vec![0u64; shared.arena.row_stride()];
        for ticks in first..=published {
            let index = shared.index(ticks);
            if shared
                .read_row(index, |arena, row| arena.copy_row(row, &mut row_buf))
                .is_err()
            {
                trace!("State table '{}': row {} overwritten during export", self.name(), index);
                continue;
            }
            line.clear();
            write!(line, "{ticks}").map_err(io::Error::other)?;
            for id in &selected {
                let column = &shared.columns[id.get()];
                let layout = column.layout;
                line.push(d);
                column
                    .format
                    .write_words(&row_buf[layout.offset..layout.offset + layout.stride], d, &mut line)
                    .map_err(io::Error::other)?;
            }
            line.push('\n');
            out.write_all(line.as_bytes())?;
            rows += 1;
        }
        Ok(rows)
    }

    fn selected_columns(&self, columns: Option<&[ColumnId]>) -> Result<Vec<ColumnId>, StateError> {
        match columns {
            Some(ids) => {
                for id in ids {
                    self.shared.column(*id)?;
                }
                Ok(ids.to_vec())
            },
            None => Ok((0..self.number_of_columns()).map(ColumnId::new).collect()),
        }
    }
}

impl fmt::Display for StateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_stream(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::StateTableBuilder;

    fn sample_table() -> (crate::StateTableWriter, crate::StateHandle<u32>, crate::StateHandle<[f32; 2]>) {
        let mut builder = StateTableBuilder::new("Sample", 4);
        let x = builder.new_element("x", 0u32).unwrap();
        let v = builder.new_element("v", [0.0f32; 2]).unwrap();
        (builder.build(), x, v)
    }

    #[test]
    fn test_to_stream() {
        let (writer, _, _) = sample_table();
        let text = writer.reader().to_string();
        assert_eq!(
            text,
            "State Table: Sample\nTicks : [0]Toc : [1]Tic : [2]Period : [3]PeriodStatistics : [4]x : [5]v\n"
        );
    }

    #[test]
    fn test_csv_selected_columns() {
        let (mut writer, x, v) = sample_table();
        let table = writer.reader();
        for i in 1..=5u32 {
            writer.start();
            writer.write(x, i).unwrap();
            writer.write(v, [i as f32, 0.5]).unwrap();
            writer.advance();
        }

        let mut out = Vec::new();
        let rows = table.csv_write_columns(&mut out, &[x.id(), v.id()], true).unwrap();
        let text = String::from_utf8(out).unwrap();
        // 容量 4：可读的是 tick 3..=5
        assert_eq!(rows, 3);
        assert_eq!(text, "ticks,x,v[0],v[1]\n3,3,3,0.5\n4,4,4,0.5\n5,5,5,0.5\n");
    }

    #[test]
    fn test_csv_non_zero_only_skips_initial_row() {
        let (mut writer, x, _) = sample_table();
        let table = writer.reader();
        writer.start();
        writer.write(x, 9).unwrap();
        writer.advance();

        let mut all = Vec::new();
        assert_eq!(table.csv_write_columns(&mut all, &[x.id()], false).unwrap(), 2);
        let mut non_zero = Vec::new();
        assert_eq!(table.csv_write_columns(&mut non_zero, &[x.id()], true).unwrap(), 1);
        assert_eq!(String::from_utf8(non_zero).unwrap(), "ticks,x\n1,9\n");
    }

    #[test]
    fn test_csv_invalid_column() {
        let (writer, _, _) = sample_table();
        let mut out = Vec::new();
        let err = writer
            .reader()
            .csv_write_columns(&mut out, &[ColumnId::new(77)], false)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_csv_all_columns_header() {
        let (writer, _, _) = sample_table();
        let mut out = Vec::new();
        writer.reader().csv_write(&mut out, false).unwrap();
        let text = String::from_utf8(out).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.starts_with("ticks,Toc,Tic,Period,PeriodStatistics.period_avg"));
        assert!(header.ends_with("x,v[0],v[1]"));
    }

    #[test]
    fn test_debug_dump_markers() {
        let (mut writer, x, _) = sample_table();
        let table = writer.reader();
        for i in 1..=2u32 {
            writer.start();
            writer.write(x, i).unwrap();
            writer.advance();
        }
        let mut out = String::new();
        table.debug_dump(&mut out, Some(&[x.id()])).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        // 2 行表结构 + 4 行数据
        assert_eq!(lines.len(), 6);
        assert!(lines[2].starts_with(' ') && lines[2].ends_with("[4] 1"));
        assert!(lines[3].starts_with('R') && lines[3].ends_with("[4] 2"));
        assert!(lines[4].starts_with('W'));
        // 最后一行是初始快照（tick 0）
        assert!(lines[5].ends_with("[4] 0"));
    }
}
