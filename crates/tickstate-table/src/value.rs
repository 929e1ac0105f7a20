//! 列值类型约束
//!
//! 列值必须是 POD（`bytemuck::Pod`）：行数据以原子字存储，读者可能拷贝到
//! 被并发改写的半行，POD 保证任何位模式都是合法值，随后由 tick 校验丢弃。

use bytemuck::Pod;
use std::fmt::{self, Write};

/// 可存入状态表的列值
///
/// 除了 POD 约束外，还提供文本导出（`ToStream`/CSV）所需的两个方法。
/// 数组按元素展开为多列。
///
/// # 示例
///
/// ```rust
/// use bytemuck::{Pod, Zeroable};
/// use std::fmt::{self, Write};
/// use tickstate_table::StateValue;
///
/// #[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Pose {
///     x: f64,
///     y: f64,
/// }
///
/// impl StateValue for Pose {
///     fn write_header(name: &str, delimiter: char, out: &mut dyn Write) -> fmt::Result {
///         write!(out, "{name}.x{delimiter}{name}.y")
///     }
///
///     fn write_raw(&self, delimiter: char, out: &mut dyn Write) -> fmt::Result {
///         write!(out, "{}{delimiter}{}", self.x, self.y)
///     }
/// }
/// ```
pub trait StateValue: Pod + Send + Sync + 'static {
    /// 写出列头（默认为列名本身）
    fn write_header(name: &str, delimiter: char, out: &mut dyn Write) -> fmt::Result {
        let _ = delimiter;
        out.write_str(name)
    }

    /// 写出原始值（多字段之间用 `delimiter` 分隔）
    fn write_raw(&self, delimiter: char, out: &mut dyn Write) -> fmt::Result;
}

macro_rules! impl_state_value_scalar {
    ($($ty:ty),* $(,)?) => {
        $(
            impl StateValue for $ty {
                #[inline]
                fn write_raw(&self, _delimiter: char, out: &mut dyn Write) -> fmt::Result {
                    write!(out, "{}", self)
                }
            }
        )*
    };
}

impl_state_value_scalar!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64);

impl<T: StateValue, const N: usize> StateValue for [T; N]
where
    [T; N]: Pod,
{
    fn write_header(name: &str, delimiter: char, out: &mut dyn Write) -> fmt::Result {
        for i in 0..N {
            if i > 0 {
                out.write_char(delimiter)?;
            }
            T::write_header(&format!("{name}[{i}]"), delimiter, out)?;
        }
        Ok(())
    }

    fn write_raw(&self, delimiter: char, out: &mut dyn Write) -> fmt::Result {
        for (i, value) in self.iter().enumerate() {
            if i > 0 {
                out.write_char(delimiter)?;
            }
            value.write_raw(delimiter, out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_format() {
        let mut out = String::new();
        42u32.write_raw(',', &mut out).unwrap();
        assert_eq!(out, "42");

        let mut out = String::new();
        f64::write_header("Tic", ',', &mut out).unwrap();
        assert_eq!(out, "Tic");
    }

    #[test]
    fn test_array_expands_columns() {
        let mut header = String::new();
        <[f64; 3]>::write_header("q", ',', &mut header).unwrap();
        assert_eq!(header, "q[0],q[1],q[2]");

        let mut out = String::new();
        [1.5f64, 2.0, -3.0].write_raw(' ', &mut out).unwrap();
        assert_eq!(out, "1.5 2 -3");
    }
}
