//! 字节序处理模块
//!
//! 本模块提供大端和小端字节序的编解码功能,
//! 是 TIFF 标签、IFD 结构和瓦片像素数据读写的基础。

use eio::{FromBytes, ReadExt, ToBytes};
use num_traits::{cast::NumCast, ToPrimitive};
use std::io::{Read, Result, Write};

/// 字节序枚举
///
/// - `Big`: 大端字节序, 高位字节在前 (TIFF 头部标记 "MM")
/// - `Little`: 小端字节序, 低位字节在前 (TIFF 头部标记 "II")
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Endian {
    /// 大端字节序
    Big,
    /// 小端字节序
    Little,
}

impl Endian {
    /// 从流中读取 N 个字节并按字节序解码为指定类型
    ///
    /// # 参数
    /// * `stream` - 实现了 Read trait 的输入流
    pub fn read<const N: usize, T: FromBytes<N>>(&self, stream: &mut impl Read) -> Result<T> {
        let mut buf = [0u8; N];
        stream.read_exact(&mut buf)?;
        self.decode(buf)
    }

    /// 将字节数组按字节序解码为指定类型
    pub fn decode<const N: usize, T: FromBytes<N>>(&self, bytes: [u8; N]) -> Result<T> {
        match self {
            Endian::Big => bytes.as_slice().read_be(),
            Endian::Little => bytes.as_slice().read_le(),
        }
    }

    /// 将字节切片按字节序解码为指定类型的向量
    ///
    /// 切片长度必须是 N 的整数倍, 多余的尾部字节会被丢弃。
    pub fn decode_all<const N: usize, T: FromBytes<N>>(&self, bytes: &[u8]) -> Option<Vec<T>> {
        bytes
            .chunks_exact(N)
            .map(|chunk| {
                chunk
                    .try_into()
                    .ok()
                    .and_then(|arr| self.decode::<N, T>(arr).ok())
            })
            .collect()
    }

    /// 将字节切片解码并逐元素转换为目标数值类型的向量
    ///
    /// # 类型参数
    /// * `A` - 存储在字节中的原始类型
    /// * `T` - 转换后的目标数值类型
    pub fn decode_all_to_primative<const N: usize, A: FromBytes<N> + ToPrimitive, T: NumCast>(
        &self,
        bytes: &[u8],
    ) -> Option<Vec<T>> {
        self.decode_all::<N, A>(bytes)?
            .into_iter()
            .map(|v| T::from(v))
            .collect()
    }

    /// 将值按字节序编码为字节数组
    pub fn encode<const N: usize, T: ToBytes<N>>(&self, value: T) -> [u8; N] {
        match self {
            Endian::Big => value.to_be_bytes(),
            Endian::Little => value.to_le_bytes(),
        }
    }

    /// 将值切片按字节序编码为连续的字节向量
    pub fn encode_all<const N: usize, T: ToBytes<N> + Copy>(&self, values: &[T]) -> Vec<u8> {
        values.iter().flat_map(|v| self.encode(*v)).collect()
    }

    /// 将单个值按字节序写入输出流
    pub fn write<const N: usize, T: ToBytes<N>>(
        &self,
        stream: &mut impl Write,
        value: T,
    ) -> Result<()> {
        stream.write_all(&self.encode(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_roundtrip() {
        let bytes = Endian::Little.encode(0x1234_u16);
        assert_eq!(bytes, [0x34, 0x12]);
        let value: u16 = Endian::Little.decode(bytes).unwrap();
        assert_eq!(value, 0x1234);

        let bytes = Endian::Big.encode(0x1234_u16);
        assert_eq!(bytes, [0x12, 0x34]);
    }

    #[test]
    fn decode_all_discards_tail() {
        let values: Vec<u16> = Endian::Little
            .decode_all::<2, u16>(&[1, 0, 2, 0, 9])
            .unwrap();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn numeric_cast() {
        let bytes = Endian::Little.encode_all(&[1_u16, 2, 3]);
        let wide: Vec<u64> = Endian::Little
            .decode_all_to_primative::<2, u16, u64>(&bytes)
            .unwrap();
        assert_eq!(wide, vec![1, 2, 3]);
    }
}
