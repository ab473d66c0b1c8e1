//! TIFF 文件格式处理模块
//!
//! 本模块提供 TIFF/BigTIFF 结构的解析(读取侧)和标签编码(写入侧)。
//! 读取侧以原始标签列表表示目录, 类型化的 COG 目录模型见 [`crate::cog`]。

use std::io::{self, Read, Seek, Write};

mod endian;
mod error;
pub(crate) mod field;
mod ifd;
mod tag;

pub use endian::Endian;
pub use error::TiffError;
pub use ifd::Ifd;
pub use tag::{Tag, TagId, TagType};

/// TIFF 变体枚举, 区分标准 TIFF 和 BigTIFF
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum TiffVariant {
    /// 标准 TIFF, 魔数 42, 4 字节偏移量
    Normal,
    /// BigTIFF, 魔数 43, 8 字节偏移量
    Big,
}

impl TiffVariant {
    /// 根据变体读取一个偏移量
    fn read_offset<R: Read>(&self, endian: Endian, stream: &mut R) -> io::Result<u64> {
        match self {
            TiffVariant::Normal => endian.read::<4, u32>(stream).map(|v| v as u64),
            TiffVariant::Big => endian.read(stream),
        }
    }

    /// 根据变体写入一个偏移量
    pub(crate) fn write_offset<W: Write>(
        &self,
        endian: Endian,
        stream: &mut W,
        offset: u64,
    ) -> io::Result<()> {
        match self {
            TiffVariant::Normal => endian.write(stream, offset as u32),
            TiffVariant::Big => endian.write(stream, offset),
        }
    }

    /// 偏移量的字节大小
    pub(crate) const fn offset_bytesize(&self) -> usize {
        match self {
            TiffVariant::Normal => 4,
            TiffVariant::Big => 8,
        }
    }

    /// 单个标签条目的字节大小 (2 + 2 + count + value)
    pub(crate) const fn tag_entry_size(&self) -> u64 {
        match self {
            TiffVariant::Normal => 12,
            TiffVariant::Big => 20,
        }
    }

    /// 头部的字节大小
    pub(crate) const fn header_size(&self) -> u64 {
        match self {
            TiffVariant::Normal => 8,
            TiffVariant::Big => 16,
        }
    }
}

/// 解析后的 TIFF 文件结构
#[derive(Clone, Debug)]
pub struct Tiff {
    /// 字节序
    pub endian: Endian,
    /// TIFF 变体
    pub variant: TiffVariant,
    /// 按链序排列的原始 IFD 列表
    pub ifds: Vec<Ifd>,
}

impl Tiff {
    /// 从流中解析 TIFF 文件
    ///
    /// # 错误
    ///
    /// - 魔数无效时返回 `BadMagicBytes`
    /// - 没有任何 IFD 时返回 `NoIfd0`
    pub fn open<R: Read + Seek>(stream: &mut R) -> Result<Self, TiffError> {
        // 读取字节序标记
        let mut order = [0u8; 2];
        stream.read_exact(&mut order)?;
        let endian = match &order {
            b"II" => Endian::Little,
            b"MM" => Endian::Big,
            _ => return Err(TiffError::BadMagicBytes),
        };

        // 读取魔数并确定变体
        let magic: u16 = endian.read(stream)?;
        let variant = match magic {
            42 => TiffVariant::Normal,
            43 => TiffVariant::Big,
            _ => return Err(TiffError::BadMagicBytes),
        };

        // BigTIFF 额外的头部字段: 偏移量宽度(应为 8)和保留字(应为 0)
        if variant == TiffVariant::Big {
            let offset_size: u16 = endian.read(stream)?;
            let reserved: u16 = endian.read(stream)?;
            if offset_size != 8 || reserved != 0 {
                return Err(TiffError::BadMagicBytes);
            }
        }

        // 沿 next 指针链解析所有 IFD
        let mut ifds = vec![];
        let mut ifd_offset = variant.read_offset(endian, stream)?;
        while ifd_offset != 0 {
            let (ifd, next_offset) = Ifd::parse(stream, ifd_offset, endian, variant)?;
            ifd_offset = next_offset;
            ifds.push(ifd);
        }

        if ifds.is_empty() {
            return Err(TiffError::NoIfd0);
        }

        Ok(Self {
            endian,
            variant,
            ifds,
        })
    }

    /// 获取第一个 IFD
    pub fn ifd0(&self) -> Result<&Ifd, TiffError> {
        self.ifds.first().ok_or(TiffError::NoIfd0)
    }
}

impl std::fmt::Display for Tiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tiff: {{{:?} Endian, {:?} Variant}}",
            self.endian, self.variant
        )?;
        for (i, ifd) in self.ifds.iter().enumerate() {
            write!(f, "\n  IFD {i}:")?;
            for tag in ifd.0.iter() {
                write!(f, "\n    {}", tag)?;
            }
        }
        Ok(())
    }
}
