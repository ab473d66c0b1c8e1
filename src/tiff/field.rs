//! TIFF 标签编码模块 (写入侧)
//!
//! 本模块把一个类型化的标签字段序列化为 12 字节(标准 TIFF)或
//! 20 字节(BigTIFF)的目录条目。数值总字节数不超过条目 value 字段宽度
//! (4 / 8 字节)时内联存储, 否则数据写入溢出缓冲区, 条目中记录其绝对偏移量。
//!
//! ASCII 字符串写入时以 NUL 结尾, 计数包含终止符。
//! BigTIFF 专有类型 (Long8/SLong8) 出现在标准 TIFF 模式下属于编程错误。

use super::{Endian, TagType, TiffVariant};
use std::io::{self, Write};

/// 溢出数据缓冲区
///
/// 记录自身在输出文件中的起始偏移量, 顺序追加数据;
/// 写入器随后把缓冲区内容放到约定的位置以兑现偏移量。
pub(crate) struct TagBuffer {
    /// 缓冲区第一个字节在输出文件中的绝对偏移量
    pub offset: u64,
    buf: Vec<u8>,
}

impl TagBuffer {
    pub fn new(offset: u64) -> Self {
        Self {
            offset,
            buf: Vec::new(),
        }
    }

    /// 下一段数据将落在的绝对偏移量
    pub fn next_offset(&self) -> u64 {
        self.offset + self.buf.len() as u64
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> u64 {
        self.buf.len() as u64
    }
}

/// 单值标签字段
#[derive(Clone, Copy, Debug)]
pub(crate) enum FieldScalar {
    Byte(u8),
    SByte(i8),
    Short(u16),
    SShort(i16),
    Long(u32),
    SLong(i32),
    Long8(u64),
    SLong8(i64),
    Float(f32),
    Double(f64),
}

/// 序列标签字段, 借用调用方的数据
#[derive(Clone, Copy, Debug)]
pub(crate) enum FieldData<'a> {
    Bytes(&'a [u8]),
    Shorts(&'a [u16]),
    Longs(&'a [u32]),
    Long8s(&'a [u64]),
    Floats(&'a [f32]),
    Doubles(&'a [f64]),
    Ascii(&'a str),
}

impl FieldData<'_> {
    /// 类型代码
    fn tag_type(&self) -> TagType {
        match self {
            FieldData::Bytes(_) => TagType::Byte,
            FieldData::Shorts(_) => TagType::Short,
            FieldData::Longs(_) => TagType::Long,
            FieldData::Long8s(_) => TagType::Long8,
            FieldData::Floats(_) => TagType::Float,
            FieldData::Doubles(_) => TagType::Double,
            FieldData::Ascii(_) => TagType::Ascii,
        }
    }

    /// 数据项数量, ASCII 计入 NUL 终止符
    fn count(&self) -> usize {
        match self {
            FieldData::Bytes(d) => d.len(),
            FieldData::Shorts(d) => d.len(),
            FieldData::Longs(d) => d.len(),
            FieldData::Long8s(d) => d.len(),
            FieldData::Floats(d) => d.len(),
            FieldData::Doubles(d) => d.len(),
            FieldData::Ascii(s) => s.len() + 1,
        }
    }

    /// 数据的总字节数
    fn data_len(&self) -> usize {
        self.count() * self.tag_type().size_in_bytes()
    }

    /// 按字节序编码全部数据
    fn encode(&self, endian: Endian) -> Vec<u8> {
        match self {
            FieldData::Bytes(d) => d.to_vec(),
            FieldData::Shorts(d) => endian.encode_all(d),
            FieldData::Longs(d) => endian.encode_all(d),
            FieldData::Long8s(d) => endian.encode_all(d),
            FieldData::Floats(d) => endian.encode_all(d),
            FieldData::Doubles(d) => endian.encode_all(d),
            FieldData::Ascii(s) => {
                let mut bytes = s.as_bytes().to_vec();
                bytes.push(0);
                bytes
            }
        }
    }

    /// 该字段在目录中占用的总字节数: 条目本身, 加上溢出时的数据长度
    pub fn size(&self, variant: TiffVariant) -> u64 {
        let entry = variant.tag_entry_size();
        let data_len = self.data_len() as u64;
        if data_len <= variant.offset_bytesize() as u64 {
            entry
        } else {
            entry + data_len
        }
    }
}

/// 标签条目编码器
#[derive(Clone, Copy, Debug)]
pub(crate) struct FieldWriter {
    pub endian: Endian,
    pub variant: TiffVariant,
}

impl FieldWriter {
    /// 写入单值标签条目
    ///
    /// 标准 TIFF 模式不接受 8 字节标量 (Long8/SLong8/Double 无法内联)。
    pub fn write_field<W: Write>(&self, w: &mut W, tag: u16, value: FieldScalar) -> io::Result<()> {
        let (tag_type, bytes): (TagType, Vec<u8>) = match value {
            FieldScalar::Byte(v) => (TagType::Byte, vec![v]),
            FieldScalar::SByte(v) => (TagType::SByte, vec![v as u8]),
            FieldScalar::Short(v) => (TagType::Short, self.endian.encode(v).to_vec()),
            FieldScalar::SShort(v) => (TagType::SShort, self.endian.encode(v).to_vec()),
            FieldScalar::Long(v) => (TagType::Long, self.endian.encode(v).to_vec()),
            FieldScalar::SLong(v) => (TagType::SLong, self.endian.encode(v).to_vec()),
            FieldScalar::Float(v) => (TagType::Float, self.endian.encode(v).to_vec()),
            FieldScalar::Long8(v) => (TagType::Long8, self.endian.encode(v).to_vec()),
            FieldScalar::SLong8(v) => (TagType::SLong8, self.endian.encode(v).to_vec()),
            FieldScalar::Double(v) => (TagType::Double, self.endian.encode(v).to_vec()),
        };
        if self.variant == TiffVariant::Normal && bytes.len() > 4 {
            panic!("scalar type {tag_type:?} does not fit a classic tiff entry");
        }

        let mut entry = self.entry_header(tag, tag_type, 1);
        self.push_value(&mut entry, &bytes);
        w.write_all(&entry)
    }

    /// 写入序列标签条目
    ///
    /// 数据无法内联时写入 `overflow` 缓冲区, 条目记录其绝对偏移量。
    pub fn write_array<W: Write>(
        &self,
        w: &mut W,
        tag: u16,
        data: FieldData,
        overflow: &mut TagBuffer,
    ) -> io::Result<()> {
        if self.variant == TiffVariant::Normal && matches!(data, FieldData::Long8s(_)) {
            panic!("Long8 array in classic tiff mode");
        }

        let mut entry = self.entry_header(tag, data.tag_type(), data.count() as u64);
        let bytes = data.encode(self.endian);
        if bytes.len() <= self.variant.offset_bytesize() {
            self.push_value(&mut entry, &bytes);
        } else {
            let data_offset = overflow.next_offset();
            overflow.extend(&bytes);
            let offset_bytes = match self.variant {
                TiffVariant::Normal => self.endian.encode(data_offset as u32).to_vec(),
                TiffVariant::Big => self.endian.encode(data_offset).to_vec(),
            };
            self.push_value(&mut entry, &offset_bytes);
        }
        w.write_all(&entry)
    }

    /// 条目前半部分: 标签代码、类型代码和数据计数
    fn entry_header(&self, tag: u16, tag_type: TagType, count: u64) -> Vec<u8> {
        let mut entry = Vec::with_capacity(self.variant.tag_entry_size() as usize);
        entry.extend(self.endian.encode(tag));
        entry.extend(self.endian.encode(tag_type as u16));
        match self.variant {
            TiffVariant::Normal => entry.extend(self.endian.encode(count as u32)),
            TiffVariant::Big => entry.extend(self.endian.encode(count)),
        }
        entry
    }

    /// 条目后半部分: 内联值或偏移量, 右侧补零到字段宽度
    fn push_value(&self, entry: &mut Vec<u8>, bytes: &[u8]) {
        let width = self.variant.offset_bytesize();
        debug_assert!(bytes.len() <= width);
        entry.extend_from_slice(bytes);
        entry.resize(entry.len() + width - bytes.len(), 0);
    }
}
