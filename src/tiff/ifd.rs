//! 原始 IFD 解析模块
//!
//! 解析侧的 IFD 是标签的有序列表, 标签数据在解析时即被读入内存,
//! 因此后续取值不再需要访问底层流。

use num_traits::NumCast;

use super::{Endian, Tag, TagId, TagType, TiffError, TiffVariant};
use std::io::{self, Read, Seek, SeekFrom};

/// 解析出的一个 IFD(图像文件目录)
#[derive(Clone, Debug)]
pub struct Ifd(pub Vec<Tag>);

impl Ifd {
    /// 从输入流解析 IFD
    ///
    /// # 参数
    /// * `stream` - 输入流
    /// * `offset` - IFD 在文件中的绝对偏移量
    /// * `endian` - 字节序
    /// * `variant` - TIFF 变体
    ///
    /// # 返回
    /// 解析出的 IFD 和下一个 IFD 的偏移量 (0 表示链结束)
    pub fn parse<R: Read + Seek>(
        stream: &mut R,
        offset: u64,
        endian: Endian,
        variant: TiffVariant,
    ) -> io::Result<(Ifd, u64)> {
        stream.seek(SeekFrom::Start(offset))?;

        // 标签数量: 标准 TIFF 为 u16, BigTIFF 为 u64
        let tag_count = match variant {
            TiffVariant::Normal => endian.read::<2, u16>(stream)? as u64,
            TiffVariant::Big => endian.read(stream)?,
        };

        let mut tags = Vec::with_capacity(tag_count as usize);
        for _ in 0..tag_count {
            let code = endian.read(stream)?;
            let datatype: TagType = endian.read::<2, u16>(stream)?.into();
            let count = variant.read_offset(endian, stream)? as usize;

            // 数据是否内联取决于总字节数是否超过偏移量字段宽度
            let data_size = count * datatype.size_in_bytes();
            let offset_size = variant.offset_bytesize();
            let mut data: Vec<u8> = vec![0; data_size.max(offset_size)];

            if data_size > offset_size {
                // 数据存储在偏移位置, 读完后恢复流位置
                let data_offset = variant.read_offset(endian, stream)?;
                let pos = stream.stream_position()?;
                stream.seek(SeekFrom::Start(data_offset))?;
                stream.read_exact(&mut data)?;
                stream.seek(SeekFrom::Start(pos))?;
            } else {
                // 数据内联在标签条目中
                stream.read_exact(&mut data)?;
                data.truncate(data_size);
            }

            tags.push(Tag {
                code,
                datatype,
                endian,
                count,
                data,
            });
        }

        let next_ifd_offset = variant.read_offset(endian, stream)?;

        Ok((Ifd(tags), next_ifd_offset))
    }

    /// 通过标签代码获取标签
    pub fn get_tag_by_code(&self, code: u16) -> Option<&Tag> {
        self.0.iter().find(|tag| tag.code == code)
    }

    /// 通过标签 ID 获取标签
    pub fn get_tag(&self, id: TagId) -> Result<&Tag, TiffError> {
        let code: u16 = id.into();
        self.0
            .iter()
            .find(|tag| tag.code == code)
            .ok_or(TiffError::MissingTag(id))
    }

    /// 获取标签的多个值
    pub fn get_tag_values<T: NumCast>(&self, id: TagId) -> Result<Vec<T>, TiffError> {
        self.get_tag(id)?.values().ok_or(TiffError::BadTag(id))
    }

    /// 获取标签的单个值
    pub fn get_tag_value<T: NumCast + Copy>(&self, id: TagId) -> Result<T, TiffError> {
        self.get_tag(id)?.value().ok_or(TiffError::BadTag(id))
    }

    /// 获取 ASCII 标签的字符串值
    pub fn get_tag_string(&self, id: TagId) -> Option<String> {
        self.get_tag(id).ok().and_then(|tag| tag.try_to_string())
    }
}
