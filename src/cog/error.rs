//! COG 读写过程的错误类型
//!
//! 所有顶层操作的错误都汇聚到 [`CogError`] 并向调用方传播。
//! 编程错误(例如在标准 TIFF 模式写入 BigTIFF 专有类型、给掩膜再挂概览)
//! 不在此列, 它们直接 panic。

use std::fmt;
use std::io;

use super::compression::CodecError;
use crate::grid::TileId;
use crate::projection::ProjectionError;
use crate::tiff::TiffError;

/// COG 操作的通用结果类型
pub type CogResult<T> = Result<T, CogError>;

/// COG 读写错误
#[derive(Debug)]
pub enum CogError {
    /// 底层 IO 错误
    IoError(io::Error),
    /// TIFF 结构解析错误
    TiffError(TiffError),
    /// 压缩编解码错误 (含不支持的压缩方式)
    CodecError(CodecError),
    /// 投影转换错误
    ProjectionError(ProjectionError),
    /// 不支持的样本格式组合, 附 (sample_format, bits_per_sample)
    UnsupportedSampleFormat(u16, u16),
    /// 不支持的颜色空间解释方式
    UnsupportedPhotometric(u16),
    /// 颜色映射表长度非法 (不是 3 的倍数或超过 768 项)
    BadColorMap(usize),
    /// 读取时瓦片偏移量数量与字节数数量不一致
    InconsistentTiles {
        offsets: usize,
        byte_counts: usize,
    },
    /// 遇到条带组织的 TIFF, 但当前操作需要瓦片
    StripTiffUnsupported,
    /// ModelPixelScale 的 Y 比例为正值 (非北朝上栅格)
    NegativeYScale,
    /// IFD 缺少地理参考标签
    MissingGeoReference,
    /// 注册表中不存在的 EPSG 代码
    UnknownEpsg(u16),
    /// 标签取值超出当前封装格式的表示能力
    UnsupportedTagValue(u16),
    /// 瓦片坐标不属于该图层
    TileNotFound(TileId),
    /// 没有任何图层可写
    NoLayers,
}

impl fmt::Display for CogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CogError::IoError(e) => write!(f, "IO 错误: {}", e),
            CogError::TiffError(e) => write!(f, "TIFF 解析错误: {}", e),
            CogError::CodecError(e) => write!(f, "压缩编解码错误: {}", e),
            CogError::ProjectionError(e) => write!(f, "投影转换错误: {}", e),
            CogError::UnsupportedSampleFormat(sf, bits) => {
                write!(f, "不支持的样本格式: format={} bits={}", sf, bits)
            }
            CogError::UnsupportedPhotometric(pi) => {
                write!(f, "不支持的颜色空间解释方式: {}", pi)
            }
            CogError::BadColorMap(len) => write!(f, "颜色映射表长度非法: {}", len),
            CogError::InconsistentTiles {
                offsets,
                byte_counts,
            } => write!(
                f,
                "瓦片偏移量数量 ({}) 与字节数数量 ({}) 不一致",
                offsets, byte_counts
            ),
            CogError::StripTiffUnsupported => {
                write!(f, "条带组织的 TIFF 不支持当前操作, 需要瓦片组织")
            }
            CogError::NegativeYScale => write!(f, "不支持正的 Y 像素比例 (非北朝上)"),
            CogError::MissingGeoReference => write!(f, "缺少地理参考标签"),
            CogError::UnknownEpsg(code) => write!(f, "未识别的 EPSG 代码: {}", code),
            CogError::UnsupportedTagValue(tag) => {
                write!(f, "标签 {} 的取值无法编码", tag)
            }
            CogError::TileNotFound(id) => {
                write!(f, "瓦片坐标不属于该图层: ({}, {}, {})", id.x, id.y, id.z)
            }
            CogError::NoLayers => write!(f, "没有任何图层可写"),
        }
    }
}

impl std::error::Error for CogError {}

impl From<io::Error> for CogError {
    fn from(e: io::Error) -> Self {
        CogError::IoError(e)
    }
}

impl From<TiffError> for CogError {
    fn from(e: TiffError) -> Self {
        CogError::TiffError(e)
    }
}

impl From<CodecError> for CogError {
    fn from(e: CodecError) -> Self {
        CogError::CodecError(e)
    }
}

impl From<ProjectionError> for CogError {
    fn from(e: ProjectionError) -> Self {
        CogError::ProjectionError(e)
    }
}
