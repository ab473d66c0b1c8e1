//! TIFF 解析层错误类型
//!
//! 本模块定义解析 TIFF/BigTIFF 文件结构时可能出现的错误。
//! 更高层的 COG 语义错误见 [`crate::cog::CogError`]。

use std::fmt;
use std::io;

use super::TagId;

/// TIFF 结构解析错误
#[derive(Debug)]
pub enum TiffError {
    /// 文件开头不是有效的 TIFF 魔数 ("II*\0" / "MM\0*" / BigTIFF 变体)
    BadMagicBytes,

    /// 文件中没有任何 IFD
    NoIfd0,

    /// 底层 IO 读取错误
    ReadError(io::Error),

    /// 缺少必需的标签
    MissingTag(TagId),

    /// 标签存在但数据类型或内容不符合预期
    BadTag(TagId),
}

impl From<io::Error> for TiffError {
    fn from(e: io::Error) -> Self {
        TiffError::ReadError(e)
    }
}

impl fmt::Display for TiffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TiffError::BadMagicBytes => write!(f, "无效的 TIFF 魔数"),
            TiffError::NoIfd0 => write!(f, "未找到 IFD0"),
            TiffError::ReadError(e) => write!(f, "IO 读取错误: {}", e),
            TiffError::MissingTag(tag) => write!(f, "缺少必需的标签: {:?}", tag),
            TiffError::BadTag(tag) => write!(f, "标签数据错误: {:?}", tag),
        }
    }
}

impl std::error::Error for TiffError {}
