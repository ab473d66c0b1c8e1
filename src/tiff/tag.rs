//! TIFF 标签模块
//!
//! 本模块提供解析侧的标签表示: 标签代码、数据类型、数据计数和原始字节,
//! 以及按 NumCast 的类型化取值。写入侧的标签编码见 [`super::field`]。
//!
//! 参考标准:
//! - [TIFF 6.0 规范](https://en.wikipedia.org/wiki/TIFF)
//! - [OGC GeoTIFF 1.1 规范](https://docs.ogc.org/is/19-008r4/19-008r4.html)

use super::Endian;
use eio::FromBytes;
use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};
use num_traits::{cast::NumCast, ToPrimitive};
use std::fmt::Display;

/// TIFF 标签结构体
///
/// 表示解析出的一个标签, 数据以原始字节保存, 按需解码。
#[derive(Clone, Debug)]
pub struct Tag {
    /// 标签代码
    pub code: u16,
    /// 标签数据类型
    pub datatype: TagType,
    /// 数据项数量
    pub count: usize,
    /// 原始数据内容
    pub data: Vec<u8>,
    /// 字节序
    pub endian: Endian,
}

impl Tag {
    /// 获取已知的标签 ID
    pub fn id(&self) -> Option<TagId> {
        TagId::try_from(self.code).ok()
    }

    /// 获取单个数值
    ///
    /// 仅当标签恰好包含一个值时返回
    pub fn value<T: NumCast + Copy>(&self) -> Option<T> {
        match self.values() {
            Some(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }

    /// 根据标签类型解码并返回所有数值
    pub fn values<T: NumCast>(&self) -> Option<Vec<T>> {
        match self.datatype {
            TagType::Byte => self.decode::<1, u8, T>(),
            TagType::Ascii => self.decode::<1, u8, T>(),
            TagType::Short => self.decode::<2, u16, T>(),
            TagType::Long => self.decode::<4, u32, T>(),
            TagType::SByte => self.decode::<1, i8, T>(),
            TagType::Undefined => self.decode::<1, u8, T>(),
            TagType::SShort => self.decode::<2, i16, T>(),
            TagType::SLong => self.decode::<4, i32, T>(),
            TagType::Float => self.decode::<4, f32, T>(),
            TagType::Double => self.decode::<8, f64, T>(),
            TagType::Ifd => self.decode::<4, u32, T>(),
            TagType::Long8 => self.decode::<8, u64, T>(),
            TagType::SLong8 => self.decode::<8, i64, T>(),
            TagType::Ifd8 => self.decode::<8, u64, T>(),
            TagType::Unknown => self.decode::<1, u8, T>(),
            TagType::Rational => self.decode_rational::<4, u32, T>(),
            TagType::SRational => self.decode_rational::<4, i32, T>(),
        }
    }

    /// 尝试将数据转换为字符串
    ///
    /// 仅支持 ASCII、Byte 和 Unknown 类型, 会去掉结尾的 NUL 终止符
    pub fn try_to_string(&self) -> Option<String> {
        match self.datatype {
            TagType::Ascii | TagType::Byte | TagType::Unknown => {
                String::from_utf8(self.data.clone())
                    .ok()
                    .map(|s| s.trim_end_matches('\0').to_string())
            }
            _ => None,
        }
    }

    /// 将数据转换为字符串(可能有损), 用于调试输出
    pub fn as_string_lossy(&self) -> String {
        match self.datatype {
            TagType::Ascii => String::from_utf8_lossy(&self.data).into_owned(),
            TagType::Float | TagType::Double | TagType::Rational | TagType::SRational => {
                match self.values::<f64>() {
                    Some(v) if v.len() == 1 => format!("{}", v[0]),
                    Some(v) => format!("{:?}", v),
                    None => "Undefined".to_string(),
                }
            }
            _ => match self.values::<i64>() {
                Some(v) if v.len() == 1 => format!("{}", v[0]),
                Some(v) => format!("{:?}", v),
                None => "Undefined".to_string(),
            },
        }
    }

    /// 解码普通数值类型的数据
    fn decode<const N: usize, A: FromBytes<N> + ToPrimitive, T: NumCast>(&self) -> Option<Vec<T>> {
        self.endian.decode_all_to_primative::<N, A, T>(&self.data)
    }

    /// 解码有理数类型的数据, 返回分子除以分母的商
    fn decode_rational<const N: usize, A: FromBytes<N> + ToPrimitive, T: NumCast>(
        &self,
    ) -> Option<Vec<T>> {
        self.data
            .chunks_exact(2 * N)
            .map(|chunk| {
                let numerator = chunk[..N]
                    .try_into()
                    .ok()
                    .and_then(|arr| self.endian.decode::<N, A>(arr).ok())
                    .and_then(|v| v.to_f64())?;
                let denominator = chunk[N..]
                    .try_into()
                    .ok()
                    .and_then(|arr| self.endian.decode::<N, A>(arr).ok())
                    .and_then(|v| v.to_f64())?;
                T::from(numerator / denominator)
            })
            .collect()
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut value_string = self.as_string_lossy().replace('\n', "\\n");
        if value_string.len() > 100 {
            value_string = format!("{}...", &value_string[..98])
        }
        let id_string = match self.id() {
            Some(id) => format!("{id:?}"),
            None => format!("Unknown({})", self.code),
        };
        write!(
            f,
            "{} {:?}[{}]: {}",
            id_string, self.datatype, self.count, value_string
        )
    }
}

/// TIFF 标签数据类型枚举
///
/// 对应 TIFF 6.0 以及 BigTIFF 扩展定义的类型代码
#[derive(Debug, PartialEq, Eq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum TagType {
    /// 8 位无符号整数
    Byte = 1,
    /// ASCII 字符串, 以 NUL 结尾, 计数包含终止符
    Ascii = 2,
    /// 16 位无符号整数
    Short = 3,
    /// 32 位无符号整数
    Long = 4,
    /// 无符号有理数(两个 u32 的比值)
    Rational = 5,
    /// 8 位有符号整数
    SByte = 6,
    /// 未定义类型
    Undefined = 7,
    /// 16 位有符号整数
    SShort = 8,
    /// 32 位有符号整数
    SLong = 9,
    /// 有符号有理数(两个 i32 的比值)
    SRational = 10,
    /// 32 位浮点数
    Float = 11,
    /// 64 位浮点数
    Double = 12,
    /// 32 位 IFD 偏移量
    Ifd = 13,
    /// 64 位无符号整数 (仅 BigTIFF)
    Long8 = 16,
    /// 64 位有符号整数 (仅 BigTIFF)
    SLong8 = 17,
    /// 64 位 IFD 偏移量 (仅 BigTIFF)
    Ifd8 = 18,

    /// 未知类型
    #[num_enum(default)]
    Unknown = 0xFFFF,
}

impl TagType {
    /// 获取单个数据项的字节大小
    pub const fn size_in_bytes(&self) -> usize {
        match self {
            TagType::Byte => 1,
            TagType::Ascii => 1,
            TagType::Short => 2,
            TagType::Long => 4,
            TagType::Rational => 8,
            TagType::SByte => 1,
            TagType::Undefined => 1,
            TagType::SShort => 2,
            TagType::SLong => 4,
            TagType::SRational => 8,
            TagType::Float => 4,
            TagType::Double => 8,
            TagType::Ifd => 4,
            TagType::Long8 => 8,
            TagType::SLong8 => 8,
            TagType::Ifd8 => 8,
            TagType::Unknown => 1,
        }
    }
}

/// COG 输出所需的标签 ID 集合
///
/// 标准 TIFF 标签、GeoTIFF 扩展标签以及 GDAL 专用标签
#[derive(Debug, PartialEq, Clone, Copy, IntoPrimitive, TryFromPrimitive, Eq, Hash)]
#[repr(u16)]
pub enum TagId {
    /// 子文件类型 (0 主图像, 1 缩略, 4 掩膜)
    NewSubfileType = 254,
    /// 图像宽度(像素)
    ImageWidth = 256,
    /// 图像高度(像素)
    ImageLength = 257,
    /// 每个样本的位数
    BitsPerSample = 258,
    /// 压缩方式
    Compression = 259,
    /// 颜色空间解释方式
    PhotometricInterpretation = 262,
    /// 位填充顺序
    FillOrder = 266,
    /// 文档名称
    DocumentName = 269,
    /// 条带数据偏移量
    StripOffsets = 273,
    /// 每个像素的样本数
    SamplesPerPixel = 277,
    /// 每个条带的行数
    RowsPerStrip = 278,
    /// 条带字节数
    StripByteCounts = 279,
    /// 数据平面组织方式
    PlanarConfiguration = 284,
    /// 创建时间
    DateTime = 306,
    /// 压缩预测器
    Predictor = 317,
    /// 颜色映射表
    ColorMap = 320,
    /// 瓦片宽度
    TileWidth = 322,
    /// 瓦片高度
    TileLength = 323,
    /// 瓦片数据偏移量
    TileOffsets = 324,
    /// 瓦片字节数
    TileByteCounts = 325,
    /// 额外样本类型(如 Alpha 通道)
    ExtraSamples = 338,
    /// 样本格式
    SampleFormat = 339,
    /// JPEG 表
    JPEGTables = 347,

    // GeoTIFF 标签
    /// 模型像素比例 [ScaleX, ScaleY, ScaleZ]
    ModelPixelScale = 33550,
    /// 模型参考点 [I,J,K, X,Y,Z]
    ModelTiepoint = 33922,
    /// 4x4 模型变换矩阵
    ModelTransformation = 34264,
    /// GeoKey 目录
    GeoKeyDirectory = 34735,
    /// GeoKey 双精度参数
    GeoDoubleParams = 34736,
    /// GeoKey ASCII 参数
    GeoAsciiParams = 34737,

    // GDAL 扩展标签
    /// GDAL 元数据
    GDALMetadata = 42112,
    /// GDAL 无数据值
    GDALNoData = 42113,
    /// ESRI LERC 压缩参数
    LercParams = 50674,
    /// 有理多项式系数
    Rpcs = 50844,
}
