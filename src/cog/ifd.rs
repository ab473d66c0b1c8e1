//! 类型化的 COG 目录模型
//!
//! 与解析层的原始标签列表不同, 本模块的 [`Ifd`] 把 COG 输出需要的每个
//! 已知标签表示为一个类型化字段, 零值或空值表示标签不存在。
//! 目录的派生尺寸 (标签数、标签区字节数、瓦片索引区字节数、平面数)
//! 由布局规划器通过 [`Ifd::update_structure`] 计算, 写入器据此定位偏移量。
//!
//! 概览链和掩膜挂在各自的宿主目录上: 概览构成单链表,
//! 掩膜列表属于主图像或某一级概览, 掩膜自身不得再有概览或掩膜。

use std::fs::File;

use crate::geotags::{self, epsg, GeoKey, GeoKeyValue};
use crate::tiff::field::FieldData;
use crate::tiff::{TagId, TiffVariant};

use super::error::CogError;

/// 子文件类型: 主图像
pub const SUBFILE_TYPE_NONE: u32 = 0;
/// 子文件类型: 降采样副本 (概览)
pub const SUBFILE_TYPE_REDUCED_IMAGE: u32 = 1;
/// 子文件类型: 多页文档的一页
pub const SUBFILE_TYPE_PAGE: u32 = 2;
/// 子文件类型: 透明掩膜
pub const SUBFILE_TYPE_MASK: u32 = 4;

/// 像素平面组织: 交错存储 (RGBRGB...)
pub const PLANAR_CONFIG_CONTIG: u16 = 1;
/// 像素平面组织: 分平面存储 (RR..GG..BB..)
pub const PLANAR_CONFIG_SEPARATE: u16 = 2;

/// 颜色空间: 白为零
pub const PI_WHITE_IS_ZERO: u16 = 0;
/// 颜色空间: 黑为零
pub const PI_BLACK_IS_ZERO: u16 = 1;
/// 颜色空间: RGB
pub const PI_RGB: u16 = 2;
/// 颜色空间: 调色板索引
pub const PI_PALETTED: u16 = 3;
/// 颜色空间: 透明掩膜
pub const PI_MASK: u16 = 4;

/// 样本格式: 无符号整数
pub const SAMPLE_FORMAT_UINT: u16 = 1;
/// 样本格式: 有符号整数
pub const SAMPLE_FORMAT_INT: u16 = 2;
/// 样本格式: IEEE 浮点数
pub const SAMPLE_FORMAT_IEEEFP: u16 = 3;

/// 额外样本: 预乘 Alpha
pub const EXTRA_SAMPLES_ASSOC_ALPHA: u16 = 1;
/// 额外样本: 非预乘 Alpha
pub const EXTRA_SAMPLES_UNASS_ALPHA: u16 = 2;

/// 瓦片偏移量数组
///
/// 标准 TIFF 使用 u32, BigTIFF 使用 u64, 同一时间只有一种形态有效,
/// 规划器在封装格式升级时切换形态。
#[derive(Clone, Debug)]
pub enum TileOffsets {
    U32(Vec<u32>),
    U64(Vec<u64>),
}

impl TileOffsets {
    pub fn len(&self) -> usize {
        match self {
            TileOffsets::U32(v) => v.len(),
            TileOffsets::U64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 按封装格式重新分配全零数组
    pub(crate) fn allocate(&mut self, count: usize, bigtiff: bool) {
        *self = if bigtiff {
            TileOffsets::U64(vec![0; count])
        } else {
            TileOffsets::U32(vec![0; count])
        };
    }

    /// 记录一个偏移量, 越界或超出 u32 表示范围属于编程错误
    pub(crate) fn set(&mut self, index: usize, offset: u64) {
        match self {
            TileOffsets::U32(v) => v[index] = offset as u32,
            TileOffsets::U64(v) => v[index] = offset,
        }
    }

    /// 以 u64 返回所有偏移量
    pub fn values(&self) -> Vec<u64> {
        match self {
            TileOffsets::U32(v) => v.iter().map(|&o| o as u64).collect(),
            TileOffsets::U64(v) => v.clone(),
        }
    }
}

/// 栅格坐标到世界坐标的仿射变换
///
/// 六元组 `(ox, sx, rx, oy, ry, sy)`, 北朝上栅格的 `sy` 为负。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    /// 栅格原点 (左上角) 的世界坐标
    pub fn origin(&self) -> (f64, f64) {
        (self.0[0], self.0[3])
    }

    /// 像素比例, Y 取正值
    pub fn scale(&self) -> (f64, f64) {
        (self.0[1], -self.0[5])
    }
}

/// 一个图像文件目录 (IFD)
///
/// 字段的零值/空值表示该标签不写入输出。
#[derive(Debug, Default)]
pub struct Ifd {
    pub subfile_type: u32,
    pub image_width: u64,
    pub image_length: u64,
    pub bits_per_sample: Vec<u16>,
    pub compression: u16,
    pub photometric_interpretation: u16,
    pub document_name: String,
    pub samples_per_pixel: u16,
    pub planar_configuration: u16,
    pub date_time: String,
    pub predictor: u16,
    pub colormap: Vec<u16>,
    pub tile_width: u16,
    pub tile_length: u16,
    /// 瓦片负载在来源 (溢出文件或源文件) 中的偏移量
    pub original_tile_offsets: Vec<u64>,
    /// 规划器放置的输出文件偏移量
    pub(crate) new_tile_offsets: TileOffsets,
    pub tile_byte_counts: Vec<u32>,
    pub extra_samples: Vec<u16>,
    pub sample_format: Vec<u16>,
    pub jpeg_tables: Vec<u8>,

    pub model_pixel_scale: Vec<f64>,
    pub model_tiepoint: Vec<f64>,
    pub model_transformation: Vec<f64>,
    pub geo_key_directory: Vec<u16>,
    pub geo_double_params: Vec<f64>,
    pub geo_ascii_params: String,
    pub gdal_metadata: String,
    pub no_data: String,
    pub lerc_params: Vec<u32>,
    pub rpcs: Vec<f64>,

    // 条带组织的字段仅在读取时填充, 写入器不支持条带
    pub strip_offsets: Vec<u64>,
    pub strip_byte_counts: Vec<u32>,
    pub rows_per_strip: u32,
    pub fill_order: u16,

    pub(crate) overview: Option<Box<Ifd>>,
    pub(crate) masks: Vec<Ifd>,

    // 规划器计算的派生尺寸
    pub(crate) n_tags: u64,
    pub(crate) tags_size: u64,
    pub(crate) strile_size: u64,
    pub(crate) n_planes: u64,
    pub(crate) n_tiles_x: u64,
    pub(crate) n_tiles_y: u64,

    /// 瓦片负载来源, 写入器按 original_tile_offsets 从中取数据
    pub(crate) tile_data: Option<File>,
}

impl Default for TileOffsets {
    fn default() -> Self {
        TileOffsets::U32(vec![])
    }
}

impl Ifd {
    /// 创建一个空目录
    pub fn new() -> Self {
        Self::default()
    }

    /// 挂接瓦片负载来源
    pub fn set_tile_data(&mut self, source: File) {
        self.tile_data = Some(source);
    }

    /// 追加一个概览目录
    ///
    /// 概览的子文件类型被标记为降采样副本, 地理参考标签被清除,
    /// 只有主目录携带地理参考。
    pub fn add_overview(&mut self, mut ovr: Ifd) {
        ovr.subfile_type = SUBFILE_TYPE_REDUCED_IMAGE;
        ovr.clear_geo_referencing();
        self.overview = Some(Box::new(ovr));
    }

    /// 挂接一个掩膜目录
    ///
    /// 掩膜自身不得有概览或掩膜, 宿主必须是主图像或概览,
    /// 违反属于编程错误。
    pub fn add_mask(&mut self, mut mask: Ifd) {
        assert!(
            mask.masks.is_empty() && mask.overview.is_none(),
            "a mask may not carry overviews or masks of its own"
        );
        mask.subfile_type = match self.subfile_type {
            SUBFILE_TYPE_NONE => SUBFILE_TYPE_MASK,
            SUBFILE_TYPE_REDUCED_IMAGE => SUBFILE_TYPE_MASK | SUBFILE_TYPE_REDUCED_IMAGE,
            other => panic!("cannot attach a mask to subfile type {other}"),
        };
        mask.clear_geo_referencing();
        self.masks.push(mask);
    }

    /// 清除地理参考标签
    fn clear_geo_referencing(&mut self) {
        self.model_pixel_scale = vec![];
        self.model_tiepoint = vec![];
        self.model_transformation = vec![];
        self.geo_key_directory = vec![];
        self.geo_double_params = vec![];
        self.geo_ascii_params = String::new();
    }

    /// 通过 GeoKey 目录设置坐标系
    ///
    /// # 参数
    /// * `epsg_code` - EPSG 代码, 0 表示未知坐标系 (只写引用描述)
    /// * `raster_pixel_is_area` - 栅格像素代表面还是点
    ///
    /// # 错误
    /// 代码非零且不在注册表中时返回 `UnknownEpsg`
    pub fn set_epsg(&mut self, epsg_code: u16, raster_pixel_is_area: bool) -> Result<(), CogError> {
        let mut keys = vec![GeoKey {
            id: geotags::GT_RASTER_TYPE_GEO_KEY,
            value: GeoKeyValue::Short(if raster_pixel_is_area { 1 } else { 2 }),
        }];

        let citation = |name: &str| format!("{}|", name.replace('_', " "));

        if let Some(name) = epsg::geographic_name(epsg_code) {
            keys.push(GeoKey {
                id: geotags::GT_MODEL_TYPE_GEO_KEY,
                value: GeoKeyValue::Short(2),
            });
            keys.push(GeoKey {
                id: geotags::GEOGRAPHIC_TYPE_GEO_KEY,
                value: GeoKeyValue::Short(epsg_code),
            });
            keys.push(GeoKey {
                id: geotags::GT_CITATION_GEO_KEY,
                value: GeoKeyValue::Ascii(citation(name)),
            });
        } else if let Some(name) = epsg::projected_name(epsg_code) {
            keys.push(GeoKey {
                id: geotags::GT_MODEL_TYPE_GEO_KEY,
                value: GeoKeyValue::Short(1),
            });
            keys.push(GeoKey {
                id: geotags::PROJECTED_CS_TYPE_GEO_KEY,
                value: GeoKeyValue::Short(epsg_code),
            });
            keys.push(GeoKey {
                id: geotags::GT_CITATION_GEO_KEY,
                value: GeoKeyValue::Ascii(citation(&name)),
            });
        } else if epsg_code == 0 {
            keys.push(GeoKey {
                id: geotags::GT_CITATION_GEO_KEY,
                value: GeoKeyValue::Ascii("Unknown|".to_string()),
            });
        } else {
            return Err(CogError::UnknownEpsg(epsg_code));
        }

        let (directory, doubles, asciis) = geotags::unparse_keys(
            keys,
            self.geo_ascii_params.len(),
            self.geo_double_params.len(),
        );
        self.geo_key_directory = directory;
        self.geo_double_params.extend(doubles);
        self.geo_ascii_params.push_str(&asciis);
        Ok(())
    }

    /// 计算栅格坐标到世界坐标的仿射变换
    ///
    /// # 错误
    /// - `NegativeYScale`: ModelPixelScale 的 Y 比例为正值
    /// - `MissingGeoReference`: 既无比例/参考点也无变换矩阵
    pub fn geotransform(&self) -> Result<GeoTransform, CogError> {
        let mut gt = GeoTransform([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        if self.model_pixel_scale.len() >= 2
            && self.model_pixel_scale[0] != 0.0
            && self.model_pixel_scale[1] != 0.0
        {
            gt.0[1] = self.model_pixel_scale[0];
            gt.0[5] = -self.model_pixel_scale[1];
            if gt.0[5] > 0.0 {
                return Err(CogError::NegativeYScale);
            }
            if self.model_tiepoint.len() >= 6 {
                gt.0[0] = self.model_tiepoint[3] - self.model_tiepoint[0] * gt.0[1];
                gt.0[3] = self.model_tiepoint[4] - self.model_tiepoint[1] * gt.0[5];
            }
        } else if self.model_transformation.len() == 16 {
            gt.0[0] = self.model_transformation[3];
            gt.0[1] = self.model_transformation[0];
            gt.0[2] = self.model_transformation[1];
            gt.0[3] = self.model_transformation[7];
            gt.0[4] = self.model_transformation[4];
            gt.0[5] = self.model_transformation[5];
        } else {
            return Err(CogError::MissingGeoReference);
        }
        Ok(gt)
    }

    /// 计算目录的派生尺寸并缓存
    ///
    /// 瓦片数按图像尺寸和瓦片尺寸向上取整; 没有瓦片标签时为 0。
    pub(crate) fn update_structure(&mut self, bigtiff: bool) {
        let (n_tags, tags_size, strile_size, n_planes) = self.structure(bigtiff);
        self.n_tags = n_tags;
        self.tags_size = tags_size;
        self.strile_size = strile_size;
        self.n_planes = n_planes;
        if self.tile_width > 0 && self.tile_length > 0 {
            self.n_tiles_x = (self.image_width + self.tile_width as u64 - 1) / self.tile_width as u64;
            self.n_tiles_y =
                (self.image_length + self.tile_length as u64 - 1) / self.tile_length as u64;
        } else {
            self.n_tiles_x = 0;
            self.n_tiles_y = 0;
        }
    }

    /// 按固定的标签顺序累计目录尺寸
    ///
    /// # 返回
    /// `(标签数, 标签区字节数, 瓦片索引区字节数, 平面数)`
    ///
    /// 标签区字节数包含目录头 (计数) 和 next 指针;
    /// TileOffsets / TileByteCounts 的数组数据单独累计在瓦片索引区,
    /// 使得改写瓦片偏移量只需覆盖一段连续区域。
    pub(crate) fn structure(&self, bigtiff: bool) -> (u64, u64, u64, u64) {
        let variant = if bigtiff {
            TiffVariant::Big
        } else {
            TiffVariant::Normal
        };
        let tag_size = variant.tag_entry_size();
        // 目录计数 + next 指针的固定开销
        let mut size: u64 = if bigtiff { 16 } else { 6 };
        let mut cnt: u64 = 0;
        let mut strile: u64 = 0;
        let mut planes: u64 = 1;

        if self.subfile_type > 0 {
            cnt += 1;
            size += tag_size;
        }
        if self.image_width > 0 {
            cnt += 1;
            size += tag_size;
        }
        if self.image_length > 0 {
            cnt += 1;
            size += tag_size;
        }
        if !self.bits_per_sample.is_empty() {
            cnt += 1;
            size += FieldData::Shorts(&self.bits_per_sample).size(variant);
        }
        if self.compression > 0 {
            cnt += 1;
            size += tag_size;
        }

        // PhotometricInterpretation 总是写入
        cnt += 1;
        size += tag_size;

        if !self.document_name.is_empty() {
            cnt += 1;
            size += FieldData::Ascii(&self.document_name).size(variant);
        }
        if self.samples_per_pixel > 0 {
            cnt += 1;
            size += tag_size;
        }
        if self.planar_configuration > 0 {
            cnt += 1;
            size += tag_size;
        }
        if self.planar_configuration == PLANAR_CONFIG_SEPARATE {
            planes = self.samples_per_pixel as u64;
        }
        if !self.date_time.is_empty() {
            cnt += 1;
            size += FieldData::Ascii(&self.date_time).size(variant);
        }
        if self.predictor > 0 {
            cnt += 1;
            size += tag_size;
        }
        if !self.colormap.is_empty() {
            cnt += 1;
            size += FieldData::Shorts(&self.colormap).size(variant);
        }
        if self.tile_width > 0 {
            cnt += 1;
            size += tag_size;
        }
        if self.tile_length > 0 {
            cnt += 1;
            size += tag_size;
        }
        match &self.new_tile_offsets {
            TileOffsets::U32(v) if !v.is_empty() => {
                cnt += 1;
                size += tag_size;
                strile += FieldData::Longs(v).size(variant) - tag_size;
            }
            TileOffsets::U64(v) if !v.is_empty() => {
                cnt += 1;
                size += tag_size;
                strile += FieldData::Long8s(v).size(variant) - tag_size;
            }
            _ => {}
        }
        if !self.tile_byte_counts.is_empty() {
            cnt += 1;
            size += tag_size;
            strile += FieldData::Longs(&self.tile_byte_counts).size(variant) - tag_size;
        }
        if !self.extra_samples.is_empty() {
            cnt += 1;
            size += FieldData::Shorts(&self.extra_samples).size(variant);
        }
        if !self.sample_format.is_empty() {
            cnt += 1;
            size += FieldData::Shorts(&self.sample_format).size(variant);
        }
        if !self.jpeg_tables.is_empty() {
            cnt += 1;
            size += FieldData::Bytes(&self.jpeg_tables).size(variant);
        }
        if !self.model_pixel_scale.is_empty() {
            cnt += 1;
            size += FieldData::Doubles(&self.model_pixel_scale).size(variant);
        }
        if !self.model_tiepoint.is_empty() {
            cnt += 1;
            size += FieldData::Doubles(&self.model_tiepoint).size(variant);
        }
        if !self.model_transformation.is_empty() {
            cnt += 1;
            size += FieldData::Doubles(&self.model_transformation).size(variant);
        }
        if !self.geo_key_directory.is_empty() {
            cnt += 1;
            size += FieldData::Shorts(&self.geo_key_directory).size(variant);
        }
        if !self.geo_double_params.is_empty() {
            cnt += 1;
            size += FieldData::Doubles(&self.geo_double_params).size(variant);
        }
        if !self.geo_ascii_params.is_empty() {
            cnt += 1;
            size += FieldData::Ascii(&self.geo_ascii_params).size(variant);
        }
        if !self.gdal_metadata.is_empty() {
            cnt += 1;
            size += FieldData::Ascii(&self.gdal_metadata).size(variant);
        }
        if !self.no_data.is_empty() {
            cnt += 1;
            size += FieldData::Ascii(&self.no_data).size(variant);
        }
        if !self.lerc_params.is_empty() {
            cnt += 1;
            size += FieldData::Longs(&self.lerc_params).size(variant);
        }
        if !self.rpcs.is_empty() {
            cnt += 1;
            size += FieldData::Doubles(&self.rpcs).size(variant);
        }

        (cnt, size, strile, planes)
    }

    /// 从解析出的原始目录构建类型化目录
    ///
    /// 缺失的标签保持零值/空值; 瓦片偏移量与字节数数量不一致时报错。
    pub(crate) fn from_raw(raw: &crate::tiff::Ifd) -> Result<Ifd, CogError> {
        let mut ifd = Ifd::new();
        ifd.subfile_type = raw.get_tag_value(TagId::NewSubfileType).unwrap_or(0);
        ifd.image_width = raw.get_tag_value(TagId::ImageWidth).unwrap_or(0);
        ifd.image_length = raw.get_tag_value(TagId::ImageLength).unwrap_or(0);
        ifd.bits_per_sample = raw.get_tag_values(TagId::BitsPerSample).unwrap_or_default();
        ifd.compression = raw.get_tag_value(TagId::Compression).unwrap_or(0);
        ifd.photometric_interpretation = raw
            .get_tag_value(TagId::PhotometricInterpretation)
            .unwrap_or(0);
        ifd.document_name = raw.get_tag_string(TagId::DocumentName).unwrap_or_default();
        ifd.samples_per_pixel = raw.get_tag_value(TagId::SamplesPerPixel).unwrap_or(0);
        ifd.planar_configuration = raw.get_tag_value(TagId::PlanarConfiguration).unwrap_or(0);
        ifd.date_time = raw.get_tag_string(TagId::DateTime).unwrap_or_default();
        ifd.predictor = raw.get_tag_value(TagId::Predictor).unwrap_or(0);
        ifd.colormap = raw.get_tag_values(TagId::ColorMap).unwrap_or_default();
        ifd.tile_width = raw.get_tag_value(TagId::TileWidth).unwrap_or(0);
        ifd.tile_length = raw.get_tag_value(TagId::TileLength).unwrap_or(0);
        // 瓦片索引数组区分"标签缺失"和"取值无法表示"
        ifd.original_tile_offsets = match raw.get_tag(TagId::TileOffsets) {
            Ok(tag) => tag
                .values()
                .ok_or(CogError::UnsupportedTagValue(TagId::TileOffsets.into()))?,
            Err(_) => vec![],
        };
        ifd.tile_byte_counts = match raw.get_tag(TagId::TileByteCounts) {
            Ok(tag) => tag
                .values()
                .ok_or(CogError::UnsupportedTagValue(TagId::TileByteCounts.into()))?,
            Err(_) => vec![],
        };
        ifd.extra_samples = raw.get_tag_values(TagId::ExtraSamples).unwrap_or_default();
        ifd.sample_format = raw.get_tag_values(TagId::SampleFormat).unwrap_or_default();
        ifd.jpeg_tables = raw.get_tag_values(TagId::JPEGTables).unwrap_or_default();
        ifd.model_pixel_scale = raw
            .get_tag_values(TagId::ModelPixelScale)
            .unwrap_or_default();
        ifd.model_tiepoint = raw.get_tag_values(TagId::ModelTiepoint).unwrap_or_default();
        ifd.model_transformation = raw
            .get_tag_values(TagId::ModelTransformation)
            .unwrap_or_default();
        ifd.geo_key_directory = raw
            .get_tag_values(TagId::GeoKeyDirectory)
            .unwrap_or_default();
        ifd.geo_double_params = raw
            .get_tag_values(TagId::GeoDoubleParams)
            .unwrap_or_default();
        ifd.geo_ascii_params = raw.get_tag_string(TagId::GeoAsciiParams).unwrap_or_default();
        ifd.gdal_metadata = raw.get_tag_string(TagId::GDALMetadata).unwrap_or_default();
        ifd.no_data = raw.get_tag_string(TagId::GDALNoData).unwrap_or_default();
        ifd.lerc_params = raw.get_tag_values(TagId::LercParams).unwrap_or_default();
        ifd.rpcs = raw.get_tag_values(TagId::Rpcs).unwrap_or_default();

        ifd.strip_offsets = raw.get_tag_values(TagId::StripOffsets).unwrap_or_default();
        ifd.strip_byte_counts = raw
            .get_tag_values(TagId::StripByteCounts)
            .unwrap_or_default();
        ifd.rows_per_strip = raw.get_tag_value(TagId::RowsPerStrip).unwrap_or(0);
        ifd.fill_order = raw.get_tag_value(TagId::FillOrder).unwrap_or(0);

        if !ifd.original_tile_offsets.is_empty()
            && ifd.original_tile_offsets.len() != ifd.tile_byte_counts.len()
        {
            return Err(CogError::InconsistentTiles {
                offsets: ifd.original_tile_offsets.len(),
                byte_counts: ifd.tile_byte_counts.len(),
            });
        }
        Ok(ifd)
    }
}
