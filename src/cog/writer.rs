//! COG 文件写出模块
//!
//! 本模块负责单次前向写出的三个低层部件: 文件头、GDAL 幽灵块和
//! 目录本体。目录条目按固定的标签号升序写出, 变长字段进入每个目录
//! 自己的溢出区, 瓦片偏移量和字节数数组进入所有目录共享的瓦片索引区,
//! 两者的起始偏移量都由布局规划器提前算定。

use std::io::{self, Write};

use crate::tiff::field::{FieldData, FieldScalar, FieldWriter, TagBuffer};
use crate::tiff::{Endian, TagId, TiffVariant};

use super::ifd::{Ifd, TileOffsets};

/// GDAL 结构化元数据幽灵块
///
/// 末尾两个空格: 一个属于 GDAL 声明的 140 字节, 一个把后续数据
/// 对齐到字边界。
pub(crate) const GHOST: &str = "GDAL_STRUCTURAL_METADATA_SIZE=000140 bytes\n\
LAYOUT=IFDS_BEFORE_DATA\n\
BLOCK_ORDER=ROW_MAJOR\n\
BLOCK_LEADER=SIZE_AS_UINT4\n\
BLOCK_TRAILER=LAST_4_BYTES_REPEATED\n\
KNOWN_INCOMPATIBLE_EDITION=NO\n  ";

/// 带掩膜交错声明的幽灵块变体
pub(crate) const GHOST_MASK: &str = "GDAL_STRUCTURAL_METADATA_SIZE=000174 bytes\n\
LAYOUT=IFDS_BEFORE_DATA\n\
BLOCK_ORDER=ROW_MAJOR\n\
BLOCK_LEADER=SIZE_AS_UINT4\n\
BLOCK_TRAILER=LAST_4_BYTES_REPEATED\n\
KNOWN_INCOMPATIBLE_EDITION=NO\n \
MASK_INTERLEAVED_WITH_IMAGERY=YES\n";

/// 按是否带掩膜选择幽灵块
pub(crate) fn ghost_block(has_mask: bool) -> &'static [u8] {
    if has_mask {
        GHOST_MASK.as_bytes()
    } else {
        GHOST.as_bytes()
    }
}

/// 目录写出器
#[derive(Clone, Copy, Debug)]
pub(crate) struct CogWriter {
    pub endian: Endian,
    pub variant: TiffVariant,
    fields: FieldWriter,
}

impl CogWriter {
    pub fn new(endian: Endian, variant: TiffVariant) -> Self {
        Self {
            endian,
            variant,
            fields: FieldWriter { endian, variant },
        }
    }

    /// 写出文件头和幽灵块
    ///
    /// 第一个 IFD 紧跟幽灵块之后, 头部记录其偏移量。
    pub fn write_header<W: Write>(&self, w: &mut W, has_mask: bool) -> io::Result<()> {
        let ghost = ghost_block(has_mask);
        match self.endian {
            Endian::Little => w.write_all(b"II")?,
            Endian::Big => w.write_all(b"MM")?,
        }
        match self.variant {
            TiffVariant::Normal => {
                self.endian.write(w, 42_u16)?;
                self.endian.write(w, 8 + ghost.len() as u32)?;
            }
            TiffVariant::Big => {
                self.endian.write(w, 43_u16)?;
                self.endian.write(w, 8_u16)?; // 偏移量宽度
                self.endian.write(w, 0_u16)?; // 保留字
                self.endian.write(w, 16 + ghost.len() as u64)?;
            }
        }
        w.write_all(ghost)
    }

    /// 写出一个目录
    ///
    /// # 参数
    /// * `offset` - 该目录在输出文件中的绝对偏移量
    /// * `strile` - 共享的瓦片索引区缓冲
    /// * `next` - 链上是否还有后续目录 (决定 next 指针是否为零)
    pub fn write_ifd<W: Write>(
        &self,
        w: &mut W,
        ifd: &Ifd,
        offset: u64,
        strile: &mut TagBuffer,
        next: bool,
    ) -> io::Result<()> {
        let next_off = if next { offset + ifd.tags_size } else { 0 };

        // 本目录的溢出区从 next 指针之后开始
        let mut overflow = TagBuffer::new(match self.variant {
            TiffVariant::Normal => offset + 2 + 12 * ifd.n_tags + 4,
            TiffVariant::Big => offset + 8 + 20 * ifd.n_tags + 8,
        });

        match self.variant {
            TiffVariant::Normal => self.endian.write(w, ifd.n_tags as u16)?,
            TiffVariant::Big => self.endian.write(w, ifd.n_tags)?,
        }

        let fw = &self.fields;
        if ifd.subfile_type > 0 {
            fw.write_field(
                w,
                TagId::NewSubfileType.into(),
                FieldScalar::Long(ifd.subfile_type),
            )?;
        }
        if ifd.image_width > 0 {
            fw.write_field(
                w,
                TagId::ImageWidth.into(),
                FieldScalar::Long(ifd.image_width as u32),
            )?;
        }
        if ifd.image_length > 0 {
            fw.write_field(
                w,
                TagId::ImageLength.into(),
                FieldScalar::Long(ifd.image_length as u32),
            )?;
        }
        if !ifd.bits_per_sample.is_empty() {
            fw.write_array(
                w,
                TagId::BitsPerSample.into(),
                FieldData::Shorts(&ifd.bits_per_sample),
                &mut overflow,
            )?;
        }
        if ifd.compression > 0 {
            fw.write_field(
                w,
                TagId::Compression.into(),
                FieldScalar::Short(ifd.compression),
            )?;
        }

        fw.write_field(
            w,
            TagId::PhotometricInterpretation.into(),
            FieldScalar::Short(ifd.photometric_interpretation),
        )?;

        if !ifd.document_name.is_empty() {
            fw.write_array(
                w,
                TagId::DocumentName.into(),
                FieldData::Ascii(&ifd.document_name),
                &mut overflow,
            )?;
        }
        if ifd.samples_per_pixel > 0 {
            fw.write_field(
                w,
                TagId::SamplesPerPixel.into(),
                FieldScalar::Short(ifd.samples_per_pixel),
            )?;
        }
        if ifd.planar_configuration > 0 {
            fw.write_field(
                w,
                TagId::PlanarConfiguration.into(),
                FieldScalar::Short(ifd.planar_configuration),
            )?;
        }
        if !ifd.date_time.is_empty() {
            fw.write_array(
                w,
                TagId::DateTime.into(),
                FieldData::Ascii(&ifd.date_time),
                &mut overflow,
            )?;
        }
        if ifd.predictor > 0 {
            fw.write_field(w, TagId::Predictor.into(), FieldScalar::Short(ifd.predictor))?;
        }
        if !ifd.colormap.is_empty() {
            fw.write_array(
                w,
                TagId::ColorMap.into(),
                FieldData::Shorts(&ifd.colormap),
                &mut overflow,
            )?;
        }
        if ifd.tile_width > 0 {
            fw.write_field(
                w,
                TagId::TileWidth.into(),
                FieldScalar::Short(ifd.tile_width),
            )?;
        }
        if ifd.tile_length > 0 {
            fw.write_field(
                w,
                TagId::TileLength.into(),
                FieldScalar::Short(ifd.tile_length),
            )?;
        }
        match &ifd.new_tile_offsets {
            TileOffsets::U32(offsets) if !offsets.is_empty() => {
                fw.write_array(
                    w,
                    TagId::TileOffsets.into(),
                    FieldData::Longs(offsets),
                    strile,
                )?;
            }
            TileOffsets::U64(offsets) if !offsets.is_empty() => {
                fw.write_array(
                    w,
                    TagId::TileOffsets.into(),
                    FieldData::Long8s(offsets),
                    strile,
                )?;
            }
            _ => {}
        }
        if !ifd.tile_byte_counts.is_empty() {
            fw.write_array(
                w,
                TagId::TileByteCounts.into(),
                FieldData::Longs(&ifd.tile_byte_counts),
                strile,
            )?;
        }
        if !ifd.extra_samples.is_empty() {
            fw.write_array(
                w,
                TagId::ExtraSamples.into(),
                FieldData::Shorts(&ifd.extra_samples),
                &mut overflow,
            )?;
        }
        if !ifd.sample_format.is_empty() {
            fw.write_array(
                w,
                TagId::SampleFormat.into(),
                FieldData::Shorts(&ifd.sample_format),
                &mut overflow,
            )?;
        }
        if !ifd.jpeg_tables.is_empty() {
            fw.write_array(
                w,
                TagId::JPEGTables.into(),
                FieldData::Bytes(&ifd.jpeg_tables),
                &mut overflow,
            )?;
        }
        if !ifd.model_pixel_scale.is_empty() {
            fw.write_array(
                w,
                TagId::ModelPixelScale.into(),
                FieldData::Doubles(&ifd.model_pixel_scale),
                &mut overflow,
            )?;
        }
        if !ifd.model_tiepoint.is_empty() {
            fw.write_array(
                w,
                TagId::ModelTiepoint.into(),
                FieldData::Doubles(&ifd.model_tiepoint),
                &mut overflow,
            )?;
        }
        if !ifd.model_transformation.is_empty() {
            fw.write_array(
                w,
                TagId::ModelTransformation.into(),
                FieldData::Doubles(&ifd.model_transformation),
                &mut overflow,
            )?;
        }
        if !ifd.geo_key_directory.is_empty() {
            fw.write_array(
                w,
                TagId::GeoKeyDirectory.into(),
                FieldData::Shorts(&ifd.geo_key_directory),
                &mut overflow,
            )?;
        }
        if !ifd.geo_double_params.is_empty() {
            fw.write_array(
                w,
                TagId::GeoDoubleParams.into(),
                FieldData::Doubles(&ifd.geo_double_params),
                &mut overflow,
            )?;
        }
        if !ifd.geo_ascii_params.is_empty() {
            fw.write_array(
                w,
                TagId::GeoAsciiParams.into(),
                FieldData::Ascii(&ifd.geo_ascii_params),
                &mut overflow,
            )?;
        }
        if !ifd.gdal_metadata.is_empty() {
            fw.write_array(
                w,
                TagId::GDALMetadata.into(),
                FieldData::Ascii(&ifd.gdal_metadata),
                &mut overflow,
            )?;
        }
        if !ifd.no_data.is_empty() {
            fw.write_array(
                w,
                TagId::GDALNoData.into(),
                FieldData::Ascii(&ifd.no_data),
                &mut overflow,
            )?;
        }
        if !ifd.lerc_params.is_empty() {
            fw.write_array(
                w,
                TagId::LercParams.into(),
                FieldData::Longs(&ifd.lerc_params),
                &mut overflow,
            )?;
        }
        if !ifd.rpcs.is_empty() {
            fw.write_array(
                w,
                TagId::Rpcs.into(),
                FieldData::Doubles(&ifd.rpcs),
                &mut overflow,
            )?;
        }

        self.variant.write_offset(self.endian, w, next_off)?;
        w.write_all(overflow.bytes())
    }
}
