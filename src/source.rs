//! 瓦片像素源模块
//!
//! 像素源持有一个瓦片的像素数据、边界尺寸和选定的压缩方式,
//! 唯一的操作是 [`TileSource::encode`]: 按行序列化像素、压缩、
//! 写出带幽灵帧 (4 字节长度前缀 + 负载 + 末 4 字节重复) 的负载,
//! 并在首次编码时把隐含的色彩元数据填进图层目录。
//!
//! 像素格式用一个带标签的和类型枚举表示, 编码按变体分派。

use std::io::Write;

use crate::cog::compression::Compression;
use crate::cog::error::CogError;
use crate::cog::ifd::{
    Ifd, EXTRA_SAMPLES_ASSOC_ALPHA, EXTRA_SAMPLES_UNASS_ALPHA, PI_BLACK_IS_ZERO, PI_PALETTED,
    PI_RGB, PLANAR_CONFIG_CONTIG, SAMPLE_FORMAT_IEEEFP, SAMPLE_FORMAT_INT, SAMPLE_FORMAT_UINT,
};
use crate::tiff::Endian;

#[cfg(feature = "image")]
use image::DynamicImage;

/// 支持的像素数据变体
///
/// 图像类变体按行主序交错存储; 数值栅格是单样本的类型化数组。
#[derive(Clone, Debug, PartialEq)]
pub enum SourceData {
    /// 8 位调色板索引, 调色板最多 256 项 RGB
    Paletted8 {
        index: Vec<u8>,
        palette: Vec<[u8; 3]>,
    },
    /// 8 位灰度
    Gray8(Vec<u8>),
    /// 16 位灰度
    Gray16(Vec<u16>),
    /// 8 位 RGB, 3 字节/像素
    Rgb8(Vec<u8>),
    /// 8 位预乘 Alpha RGBA, 4 字节/像素
    Rgba8(Vec<u8>),
    /// 8 位非预乘 Alpha RGBA, 4 字节/像素
    NRgba8(Vec<u8>),
    /// 16 位预乘 Alpha RGBA, 4 样本/像素
    Rgba16(Vec<u16>),
    /// 16 位非预乘 Alpha RGBA, 4 样本/像素
    NRgba16(Vec<u16>),
    /// 无符号整数栅格
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    /// 有符号整数栅格
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    /// 浮点栅格
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl SourceData {
    /// 每个像素的样本数
    pub fn samples_per_pixel(&self) -> u16 {
        match self {
            SourceData::Rgb8(_) => 3,
            SourceData::Rgba8(_)
            | SourceData::NRgba8(_)
            | SourceData::Rgba16(_)
            | SourceData::NRgba16(_) => 4,
            _ => 1,
        }
    }

    /// 每个样本的位数
    pub fn bit_depth(&self) -> u16 {
        match self {
            SourceData::Paletted8 { .. }
            | SourceData::Gray8(_)
            | SourceData::Rgb8(_)
            | SourceData::Rgba8(_)
            | SourceData::NRgba8(_) => 8,
            SourceData::Gray16(_)
            | SourceData::Rgba16(_)
            | SourceData::NRgba16(_)
            | SourceData::U16(_)
            | SourceData::I16(_) => 16,
            SourceData::U32(_) | SourceData::I32(_) | SourceData::F32(_) => 32,
            SourceData::U64(_) | SourceData::I64(_) | SourceData::F64(_) => 64,
        }
    }

    /// 数据持有的样本总数
    fn sample_count(&self) -> usize {
        match self {
            SourceData::Paletted8 { index, .. } => index.len(),
            SourceData::Gray8(v) | SourceData::Rgb8(v) | SourceData::Rgba8(v)
            | SourceData::NRgba8(v) => v.len(),
            SourceData::Gray16(v)
            | SourceData::Rgba16(v)
            | SourceData::NRgba16(v)
            | SourceData::U16(v) => v.len(),
            SourceData::U32(v) => v.len(),
            SourceData::U64(v) => v.len(),
            SourceData::I16(v) => v.len(),
            SourceData::I32(v) => v.len(),
            SourceData::I64(v) => v.len(),
            SourceData::F32(v) => v.len(),
            SourceData::F64(v) => v.len(),
        }
    }

    /// 按行序列化为输出字节序的像素缓冲
    fn serialize(&self, endian: Endian) -> Vec<u8> {
        match self {
            SourceData::Paletted8 { index, .. } => index.clone(),
            SourceData::Gray8(v) | SourceData::Rgb8(v) | SourceData::Rgba8(v)
            | SourceData::NRgba8(v) => v.clone(),
            SourceData::Gray16(v)
            | SourceData::Rgba16(v)
            | SourceData::NRgba16(v)
            | SourceData::U16(v) => endian.encode_all(v),
            SourceData::U32(v) => endian.encode_all(v),
            SourceData::U64(v) => endian.encode_all(v),
            SourceData::I16(v) => endian.encode_all(v),
            SourceData::I32(v) => endian.encode_all(v),
            SourceData::I64(v) => endian.encode_all(v),
            SourceData::F32(v) => endian.encode_all(v),
            SourceData::F64(v) => endian.encode_all(v),
        }
    }
}

/// 一个瓦片的像素源
#[derive(Clone, Debug)]
pub struct TileSource {
    data: SourceData,
    width: u32,
    height: u32,
    compression: Compression,
    endian: Endian,
}

impl TileSource {
    /// 创建像素源
    ///
    /// 数据长度必须与边界尺寸一致, 不一致属于编程错误。
    pub fn new(data: SourceData, bounds: (u32, u32), compression: Compression) -> Self {
        let expected = bounds.0 as usize * bounds.1 as usize * data.samples_per_pixel() as usize;
        assert_eq!(
            data.sample_count(),
            expected,
            "pixel buffer does not match bounds {}x{}",
            bounds.0,
            bounds.1
        );
        Self {
            data,
            width: bounds.0,
            height: bounds.1,
            compression,
            endian: Endian::Little,
        }
    }

    /// 指定输出字节序 (默认小端)
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// 瓦片边界尺寸(像素)
    pub fn bounds(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// 选定的压缩方式
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// 像素数据
    pub fn data(&self) -> &SourceData {
        &self.data
    }

    /// 编码瓦片负载
    ///
    /// 向 `w` 写出 `[负载长度 u32][压缩负载][负载末 4 字节]`,
    /// 返回负载长度 (不含 8 字节帧)。长度前缀固定为小端,
    /// 与输出文件的块前导格式一致。传入 `ifd` 时填充该目录的
    /// 瓦片尺寸、色彩解释、样本描述和压缩方式字段。
    pub fn encode<W: Write>(&self, w: &mut W, ifd: Option<&mut Ifd>) -> Result<u32, CogError> {
        let pixels = self.data.serialize(self.endian);
        let payload = self.compression.encode(&pixels)?;
        let payload_len = payload.len() as u32;

        Endian::Little.write(w, payload_len)?;
        w.write_all(&payload)?;
        let mut trailer = [0u8; 4];
        let n = payload.len().min(4);
        trailer[4 - n..].copy_from_slice(&payload[payload.len() - n..]);
        w.write_all(&trailer)?;

        if let Some(ifd) = ifd {
            self.fill_ifd(ifd);
        }
        Ok(payload_len)
    }

    /// 填充像素格式隐含的目录字段
    fn fill_ifd(&self, ifd: &mut Ifd) {
        let spp = self.data.samples_per_pixel();
        let bits = self.data.bit_depth();

        ifd.tile_width = self.width as u16;
        ifd.tile_length = self.height as u16;
        ifd.compression = self.compression.into();
        ifd.samples_per_pixel = spp;
        ifd.bits_per_sample = vec![bits; spp as usize];
        if spp > 1 {
            ifd.planar_configuration = PLANAR_CONFIG_CONTIG;
        }

        let (photometric, sample_format, extra) = match &self.data {
            SourceData::Paletted8 { palette, .. } => {
                // 8 位调色板分量扩展为 16 位: c << 8 | c
                let mut colormap = vec![0u16; 256 * 3];
                for (i, [r, g, b]) in palette.iter().take(256).enumerate() {
                    colormap[i] = (*r as u16) << 8 | *r as u16;
                    colormap[i + 256] = (*g as u16) << 8 | *g as u16;
                    colormap[i + 512] = (*b as u16) << 8 | *b as u16;
                }
                ifd.colormap = colormap;
                (PI_PALETTED, None, None)
            }
            SourceData::Gray8(_) | SourceData::Gray16(_) => {
                (PI_BLACK_IS_ZERO, Some(SAMPLE_FORMAT_UINT), None)
            }
            SourceData::Rgb8(_) => (PI_RGB, None, None),
            SourceData::Rgba8(_) | SourceData::Rgba16(_) => {
                (PI_RGB, None, Some(EXTRA_SAMPLES_ASSOC_ALPHA))
            }
            SourceData::NRgba8(_) | SourceData::NRgba16(_) => {
                (PI_RGB, None, Some(EXTRA_SAMPLES_UNASS_ALPHA))
            }
            SourceData::U16(_) | SourceData::U32(_) | SourceData::U64(_) => {
                (PI_BLACK_IS_ZERO, Some(SAMPLE_FORMAT_UINT), None)
            }
            SourceData::I16(_) | SourceData::I32(_) | SourceData::I64(_) => {
                (PI_BLACK_IS_ZERO, Some(SAMPLE_FORMAT_INT), None)
            }
            SourceData::F32(_) | SourceData::F64(_) => {
                (PI_BLACK_IS_ZERO, Some(SAMPLE_FORMAT_IEEEFP), None)
            }
        };

        ifd.photometric_interpretation = photometric;
        ifd.sample_format = match sample_format {
            Some(sf) => vec![sf],
            None => vec![],
        };
        ifd.extra_samples = match extra {
            Some(es) => vec![es],
            None => vec![],
        };
    }

    /// 从解码后的动态图像创建像素源
    ///
    /// image crate 的 RGBA 通道是非预乘的, 其余格式先转换为 RGBA。
    #[cfg(feature = "image")]
    pub fn from_image(img: &DynamicImage, compression: Compression) -> Self {
        let (w, h) = (img.width(), img.height());
        let data = match img {
            DynamicImage::ImageLuma8(buf) => SourceData::Gray8(buf.as_raw().clone()),
            DynamicImage::ImageLuma16(buf) => SourceData::Gray16(buf.as_raw().clone()),
            DynamicImage::ImageRgb8(buf) => SourceData::Rgb8(buf.as_raw().clone()),
            DynamicImage::ImageRgba8(buf) => SourceData::NRgba8(buf.as_raw().clone()),
            DynamicImage::ImageRgba16(buf) => SourceData::NRgba16(buf.as_raw().clone()),
            other => SourceData::NRgba8(other.to_rgba8().into_raw()),
        };
        Self::new(data, (w, h), compression)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cog::ifd::TileOffsets;

    fn gradient(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn uncompressed_rgba_framing() {
        let pixels = gradient(4 * 4 * 4);
        let src = TileSource::new(
            SourceData::Rgba8(pixels.clone()),
            (4, 4),
            Compression::Uncompressed,
        );
        let mut out = vec![];
        let len = src.encode(&mut out, None).unwrap();
        assert_eq!(len, 64);
        assert_eq!(out.len(), 64 + 8);
        // 长度前缀
        assert_eq!(&out[0..4], &(64u32).to_le_bytes());
        // 负载本体
        assert_eq!(&out[4..68], &pixels[..]);
        // 末 4 字节重复
        assert_eq!(&out[68..72], &pixels[60..64]);
    }

    #[test]
    fn first_encode_fills_ifd() {
        let src = TileSource::new(
            SourceData::Rgba8(gradient(8 * 8 * 4)),
            (8, 8),
            Compression::Lzw,
        );
        let mut ifd = Ifd::new();
        ifd.new_tile_offsets = TileOffsets::U32(vec![0]);
        let mut out = vec![];
        src.encode(&mut out, Some(&mut ifd)).unwrap();
        assert_eq!(ifd.tile_width, 8);
        assert_eq!(ifd.tile_length, 8);
        assert_eq!(ifd.photometric_interpretation, PI_RGB);
        assert_eq!(ifd.samples_per_pixel, 4);
        assert_eq!(ifd.bits_per_sample, vec![8, 8, 8, 8]);
        assert_eq!(ifd.extra_samples, vec![EXTRA_SAMPLES_ASSOC_ALPHA]);
        assert_eq!(ifd.planar_configuration, PLANAR_CONFIG_CONTIG);
        assert_eq!(u16::from(Compression::Lzw), ifd.compression);
        assert!(ifd.sample_format.is_empty());
    }

    #[test]
    fn paletted_colormap_expansion() {
        let src = TileSource::new(
            SourceData::Paletted8 {
                index: vec![0, 1, 1, 0],
                palette: vec![[255, 0, 10], [1, 2, 3]],
            },
            (2, 2),
            Compression::Uncompressed,
        );
        let mut ifd = Ifd::new();
        let mut out = vec![];
        src.encode(&mut out, Some(&mut ifd)).unwrap();
        assert_eq!(ifd.photometric_interpretation, PI_PALETTED);
        assert_eq!(ifd.colormap.len(), 768);
        assert_eq!(ifd.colormap[0], 0xFFFF);
        assert_eq!(ifd.colormap[1], 0x0101);
        assert_eq!(ifd.colormap[256], 0x0000);
        assert_eq!(ifd.colormap[257], 0x0202);
        assert_eq!(ifd.colormap[512], 0x0A0A);
        assert_eq!(ifd.colormap[513], 0x0303);
    }

    #[test]
    fn numeric_raster_metadata() {
        let src = TileSource::new(
            SourceData::F32(vec![0.5; 16]),
            (4, 4),
            Compression::Deflate,
        );
        let mut ifd = Ifd::new();
        let mut out = vec![];
        let len = src.encode(&mut out, Some(&mut ifd)).unwrap();
        assert_eq!(out.len() as u32, len + 8);
        assert_eq!(ifd.bits_per_sample, vec![32]);
        assert_eq!(ifd.sample_format, vec![SAMPLE_FORMAT_IEEEFP]);
        assert_eq!(ifd.samples_per_pixel, 1);
        assert_eq!(ifd.photometric_interpretation, PI_BLACK_IS_ZERO);
    }

    #[test]
    fn gray16_byte_order() {
        let src = TileSource::new(
            SourceData::Gray16(vec![0x1234, 0x5678]),
            (2, 1),
            Compression::Uncompressed,
        )
        .with_endian(Endian::Big);
        let mut out = vec![];
        src.encode(&mut out, None).unwrap();
        assert_eq!(&out[4..8], &[0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    #[should_panic]
    fn bounds_mismatch_rejected() {
        let _ = TileSource::new(
            SourceData::Gray8(vec![0; 10]),
            (4, 4),
            Compression::Uncompressed,
        );
    }
}
