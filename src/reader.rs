//! GeoTIFF 读取模块
//!
//! 读取器解析 TIFF/BigTIFF 结构, 把每个目录水合为类型化的 [`Ifd`],
//! 并按需把某个目录的像素数据解压、撤销预测器、拼装为完整的
//! 像素缓冲 (瓦片编码的逆过程)。瓦片组织是主要路径,
//! 条带组织的文件按条带块读取。

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::cog::compression::{Compression, Predictor};
use crate::cog::error::{CogError, CogResult};
use crate::cog::ifd::{
    GeoTransform, Ifd, PI_BLACK_IS_ZERO, PI_PALETTED, PI_RGB, PI_WHITE_IS_ZERO,
    SAMPLE_FORMAT_IEEEFP, SAMPLE_FORMAT_INT, SAMPLE_FORMAT_UINT,
};
use crate::geotags;
use crate::projection::Rect;
use crate::source::SourceData;
use crate::tiff::{Endian, Tiff};

/// 一个目录的完整像素数据
#[derive(Debug, Clone)]
pub struct ImageData {
    pub width: u64,
    pub height: u64,
    pub data: SourceData,
}

/// 分块 GeoTIFF 读取器
pub struct Reader {
    /// 文件字节序
    pub endian: Endian,
    ifds: Vec<Ifd>,
    source: File,
}

impl Reader {
    /// 打开并解析一个 (Geo)TIFF 文件
    pub fn open<P: AsRef<Path>>(path: P) -> CogResult<Reader> {
        let file = File::open(path)?;
        let mut stream = BufReader::new(file);
        let tiff = Tiff::open(&mut stream)?;
        let ifds = tiff
            .ifds
            .iter()
            .map(Ifd::from_raw)
            .collect::<CogResult<Vec<Ifd>>>()?;
        Ok(Reader {
            endian: tiff.endian,
            ifds,
            source: stream.into_inner(),
        })
    }

    /// 解析出的目录, 按文件链序
    pub fn ifds(&self) -> &[Ifd] {
        &self.ifds
    }

    /// 某个目录的图像尺寸 (宽, 高)
    pub fn size(&self, index: usize) -> (u64, u64) {
        let ifd = &self.ifds[index];
        (ifd.image_width, ifd.image_length)
    }

    /// 某个目录的像素比例 [ScaleX, ScaleY, ScaleZ]
    pub fn pixel_scale(&self, index: usize) -> Option<[f64; 3]> {
        let scale = &self.ifds[index].model_pixel_scale;
        (scale.len() >= 3).then(|| [scale[0], scale[1], scale[2]])
    }

    /// 某个目录的仿射变换
    pub fn geotransform(&self, index: usize) -> CogResult<GeoTransform> {
        self.ifds[index].geotransform()
    }

    /// 从 GeoKey 目录提取 EPSG 代码
    pub fn epsg(&self, index: usize) -> Option<u16> {
        geotags::epsg_from_directory(&self.ifds[index].geo_key_directory)
    }

    /// 某个目录的世界坐标覆盖范围
    pub fn bbox(&self, index: usize) -> CogResult<Rect> {
        let gt = self.geotransform(index)?;
        let (width, height) = self.size(index);
        let (ox, oy) = gt.origin();
        let (sx, sy) = gt.scale();
        Ok(Rect::new(
            ox,
            oy - sy * height as f64,
            ox + sx * width as f64,
            oy,
        ))
    }

    /// 读取某个目录的完整像素数据
    ///
    /// 逐块读取、解压、撤销预测器, 再按色彩解释拼装为类型化缓冲。
    pub fn data(&mut self, index: usize) -> CogResult<ImageData> {
        let ifd = &self.ifds[index];
        let endian = self.endian;
        let width = ifd.image_width as usize;
        let height = ifd.image_length as usize;
        let compression = Compression::from(ifd.compression);
        let predictor = Predictor::from(ifd.predictor.max(1));
        let bits = ifd.bits_per_sample.first().copied().unwrap_or(1);
        let spp = ifd.bits_per_sample.len().max(1);
        // SampleFormat 缺省为无符号整数
        let sample_format = ifd
            .sample_format
            .first()
            .copied()
            .unwrap_or(SAMPLE_FORMAT_UINT);

        if predictor == Predictor::FloatingPoint {
            return Err(CogError::UnsupportedSampleFormat(sample_format, bits));
        }

        // 块几何: 瓦片优先, 否则按条带回退
        let (block_w, block_h, offsets, counts): (usize, usize, Vec<u64>, &[u32]) =
            if ifd.tile_width > 0 {
                (
                    ifd.tile_width as usize,
                    ifd.tile_length as usize,
                    ifd.original_tile_offsets.clone(),
                    &ifd.tile_byte_counts,
                )
            } else {
                let block_h = if ifd.rows_per_strip > 0 {
                    ifd.rows_per_strip as usize
                } else {
                    height
                };
                (
                    width,
                    block_h,
                    ifd.strip_offsets.clone(),
                    &ifd.strip_byte_counts,
                )
            };
        let blocks_across = if block_w > 0 { width.div_ceil(block_w) } else { 1 };
        let blocks_down = if block_h > 0 { height.div_ceil(block_h) } else { 1 };
        let needed = blocks_across * blocks_down;
        if offsets.len() < needed || counts.len() < needed {
            return Err(CogError::InconsistentTiles {
                offsets: offsets.len(),
                byte_counts: counts.len(),
            });
        }

        let mode = pixel_mode(ifd, bits, spp)?;
        let mut assembled = mode.allocate(width * height);

        for j in 0..blocks_down {
            for i in 0..blocks_across {
                let block_index = j * blocks_across + i;
                let count = counts[block_index] as usize;
                if count == 0 {
                    continue;
                }
                self.source.seek(SeekFrom::Start(offsets[block_index]))?;
                let mut raw = vec![0u8; count];
                self.source.read_exact(&mut raw)?;
                let mut block = compression.decode(&raw)?;
                predictor.undo(&mut block, block_w, bits as usize, spp, endian)?;

                let window = Window {
                    xmin: i * block_w,
                    ymin: j * block_h,
                    xmax: (i * block_w + block_w).min(width),
                    ymax: (j * block_h + block_h).min(height),
                };
                mode.fill(&mut assembled, &block, block_w, width, window, endian);
            }
        }

        Ok(ImageData {
            width: width as u64,
            height: height as u64,
            data: assembled,
        })
    }
}

/// 一个块在整幅图像中的可见窗口
#[derive(Clone, Copy, Debug)]
struct Window {
    xmin: usize,
    ymin: usize,
    xmax: usize,
    ymax: usize,
}

/// 读取侧的像素模式, 决定缓冲类型和逐样本转换
#[derive(Clone, Debug)]
enum PixelMode {
    Gray8,
    Rgb8,
    Rgba8 { premultiplied: bool },
    Rgba16 { premultiplied: bool },
    Paletted(Vec<[u8; 3]>),
    U16,
    U32,
    U64,
    I16,
    I32,
    I64,
    F32,
    F64,
}

/// 根据色彩解释和样本描述确定像素模式
fn pixel_mode(ifd: &Ifd, bits: u16, spp: usize) -> CogResult<PixelMode> {
    let sample_format = ifd
        .sample_format
        .first()
        .copied()
        .unwrap_or(SAMPLE_FORMAT_UINT);
    match ifd.photometric_interpretation {
        PI_RGB => {
            if !ifd.bits_per_sample.iter().all(|&b| b == bits) || (bits != 8 && bits != 16) {
                return Err(CogError::UnsupportedSampleFormat(sample_format, bits));
            }
            match (spp, bits) {
                (3, 8) => Ok(PixelMode::Rgb8),
                (4, _) => {
                    let premultiplied = match ifd.extra_samples.first() {
                        Some(1) => true,
                        Some(2) => false,
                        _ => return Err(CogError::UnsupportedSampleFormat(sample_format, bits)),
                    };
                    if bits == 8 {
                        Ok(PixelMode::Rgba8 { premultiplied })
                    } else {
                        Ok(PixelMode::Rgba16 { premultiplied })
                    }
                }
                _ => Err(CogError::UnsupportedSampleFormat(sample_format, bits)),
            }
        }
        PI_PALETTED => {
            let colormap = &ifd.colormap;
            let n_colors = colormap.len() / 3;
            if colormap.is_empty() || colormap.len() % 3 != 0 || n_colors > 256 {
                return Err(CogError::BadColorMap(colormap.len()));
            }
            // 16 位调色板分量收窄回 8 位
            let palette = (0..n_colors)
                .map(|i| {
                    [
                        (colormap[i] >> 8) as u8,
                        (colormap[i + n_colors] >> 8) as u8,
                        (colormap[i + 2 * n_colors] >> 8) as u8,
                    ]
                })
                .collect();
            Ok(PixelMode::Paletted(palette))
        }
        PI_BLACK_IS_ZERO | PI_WHITE_IS_ZERO => match (sample_format, bits) {
            (SAMPLE_FORMAT_UINT, 8) => Ok(PixelMode::Gray8),
            (SAMPLE_FORMAT_UINT, 16) => Ok(PixelMode::U16),
            (SAMPLE_FORMAT_UINT, 32) => Ok(PixelMode::U32),
            (SAMPLE_FORMAT_UINT, 64) => Ok(PixelMode::U64),
            (SAMPLE_FORMAT_INT, 16) => Ok(PixelMode::I16),
            (SAMPLE_FORMAT_INT, 32) => Ok(PixelMode::I32),
            (SAMPLE_FORMAT_INT, 64) => Ok(PixelMode::I64),
            (SAMPLE_FORMAT_IEEEFP, 32) => Ok(PixelMode::F32),
            (SAMPLE_FORMAT_IEEEFP, 64) => Ok(PixelMode::F64),
            _ => Err(CogError::UnsupportedSampleFormat(sample_format, bits)),
        },
        other => Err(CogError::UnsupportedPhotometric(other)),
    }
}

impl PixelMode {
    /// 分配整幅图像的目标缓冲
    fn allocate(&self, pixels: usize) -> SourceData {
        match self {
            PixelMode::Gray8 => SourceData::Gray8(vec![0; pixels]),
            PixelMode::Rgb8 => SourceData::Rgb8(vec![0; pixels * 3]),
            PixelMode::Rgba8 { premultiplied: true } => SourceData::Rgba8(vec![0; pixels * 4]),
            PixelMode::Rgba8 { premultiplied: false } => SourceData::NRgba8(vec![0; pixels * 4]),
            PixelMode::Rgba16 { premultiplied: true } => SourceData::Rgba16(vec![0; pixels * 4]),
            PixelMode::Rgba16 { premultiplied: false } => SourceData::NRgba16(vec![0; pixels * 4]),
            PixelMode::Paletted(palette) => SourceData::Paletted8 {
                index: vec![0; pixels],
                palette: palette.clone(),
            },
            PixelMode::U16 => SourceData::U16(vec![0; pixels]),
            PixelMode::U32 => SourceData::U32(vec![0; pixels]),
            PixelMode::U64 => SourceData::U64(vec![0; pixels]),
            PixelMode::I16 => SourceData::I16(vec![0; pixels]),
            PixelMode::I32 => SourceData::I32(vec![0; pixels]),
            PixelMode::I64 => SourceData::I64(vec![0; pixels]),
            PixelMode::F32 => SourceData::F32(vec![0.0; pixels]),
            PixelMode::F64 => SourceData::F64(vec![0.0; pixels]),
        }
    }

    /// 把一个块的可见窗口填入目标缓冲
    fn fill(
        &self,
        dst: &mut SourceData,
        block: &[u8],
        block_w: usize,
        image_w: usize,
        window: Window,
        endian: Endian,
    ) {
        match (self, dst) {
            (PixelMode::Gray8, SourceData::Gray8(v)) => {
                fill_samples(v, block, block_w, image_w, window, 1, 1, |b| b[0])
            }
            (PixelMode::Paletted(_), SourceData::Paletted8 { index, .. }) => {
                fill_samples(index, block, block_w, image_w, window, 1, 1, |b| b[0])
            }
            (PixelMode::Rgb8, SourceData::Rgb8(v)) => {
                fill_samples(v, block, block_w, image_w, window, 3, 1, |b| b[0])
            }
            (PixelMode::Rgba8 { .. }, SourceData::Rgba8(v) | SourceData::NRgba8(v)) => {
                fill_samples(v, block, block_w, image_w, window, 4, 1, |b| b[0])
            }
            (PixelMode::Rgba16 { .. }, SourceData::Rgba16(v) | SourceData::NRgba16(v)) => {
                fill_samples(v, block, block_w, image_w, window, 4, 2, |b| u16_at(endian, b))
            }
            (PixelMode::U16, SourceData::U16(v)) => {
                fill_samples(v, block, block_w, image_w, window, 1, 2, |b| u16_at(endian, b))
            }
            (PixelMode::U32, SourceData::U32(v)) => {
                fill_samples(v, block, block_w, image_w, window, 1, 4, |b| u32_at(endian, b))
            }
            (PixelMode::U64, SourceData::U64(v)) => {
                fill_samples(v, block, block_w, image_w, window, 1, 8, |b| u64_at(endian, b))
            }
            (PixelMode::I16, SourceData::I16(v)) => fill_samples(
                v,
                block,
                block_w,
                image_w,
                window,
                1,
                2,
                |b| u16_at(endian, b) as i16,
            ),
            (PixelMode::I32, SourceData::I32(v)) => fill_samples(
                v,
                block,
                block_w,
                image_w,
                window,
                1,
                4,
                |b| u32_at(endian, b) as i32,
            ),
            (PixelMode::I64, SourceData::I64(v)) => fill_samples(
                v,
                block,
                block_w,
                image_w,
                window,
                1,
                8,
                |b| u64_at(endian, b) as i64,
            ),
            (PixelMode::F32, SourceData::F32(v)) => fill_samples(
                v,
                block,
                block_w,
                image_w,
                window,
                1,
                4,
                |b| f32::from_bits(u32_at(endian, b)),
            ),
            (PixelMode::F64, SourceData::F64(v)) => fill_samples(
                v,
                block,
                block_w,
                image_w,
                window,
                1,
                8,
                |b| f64::from_bits(u64_at(endian, b)),
            ),
            // allocate 与 fill 由同一个模式驱动, 不会出现其它组合
            _ => unreachable!("pixel mode and buffer variant diverged"),
        }
    }
}

fn u16_at(endian: Endian, b: &[u8]) -> u16 {
    match endian {
        Endian::Little => u16::from_le_bytes([b[0], b[1]]),
        Endian::Big => u16::from_be_bytes([b[0], b[1]]),
    }
}

fn u32_at(endian: Endian, b: &[u8]) -> u32 {
    match endian {
        Endian::Little => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        Endian::Big => u32::from_be_bytes([b[0], b[1], b[2], b[3]]),
    }
}

fn u64_at(endian: Endian, b: &[u8]) -> u64 {
    let bytes: [u8; 8] = [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]];
    match endian {
        Endian::Little => u64::from_le_bytes(bytes),
        Endian::Big => u64::from_be_bytes(bytes),
    }
}

/// 把块数据的可见窗口逐样本搬入整幅缓冲
///
/// 块内行距是完整的块宽度, 边缘块右侧/下方的填充像素被跳过。
#[allow(clippy::too_many_arguments)]
fn fill_samples<T: Copy, F: Fn(&[u8]) -> T>(
    dst: &mut [T],
    block: &[u8],
    block_w: usize,
    image_w: usize,
    window: Window,
    spp: usize,
    sample_size: usize,
    read: F,
) {
    let row_stride = block_w * spp * sample_size;
    for (by, y) in (window.ymin..window.ymax).enumerate() {
        let start = by * row_stride;
        if start >= block.len() {
            return;
        }
        let row = &block[start..];
        for (bx, x) in (window.xmin..window.xmax).enumerate() {
            for s in 0..spp {
                let src = (bx * spp + s) * sample_size;
                if src + sample_size > row.len() {
                    return;
                }
                dst[(y * image_w + x) * spp + s] = read(&row[src..src + sample_size]);
            }
        }
    }
}
