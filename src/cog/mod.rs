//! Cloud Optimized GeoTIFF 组装与布局规划模块
//!
//! [`Cog`] 持有一条目录链: 一个主目录、挂在链尾的逐级概览,
//! 以及挂在主目录或概览上的掩膜。写出分两步:
//!
//! 1. **布局规划**: 先对链上每个目录做结构测量 (标签数与各区字节数),
//!    再按瓦片交错顺序放置每个瓦片负载的绝对偏移量。任一偏移量超出
//!    4 GiB 表示范围时丢弃放置结果, 升级为 BigTIFF 并重算一次。
//! 2. **单次前向写出**: 头部、幽灵块、目录链、共享瓦片索引区、
//!    瓦片负载, 负载按交错顺序从各图层的溢出文件取出并重新装帧。
//!
//! 瓦片交错顺序: 分辨率最低的概览在前, 层内按 (y, x) 行主序,
//! 同一格先图像目录后掩膜, 分平面存储时平面在最内层。

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use crate::layer::TileLayer;
use crate::tiff::field::TagBuffer;
use crate::tiff::{Endian, TiffVariant};

pub(crate) mod compression;
pub(crate) mod error;
pub(crate) mod ifd;
mod tile;
mod writer;

pub use compression::{CodecError, Compression, Predictor};
pub use error::{CogError, CogResult};
pub use ifd::{
    GeoTransform, Ifd, TileOffsets, EXTRA_SAMPLES_ASSOC_ALPHA, EXTRA_SAMPLES_UNASS_ALPHA,
    PI_BLACK_IS_ZERO, PI_MASK, PI_PALETTED, PI_RGB, PI_WHITE_IS_ZERO, PLANAR_CONFIG_CONTIG,
    PLANAR_CONFIG_SEPARATE, SAMPLE_FORMAT_IEEEFP, SAMPLE_FORMAT_INT, SAMPLE_FORMAT_UINT,
    SUBFILE_TYPE_MASK, SUBFILE_TYPE_NONE, SUBFILE_TYPE_PAGE, SUBFILE_TYPE_REDUCED_IMAGE,
};
pub use tile::write_single_tile;

use ifd::TileOffsets as Offsets;
use writer::{ghost_block, CogWriter};

/// 一个待写出的 COG 文件
pub struct Cog {
    endian: Endian,
    bigtiff: bool,
    ifd: Ifd,
}

impl Cog {
    /// 以主目录创建 COG, 默认小端、标准 TIFF 封装
    pub fn new(primary: Ifd) -> Self {
        Self {
            endian: Endian::Little,
            bigtiff: false,
            ifd: primary,
        }
    }

    /// 指定输出字节序
    pub fn with_endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// 预先要求 BigTIFF 封装 (超过 4 GiB 时无论如何都会自动升级)
    pub fn with_bigtiff(mut self, bigtiff: bool) -> Self {
        self.bigtiff = bigtiff;
        self
    }

    /// 主目录
    pub fn primary(&self) -> &Ifd {
        &self.ifd
    }

    /// 是否以 BigTIFF 封装写出 (规划之后有效)
    pub fn is_bigtiff(&self) -> bool {
        self.bigtiff
    }

    /// 把概览目录追加到链尾
    pub fn add_overview(&mut self, ovr: Ifd) {
        fn attach(node: &mut Ifd, ovr: Ifd) {
            match node.overview {
                Some(ref mut next) => attach(next, ovr),
                None => node.add_overview(ovr),
            }
        }
        attach(&mut self.ifd, ovr);
    }

    /// 给主目录挂接掩膜 (概览的掩膜在 add_overview 之前挂在概览上)
    pub fn add_mask(&mut self, mask: Ifd) {
        self.ifd.add_mask(mask);
    }

    /// 对链上每个目录 (含掩膜) 依序执行操作
    fn for_each_node_mut<F: FnMut(&mut Ifd)>(&mut self, mut f: F) {
        let mut node = Some(&mut self.ifd);
        while let Some(current) = node {
            f(&mut *current);
            for mask in current.masks.iter_mut() {
                f(mask);
            }
            node = current.overview.as_deref_mut();
        }
    }

    /// 结构测量: 计算每个目录的标签数、各区字节数和瓦片网格
    fn compute_structure(&mut self) {
        let bigtiff = self.bigtiff;
        self.for_each_node_mut(|ifd| ifd.update_structure(bigtiff));
    }

    /// 布局规划: 先测量结构, 再放置所有瓦片负载的绝对偏移量
    ///
    /// 放置过程中偏移量超出 u32 表示范围时升级为 BigTIFF 并重来,
    /// 升级最多发生一次。
    fn compute_imagery_offsets(&mut self) -> CogResult<()> {
        loop {
            let bigtiff = self.bigtiff;
            self.for_each_node_mut(|ifd| {
                ifd.new_tile_offsets
                    .allocate(ifd.original_tile_offsets.len(), bigtiff);
            });
            self.compute_structure();

            // 第一个瓦片负载的位置: 头部 + 幽灵块 + 4 字节长度前缀
            let header = if self.bigtiff { 16 } else { 8 };
            let ghost = ghost_block(!self.ifd.masks.is_empty()).len() as u64;
            let mut data_offset = header + ghost + 4;
            self.for_each_node_mut(|ifd| {
                data_offset += ifd.tags_size + ifd.strile_size;
            });

            if place_level_tiles(&mut self.ifd, &mut data_offset, self.bigtiff) {
                debug!(data_offset, "tile data exceeds 4 GiB, escalating to bigtiff");
                self.bigtiff = true;
                continue;
            }
            return Ok(());
        }
    }

    /// 单次前向写出整个文件
    pub fn write<W: Write>(&mut self, out: &mut W) -> CogResult<()> {
        self.validate()?;
        self.compute_imagery_offsets()?;

        let has_mask = !self.ifd.masks.is_empty();
        let variant = if self.bigtiff {
            TiffVariant::Big
        } else {
            TiffVariant::Normal
        };
        let header = variant.header_size();
        let ghost = ghost_block(has_mask).len() as u64;

        // 共享瓦片索引区紧跟在所有目录之后
        let mut strile_offset = header + ghost;
        self.for_each_node_mut(|ifd| strile_offset += ifd.tags_size);
        let mut strile = TagBuffer::new(strile_offset);

        let writer = CogWriter::new(self.endian, variant);
        writer.write_header(out, has_mask)?;

        // 目录链: 主目录、其掩膜、概览、概览的掩膜...
        let mut offset = header + ghost;
        let mut node = Some(&self.ifd);
        while let Some(current) = node {
            let n_masks = current.masks.len();
            let has_more = n_masks > 0 || current.overview.is_some();
            writer.write_ifd(out, current, offset, &mut strile, has_more)?;
            offset += current.tags_size;
            for (i, mask) in current.masks.iter().enumerate() {
                let has_more = i != n_masks - 1 || current.overview.is_some();
                writer.write_ifd(out, mask, offset, &mut strile, has_more)?;
                offset += mask.tags_size;
            }
            node = current.overview.as_deref();
        }

        out.write_all(strile.bytes())?;

        copy_level_tiles(&mut self.ifd, out)?;
        debug!(bigtiff = self.bigtiff, "cog written");
        Ok(())
    }

    /// 写出前的输入校验
    fn validate(&mut self) -> CogResult<()> {
        let mut strip_found = false;
        self.for_each_node_mut(|ifd| {
            if ifd.tile_width == 0 && !ifd.strip_offsets.is_empty() {
                strip_found = true;
            }
        });
        if strip_found {
            return Err(CogError::StripTiffUnsupported);
        }
        Ok(())
    }
}

/// 按交错顺序放置瓦片偏移量, 概览递归在前
///
/// 返回 true 表示偏移量超出 u32 表示范围, 需要升级封装格式。
fn place_level_tiles(ifd: &mut Ifd, data_offset: &mut u64, bigtiff: bool) -> bool {
    if let Some(ovr) = ifd.overview.as_deref_mut() {
        if place_level_tiles(ovr, data_offset, bigtiff) {
            return true;
        }
    }
    for y in 0..ifd.n_tiles_y {
        for x in 0..ifd.n_tiles_x {
            if place_tile(
                &ifd.tile_byte_counts,
                &mut ifd.new_tile_offsets,
                ifd.n_tiles_x,
                ifd.n_planes,
                x,
                y,
                data_offset,
                bigtiff,
            ) {
                return true;
            }
            for mask in ifd.masks.iter_mut() {
                if place_tile(
                    &mask.tile_byte_counts,
                    &mut mask.new_tile_offsets,
                    mask.n_tiles_x,
                    mask.n_planes,
                    x,
                    y,
                    data_offset,
                    bigtiff,
                ) {
                    return true;
                }
            }
        }
    }
    false
}

/// 放置一个网格位置上所有平面的瓦片
#[allow(clippy::too_many_arguments)]
fn place_tile(
    byte_counts: &[u32],
    offsets: &mut Offsets,
    n_tiles_x: u64,
    n_planes: u64,
    x: u64,
    y: u64,
    data_offset: &mut u64,
    bigtiff: bool,
) -> bool {
    for plane in 0..n_planes {
        let index = ((x + y * n_tiles_x) * n_planes + plane) as usize;
        let Some(&count) = byte_counts.get(index) else {
            continue;
        };
        if count > 0 {
            if !bigtiff && *data_offset > u32::MAX as u64 {
                return true;
            }
            offsets.set(index, *data_offset);
            *data_offset += count as u64 + 8;
        } else {
            offsets.set(index, 0);
        }
    }
    false
}

/// 按交错顺序从溢出文件取负载并装帧写出, 概览递归在前
fn copy_level_tiles<W: Write>(ifd: &mut Ifd, out: &mut W) -> CogResult<()> {
    if let Some(ovr) = ifd.overview.as_deref_mut() {
        copy_level_tiles(ovr, out)?;
    }
    for y in 0..ifd.n_tiles_y {
        for x in 0..ifd.n_tiles_x {
            copy_tile(
                &ifd.tile_byte_counts,
                &ifd.original_tile_offsets,
                &mut ifd.tile_data,
                ifd.n_tiles_x,
                ifd.n_planes,
                x,
                y,
                out,
            )?;
            for mask in ifd.masks.iter_mut() {
                copy_tile(
                    &mask.tile_byte_counts,
                    &mask.original_tile_offsets,
                    &mut mask.tile_data,
                    mask.n_tiles_x,
                    mask.n_planes,
                    x,
                    y,
                    out,
                )?;
            }
        }
    }
    Ok(())
}

/// 取出并写出一个网格位置上所有平面的瓦片负载
///
/// 每个非空瓦片写出 `[字节数 u32 小端][负载][负载末 4 字节]`。
#[allow(clippy::too_many_arguments)]
fn copy_tile<W: Write>(
    byte_counts: &[u32],
    original_offsets: &[u64],
    tile_data: &mut Option<File>,
    n_tiles_x: u64,
    n_planes: u64,
    x: u64,
    y: u64,
    out: &mut W,
) -> CogResult<()> {
    for plane in 0..n_planes {
        let index = ((x + y * n_tiles_x) * n_planes + plane) as usize;
        let Some(&count) = byte_counts.get(index) else {
            continue;
        };
        if count == 0 {
            continue;
        }
        let Some(source) = tile_data.as_mut() else {
            return Err(CogError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "ifd has tile byte counts but no tile data source",
            )));
        };
        source.seek(SeekFrom::Start(original_offsets[index]))?;
        let mut payload = vec![0u8; count as usize];
        source.read_exact(&mut payload)?;

        out.write_all(&count.to_le_bytes())?;
        out.write_all(&payload)?;
        let n = payload.len().min(4);
        let mut trailer = [0u8; 4];
        trailer[4 - n..].copy_from_slice(&payload[payload.len() - n..]);
        out.write_all(&trailer)?;
    }
    Ok(())
}

/// 把一组图层写成一个 COG 文件
///
/// 图层按层级从高到低排序后, 最高层级作为主目录,
/// 其余依次成为概览。`bigtiff` 为提示值, 布局超过 4 GiB 时
/// 会自动升级。
///
/// # 错误
/// 图层列表为空时返回 `NoLayers`
pub fn write_cog<P: AsRef<Path>>(
    path: P,
    mut layers: Vec<TileLayer>,
    bigtiff: bool,
) -> CogResult<()> {
    if layers.is_empty() {
        return Err(CogError::NoLayers);
    }
    layers.sort_by(|a, b| b.level().cmp(&a.level()));
    for layer in layers.iter_mut() {
        layer.encode()?;
    }

    let mut iter = layers.into_iter();
    let primary = iter.next().expect("checked non-empty").into_ifd();
    let mut cog = Cog::new(primary).with_bigtiff(bigtiff);
    for layer in iter {
        cog.add_overview(layer.into_ifd());
    }

    let mut out = BufWriter::new(File::create(path)?);
    cog.write(&mut out)?;
    out.flush()?;
    Ok(())
}
