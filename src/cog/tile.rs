//! 单瓦片 GeoTIFF 写出
//!
//! 把一个像素源写成只含一个目录、一个瓦片的 GeoTIFF 文件,
//! 采用与多图层 COG 相同的布局 (幽灵块、目录在前、负载装帧),
//! 但布局可以直接算出, 不需要经过规划器。

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::projection::Rect;
use crate::source::TileSource;
use crate::tiff::field::TagBuffer;
use crate::tiff::{Endian, TiffVariant};

use super::error::CogResult;
use super::ifd::{Ifd, TileOffsets};
use super::writer::{CogWriter, GHOST};

/// 把单个瓦片写成 GeoTIFF 文件
///
/// # 参数
/// * `source` - 瓦片像素源
/// * `bbox` - 瓦片覆盖范围, 坐标单位属于 `epsg_code` 坐标系
/// * `epsg_code` - 覆盖范围的坐标系, 写入 GeoKey 目录
/// * `no_data` - 可选的无数据值
///
/// 参考点取覆盖范围的西北角, 像素比例由范围和瓦片尺寸得出。
pub fn write_single_tile<P: AsRef<Path>>(
    path: P,
    source: &TileSource,
    bbox: Rect,
    epsg_code: u16,
    no_data: Option<&str>,
) -> CogResult<()> {
    let mut ifd = Ifd::new();

    // 负载先编码到内存, 同时填充目录的色彩元数据
    let mut spill: Vec<u8> = Vec::new();
    let payload_len = source.encode(&mut spill, Some(&mut ifd))?;

    ifd.set_epsg(epsg_code, true)?;
    let (width, height) = source.bounds();
    ifd.image_width = width as u64;
    ifd.image_length = height as u64;
    ifd.model_tiepoint = vec![0.0, 0.0, 0.0, bbox.min.0, bbox.max.1, 0.0];
    ifd.model_pixel_scale = vec![
        bbox.width() / width as f64,
        bbox.height() / height as f64,
        0.0,
    ];
    if let Some(no_data) = no_data {
        ifd.no_data = no_data.to_string();
    }

    ifd.tile_byte_counts = vec![payload_len];
    ifd.new_tile_offsets = TileOffsets::U32(vec![0]);
    ifd.update_structure(false);

    // 负载位置 = 头部 + 幽灵块 + 长度前缀 + 标签区 + 瓦片索引区
    let ghost_len = GHOST.len() as u64;
    let data_offset = 8 + ghost_len + 4 + ifd.tags_size + ifd.strile_size;
    ifd.new_tile_offsets = TileOffsets::U32(vec![data_offset as u32]);

    let writer = CogWriter::new(Endian::Little, TiffVariant::Normal);
    let mut out = BufWriter::new(File::create(path)?);
    writer.write_header(&mut out, false)?;
    let mut strile = TagBuffer::new(8 + ghost_len + ifd.tags_size);
    writer.write_ifd(&mut out, &ifd, 8 + ghost_len, &mut strile, false)?;
    out.write_all(strile.bytes())?;
    // 编码阶段已经写好帧: 长度前缀 + 负载 + 末 4 字节
    out.write_all(&spill)?;
    out.flush()?;
    Ok(())
}
