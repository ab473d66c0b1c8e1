//! 这是一个从预渲染地图瓦片生成 Cloud Optimized GeoTIFF (COG) 的库
//!
//! COG 是一种面向云存储的 TIFF 组织方式: 目录在数据之前,
//! 瓦片带长度装帧, HTTP 范围读取器不用下载整个文件就能取到
//! 任意层级的任意瓦片。
//!
//! # 主要功能
//! - 从瓦片图层写出 COG 文件 (目录链、概览、掩膜、瓦片交错)
//! - 自动在标准 TIFF 与 BigTIFF 之间选择封装格式 (4 GiB 界限)
//! - GDAL 结构化元数据幽灵块与块装帧
//! - GeoKey 目录构建与 EPSG 注册表
//! - 读取分块 GeoTIFF 并还原类型化像素缓冲
//!
//! # 示例
//! ```no_run
//! use cogtile::{write_cog, Compression, GridOrigin, Rect, SourceData, TileGrid, TileLayer, TileSource};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let grid = TileGrid::web_mercator((512, 512), GridOrigin::UpperLeft)?;
//! let bbox = Rect::new(-20000.0, -20000.0, 20000.0, 20000.0);
//! let mut layer = TileLayer::new(bbox, 10, &grid);
//!
//! for tile in layer.tiles().iter().map(|t| t.id).collect::<Vec<_>>() {
//!     let pixels = vec![0u8; 512 * 512 * 4];
//!     let source = TileSource::new(SourceData::Rgba8(pixels), (512, 512), Compression::Lzw);
//!     layer.set_source(tile, source)?;
//! }
//!
//! write_cog("output.tif", vec![layer], false)?;
//! # Ok(())
//! # }
//! ```

pub mod cog; // COG 组装、布局规划与写出
pub mod geotags; // GeoKey 目录与 EPSG 注册表
pub mod grid; // 瓦片网格
pub mod layer; // 瓦片图层
pub mod projection; // 坐标系与矩形转换
pub mod reader; // 分块 GeoTIFF 读取
pub mod source; // 瓦片像素源编码
pub mod tiff; // TIFF 结构解析与标签编码

// 重新导出常用类型
pub use cog::{
    write_cog, write_single_tile, CodecError, Cog, CogError, CogResult, Compression,
    GeoTransform, Ifd, Predictor, TileOffsets,
};
pub use grid::{GridOrigin, TileGrid, TileId};
pub use layer::{build_tile_layers, Tile, TileLayer};
pub use projection::{transform_rect, Crs, Rect};
pub use reader::{ImageData, Reader};
pub use source::{SourceData, TileSource};
pub use tiff::{Endian, TiffError};
