//! 瓦片图层模块
//!
//! 图层是覆盖一个矩形区域、处于同一分辨率层级的有序瓦片集合,
//! 外加一个存放已编码负载的溢出文件。瓦片按行主序排列:
//! x 次键升序, y 主键的方向取决于网格 Y 轴是否翻转
//! (图像坐标网格升序, 北朝上网格降序)。
//!
//! 编码完成后图层目录持有每个瓦片的字节数和溢出文件内偏移量,
//! 布局规划器在此基础上放置输出文件偏移量。

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};

use tracing::debug;

use crate::cog::error::CogError;
use crate::cog::ifd::Ifd;
use crate::grid::{TileGrid, TileId};
use crate::projection::{transform_rect, Crs, Rect};
use crate::source::TileSource;

/// 网格中的一个瓦片
#[derive(Debug)]
pub struct Tile {
    /// 网格坐标
    pub id: TileId,
    /// 图层内的块索引 (列, 行)
    block: (u32, u32),
    source: Option<TileSource>,
}

impl Tile {
    /// 图层内的块索引 (列, 行)
    pub fn block(&self) -> (u32, u32) {
        self.block
    }

    /// 挂接的像素源
    pub fn source(&self) -> Option<&TileSource> {
        self.source.as_ref()
    }
}

/// 一个分辨率层级的瓦片图层
#[derive(Debug)]
pub struct TileLayer {
    level: u8,
    cols: u64,
    rows: u64,
    bbox: Rect,
    grid: TileGrid,
    tiles: Vec<Tile>,
    index: HashMap<TileId, usize>,
    ifd: Option<Ifd>,
    spill: Option<File>,
    no_data: Option<String>,
}

impl TileLayer {
    /// 创建覆盖矩形区域的图层
    ///
    /// 区域会被网格对齐到瓦片边界, 覆盖范围内的每个瓦片占一个位置,
    /// 像素源通过 [`TileLayer::set_source`] 挂接。
    pub fn new(bbox: Rect, level: u8, grid: &TileGrid) -> TileLayer {
        let (covering, (cols, rows), iter) = grid.affected_level_tiles(bbox, level);

        let mut tiles: Vec<Tile> = iter
            .map(|id| Tile {
                id,
                block: (0, 0),
                source: None,
            })
            .collect();

        // 行主序: y 主键方向随网格翻转, x 次键升序
        if grid.flipped_y_axis() {
            tiles.sort_by(|a, b| a.id.y.cmp(&b.id.y).then(a.id.x.cmp(&b.id.x)));
        } else {
            tiles.sort_by(|a, b| b.id.y.cmp(&a.id.y).then(a.id.x.cmp(&b.id.x)));
        }
        for (i, tile) in tiles.iter_mut().enumerate() {
            tile.block = ((i as u64 % cols) as u32, (i as u64 / cols) as u32);
        }

        let index = tiles
            .iter()
            .enumerate()
            .map(|(i, tile)| (tile.id, i))
            .collect();

        TileLayer {
            level,
            cols,
            rows,
            bbox: covering,
            grid: grid.clone(),
            tiles,
            index,
            ifd: None,
            spill: None,
            no_data: None,
        }
    }

    /// 图层的分辨率层级
    pub fn level(&self) -> u8 {
        self.level
    }

    /// 对齐到瓦片边界后的覆盖范围 (网格坐标系)
    pub fn bounds(&self) -> Rect {
        self.bbox
    }

    /// 图层的瓦片列表, 行主序
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// 查询瓦片
    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.index.get(&id).map(|&i| &self.tiles[i])
    }

    /// 瓦片尺寸(像素)
    pub fn tile_size(&self) -> (u32, u32) {
        self.grid.tile_size()
    }

    /// 图层图像尺寸(像素): 整瓦片列数/行数乘以瓦片尺寸
    pub fn image_size(&self) -> (u64, u64) {
        let (tw, th) = self.grid.tile_size();
        (self.cols * tw as u64, self.rows * th as u64)
    }

    /// 设置无数据值, 写入主目录的 GDALNoData 标签
    pub fn set_no_data<S: Into<String>>(&mut self, value: S) {
        self.no_data = Some(value.into());
    }

    /// 挂接一个瓦片的像素源
    ///
    /// # 错误
    /// 坐标层级不符或不在覆盖范围内时返回 `TileNotFound`
    pub fn set_source(&mut self, id: TileId, source: TileSource) -> Result<(), CogError> {
        if id.z != self.level {
            return Err(CogError::TileNotFound(id));
        }
        match self.index.get(&id) {
            Some(&i) => {
                self.tiles[i].source = Some(source);
                Ok(())
            }
            None => Err(CogError::TileNotFound(id)),
        }
    }

    /// 编码所有瓦片到溢出文件并组装图层目录
    ///
    /// 瓦片按块顺序编码, 第一个有像素源的瓦片填充目录的色彩元数据;
    /// 没有像素源的瓦片字节数保持 0 (稀疏瓦片)。
    pub(crate) fn encode(&mut self) -> Result<(), CogError> {
        let mut spill = tempfile::tempfile()?;
        let count = self.tiles.len();

        let mut ifd = Ifd::new();
        ifd.original_tile_offsets = vec![0; count];
        ifd.tile_byte_counts = vec![0; count];

        let mut offset = 0u64;
        let mut first = true;
        {
            let mut sink = BufWriter::new(&mut spill);
            for (i, tile) in self.tiles.iter().enumerate() {
                let Some(source) = &tile.source else {
                    continue;
                };
                let slot = if first { Some(&mut ifd) } else { None };
                let payload_len = source.encode(&mut sink, slot)?;
                first = false;
                ifd.tile_byte_counts[i] = payload_len;
                // 负载起点在长度前缀之后
                ifd.original_tile_offsets[i] = offset + 4;
                offset += payload_len as u64 + 8;
            }
            sink.flush()?;
        }
        debug!(
            level = self.level,
            tiles = count,
            spill_bytes = offset,
            "layer tiles encoded"
        );

        self.setup_ifd(&mut ifd)?;
        self.ifd = Some(ifd);
        self.spill = Some(spill);
        Ok(())
    }

    /// 填充目录的几何与地理参考字段
    fn setup_ifd(&self, ifd: &mut Ifd) -> Result<(), CogError> {
        ifd.set_epsg(4326, true)?;

        let (tw, th) = self.grid.tile_size();
        let (width, height) = self.image_size();
        ifd.image_width = width;
        ifd.image_length = height;
        ifd.tile_width = tw as u16;
        ifd.tile_length = th as u16;

        // 参考点与像素比例按 EPSG:4326 下的覆盖范围计算
        let wgs84 = Crs::wgs84();
        let geo_box = transform_rect(self.grid.crs(), &wgs84, self.bbox)?;
        ifd.model_tiepoint = vec![0.0, 0.0, 0.0, geo_box.min.0, geo_box.max.1, 0.0];
        ifd.model_pixel_scale = vec![
            geo_box.width() / width as f64,
            geo_box.height() / height as f64,
            0.0,
        ];

        if let Some(no_data) = &self.no_data {
            ifd.no_data = no_data.clone();
        }
        Ok(())
    }

    /// 取出编码完成的目录, 溢出文件随之转移为瓦片负载来源
    ///
    /// 在 [`TileLayer::encode`] 之前调用属于编程错误。
    pub(crate) fn into_ifd(mut self) -> Ifd {
        let mut ifd = self.ifd.take().expect("layer has not been encoded");
        let spill = self.spill.take().expect("layer has no spill file");
        ifd.set_tile_data(spill);
        ifd
    }

    /// 关闭图层, 删除溢出文件
    pub fn close(self) {}
}

/// 为多个层级创建图层, 按层级从高 (高分辨率) 到低排序
pub fn build_tile_layers(bbox: Rect, levels: &[u8], grid: &TileGrid) -> Vec<TileLayer> {
    let mut layers: Vec<TileLayer> = levels
        .iter()
        .map(|&level| TileLayer::new(bbox, level, grid))
        .collect();
    layers.sort_by(|a, b| b.level.cmp(&a.level));
    layers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cog::compression::Compression;
    use crate::grid::GridOrigin;
    use crate::source::SourceData;

    fn gray_source(size: (u32, u32)) -> TileSource {
        let pixels = vec![7u8; (size.0 * size.1) as usize];
        TileSource::new(SourceData::Gray8(pixels), size, Compression::Uncompressed)
    }

    #[test]
    fn flipped_grid_sorts_y_ascending() {
        let grid = TileGrid::web_mercator((256, 256), GridOrigin::UpperLeft).unwrap();
        let r = 1000.0;
        let layer = TileLayer::new(Rect::new(-r, -r, r, r), 2, &grid);
        let ids: Vec<(u32, u32)> = layer.tiles().iter().map(|t| (t.id.x, t.id.y)).collect();
        assert_eq!(ids, vec![(1, 1), (2, 1), (1, 2), (2, 2)]);
        assert_eq!(layer.tiles()[0].block(), (0, 0));
        assert_eq!(layer.tiles()[1].block(), (1, 0));
        assert_eq!(layer.tiles()[2].block(), (0, 1));
    }

    #[test]
    fn north_up_grid_puts_largest_y_first() {
        let grid = TileGrid::global_geodetic((256, 256), GridOrigin::LowerLeft).unwrap();
        let layer = TileLayer::new(Rect::new(-10.0, -10.0, 10.0, 10.0), 3, &grid);
        // 北朝上网格的块 (0,0) 是 y 最大的瓦片
        let first = &layer.tiles()[0];
        assert_eq!(first.block(), (0, 0));
        let max_y = layer.tiles().iter().map(|t| t.id.y).max().unwrap();
        assert_eq!(first.id.y, max_y);
    }

    #[test]
    fn set_source_checks_level() {
        let grid = TileGrid::web_mercator((256, 256), GridOrigin::UpperLeft).unwrap();
        let mut layer = TileLayer::new(Rect::new(-1000.0, -1000.0, 1000.0, 1000.0), 2, &grid);
        let id = layer.tiles()[0].id;
        let err = layer
            .set_source(TileId::new(id.x, id.y, 3), gray_source((256, 256)))
            .unwrap_err();
        assert!(matches!(err, CogError::TileNotFound(_)));
        layer.set_source(id, gray_source((256, 256))).unwrap();
        assert!(layer.tile(id).unwrap().source().is_some());
    }

    #[test]
    fn encode_records_counts_and_offsets() {
        let grid = TileGrid::web_mercator((16, 16), GridOrigin::UpperLeft).unwrap();
        let mut layer = TileLayer::new(Rect::new(-1000.0, -1000.0, 1000.0, 1000.0), 2, &grid);
        let ids: Vec<TileId> = layer.tiles().iter().map(|t| t.id).collect();
        for id in &ids {
            layer.set_source(*id, gray_source((16, 16))).unwrap();
        }
        layer.encode().unwrap();
        let ifd = layer.ifd.as_ref().unwrap();
        assert_eq!(ifd.tile_byte_counts, vec![256; 4]);
        // 负载起点跳过 4 字节长度前缀, 相邻条目间隔 len + 8
        assert_eq!(ifd.original_tile_offsets, vec![4, 268, 532, 796]);
        assert_eq!(ifd.image_width, 32);
        assert_eq!(ifd.tile_width, 16);
        assert!(!ifd.geo_key_directory.is_empty());
        assert_eq!(ifd.model_tiepoint.len(), 6);
        // 北西角参考点
        assert!(ifd.model_tiepoint[4] > 0.0);
    }

    #[test]
    fn sparse_tiles_keep_zero_counts() {
        let grid = TileGrid::web_mercator((16, 16), GridOrigin::UpperLeft).unwrap();
        let mut layer = TileLayer::new(Rect::new(-1000.0, -1000.0, 1000.0, 1000.0), 2, &grid);
        let id = layer.tiles()[1].id;
        layer.set_source(id, gray_source((16, 16))).unwrap();
        layer.encode().unwrap();
        let ifd = layer.ifd.as_ref().unwrap();
        assert_eq!(ifd.tile_byte_counts[0], 0);
        assert_eq!(ifd.tile_byte_counts[1], 256);
        assert_eq!(ifd.original_tile_offsets[0], 0);
        assert_eq!(ifd.original_tile_offsets[1], 4);
    }

    #[test]
    fn layers_sorted_by_level_descending() {
        let grid = TileGrid::web_mercator((256, 256), GridOrigin::UpperLeft).unwrap();
        let layers = build_tile_layers(
            Rect::new(-1000.0, -1000.0, 1000.0, 1000.0),
            &[1, 3, 2],
            &grid,
        );
        let levels: Vec<u8> = layers.iter().map(|l| l.level()).collect();
        assert_eq!(levels, vec![3, 2, 1]);
    }
}
