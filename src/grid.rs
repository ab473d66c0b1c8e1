//! 瓦片网格模块
//!
//! 网格把一个坐标系范围按四叉树切分成逐级减半分辨率的瓦片金字塔,
//! 并回答两个问题: 某一层级的分辨率是多少, 一个矩形在某一层级覆盖哪些瓦片。
//! Y 轴方向由网格原点决定: 左上原点的网格 Y 向下递增(图像坐标),
//! 左下原点的网格 Y 向上递增(北朝上世界坐标)。

use crate::projection::{Crs, ProjectionError, Rect};

/// Web Mercator 的半周长, 即全球范围的边界坐标
const WEB_MERCATOR_EXTENT: f64 = 20037508.342789244;

/// 浮点比较容差, 吸收矩形边界恰好落在瓦片边界上的误差
const EDGE_EPSILON: f64 = 1e-9;

/// 瓦片坐标: 列、行和层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileId {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileId {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }
}

/// 网格原点位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridOrigin {
    /// 左上角原点, Y 轴向下 (图像坐标习惯)
    UpperLeft,
    /// 左下角原点, Y 轴向上 (TMS 习惯)
    LowerLeft,
}

/// 四叉树瓦片网格
#[derive(Clone, Debug)]
pub struct TileGrid {
    crs: Crs,
    bbox: Rect,
    tile_size: (u32, u32),
    origin: GridOrigin,
    base_resolution: f64,
}

impl TileGrid {
    /// 创建自定义网格
    ///
    /// `base_resolution` 是层级 0 的分辨率(坐标系单位/像素),
    /// 每升一级分辨率减半。
    pub fn new(
        crs: Crs,
        bbox: Rect,
        tile_size: (u32, u32),
        origin: GridOrigin,
        base_resolution: f64,
    ) -> Self {
        Self {
            crs,
            bbox,
            tile_size,
            origin,
            base_resolution,
        }
    }

    /// 全球 Web Mercator 网格 (EPSG:3857, 层级 0 为一个瓦片)
    pub fn web_mercator(tile_size: (u32, u32), origin: GridOrigin) -> Result<Self, ProjectionError> {
        let bbox = Rect::new(
            -WEB_MERCATOR_EXTENT,
            -WEB_MERCATOR_EXTENT,
            WEB_MERCATOR_EXTENT,
            WEB_MERCATOR_EXTENT,
        );
        let base_resolution = bbox.width() / tile_size.0 as f64;
        Ok(Self::new(
            Crs::from_epsg(3857)?,
            bbox,
            tile_size,
            origin,
            base_resolution,
        ))
    }

    /// 全球经纬度网格 (EPSG:4326, 层级 0 为 2x1 个瓦片)
    pub fn global_geodetic(
        tile_size: (u32, u32),
        origin: GridOrigin,
    ) -> Result<Self, ProjectionError> {
        let bbox = Rect::new(-180.0, -90.0, 180.0, 90.0);
        let base_resolution = 180.0 / tile_size.0 as f64;
        Ok(Self::new(
            Crs::from_epsg(4326)?,
            bbox,
            tile_size,
            origin,
            base_resolution,
        ))
    }

    /// 网格坐标系
    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    /// 网格坐标系的 EPSG 代码
    pub fn epsg(&self) -> u16 {
        self.crs.epsg
    }

    /// 网格整体范围
    pub fn bbox(&self) -> Rect {
        self.bbox
    }

    /// 瓦片尺寸(像素)
    pub fn tile_size(&self) -> (u32, u32) {
        self.tile_size
    }

    /// Y 轴是否翻转 (左上原点的网格 Y 向下递增)
    pub fn flipped_y_axis(&self) -> bool {
        self.origin == GridOrigin::UpperLeft
    }

    /// 某一层级的分辨率(坐标系单位/像素)
    pub fn resolution(&self, level: u8) -> f64 {
        self.base_resolution / 2_f64.powi(level as i32)
    }

    /// 某一层级的网格尺寸(瓦片数)
    pub fn grid_size(&self, level: u8) -> (u64, u64) {
        let res = self.resolution(level);
        let tiles_x = (self.bbox.width() / (res * self.tile_size.0 as f64) - EDGE_EPSILON).ceil();
        let tiles_y = (self.bbox.height() / (res * self.tile_size.1 as f64) - EDGE_EPSILON).ceil();
        (tiles_x.max(1.0) as u64, tiles_y.max(1.0) as u64)
    }

    /// 某个瓦片的范围(坐标系单位)
    pub fn tile_bbox(&self, id: TileId) -> Rect {
        let res = self.resolution(id.z);
        let tw = res * self.tile_size.0 as f64;
        let th = res * self.tile_size.1 as f64;
        let x0 = self.bbox.min.0 + id.x as f64 * tw;
        match self.origin {
            GridOrigin::UpperLeft => {
                let y1 = self.bbox.max.1 - id.y as f64 * th;
                Rect::new(x0, y1 - th, x0 + tw, y1)
            }
            GridOrigin::LowerLeft => {
                let y0 = self.bbox.min.1 + id.y as f64 * th;
                Rect::new(x0, y0, x0 + tw, y0 + th)
            }
        }
    }

    /// 求矩形在某一层级覆盖的瓦片
    ///
    /// # 返回
    /// `(对齐到瓦片边界的覆盖矩形, (列数, 行数), 瓦片坐标迭代器)`
    pub fn affected_level_tiles(&self, rect: Rect, level: u8) -> (Rect, (u64, u64), TileIter) {
        let rect = rect.clamp(&self.bbox);
        let res = self.resolution(level);
        let tw = res * self.tile_size.0 as f64;
        let th = res * self.tile_size.1 as f64;
        let (grid_x, grid_y) = self.grid_size(level);

        let x0 = ((rect.min.0 - self.bbox.min.0) / tw + EDGE_EPSILON).floor().max(0.0) as u64;
        let x1 = ((((rect.max.0 - self.bbox.min.0) / tw - EDGE_EPSILON).ceil() as u64).max(x0 + 1)
            - 1)
        .min(grid_x - 1);

        // 翻转网格从上边计数, 否则从下边计数
        let (top, bottom) = match self.origin {
            GridOrigin::UpperLeft => (self.bbox.max.1 - rect.max.1, self.bbox.max.1 - rect.min.1),
            GridOrigin::LowerLeft => (rect.min.1 - self.bbox.min.1, rect.max.1 - self.bbox.min.1),
        };
        let y0 = (top / th + EDGE_EPSILON).floor().max(0.0) as u64;
        let y1 = (((bottom / th - EDGE_EPSILON).ceil() as u64).max(y0 + 1) - 1).min(grid_y - 1);

        let covering_x0 = self.bbox.min.0 + x0 as f64 * tw;
        let covering_x1 = self.bbox.min.0 + (x1 + 1) as f64 * tw;
        let covering = match self.origin {
            GridOrigin::UpperLeft => Rect::new(
                covering_x0,
                self.bbox.max.1 - (y1 + 1) as f64 * th,
                covering_x1,
                self.bbox.max.1 - y0 as f64 * th,
            ),
            GridOrigin::LowerLeft => Rect::new(
                covering_x0,
                self.bbox.min.1 + y0 as f64 * th,
                covering_x1,
                self.bbox.min.1 + (y1 + 1) as f64 * th,
            ),
        };

        let size = (x1 - x0 + 1, y1 - y0 + 1);
        let iter = TileIter {
            x0: x0 as u32,
            x1: x1 as u32,
            y1: y1 as u32,
            level,
            next_x: x0 as u32,
            next_y: y0 as u32,
            done: false,
        };
        (covering, size, iter)
    }
}

/// 瓦片坐标迭代器, 行优先 (y 外层, x 内层)
#[derive(Debug, Clone)]
pub struct TileIter {
    x0: u32,
    x1: u32,
    y1: u32,
    level: u8,
    next_x: u32,
    next_y: u32,
    done: bool,
}

impl Iterator for TileIter {
    type Item = TileId;

    fn next(&mut self) -> Option<TileId> {
        if self.done {
            return None;
        }
        let id = TileId::new(self.next_x, self.next_y, self.level);
        if self.next_x < self.x1 {
            self.next_x += 1;
        } else if self.next_y < self.y1 {
            self.next_x = self.x0;
            self.next_y += 1;
        } else {
            self.done = true;
        }
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn web_mercator_pyramid() {
        let grid = TileGrid::web_mercator((512, 512), GridOrigin::UpperLeft).unwrap();
        assert_eq!(grid.grid_size(0), (1, 1));
        assert_eq!(grid.grid_size(3), (8, 8));
        assert!(grid.flipped_y_axis());
        // 每升一级分辨率减半
        assert!((grid.resolution(1) * 2.0 - grid.resolution(0)).abs() < 1e-9);
    }

    #[test]
    fn geodetic_pyramid() {
        let grid = TileGrid::global_geodetic((512, 512), GridOrigin::LowerLeft).unwrap();
        assert_eq!(grid.grid_size(0), (2, 1));
        assert_eq!(grid.grid_size(2), (8, 4));
        assert!(!grid.flipped_y_axis());
    }

    #[test]
    fn affected_tiles_cover_rect() {
        let grid = TileGrid::web_mercator((512, 512), GridOrigin::UpperLeft).unwrap();
        // 第 2 层 4x4 瓦片, 取跨中心的小矩形, 应覆盖中间 2x2
        let r = 1000.0;
        let (covering, size, iter) =
            grid.affected_level_tiles(Rect::new(-r, -r, r, r), 2);
        assert_eq!(size, (2, 2));
        let ids: Vec<TileId> = iter.collect();
        assert_eq!(
            ids,
            vec![
                TileId::new(1, 1, 2),
                TileId::new(2, 1, 2),
                TileId::new(1, 2, 2),
                TileId::new(2, 2, 2),
            ]
        );
        // 覆盖矩形对齐瓦片边界且包含输入矩形
        assert!(covering.min.0 <= -r && covering.max.0 >= r);
        assert!((covering.min.0 - -WEB_MERCATOR_EXTENT / 2.0).abs() < 1e-6);
    }

    #[test]
    fn tile_bbox_matches_affected() {
        let grid = TileGrid::web_mercator((256, 256), GridOrigin::UpperLeft).unwrap();
        let id = TileId::new(1, 2, 2);
        let bbox = grid.tile_bbox(id);
        let (covering, size, mut iter) = grid.affected_level_tiles(bbox, 2);
        assert_eq!(size, (1, 1));
        assert_eq!(iter.next(), Some(id));
        assert!(iter.next().is_none());
        assert!((covering.min.0 - bbox.min.0).abs() < 1e-6);
        assert!((covering.max.1 - bbox.max.1).abs() < 1e-6);
    }

    #[test]
    fn lower_left_origin_counts_from_south() {
        let grid = TileGrid::global_geodetic((512, 512), GridOrigin::LowerLeft).unwrap();
        // 南极附近的矩形在 LL 原点网格中 y 应为 0
        let (_, _, mut iter) = grid.affected_level_tiles(Rect::new(-170.0, -89.0, -160.0, -80.0), 2);
        let id = iter.next().unwrap();
        assert_eq!(id.y, 0);
    }
}
