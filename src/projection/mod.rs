//! 坐标参考系统与投影转换模块
//!
//! 本模块基于 proj4rs 提供两种操作:
//!
//! - 按 EPSG 代码构建坐标系句柄 ([`Crs`])
//! - 在两个坐标系之间转换矩形区域 ([`transform_rect`])
//!
//! proj4rs 对地理坐标系使用弧度, 本模块对外统一使用度,
//! 在转换前后按需进行度/弧度换算。

use proj4rs::errors::Error as Proj4Error;
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::geotags::epsg;

pub mod primatives;

pub use primatives::Rect;

/// 投影错误类型
#[derive(Debug)]
pub enum ProjectionError {
    /// proj4rs 无法识别或转换该坐标系
    Proj4Error(Proj4Error),
}

impl From<Proj4Error> for ProjectionError {
    fn from(e: Proj4Error) -> Self {
        ProjectionError::Proj4Error(e)
    }
}

impl std::fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectionError::Proj4Error(e) => write!(f, "proj4 错误: {}", e),
        }
    }
}

impl std::error::Error for ProjectionError {}

/// 坐标参考系统句柄
///
/// 包含 EPSG 代码和对应的 proj4rs 投影对象。
#[derive(Clone, Debug)]
pub struct Crs {
    /// EPSG 代码
    pub epsg: u16,
    proj: Proj,
}

impl Crs {
    /// 按 EPSG 代码创建坐标系
    ///
    /// 900913 作为 3857 的历史别名被接受。
    pub fn from_epsg(epsg: u16) -> Result<Self, ProjectionError> {
        let canonical = if epsg as u32 == epsg::WEB_MERCATOR_LEGACY {
            epsg::WEB_MERCATOR
        } else {
            epsg
        };
        let proj = Proj::from_epsg_code(canonical)?;
        Ok(Self { epsg, proj })
    }

    /// WGS 84 经纬度坐标系
    pub fn wgs84() -> Self {
        // EPSG:4326 是 proj4rs 内置定义, 构建不会失败
        Self::from_epsg(4326).expect("EPSG:4326 definition is built in")
    }

    /// 该坐标系是否为地理坐标系(经纬度, 单位为度)
    pub fn is_geographic(&self) -> bool {
        epsg::geographic_name(self.epsg).is_some()
    }
}

/// 将矩形从一个坐标系转换到另一个坐标系
///
/// 沿矩形边界采样 8 个点(四角和四边中点)逐点转换,
/// 取转换结果的包围盒。两个坐标系相同时原样返回。
pub fn transform_rect(src: &Crs, dst: &Crs, rect: Rect) -> Result<Rect, ProjectionError> {
    if src.epsg == dst.epsg {
        return Ok(rect);
    }

    let (x0, y0) = rect.min;
    let (x1, y1) = rect.max;
    let xm = (x0 + x1) / 2.0;
    let ym = (y0 + y1) / 2.0;

    let samples = [
        (x0, y0),
        (xm, y0),
        (x1, y0),
        (x1, ym),
        (x1, y1),
        (xm, y1),
        (x0, y1),
        (x0, ym),
    ];

    let mut out = Rect::empty();
    for (x, y) in samples {
        let mut point = if src.is_geographic() {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        transform(&src.proj, &dst.proj, &mut point)?;
        let (mut px, mut py) = (point.0, point.1);
        if dst.is_geographic() {
            px = px.to_degrees();
            py = py.to_degrees();
        }
        out = out.extend(px, py);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_transform() {
        let crs = Crs::wgs84();
        let rect = Rect::new(-10.0, -10.0, 10.0, 10.0);
        let out = transform_rect(&crs, &crs, rect).unwrap();
        assert_eq!(out, rect);
    }

    #[test]
    fn web_mercator_to_wgs84() {
        let merc = Crs::from_epsg(3857).unwrap();
        let wgs = Crs::wgs84();
        // 全球 web mercator 范围
        let m = 20037508.342789244;
        let out = transform_rect(&merc, &wgs, Rect::new(-m, -m, m, m)).unwrap();
        assert!((out.min.0 - -180.0).abs() < 1e-6);
        assert!((out.max.0 - 180.0).abs() < 1e-6);
        // 纬度被墨卡托截断在约 ±85.05 度
        assert!((out.max.1 - 85.051128).abs() < 1e-3);
    }

    #[test]
    fn legacy_web_mercator_alias() {
        let a = Crs::from_epsg(900913).unwrap();
        assert_eq!(a.epsg, 900913);
        assert!(!a.is_geographic());
    }
}
