//! EPSG 代码注册表
//!
//! 本模块维护 GeoKey 引用名称所需的坐标系查找表: 地理坐标系与
//! 投影坐标系分开查询, 名称中的下划线在写入引用字符串时被替换为空格。
//! 不在表中的非零代码视为未知 EPSG。

/// Web Mercator 的规范 EPSG 代码
pub const WEB_MERCATOR: u16 = 3857;
/// Web Mercator 的历史别名 (Google Maps 时代)
///
/// 该值超出 `u16` 范围, 用 `u32` 表示, 仅通过显式转换与 `u16` 代码比较。
pub const WEB_MERCATOR_LEGACY: u32 = 900913;

/// 查询地理坐标系(经纬度)的引用名称
pub fn geographic_name(epsg: u16) -> Option<&'static str> {
    match epsg {
        4267 => Some("NAD27"),
        4269 => Some("NAD83"),
        4258 => Some("ETRS89"),
        4277 => Some("OSGB_1936"),
        4283 => Some("GDA94"),
        4326 => Some("WGS_84"),
        4490 => Some("China_Geodetic_Coordinate_System_2000"),
        4612 => Some("JGD2000"),
        4619 => Some("SWEREF99"),
        _ => None,
    }
}

/// 查询投影坐标系的引用名称
///
/// WGS 84 UTM 带按代码区间展开, 其余为固定表项。
pub fn projected_name(epsg: u16) -> Option<String> {
    match epsg {
        WEB_MERCATOR => Some("WGS_84_Pseudo-Mercator".to_string()),
        e if e as u32 == WEB_MERCATOR_LEGACY => Some("Google_Maps_Global_Mercator".to_string()),
        3395 => Some("WGS_84_World_Mercator".to_string()),
        2154 => Some("RGF93_Lambert-93".to_string()),
        27700 => Some("OSGB_1936_British_National_Grid".to_string()),
        32601..=32660 => Some(format!("WGS_84_UTM_zone_{}N", epsg - 32600)),
        32701..=32760 => Some(format!("WGS_84_UTM_zone_{}S", epsg - 32700)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes() {
        assert_eq!(geographic_name(4326), Some("WGS_84"));
        assert_eq!(projected_name(32609).as_deref(), Some("WGS_84_UTM_zone_9N"));
        assert_eq!(projected_name(32733).as_deref(), Some("WGS_84_UTM_zone_33S"));
        assert!(geographic_name(3857).is_none());
        assert!(projected_name(4326).is_none());
        assert!(projected_name(1).is_none());
    }
}
