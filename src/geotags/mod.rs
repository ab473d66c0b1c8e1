//! GeoTIFF GeoKey 目录模块
//!
//! GeoKey 是 GeoTIFF 的二级元数据: 一组 `(key_id, location, count, value)`
//! 四元组平铺存放在 `GeoKeyDirectory` 标签里, 短整型值内联,
//! ASCII 和双精度值分别按偏移量存放在 `GeoAsciiParams` / `GeoDoubleParams` 标签中。
//!
//! 本模块负责目录的序列化和反向查询, 坐标系名称查找见 [`epsg`]。
//!
//! 参考标准:
//! - [GeoKeyDirectoryTag 规范](https://docs.ogc.org/is/19-008r4/19-008r4.html#_requirements_class_geokeydirectorytag)

pub mod epsg;

/// GeoKey 目录标签 ID
pub const GEO_KEY_DIRECTORY_TAG: u16 = 34735;
/// 双精度参数标签 ID
pub const GEO_DOUBLE_PARAMS_TAG: u16 = 34736;
/// ASCII 参数标签 ID
pub const GEO_ASCII_PARAMS_TAG: u16 = 34737;

/// 整体坐标系统类型 (1 = 投影, 2 = 地理)
pub const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
/// 栅格空间解释方式 (1 = PixelIsArea, 2 = PixelIsPoint)
pub const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
/// 坐标系统引用描述
pub const GT_CITATION_GEO_KEY: u16 = 1026;
/// 地理坐标系统代码
pub const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
/// 投影坐标系统代码
pub const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

/// GeoKey 值
///
/// 目录支持的三种值类型, 对应三种存放方式
#[derive(Clone, Debug, PartialEq)]
pub enum GeoKeyValue {
    /// 单个短整型, 内联在目录条目中
    Short(u16),
    /// ASCII 字符串, 按偏移量存放在 GeoAsciiParams 中
    Ascii(String),
    /// 双精度浮点数, 按偏移量存放在 GeoDoubleParams 中
    Double(f64),
}

/// 一个 GeoKey 键值对
#[derive(Clone, Debug)]
pub struct GeoKey {
    pub id: u16,
    pub value: GeoKeyValue,
}

/// 将一组 GeoKey 序列化为目录数组及其参数附件
///
/// 键按 id 升序排列, 目录以 `(1, 1, 0, n)` 头部开始。
/// ASCII 和双精度值的偏移量在追加之前取自附件的当前长度,
/// `ascii_base` / `double_base` 允许在已有附件内容之后继续追加。
///
/// # 返回
/// `(目录数组, 追加的双精度值, 追加的 ASCII 字节)`
pub fn unparse_keys(
    mut keys: Vec<GeoKey>,
    ascii_base: usize,
    double_base: usize,
) -> (Vec<u16>, Vec<f64>, String) {
    keys.sort_by_key(|key| key.id);

    let mut directory = Vec::with_capacity(4 + keys.len() * 4);
    directory.push(1); // 目录版本
    directory.push(1); // 修订主版本
    directory.push(0); // 修订次版本
    directory.push(keys.len() as u16);

    let mut doubles = Vec::new();
    let mut asciis = String::new();

    for key in &keys {
        directory.push(key.id);
        match &key.value {
            GeoKeyValue::Short(v) => {
                directory.push(0);
                directory.push(1);
                directory.push(*v);
            }
            GeoKeyValue::Double(v) => {
                directory.push(GEO_DOUBLE_PARAMS_TAG);
                directory.push(1);
                // 偏移量在追加之前取值
                directory.push((double_base + doubles.len()) as u16);
                doubles.push(*v);
            }
            GeoKeyValue::Ascii(s) => {
                directory.push(GEO_ASCII_PARAMS_TAG);
                directory.push(s.len() as u16);
                directory.push((ascii_base + asciis.len()) as u16);
                asciis.push_str(s);
            }
        }
    }

    (directory, doubles, asciis)
}

/// 从 GeoKey 目录数组中查询某个键的内联短整型值
pub fn short_value(directory: &[u16], key_id: u16) -> Option<u16> {
    if directory.len() < 4 {
        return None;
    }
    let count = directory[3] as usize;
    for i in 0..count {
        let entry = directory.get(4 + i * 4..8 + i * 4)?;
        if entry[0] == key_id && entry[1] == 0 {
            return Some(entry[3]);
        }
    }
    None
}

/// 从 GeoKey 目录数组中提取 EPSG 代码
///
/// 优先取投影坐标系代码, 其次取地理坐标系代码。
pub fn epsg_from_directory(directory: &[u16]) -> Option<u16> {
    short_value(directory, PROJECTED_CS_TYPE_GEO_KEY)
        .or_else(|| short_value(directory, GEOGRAPHIC_TYPE_GEO_KEY))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_layout() {
        let keys = vec![
            GeoKey {
                id: GEOGRAPHIC_TYPE_GEO_KEY,
                value: GeoKeyValue::Short(4326),
            },
            GeoKey {
                id: GT_MODEL_TYPE_GEO_KEY,
                value: GeoKeyValue::Short(2),
            },
            GeoKey {
                id: GT_CITATION_GEO_KEY,
                value: GeoKeyValue::Ascii("WGS 84|".to_string()),
            },
        ];
        let (dir, doubles, asciis) = unparse_keys(keys, 0, 0);

        assert_eq!(&dir[0..4], &[1, 1, 0, 3]);
        // 键按 id 升序
        assert_eq!(dir[4], GT_MODEL_TYPE_GEO_KEY);
        assert_eq!(dir[8], GT_CITATION_GEO_KEY);
        assert_eq!(dir[12], GEOGRAPHIC_TYPE_GEO_KEY);
        // ASCII 键记录位置标签、字节数和追加前的偏移量
        assert_eq!(&dir[8..12], &[GT_CITATION_GEO_KEY, GEO_ASCII_PARAMS_TAG, 7, 0]);
        assert_eq!(asciis, "WGS 84|");
        assert!(doubles.is_empty());
    }

    #[test]
    fn ascii_offsets_accumulate() {
        let keys = vec![
            GeoKey {
                id: GT_CITATION_GEO_KEY,
                value: GeoKeyValue::Ascii("abc|".to_string()),
            },
            GeoKey {
                id: 2049,
                value: GeoKeyValue::Ascii("de|".to_string()),
            },
        ];
        let (dir, _, asciis) = unparse_keys(keys, 10, 0);
        // 第一个字符串偏移量从 base 开始, 第二个接在其后
        assert_eq!(&dir[4..8], &[GT_CITATION_GEO_KEY, GEO_ASCII_PARAMS_TAG, 4, 10]);
        assert_eq!(&dir[8..12], &[2049, GEO_ASCII_PARAMS_TAG, 3, 14]);
        assert_eq!(asciis, "abc|de|");
    }

    #[test]
    fn epsg_lookup() {
        let keys = vec![
            GeoKey {
                id: GT_MODEL_TYPE_GEO_KEY,
                value: GeoKeyValue::Short(1),
            },
            GeoKey {
                id: PROJECTED_CS_TYPE_GEO_KEY,
                value: GeoKeyValue::Short(32609),
            },
        ];
        let (dir, _, _) = unparse_keys(keys, 0, 0);
        assert_eq!(epsg_from_directory(&dir), Some(32609));
        assert_eq!(short_value(&dir, GT_MODEL_TYPE_GEO_KEY), Some(1));
        assert_eq!(short_value(&dir, GEOGRAPHIC_TYPE_GEO_KEY), None);
    }
}
