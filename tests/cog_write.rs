//! COG 写出与回读的端到端场景测试

use std::fs;

use cogtile::cog::Cog;
use cogtile::tiff::{Tiff, TiffVariant};
use cogtile::{
    write_cog, write_single_tile, Compression, GridOrigin, Ifd, Reader, Rect, SourceData,
    TileGrid, TileLayer, TileSource,
};

const GHOST: &str = "GDAL_STRUCTURAL_METADATA_SIZE=000140 bytes\n\
LAYOUT=IFDS_BEFORE_DATA\n\
BLOCK_ORDER=ROW_MAJOR\n\
BLOCK_LEADER=SIZE_AS_UINT4\n\
BLOCK_TRAILER=LAST_4_BYTES_REPEATED\n\
KNOWN_INCOMPATIBLE_EDITION=NO\n  ";

fn rgba_pixels(size: u32, seed: u8) -> Vec<u8> {
    (0..size as usize * size as usize * 4)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

/// 场景 1: 单瓦片、无压缩 RGBA8 512x512, EPSG:4326
#[test]
fn single_tile_uncompressed_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("single.tif");

    let pixels = rgba_pixels(512, 3);
    let source = TileSource::new(
        SourceData::Rgba8(pixels.clone()),
        (512, 512),
        Compression::Uncompressed,
    );
    write_single_tile(
        &path,
        &source,
        Rect::new(-10.0, -10.0, 10.0, 10.0),
        4326,
        None,
    )
    .unwrap();

    let bytes = fs::read(&path).unwrap();

    // 头部与幽灵块 (P5)
    assert_eq!(&bytes[0..2], b"II");
    assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 42);
    assert_eq!(&bytes[8..8 + GHOST.len()], GHOST.as_bytes());

    let mut reader = Reader::open(&path).unwrap();
    assert_eq!(reader.ifds().len(), 1);
    let ifd = &reader.ifds()[0];
    assert_eq!(ifd.image_width, 512);
    assert_eq!(ifd.tile_width, 512);
    assert_eq!(ifd.compression, 1);
    assert_eq!(ifd.photometric_interpretation, 2);
    assert_eq!(ifd.bits_per_sample, vec![8, 8, 8, 8]);
    assert_eq!(ifd.samples_per_pixel, 4);

    // P2: 偏移量指向真实负载, 前导为小端长度, 尾部重复负载末 4 字节
    let offset = ifd.original_tile_offsets[0] as usize;
    let count = ifd.tile_byte_counts[0] as usize;
    assert_eq!(count, 512 * 512 * 4);
    assert_eq!(
        u32::from_le_bytes(bytes[offset - 4..offset].try_into().unwrap()),
        count as u32
    );
    assert_eq!(&bytes[offset..offset + count], &pixels[..]);
    assert_eq!(
        &bytes[offset + count..offset + count + 4],
        &pixels[pixels.len() - 4..]
    );
    // 负载区之后没有多余字节
    assert_eq!(bytes.len(), offset + count + 4);

    // 地理参考
    assert_eq!(reader.epsg(0), Some(4326));
    let scale = reader.pixel_scale(0).unwrap();
    assert!((scale[0] - 20.0 / 512.0).abs() < 1e-12);
    let gt = reader.geotransform(0).unwrap();
    assert_eq!(gt.origin(), (-10.0, 10.0));
    let bbox = reader.bbox(0).unwrap();
    assert!((bbox.min.0 + 10.0).abs() < 1e-9);
    assert!((bbox.min.1 + 10.0).abs() < 1e-9);
    assert!((bbox.max.0 - 10.0).abs() < 1e-9);
    assert!((bbox.max.1 - 10.0).abs() < 1e-9);

    // 像素回读
    let image = reader.data(0).unwrap();
    assert_eq!(image.data, SourceData::Rgba8(pixels));
}

/// 场景 2: 2x2 LZW RGB8 瓦片
#[test]
fn four_tiles_lzw_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quad.tif");

    let grid = TileGrid::web_mercator((512, 512), GridOrigin::UpperLeft).unwrap();
    // 第 2 层跨中心的矩形覆盖中间 2x2 瓦片
    let mut layer = TileLayer::new(Rect::new(-1000.0, -1000.0, 1000.0, 1000.0), 2, &grid);
    let ids: Vec<_> = layer.tiles().iter().map(|t| t.id).collect();
    assert_eq!(ids.len(), 4);

    let mut originals = Vec::new();
    for (i, id) in ids.iter().enumerate() {
        let pixels: Vec<u8> = (0..512 * 512 * 3)
            .map(|p| ((p / 3) as u8).wrapping_add(i as u8 * 40))
            .collect();
        originals.push(pixels.clone());
        layer
            .set_source(
                *id,
                TileSource::new(SourceData::Rgb8(pixels), (512, 512), Compression::Lzw),
            )
            .unwrap();
    }

    write_cog(&path, vec![layer], false).unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 42);

    let mut reader = Reader::open(&path).unwrap();
    let ifd = &reader.ifds()[0];
    assert_eq!(ifd.image_width, 1024);
    assert_eq!(ifd.original_tile_offsets.len(), 4);
    assert_eq!(u16::from(Compression::Lzw), ifd.compression);

    // P7: 偏移量沿 (y, x) 行主序严格递增
    let offsets = ifd.original_tile_offsets.clone();
    for pair in offsets.windows(2) {
        assert!(pair[1] > pair[0]);
    }

    // P2: 每个瓦片解压后还原原始像素
    for (i, original) in originals.iter().enumerate() {
        let offset = offsets[i] as usize;
        let count = ifd.tile_byte_counts[i] as usize;
        assert_eq!(
            u32::from_le_bytes(bytes[offset - 4..offset].try_into().unwrap()),
            count as u32
        );
        let unpacked = Compression::Lzw.decode(&bytes[offset..offset + count]).unwrap();
        assert_eq!(&unpacked, original);
    }

    // 整幅回读: 左上角像素来自块 (0,0) 的瓦片
    let image = reader.data(0).unwrap();
    let SourceData::Rgb8(assembled) = image.data else {
        panic!("expected rgb8 buffer");
    };
    assert_eq!(&assembled[0..3], &originals[0][0..3]);
    // 右下块起点
    let corner = (512 * 1024 + 512) * 3;
    assert_eq!(&assembled[corner..corner + 3], &originals[3][0..3]);
}

/// 场景 3: 主图 + 半分辨率概览
#[test]
fn overview_chain() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("overview.tif");

    let grid = TileGrid::web_mercator((256, 256), GridOrigin::UpperLeft).unwrap();
    let bbox = Rect::new(-1000.0, -1000.0, 1000.0, 1000.0);
    let mut layers = cogtile::build_tile_layers(bbox, &[2, 1], &grid);
    for layer in layers.iter_mut() {
        let ids: Vec<_> = layer.tiles().iter().map(|t| t.id).collect();
        for id in ids {
            let pixels = vec![(id.z * 50) as u8; 256 * 256];
            layer
                .set_source(
                    id,
                    TileSource::new(
                        SourceData::Gray8(pixels),
                        (256, 256),
                        Compression::Deflate,
                    ),
                )
                .unwrap();
        }
    }

    write_cog(&path, layers, false).unwrap();

    let reader = Reader::open(&path).unwrap();
    assert_eq!(reader.ifds().len(), 2);

    let primary = &reader.ifds()[0];
    let overview = &reader.ifds()[1];
    // 主目录携带地理参考, 概览不携带 (P1/链不变式)
    assert!(!primary.model_pixel_scale.is_empty());
    assert!(!primary.geo_key_directory.is_empty());
    assert_eq!(primary.subfile_type, 0);
    assert!(overview.model_pixel_scale.is_empty());
    assert!(overview.geo_key_directory.is_empty());
    assert_eq!(overview.subfile_type, 1);

    // 交错顺序: 概览瓦片先于主图瓦片落盘
    let first_primary = primary
        .original_tile_offsets
        .iter()
        .copied()
        .filter(|&o| o > 0)
        .min()
        .unwrap();
    let last_overview = overview
        .original_tile_offsets
        .iter()
        .copied()
        .max()
        .unwrap();
    assert!(last_overview < first_primary);
}

/// 场景 4: 主图 + 掩膜, 幽灵块切换为掩膜交错变体
#[test]
fn mask_interleaved_ghost() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("masked.tif");

    let primary = encoded_ifd(SourceData::Gray8(vec![128; 256 * 256]), 77);
    let mask = encoded_ifd(SourceData::Gray8(vec![255; 256 * 256]), 78);

    let mut cog = Cog::new(primary);
    cog.add_mask(mask);
    let mut out = Vec::new();
    cog.write(&mut out).unwrap();
    fs::write(&path, &out).unwrap();

    // 174 字节的掩膜幽灵块变体 (P5)
    let ghost = String::from_utf8_lossy(&out[8..8 + 43 + 174]).to_string();
    assert!(ghost.starts_with("GDAL_STRUCTURAL_METADATA_SIZE=000174 bytes\n"));
    assert!(ghost.ends_with("MASK_INTERLEAVED_WITH_IMAGERY=YES\n"));

    let reader = Reader::open(&path).unwrap();
    assert_eq!(reader.ifds().len(), 2);
    assert_eq!(reader.ifds()[0].subfile_type, 0);
    assert_eq!(reader.ifds()[1].subfile_type, 4);
}

/// BigTIFF 提示: 小数据也按 BigTIFF 封装写出
#[test]
fn bigtiff_hint_produces_magic_43() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.tif");

    let mut cog = Cog::new(encoded_ifd(SourceData::Gray8(vec![9; 256 * 256]), 5)).with_bigtiff(true);
    let mut out = Vec::new();
    cog.write(&mut out).unwrap();
    fs::write(&path, &out).unwrap();

    assert_eq!(u16::from_le_bytes([out[2], out[3]]), 43);
    assert_eq!(u16::from_le_bytes([out[4], out[5]]), 8);

    let reader = Reader::open(&path).unwrap();
    assert_eq!(reader.ifds()[0].image_width, 256);
    assert_eq!(reader.ifds()[0].tile_byte_counts.len(), 1);
}

/// 场景 6: 北朝上网格的参考点取覆盖范围的西北角
#[test]
fn north_up_tiepoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("northup.tif");

    let grid = TileGrid::global_geodetic((64, 64), GridOrigin::LowerLeft).unwrap();
    let bbox = Rect::new(-50.0, -40.0, 10.0, 30.0);
    let mut layer = TileLayer::new(bbox, 3, &grid);
    let covering = layer.bounds();
    let ids: Vec<_> = layer.tiles().iter().map(|t| t.id).collect();
    // 块 (0,0) 的瓦片 y 最大 (北端)
    let max_y = ids.iter().map(|id| id.y).max().unwrap();
    assert_eq!(layer.tiles()[0].id.y, max_y);
    assert_eq!(layer.tiles()[0].block(), (0, 0));

    for id in ids {
        layer
            .set_source(
                id,
                TileSource::new(
                    SourceData::Gray8(vec![1; 64 * 64]),
                    (64, 64),
                    Compression::Uncompressed,
                ),
            )
            .unwrap();
    }
    write_cog(&path, vec![layer], false).unwrap();

    let reader = Reader::open(&path).unwrap();
    let ifd = &reader.ifds()[0];
    // 参考点是西北角: (min_x, max_y)
    assert_eq!(&ifd.model_tiepoint[0..3], &[0.0, 0.0, 0.0]);
    assert!((ifd.model_tiepoint[3] - covering.min.0).abs() < 1e-9);
    assert!((ifd.model_tiepoint[4] - covering.max.1).abs() < 1e-9);
    assert_eq!(ifd.model_tiepoint[5], 0.0);
}

/// P3 / P4: next 指针链正确终止, 目录内标签严格升序
#[test]
fn canonical_tag_order_and_chain_termination() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("order.tif");

    let mut cog = Cog::new(encoded_ifd(SourceData::Gray8(vec![3; 256 * 256]), 1));
    cog.add_overview(encoded_ifd(SourceData::Gray8(vec![4; 256 * 256]), 2));
    let mut out = Vec::new();
    cog.write(&mut out).unwrap();
    fs::write(&path, &out).unwrap();

    let mut stream = std::io::Cursor::new(&out);
    let tiff = Tiff::open(&mut stream).unwrap();
    assert_eq!(tiff.variant, TiffVariant::Normal);
    // 解析在 next 指针为零处停止; 恰好两个目录说明链正确终止
    assert_eq!(tiff.ifds.len(), 2);
    for ifd in &tiff.ifds {
        let codes: Vec<u16> = ifd.0.iter().map(|tag| tag.code).collect();
        let mut sorted = codes.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(codes, sorted, "tags must be strictly ascending");
    }
}

/// 无数据值与文档名称穿透到输出
#[test]
fn no_data_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nodata.tif");

    let grid = TileGrid::web_mercator((64, 64), GridOrigin::UpperLeft).unwrap();
    let mut layer = TileLayer::new(Rect::new(-500.0, -500.0, 500.0, 500.0), 2, &grid);
    layer.set_no_data("-9999");
    let ids: Vec<_> = layer.tiles().iter().map(|t| t.id).collect();
    for id in ids {
        layer
            .set_source(
                id,
                TileSource::new(
                    SourceData::F32(vec![0.25; 64 * 64]),
                    (64, 64),
                    Compression::Deflate,
                ),
            )
            .unwrap();
    }
    write_cog(&path, vec![layer], false).unwrap();

    let mut reader = Reader::open(&path).unwrap();
    assert_eq!(reader.ifds()[0].no_data, "-9999");
    assert_eq!(reader.ifds()[0].sample_format, vec![3]);
    let image = reader.data(0).unwrap();
    let SourceData::F32(values) = image.data else {
        panic!("expected f32 raster");
    };
    assert!(values.iter().all(|&v| v == 0.25));
}

/// 构造一个带编码负载的单瓦片目录, 供 Cog 级别的测试使用
fn encoded_ifd(data: SourceData, seed: u8) -> Ifd {
    use std::io::{Seek, SeekFrom, Write};

    let source = TileSource::new(data, (256, 256), Compression::Deflate);
    let mut ifd = Ifd::new();
    ifd.original_tile_offsets = vec![0; 1];
    ifd.tile_byte_counts = vec![0; 1];
    let mut spill: Vec<u8> = Vec::new();
    let len = source.encode(&mut spill, Some(&mut ifd)).unwrap();
    ifd.tile_byte_counts[0] = len;
    ifd.original_tile_offsets[0] = 4;
    ifd.image_width = 256;
    ifd.image_length = 256;
    // seed 挤进文档名, 让每个目录内容有区分度
    ifd.document_name = format!("tile-{seed}");

    let mut file = tempfile::tempfile().unwrap();
    file.write_all(&spill).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    ifd.set_tile_data(file);
    ifd
}
