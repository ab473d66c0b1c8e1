//! 瓦片压缩编解码模块
//!
//! 写入侧支持无压缩、LZW (MSB 优先, 8 位初始码宽, TIFF 6.0 §13) 和
//! Deflate (zlib 封装); 读取侧额外接受 PackBits 和旧式 Deflate。
//! CCITT G3/G4 作为压缩代码被识别, 其解码器属于外部协作方,
//! 在本 crate 中报告为不支持。
//!
//! 参考:
//! - [TIFF 压缩标签取值](https://en.wikipedia.org/wiki/TIFF#TIFF_Compression_Tag)

use flate2;
use num_enum::{FromPrimitive, IntoPrimitive};
use salzweg::decoder::{DecodingError, TiffStyleDecoder};
use salzweg::encoder::{EncodingError, TiffStyleEncoder};
use std::io::{self, Read, Write};

use crate::tiff::Endian;

/// 压缩编解码错误
#[derive(Debug)]
pub enum CodecError {
    /// LZW 解码错误
    LzwDecodeError(DecodingError),
    /// LZW 编码错误
    LzwEncodeError(EncodingError),
    /// 本 crate 不支持的压缩方式
    CompressionNotSupported(Compression),
    /// 不支持的预测器
    PredictorNotSupported(Predictor),
    /// IO 操作错误
    IoError(io::Error),
}

impl From<io::Error> for CodecError {
    fn from(e: io::Error) -> Self {
        CodecError::IoError(e)
    }
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::LzwDecodeError(e) => write!(f, "LZW 解码错误: {:?}", e),
            CodecError::LzwEncodeError(e) => write!(f, "LZW 编码错误: {:?}", e),
            CodecError::CompressionNotSupported(c) => write!(f, "不支持的压缩方式: {:?}", c),
            CodecError::PredictorNotSupported(p) => write!(f, "不支持的预测器: {:?}", p),
            CodecError::IoError(e) => write!(f, "IO 错误: {}", e),
        }
    }
}

impl std::error::Error for CodecError {}

/// TIFF 压缩方式
///
/// 覆盖 COG 写入需要的三种方式和读取侧接受的历史代码。
#[derive(Debug, PartialEq, Eq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum Compression {
    /// 无压缩
    Uncompressed = 1,
    /// CCITT 1D 压缩
    Ccitt1D = 2,
    /// CCITT Group 3 传真压缩
    CcittG3 = 3,
    /// CCITT Group 4 传真压缩
    CcittG4 = 4,
    /// LZW 压缩
    Lzw = 5,
    /// Deflate (zlib) 压缩
    Deflate = 8,
    /// PackBits 游程压缩
    PackBits = 32773,
    /// 旧式 Deflate 代码, 语义同 Deflate
    DeflateOld = 32946,

    /// 未知压缩方式
    #[num_enum(default)]
    Unknown = 0x0000,
}

impl Compression {
    /// 压缩数据 (写入路径)
    ///
    /// # 错误
    /// 仅 `Uncompressed` / `Lzw` / `Deflate` 可用于写入,
    /// 其余返回 `CompressionNotSupported`。
    pub fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Uncompressed => Ok(bytes.to_vec()),
            Self::Lzw => {
                TiffStyleEncoder::encode_to_vec(bytes).map_err(CodecError::LzwEncodeError)
            }
            Self::Deflate => {
                let mut encoder =
                    flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(bytes)?;
                Ok(encoder.finish()?)
            }
            other => Err(CodecError::CompressionNotSupported(*other)),
        }
    }

    /// 解压数据 (读取路径)
    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Uncompressed => Ok(bytes.to_vec()),
            Self::Lzw => {
                TiffStyleDecoder::decode_to_vec(bytes).map_err(CodecError::LzwDecodeError)
            }
            Self::Deflate | Self::DeflateOld => {
                let mut buf = vec![];
                flate2::read::ZlibDecoder::new(bytes).read_to_end(&mut buf)?;
                Ok(buf)
            }
            Self::PackBits => unpack_bits(bytes),
            other => Err(CodecError::CompressionNotSupported(*other)),
        }
    }
}

/// TIFF 预测器类型
#[derive(Debug, PartialEq, Eq, Clone, Copy, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum Predictor {
    /// 不使用预测器
    No = 1,
    /// 水平差分预测
    Horizontal = 2,
    /// 浮点预测
    FloatingPoint = 3,

    /// 未知预测器
    #[num_enum(default)]
    Unknown = 0x0000,
}

impl Predictor {
    /// 撤销预测器变换 (解压之后调用)
    ///
    /// 水平预测支持 8 位和 16 位样本; 浮点预测不支持。
    ///
    /// # 参数
    /// * `buffer` - 解压后的块数据, 仍处于文件字节序
    /// * `width` - 块宽度(像素)
    /// * `bit_depth` - 每个样本的位数
    /// * `samples_per_pixel` - 每个像素的样本数
    /// * `endian` - 文件字节序, 16 位差分在该字节序下累加
    pub fn undo(
        &self,
        buffer: &mut [u8],
        width: usize,
        bit_depth: usize,
        samples_per_pixel: usize,
        endian: Endian,
    ) -> Result<(), CodecError> {
        match self {
            Self::No => {}
            Self::Horizontal if bit_depth == 8 => {
                let row_bytes = width * samples_per_pixel;
                for row in buffer.chunks_mut(row_bytes) {
                    for i in samples_per_pixel..row.len() {
                        row[i] = row[i].wrapping_add(row[i - samples_per_pixel]);
                    }
                }
            }
            Self::Horizontal if bit_depth == 16 => {
                let row_bytes = width * samples_per_pixel * 2;
                let stride = samples_per_pixel * 2;
                let pair = |hi_lo: [u8; 2]| match endian {
                    Endian::Little => u16::from_le_bytes(hi_lo),
                    Endian::Big => u16::from_be_bytes(hi_lo),
                };
                for row in buffer.chunks_mut(row_bytes) {
                    for i in (stride..row.len()).step_by(2) {
                        let prev = pair([row[i - stride], row[i - stride + 1]]);
                        let cur = pair([row[i], row[i + 1]]);
                        let sum = endian.encode(cur.wrapping_add(prev));
                        row[i] = sum[0];
                        row[i + 1] = sum[1];
                    }
                }
            }
            other => return Err(CodecError::PredictorNotSupported(*other)),
        }
        Ok(())
    }
}

/// 解码 PackBits 游程压缩数据
pub(crate) fn unpack_bits(src: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut dst = Vec::with_capacity(src.len() * 2);
    let mut pos = 0;
    while pos < src.len() {
        let code = src[pos] as i8;
        pos += 1;
        match code {
            0..=127 => {
                // 字面量段: code + 1 个字节
                let n = code as usize + 1;
                let Some(chunk) = src.get(pos..pos + n) else {
                    return Err(CodecError::IoError(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "packbits literal run truncated",
                    )));
                };
                dst.extend_from_slice(chunk);
                pos += n;
            }
            -128 => {
                // No-op
            }
            _ => {
                // 重复段: 下一个字节重复 1 - code 次
                let Some(&b) = src.get(pos) else {
                    return Err(CodecError::IoError(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "packbits repeat run truncated",
                    )));
                };
                pos += 1;
                dst.extend(std::iter::repeat(b).take(1 - code as isize as usize));
            }
        }
    }
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lzw_roundtrip() {
        let data: Vec<u8> = (0..4096).map(|i| (i % 7) as u8).collect();
        let packed = Compression::Lzw.encode(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(Compression::Lzw.decode(&packed).unwrap(), data);
    }

    #[test]
    fn deflate_roundtrip() {
        let data: Vec<u8> = (0..4096).map(|i| (i % 11) as u8).collect();
        let packed = Compression::Deflate.encode(&data).unwrap();
        assert_eq!(Compression::Deflate.decode(&packed).unwrap(), data);
        // 旧式代码解同一种数据流
        assert_eq!(Compression::DeflateOld.decode(&packed).unwrap(), data);
    }

    #[test]
    fn packbits_decode() {
        // Apple PackBits 参考样例
        let packed: Vec<u8> = vec![
            0xFE, 0xAA, 0x02, 0x80, 0x00, 0x2A, 0xFD, 0xAA, 0x03, 0x80, 0x00, 0x2A, 0x22, 0xF7,
            0xAA,
        ];
        let expected: Vec<u8> = vec![
            0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0xAA, 0xAA, 0xAA, 0xAA, 0x80, 0x00, 0x2A, 0x22,
            0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA, 0xAA,
        ];
        assert_eq!(Compression::PackBits.decode(&packed).unwrap(), expected);
    }

    #[test]
    fn ccitt_reports_unsupported() {
        assert!(matches!(
            Compression::CcittG4.decode(&[0, 1]),
            Err(CodecError::CompressionNotSupported(Compression::CcittG4))
        ));
    }

    #[test]
    fn horizontal_predictor_undo() {
        // 两行, 每行 4 像素, 1 样本 8 位: 存储的是差分
        let mut buf = vec![10, 1, 1, 1, 20, 2, 2, 2];
        Predictor::Horizontal
            .undo(&mut buf, 4, 8, 1, Endian::Little)
            .unwrap();
        assert_eq!(buf, vec![10, 11, 12, 13, 20, 22, 24, 26]);
    }

    #[test]
    fn floating_predictor_unsupported() {
        let mut buf = vec![0u8; 8];
        assert!(Predictor::FloatingPoint
            .undo(&mut buf, 2, 32, 1, Endian::Little)
            .is_err());
    }
}
