//! Chunk framing: byte shuffle, zlib, SHA-256.
//!
//! Encoding order is shuffle -> deflate -> checksum; decoding verifies the
//! checksum over the compressed bytes before inflating.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::io::{Read, Write};

/// zlib level used for every chunk.
const DEFLATE_LEVEL: u32 = 4;

pub type Checksum = [u8; 32];

/// Scalar element types a dataset can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dtype {
    U8,
    I64,
    F32,
    F64,
}

impl Dtype {
    pub fn size(self) -> usize {
        match self {
            Dtype::U8 => 1,
            Dtype::F32 => 4,
            Dtype::I64 | Dtype::F64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dtype::U8 => "u8",
            Dtype::I64 => "i64",
            Dtype::F32 => "f32",
            Dtype::F64 => "f64",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "u8" => Some(Dtype::U8),
            "i64" => Some(Dtype::I64),
            "f32" => Some(Dtype::F32),
            "f64" => Some(Dtype::F64),
            _ => None,
        }
    }
}

/// Element types with a fixed little-endian encoding.
pub trait Element: Copy + Default {
    const DTYPE: Dtype;
    fn put(self, out: &mut Vec<u8>);
    fn get(bytes: &[u8]) -> Self;
}

macro_rules! le_element {
    ($ty:ty, $dtype:expr) => {
        impl Element for $ty {
            const DTYPE: Dtype = $dtype;

            fn put(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn get(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(&bytes[..std::mem::size_of::<$ty>()]);
                <$ty>::from_le_bytes(buf)
            }
        }
    };
}

le_element!(u8, Dtype::U8);
le_element!(i64, Dtype::I64);
le_element!(f32, Dtype::F32);
le_element!(f64, Dtype::F64);

pub fn to_bytes<T: Element>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::DTYPE.size());
    for &v in values {
        v.put(&mut out);
    }
    out
}

pub fn from_bytes<T: Element>(bytes: &[u8]) -> Vec<T> {
    bytes.chunks_exact(T::DTYPE.size()).map(T::get).collect()
}

/// Group byte `k` of every element together.
fn shuffle(raw: &[u8], elem: usize) -> Vec<u8> {
    if elem <= 1 {
        return raw.to_vec();
    }
    let count = raw.len() / elem;
    let mut out = vec![0u8; raw.len()];
    for i in 0..count {
        for k in 0..elem {
            out[k * count + i] = raw[i * elem + k];
        }
    }
    out
}

fn unshuffle(shuffled: &[u8], elem: usize) -> Vec<u8> {
    if elem <= 1 {
        return shuffled.to_vec();
    }
    let count = shuffled.len() / elem;
    let mut out = vec![0u8; shuffled.len()];
    for i in 0..count {
        for k in 0..elem {
            out[i * elem + k] = shuffled[k * count + i];
        }
    }
    out
}

pub fn checksum(payload: &[u8]) -> Checksum {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hasher.finalize().into()
}

/// Encode one chunk; returns the stored payload and its checksum.
pub fn encode(raw: &[u8], dtype: Dtype) -> std::io::Result<(Vec<u8>, Checksum)> {
    let shuffled = shuffle(raw, dtype.size());
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(DEFLATE_LEVEL));
    encoder.write_all(&shuffled)?;
    let payload = encoder.finish()?;
    let sum = checksum(&payload);
    Ok((payload, sum))
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error(
        "checksum mismatch (stored {}, computed {})",
        hex::encode(expected),
        hex::encode(actual)
    )]
    Checksum { expected: Checksum, actual: Checksum },

    #[error("inflate failed: {0}")]
    Inflate(#[source] std::io::Error),
}

pub fn decode(payload: &[u8], stored: &[u8], dtype: Dtype) -> Result<Vec<u8>, DecodeError> {
    let actual = checksum(payload);
    if stored != actual.as_slice() {
        let mut expected = [0u8; 32];
        let n = stored.len().min(32);
        expected[..n].copy_from_slice(&stored[..n]);
        return Err(DecodeError::Checksum { expected, actual });
    }
    let mut shuffled = Vec::new();
    ZlibDecoder::new(payload)
        .read_to_end(&mut shuffled)
        .map_err(DecodeError::Inflate)?;
    Ok(unshuffle(&shuffled, dtype.size()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shuffle_groups_bytes_by_position() {
        let raw = [1u8, 2, 3, 4, 5, 6];
        assert_eq!(shuffle(&raw, 2), vec![1, 3, 5, 2, 4, 6]);
        assert_eq!(unshuffle(&shuffle(&raw, 2), 2), raw.to_vec());
        assert_eq!(shuffle(&raw, 1), raw.to_vec());
    }

    #[test]
    fn mostly_zero_frames_compress_well() {
        let mut raw = vec![0u8; 640 * 480];
        raw[1000..1100].fill(180);
        let (payload, _) = encode(&raw, Dtype::U8).unwrap();
        assert!(payload.len() < raw.len() / 50);
    }

    #[test]
    fn tampered_payload_fails_checksum() {
        let values = to_bytes(&[1.5f64, -2.0, f64::NAN]);
        let (mut payload, sum) = encode(&values, Dtype::F64).unwrap();
        let decoded = from_bytes::<f64>(&decode(&payload, &sum, Dtype::F64).unwrap());
        assert_eq!(&decoded[..2], &[1.5, -2.0]);
        assert!(decoded[2].is_nan());

        let last = payload.len() - 1;
        payload[last] ^= 0xff;
        let err = decode(&payload, &sum, Dtype::F64).unwrap_err();
        assert!(matches!(err, DecodeError::Checksum { .. }));
        assert!(err
            .to_string()
            .starts_with(&format!("checksum mismatch (stored {}", hex::encode(sum))));
    }

    #[test]
    fn garbage_with_matching_checksum_fails_inflate() {
        let payload = b"not zlib".to_vec();
        let err = decode(&payload, &checksum(&payload), Dtype::U8).unwrap_err();
        assert!(matches!(err, DecodeError::Inflate(_)));
        assert!(err.to_string().starts_with("inflate failed: "));
        assert!(std::error::Error::source(&err).is_some());
    }
}
