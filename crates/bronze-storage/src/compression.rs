//! Gzip helpers shared by the storage backends.

use crate::traits::{StorageError, StorageResult};
use crate::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

/// Physical object name for a logical storage path.
pub fn physical_key(path: &str, compression: Compression) -> String {
    format!("{}{}", path.trim_end_matches('/'), compression.suffix())
}

pub fn encode(data: Vec<u8>, compression: Compression) -> StorageResult<Vec<u8>> {
    match compression {
        Compression::None => Ok(data),
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(&data)?;
            Ok(encoder.finish()?)
        }
    }
}

pub fn decode(data: Vec<u8>, compression: Compression) -> StorageResult<Vec<u8>> {
    match compression {
        Compression::None => Ok(data),
        Compression::Gzip => {
            let mut decoder = GzDecoder::new(data.as_slice());
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| StorageError::DownloadFailed(format!("Invalid gzip data: {}", e)))?;
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_key_suffix() {
        assert_eq!(physical_key("bronze/a/b.json", Compression::Gzip), "bronze/a/b.json.gz");
        assert_eq!(physical_key("bronze/a/b.json", Compression::None), "bronze/a/b.json");
    }

    #[test]
    fn test_gzip_is_reversible_and_framed() {
        let encoded = encode(b"payload".to_vec(), Compression::Gzip).unwrap();
        assert_eq!(&encoded[..2], &[0x1f, 0x8b]);
        assert_eq!(decode(encoded, Compression::Gzip).unwrap(), b"payload");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(b"not gzip".to_vec(), Compression::Gzip).is_err());
    }
}
