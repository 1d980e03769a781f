//! `.npy` persistence of [`FeatureTensor`]s.
//!
//! Files are NumPy format version 1.0, dtype `<f4`, C order, so they open
//! directly with `numpy.load` on the training side.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::FeatureTensor;

const MAGIC: &[u8; 6] = b"\x93NUMPY";

#[derive(Debug, Error)]
pub enum TensorCacheError {
    #[error("tensor cache I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid npy file {path}: {reason}")]
    Format { path: PathBuf, reason: String },
}

// ---------------------------------------------------------------------------
// Write
// ---------------------------------------------------------------------------

/// Write `tensor` to `path`, creating parent directories.
pub fn write_npy(path: &Path, tensor: &FeatureTensor) -> Result<(), TensorCacheError> {
    let io_err = |source| TensorCacheError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let [c, h, w] = tensor.shape();
    let mut header = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': ({c}, {h}, {w}), }}");
    // magic (6) + version (2) + length (2) + header + '\n' aligned to 64
    let unpadded = MAGIC.len() + 4 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');

    let header_len = u16::try_from(header.len()).map_err(|_| TensorCacheError::Format {
        path: path.to_path_buf(),
        reason: "header too long".into(),
    })?;

    let mut out = BufWriter::new(File::create(path).map_err(io_err)?);
    out.write_all(MAGIC).map_err(io_err)?;
    out.write_all(&[1, 0]).map_err(io_err)?;
    out.write_all(&header_len.to_le_bytes()).map_err(io_err)?;
    out.write_all(header.as_bytes()).map_err(io_err)?;
    for v in tensor.array().iter() {
        out.write_all(&v.to_le_bytes()).map_err(io_err)?;
    }
    out.flush().map_err(io_err)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Read
// ---------------------------------------------------------------------------

/// Read a 3-D `<f4` array written by [`write_npy`] (or NumPy).
pub fn read_npy(path: &Path) -> Result<FeatureTensor, TensorCacheError> {
    let io_err = |source| TensorCacheError::Io {
        path: path.to_path_buf(),
        source,
    };
    let format_err = |reason: String| TensorCacheError::Format {
        path: path.to_path_buf(),
        reason,
    };

    let mut reader = BufReader::new(File::open(path).map_err(io_err)?);

    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic).map_err(io_err)?;
    if &magic != MAGIC {
        return Err(format_err("bad magic".into()));
    }

    let mut version = [0u8; 2];
    reader.read_exact(&mut version).map_err(io_err)?;
    let header_len = match version[0] {
        1 => {
            let mut len = [0u8; 2];
            reader.read_exact(&mut len).map_err(io_err)?;
            u16::from_le_bytes(len) as usize
        }
        2 | 3 => {
            let mut len = [0u8; 4];
            reader.read_exact(&mut len).map_err(io_err)?;
            u32::from_le_bytes(len) as usize
        }
        other => return Err(format_err(format!("unsupported version {other}"))),
    };

    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header).map_err(io_err)?;
    let header = String::from_utf8_lossy(&header);

    let descr = header_value(&header, "descr").ok_or_else(|| format_err("no descr".into()))?;
    if !descr.contains("<f4") {
        return Err(format_err(format!("expected <f4, got {descr}")));
    }
    if header_value(&header, "fortran_order").is_some_and(|v| v.starts_with("True")) {
        return Err(format_err("fortran order not supported".into()));
    }
    let shape = parse_shape(&header).ok_or_else(|| format_err("bad shape".into()))?;
    let shape: [usize; 3] = shape
        .try_into()
        .map_err(|s: Vec<usize>| format_err(format!("expected 3 dimensions, got {}", s.len())))?;

    let count: usize = shape.iter().product();
    let mut bytes = vec![0u8; count * 4];
    reader.read_exact(&mut bytes).map_err(io_err)?;
    let data: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    FeatureTensor::from_shape_vec(shape, data).map_err(|e| format_err(e.to_string()))
}

/// Text following `'key':` in the header dict.
fn header_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let start = header
        .find(&format!("'{key}'"))
        .or_else(|| header.find(&format!("\"{key}\"")))?;
    let rest = &header[start + key.len() + 2..];
    let colon = rest.find(':')?;
    Some(rest[colon + 1..].trim_start())
}

fn parse_shape(header: &str) -> Option<Vec<usize>> {
    let value = header_value(header, "shape")?;
    let open = value.find('(')?;
    let close = value.find(')')?;
    value[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().ok())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> FeatureTensor {
        FeatureTensor::from_shape_vec([3, 2, 4], (0..24).map(|i| i as f32 * 0.5 - 3.0).collect())
            .unwrap()
    }

    #[test]
    fn write_then_read_is_exact() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("base").join("clip.npy");
        let tensor = sample();

        write_npy(&path, &tensor).expect("write");
        assert_eq!(read_npy(&path).expect("read"), tensor);
    }

    #[test]
    fn header_is_64_byte_aligned() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("clip.npy");
        write_npy(&path, &sample()).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..6], MAGIC);
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);
        assert_eq!(bytes[10 + header_len - 1], b'\n');
        assert_eq!(bytes.len(), 10 + header_len + 24 * 4);
    }

    #[test]
    fn parses_numpy_style_headers() {
        let header = "{'descr': '<f4', 'fortran_order': False, 'shape': (3, 128, 313), }";
        assert_eq!(parse_shape(header), Some(vec![3, 128, 313]));
        assert_eq!(parse_shape("{'shape': (7,), }"), Some(vec![7]));
        assert!(header_value(header, "descr").unwrap().starts_with("'<f4'"));
    }

    #[test]
    fn rejects_non_npy_and_wrong_rank() {
        let dir = tempdir().expect("temp dir");
        let junk = dir.path().join("junk.npy");
        std::fs::write(&junk, b"not numpy at all").unwrap();
        assert!(matches!(read_npy(&junk), Err(TensorCacheError::Format { .. })));

        let flat = dir.path().join("flat.npy");
        let mut bytes = MAGIC.to_vec();
        let mut header = "{'descr': '<f4', 'fortran_order': False, 'shape': (2,), }".to_string();
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        std::fs::write(&flat, bytes).unwrap();
        assert!(matches!(read_npy(&flat), Err(TensorCacheError::Format { .. })));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempdir().expect("temp dir");
        assert!(matches!(
            read_npy(&dir.path().join("absent.npy")),
            Err(TensorCacheError::Io { .. })
        ));
    }
}
