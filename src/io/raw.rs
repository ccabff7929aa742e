//! Headerless little-endian `f32` arrays

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

const WIDTH: usize = std::mem::size_of::<f32>();

pub fn write(data: &[f32], path: &Path) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    for value in data {
        out.write_all(&value.to_le_bytes())?;
    }
    out.flush()
}

/// Fails with `InvalidData` if the file size is not a multiple of 4 bytes.
pub fn read(path: &Path) -> io::Result<Vec<f32>> {
    let mut bytes = vec![];
    BufReader::new(File::open(path)?).read_to_end(&mut bytes)?;
    if bytes.len() % WIDTH != 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, format!(
            "{}: {} bytes is not a whole number of f32s", path.display(), bytes.len()
        )));
    }
    Ok(bytes
       .chunks_exact(WIDTH)
       .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
       .collect())
}

#[cfg(test)]
mod test {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn values_survive_disk() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("test.raw");

        let original = vec![1.23, -4.56, 7.89e10, 0.0];
        write(&original, &path)?;
        assert_eq!(read(&path)?, original);
        // 4 bytes per value, no header
        assert_eq!(std::fs::metadata(&path)?.len(), 16);
        Ok(())
    }

    #[test]
    fn truncated_file_rejected() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("short.raw");
        std::fs::write(&path, [0_u8; 6])?;
        assert_eq!(read(&path).unwrap_err().kind(), io::ErrorKind::InvalidData);
        Ok(())
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(&dir.path().join("absent.raw")).is_err());
    }
}
