use memmap2::Mmap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const F32_SIZE: usize = std::mem::size_of::<f32>();

/// Append-only file of little-endian `f32` vectors, one fixed-size record
/// per template. A vector's index is its record number.
#[derive(Debug)]
pub(crate) struct VectorFile {
    path: PathBuf,
    dimension: usize,
}

impl VectorFile {
    pub(crate) fn new(path: &Path, dimension: usize) -> Self {
        Self {
            path: path.to_path_buf(),
            dimension,
        }
    }

    pub(crate) fn record_size(&self) -> u64 {
        (self.dimension * F32_SIZE) as u64
    }

    fn byte_len(&self) -> io::Result<u64> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Number of complete records. Trailing bytes of an interrupted write
    /// are not counted.
    pub(crate) fn len(&self) -> io::Result<u64> {
        Ok(self.byte_len()? / self.record_size())
    }

    /// Whether the file ends in a partial record.
    pub(crate) fn has_partial_tail(&self) -> io::Result<bool> {
        Ok(self.byte_len()? % self.record_size() != 0)
    }

    /// Cuts the file down to `records` complete records.
    pub(crate) fn truncate(&self, records: u64) -> io::Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(records * self.record_size())?;
        file.sync_data()
    }

    /// Appends vectors and returns the index of the first one.
    pub(crate) fn append(&self, vectors: &[Vec<f32>]) -> io::Result<u64> {
        let first = self.len()?;
        if self.has_partial_tail()? {
            self.truncate(first)?;
        }
        if vectors.is_empty() {
            return Ok(first);
        }
        let mut bytes = Vec::with_capacity(vectors.len() * self.dimension * F32_SIZE);
        for vector in vectors {
            if vector.len() != self.dimension {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "vector has {} dimensions, expected {}",
                        vector.len(),
                        self.dimension
                    ),
                ));
            }
            for x in vector {
                bytes.extend_from_slice(&x.to_le_bytes());
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&bytes)?;
        file.sync_data()?;
        Ok(first)
    }

    /// Dot product of `query` with every complete record, in index order.
    pub(crate) fn scores(&self, query: &[f32]) -> io::Result<Vec<(u64, f32)>> {
        let records = self.len()?;
        if records == 0 {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path)?;
        // The file is only ever appended to or cut back to whole records,
        // and readers never look past the last complete one.
        let map = unsafe { Mmap::map(&file)? };
        let record_size = self.dimension * F32_SIZE;
        let scores = map
            .chunks_exact(record_size)
            .enumerate()
            .map(|(i, record)| {
                let score = record
                    .chunks_exact(F32_SIZE)
                    .zip(query)
                    .map(|(bytes, q)| decode(bytes) * q)
                    .sum();
                (i as u64, score)
            })
            .collect();
        Ok(scores)
    }

    #[cfg(test)]
    pub(crate) fn read(&self, index: u64) -> io::Result<Option<Vec<f32>>> {
        if index >= self.len()? {
            return Ok(None);
        }
        let file = File::open(&self.path)?;
        let map = unsafe { Mmap::map(&file)? };
        let start = (index * self.record_size()) as usize;
        let record = &map[start..start + self.dimension * F32_SIZE];
        Ok(Some(record.chunks_exact(F32_SIZE).map(decode).collect()))
    }
}

fn decode(bytes: &[u8]) -> f32 {
    let mut buf = [0_u8; F32_SIZE];
    buf.copy_from_slice(bytes);
    f32::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = VectorFile::new(&dir.path().join("error.bin"), 3);
        assert_eq!(file.len().unwrap(), 0);
        assert!(file.scores(&[1.0, 0.0, 0.0]).unwrap().is_empty());
        assert!(file.read(0).unwrap().is_none());
    }

    #[test]
    fn appends_are_indexed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let file = VectorFile::new(&dir.path().join("error.bin"), 3);
        let first = file
            .append(&[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]])
            .unwrap();
        assert_eq!(first, 0);
        let next = file.append(&[vec![0.0, 0.0, 1.0]]).unwrap();
        assert_eq!(next, 2);
        assert_eq!(file.len().unwrap(), 3);
        assert_eq!(file.read(1).unwrap().unwrap(), vec![0.0, 1.0, 0.0]);

        let scores = file.scores(&[0.0, 2.0, 0.5]).unwrap();
        assert_eq!(scores, vec![(0, 0.0), (1, 2.0), (2, 0.5)]);
    }

    #[test]
    fn partial_tail_is_ignored_then_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warning.bin");
        let file = VectorFile::new(&path, 2);
        file.append(&[vec![1.0, 0.0]]).unwrap();
        OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(&[0xff, 0xff, 0xff])
            .unwrap();
        assert_eq!(file.len().unwrap(), 1);
        assert!(file.has_partial_tail().unwrap());

        assert_eq!(file.append(&[vec![0.0, 1.0]]).unwrap(), 1);
        assert!(!file.has_partial_tail().unwrap());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 16);
        assert_eq!(file.read(1).unwrap().unwrap(), vec![0.0, 1.0]);
    }

    #[test]
    fn rejects_wrong_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let file = VectorFile::new(&dir.path().join("debug.bin"), 2);
        assert!(file.append(&[vec![1.0, 0.0, 0.0]]).is_err());
        assert_eq!(file.len().unwrap(), 0);
    }

    #[test]
    fn truncate_drops_trailing_records() {
        let dir = tempfile::tempdir().unwrap();
        let file = VectorFile::new(&dir.path().join("debug.bin"), 1);
        file.append(&[vec![1.0], vec![2.0], vec![3.0]]).unwrap();
        file.truncate(1).unwrap();
        assert_eq!(file.len().unwrap(), 1);
        assert_eq!(file.read(0).unwrap().unwrap(), vec![1.0]);
    }
}
