//! Adjacency file formats.
//!
//! ```text
//! {prefix}.degree    [u64 count][i32 degree; count]          (little-endian)
//! {prefix}.nbr_list  fixed payloads: entries back to back, each
//!                      [u32 neighbor][u32 timestamp][payload; WIDTH]
//!                    variable payloads: bincode Vec<Nbr<E>>
//! ```

use super::{EdgeData, Nbr};
use crate::arena::with_suffix;
use crate::error::{GraphError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub fn degree_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, "degree")
}

pub fn nbr_list_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, "nbr_list")
}

pub fn write_degree(path: &Path, degree: &[i32]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(&(degree.len() as u64).to_le_bytes())?;
    for d in degree {
        w.write_all(&d.to_le_bytes())?;
    }
    w.flush()?;
    Ok(())
}

pub fn read_degree(path: &Path) -> Result<Vec<i32>> {
    let mut bytes = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut bytes)?;
    if bytes.len() < 8 {
        return Err(GraphError::corrupt(path, "truncated degree header"));
    }
    let mut head = [0u8; 8];
    head.copy_from_slice(&bytes[..8]);
    let count = u64::from_le_bytes(head) as usize;
    let body = &bytes[8..];
    if count.checked_mul(4) != Some(body.len()) {
        return Err(GraphError::corrupt(path, format!("expected {} degrees, found {} bytes", count, body.len())));
    }
    let degree = body
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect::<Vec<_>>();
    if degree.iter().any(|&d| d < 0) {
        return Err(GraphError::corrupt(path, "negative degree"));
    }
    Ok(degree)
}

pub fn write_nbr_list<'a, E: EdgeData>(path: &Path, nbrs: impl Iterator<Item = &'a Nbr<E>>) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    match E::WIDTH {
        Some(width) => {
            let mut entry = Vec::with_capacity(8 + width);
            for nbr in nbrs {
                entry.clear();
                entry.extend_from_slice(&nbr.neighbor.to_le_bytes());
                entry.extend_from_slice(&nbr.timestamp.to_le_bytes());
                nbr.data.encode(&mut entry);
                w.write_all(&entry)?;
            }
        }
        None => {
            let all: Vec<&Nbr<E>> = nbrs.collect();
            bincode::serialize_into(&mut w, &all)?;
        }
    }
    w.flush()?;
    Ok(())
}

/// Read exactly `expected` entries.
pub fn read_nbr_list<E: EdgeData>(path: &Path, expected: usize) -> Result<Vec<Nbr<E>>> {
    let nbrs = match E::WIDTH {
        Some(width) => {
            let file = File::open(path)?;
            let len = file.metadata()?.len() as usize;
            let entry = 8 + width;
            if len != expected * entry {
                return Err(GraphError::corrupt(
                    path,
                    format!("expected {} entries of {} bytes, file has {} bytes", expected, entry, len),
                ));
            }
            if len == 0 {
                return Ok(Vec::new());
            }
            let map = unsafe { Mmap::map(&file)? };
            map.chunks_exact(entry)
                .map(|c| Nbr {
                    neighbor: u32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                    timestamp: u32::from_le_bytes([c[4], c[5], c[6], c[7]]),
                    data: E::decode(&c[8..]),
                })
                .collect()
        }
        None => {
            let nbrs: Vec<Nbr<E>> = bincode::deserialize_from(BufReader::new(File::open(path)?))?;
            if nbrs.len() != expected {
                return Err(GraphError::corrupt(
                    path,
                    format!("expected {} entries, archive has {}", expected, nbrs.len()),
                ));
            }
            nbrs
        }
    };
    Ok(nbrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Date;
    use tempfile::tempdir;

    #[test]
    fn test_degree_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("oe.degree");
        write_degree(&path, &[3, 0, 1]).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 8 + 12);
        assert_eq!(read_degree(&path).unwrap(), vec![3, 0, 1]);

        std::fs::write(&path, [1u8, 0, 0, 0, 0, 0, 0, 0, 5]).unwrap();
        assert!(read_degree(&path).is_err());

        let mut huge = u64::MAX.to_le_bytes().to_vec();
        huge.extend_from_slice(&[0, 0, 0, 0]);
        std::fs::write(&path, huge).unwrap();
        assert!(matches!(read_degree(&path), Err(GraphError::Corrupt { .. })));
    }

    #[test]
    fn test_fixed_width_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("oe.nbr_list");
        let nbrs = vec![
            Nbr { neighbor: 4, timestamp: 9, data: Date::from_millis(77) },
            Nbr { neighbor: 1, timestamp: 0, data: Date::from_millis(-5) },
        ];
        write_nbr_list(&path, nbrs.iter()).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 2 * 16);
        assert_eq!(read_nbr_list::<Date>(&path, 2).unwrap(), nbrs);
        assert!(read_nbr_list::<Date>(&path, 3).is_err());
    }

    #[test]
    fn test_string_archive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ie.nbr_list");
        let nbrs = vec![Nbr { neighbor: 2, timestamp: 1, data: "since 2010".to_string() }];
        write_nbr_list(&path, nbrs.iter()).unwrap();
        assert_eq!(read_nbr_list::<String>(&path, 1).unwrap(), nbrs);
    }

    #[test]
    fn test_empty_payload_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("e.nbr_list");
        let nbrs = vec![Nbr { neighbor: 1, timestamp: 3, data: () }; 3];
        write_nbr_list(&path, nbrs.iter()).unwrap();
        assert_eq!(read_nbr_list::<()>(&path, 3).unwrap().len(), 3);
    }
}
