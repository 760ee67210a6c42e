//! Sketch corpus loading
//!
//! Parses bvecs sketch streams into a contiguous row-major buffer via a
//! read-only mmap. Every symbol is masked to the configured alphabet width on
//! ingest, so downstream code never sees out-of-alphabet values.

use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::Path;

use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::types::{Config, MAX_DIM};

/// An owned, masked sketch corpus: `len` rows of `dim` symbols each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SketchSet {
    data: Vec<u8>,
    dim: usize,
}

impl SketchSet {
    /// Load a bvecs stream: per record a 4-byte little-endian `dim` followed
    /// by `dim` symbol bytes. Records wider than `conf.dim` are truncated to
    /// the first `conf.dim` symbols; narrower records are an error.
    pub fn load_bvecs<P: AsRef<Path>>(path: P, conf: &Config) -> Result<Self> {
        conf.validate()?;
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file)? };
        Self::parse_bvecs(&mmap, conf)
    }

    /// Parse an in-memory bvecs byte stream.
    pub fn parse_bvecs(bytes: &[u8], conf: &Config) -> Result<Self> {
        let mask = conf.mask();
        let mut data = Vec::new();
        let mut off = 0usize;

        while off < bytes.len() {
            if off + 4 > bytes.len() {
                return Err(bad_record("truncated record header"));
            }
            let rec_dim =
                u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
                    as usize;
            off += 4;

            if rec_dim < conf.dim {
                return Err(bad_record(&format!(
                    "record dim {rec_dim} is smaller than configured dim {}",
                    conf.dim
                )));
            }
            if rec_dim > MAX_DIM {
                return Err(bad_record(&format!(
                    "record dim {rec_dim} exceeds the limit of {MAX_DIM}"
                )));
            }
            if off + rec_dim > bytes.len() {
                return Err(bad_record("truncated record payload"));
            }

            data.extend(bytes[off..off + conf.dim].iter().map(|&c| c & mask));
            off += rec_dim;
        }

        Ok(Self {
            data,
            dim: conf.dim,
        })
    }

    /// Build a corpus from in-memory rows, masking each symbol.
    pub fn from_rows<R: AsRef<[u8]>>(rows: &[R], conf: &Config) -> Result<Self> {
        conf.validate()?;
        let mask = conf.mask();
        let mut data = Vec::with_capacity(rows.len() * conf.dim);
        for row in rows {
            let row = row.as_ref();
            if row.len() < conf.dim {
                return Err(Error::Config(format!(
                    "row has {} symbols, configured dim is {}",
                    row.len(),
                    conf.dim
                )));
            }
            data.extend(row[..conf.dim].iter().map(|&c| c & mask));
        }
        Ok(Self {
            data,
            dim: conf.dim,
        })
    }

    /// Number of sketches.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Row `i` as a symbol slice.
    #[inline]
    pub fn row(&self, i: usize) -> &[u8] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    /// Full-width view over all rows.
    #[inline]
    pub fn view(&self) -> SketchView<'_> {
        SketchView {
            data: &self.data,
            stride: self.dim,
            offset: 0,
            dim: self.dim,
        }
    }

    /// Iterate `(id, row)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u8])> {
        (0..self.len()).map(move |i| (i as u32, self.row(i)))
    }
}

/// A borrowed column window over a sketch corpus.
///
/// `row(i)` yields symbols `[offset, offset + dim)` of the i-th underlying
/// row; the multi-block builder uses shifted windows of one parent set.
#[derive(Debug, Clone, Copy)]
pub struct SketchView<'a> {
    data: &'a [u8],
    stride: usize,
    offset: usize,
    dim: usize,
}

impl<'a> SketchView<'a> {
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() / self.stride
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn row(&self, i: usize) -> &'a [u8] {
        let beg = i * self.stride + self.offset;
        &self.data[beg..beg + self.dim]
    }

    /// Narrow the view to `dim` columns starting at `col_beg`.
    pub fn columns(&self, col_beg: usize, dim: usize) -> SketchView<'a> {
        debug_assert!(col_beg + dim <= self.dim);
        SketchView {
            data: self.data,
            stride: self.stride,
            offset: self.offset + col_beg,
            dim,
        }
    }
}

/// Convert whitespace-separated ASCII integer lines to a bvecs stream.
///
/// Each input line becomes one record whose `dim` is the number of integers
/// on the line. Values must be in `[0, 256)`.
pub fn convert_ascii<R: BufRead, W: Write>(reader: R, mut writer: W) -> Result<u64> {
    let mut records = 0u64;
    for line in reader.lines() {
        let line = line?;
        let mut symbols = Vec::new();
        for token in line.split_whitespace() {
            let value: u32 = token
                .parse()
                .map_err(|_| Error::Parse(format!("not an integer: {token:?}")))?;
            if value >= 256 {
                return Err(Error::Parse(format!("symbol {value} out of range [0, 256)")));
            }
            symbols.push(value as u8);
        }
        if symbols.is_empty() {
            continue;
        }
        writer.write_all(&(symbols.len() as u32).to_le_bytes())?;
        writer.write_all(&symbols)?;
        records += 1;
    }
    Ok(records)
}

fn bad_record(msg: &str) -> Error {
    Error::Io(io::Error::new(io::ErrorKind::InvalidData, msg.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bvecs_bytes(rows: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        for row in rows {
            out.extend((row.len() as u32).to_le_bytes());
            out.extend(*row);
        }
        out
    }

    #[test]
    fn test_load_and_mask() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("base.bvecs");
        let bytes = bvecs_bytes(&[&[0, 1, 2, 3], &[4, 5, 6, 7]]);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(&bytes)
            .unwrap();

        let conf = Config::new(4, 2).unwrap();
        let set = SketchSet::load_bvecs(&path, &conf).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.row(0), &[0, 1, 2, 3]);
        // 4..=7 fold into the 2-bit alphabet.
        assert_eq!(set.row(1), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_wider_records_truncate() {
        let bytes = bvecs_bytes(&[&[1, 2, 3, 0, 0, 0], &[3, 2, 1, 0, 9, 9]]);
        let conf = Config::new(4, 2).unwrap();
        let set = SketchSet::parse_bvecs(&bytes, &conf).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.row(0), &[1, 2, 3, 0]);
        assert_eq!(set.row(1), &[3, 2, 1, 0]);
    }

    #[test]
    fn test_narrow_record_rejected() {
        let bytes = bvecs_bytes(&[&[1, 2]]);
        let conf = Config::new(4, 2).unwrap();
        assert!(matches!(
            SketchSet::parse_bvecs(&bytes, &conf),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let mut bytes = bvecs_bytes(&[&[1, 2, 3, 0]]);
        bytes.truncate(bytes.len() - 1);
        let conf = Config::new(4, 2).unwrap();
        assert!(SketchSet::parse_bvecs(&bytes, &conf).is_err());
    }

    #[test]
    fn test_column_view() {
        let conf = Config::new(6, 3).unwrap();
        let set = SketchSet::from_rows(&[[0u8, 1, 2, 3, 4, 5], [5, 4, 3, 2, 1, 0]], &conf).unwrap();
        let view = set.view().columns(2, 3);
        assert_eq!(view.dim(), 3);
        assert_eq!(view.row(0), &[2, 3, 4]);
        assert_eq!(view.row(1), &[3, 2, 1]);
    }

    #[test]
    fn test_ascii_conversion_roundtrip() {
        let input = "0 1 2 3\n3 2 1 0\n";
        let mut out = Vec::new();
        let records = convert_ascii(input.as_bytes(), &mut out).unwrap();
        assert_eq!(records, 2);

        let conf = Config::new(4, 2).unwrap();
        let set = SketchSet::parse_bvecs(&out, &conf).unwrap();
        assert_eq!(set.row(0), &[0, 1, 2, 3]);
        assert_eq!(set.row(1), &[3, 2, 1, 0]);
    }

    #[test]
    fn test_ascii_value_out_of_range() {
        let input = "0 1 256 3\n";
        let mut out = Vec::new();
        assert!(matches!(
            convert_ascii(input.as_bytes(), &mut out),
            Err(Error::Parse(_))
        ));
    }
}
