//! Index persistence
//!
//! Fixed little-endian primitives plus the on-disk framing: a magic/version
//! header with an index-kind tag, followed by the index's own recursive
//! serialization. Every writer is matched byte-for-byte by its reader.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Config, RepType};
use crate::SketchIndex;

/// `b"SKDB"` in little-endian.
pub const MAGIC: u32 = u32::from_le_bytes(*b"SKDB");

/// Bumped whenever the serialized layout changes.
pub const FORMAT_VERSION: u16 = 1;

pub(crate) fn write_u8<W: Write>(w: &mut W, v: u8) -> Result<()> {
    w.write_all(&[v])?;
    Ok(())
}

pub(crate) fn write_u16<W: Write>(w: &mut W, v: u16) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_u32<W: Write>(w: &mut W, v: u32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_u64<W: Write>(w: &mut W, v: u64) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_f32<W: Write>(w: &mut W, v: f32) -> Result<()> {
    w.write_all(&v.to_bits().to_le_bytes())?;
    Ok(())
}

pub(crate) fn read_u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub(crate) fn read_u16<R: Read>(r: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub(crate) fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn read_f32<R: Read>(r: &mut R) -> Result<f32> {
    Ok(f32::from_bits(read_u32(r)?))
}

pub(crate) fn write_config<W: Write>(w: &mut W, conf: &Config) -> Result<()> {
    write_u32(w, conf.dim as u32)?;
    write_u32(w, conf.bits as u32)?;
    write_u32(w, conf.blocks as u32)?;
    write_f32(w, conf.suf_thr)?;
    write_u8(w, conf.rep_type.to_tag())?;
    Ok(())
}

pub(crate) fn read_config<R: Read>(r: &mut R) -> Result<Config> {
    let conf = Config {
        dim: read_u32(r)? as usize,
        bits: read_u32(r)? as usize,
        blocks: read_u32(r)? as usize,
        suf_thr: read_f32(r)?,
        rep_type: RepType::from_tag(read_u8(r)?)?,
    };
    conf.validate()?;
    Ok(conf)
}

/// Write an index to `path` behind the magic/version/kind header.
pub fn save_index<I: SketchIndex, P: AsRef<Path>>(index: &I, path: P) -> Result<()> {
    let mut w = BufWriter::new(File::create(path.as_ref())?);
    write_u32(&mut w, MAGIC)?;
    write_u16(&mut w, FORMAT_VERSION)?;
    write_u8(&mut w, I::KIND)?;
    write_u8(&mut w, 0)?; // reserved
    index.serialize_into(&mut w)?;
    w.flush()?;
    debug!(path = %path.as_ref().display(), kind = I::KIND, "saved index");
    Ok(())
}

/// Load an index of kind `I` from `path`, rejecting mismatched headers.
pub fn load_index<I: SketchIndex, P: AsRef<Path>>(path: P) -> Result<I> {
    let mut r = BufReader::new(File::open(path.as_ref())?);
    let magic = read_u32(&mut r)?;
    if magic != MAGIC {
        return Err(Error::Parse(format!("bad magic number {magic:#010x}")));
    }
    let version = read_u16(&mut r)?;
    if version != FORMAT_VERSION {
        return Err(Error::Parse(format!(
            "unsupported format version {version}, expected {FORMAT_VERSION}"
        )));
    }
    let kind = read_u8(&mut r)?;
    if kind != I::KIND {
        return Err(Error::Parse(format!(
            "index kind mismatch: file holds {kind}, expected {}",
            I::KIND
        )));
    }
    let _reserved = read_u8(&mut r)?;
    let index = I::deserialize_from(&mut r)?;
    debug!(path = %path.as_ref().display(), kind, "loaded index");
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RepType;

    #[test]
    fn test_primitive_roundtrip() {
        let mut buf = Vec::new();
        write_u8(&mut buf, 0xab).unwrap();
        write_u16(&mut buf, 0xbeef).unwrap();
        write_u32(&mut buf, 0xdeadbeef).unwrap();
        write_u64(&mut buf, u64::MAX - 1).unwrap();
        write_f32(&mut buf, 2.5).unwrap();

        let mut r = buf.as_slice();
        assert_eq!(read_u8(&mut r).unwrap(), 0xab);
        assert_eq!(read_u16(&mut r).unwrap(), 0xbeef);
        assert_eq!(read_u32(&mut r).unwrap(), 0xdeadbeef);
        assert_eq!(read_u64(&mut r).unwrap(), u64::MAX - 1);
        assert_eq!(read_f32(&mut r).unwrap(), 2.5);
    }

    #[test]
    fn test_config_roundtrip() {
        let conf = Config::new(16, 3)
            .unwrap()
            .with_blocks(4)
            .with_suf_thr(1.5)
            .with_rep_type(RepType::List);
        let mut buf = Vec::new();
        write_config(&mut buf, &conf).unwrap();
        let loaded = read_config(&mut buf.as_slice()).unwrap();
        assert_eq!(conf, loaded);
    }

    #[test]
    fn test_invalid_config_rejected_on_read() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 200).unwrap(); // dim out of range
        write_u32(&mut buf, 2).unwrap();
        write_u32(&mut buf, 1).unwrap();
        write_f32(&mut buf, 2.0).unwrap();
        write_u8(&mut buf, 1).unwrap();
        assert!(read_config(&mut buf.as_slice()).is_err());
    }
}
