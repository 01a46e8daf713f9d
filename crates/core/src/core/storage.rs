//! Model files.
//!
//! Two formats are accepted:
//!
//! - the JSON weight list `[W0, b0, W1, b1, ...]` exported by the training side;
//! - a compact binary image, written by `netviz-cli convert`.
//!
//! Image layout (all integers little-endian):
//!
//! ```text
//! magic   "NVZMODEL"
//! version u32
//! chunk*  tag [u8; 4], len u32, payload
//! ```
//!
//! Chunks: `META` (plain: layer count, then rows/cols per layer), one `LAYR`
//! per layer (LZ4: weights row-major then biases, as f32), and `END\0`.
//! Unknown tags are skipped.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Result, VizError};
use crate::structure::{Layer, NetworkStructure, WeightMatrix};

pub const MAGIC: &[u8; 8] = b"NVZMODEL";
pub const VERSION_CURRENT: u32 = 1;

const TAG_META: [u8; 4] = *b"META";
const TAG_LAYER: [u8; 4] = *b"LAYR";
const TAG_END: [u8; 4] = *b"END\0";

pub fn compress_lz4(input: &[u8]) -> Vec<u8> {
    lz4_flex::compress(input)
}

pub fn decompress_lz4(input: &[u8], expected_size: usize) -> io::Result<Vec<u8>> {
    lz4_flex::decompress(input, expected_size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "lz4 decompression failed"))
}

pub fn write_u32_le<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn read_exact<const N: usize, R: Read>(r: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_u32_le<R: Read>(r: &mut R) -> io::Result<u32> {
    Ok(u32::from_le_bytes(read_exact::<4, _>(r)?))
}

pub fn write_chunk<W: Write>(w: &mut W, tag: [u8; 4], payload: &[u8]) -> io::Result<()> {
    w.write_all(&tag)?;
    write_u32_le(w, len_u32(payload.len())?)?;
    w.write_all(payload)
}

/// Write an LZ4 chunk: the payload is preceded by its uncompressed length.
pub fn write_chunk_lz4<W: Write>(w: &mut W, tag: [u8; 4], payload: &[u8]) -> io::Result<()> {
    let compressed = compress_lz4(payload);
    let total_len = 4u32.saturating_add(len_u32(compressed.len())?);

    w.write_all(&tag)?;
    write_u32_le(w, total_len)?;
    write_u32_le(w, len_u32(payload.len())?)?;
    w.write_all(&compressed)
}

pub fn read_chunk_header<R: Read>(r: &mut R) -> io::Result<([u8; 4], u32)> {
    let tag = read_exact::<4, _>(r)?;
    let len = read_u32_le(r)?;
    Ok((tag, len))
}

fn len_u32(n: usize) -> io::Result<u32> {
    u32::try_from(n).map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))
}

fn read_payload<R: Read>(r: &mut R, len: u32) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn decode_lz4_payload(payload: &[u8]) -> io::Result<Vec<u8>> {
    let (head, body) = payload
        .split_first_chunk::<4>()
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "truncated lz4 chunk"))?;
    decompress_lz4(body, u32::from_le_bytes(*head) as usize)
}

fn f32s_from_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn save_structure_to<W: Write>(w: &mut W, structure: &NetworkStructure) -> Result<()> {
    w.write_all(MAGIC)?;
    write_u32_le(w, VERSION_CURRENT)?;

    let layers = structure.layers();
    let mut meta = Vec::with_capacity(4 + layers.len() * 8);
    meta.extend_from_slice(&(layers.len() as u32).to_le_bytes());
    for l in layers {
        meta.extend_from_slice(&(l.weights.rows() as u32).to_le_bytes());
        meta.extend_from_slice(&(l.weights.cols() as u32).to_le_bytes());
    }
    write_chunk(w, TAG_META, &meta)?;

    for l in layers {
        let mut body = Vec::with_capacity((l.weights.len() + l.biases.len()) * 4);
        for v in l.weights.as_slice().iter().chain(&l.biases) {
            body.extend_from_slice(&v.to_le_bytes());
        }
        write_chunk_lz4(w, TAG_LAYER, &body)?;
    }

    write_chunk(w, TAG_END, &[])?;
    Ok(())
}

pub fn load_structure_from<R: Read>(r: &mut R) -> Result<NetworkStructure> {
    let magic = read_exact::<8, _>(r)?;
    if &magic != MAGIC {
        return Err(VizError::ModelImage("bad magic".to_string()));
    }
    let version = read_u32_le(r)?;
    if version != VERSION_CURRENT {
        return Err(VizError::ModelImage(format!("unsupported version {}", version)));
    }

    let mut shapes: Option<Vec<(usize, usize)>> = None;
    let mut layers = Vec::new();
    loop {
        let (tag, len) = read_chunk_header(r)?;
        let payload = read_payload(r, len)?;
        match tag {
            TAG_META => {
                let words: Vec<usize> = payload
                    .chunks_exact(4)
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]) as usize)
                    .collect();
                let count = words.first().copied().unwrap_or(0);
                if words.len() != 1 + 2 * count {
                    return Err(VizError::ModelImage("META chunk size disagrees with layer count".to_string()));
                }
                shapes = Some(words[1..].chunks_exact(2).map(|p| (p[0], p[1])).collect());
            }
            TAG_LAYER => {
                let shapes = shapes
                    .as_ref()
                    .ok_or_else(|| VizError::ModelImage("LAYR chunk before META".to_string()))?;
                let (rows, cols) = *shapes
                    .get(layers.len())
                    .ok_or_else(|| VizError::ModelImage("more LAYR chunks than layers".to_string()))?;
                let values = f32s_from_le(&decode_lz4_payload(&payload)?);
                if values.len() != rows * cols + cols {
                    return Err(VizError::mismatch("layer values", rows * cols + cols, values.len()));
                }
                let mut weights = values;
                let biases = weights.split_off(rows * cols);
                layers.push(Layer::new(WeightMatrix::new(rows, cols, weights)?, biases)?);
            }
            TAG_END => break,
            other => {
                tracing::debug!(tag = ?String::from_utf8_lossy(&other), "skipping unknown model chunk");
            }
        }
    }

    let expected = shapes.map_or(0, |s| s.len());
    if layers.len() != expected {
        return Err(VizError::mismatch("layer chunks", expected, layers.len()));
    }
    NetworkStructure::new(layers)
}

pub fn save_structure_file(path: &Path, structure: &NetworkStructure) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    save_structure_to(&mut w, structure)?;
    w.flush()?;
    Ok(())
}

/// Load a model file in either format, told apart by the leading magic.
pub fn load_structure_file(path: &Path) -> Result<NetworkStructure> {
    let mut r = BufReader::new(File::open(path)?);
    let mut bytes = Vec::new();
    r.read_to_end(&mut bytes)?;
    if bytes.starts_with(MAGIC) {
        load_structure_from(&mut bytes.as_slice())
    } else {
        let text = String::from_utf8(bytes)
            .map_err(|_| VizError::ModelImage("neither a model image nor UTF-8 JSON".to_string()))?;
        NetworkStructure::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_preserves_weights_exactly() {
        let s = NetworkStructure::synthetic(&[6, 4, 3], 11).unwrap();
        let mut buf = Vec::new();
        save_structure_to(&mut buf, &s).unwrap();
        assert!(buf.starts_with(MAGIC));
        let back = load_structure_from(&mut buf.as_slice()).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        let err = load_structure_from(&mut &b"NOTMODEL\x01\0\0\0"[..]).unwrap_err();
        assert!(matches!(err, VizError::ModelImage(_)));

        let s = NetworkStructure::synthetic(&[4, 2, 2], 1).unwrap();
        let mut buf = Vec::new();
        save_structure_to(&mut buf, &s).unwrap();
        buf.truncate(buf.len() - 12);
        assert!(load_structure_from(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn unknown_chunks_are_skipped() {
        let s = NetworkStructure::synthetic(&[4, 2, 2], 3).unwrap();
        let mut full = Vec::new();
        save_structure_to(&mut full, &s).unwrap();

        // Splice an extra chunk in right after the header.
        let mut buf = full[..12].to_vec();
        write_chunk(&mut buf, *b"XTRA", b"hello").unwrap();
        buf.extend_from_slice(&full[12..]);
        assert_eq!(load_structure_from(&mut buf.as_slice()).unwrap(), s);
    }

    #[test]
    fn file_loader_accepts_both_formats() {
        let dir = std::env::temp_dir().join(format!("netviz-storage-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let s = NetworkStructure::synthetic(&[4, 3, 2], 5).unwrap();

        let bin = dir.join("model.nvz");
        save_structure_file(&bin, &s).unwrap();
        assert_eq!(load_structure_file(&bin).unwrap(), s);

        let json = dir.join("model.json");
        std::fs::write(&json, serde_json::to_string(&s.to_weight_list()).unwrap()).unwrap();
        assert_eq!(load_structure_file(&json).unwrap(), s);

        std::fs::remove_dir_all(&dir).ok();
    }
}
