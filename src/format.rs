//! .pbank bank artifacts
//!
//! A bank artifact is one self-contained file holding the vectors behind a
//! fitted index (or, optionally, the raw merged reference bank kept for
//! inspection):
//!
//! ```text
//! magic "PBANK001" (8 bytes) · rows u32 LE · dim u32 LE · rows*dim f32 LE
//! ```
//!
//! A bank is always written in one pass from a complete [`FeatureBatch`],
//! so the row count is known up front and the header is final from the
//! first byte. Reading goes through a memory map with
//! `bytemuck::try_cast_slice`, so the byte-to-float view is
//! alignment-checked; the 16-byte header keeps the payload f32-aligned
//! within the page-aligned map.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use memmap2::Mmap;
use thiserror::Error;

use crate::batch::FeatureBatch;

/// Magic bytes opening every .pbank artifact.
pub const MAGIC: [u8; 8] = *b"PBANK001";

/// Fixed prefix length: magic + rows + dim.
pub const HEADER_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Not a .pbank artifact (bad magic)")]
    BadMagic,

    #[error("Artifact truncated: need {needed} bytes, file has {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("Payload not aligned for f32 access")]
    Misaligned,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn header_bytes(rows: u32, dim: u32) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    buf[0..8].copy_from_slice(&MAGIC);
    buf[8..12].copy_from_slice(&rows.to_le_bytes());
    buf[12..16].copy_from_slice(&dim.to_le_bytes());
    buf
}

/// Write a whole batch as one .pbank artifact, synced to disk.
pub fn write_bank<P: AsRef<Path>>(path: P, batch: &FeatureBatch) -> Result<(), FormatError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(&header_bytes(batch.rows() as u32, batch.dim() as u32))?;
    for &value in batch.data() {
        writer.write_all(&value.to_le_bytes())?;
    }

    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Read a .pbank artifact back into an owned batch.
pub fn read_bank<P: AsRef<Path>>(path: P) -> Result<FeatureBatch, FormatError> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };

    if mmap.len() < HEADER_LEN {
        return Err(FormatError::Truncated {
            needed: HEADER_LEN,
            actual: mmap.len(),
        });
    }
    if mmap[0..8] != MAGIC {
        return Err(FormatError::BadMagic);
    }

    let rows = u32::from_le_bytes(mmap[8..12].try_into().unwrap()) as usize;
    let dim = u32::from_le_bytes(mmap[12..16].try_into().unwrap()) as usize;

    let needed = HEADER_LEN + rows * dim * std::mem::size_of::<f32>();
    if mmap.len() < needed {
        return Err(FormatError::Truncated {
            needed,
            actual: mmap.len(),
        });
    }

    let payload = &mmap[HEADER_LEN..needed];
    let floats: &[f32] = bytemuck::try_cast_slice(payload).map_err(|_| FormatError::Misaligned)?;

    Ok(FeatureBatch::from_parts(floats.to_vec(), rows, dim))
}
