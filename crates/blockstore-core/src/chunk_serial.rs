//! Binary serialization and deserialization for [`ChunkStore`].
//!
//! The BSCK (Block Store ChunK) format is a compact, versioned record holding
//! one chunk's placed flags.
//!
//! ## Binary Layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | Magic bytes `[0x42, 0x53, 0x43, 0x4B]` ("BSCK") |
//! | 4 | 1 | Format version (`u8`, currently 1) |
//! | 5 | 4 | Chunk x (`i32`, little-endian) |
//! | 9 | 4 | Chunk z (`i32`, little-endian) |
//! | 13 | 4 | Minimum y (`i32`, little-endian) |
//! | 17 | 4 | Height in layers (`u32`, little-endian) |
//! | 21 | M | Flag bits, one per block in index order, LSB first |
//!
//! Where M = `16 × 16 × height / 8` bytes.

use crate::chunk_store::ChunkStore;
use crate::coords::{ChunkCoord, LAYER_AREA, WorldBounds};
use crate::flag_bits::FlagBits;

/// Magic bytes identifying the BSCK format.
const MAGIC: [u8; 4] = [0x42, 0x53, 0x43, 0x4B];

/// Current format version.
pub const FORMAT_VERSION: u8 = 1;

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 21;

/// Errors that can occur during chunk deserialization.
#[derive(Debug, thiserror::Error)]
pub enum ChunkSerError {
    /// The data does not start with the expected magic bytes.
    #[error("invalid magic bytes")]
    InvalidMagic,
    /// The format version is not supported by this build.
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u8),
    /// The data is shorter than the fixed header.
    #[error("data truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Minimum expected byte count.
        expected: usize,
        /// Actual byte count received.
        actual: usize,
    },
    /// The header describes an impossible vertical range.
    #[error("invalid world bounds: min_y {min_y}, height {height}")]
    InvalidBounds {
        /// Recorded minimum y.
        min_y: i32,
        /// Recorded height.
        height: u32,
    },
    /// The flag payload does not match the size implied by the header.
    #[error("flag payload is {actual} bytes, header implies {expected}")]
    SizeMismatch {
        /// Payload length implied by the header.
        expected: usize,
        /// Payload length present.
        actual: usize,
    },
    /// The record belongs to a different chunk than the one requested.
    #[error("record is for chunk {found}, expected {expected}")]
    WrongChunk {
        /// The chunk that was being loaded.
        expected: ChunkCoord,
        /// The chunk named in the record header.
        found: ChunkCoord,
    },
    /// The record covers different vertical bounds than the world.
    #[error("record covers y {found_min}+{found_height}, world is {expected_min}+{expected_height}")]
    BoundsMismatch {
        expected_min: i32,
        expected_height: u32,
        found_min: i32,
        found_height: u32,
    },
}

impl ChunkStore {
    /// Serializes this store to a byte vector in the BSCK binary format.
    pub fn serialize(&self) -> Vec<u8> {
        let bounds = self.bounds();
        let payload = payload_len(bounds.height());
        let mut buf = Vec::with_capacity(HEADER_LEN + payload);

        // Magic + version
        buf.extend_from_slice(&MAGIC);
        buf.push(FORMAT_VERSION);

        // Chunk coordinate and bounds
        buf.extend_from_slice(&self.coord().cx.to_le_bytes());
        buf.extend_from_slice(&self.coord().cz.to_le_bytes());
        buf.extend_from_slice(&bounds.min_y().to_le_bytes());
        buf.extend_from_slice(&bounds.height().to_le_bytes());

        // Flags: u64 words as little-endian bytes
        for word in self.flags().raw_words() {
            buf.extend_from_slice(&word.to_le_bytes());
        }
        buf.truncate(HEADER_LEN + payload);

        buf
    }

    /// Deserializes a store from a byte slice in the BSCK binary format.
    ///
    /// The returned store is clean. Returns an error if the data is corrupted,
    /// has an unrecognized version, or its size disagrees with its header.
    pub fn deserialize(data: &[u8]) -> Result<Self, ChunkSerError> {
        if data.len() < MAGIC.len() || data[0..4] != MAGIC {
            return Err(ChunkSerError::InvalidMagic);
        }
        if data.len() < HEADER_LEN {
            return Err(ChunkSerError::Truncated {
                expected: HEADER_LEN,
                actual: data.len(),
            });
        }

        let version = data[4];
        if version != FORMAT_VERSION {
            return Err(ChunkSerError::UnsupportedVersion(version));
        }

        let coord = ChunkCoord::new(read_i32(data, 5), read_i32(data, 9));
        let min_y = read_i32(data, 13);
        let height = u32::from_le_bytes([data[17], data[18], data[19], data[20]]);
        let bounds = WorldBounds::new(min_y, height)
            .map_err(|_| ChunkSerError::InvalidBounds { min_y, height })?;

        let expected = payload_len(height);
        let payload = &data[HEADER_LEN..];
        if payload.len() != expected {
            return Err(ChunkSerError::SizeMismatch {
                expected,
                actual: payload.len(),
            });
        }

        let words = payload
            .chunks(8)
            .map(|chunk| {
                let mut word_bytes = [0u8; 8];
                word_bytes[..chunk.len()].copy_from_slice(chunk);
                u64::from_le_bytes(word_bytes)
            })
            .collect();
        let flags = FlagBits::from_raw(bounds.chunk_volume(), words);

        Ok(ChunkStore::from_parts(coord, bounds, flags))
    }

    /// Deserializes a record and checks it belongs to `coord` in a world with `bounds`.
    pub fn deserialize_for(
        data: &[u8],
        coord: ChunkCoord,
        bounds: WorldBounds,
    ) -> Result<Self, ChunkSerError> {
        let store = Self::deserialize(data)?;
        if store.coord() != coord {
            return Err(ChunkSerError::WrongChunk {
                expected: coord,
                found: store.coord(),
            });
        }
        if store.bounds() != bounds {
            return Err(ChunkSerError::BoundsMismatch {
                expected_min: bounds.min_y(),
                expected_height: bounds.height(),
                found_min: store.bounds().min_y(),
                found_height: store.bounds().height(),
            });
        }
        Ok(store)
    }
}

/// Returns the number of bytes of flag data for a chunk of `height` layers.
fn payload_len(height: u32) -> usize {
    (LAYER_AREA * height as usize).div_ceil(8)
}

fn read_i32(data: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
