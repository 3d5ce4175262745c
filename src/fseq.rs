// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Version 2 FSEQ sequence files: a fixed 32-byte header, an optional block index,
//! sparse channel ranges, free-form variables and then the raw channel data, one
//! fixed-size record per frame.
use std::{
    fmt,
    io::{self, Cursor, Read},
};

use byteorder::{LittleEndian, ReadBytesExt};

mod reader;
mod writer;

pub use reader::FSeqReader;
pub use writer::{write, Layout};

/// The magic bytes at the start of every sequence file.
pub const MAGIC: &[u8; 4] = b"PSEQ";
/// The length of the fixed part of the header.
pub const HEADER_LEN: usize = 32;
/// The only major version that is played.
pub const MAJOR_VERSION: u8 = 2;

const BLOCK_INDEX_LEN: usize = 8;
const SPARSE_RANGE_LEN: usize = 6;
const VARIABLE_HEADER_LEN: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum FSeqError {
    #[error("bad magic {0:?}")]
    BadMagic([u8; 4]),

    #[error("unsupported version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("unsupported compression {0}")]
    UnsupportedCompression(CompressionType),

    #[error("bad header layout: {0}")]
    BadLayout(String),

    #[error("bad variable block at byte {0}")]
    BadVariableBlock(usize),

    #[error("sparse range {start}+{count} is past channel count {channel_count}")]
    SparseRangeOverflow {
        start: u32,
        count: u32,
        channel_count: u32,
    },

    #[error("channel data is {actual} bytes, expected {expected}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("frame {frame} out of range ({frame_count} frames)")]
    FrameOutOfRange { frame: u32, frame_count: u32 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// How the channel data is compressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionType {
    None,
    Zstd,
    Zlib,
    Unknown(u8),
}

impl From<u8> for CompressionType {
    fn from(value: u8) -> Self {
        match value {
            0 => CompressionType::None,
            1 => CompressionType::Zstd,
            2 => CompressionType::Zlib,
            other => CompressionType::Unknown(other),
        }
    }
}

impl From<CompressionType> for u8 {
    fn from(value: CompressionType) -> Self {
        match value {
            CompressionType::None => 0,
            CompressionType::Zstd => 1,
            CompressionType::Zlib => 2,
            CompressionType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionType::None => f.write_str("none"),
            CompressionType::Zstd => f.write_str("zstd"),
            CompressionType::Zlib => f.write_str("zlib"),
            CompressionType::Unknown(other) => write!(f, "unknown ({})", other),
        }
    }
}

/// A block of channels that is present in every frame. Channels outside all
/// ranges are zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SparseRange {
    /// Zero-based.
    pub start: u32,
    pub count: u32,
}

/// A free-form header variable, e.g. `sp` for the sequence producer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub code: String,
    pub value: String,
}

/// A compression block index entry. Kept so dumps show the full header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Block {
    pub first_frame: u32,
    pub size: u32,
}

/// A decoded sequence file header.
#[derive(Clone, Debug)]
pub struct Header {
    pub channel_data_offset: u16,
    pub minor_version: u8,
    pub major_version: u8,
    pub variable_data_offset: u16,
    pub channel_count: u32,
    pub frame_count: u32,
    pub step_time_ms: u8,
    pub flags: u8,
    pub compression: CompressionType,
    pub uuid: u64,
    pub blocks: Vec<Block>,
    pub sparse_ranges: Vec<SparseRange>,
    pub variables: Vec<Variable>,
}

impl Header {
    /// Reads a header from the start of a sequence file, leaving the reader at the
    /// beginning of the channel data.
    pub fn read<R: Read>(source: &mut R) -> Result<Header, FSeqError> {
        let mut magic = [0u8; 4];
        source.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(FSeqError::BadMagic(magic));
        }

        let channel_data_offset = source.read_u16::<LittleEndian>()?;
        let minor_version = source.read_u8()?;
        let major_version = source.read_u8()?;
        if major_version != MAJOR_VERSION {
            return Err(FSeqError::UnsupportedVersion {
                major: major_version,
                minor: minor_version,
            });
        }

        let variable_data_offset = source.read_u16::<LittleEndian>()?;
        let channel_count = source.read_u32::<LittleEndian>()?;
        let frame_count = source.read_u32::<LittleEndian>()?;
        let step_time_ms = source.read_u8()?;
        let flags = source.read_u8()?;
        // Compression in the low nibble, the top bits of the block count in the high one.
        let packed = source.read_u8()?;
        let compression = CompressionType::from(packed & 0x0f);
        let block_count = (((packed & 0xf0) as u16) << 4) | source.read_u8()? as u16;
        let sparse_range_count = source.read_u8()? as usize;
        let _reserved = source.read_u8()?;
        let uuid = source.read_u64::<LittleEndian>()?;

        let index_end =
            HEADER_LEN + block_count as usize * BLOCK_INDEX_LEN + sparse_range_count * SPARSE_RANGE_LEN;
        let data_offset = channel_data_offset as usize;
        let variable_offset = variable_data_offset as usize;
        if variable_offset < index_end || variable_offset > data_offset {
            return Err(FSeqError::BadLayout(format!(
                "variables at {}, index ends at {}, channel data at {}",
                variable_offset, index_end, data_offset
            )));
        }

        let mut rest = vec![0u8; data_offset - HEADER_LEN];
        source.read_exact(&mut rest)?;
        let mut index = Cursor::new(rest.as_slice());

        let mut blocks = Vec::with_capacity(block_count as usize);
        for _ in 0..block_count {
            blocks.push(Block {
                first_frame: index.read_u32::<LittleEndian>()?,
                size: index.read_u32::<LittleEndian>()?,
            });
        }

        let mut sparse_ranges = Vec::with_capacity(sparse_range_count);
        for _ in 0..sparse_range_count {
            let range = SparseRange {
                start: index.read_u24::<LittleEndian>()?,
                count: index.read_u24::<LittleEndian>()?,
            };
            if range.start as u64 + range.count as u64 > channel_count as u64 {
                return Err(FSeqError::SparseRangeOverflow {
                    start: range.start,
                    count: range.count,
                    channel_count,
                });
            }
            sparse_ranges.push(range);
        }

        let variables = parse_variables(&rest[variable_offset - HEADER_LEN..], variable_offset)?;

        Ok(Header {
            channel_data_offset,
            minor_version,
            major_version,
            variable_data_offset,
            channel_count,
            frame_count,
            step_time_ms,
            flags,
            compression,
            uuid,
            blocks,
            sparse_ranges,
            variables,
        })
    }

    /// The number of bytes stored per frame.
    pub fn stride(&self) -> usize {
        if self.sparse_ranges.is_empty() {
            self.channel_count as usize
        } else {
            self.sparse_ranges.iter().map(|r| r.count as usize).sum()
        }
    }
}

fn parse_variables(buf: &[u8], base: usize) -> Result<Vec<Variable>, FSeqError> {
    let mut variables = Vec::new();
    let mut cursor = Cursor::new(buf);
    while buf.len() - cursor.position() as usize >= VARIABLE_HEADER_LEN {
        let at = cursor.position() as usize;
        let size = cursor.read_u16::<LittleEndian>()? as usize;
        // Writers pad the variable block with zeros.
        if size == 0 {
            break;
        }
        if size < VARIABLE_HEADER_LEN || at + size > buf.len() {
            return Err(FSeqError::BadVariableBlock(base + at));
        }

        let mut code = [0u8; 2];
        cursor.read_exact(&mut code)?;
        let raw = &buf[at + VARIABLE_HEADER_LEN..at + size];
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        variables.push(Variable {
            code: String::from_utf8_lossy(&code).to_string(),
            value: String::from_utf8_lossy(&raw[..end]).to_string(),
        });
        cursor.set_position((at + size) as u64);
    }

    Ok(variables)
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Version: {}.{}", self.major_version, self.minor_version)?;
        writeln!(f, "Channel data offset: {}", self.channel_data_offset)?;
        writeln!(f, "Variable data offset: {}", self.variable_data_offset)?;
        writeln!(f, "Channels: {}", self.channel_count)?;
        writeln!(f, "Frames: {}", self.frame_count)?;
        writeln!(f, "Step time: {}ms", self.step_time_ms)?;
        writeln!(f, "Flags: {:#04x}", self.flags)?;
        writeln!(f, "Compression: {}", self.compression)?;
        writeln!(f, "UUID: {:#018x}", self.uuid)?;

        if !self.blocks.is_empty() {
            writeln!(f, "Blocks ({}):", self.blocks.len())?;
            for block in self.blocks.iter() {
                writeln!(f, "  - frame {} ({} bytes)", block.first_frame, block.size)?;
            }
        }

        if !self.sparse_ranges.is_empty() {
            writeln!(f, "Sparse ranges ({}):", self.sparse_ranges.len())?;
            for range in self.sparse_ranges.iter() {
                writeln!(f, "  - {} channels from {}", range.count, range.start)?;
            }
        }

        if !self.variables.is_empty() {
            writeln!(f, "Variables ({}):", self.variables.len())?;
            for variable in self.variables.iter() {
                writeln!(f, "  - {}: {}", variable.code, variable.value)?;
            }
        }

        Ok(())
    }
}
