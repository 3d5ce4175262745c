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
use std::io::Write;

use super::{
    FSeqError, SparseRange, Variable, HEADER_LEN, MAGIC, MAJOR_VERSION, SPARSE_RANGE_LEN,
    VARIABLE_HEADER_LEN,
};

/// Describes the sequence file to write.
#[derive(Clone, Debug)]
pub struct Layout {
    pub channel_count: u32,
    pub step_time_ms: u8,
    pub uuid: u64,
    /// When set, only these channels are stored.
    pub sparse_ranges: Vec<SparseRange>,
    pub variables: Vec<Variable>,
}

impl Layout {
    pub fn new(channel_count: u32, step_time_ms: u8) -> Layout {
        Layout {
            channel_count,
            step_time_ms,
            uuid: 0,
            sparse_ranges: Vec::new(),
            variables: Vec::new(),
        }
    }
}

/// Writes an uncompressed sequence file. Every frame must hold exactly
/// `channel_count` bytes, and exactly `frame_count` frames must be supplied.
pub fn write<W, I>(
    dest: &mut W,
    layout: &Layout,
    frame_count: u32,
    frames: I,
) -> Result<(), FSeqError>
where
    W: Write,
    I: IntoIterator<Item = Vec<u8>>,
{
    if layout.sparse_ranges.len() > u8::MAX as usize {
        return Err(FSeqError::BadLayout(format!(
            "{} sparse ranges",
            layout.sparse_ranges.len()
        )));
    }
    for range in layout.sparse_ranges.iter() {
        if range.start as u64 + range.count as u64 > layout.channel_count as u64
            || range.start > 0xff_ffff
            || range.count > 0xff_ffff
        {
            return Err(FSeqError::SparseRangeOverflow {
                start: range.start,
                count: range.count,
                channel_count: layout.channel_count,
            });
        }
    }

    let variable_data_offset = HEADER_LEN + layout.sparse_ranges.len() * SPARSE_RANGE_LEN;
    let mut variables = Vec::new();
    for variable in layout.variables.iter() {
        let code = variable.code.as_bytes();
        if code.len() != 2 {
            return Err(FSeqError::BadLayout(format!(
                "variable code {:?} is not two bytes",
                variable.code
            )));
        }
        let size = VARIABLE_HEADER_LEN + variable.value.len() + 1;
        let size = u16::try_from(size)
            .map_err(|_| FSeqError::BadLayout(format!("variable {} is too long", variable.code)))?;
        variables.extend_from_slice(&size.to_le_bytes());
        variables.extend_from_slice(code);
        variables.extend_from_slice(variable.value.as_bytes());
        variables.push(0);
    }

    let channel_data_offset = u16::try_from(variable_data_offset + variables.len())
        .map_err(|_| FSeqError::BadLayout("header is too long".into()))?;

    let mut header = Vec::with_capacity(channel_data_offset as usize);
    header.extend_from_slice(MAGIC);
    header.extend_from_slice(&channel_data_offset.to_le_bytes());
    header.push(0);
    header.push(MAJOR_VERSION);
    header.extend_from_slice(&(variable_data_offset as u16).to_le_bytes());
    header.extend_from_slice(&layout.channel_count.to_le_bytes());
    header.extend_from_slice(&frame_count.to_le_bytes());
    header.push(layout.step_time_ms);
    // Flags, compression (none, no blocks), block count, sparse range count, reserved.
    header.extend_from_slice(&[0, 0, 0, layout.sparse_ranges.len() as u8, 0]);
    header.extend_from_slice(&layout.uuid.to_le_bytes());
    for range in layout.sparse_ranges.iter() {
        header.extend_from_slice(&range.start.to_le_bytes()[..3]);
        header.extend_from_slice(&range.count.to_le_bytes()[..3]);
    }
    header.extend_from_slice(&variables);
    dest.write_all(&header)?;

    let mut written = 0u32;
    for frame in frames {
        if frame.len() != layout.channel_count as usize {
            return Err(FSeqError::LengthMismatch {
                expected: layout.channel_count as u64,
                actual: frame.len() as u64,
            });
        }

        if layout.sparse_ranges.is_empty() {
            dest.write_all(&frame)?;
        } else {
            for range in layout.sparse_ranges.iter() {
                let start = range.start as usize;
                dest.write_all(&frame[start..start + range.count as usize])?;
            }
        }
        written += 1;
    }

    if written != frame_count {
        return Err(FSeqError::LengthMismatch {
            expected: frame_count as u64,
            actual: written as u64,
        });
    }

    dest.flush()?;
    Ok(())
}

#[cfg(test)]
mod test {
    use crate::fseq::{FSeqError, Layout, Variable};

    use super::write;

    #[test]
    fn test_frame_length_checked() {
        let mut buf = Vec::new();
        assert!(matches!(
            write(&mut buf, &Layout::new(3, 25), 1, vec![vec![1, 2]]),
            Err(FSeqError::LengthMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_frame_count_checked() {
        let mut buf = Vec::new();
        assert!(matches!(
            write(&mut buf, &Layout::new(3, 25), 2, vec![vec![1, 2, 3]]),
            Err(FSeqError::LengthMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_bad_variable_code() {
        let mut layout = Layout::new(3, 25);
        layout.variables.push(Variable {
            code: "long".into(),
            value: "x".into(),
        });
        let mut buf = Vec::new();
        assert!(matches!(
            write(&mut buf, &layout, 0, Vec::new()),
            Err(FSeqError::BadLayout(_))
        ));
    }
}
