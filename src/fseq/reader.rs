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
use std::io::{Read, Seek, SeekFrom};

use super::{CompressionType, FSeqError, Header};

/// Reads frames from an uncompressed sequence file on demand. Only a window of
/// `read_ahead` frames is held in memory at a time.
pub struct FSeqReader<R> {
    source: R,
    header: Header,
    read_ahead: u32,
    window_start: u32,
    window_frames: u32,
    window: Vec<u8>,
}

impl<R: Read + Seek> FSeqReader<R> {
    /// Decodes the header and checks that the channel data matches it exactly.
    pub fn open(mut source: R, read_ahead: u32) -> Result<FSeqReader<R>, FSeqError> {
        source.seek(SeekFrom::Start(0))?;
        let header = Header::read(&mut source)?;
        if header.compression != CompressionType::None {
            return Err(FSeqError::UnsupportedCompression(header.compression));
        }

        let total = source.seek(SeekFrom::End(0))?;
        let expected = header.frame_count as u64 * header.stride() as u64;
        let actual = total.saturating_sub(header.channel_data_offset as u64);
        if actual != expected {
            return Err(FSeqError::LengthMismatch { expected, actual });
        }

        Ok(FSeqReader {
            source,
            header,
            read_ahead: read_ahead.max(1),
            window_start: 0,
            window_frames: 0,
            window: Vec::new(),
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the full frame at the given index, channel_count bytes long.
    pub fn frame(&mut self, index: u32) -> Result<Vec<u8>, FSeqError> {
        let frame_count = self.header.frame_count;
        if index >= frame_count {
            return Err(FSeqError::FrameOutOfRange {
                frame: index,
                frame_count,
            });
        }

        if index < self.window_start || index >= self.window_start + self.window_frames {
            self.fill_window(index)?;
        }

        let stride = self.header.stride();
        let at = (index - self.window_start) as usize * stride;
        let raw = &self.window[at..at + stride];

        if self.header.sparse_ranges.is_empty() {
            return Ok(raw.to_vec());
        }

        let mut frame = vec![0u8; self.header.channel_count as usize];
        let mut from = 0;
        for range in self.header.sparse_ranges.iter() {
            let start = range.start as usize;
            let count = range.count as usize;
            frame[start..start + count].copy_from_slice(&raw[from..from + count]);
            from += count;
        }

        Ok(frame)
    }

    fn fill_window(&mut self, index: u32) -> Result<(), FSeqError> {
        let stride = self.header.stride() as u64;
        let frames = self.read_ahead.min(self.header.frame_count - index);

        // Invalidate first so a failed read never leaves a half-filled window behind.
        self.window_frames = 0;
        self.window.resize(frames as usize * stride as usize, 0);
        self.source.seek(SeekFrom::Start(
            self.header.channel_data_offset as u64 + index as u64 * stride,
        ))?;
        self.source.read_exact(&mut self.window)?;

        self.window_start = index;
        self.window_frames = frames;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{
        error::Error,
        io::{self, Cursor, Read, Seek, SeekFrom},
    };

    use crate::fseq::{write, FSeqError, Layout, SparseRange};

    use super::FSeqReader;

    fn encode(layout: &Layout, frames: Vec<Vec<u8>>) -> Vec<u8> {
        let mut buf = Vec::new();
        write(&mut buf, layout, frames.len() as u32, frames).expect("write should succeed");
        buf
    }

    /// Counts the reads issued against the underlying buffer.
    struct CountingCursor {
        inner: Cursor<Vec<u8>>,
        reads: usize,
    }

    impl Read for CountingCursor {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            self.inner.read(buf)
        }
    }

    impl Seek for CountingCursor {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn test_frames() -> Result<(), Box<dyn Error>> {
        let frames: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i, i + 1, i + 2]).collect();
        let buf = encode(&Layout::new(3, 25), frames.clone());

        let mut reader = FSeqReader::open(Cursor::new(buf), 4)?;
        assert_eq!(10, reader.header().frame_count);
        for (i, expected) in frames.iter().enumerate() {
            assert_eq!(*expected, reader.frame(i as u32)?);
        }
        // Going backwards refills the window.
        assert_eq!(frames[1], reader.frame(1)?);

        assert!(matches!(
            reader.frame(10),
            Err(FSeqError::FrameOutOfRange {
                frame: 10,
                frame_count: 10
            })
        ));
        Ok(())
    }

    #[test]
    fn test_window_cache() -> Result<(), Box<dyn Error>> {
        let frames: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 4]).collect();
        let buf = encode(&Layout::new(4, 25), frames);

        let source = CountingCursor {
            inner: Cursor::new(buf),
            reads: 0,
        };
        let mut reader = FSeqReader::open(source, 8)?;
        let before = reader.source.reads;
        for i in 0..8 {
            assert_eq!(vec![i as u8; 4], reader.frame(i)?);
        }
        // The whole sequence fits in one window.
        assert_eq!(1, reader.source.reads - before);
        Ok(())
    }

    #[test]
    fn test_sparse_frames_expanded() -> Result<(), Box<dyn Error>> {
        let mut layout = Layout::new(8, 25);
        layout.sparse_ranges = vec![
            SparseRange { start: 1, count: 2 },
            SparseRange { start: 5, count: 3 },
        ];
        let frames = vec![vec![9, 1, 2, 9, 9, 3, 4, 5], vec![0, 6, 7, 0, 0, 8, 9, 10]];
        let buf = encode(&layout, frames);

        let mut reader = FSeqReader::open(Cursor::new(buf), 2)?;
        assert_eq!(5, reader.header().stride());
        assert_eq!(vec![0, 1, 2, 0, 0, 3, 4, 5], reader.frame(0)?);
        assert_eq!(vec![0, 6, 7, 0, 0, 8, 9, 10], reader.frame(1)?);
        Ok(())
    }

    #[test]
    fn test_truncated_is_rejected() {
        let frames: Vec<Vec<u8>> = (0..5u8).map(|i| vec![i; 6]).collect();
        let mut buf = encode(&Layout::new(6, 25), frames);
        buf.truncate(buf.len() - 4);

        assert!(matches!(
            FSeqReader::open(Cursor::new(buf), 4),
            Err(FSeqError::LengthMismatch {
                expected: 30,
                actual: 26
            })
        ));
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let mut buf = encode(&Layout::new(6, 25), vec![vec![1; 6]]);
        buf.push(0);

        assert!(matches!(
            FSeqReader::open(Cursor::new(buf), 4),
            Err(FSeqError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_compressed_is_rejected() {
        let mut buf = encode(&Layout::new(3, 25), vec![vec![1, 2, 3]]);
        buf[20] = 0x01;

        assert!(matches!(
            FSeqReader::open(Cursor::new(buf), 4),
            Err(FSeqError::UnsupportedCompression(_))
        ));
    }
}
