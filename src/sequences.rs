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
use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;

use crate::{
    error::EngineError,
    fseq::FSeqReader,
    storage::{SequenceSource, Storage},
};

mod prefetch;

pub use prefetch::Prefetcher;

/// One sample of channel intensities. `offset` is the zero-based channel the data
/// starts at.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelFrame {
    offset: usize,
    data: Vec<u8>,
}

impl ChannelFrame {
    pub fn new(offset: usize, data: Vec<u8>) -> ChannelFrame {
        ChannelFrame { offset, data }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The zero-based channels this frame covers.
    pub fn channels(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.data.len()
    }
}

/// What is known about a file-backed sequence without reading its frames.
#[derive(Clone, Debug, PartialEq)]
pub struct SequenceMeta {
    pub name: String,
    pub id: u64,
    pub step_time_ms: u32,
    pub frame_count: u32,
    pub channel_count: u32,
    pub variables: HashMap<String, String>,
}

impl SequenceMeta {
    /// How long the sequence plays.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.frame_count as u64 * self.step_time_ms as u64)
    }

    pub fn step_time(&self) -> Duration {
        Duration::from_millis(self.step_time_ms.into())
    }
}

impl fmt::Display for SequenceMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} frames, {} channels, {}ms)",
            self.name, self.frame_count, self.channel_count, self.step_time_ms
        )
    }
}

/// An opened sequence. Clones share the same reader and window cache.
#[derive(Clone)]
pub struct SequenceHandle {
    meta: Arc<SequenceMeta>,
    reader: Arc<Mutex<FSeqReader<Box<dyn SequenceSource>>>>,
}

impl SequenceHandle {
    pub(crate) fn open(
        name: &str,
        source: Box<dyn SequenceSource>,
        read_ahead: u32,
    ) -> Result<SequenceHandle, EngineError> {
        let reader =
            FSeqReader::open(source, read_ahead).map_err(|e| EngineError::from_fseq(name, e))?;
        let header = reader.header();
        let meta = SequenceMeta {
            name: name.to_string(),
            id: header.uuid,
            step_time_ms: header.step_time_ms.into(),
            frame_count: header.frame_count,
            channel_count: header.channel_count,
            variables: header
                .variables
                .iter()
                .map(|v| (v.code.clone(), v.value.clone()))
                .collect(),
        };

        Ok(SequenceHandle {
            meta: Arc::new(meta),
            reader: Arc::new(Mutex::new(reader)),
        })
    }

    pub fn meta(&self) -> &SequenceMeta {
        &self.meta
    }

    /// Reads a frame. May block on the underlying storage.
    pub fn frame(&self, index: u32) -> Result<ChannelFrame, EngineError> {
        let data = self
            .reader
            .lock()
            .frame(index)
            .map_err(|e| EngineError::from_fseq(&self.meta.name, e))?;
        Ok(ChannelFrame::new(0, data))
    }
}

/// Resolves sequence names to opened sequence files.
#[derive(Clone)]
pub struct SequenceStore {
    storage: Arc<dyn Storage>,
    read_ahead: u32,
}

impl SequenceStore {
    pub fn new(storage: Arc<dyn Storage>, read_ahead: u32) -> SequenceStore {
        SequenceStore {
            storage,
            read_ahead,
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Opens the named sequence, checking that the file is consistent with its header.
    pub fn resolve(&self, name: &str) -> Result<SequenceHandle, EngineError> {
        let source = self.storage.load_sequence_bytes(name)?;
        SequenceHandle::open(name, source, self.read_ahead)
    }

    pub fn frame_at(&self, handle: &SequenceHandle, index: u32) -> Result<ChannelFrame, EngineError> {
        handle.frame(index)
    }

    pub fn metadata<'a>(&self, handle: &'a SequenceHandle) -> &'a SequenceMeta {
        handle.meta()
    }
}
