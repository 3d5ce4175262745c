// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
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

use crate::{config::error::ConfigError, fseq::FSeqError};

/// Errors raised by the playback engine. Every per-entry and per-universe failure is
/// isolated by the caller; none of these stop the tick driver on their own.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A named resource (playlist, schedule, sequence, model) is absent.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// A sequence file is structurally broken.
    #[error("sequence {name} is corrupt: {source}")]
    CorruptFormat {
        name: String,
        #[source]
        source: FSeqError,
    },

    /// A frame index past the end of a sequence was requested.
    #[error("frame {frame} is out of range for {name} ({frame_count} frames)")]
    OutOfRange {
        name: String,
        frame: u32,
        frame_count: u32,
    },

    /// A frame could not be read in time. The caller repeats its last frame.
    #[error("sequence {0} is unavailable")]
    SequenceUnavailable(String),

    /// The playlist has nothing that can be started.
    #[error("playlist {0} has no entries to play")]
    PlaylistEmpty(String),

    /// Two schedules cannot be told apart.
    #[error("schedule conflict: {0}")]
    ScheduleConflict(String),

    /// A schedule that can never be evaluated sensibly.
    #[error("invalid schedule {name}: {reason}")]
    InvalidSchedule { name: String, reason: String },

    /// The output layer could not be set up.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl EngineError {
    /// Shorthand for a missing resource.
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> EngineError {
        EngineError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Maps a sequence decoding error onto the engine taxonomy.
    pub fn from_fseq(name: &str, err: FSeqError) -> EngineError {
        match err {
            FSeqError::FrameOutOfRange { frame, frame_count } => EngineError::OutOfRange {
                name: name.to_string(),
                frame,
                frame_count,
            },
            FSeqError::Io(e) => match e.kind() {
                std::io::ErrorKind::UnexpectedEof => EngineError::CorruptFormat {
                    name: name.to_string(),
                    source: FSeqError::Io(e),
                },
                _ => EngineError::SequenceUnavailable(format!("{name}: {e}")),
            },
            source => EngineError::CorruptFormat {
                name: name.to_string(),
                source,
            },
        }
    }
}
