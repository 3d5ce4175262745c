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
use std::{
    fs,
    io::{self, Read, Seek},
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

use crate::{
    config::{
        error::ConfigError, models::Models, outputs::Channels, ChannelOutput, Model, Playlist,
        Schedule,
    },
    error::EngineError,
    util::filename_display,
};

/// A seekable stream of sequence file bytes.
pub trait SequenceSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> SequenceSource for T {}

/// The persisted records the engine reads. Writes belong to whoever edits the show.
pub trait Storage: Send + Sync {
    fn load_playlist(&self, id: u32) -> Result<Playlist, EngineError>;

    fn load_schedule(&self, id: u32) -> Result<Schedule, EngineError>;

    /// Loads every schedule. Unreadable records are reported and left out.
    fn load_schedules(&self) -> Result<Vec<Schedule>, EngineError>;

    fn load_channel_outputs(&self) -> Result<Vec<ChannelOutput>, EngineError>;

    fn load_models(&self) -> Result<Vec<Model>, EngineError>;

    fn load_sequence_bytes(&self, name: &str) -> Result<Box<dyn SequenceSource>, EngineError>;
}

const PLAYLISTS: &str = "playlists";
const SCHEDULES: &str = "schedules";
const SEQUENCES: &str = "sequences";
const OTHER: &str = "other";
const OUTPUTS: &str = "outputs.json";
const MODELS: &str = "models.json";

/// Records stored as JSON files below a root directory:
///
/// ```text
/// <root>/playlists/<id>.json
/// <root>/schedules/<id>.json
/// <root>/sequences/<name>
/// <root>/other/outputs.json
/// <root>/other/models.json
/// ```
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: &Path) -> FileStorage {
        FileStorage {
            root: root.to_path_buf(),
        }
    }

    /// Creates the directory layout if it doesn't exist yet.
    pub fn init(root: &Path) -> Result<FileStorage, EngineError> {
        for dir in [PLAYLISTS, SCHEDULES, SEQUENCES, OTHER] {
            fs::create_dir_all(root.join(dir))?;
        }
        Ok(FileStorage::new(root))
    }

    pub fn sequence_path(&self, name: &str) -> Result<PathBuf, EngineError> {
        // Sequence names come from records, so they may not escape the sequence directory.
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." || name == "." {
            return Err(EngineError::not_found("sequence", name));
        }
        Ok(self.root.join(SEQUENCES).join(name))
    }

    pub fn save_playlist(&self, id: u32, playlist: &Playlist) -> Result<(), EngineError> {
        self.write_record(&self.root.join(PLAYLISTS).join(format!("{}.json", id)), playlist)
    }

    pub fn save_schedule(&self, schedule: &Schedule) -> Result<(), EngineError> {
        self.write_record(
            &self
                .root
                .join(SCHEDULES)
                .join(format!("{}.json", schedule.id)),
            schedule,
        )
    }

    pub fn save_channel_outputs(&self, outputs: &[ChannelOutput]) -> Result<(), EngineError> {
        self.write_record(
            &self.root.join(OTHER).join(OUTPUTS),
            &Channels {
                channel_outputs: outputs.to_vec(),
            },
        )
    }

    pub fn save_models(&self, models: &[Model]) -> Result<(), EngineError> {
        self.write_record(
            &self.root.join(OTHER).join(MODELS),
            &Models {
                models: models.to_vec(),
            },
        )
    }

    fn read_record<T: DeserializeOwned>(
        &self,
        kind: &'static str,
        path: &Path,
    ) -> Result<T, EngineError> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(EngineError::not_found(kind, path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&raw).map_err(|e| ConfigError::Record(e).into())
    }

    fn write_record<T: Serialize>(&self, path: &Path, record: &T) -> Result<(), EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_vec_pretty(record).map_err(ConfigError::Record)?;
        fs::write(path, raw)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn load_playlist(&self, id: u32) -> Result<Playlist, EngineError> {
        self.read_record(
            "playlist",
            &self.root.join(PLAYLISTS).join(format!("{}.json", id)),
        )
    }

    fn load_schedule(&self, id: u32) -> Result<Schedule, EngineError> {
        self.read_record(
            "schedule",
            &self.root.join(SCHEDULES).join(format!("{}.json", id)),
        )
    }

    fn load_schedules(&self) -> Result<Vec<Schedule>, EngineError> {
        let dir = self.root.join(SCHEDULES);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut schedules = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            match self.read_record::<Schedule>("schedule", &path) {
                Ok(schedule) => schedules.push(schedule),
                Err(e) => warn!(
                    file = filename_display(&path),
                    err = e.to_string(),
                    "Skipping unreadable schedule."
                ),
            }
        }

        schedules.sort_by_key(|schedule| schedule.id);
        Ok(schedules)
    }

    fn load_channel_outputs(&self) -> Result<Vec<ChannelOutput>, EngineError> {
        Ok(self
            .read_record::<Channels>("channel outputs", &self.root.join(OTHER).join(OUTPUTS))?
            .channel_outputs)
    }

    fn load_models(&self) -> Result<Vec<Model>, EngineError> {
        Ok(self
            .read_record::<Models>("models", &self.root.join(OTHER).join(MODELS))?
            .models)
    }

    fn load_sequence_bytes(&self, name: &str) -> Result<Box<dyn SequenceSource>, EngineError> {
        let path = self.sequence_path(name)?;
        match fs::File::open(&path) {
            Ok(file) => Ok(Box::new(io::BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(EngineError::not_found("sequence", name))
            }
            Err(e) => Err(e.into()),
        }
    }
}
