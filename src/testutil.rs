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
use std::{
    collections::HashMap,
    io::Cursor,
    sync::Arc,
    thread,
    time::{Duration, SystemTime},
};

use chrono::NaiveDate;
use parking_lot::Mutex;

use crate::{
    config::{ChannelOutput, Model, Playlist, Schedule, Universe},
    error::EngineError,
    fseq::{self, Layout, Variable},
    output::{Target, Transport},
    storage::{SequenceSource, Storage},
};

/// Wait for the given predicate to return true or fail.
#[inline]
pub fn eventually<F>(predicate: F, error_msg: &str)
where
    F: Fn() -> bool,
{
    let start = SystemTime::now();
    let mut tick = Duration::from_millis(5);
    let timeout = Duration::from_secs(10);
    let max_tick = Duration::from_millis(100);

    loop {
        let elapsed = start.elapsed().expect("System time error");
        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate() {
            return;
        }

        thread::sleep(tick);
        tick = std::cmp::min(tick * 2, max_tick);
    }
}

/// Wait for the given async predicate to return true or fail.
#[inline]
pub async fn eventually_async<F, Fut>(mut predicate: F, error_msg: &str)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = SystemTime::now();
    let tick = Duration::from_millis(10);
    let timeout = Duration::from_secs(5);

    loop {
        let elapsed = start.elapsed().expect("System time error");
        if elapsed > timeout {
            panic!("{}", error_msg);
        }
        if predicate().await {
            return;
        }
        tokio::time::sleep(tick).await;
    }
}

/// Encodes an uncompressed sequence file.
pub fn fseq_bytes(channel_count: u32, step_time_ms: u8, frames: Vec<Vec<u8>>) -> Vec<u8> {
    fseq_bytes_with(channel_count, step_time_ms, frames, Vec::new())
}

pub fn fseq_bytes_with(
    channel_count: u32,
    step_time_ms: u8,
    frames: Vec<Vec<u8>>,
    variables: Vec<Variable>,
) -> Vec<u8> {
    let mut layout = Layout::new(channel_count, step_time_ms);
    layout.variables = variables;
    let mut buf = Vec::new();
    fseq::write(&mut buf, &layout, frames.len() as u32, frames)
        .expect("sequence should encode");
    buf
}

/// A schedule that runs every day of the years around now.
pub fn schedule(id: u32, playlist_id: u32, start: &str, end: &str) -> Schedule {
    let time = |raw: &str| {
        chrono::NaiveTime::parse_from_str(raw, "%H:%M").expect("test time should parse")
    };
    Schedule {
        id,
        name: format!("schedule {}", id),
        playlist_id,
        enabled: true,
        start_date: NaiveDate::from_ymd_opt(2000, 1, 1).expect("valid date"),
        end_date: NaiveDate::from_ymd_opt(2099, 12, 31).expect("valid date"),
        start_time: time(start),
        end_time: time(end),
        monday: true,
        tuesday: true,
        wednesday: true,
        thursday: true,
        friday: true,
        saturday: true,
        sunday: true,
    }
}

/// A DDP universe.
pub fn universe(id: u32, address: &str, start_channel: u32, channel_count: u32) -> Universe {
    Universe {
        id,
        description: String::new(),
        active: true,
        address: address.to_string(),
        start_channel,
        channel_count,
        de_duplicate: false,
        priority: 0,
        monitor: false,
        universe_type: 4,
        timeout: 0,
    }
}

pub fn output(universes: Vec<Universe>) -> ChannelOutput {
    ChannelOutput {
        channel_type: "universes".to_string(),
        start_channel: 1,
        enabled: true,
        timeout: 0,
        channel_count: -1,
        universes,
    }
}

/// Records every transmit call.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<(Target, Vec<u8>)>>>,
}

impl RecordingTransport {
    pub fn new() -> RecordingTransport {
        RecordingTransport::default()
    }

    pub fn sent(&self) -> Vec<(Target, Vec<u8>)> {
        self.sent.lock().clone()
    }

    /// Everything sent to the given universe id, in order.
    pub fn sent_to(&self, universe: u32) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .iter()
            .filter(|(target, _)| target.universe == universe)
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl Transport for RecordingTransport {
    fn transmit(&mut self, target: &Target, data: &[u8]) {
        self.sent.lock().push((target.clone(), data.to_vec()));
    }
}

#[derive(Default)]
struct Records {
    playlists: HashMap<u32, Playlist>,
    schedules: HashMap<u32, Schedule>,
    sequences: HashMap<String, Vec<u8>>,
    outputs: Option<Vec<ChannelOutput>>,
    models: Option<Vec<Model>>,
}

/// Storage held in memory. Clones share the same records.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    records: Arc<Mutex<Records>>,
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }

    pub fn add_sequence(&self, name: &str, bytes: Vec<u8>) {
        self.records
            .lock()
            .sequences
            .insert(name.to_string(), bytes);
    }

    pub fn add_playlist(&self, id: u32, playlist: Playlist) {
        self.records.lock().playlists.insert(id, playlist);
    }

    pub fn add_schedule(&self, schedule: Schedule) {
        self.records.lock().schedules.insert(schedule.id, schedule);
    }

    pub fn remove_schedule(&self, id: u32) {
        self.records.lock().schedules.remove(&id);
    }

    pub fn set_outputs(&self, outputs: Vec<ChannelOutput>) {
        self.records.lock().outputs = Some(outputs);
    }

    pub fn set_models(&self, models: Vec<Model>) {
        self.records.lock().models = Some(models);
    }
}

impl Storage for MemoryStorage {
    fn load_playlist(&self, id: u32) -> Result<Playlist, EngineError> {
        self.records
            .lock()
            .playlists
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("playlist", id.to_string()))
    }

    fn load_schedule(&self, id: u32) -> Result<Schedule, EngineError> {
        self.records
            .lock()
            .schedules
            .get(&id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("schedule", id.to_string()))
    }

    fn load_schedules(&self) -> Result<Vec<Schedule>, EngineError> {
        let mut schedules: Vec<Schedule> =
            self.records.lock().schedules.values().cloned().collect();
        schedules.sort_by_key(|schedule| schedule.id);
        Ok(schedules)
    }

    fn load_channel_outputs(&self) -> Result<Vec<ChannelOutput>, EngineError> {
        self.records
            .lock()
            .outputs
            .clone()
            .ok_or_else(|| EngineError::not_found("channel outputs", "memory"))
    }

    fn load_models(&self) -> Result<Vec<Model>, EngineError> {
        self.records
            .lock()
            .models
            .clone()
            .ok_or_else(|| EngineError::not_found("models", "memory"))
    }

    fn load_sequence_bytes(&self, name: &str) -> Result<Box<dyn SequenceSource>, EngineError> {
        let bytes = self
            .records
            .lock()
            .sequences
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::not_found("sequence", name))?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}
