// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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
use core::fmt;
use std::time::Duration;

use rand::{rngs::StdRng, SeedableRng};
use tracing::{debug, info, span, warn, Level, Span};

use crate::{
    config::{EntryKind, Playlist, PlaylistEntry, PlaylistSummary},
    error::EngineError,
    patterns::Generator,
    sequences::{ChannelFrame, Prefetcher, SequenceMeta, SequenceStore},
    util::duration_display,
};

mod traversal;

pub use traversal::{PlayOncePolicy, Position, Traversal};

/// Settings shared by every playlist engine.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// How long to wait for a frame before repeating the previous one.
    pub read_timeout: Duration,
    pub play_once_policy: PlayOncePolicy,
    /// The channel count generated patterns are rendered at.
    pub pattern_channels: usize,
    /// How long each step of a generated pattern lasts.
    pub pattern_step: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            read_timeout: Duration::from_millis(10),
            play_once_policy: PlayOncePolicy::default(),
            pattern_channels: 0,
            pattern_step: Duration::from_millis(25),
        }
    }
}

enum Source {
    File {
        prefetcher: Prefetcher,
        meta: SequenceMeta,
    },
    Pattern(Generator),
    Pause,
}

struct ActiveEntry {
    label: String,
    source: Source,
    duration: Duration,
    elapsed: Duration,
}

/// Plays a single playlist: owns its traversal and the entry that's currently playing.
pub struct PlaylistEngine {
    id: u32,
    traversal: Traversal,
    store: SequenceStore,
    options: EngineOptions,
    active: Option<ActiveEntry>,
    last_frame: Option<ChannelFrame>,
    span: Span,
}

impl fmt::Display for PlaylistEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let playlist = self.traversal.playlist();
        writeln!(f, "Playlist {} ({}):", self.id, playlist.name)?;
        for (section, entries) in [
            ("Lead in", &playlist.lead_in),
            ("Main", &playlist.main_playlist),
            ("Lead out", &playlist.lead_out),
        ] {
            if entries.is_empty() {
                continue;
            }
            writeln!(f, "  {}:", section)?;
            for entry in entries.iter() {
                let duration = entry_duration(entry, &self.store);
                writeln!(
                    f,
                    "    - {} ({}){}",
                    entry.label(),
                    duration_display(duration),
                    if entry.enabled { "" } else { " [disabled]" }
                )?;
            }
        }

        let summary = self.summary();
        writeln!(
            f,
            "  Total: {} items, {}",
            summary.total_items,
            duration_display(Duration::from_secs_f64(summary.total_duration))
        )
    }
}

impl PlaylistEngine {
    pub fn new(
        id: u32,
        playlist: Playlist,
        store: SequenceStore,
        options: EngineOptions,
        rng: StdRng,
    ) -> Result<PlaylistEngine, EngineError> {
        let span = span!(Level::INFO, "playlist", id = id, name = playlist.name.clone());
        Ok(PlaylistEngine {
            id,
            traversal: Traversal::new(playlist, options.play_once_policy, rng)?,
            store,
            options,
            active: None,
            last_frame: None,
            span,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.traversal.playlist().name
    }

    pub fn position(&self) -> Position {
        self.traversal.position()
    }

    pub fn is_finished(&self) -> bool {
        self.traversal.position() == Position::Finished
    }

    /// The label of the entry that's playing, if one is.
    pub fn current_entry(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.label.as_str())
    }

    pub fn summary(&self) -> PlaylistSummary {
        summarize(self.traversal.playlist(), &self.store)
    }

    /// Produces the frame for the current tick and then moves time forward by `dt`.
    /// Entries that can't be started are skipped within the same tick.
    pub fn tick(&mut self, dt: Duration) -> Option<ChannelFrame> {
        let span = self.span.clone();
        let _enter = span.enter();

        if self.active.is_none() && !self.activate() {
            return None;
        }
        let active = self.active.as_mut()?;

        let mut failed = None;
        let frame = match &active.source {
            Source::File { prefetcher, meta } => {
                let index = frame_index(active.elapsed, meta);
                match prefetcher.fetch(index) {
                    Ok(frame) => {
                        self.last_frame = Some(frame.clone());
                        Some(frame)
                    }
                    Err(EngineError::SequenceUnavailable(_)) => {
                        debug!(frame = index, "Frame late, repeating the previous frame.");
                        self.last_frame.clone()
                    }
                    Err(e) => {
                        failed = Some(e);
                        self.last_frame.clone()
                    }
                }
            }
            Source::Pattern(generator) => {
                let step = if generator.moves() {
                    step_index(active.elapsed, self.options.pattern_step)
                } else {
                    0
                };
                Some(generator.frame_at(self.options.pattern_channels, step))
            }
            Source::Pause => None,
        };

        active.elapsed += dt;
        if let Some(e) = failed {
            warn!(
                entry = active.label,
                err = e.to_string(),
                "Entry failed while playing, moving on."
            );
            self.finish_entry();
        } else if active.elapsed >= active.duration {
            self.finish_entry();
        }

        frame
    }

    fn finish_entry(&mut self) {
        if let Some(active) = self.active.take() {
            debug!(entry = active.label, "Entry finished.");
        }
        let position = self.traversal.advance(true);
        if position == Position::Finished {
            info!("Playlist finished.");
        }
    }

    /// Starts the entry at the current position, skipping any that can't be played.
    /// Returns false once the playlist has finished.
    fn activate(&mut self) -> bool {
        while let Some(entry) = self.traversal.current().cloned() {
            let position = self.traversal.position();
            if !entry.enabled {
                debug!(entry = entry.label(), "Skipping disabled entry.");
                self.traversal.advance(false);
                continue;
            }

            match self.start_entry(&entry) {
                Ok(active) => {
                    info!(
                        entry = active.label,
                        position = position.to_string(),
                        duration = duration_display(active.duration),
                        "Starting entry."
                    );
                    self.active = Some(active);
                    return true;
                }
                Err(e) => {
                    warn!(
                        entry = entry.label(),
                        err = e.to_string(),
                        "Unable to start entry, skipping."
                    );
                    self.traversal.advance(false);
                }
            }
        }

        false
    }

    fn start_entry(&self, entry: &PlaylistEntry) -> Result<ActiveEntry, EngineError> {
        let label = entry.label();
        let (source, duration) = match entry.kind {
            EntryKind::Sequence => {
                let handle = self.store.resolve(&entry.sequence_name)?;
                let meta = handle.meta().clone();
                if meta.frame_count == 0 || meta.step_time_ms == 0 {
                    return Err(EngineError::SequenceUnavailable(format!(
                        "{} has no frames to play",
                        meta.name
                    )));
                }
                let duration = entry.explicit_duration().unwrap_or_else(|| meta.duration());
                let prefetcher = Prefetcher::spawn(handle, self.options.read_timeout)?;
                (Source::File { prefetcher, meta }, duration)
            }
            EntryKind::Pattern => {
                let generator = entry
                    .pattern
                    .clone()
                    .ok_or_else(|| EngineError::not_found("pattern", label.clone()))?;
                let duration = entry
                    .explicit_duration()
                    .ok_or_else(|| EngineError::not_found("pattern duration", label.clone()))?;
                (Source::Pattern(generator), duration)
            }
            EntryKind::Pause => {
                let duration = entry
                    .explicit_duration()
                    .ok_or_else(|| EngineError::not_found("pause duration", label.clone()))?;
                (Source::Pause, duration)
            }
            EntryKind::Other => return Err(EngineError::not_found("entry kind", label)),
        };

        Ok(ActiveEntry {
            label,
            source,
            duration,
            elapsed: Duration::ZERO,
        })
    }
}

/// The frame to show `elapsed` into a sequence. Wraps when an explicit duration is
/// longer than the sequence.
fn frame_index(elapsed: Duration, meta: &SequenceMeta) -> u32 {
    let step = step_index(elapsed, meta.step_time());
    (step % meta.frame_count.max(1) as u64) as u32
}

fn step_index(elapsed: Duration, step: Duration) -> u64 {
    if step.is_zero() {
        return 0;
    }
    (elapsed.as_micros() / step.as_micros()) as u64
}

fn entry_duration(entry: &PlaylistEntry, store: &SequenceStore) -> Duration {
    if let Some(duration) = entry.explicit_duration() {
        return duration;
    }
    if entry.kind != EntryKind::Sequence {
        return Duration::ZERO;
    }
    store
        .resolve(&entry.sequence_name)
        .map(|handle| handle.meta().duration())
        .unwrap_or(Duration::ZERO)
}

/// Totals the enabled entries of a playlist. Sequences that can't be resolved count
/// as zero length.
pub fn summarize(playlist: &Playlist, store: &SequenceStore) -> PlaylistSummary {
    let mut summary = PlaylistSummary::default();
    for entry in playlist.entries().filter(|entry| entry.enabled) {
        summary.total_duration += entry_duration(entry, store).as_secs_f64();
        summary.total_items += 1;
    }
    summary
}

/// Builds playlist engines from stored playlists.
#[derive(Clone)]
pub struct EngineFactory {
    store: SequenceStore,
    options: EngineOptions,
    shuffle_seed: Option<u64>,
}

impl EngineFactory {
    pub fn new(store: SequenceStore, options: EngineOptions, shuffle_seed: Option<u64>) -> Self {
        EngineFactory {
            store,
            options,
            shuffle_seed,
        }
    }

    /// Loads and starts the playlist with the given id.
    pub fn build(&self, id: u32) -> Result<PlaylistEngine, EngineError> {
        let playlist = self.store.storage().load_playlist(id)?;
        let rng = match self.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        PlaylistEngine::new(id, playlist, self.store.clone(), self.options.clone(), rng)
    }
}
