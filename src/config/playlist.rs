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
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{boolean, default_true};
use crate::patterns::Generator;

/// What a playlist entry plays.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// A file-backed sequence.
    #[default]
    Sequence,
    /// A generated pattern. Requires a duration.
    Pattern,
    /// Emits nothing for the duration.
    Pause,
    #[serde(other)]
    Other,
}

/// A single entry of a playlist section.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct PlaylistEntry {
    #[serde(rename = "type", default)]
    pub kind: EntryKind,
    #[serde(rename = "sequenceName", default)]
    pub sequence_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Generator>,
    /// Seconds. When absent the duration of the sequence is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default = "default_true", deserialize_with = "boolean")]
    pub enabled: bool,
    #[serde(rename = "playOnce", default, deserialize_with = "boolean")]
    pub play_once: bool,
}

impl PlaylistEntry {
    /// Creates an enabled sequence entry.
    pub fn sequence(name: &str) -> PlaylistEntry {
        PlaylistEntry {
            kind: EntryKind::Sequence,
            sequence_name: name.to_string(),
            pattern: None,
            duration: None,
            enabled: true,
            play_once: false,
        }
    }

    /// The explicit duration of this entry, if it has a usable one.
    pub fn explicit_duration(&self) -> Option<Duration> {
        self.duration
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(Duration::from_secs_f64)
    }

    /// A name for the entry suitable for logging.
    pub fn label(&self) -> String {
        match self.kind {
            EntryKind::Pattern if self.sequence_name.is_empty() => "pattern".to_string(),
            EntryKind::Pause => "pause".to_string(),
            _ => self.sequence_name.clone(),
        }
    }
}

/// Totals derived from the entries of a playlist.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct PlaylistSummary {
    /// Seconds.
    pub total_duration: f64,
    pub total_items: usize,
}

/// A JSON representation of a playlist.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Playlist {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default, deserialize_with = "boolean")]
    pub repeat: bool,
    /// 0 plays the main section once, unless repeat is set.
    #[serde(rename = "loopCount", default)]
    pub loop_count: u32,
    #[serde(default, deserialize_with = "boolean")]
    pub random: bool,
    #[serde(rename = "leadIn", default)]
    pub lead_in: Vec<PlaylistEntry>,
    #[serde(rename = "mainPlaylist", default)]
    pub main_playlist: Vec<PlaylistEntry>,
    #[serde(rename = "leadOut", default)]
    pub lead_out: Vec<PlaylistEntry>,
    #[serde(rename = "playlistInfo", default, skip_serializing_if = "Option::is_none")]
    pub playlist_info: Option<PlaylistSummary>,
}

impl Playlist {
    /// Creates a playlist with only a main section.
    pub fn new(name: &str, main_playlist: Vec<PlaylistEntry>) -> Playlist {
        Playlist {
            name: name.to_string(),
            desc: String::new(),
            repeat: false,
            loop_count: 0,
            random: false,
            lead_in: Vec::new(),
            main_playlist,
            lead_out: Vec::new(),
            playlist_info: None,
        }
    }

    /// All entries in play order, ignoring repeats.
    pub fn entries(&self) -> impl Iterator<Item = &PlaylistEntry> {
        self.lead_in
            .iter()
            .chain(self.main_playlist.iter())
            .chain(self.lead_out.iter())
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::patterns::Generator;

    use super::{EntryKind, Playlist};

    #[test]
    fn test_parse_playlist() {
        let playlist: Playlist = serde_json::from_str(
            r#"{
                "name": "Holiday",
                "desc": "evening show",
                "repeat": 0,
                "loopCount": 2,
                "random": 1,
                "leadIn": [
                    {"type": "pattern", "pattern": {"solid": {"r": 255, "g": 0, "b": 0}}, "duration": 5}
                ],
                "mainPlaylist": [
                    {"type": "sequence", "sequenceName": "wizards.fseq", "enabled": 1, "playOnce": 0},
                    {"type": "sequence", "sequenceName": "carol.fseq", "playOnce": "yes"},
                    {"type": "pause", "duration": 2.5},
                    {"type": "media", "sequenceName": "song.mp3"}
                ]
            }"#,
        )
        .expect("playlist should parse");

        assert_eq!("Holiday", playlist.name);
        assert!(!playlist.repeat);
        assert!(playlist.random);
        assert_eq!(2, playlist.loop_count);
        assert!(playlist.lead_out.is_empty());

        let lead_in = &playlist.lead_in[0];
        assert_eq!(EntryKind::Pattern, lead_in.kind);
        assert!(matches!(lead_in.pattern, Some(Generator::Solid(_))));
        assert_eq!(Some(Duration::from_secs(5)), lead_in.explicit_duration());

        let main = &playlist.main_playlist;
        assert_eq!(EntryKind::Sequence, main[0].kind);
        assert!(main[0].enabled);
        assert!(!main[0].play_once);
        assert!(main[1].enabled);
        assert!(main[1].play_once);
        assert_eq!(EntryKind::Pause, main[2].kind);
        assert_eq!(Some(Duration::from_millis(2500)), main[2].explicit_duration());
        assert_eq!(EntryKind::Other, main[3].kind);
        assert_eq!(5, playlist.entries().count());
    }

    #[test]
    fn test_zero_duration_is_absent() {
        let playlist: Playlist = serde_json::from_str(
            r#"{"name": "p", "mainPlaylist": [{"sequenceName": "a.fseq", "duration": 0}]}"#,
        )
        .expect("playlist should parse");

        assert_eq!(EntryKind::Sequence, playlist.main_playlist[0].kind);
        assert_eq!(None, playlist.main_playlist[0].explicit_duration());
    }
}
