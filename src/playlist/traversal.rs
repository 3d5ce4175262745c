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
use std::{collections::HashSet, fmt};

use rand::{rngs::StdRng, seq::SliceRandom};
use serde::Deserialize;

use crate::{
    config::{Playlist, PlaylistEntry},
    error::EngineError,
};

/// Where a playlist is in its traversal. Main indices count positions in the current
/// pass's play order, not in the main section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    LeadIn(usize),
    Main { index: usize, pass: u32 },
    LeadOut(usize),
    Finished,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::LeadIn(i) => write!(f, "lead-in {}", i),
            Position::Main { index, pass } => write!(f, "main {} (pass {})", index, pass),
            Position::LeadOut(i) => write!(f, "lead-out {}", i),
            Position::Finished => f.write_str("finished"),
        }
    }
}

/// What happens to play-once entries after they've played.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlayOncePolicy {
    /// Excluded from every later pass.
    #[default]
    AllPasses,
    /// Excluded from the following pass only.
    NextPass,
}

/// The traversal state of a playlist. Knows nothing about what entries play; the
/// caller reports whether each entry actually played when advancing.
pub struct Traversal {
    playlist: Playlist,
    policy: PlayOncePolicy,
    rng: StdRng,
    position: Position,
    /// Main section indices in play order for the current pass.
    order: Vec<usize>,
    /// Play-once entries excluded from the current pass.
    retired: HashSet<usize>,
    /// Play-once entries that played during the current pass.
    played_once: HashSet<usize>,
    played_in_pass: bool,
}

impl Traversal {
    pub fn new(
        playlist: Playlist,
        policy: PlayOncePolicy,
        rng: StdRng,
    ) -> Result<Traversal, EngineError> {
        // Disabled entries never play, so a playlist made only of them has nothing to start.
        if !playlist.entries().any(|entry| entry.enabled) {
            return Err(EngineError::PlaylistEmpty(playlist.name.clone()));
        }

        let mut traversal = Traversal {
            playlist,
            policy,
            rng,
            position: Position::Finished,
            order: Vec::new(),
            retired: HashSet::new(),
            played_once: HashSet::new(),
            played_in_pass: false,
        };
        traversal.position = if traversal.playlist.lead_in.is_empty() {
            traversal.enter_main(0)
        } else {
            Position::LeadIn(0)
        };

        Ok(traversal)
    }

    pub fn playlist(&self) -> &Playlist {
        &self.playlist
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// The entry at the current position, if any.
    pub fn current(&self) -> Option<&PlaylistEntry> {
        match self.position {
            Position::LeadIn(i) => self.playlist.lead_in.get(i),
            Position::Main { index, .. } => self
                .order
                .get(index)
                .and_then(|entry| self.playlist.main_playlist.get(*entry)),
            Position::LeadOut(i) => self.playlist.lead_out.get(i),
            Position::Finished => None,
        }
    }

    /// Moves past the current entry. `played` reports whether it produced any output.
    pub fn advance(&mut self, played: bool) -> Position {
        let current = self.position;
        self.position = match current {
            Position::LeadIn(i) if i + 1 < self.playlist.lead_in.len() => Position::LeadIn(i + 1),
            Position::LeadIn(_) => self.enter_main(0),
            Position::Main { index, pass } => {
                if played {
                    self.played_in_pass = true;
                    let entry = self.order[index];
                    if self.playlist.main_playlist[entry].play_once {
                        self.played_once.insert(entry);
                    }
                }

                if index + 1 < self.order.len() {
                    Position::Main {
                        index: index + 1,
                        pass,
                    }
                } else {
                    self.end_pass(pass)
                }
            }
            Position::LeadOut(i) if i + 1 < self.playlist.lead_out.len() => {
                Position::LeadOut(i + 1)
            }
            Position::LeadOut(_) | Position::Finished => Position::Finished,
        };

        self.position
    }

    fn end_pass(&mut self, pass: u32) -> Position {
        let next = pass + 1;
        let loops = self.playlist.repeat
            || (self.playlist.loop_count > 0 && next < self.playlist.loop_count);

        // A pass that played nothing would spin forever.
        if loops && self.played_in_pass {
            self.enter_main(next)
        } else {
            self.enter_lead_out()
        }
    }

    fn enter_main(&mut self, pass: u32) -> Position {
        let played_once = std::mem::take(&mut self.played_once);
        match self.policy {
            PlayOncePolicy::AllPasses => self.retired.extend(played_once),
            PlayOncePolicy::NextPass => self.retired = played_once,
        }

        self.order = self
            .playlist
            .main_playlist
            .iter()
            .enumerate()
            .filter(|(i, entry)| entry.enabled && !self.retired.contains(i))
            .map(|(i, _)| i)
            .collect();
        if self.playlist.random {
            self.order.shuffle(&mut self.rng);
        }
        self.played_in_pass = false;

        if self.order.is_empty() {
            self.enter_lead_out()
        } else {
            Position::Main { index: 0, pass }
        }
    }

    fn enter_lead_out(&mut self) -> Position {
        self.order.clear();
        if self.playlist.lead_out.is_empty() {
            Position::Finished
        } else {
            Position::LeadOut(0)
        }
    }
}
