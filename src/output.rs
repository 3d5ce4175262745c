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
    collections::{BTreeSet, HashMap},
    fmt,
    ops::Range,
    time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{config::ChannelOutput, sequences::ChannelFrame};

pub mod ddp;
pub mod ola_client;
mod transport;

pub use transport::Router;

/// How a universe's data leaves the box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// E1.31 through the local OLA daemon.
    Ola,
    Ddp,
}

impl TargetKind {
    /// Maps the persisted universe type to a transport.
    pub fn from_universe_type(universe_type: u8) -> Option<TargetKind> {
        match universe_type {
            0 | 1 => Some(TargetKind::Ola),
            4 | 5 => Some(TargetKind::Ddp),
            _ => None,
        }
    }
}

/// Where a universe slice is sent.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Target {
    pub kind: TargetKind,
    pub address: String,
    pub universe: u32,
    /// Channel offset on the receiving controller. For OLA this is the channel
    /// within the universe.
    pub offset: u32,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}#{}", self.kind, self.address, self.universe)
    }
}

/// Sends universe data. Failures are logged by the implementation and never
/// reported back to the multiplexer.
pub trait Transport: Send {
    fn transmit(&mut self, target: &Target, data: &[u8]);
}

/// Per-universe counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub sent: u64,
    pub deduplicated: u64,
    pub suppressed: u64,
    pub blanked: u64,
}

struct Slot {
    target: Target,
    description: String,
    channels: Range<usize>,
    de_duplicate: bool,
    priority: u8,
    monitor: bool,
    timeout: Option<Duration>,
    last_sent: Option<Vec<Piece>>,
    last_data: Option<Instant>,
    blanked: bool,
    stats: Stats,
}

/// A run of channels sent at an offset in the slot's address space.
type Piece = (u32, Vec<u8>);

/// Slots only compete with slots in the same space: the whole controller for DDP,
/// a single universe id for OLA.
#[derive(PartialEq, Eq)]
enum Space<'a> {
    Ddp(&'a str),
    Ola(&'a str, u32),
}

impl Slot {
    fn space(&self) -> Space<'_> {
        match self.target.kind {
            TargetKind::Ddp => Space::Ddp(&self.target.address),
            TargetKind::Ola => Space::Ola(&self.target.address, self.target.universe),
        }
    }

    /// The channels this slot covers in its space.
    fn span(&self) -> Range<u32> {
        self.target.offset..self.target.offset + self.channels.len() as u32
    }

    /// The universe's slice of the frame, zero filled where the frame doesn't reach.
    fn extract(&self, frame: &ChannelFrame) -> Option<Vec<u8>> {
        let domain = frame.channels();
        let start = self.channels.start.max(domain.start);
        let end = self.channels.end.min(domain.end);
        if start >= end {
            return None;
        }

        let mut data = vec![0u8; self.channels.len()];
        data[start - self.channels.start..end - self.channels.start]
            .copy_from_slice(&frame.data()[start - domain.start..end - domain.start]);
        Some(data)
    }

    fn timed_out(&self, now: Instant) -> bool {
        match (self.timeout, self.last_data) {
            (Some(timeout), Some(last)) => !self.blanked && now.duration_since(last) >= timeout,
            _ => false,
        }
    }
}

/// Fans frames out to the configured universes.
pub struct Multiplexer {
    slots: Vec<Slot>,
    transport: Box<dyn Transport>,
}

impl Multiplexer {
    /// Builds the universe table. Inactive universes, disabled outputs and
    /// unsupported universe types are left out.
    pub fn new(outputs: &[ChannelOutput], transport: Box<dyn Transport>) -> Multiplexer {
        let mut slots = Vec::new();
        for output in outputs.iter() {
            if !output.enabled {
                info!(output = output.channel_type, "Skipping disabled output.");
                continue;
            }

            for universe in output.universes.iter().filter(|u| u.active) {
                let Some(kind) = TargetKind::from_universe_type(universe.universe_type) else {
                    warn!(
                        universe = universe.id,
                        universe_type = universe.universe_type,
                        "Unsupported universe type, skipping."
                    );
                    continue;
                };
                let offset = match universe.universe_type {
                    // Raw channel numbers address the controller by our channel number.
                    4 => universe.start_channel.saturating_sub(1),
                    _ => 0,
                };

                slots.push(Slot {
                    target: Target {
                        kind,
                        address: universe.address.clone(),
                        universe: universe.id,
                        offset,
                    },
                    description: universe.description.clone(),
                    channels: universe.channel_range(),
                    de_duplicate: universe.de_duplicate,
                    priority: universe.priority,
                    monitor: universe.monitor,
                    timeout: output.timeout_for(universe),
                    last_sent: None,
                    last_data: None,
                    blanked: false,
                    stats: Stats::default(),
                });
            }
        }

        info!(universes = slots.len(), "Built channel outputs.");
        Multiplexer { slots, transport }
    }

    /// The number of channels needed to cover every universe.
    pub fn channel_span(&self) -> usize {
        self.slots.iter().map(|s| s.channels.end).max().unwrap_or(0)
    }

    /// The transports the configured universes need and the addresses each one sends to.
    pub fn destinations(outputs: &[ChannelOutput]) -> HashMap<TargetKind, BTreeSet<String>> {
        let mut destinations: HashMap<TargetKind, BTreeSet<String>> = HashMap::new();
        for universe in outputs
            .iter()
            .filter(|output| output.enabled)
            .flat_map(|output| output.universes.iter())
            .filter(|universe| universe.active)
        {
            if let Some(kind) = TargetKind::from_universe_type(universe.universe_type) {
                destinations
                    .entry(kind)
                    .or_default()
                    .insert(universe.address.clone());
            }
        }
        destinations
    }

    pub fn stats(&self) -> impl Iterator<Item = (&Target, &Stats)> {
        self.slots.iter().map(|slot| (&slot.target, &slot.stats))
    }

    /// Distributes one frame. `None` means nothing is producing output this tick.
    pub fn tick(&mut self, now: Instant, frame: Option<&ChannelFrame>) {
        let mut pending: Vec<Option<Vec<u8>>> = Vec::with_capacity(self.slots.len());
        for slot in self.slots.iter_mut() {
            let data = frame.and_then(|frame| slot.extract(frame));
            if data.is_some() {
                if slot.blanked && slot.monitor {
                    debug!(universe = slot.target.universe, "Universe resumed.");
                }
                slot.last_data = Some(now);
                slot.blanked = false;
                pending.push(data);
            } else if slot.timed_out(now) {
                slot.blanked = true;
                slot.stats.blanked += 1;
                if slot.monitor {
                    debug!(
                        universe = slot.target.universe,
                        stats = format!("{:?}", slot.stats),
                        "Universe timed out, blanking."
                    );
                }
                pending.push(Some(vec![0u8; slot.channels.len()]));
            } else {
                pending.push(None);
            }
        }

        let pieces = self.arbitrate(pending);

        for (slot, pieces) in self.slots.iter_mut().zip(pieces) {
            if pieces.is_empty() {
                continue;
            }
            if slot.de_duplicate && slot.last_sent.as_ref() == Some(&pieces) {
                slot.stats.deduplicated += 1;
                continue;
            }

            for (offset, data) in pieces.iter() {
                if *offset == slot.target.offset {
                    self.transport.transmit(&slot.target, data);
                } else {
                    let target = Target {
                        offset: *offset,
                        ..slot.target.clone()
                    };
                    self.transport.transmit(&target, data);
                }
            }
            slot.last_sent = Some(pieces);
            slot.stats.sent += 1;
        }
    }

    /// Cuts each slot's data down to the channels no other slot in its space claims
    /// first. A slot loses channels to a higher priority slot with data, and to an
    /// earlier configured slot of the same priority.
    fn arbitrate(&mut self, pending: Vec<Option<Vec<u8>>>) -> Vec<Vec<Piece>> {
        let mut result = Vec::with_capacity(pending.len());
        for (i, data) in pending.iter().enumerate() {
            let Some(data) = data else {
                result.push(Vec::new());
                continue;
            };

            let slot = &self.slots[i];
            let span = slot.span();
            let mut kept = vec![span.clone()];
            for (j, other) in self.slots.iter().enumerate() {
                if j == i || pending[j].is_none() || other.space() != slot.space() {
                    continue;
                }
                let wins = other.priority > slot.priority
                    || (other.priority == slot.priority && j < i);
                if wins {
                    let claimed = other.span();
                    kept = kept
                        .into_iter()
                        .flat_map(|range| subtract(range, &claimed))
                        .collect();
                }
            }

            if kept.len() != 1 || kept[0] != span {
                self.slots[i].stats.suppressed += 1;
            }
            result.push(
                kept.into_iter()
                    .map(|range| {
                        let start = (range.start - span.start) as usize;
                        let end = (range.end - span.start) as usize;
                        (range.start, data[start..end].to_vec())
                    })
                    .collect(),
            );
        }
        result
    }
}

/// The parts of `range` outside `claimed`.
fn subtract(range: Range<u32>, claimed: &Range<u32>) -> Vec<Range<u32>> {
    if claimed.end <= range.start || claimed.start >= range.end {
        return vec![range];
    }

    let mut left = Vec::with_capacity(2);
    if claimed.start > range.start {
        left.push(range.start..claimed.start);
    }
    if claimed.end < range.end {
        left.push(claimed.end..range.end);
    }
    left
}

impl fmt::Display for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Universes:")?;
        for slot in self.slots.iter() {
            writeln!(
                f,
                "  {} ({}): channels {}-{}, priority {}",
                slot.target,
                slot.description,
                slot.channels.start + 1,
                slot.channels.end,
                slot.priority
            )?;
        }
        Ok(())
    }
}
