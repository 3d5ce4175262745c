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
    io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use tracing::{debug, info, span, warn, Level};

use crate::{
    output::Multiplexer, playlist::PlaylistEngine, playsync::CancelHandle,
    tester::TestController,
};

use super::{priority, Command, PlayerStatus, SchedulerStatus};

/// Ticks behind schedule before the driver stops trying to catch up.
const MAX_BEHIND: u32 = 4;

/// The fixed rate driver. Owns the active producers and the multiplexer, so
/// nothing else ever touches them.
pub struct Ticker {
    commands: Receiver<Command>,
    multiplexer: Multiplexer,
    status: Arc<RwLock<SchedulerStatus>>,
    tick: Duration,
    engine: Option<Box<PlaylistEngine>>,
    test: Option<Box<TestController>>,
    /// Only scheduled commands from this epoch are accepted.
    epoch: Option<u64>,
    base: PlayerStatus,
    /// Scheduled engines that ran to their end.
    completed: u64,
}

impl Ticker {
    pub fn new(
        commands: Receiver<Command>,
        multiplexer: Multiplexer,
        status: Arc<RwLock<SchedulerStatus>>,
        tick: Duration,
    ) -> Ticker {
        Ticker {
            commands,
            multiplexer,
            status,
            tick,
            engine: None,
            test: None,
            epoch: None,
            base: PlayerStatus::Stop,
            completed: 0,
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Start { epoch } => {
                info!(epoch, "Scheduler started.");
                self.epoch = Some(epoch);
                self.base = PlayerStatus::Start;
            }
            Command::Stop => {
                match self.engine.take() {
                    Some(engine) => info!(
                        playlist = engine.name(),
                        position = %engine.position(),
                        "Stopping playlist."
                    ),
                    None => info!("Stopping."),
                }
                self.epoch = None;
                self.end_test();
                self.base = PlayerStatus::Stop;
            }
            Command::Test(test) => {
                self.end_test();
                self.test = Some(test);
            }
            Command::EndTest => self.end_test(),
            Command::Play(engine) => {
                info!(playlist = engine.name(), id = engine.id(), "Playing playlist.");
                self.epoch = None;
                self.engine = Some(engine);
                self.base = PlayerStatus::Start;
            }
            Command::Scheduled { epoch, engine } => {
                if self.epoch != Some(epoch) {
                    debug!(epoch, "Ignoring a stale schedule change.");
                    return;
                }
                if let Some(engine) = engine.as_ref() {
                    info!(playlist = engine.name(), "Scheduled playlist starting.");
                }
                self.engine = engine;
            }
        }
    }

    fn end_test(&mut self) {
        if let Some(mut test) = self.test.take() {
            test.stop();
        }
    }

    /// Runs a single tick: drains commands, produces a frame and hands it to the
    /// multiplexer. `now` is the logical time of the tick.
    pub fn step(&mut self, now: Instant) {
        while let Ok(command) = self.commands.try_recv() {
            self.handle(command);
        }

        // A running test preempts the playlist without advancing it.
        let frame = if let Some(test) = self.test.as_mut() {
            let frame = test.frame();
            test.advance(self.tick);
            Some(frame)
        } else if let Some(engine) = self.engine.as_mut() {
            engine.tick(self.tick)
        } else {
            None
        };

        self.multiplexer.tick(now, frame.as_ref());

        if self.engine.as_ref().is_some_and(|engine| engine.is_finished()) {
            self.engine = None;
            if self.epoch.is_some() {
                self.completed += 1;
            } else {
                // A manually played playlist leaves nothing running behind it.
                self.base = PlayerStatus::Stop;
            }
        }

        self.publish();
    }

    fn publish(&self) {
        let status = SchedulerStatus {
            status: if self.test.is_some() {
                PlayerStatus::Testing
            } else {
                self.base
            },
            playlist: self.engine.as_ref().map(|engine| engine.name().to_string()),
            entry: self
                .engine
                .as_ref()
                .and_then(|engine| engine.current_entry())
                .map(str::to_string),
            completed: self.completed,
        };

        let mut current = self.status.write();
        if *current != status {
            *current = status;
        }
    }

    /// Starts the driver on its own thread. It runs until the cancel handle is cancelled.
    pub fn spawn(mut self, cancel_handle: CancelHandle) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("ticker".to_string())
            .spawn(move || {
                let span = span!(Level::INFO, "ticker");
                let _enter = span.enter();

                priority::raise_current_thread();
                info!(tick = format!("{:?}", self.tick), "Tick driver started.");

                let mut last_time = Instant::now();
                while !cancel_handle.is_cancelled() {
                    self.step(last_time);

                    last_time += self.tick;
                    let now = Instant::now();
                    if last_time > now {
                        spin_sleep::sleep(last_time - now);
                    } else if now - last_time > self.tick * MAX_BEHIND {
                        warn!(
                            behind = format!("{:?}", now - last_time),
                            "Tick driver fell behind, skipping ahead."
                        );
                        last_time = now;
                    }
                }

                for (target, stats) in self.multiplexer.stats() {
                    debug!(
                        output = %target,
                        sent = stats.sent,
                        deduplicated = stats.deduplicated,
                        suppressed = stats.suppressed,
                        blanked = stats.blanked,
                        "Universe totals."
                    );
                }
                info!("Tick driver stopped.");
            })
    }
}
