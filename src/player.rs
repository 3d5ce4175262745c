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
use std::{error::Error, fmt, sync::Arc, time::Duration};

use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, span, Level, Span};

use crate::{
    output::Multiplexer,
    playlist::{EngineFactory, PlaylistEngine},
    playsync::CancelHandle,
    scheduler::{Clock, SchedulerTask},
    storage::Storage,
    tester::{TestController, TestSpec},
};

mod priority;
mod ticker;

pub use ticker::Ticker;

/// What the player is doing, as seen by an operator.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    /// Playlists are running, either scheduled or played by hand.
    Start,
    Testing,
    #[default]
    Stop,
}

impl fmt::Display for PlayerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlayerStatus::Start => "start",
            PlayerStatus::Testing => "testing",
            PlayerStatus::Stop => "stop",
        })
    }
}

#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub status: PlayerStatus,
    pub playlist: Option<String>,
    pub entry: Option<String>,
    /// Scheduled playlists that have played to their end. The scheduler restarts
    /// a playlist that ends while its schedule is still active.
    #[serde(skip)]
    pub completed: u64,
}

/// Requests for the tick driver. Producers are moved in whole, never shared.
pub enum Command {
    /// The scheduler started with a new epoch.
    Start { epoch: u64 },
    Stop,
    Test(Box<TestController>),
    EndTest,
    Play(Box<PlaylistEngine>),
    /// A schedule change. `None` stops whatever the schedule was playing.
    Scheduled {
        epoch: u64,
        engine: Option<Box<PlaylistEngine>>,
    },
}

struct SchedulerHandle {
    join: JoinHandle<()>,
}

/// The operator facing controls. Everything is forwarded to the tick driver.
pub struct Player {
    commands: Sender<Command>,
    status: Arc<RwLock<SchedulerStatus>>,
    storage: Arc<dyn Storage>,
    factory: EngineFactory,
    clock: Clock,
    poll: Duration,
    /// The running scheduler and its epoch counter.
    scheduler: Mutex<(u64, Option<SchedulerHandle>)>,
    cancel_handle: CancelHandle,
    ticker: Option<std::thread::JoinHandle<()>>,
    span: Span,
}

impl Player {
    /// Creates the player and starts the tick driver.
    pub fn new(
        storage: Arc<dyn Storage>,
        factory: EngineFactory,
        multiplexer: Multiplexer,
        tick: Duration,
        poll: Duration,
        clock: Clock,
    ) -> Result<Player, Box<dyn Error>> {
        let (commands, receiver) = crossbeam_channel::unbounded();
        let status = Arc::new(RwLock::new(SchedulerStatus::default()));
        let cancel_handle = CancelHandle::new();
        let ticker =
            Ticker::new(receiver, multiplexer, status.clone(), tick).spawn(cancel_handle.clone())?;

        Ok(Player {
            commands,
            status,
            storage,
            factory,
            clock,
            poll,
            scheduler: Mutex::new((0, None)),
            cancel_handle,
            ticker: Some(ticker),
            span: span!(Level::INFO, "player"),
        })
    }

    fn send(&self, command: Command) -> Result<(), Box<dyn Error>> {
        self.commands
            .send(command)
            .map_err(|_| "the tick driver has stopped".into())
    }

    /// Starts the scheduler. Starting again forgets the active schedule, so it's
    /// issued again on the next poll.
    pub async fn start(&self) -> Result<(), Box<dyn Error>> {
        let _enter = self.span.enter();

        let mut scheduler = self.scheduler.lock();
        if let Some(handle) = scheduler.1.take() {
            handle.join.abort();
        }
        scheduler.0 += 1;
        let epoch = scheduler.0;

        self.send(Command::Start { epoch })?;
        let task = SchedulerTask::new(
            self.storage.clone(),
            self.factory.clone(),
            self.commands.clone(),
            self.status.clone(),
            epoch,
            self.clock.clone(),
        );
        scheduler.1 = Some(SchedulerHandle {
            join: tokio::spawn(task.run(self.poll)),
        });

        info!(epoch, "Started.");
        Ok(())
    }

    /// Stops the scheduler, the playlist and any test.
    pub async fn stop(&self) -> Result<(), Box<dyn Error>> {
        let _enter = self.span.enter();

        self.stop_scheduler();
        self.send(Command::Stop)?;
        info!("Stopped.");
        Ok(())
    }

    fn stop_scheduler(&self) {
        let mut scheduler = self.scheduler.lock();
        if let Some(handle) = scheduler.1.take() {
            handle.join.abort();
        }
        // Anything the old scheduler already sent is now stale.
        scheduler.0 += 1;
    }

    /// Shows test patterns on models until `end_test`. Fails without changing
    /// anything if a model is unknown.
    pub async fn test(&self, spec: TestSpec) -> Result<(), Box<dyn Error>> {
        let storage = self.storage.clone();
        let controller = tokio::task::spawn_blocking(move || {
            let models = storage.load_models()?;
            TestController::start(spec, &models)
        })
        .await??;

        self.send(Command::Test(Box::new(controller)))?;
        self.span.in_scope(|| info!("Test started."));
        Ok(())
    }

    pub async fn end_test(&self) -> Result<(), Box<dyn Error>> {
        let _enter = self.span.enter();
        self.send(Command::EndTest)?;
        info!("Test ended.");
        Ok(())
    }

    /// Plays a playlist by hand. The scheduler is stopped so it doesn't take over.
    pub async fn play(&self, id: u32) -> Result<(), Box<dyn Error>> {
        let factory = self.factory.clone();
        let engine = tokio::task::spawn_blocking(move || factory.build(id)).await??;

        self.stop_scheduler();
        self.span
            .in_scope(|| info!(playlist = engine.name(), "Playing."));
        self.send(Command::Play(Box::new(engine)))
    }

    pub fn status(&self) -> SchedulerStatus {
        self.status.read().clone()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if let Some(handle) = self.scheduler.lock().1.take() {
            handle.join.abort();
        }
        self.cancel_handle.cancel();
        if let Some(ticker) = self.ticker.take() {
            if ticker.join().is_err() {
                error!("Error joining the tick driver.");
            }
        }
    }
}
