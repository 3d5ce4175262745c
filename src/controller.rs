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
use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{error, info, span, Instrument, Level};

use crate::{player::Player, tester::TestSpec};

pub mod keyboard;
pub mod serial;

/// Operator events that drive the player.
#[derive(Debug, PartialEq)]
pub enum Event {
    /// Starts the scheduler, or restarts it so the active schedule is issued again.
    Start,

    /// Stops the scheduler, the playlist and any test.
    Stop,

    /// Reports the player status.
    Status,

    /// Starts the test patterns in the given file.
    Test(PathBuf),

    EndTest,

    /// Plays the playlist with the given id, bypassing the scheduler.
    Play(u32),
}

pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>>;
}

/// Feeds operator events to a player.
pub struct Controller {
    handle: JoinHandle<()>,
}

impl Controller {
    /// Creates a new controller with the given driver.
    pub fn new(player: Arc<Player>, driver: Arc<dyn Driver>) -> Controller {
        let span = span!(Level::INFO, "controller");
        Controller {
            handle: tokio::spawn(Controller::trigger_events(player, driver).instrument(span)),
        }
    }

    /// Join will block until the controller finishes.
    pub async fn join(&mut self) -> Result<(), JoinError> {
        (&mut self.handle).await
    }

    async fn trigger_events(player: Arc<Player>, driver: Arc<dyn Driver>) {
        let (events_tx, mut events_rx) = mpsc::channel(1);
        let join_handle = driver.monitor_events(events_tx);

        info!(status = player.status().status.to_string(), "Controller started.");

        while let Some(event) = events_rx.recv().await {
            info!(event = format!("{:?}", event), "Received event.");
            if let Err(e) = Controller::handle(&player, event).await {
                error!("Error talking to player: {}", e);
            }
        }

        info!("Controller closing.");
        match join_handle.await {
            Ok(Err(e)) => error!("Event monitor failed: {}", e),
            Err(e) => error!("Error waiting for event monitor to stop: {}", e),
            Ok(Ok(())) => {}
        }
    }

    async fn handle(player: &Player, event: Event) -> Result<(), Box<dyn Error>> {
        match event {
            Event::Start => player.start().await,
            Event::Stop => player.stop().await,
            Event::Status => {
                let status = serde_json::to_string(&player.status())?;
                info!(status, "Player status.");
                println!("{}", status);
                Ok(())
            }
            Event::Test(path) => {
                let spec = TestSpec::load(&path)?;
                player.test(spec).await
            }
            Event::EndTest => player.end_test().await,
            Event::Play(id) => player.play(id).await,
        }
    }
}
