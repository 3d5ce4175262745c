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
use std::io;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::{
    io::AsyncRead,
    sync::mpsc::Sender,
    task::{JoinHandle, JoinSet},
};
use tokio_serial::SerialPortBuilderExt;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, error, info, span, Instrument, Level};

use super::Event;
use crate::config::player::{Button, ButtonAction};

/// Longest report line accepted from a button board.
const MAX_LINE: usize = 256;

/// A state report from a button board. Boards print one per line.
#[derive(Deserialize)]
struct Report {
    input: bool,
}

/// A controller fed by buttons on serial ports.
pub struct Driver {
    buttons: Vec<Button>,
}

impl Driver {
    pub fn new(buttons: Vec<Button>) -> Driver {
        Driver { buttons }
    }

    fn event(action: &ButtonAction) -> Event {
        match action {
            ButtonAction::Start => Event::Start,
            ButtonAction::Stop => Event::Stop,
            ButtonAction::EndTest => Event::EndTest,
            ButtonAction::Play(id) => Event::Play(*id),
            ButtonAction::Test(path) => Event::Test(path.clone()),
        }
    }

    /// Reads reports until the port closes. Every press sends the button's event.
    async fn watch<R>(
        reader: R,
        action: ButtonAction,
        events_tx: Sender<Event>,
    ) -> Result<(), io::Error>
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE));
        while let Some(line) = lines.next().await {
            let line = line.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            match serde_json::from_str::<Report>(line.trim()) {
                Ok(Report { input: true }) => {
                    info!(action = format!("{:?}", action), "Button pressed.");
                    if events_tx.send(Driver::event(&action)).await.is_err() {
                        return Ok(());
                    }
                }
                Ok(Report { input: false }) => {}
                Err(_) => debug!(line = line.as_str(), "Ignoring unrecognized button report."),
            }
        }
        Ok(())
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        let buttons = self.buttons.clone();
        tokio::spawn(async move {
            info!(buttons = buttons.len(), "Serial button driver started.");

            let mut listeners = JoinSet::new();
            for button in buttons {
                let events_tx = events_tx.clone();
                let span = span!(Level::INFO, "button", device = button.device.as_str());
                listeners.spawn(
                    async move {
                        let port = tokio_serial::new(&button.device, button.baud_rate())
                            .open_native_async()
                            .map_err(io::Error::from)?;
                        info!(baud_rate = button.baud_rate(), "Listening for presses.");
                        Driver::watch(port, button.action, events_tx).await
                    }
                    .instrument(span),
                );
            }
            drop(events_tx);

            while let Some(result) = listeners.join_next().await {
                match result {
                    Ok(Err(e)) => error!(err = e.to_string(), "Button listener stopped."),
                    Err(e) => error!(err = e.to_string(), "Button listener panicked."),
                    Ok(Ok(())) => {}
                }
            }
            info!("Serial buttons closed.");
            Ok(())
        })
    }
}
