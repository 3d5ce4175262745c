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
    error::Error,
    net::TcpStream,
    sync::mpsc::{self, Receiver, Sender},
    thread::{self, JoinHandle},
    time::Duration,
};

use ola::{client::StreamingClientConfig, DmxBuffer, StreamingClient};
use tracing::{debug, error, info, warn};

use super::{Target, Transport};

/// Channels in a DMX universe.
pub const UNIVERSE_SIZE: usize = 512;

/// Sends DMX buffers to OLA.
pub trait OlaClient: Send {
    fn send_dmx(&mut self, universe: u32, buffer: &DmxBuffer) -> Result<(), Box<dyn Error>>;
}

pub struct RealOlaClient {
    client: StreamingClient<TcpStream>,
}

impl RealOlaClient {
    /// Connects to the local OLA daemon, retrying a few times while it starts up.
    pub fn connect(port: u16) -> Result<RealOlaClient, Box<dyn Error>> {
        let config = StreamingClientConfig {
            server_port: port,
            ..Default::default()
        };

        for i in 0..5 {
            if i > 0 {
                thread::sleep(Duration::from_secs(2));
            }

            if let Ok(client) = ola::connect_with_config(config.clone()) {
                info!(port, "Connected to OLA.");
                return Ok(RealOlaClient { client });
            };

            debug!("Error connecting to OLA, waiting 2 seconds and trying again.");
        }

        Err("unable to connect to OLA".into())
    }
}

impl OlaClient for RealOlaClient {
    fn send_dmx(&mut self, universe: u32, buffer: &DmxBuffer) -> Result<(), Box<dyn Error>> {
        self.client.send_dmx(universe, buffer)?;
        Ok(())
    }
}

struct DmxMessage {
    universe: u32,
    buffer: DmxBuffer,
}

/// Hands universes to a dedicated OLA thread so a slow daemon never holds up the tick.
pub struct OlaSender {
    /// The last state of every universe. Partial writes land on top of it.
    buffers: HashMap<u32, DmxBuffer>,
    sender: Option<Sender<DmxMessage>>,
    join_handle: Option<JoinHandle<()>>,
}

impl OlaSender {
    pub fn new(client: Box<dyn OlaClient>) -> OlaSender {
        let (sender, receiver) = mpsc::channel::<DmxMessage>();
        let join_handle = thread::spawn(move || Self::ola_thread(client, receiver));
        OlaSender {
            buffers: HashMap::new(),
            sender: Some(sender),
            join_handle: Some(join_handle),
        }
    }

    fn ola_thread(mut client: Box<dyn OlaClient>, receiver: Receiver<DmxMessage>) {
        while let Ok(message) = receiver.recv() {
            if let Err(err) = client.send_dmx(message.universe, &message.buffer) {
                error!(
                    universe = message.universe,
                    err = err.to_string(),
                    "Error sending DMX to OLA."
                );
            }
        }
    }
}

impl Transport for OlaSender {
    fn transmit(&mut self, target: &Target, data: &[u8]) {
        let start = target.offset as usize;
        if start + data.len() > UNIVERSE_SIZE {
            warn!(
                output = %target,
                channels = start + data.len(),
                "Universe is larger than 512 channels, truncating."
            );
        }

        let buffer = self
            .buffers
            .entry(target.universe)
            .or_insert_with(DmxBuffer::new);
        for (channel, value) in data
            .iter()
            .enumerate()
            .map(|(i, value)| (start + i, value))
            .take_while(|(channel, _)| *channel < UNIVERSE_SIZE)
        {
            buffer.set_channel(channel, *value);
        }
        let buffer = buffer.clone();

        if let Some(sender) = self.sender.as_ref() {
            if sender
                .send(DmxMessage {
                    universe: target.universe,
                    buffer,
                })
                .is_err()
            {
                error!("OLA thread has stopped.");
            }
        }
    }
}

impl Drop for OlaSender {
    fn drop(&mut self) {
        // Closing the channel ends the OLA thread.
        self.sender.take();
        if let Some(join_handle) = self.join_handle.take() {
            if join_handle.join().is_err() {
                error!("Error joining OLA thread.");
            }
        }
    }
}
