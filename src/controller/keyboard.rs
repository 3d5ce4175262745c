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
use std::{io, path::PathBuf};

use tokio::{sync::mpsc::Sender, task::JoinHandle};
use tracing::{info, span, warn, Level};

use super::Event;

const START: &str = "start";
const STOP: &str = "stop";
const STATUS: &str = "status";
const TEST: &str = "test";
const END_TEST: &str = "end-test";
const PLAY: &str = "play";

/// A controller that reads commands from stdin, one per line.
pub struct Driver {}

impl Driver {
    pub fn new() -> Driver {
        Driver {}
    }

    /// Turns a line of input into an event.
    fn parse(input: &str) -> Option<Event> {
        let mut words = input.split_whitespace();
        let command = words.next()?.to_lowercase();
        let argument = words.next();

        match (command.as_str(), argument) {
            (START, None) => Some(Event::Start),
            (STOP, None) => Some(Event::Stop),
            (STATUS, None) => Some(Event::Status),
            (END_TEST, None) => Some(Event::EndTest),
            (TEST, Some(path)) => Some(Event::Test(PathBuf::from(path))),
            (PLAY, Some(id)) => id.parse().ok().map(Event::Play),
            _ => None,
        }
    }

    /// Reads one command. Returns false at end of input.
    fn monitor_io<R, W>(
        events_tx: &Sender<Event>,
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Command ({}, {}, {}, {} <file>, {}, {} <id>): ",
            START, STOP, STATUS, TEST, END_TEST, PLAY,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }

        match Driver::parse(&input) {
            Some(event) => events_tx
                .blocking_send(event)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?,
            None => warn!(input = input.trim(), "Unrecognized input"),
        }
        Ok(true)
    }
}

impl super::Driver for Driver {
    fn monitor_events(&self, events_tx: Sender<Event>) -> JoinHandle<Result<(), io::Error>> {
        tokio::task::spawn_blocking(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&events_tx, io::stdin().lock(), io::stdout())? {}
            info!("Keyboard input closed.");
            Ok(())
        })
    }
}
