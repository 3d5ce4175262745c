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
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, span, Level};

use super::{ChannelFrame, SequenceHandle};
use crate::error::EngineError;

type Answer = (u32, Result<ChannelFrame, EngineError>);

/// Reads frames on a worker thread so a slow disk can't stall the tick driver. A
/// request that isn't answered within the timeout fails with `SequenceUnavailable`;
/// the late answer is thrown away when it arrives.
pub struct Prefetcher {
    name: String,
    timeout: Duration,
    requests: Sender<u32>,
    answers: Receiver<Answer>,
}

impl Prefetcher {
    pub fn spawn(handle: SequenceHandle, timeout: Duration) -> Result<Prefetcher, EngineError> {
        let name = handle.meta().name.clone();
        let (requests, request_rx) = crossbeam_channel::unbounded::<u32>();
        let (answer_tx, answers) = crossbeam_channel::unbounded::<Answer>();

        let worker_name = name.clone();
        thread::Builder::new()
            .name("prefetch".to_string())
            .spawn(move || {
                let span = span!(Level::INFO, "prefetch", sequence = worker_name);
                let _enter = span.enter();

                while let Ok(mut index) = request_rx.recv() {
                    // Only the newest request matters.
                    while let Ok(newer) = request_rx.try_recv() {
                        index = newer;
                    }

                    if answer_tx.send((index, handle.frame(index))).is_err() {
                        break;
                    }
                }

                debug!("Prefetch worker exiting.");
            })?;

        Ok(Prefetcher {
            name,
            timeout,
            requests,
            answers,
        })
    }

    /// Fetches a frame, waiting at most the configured timeout.
    pub fn fetch(&self, index: u32) -> Result<ChannelFrame, EngineError> {
        if self.requests.send(index).is_err() {
            return Err(EngineError::SequenceUnavailable(self.name.clone()));
        }

        let deadline = Instant::now() + self.timeout;
        loop {
            match self.answers.recv_deadline(deadline) {
                Ok((answered, result)) if answered == index => return result,
                Ok((stale, _)) => debug!(frame = stale, "Dropping late frame."),
                Err(_) => return Err(EngineError::SequenceUnavailable(self.name.clone())),
            }
        }
    }
}
