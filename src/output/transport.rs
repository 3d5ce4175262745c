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
use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{error, warn};

use crate::config;

use super::{
    ddp::DdpSender,
    ola_client::{OlaSender, RealOlaClient},
    Target, TargetKind, Transport,
};

/// Dispatches each universe to the transport for its kind.
pub struct Router {
    ola: Option<Box<dyn Transport>>,
    ddp: Option<Box<dyn Transport>>,
    /// Kinds we've already complained about.
    missing: HashSet<TargetKind>,
}

impl Router {
    pub fn new(ola: Option<Box<dyn Transport>>, ddp: Option<Box<dyn Transport>>) -> Router {
        Router {
            ola,
            ddp,
            missing: HashSet::new(),
        }
    }

    /// Opens the transports the universes need. A transport that can't be opened is
    /// logged and its universes are dropped.
    pub fn connect(
        config: &config::Player,
        destinations: &HashMap<TargetKind, BTreeSet<String>>,
    ) -> Router {
        let ola = if destinations.contains_key(&TargetKind::Ola) {
            match RealOlaClient::connect(config.ola_port()) {
                Ok(client) => Some(Box::new(OlaSender::new(Box::new(client))) as Box<dyn Transport>),
                Err(e) => {
                    error!(err = e.to_string(), "Unable to connect to OLA.");
                    None
                }
            }
        } else {
            None
        };

        let ddp = destinations.get(&TargetKind::Ddp).map(|addresses| {
            Box::new(DdpSender::new(config.ddp_port(), addresses)) as Box<dyn Transport>
        });

        Router::new(ola, ddp)
    }
}

impl Transport for Router {
    fn transmit(&mut self, target: &Target, data: &[u8]) {
        let transport = match target.kind {
            TargetKind::Ola => self.ola.as_mut(),
            TargetKind::Ddp => self.ddp.as_mut(),
        };

        match transport {
            Some(transport) => transport.transmit(target, data),
            None => {
                if self.missing.insert(target.kind) {
                    warn!(kind = ?target.kind, "No transport available, dropping output.");
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        output::{Target, TargetKind, Transport},
        testutil::RecordingTransport,
    };

    use super::Router;

    fn target(kind: TargetKind, universe: u32) -> Target {
        Target {
            kind,
            address: "10.0.0.1".to_string(),
            universe,
            offset: 0,
        }
    }

    #[test]
    fn test_routes_by_kind() {
        let ola = RecordingTransport::new();
        let ddp = RecordingTransport::new();
        let mut router = Router::new(Some(Box::new(ola.clone())), Some(Box::new(ddp.clone())));

        router.transmit(&target(TargetKind::Ola, 1), &[1]);
        router.transmit(&target(TargetKind::Ddp, 2), &[2]);

        assert_eq!(vec![vec![1]], ola.sent_to(1));
        assert!(ola.sent_to(2).is_empty());
        assert_eq!(vec![vec![2]], ddp.sent_to(2));
    }

    #[test]
    fn test_missing_transport_drops() {
        let ddp = RecordingTransport::new();
        let mut router = Router::new(None, Some(Box::new(ddp.clone())));
        router.transmit(&target(TargetKind::Ola, 1), &[1]);
        router.transmit(&target(TargetKind::Ola, 1), &[1]);
        assert!(ddp.sent().is_empty());
    }
}
