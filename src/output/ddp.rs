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
    collections::{HashMap, HashSet},
    net::UdpSocket,
};

use ddp_rs::{
    connection::DDPConnection,
    protocol::{PixelConfig, ID},
};
use tracing::{error, info, warn};

use super::{Target, Transport};
use crate::error::EngineError;

pub const DEFAULT_PORT: u16 = 4048;

/// Sends DDP over UDP, one connection per controller.
pub struct DdpSender {
    connections: HashMap<String, DDPConnection>,
    /// Addresses we've already complained about.
    unknown: HashSet<String>,
}

impl DdpSender {
    /// Opens a connection to every controller. Addresses are resolved here and never
    /// again; a controller that can't be reached is logged and left out.
    pub fn new<I, S>(port: u16, addresses: I) -> DdpSender
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut connections = HashMap::new();
        for address in addresses {
            let address = address.as_ref();
            match DdpSender::connect(address, port) {
                Ok(connection) => {
                    info!(address, port, "Opened DDP connection.");
                    connections.insert(address.to_string(), connection);
                }
                Err(e) => error!(address, err = e.to_string(), "Unable to open DDP connection."),
            }
        }

        DdpSender {
            connections,
            unknown: HashSet::new(),
        }
    }

    fn connect(address: &str, port: u16) -> Result<DDPConnection, EngineError> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        DDPConnection::try_new((address, port), PixelConfig::default(), ID::Default, socket)
            .map_err(|e| EngineError::Transport(format!("{}:{}: {:?}", address, port, e)))
    }
}

impl Transport for DdpSender {
    fn transmit(&mut self, target: &Target, data: &[u8]) {
        let Some(connection) = self.connections.get_mut(&target.address) else {
            if self.unknown.insert(target.address.clone()) {
                warn!(output = %target, "No DDP connection for address, dropping output.");
            }
            return;
        };

        if let Err(e) = connection.write_offset(data, target.offset) {
            error!(output = %target, err = format!("{:?}", e), "Error sending DDP.");
        }
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, net::UdpSocket, time::Duration};

    use crate::output::{Target, TargetKind, Transport};

    use super::DdpSender;

    fn target(address: &str, offset: u32) -> Target {
        Target {
            kind: TargetKind::Ddp,
            address: address.to_string(),
            universe: 1,
            offset,
        }
    }

    #[test]
    fn test_sender() -> Result<(), Box<dyn Error>> {
        let receiver = UdpSocket::bind("127.0.0.1:0")?;
        receiver.set_read_timeout(Some(Duration::from_secs(5)))?;
        let port = receiver.local_addr()?.port();

        let mut sender = DdpSender::new(port, ["127.0.0.1"]);
        sender.transmit(&target("127.0.0.1", 6), &[9, 8, 7]);

        let mut buf = [0u8; 2048];
        let len = receiver.recv(&mut buf)?;
        // Version 1 with the push flag on the only packet.
        assert_eq!(0x40, buf[0] & 0xC0);
        assert_eq!(0x01, buf[0] & 0x01);
        assert_eq!(6u32.to_be_bytes(), buf[4..8]);
        assert_eq!(3u16.to_be_bytes(), buf[8..10]);
        assert_eq!([9, 8, 7], buf[len - 3..len]);
        Ok(())
    }

    #[test]
    fn test_unreachable_addresses_are_dropped_up_front() -> Result<(), Box<dyn Error>> {
        let receiver = UdpSocket::bind("127.0.0.1:0")?;
        receiver.set_read_timeout(Some(Duration::from_millis(200)))?;
        let port = receiver.local_addr()?.port();

        let mut sender = DdpSender::new(port, ["127.0.0.1", "controller.invalid"]);
        assert_eq!(1, sender.connections.len());
        assert!(sender.connections.contains_key("127.0.0.1"));

        // Neither a failed nor an unconfigured address is looked up again.
        sender.transmit(&target("controller.invalid", 0), &[1]);
        sender.transmit(&target("10.0.0.1", 0), &[1]);
        sender.transmit(&target("10.0.0.1", 0), &[1]);
        assert_eq!(2, sender.unknown.len());

        let mut buf = [0u8; 64];
        assert!(receiver.recv(&mut buf).is_err());
        Ok(())
    }
}
