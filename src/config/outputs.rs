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
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{boolean, default_true};

/// A JSON representation of a universe: a fixed block of channels routed to one
/// controller.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Universe {
    /// The universe number on the controller.
    pub id: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true", deserialize_with = "boolean")]
    pub active: bool,
    /// The controller address. Unused by OLA universes.
    #[serde(default)]
    pub address: String,
    /// The first channel of the universe within the show, 1-based.
    #[serde(rename = "startChannel")]
    pub start_channel: u32,
    #[serde(rename = "channelCount")]
    pub channel_count: u32,
    #[serde(rename = "deDuplicate", default, deserialize_with = "boolean")]
    pub de_duplicate: bool,
    /// Higher wins when universes share an address.
    #[serde(default)]
    pub priority: u8,
    #[serde(default, deserialize_with = "boolean")]
    pub monitor: bool,
    #[serde(rename = "type")]
    pub universe_type: u8,
    /// Milliseconds without data before the universe is blanked. 0 defers to the output.
    #[serde(default)]
    pub timeout: u32,
}

impl Universe {
    /// The zero-based channel range this universe covers.
    pub fn channel_range(&self) -> std::ops::Range<usize> {
        let start = self.start_channel.saturating_sub(1) as usize;
        start..start + self.channel_count as usize
    }
}

/// A JSON representation of an output group owning a set of universes.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ChannelOutput {
    #[serde(rename = "type", default)]
    pub channel_type: String,
    #[serde(rename = "startChannel", default)]
    pub start_channel: u32,
    #[serde(default = "default_true", deserialize_with = "boolean")]
    pub enabled: bool,
    /// Fallback inactivity timeout for universes that don't set their own.
    #[serde(default)]
    pub timeout: u32,
    #[serde(rename = "channelCount", default)]
    pub channel_count: i64,
    #[serde(default)]
    pub universes: Vec<Universe>,
}

impl ChannelOutput {
    /// The inactivity timeout for the given universe, if blanking is enabled.
    pub fn timeout_for(&self, universe: &Universe) -> Option<Duration> {
        let millis = if universe.timeout > 0 {
            universe.timeout
        } else {
            self.timeout
        };

        (millis > 0).then(|| Duration::from_millis(millis.into()))
    }
}

/// The persisted set of channel outputs.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct Channels {
    #[serde(rename = "channelOutputs", default)]
    pub channel_outputs: Vec<ChannelOutput>,
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::Channels;

    const OUTPUTS: &str = r#"{
        "channelOutputs": [
            {
                "type": "universes",
                "startChannel": 1,
                "enabled": 1,
                "timeout": 1000,
                "channelCount": 1020,
                "universes": [
                    {
                        "active": 1,
                        "description": "porch",
                        "id": 1,
                        "startChannel": 1,
                        "channelCount": 510,
                        "type": 4,
                        "address": "10.0.0.20",
                        "priority": 0,
                        "monitor": 1,
                        "deDuplicate": 0
                    },
                    {
                        "active": "yes",
                        "description": "tree",
                        "id": 2,
                        "startChannel": 511,
                        "channelCount": 510,
                        "type": 4,
                        "address": "10.0.0.21",
                        "priority": 5,
                        "monitor": 0,
                        "deDuplicate": 1,
                        "timeout": 250
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_outputs() {
        let channels: Channels = serde_json::from_str(OUTPUTS).expect("outputs should parse");
        assert_eq!(1, channels.channel_outputs.len());

        let output = &channels.channel_outputs[0];
        assert!(output.enabled);
        assert_eq!(2, output.universes.len());

        let porch = &output.universes[0];
        assert!(porch.active);
        assert!(porch.monitor);
        assert!(!porch.de_duplicate);
        assert_eq!(0..510, porch.channel_range());
        assert_eq!(Some(Duration::from_millis(1000)), output.timeout_for(porch));

        let tree = &output.universes[1];
        assert!(tree.active);
        assert!(tree.de_duplicate);
        assert_eq!(5, tree.priority);
        assert_eq!(510..1020, tree.channel_range());
        assert_eq!(Some(Duration::from_millis(250)), output.timeout_for(tree));
    }
}
