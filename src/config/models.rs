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
use serde::{Deserialize, Serialize};

/// A named block of channels, e.g. a single prop. Test patterns are addressed by model.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Model {
    #[serde(rename = "Name")]
    pub name: String,
    /// 1-based.
    #[serde(rename = "StartChannel")]
    pub start_channel: u32,
    #[serde(rename = "ChannelCount")]
    pub channel_count: u32,
}

/// The persisted model list.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Models {
    #[serde(default)]
    pub models: Vec<Model>,
}
