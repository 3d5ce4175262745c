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
use serde::{Deserialize, Serialize};

use crate::sequences::ChannelFrame;

mod colormap;

pub use colormap::Colormap;

/// An 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Color {
        Color { r, g, b }
    }

    fn channel(&self, index: usize) -> u8 {
        match index % 3 {
            0 => self.r,
            1 => self.g,
            _ => self.b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Chase {
    pub color: Color,
    /// The number of lit channels.
    pub width: usize,
}

/// A generated sequence. Frames depend only on the generator, the channel count and
/// the step index.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Generator {
    Solid(Color),
    Chase(Chase),
    Pattern(Colormap),
    MovingPattern(Colormap),
    CustomPattern(Vec<Color>),
    CustomMovingPattern(Vec<Color>),
}

impl Generator {
    /// Whether frames change with the step index.
    pub fn moves(&self) -> bool {
        match self {
            Generator::Solid(_) | Generator::Pattern(_) | Generator::CustomPattern(_) => false,
            Generator::Chase(_) | Generator::MovingPattern(_) | Generator::CustomMovingPattern(_) => {
                true
            }
        }
    }

    pub fn frame_at(&self, channel_count: usize, step: u64) -> ChannelFrame {
        frame_at(self, channel_count, step)
    }
}

/// Synthesizes the frame for a generator at the given step.
pub fn frame_at(generator: &Generator, channel_count: usize, step: u64) -> ChannelFrame {
    let data = match generator {
        Generator::Solid(color) => pixels(channel_count, |_| *color),
        Generator::Chase(chase) => {
            let mut data = vec![0u8; channel_count];
            if channel_count > 0 {
                let start = (step % channel_count as u64) as usize;
                for lit in 0..chase.width.min(channel_count) {
                    let channel = (start + lit) % channel_count;
                    data[channel] = chase.color.channel(channel);
                }
            }
            data
        }
        Generator::Pattern(map) => {
            let gradient = map.gradient();
            let count = pixel_count(channel_count);
            pixels(channel_count, |pixel| {
                colormap::sample(gradient.as_ref(), position(pixel, count))
            })
        }
        Generator::MovingPattern(map) => {
            let gradient = map.gradient();
            let count = pixel_count(channel_count);
            let shift = (step % count.max(1) as u64) as usize;
            pixels(channel_count, |pixel| {
                colormap::sample(gradient.as_ref(), position((pixel + shift) % count, count))
            })
        }
        Generator::CustomPattern(colors) => tiled(channel_count, colors, 0),
        Generator::CustomMovingPattern(colors) => tiled(channel_count, colors, step),
    };

    ChannelFrame::new(0, data)
}

fn pixel_count(channel_count: usize) -> usize {
    channel_count.div_ceil(3)
}

/// Position of a pixel in [0, 1].
fn position(pixel: usize, count: usize) -> f64 {
    if count <= 1 {
        0.0
    } else {
        pixel as f64 / (count - 1) as f64
    }
}

/// Lays a color per pixel across the channels. A trailing partial pixel only gets the
/// channels that fit.
fn pixels(channel_count: usize, color_of: impl Fn(usize) -> Color) -> Vec<u8> {
    let mut data = Vec::with_capacity(channel_count);
    for pixel in 0..pixel_count(channel_count) {
        let color = color_of(pixel);
        for component in [color.r, color.g, color.b] {
            if data.len() == channel_count {
                break;
            }
            data.push(component);
        }
    }
    data
}

fn tiled(channel_count: usize, colors: &[Color], step: u64) -> Vec<u8> {
    if colors.is_empty() {
        return vec![0u8; channel_count];
    }
    let rotation = (step % colors.len() as u64) as usize;
    pixels(channel_count, |pixel| colors[(pixel + rotation) % colors.len()])
}
