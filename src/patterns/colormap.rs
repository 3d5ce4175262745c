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
use colorgrad::Gradient;
use serde::{Deserialize, Serialize};

use super::Color;

/// Named colormaps for the pattern generators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Colormap {
    Spectral,

    Blues,
    Greens,
    Greys,
    Oranges,
    Purples,
    Reds,

    Turbo,
    Viridis,
    Inferno,
    Magma,
    Plasma,
    Cividis,
    Warm,
    Cool,
    CubeHelix,

    Sinebow,
    Rainbow,
}

impl Colormap {
    pub const ALL: [Colormap; 18] = [
        Colormap::Spectral,
        Colormap::Blues,
        Colormap::Greens,
        Colormap::Greys,
        Colormap::Oranges,
        Colormap::Purples,
        Colormap::Reds,
        Colormap::Turbo,
        Colormap::Viridis,
        Colormap::Inferno,
        Colormap::Magma,
        Colormap::Plasma,
        Colormap::Cividis,
        Colormap::Warm,
        Colormap::Cool,
        Colormap::CubeHelix,
        Colormap::Sinebow,
        Colormap::Rainbow,
    ];

    /// Builds the gradient for this map. Callers evaluating many positions should
    /// build it once per frame.
    pub fn gradient(&self) -> Box<dyn Gradient> {
        use colorgrad::preset;

        match self {
            Colormap::Spectral => Box::new(preset::spectral()),
            Colormap::Blues => Box::new(preset::blues()),
            Colormap::Greens => Box::new(preset::greens()),
            Colormap::Greys => Box::new(preset::greys()),
            Colormap::Oranges => Box::new(preset::oranges()),
            Colormap::Purples => Box::new(preset::purples()),
            Colormap::Reds => Box::new(preset::reds()),
            Colormap::Turbo => Box::new(preset::turbo()),
            Colormap::Viridis => Box::new(preset::viridis()),
            Colormap::Inferno => Box::new(preset::inferno()),
            Colormap::Magma => Box::new(preset::magma()),
            Colormap::Plasma => Box::new(preset::plasma()),
            Colormap::Cividis => Box::new(preset::cividis()),
            Colormap::Warm => Box::new(preset::warm()),
            Colormap::Cool => Box::new(preset::cool()),
            Colormap::CubeHelix => Box::new(preset::cubehelix_default()),
            Colormap::Sinebow => Box::new(preset::sinebow()),
            Colormap::Rainbow => Box::new(preset::rainbow()),
        }
    }
}

/// Evaluates a gradient at `t` in [0, 1].
pub fn sample(gradient: &dyn Gradient, t: f64) -> Color {
    let [r, g, b, _] = gradient.at(t.clamp(0.0, 1.0) as f32).to_rgba8();
    Color::new(r, g, b)
}

#[cfg(test)]
mod test {
    use super::{sample, Colormap};

    #[test]
    fn test_every_map_varies() {
        for map in Colormap::ALL {
            let gradient = map.gradient();
            assert_ne!(
                sample(gradient.as_ref(), 0.0),
                sample(gradient.as_ref(), 0.5),
                "{:?} should change across its range",
                map
            );
        }
    }

    #[test]
    fn test_sequential_endpoints() {
        let greys = Colormap::Greys.gradient();
        let light = sample(greys.as_ref(), 0.0);
        let dark = sample(greys.as_ref(), 1.0);
        assert!(light.r > 240 && light.g > 240 && light.b > 240);
        assert!(dark.r < 15 && dark.g < 15 && dark.b < 15);

        let blues = Colormap::Blues.gradient();
        let deep = sample(blues.as_ref(), 1.0);
        assert!(deep.b > deep.r);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let viridis = Colormap::Viridis.gradient();
        assert_eq!(sample(viridis.as_ref(), 0.0), sample(viridis.as_ref(), -2.0));
        assert_eq!(sample(viridis.as_ref(), 1.0), sample(viridis.as_ref(), 7.5));
    }
}
