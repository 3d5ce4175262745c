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
use std::{fs, path::Path};

use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::Value;

use self::error::ConfigError;

pub mod error;
pub mod models;
pub mod outputs;
pub mod player;
pub mod playlist;
pub mod schedule;

pub use self::models::Model;
pub use self::outputs::{ChannelOutput, Universe};
pub use self::player::Player;
pub use self::playlist::{EntryKind, Playlist, PlaylistEntry, PlaylistSummary};
pub use self::schedule::Schedule;

/// Persisted records come from a number of authoring tools, which disagree on how a
/// boolean is spelled. Accepts true/false, numbers (non-zero is true) and "yes"/"true".
pub(crate) fn boolean<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => s.eq_ignore_ascii_case("yes") || s.eq_ignore_ascii_case("true"),
        Value::Number(num) => {
            num.as_f64()
                .ok_or_else(|| serde::de::Error::custom("invalid number"))?
                != 0.0
        }
        Value::Null => false,
        _ => return Err(serde::de::Error::custom("wrong type, expected boolean")),
    })
}

pub(crate) fn default_true() -> bool {
    true
}

/// Reads a JSON or YAML document, picked by file extension. YAML goes through a
/// JSON value first so that enums are written as `solid: {...}` in both formats
/// rather than with YAML tags.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|e| ConfigError::Invalid {
        field: "document",
        reason: format!("{}: {}", path.display(), e),
    })?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => {
            let yaml: serde_yml::Value = serde_yml::from_str(&raw)?;
            Ok(serde_json::from_value(serde_json::to_value(yaml)?)?)
        }
        _ => Ok(serde_json::from_str(&raw)?),
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, fs};

    use serde::Deserialize;

    use crate::patterns::{Chase, Color, Generator};

    #[derive(Deserialize)]
    struct Flag {
        #[serde(deserialize_with = "super::boolean")]
        flag: bool,
    }

    fn parse(json: &str) -> bool {
        serde_json::from_str::<Flag>(json)
            .expect("flag should parse")
            .flag
    }

    #[test]
    fn test_boolean_spellings() {
        assert!(parse(r#"{"flag": true}"#));
        assert!(!parse(r#"{"flag": false}"#));
        assert!(parse(r#"{"flag": 1}"#));
        assert!(!parse(r#"{"flag": 0}"#));
        assert!(parse(r#"{"flag": "yes"}"#));
        assert!(!parse(r#"{"flag": "no"}"#));
        assert!(!parse(r#"{"flag": null}"#));
        assert!(serde_json::from_str::<Flag>(r#"{"flag": []}"#).is_err());
    }

    #[test]
    fn test_read_document_untagged_enums() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let yaml = dir.path().join("pattern.yml");
        fs::write(
            &yaml,
            "chase:\n  color:\n    r: 255\n    g: 0\n    b: 16\n  width: 3\n",
        )?;
        let json = dir.path().join("pattern.json");
        fs::write(
            &json,
            r#"{"chase": {"color": {"r": 255, "g": 0, "b": 16}, "width": 3}}"#,
        )?;

        let expected = Generator::Chase(Chase {
            color: Color::new(255, 0, 16),
            width: 3,
        });
        assert_eq!(expected, super::read_document::<Generator>(&yaml)?);
        assert_eq!(expected, super::read_document::<Generator>(&json)?);

        let named = dir.path().join("named.yaml");
        fs::write(&named, "moving_pattern: viridis\n")?;
        assert!(matches!(
            super::read_document::<Generator>(&named)?,
            Generator::MovingPattern(_)
        ));

        assert!(super::read_document::<Generator>(&dir.path().join("missing.yaml")).is_err());
        Ok(())
    }
}
