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
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::playlist::PlayOncePolicy;

/// The default tick of the frame driver.
pub const DEFAULT_TICK: Duration = Duration::from_millis(25);
/// The default schedule evaluation cadence.
pub const DEFAULT_SCHEDULE_POLL: Duration = Duration::from_secs(1);
/// How long a frame read may take before the previous frame is repeated.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(10);
/// Number of frames pulled from a sequence file per read.
pub const DEFAULT_READ_AHEAD_FRAMES: u32 = 64;
/// The default OLA daemon port.
pub const DEFAULT_OLA_PORT: u16 = 9010;

/// The input driver used to control the player.
#[derive(Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    #[default]
    None,
    Keyboard,
    Serial,
}

/// The default serial speed of a button board.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// What a button press does.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    Start,
    Stop,
    EndTest,
    Play(u32),
    Test(PathBuf),
}

/// A button board attached to a serial port.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Button {
    pub device: String,
    pub baud_rate: Option<u32>,
    pub action: ButtonAction,
}

impl Button {
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE)
    }
}

/// The configuration for the show player.
#[derive(Deserialize, Clone, Debug)]
pub struct Player {
    /// The root directory of the persisted records and sequence files.
    storage: String,
    /// The fixed tick of the frame driver.
    tick: Option<String>,
    /// How often schedules are evaluated. Must be a second or less.
    schedule_poll: Option<String>,
    /// How long to wait for a frame before repeating the previous one.
    read_timeout: Option<String>,
    /// How many frames to read from a sequence file at a time.
    read_ahead_frames: Option<u32>,
    /// Whether the scheduler starts when the player starts.
    auto_start: Option<bool>,
    /// What happens to play-once entries on later passes.
    play_once_policy: Option<PlayOncePolicy>,
    /// Seeds the random shuffle of the main section.
    shuffle_seed: Option<u64>,
    /// The port of the OLA daemon.
    ola_port: Option<u16>,
    /// The port DDP packets are sent to.
    ddp_port: Option<u16>,
    /// The controller driver.
    controller: Option<ControllerKind>,
    /// Buttons read by the serial controller.
    buttons: Option<Vec<Button>>,
}

impl Player {
    /// Parses a player configuration. The format is picked from the file extension.
    pub fn deserialize(path: &Path) -> Result<Player, ConfigError> {
        let player = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Player>()?;
        player.validate()?;
        Ok(player)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tick()?.is_zero() {
            return Err(ConfigError::Invalid {
                field: "tick",
                reason: "must be greater than zero".into(),
            });
        }

        let poll = self.schedule_poll()?;
        if poll.is_zero() || poll > DEFAULT_SCHEDULE_POLL {
            return Err(ConfigError::Invalid {
                field: "schedule_poll",
                reason: format!("must be between 0s and 1s, got {:?}", poll),
            });
        }

        if self.controller() == ControllerKind::Serial && self.buttons().is_empty() {
            return Err(ConfigError::Invalid {
                field: "buttons",
                reason: "the serial controller needs at least one button".into(),
            });
        }

        if self.read_ahead_frames == Some(0) {
            return Err(ConfigError::Invalid {
                field: "read_ahead_frames",
                reason: "must be at least 1".into(),
            });
        }

        Ok(())
    }

    /// Gets the storage root.
    pub fn storage(&self) -> PathBuf {
        PathBuf::from(&self.storage)
    }

    /// Gets the frame driver tick.
    pub fn tick(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.tick, DEFAULT_TICK)
    }

    /// Gets the schedule evaluation cadence.
    pub fn schedule_poll(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.schedule_poll, DEFAULT_SCHEDULE_POLL)
    }

    /// Gets the frame read timeout.
    pub fn read_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.read_timeout, DEFAULT_READ_TIMEOUT)
    }

    /// Gets the number of frames read at a time.
    pub fn read_ahead_frames(&self) -> u32 {
        self.read_ahead_frames.unwrap_or(DEFAULT_READ_AHEAD_FRAMES)
    }

    /// Whether the scheduler should start immediately.
    pub fn auto_start(&self) -> bool {
        self.auto_start.unwrap_or(true)
    }

    /// Gets the play-once policy.
    pub fn play_once_policy(&self) -> PlayOncePolicy {
        self.play_once_policy.unwrap_or_default()
    }

    /// Gets the shuffle seed, if any.
    pub fn shuffle_seed(&self) -> Option<u64> {
        self.shuffle_seed
    }

    /// Gets the OLA daemon port.
    pub fn ola_port(&self) -> u16 {
        self.ola_port.unwrap_or(DEFAULT_OLA_PORT)
    }

    /// Gets the DDP port.
    pub fn ddp_port(&self) -> u16 {
        self.ddp_port.unwrap_or(crate::output::ddp::DEFAULT_PORT)
    }

    /// Gets the controller driver.
    pub fn controller(&self) -> ControllerKind {
        self.controller.unwrap_or_default()
    }

    /// Gets the serial buttons.
    pub fn buttons(&self) -> Vec<Button> {
        self.buttons.clone().unwrap_or_default()
    }
}

fn parse_duration(value: &Option<String>, default: Duration) -> Result<Duration, ConfigError> {
    value.as_ref().map_or(Ok(default), |duration| {
        Ok(DurationString::from_string(duration.clone())?.into())
    })
}

#[cfg(test)]
mod test {
    use std::{error::Error, fs, time::Duration};

    use crate::{config::player::ControllerKind, playlist::PlayOncePolicy};

    use super::{Button, ButtonAction, Player};

    #[test]
    fn test_defaults() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("player.yaml");
        fs::write(&path, "storage: /var/lib/ledshow\n")?;

        let player = Player::deserialize(&path)?;
        assert_eq!(Duration::from_millis(25), player.tick()?);
        assert_eq!(Duration::from_secs(1), player.schedule_poll()?);
        assert_eq!(Duration::from_millis(10), player.read_timeout()?);
        assert_eq!(64, player.read_ahead_frames());
        assert!(player.auto_start());
        assert_eq!(PlayOncePolicy::AllPasses, player.play_once_policy());
        assert_eq!(None, player.shuffle_seed());
        assert_eq!(4048, player.ddp_port());
        assert_eq!(ControllerKind::None, player.controller());
        Ok(())
    }

    #[test]
    fn test_overrides() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("player.yaml");
        fs::write(
            &path,
            "storage: /srv/show
tick: 50ms
schedule_poll: 500ms
read_timeout: 5ms
read_ahead_frames: 8
auto_start: false
play_once_policy: next_pass
shuffle_seed: 42
controller: keyboard
",
        )?;

        let player = Player::deserialize(&path)?;
        assert_eq!(Duration::from_millis(50), player.tick()?);
        assert_eq!(Duration::from_millis(500), player.schedule_poll()?);
        assert_eq!(Duration::from_millis(5), player.read_timeout()?);
        assert_eq!(8, player.read_ahead_frames());
        assert!(!player.auto_start());
        assert_eq!(PlayOncePolicy::NextPass, player.play_once_policy());
        assert_eq!(Some(42), player.shuffle_seed());
        assert_eq!(ControllerKind::Keyboard, player.controller());
        Ok(())
    }

    #[test]
    fn test_buttons() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("player.yaml");
        fs::write(
            &path,
            "storage: /srv/show
controller: serial
buttons:
  - device: /dev/ttyUSB0
    action: start
  - device: /dev/ttyUSB1
    baud_rate: 115200
    action:
      play: 3
",
        )?;

        let player = Player::deserialize(&path)?;
        assert_eq!(ControllerKind::Serial, player.controller());
        let buttons = player.buttons();
        assert_eq!(
            vec![
                Button {
                    device: "/dev/ttyUSB0".to_string(),
                    baud_rate: None,
                    action: ButtonAction::Start,
                },
                Button {
                    device: "/dev/ttyUSB1".to_string(),
                    baud_rate: Some(115200),
                    action: ButtonAction::Play(3),
                },
            ],
            buttons
        );
        assert_eq!(9600, buttons[0].baud_rate());

        // A serial controller with nothing to read is a mistake.
        fs::write(&path, "storage: /srv/show\ncontroller: serial\n")?;
        assert!(Player::deserialize(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_slow_schedule_poll_rejected() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("player.yaml");
        fs::write(&path, "storage: /srv/show\nschedule_poll: 5s\n")?;

        assert!(Player::deserialize(&path).is_err());
        Ok(())
    }
}
