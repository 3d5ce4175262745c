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
use std::{collections::HashMap, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    config::{self, error::ConfigError, Model},
    error::EngineError,
    patterns::Generator,
    sequences::ChannelFrame,
};

/// Patterns to show on models while testing the physical setup.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TestSpec {
    /// Model name to pattern.
    pub tests: HashMap<String, Generator>,
    pub step_ms: u64,
}

impl TestSpec {
    /// Reads a test spec from a JSON or YAML file.
    pub fn load(path: &Path) -> Result<TestSpec, ConfigError> {
        config::read_document(path)
    }
}

struct ModelTest {
    name: String,
    offset: usize,
    channel_count: usize,
    generator: Generator,
}

/// Steps test patterns on a fixed interval. The frame only depends on the step
/// index, so stopping and restarting shows the same output.
pub struct TestController {
    tests: Vec<ModelTest>,
    step: Duration,
    elapsed: Duration,
    running: bool,
    channels: std::ops::Range<usize>,
}

impl TestController {
    /// Resolves every test name to a model. Fails if any model is unknown.
    pub fn start(spec: TestSpec, models: &[Model]) -> Result<TestController, EngineError> {
        let mut tests = Vec::with_capacity(spec.tests.len());
        for (name, generator) in spec.tests {
            let model = models
                .iter()
                .find(|model| model.name == name)
                .ok_or_else(|| EngineError::not_found("model", name.clone()))?;
            tests.push(ModelTest {
                name,
                offset: model.start_channel.saturating_sub(1) as usize,
                channel_count: model.channel_count as usize,
                generator,
            });
        }
        // Later models win where they overlap, so keep the order stable.
        tests.sort_by(|a, b| a.name.cmp(&b.name));

        let start = tests.iter().map(|t| t.offset).min().unwrap_or(0);
        let end = tests
            .iter()
            .map(|t| t.offset + t.channel_count)
            .max()
            .unwrap_or(0);

        info!(
            models = tests.len(),
            step_ms = spec.step_ms,
            "Starting test patterns."
        );

        Ok(TestController {
            tests,
            step: Duration::from_millis(spec.step_ms.max(1)),
            elapsed: Duration::ZERO,
            running: true,
            channels: start..end,
        })
    }

    pub fn step_index(&self) -> u64 {
        (self.elapsed.as_micros() / self.step.as_micros()) as u64
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// The frame for a single model.
    pub fn current_frame(&self, name: &str) -> Result<ChannelFrame, EngineError> {
        let test = self
            .tests
            .iter()
            .find(|test| test.name == name)
            .ok_or_else(|| EngineError::not_found("test", name))?;
        let frame = test.generator.frame_at(test.channel_count, self.step_index());
        Ok(ChannelFrame::new(test.offset, frame.data().to_vec()))
    }

    /// All models combined into one frame. Channels between models are zero.
    pub fn frame(&self) -> ChannelFrame {
        let mut data = vec![0u8; self.channels.len()];
        let step = self.step_index();
        for test in self.tests.iter() {
            let frame = test.generator.frame_at(test.channel_count, step);
            let at = test.offset - self.channels.start;
            data[at..at + test.channel_count].copy_from_slice(frame.data());
        }
        ChannelFrame::new(self.channels.start, data)
    }

    /// Moves the test clock forward. Does nothing once stopped.
    pub fn advance(&mut self, dt: Duration) {
        if self.running {
            self.elapsed += dt;
        }
    }

    pub fn stop(&mut self) {
        if self.running {
            info!(steps = self.step_index(), "Stopping test patterns.");
        }
        self.running = false;
    }
}

#[cfg(test)]
mod test {
    use std::{collections::HashMap, error::Error, fs, time::Duration};

    use crate::{
        config::Model,
        error::EngineError,
        patterns::{Chase, Color, Generator},
    };

    use super::{TestController, TestSpec};

    fn models() -> Vec<Model> {
        vec![
            Model {
                name: "arch".into(),
                start_channel: 4,
                channel_count: 6,
            },
            Model {
                name: "star".into(),
                start_channel: 13,
                channel_count: 3,
            },
            Model {
                name: "unused".into(),
                start_channel: 100,
                channel_count: 3,
            },
        ]
    }

    fn spec() -> TestSpec {
        TestSpec {
            tests: HashMap::from([
                (
                    "arch".to_string(),
                    Generator::Chase(Chase {
                        color: Color::new(1, 2, 3),
                        width: 1,
                    }),
                ),
                ("star".to_string(), Generator::Solid(Color::new(7, 8, 9))),
            ]),
            step_ms: 100,
        }
    }

    #[test]
    fn test_composite_frame() -> Result<(), Box<dyn Error>> {
        let mut controller = TestController::start(spec(), &models())?;

        let frame = controller.frame();
        assert_eq!(3, frame.channels().start);
        assert_eq!(
            vec![1, 0, 0, 0, 0, 0, 0, 0, 0, 7, 8, 9],
            frame.data()
        );

        controller.advance(Duration::from_millis(50));
        assert_eq!(0, controller.step_index());
        controller.advance(Duration::from_millis(50));
        assert_eq!(1, controller.step_index());

        let arch = controller.current_frame("arch")?;
        assert_eq!(3, arch.offset());
        assert_eq!(vec![0, 2, 0, 0, 0, 0], arch.data());
        assert!(controller.current_frame("tree").is_err());
        Ok(())
    }

    #[test]
    fn test_stop_halts_stepping() -> Result<(), Box<dyn Error>> {
        let mut controller = TestController::start(spec(), &models())?;
        controller.advance(Duration::from_millis(250));
        controller.stop();
        assert!(!controller.is_running());
        controller.advance(Duration::from_secs(5));
        assert_eq!(2, controller.step_index());
        Ok(())
    }

    #[test]
    fn test_unknown_model() {
        let mut spec = spec();
        spec.tests
            .insert("tree".to_string(), Generator::Solid(Color::new(1, 1, 1)));
        assert!(matches!(
            TestController::start(spec, &models()),
            Err(EngineError::NotFound { kind: "model", .. })
        ));
    }

    #[test]
    fn test_zero_step_is_clamped() -> Result<(), Box<dyn Error>> {
        let mut spec = spec();
        spec.step_ms = 0;
        let mut controller = TestController::start(spec, &models())?;
        controller.advance(Duration::from_millis(3));
        assert_eq!(3, controller.step_index());
        Ok(())
    }

    #[test]
    fn test_load() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let json = dir.path().join("test.json");
        fs::write(
            &json,
            r#"{"tests": {"star": {"solid": {"r": 7, "g": 8, "b": 9}}}, "step_ms": 250}"#,
        )?;
        let yaml = dir.path().join("test.yaml");
        fs::write(
            &yaml,
            "tests:\n  star:\n    solid:\n      r: 7\n      g: 8\n      b: 9\nstep_ms: 250\n",
        )?;

        assert_eq!(TestSpec::load(&json)?, TestSpec::load(&yaml)?);
        assert_eq!(250, TestSpec::load(&json)?.step_ms);
        Ok(())
    }
}
