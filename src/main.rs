// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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
use clap::{crate_version, Parser, Subcommand};
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ledshow::config::{self, player::ControllerKind};
use ledshow::controller::{keyboard, serial, Controller};
use ledshow::fseq::{self, Layout, Variable};
use ledshow::output::{Multiplexer, Router};
use ledshow::patterns::Generator;
use ledshow::player::Player;
use ledshow::playlist::{EngineFactory, EngineOptions};
use ledshow::scheduler;
use ledshow::sequences::SequenceStore;
use ledshow::storage::{FileStorage, Storage};

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=lighting show player
After=network-online.target olad.service

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/ledshow
ExecStart=/usr/local/bin/ledshow start "$LEDSHOW_CONFIG"

[Install]
WantedBy=multi-user.target
Alias=ledshow.service
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A lighting show player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start will start the show player.
    Start {
        /// The path to the player config.
        player_path: String,
    },
    /// Prints the header of a sequence file.
    Dump {
        /// The path to the sequence file.
        path: String,
    },
    /// Prints a stored playlist and its totals.
    Playlist {
        /// The path to the player config.
        player_path: String,
        /// The playlist id.
        id: u32,
    },
    /// Prints a stored schedule and whether it is active right now.
    Schedule {
        /// The path to the player config.
        player_path: String,
        /// The schedule id.
        id: u32,
    },
    /// Copies a JSON or YAML record into the player's storage.
    Import {
        /// The path to the player config.
        player_path: String,
        #[clap(subcommand)]
        record: Record,
    },
    /// Renders a generated pattern to a sequence file.
    Render {
        /// A JSON or YAML file holding the pattern.
        pattern_path: String,
        /// Where to write the sequence.
        output_path: String,
        /// The number of channels in each frame.
        #[arg(short, long, default_value_t = 512)]
        channels: u32,
        /// The number of frames to render.
        #[arg(short, long, default_value_t = 400)]
        frames: u32,
        /// Milliseconds per frame.
        #[arg(short, long, default_value_t = 25)]
        step_ms: u8,
    },
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

#[derive(Subcommand)]
enum Record {
    /// A playlist, stored under the given id.
    Playlist {
        id: u32,
        /// The playlist document.
        path: String,
    },
    /// A schedule. Its id comes from the document.
    Schedule {
        /// The schedule document.
        path: String,
    },
    /// The channel outputs, replacing what is stored.
    Outputs {
        /// A document with a channel_outputs list.
        path: String,
    },
    /// The models, replacing what is stored.
    Models {
        /// A document with a models list.
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start { player_path } => start(&PathBuf::from(player_path)).await?,
        Commands::Dump { path } => {
            let mut reader = BufReader::new(File::open(&path)?);
            let header = fseq::Header::read(&mut reader)?;
            println!("{}:", path);
            print!("{}", header);
        }
        Commands::Playlist { player_path, id } => {
            let config = config::Player::deserialize(&PathBuf::from(player_path))?;
            let storage: Arc<dyn Storage> = Arc::new(FileStorage::new(&config.storage()));
            let store = SequenceStore::new(storage, config.read_ahead_frames());
            let factory = EngineFactory::new(store, EngineOptions::default(), config.shuffle_seed());

            print!("{}", factory.build(id)?);
        }
        Commands::Schedule { player_path, id } => {
            let config = config::Player::deserialize(&PathBuf::from(player_path))?;
            let schedule = FileStorage::new(&config.storage()).load_schedule(id)?;
            println!(
                "{} ({}): playlist {}",
                schedule.name, schedule.id, schedule.playlist_id
            );
            println!(
                "{} to {}, {} to {}",
                schedule.start_date,
                schedule.end_date,
                schedule.start_time.format("%H:%M"),
                schedule.end_time.format("%H:%M")
            );
            match schedule.validate() {
                Ok(()) => println!(
                    "Active now: {}",
                    schedule.matches(scheduler::local_clock()())
                ),
                Err(e) => println!("Invalid: {}", e),
            }
        }
        Commands::Import {
            player_path,
            record,
        } => {
            let config = config::Player::deserialize(&PathBuf::from(player_path))?;
            import(&FileStorage::init(&config.storage())?, record)?;
        }
        Commands::Render {
            pattern_path,
            output_path,
            channels,
            frames,
            step_ms,
        } => render(
            Path::new(&pattern_path),
            Path::new(&output_path),
            channels,
            frames,
            step_ms,
        )?,
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    }

    Ok(())
}

/// Runs the player until the controller closes or the process is interrupted.
async fn start(player_path: &Path) -> Result<(), Box<dyn Error>> {
    let config = config::Player::deserialize(player_path)?;
    let storage = Arc::new(FileStorage::init(&config.storage())?);

    let outputs = match storage.load_channel_outputs() {
        Ok(outputs) => outputs,
        Err(e) => {
            warn!(err = e.to_string(), "No channel outputs, nothing will be sent.");
            Vec::new()
        }
    };
    let router = Router::connect(&config, &Multiplexer::destinations(&outputs));
    let multiplexer = Multiplexer::new(&outputs, Box::new(router));

    let tick = config.tick()?;
    let options = EngineOptions {
        read_timeout: config.read_timeout()?,
        play_once_policy: config.play_once_policy(),
        pattern_channels: multiplexer.channel_span(),
        pattern_step: tick,
    };
    let store = SequenceStore::new(storage.clone(), config.read_ahead_frames());
    let factory = EngineFactory::new(store, options, config.shuffle_seed());

    let player = Arc::new(Player::new(
        storage,
        factory,
        multiplexer,
        tick,
        config.schedule_poll()?,
        scheduler::local_clock(),
    )?);

    if config.auto_start() {
        player.start().await?;
    }

    match config.controller() {
        ControllerKind::Keyboard => {
            Controller::new(player.clone(), Arc::new(keyboard::Driver::new()))
                .join()
                .await?;
        }
        ControllerKind::Serial => {
            // The show keeps running if the buttons go away.
            let _controller = Controller::new(
                player.clone(),
                Arc::new(serial::Driver::new(config.buttons())),
            );
            tokio::signal::ctrl_c().await?;
            info!("Interrupted, shutting down.");
        }
        ControllerKind::None => {
            tokio::signal::ctrl_c().await?;
            info!("Interrupted, shutting down.");
        }
    }

    player.stop().await
}

/// Validates a record and writes it to storage.
fn import(storage: &FileStorage, record: Record) -> Result<(), Box<dyn Error>> {
    match record {
        Record::Playlist { id, path } => {
            let playlist: config::Playlist = config::read_document(Path::new(&path))?;
            storage.save_playlist(id, &playlist)?;
            println!("Stored playlist {} as {}.", playlist.name, id);
        }
        Record::Schedule { path } => {
            let schedule: config::Schedule = config::read_document(Path::new(&path))?;
            schedule.validate()?;
            storage.save_schedule(&schedule)?;
            println!("Stored schedule {} as {}.", schedule.name, schedule.id);
        }
        Record::Outputs { path } => {
            let channels: config::outputs::Channels = config::read_document(Path::new(&path))?;
            storage.save_channel_outputs(&channels.channel_outputs)?;
            println!("Stored {} channel outputs.", channels.channel_outputs.len());
        }
        Record::Models { path } => {
            let models: config::models::Models = config::read_document(Path::new(&path))?;
            storage.save_models(&models.models)?;
            println!("Stored {} models.", models.models.len());
        }
    }
    Ok(())
}

/// Writes `frames` frames of a generated pattern as a sequence file.
fn render(
    pattern_path: &Path,
    output_path: &Path,
    channels: u32,
    frames: u32,
    step_ms: u8,
) -> Result<(), Box<dyn Error>> {
    let generator: Generator = config::read_document(pattern_path)?;

    let mut layout = Layout::new(channels, step_ms);
    layout.variables.push(Variable {
        code: "sp".to_string(),
        value: format!("ledshow {}", crate_version!()),
    });

    let mut writer = BufWriter::new(File::create(output_path)?);
    fseq::write(
        &mut writer,
        &layout,
        frames,
        (0..frames).map(|step| {
            generator
                .frame_at(channels as usize, step as u64)
                .data()
                .to_vec()
        }),
    )?;

    println!(
        "Wrote {} frames of {} channels to {}.",
        frames,
        channels,
        output_path.display()
    );
    Ok(())
}
