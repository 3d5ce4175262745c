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
    sync::Arc,
    time::Duration,
};

use chrono::{Local, NaiveDateTime};
use crossbeam_channel::Sender;
use parking_lot::RwLock;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, span, warn, Instrument, Level};

use crate::{
    config::Schedule,
    error::EngineError,
    player::{Command, SchedulerStatus},
    playlist::EngineFactory,
    storage::Storage,
};

/// Supplies the local wall-clock time.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub fn local_clock() -> Clock {
    Arc::new(|| Local::now().naive_local())
}

/// A change in which playlist should be running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Switch { schedule: u32, playlist: u32 },
    Stop,
}

/// Picks the schedule that should be running. When several match, the one that
/// started latest wins, then the lowest id.
pub fn select(schedules: &[Schedule], now: NaiveDateTime) -> Option<&Schedule> {
    schedules
        .iter()
        .filter(|schedule| schedule.matches(now))
        .min_by(|a, b| b.start_time.cmp(&a.start_time).then(a.id.cmp(&b.id)))
}

/// Splits schedules into those that can run and the reasons the rest can't. The
/// first schedule with a given id wins.
pub fn validate(schedules: Vec<Schedule>) -> (Vec<Schedule>, Vec<EngineError>) {
    let mut valid = Vec::with_capacity(schedules.len());
    let mut errors = Vec::new();
    let mut names: HashMap<u32, String> = HashMap::new();

    for schedule in schedules {
        if let Err(e) = schedule.validate() {
            errors.push(e);
            continue;
        }
        if let Some(existing) = names.get(&schedule.id) {
            errors.push(EngineError::ScheduleConflict(format!(
                "schedules {:?} and {:?} share id {}",
                existing, schedule.name, schedule.id
            )));
            continue;
        }
        names.insert(schedule.id, schedule.name.clone());
        valid.push(schedule);
    }

    (valid, errors)
}

/// Remembers which schedule is active and turns evaluations into transitions.
#[derive(Default)]
pub struct Scheduler {
    current: Option<(u32, u32)>,
    reissue: bool,
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler::default()
    }

    /// Returns a decision only when the matching schedule changes.
    pub fn evaluate(&mut self, schedules: &[Schedule], now: NaiveDateTime) -> Option<Decision> {
        let next = select(schedules, now).map(|schedule| (schedule.id, schedule.playlist_id));
        let reissue = std::mem::take(&mut self.reissue) && next.is_some();
        if next == self.current && !reissue {
            return None;
        }

        self.current = next;
        Some(match next {
            Some((schedule, playlist)) => Decision::Switch { schedule, playlist },
            None => Decision::Stop,
        })
    }

    /// Makes the next evaluation issue the active schedule again, if there still is one.
    pub fn forget(&mut self) {
        self.reissue = true;
    }
}

/// Polls storage for schedules and sends playlist commands to the tick driver.
pub struct SchedulerTask {
    scheduler: Scheduler,
    storage: Arc<dyn Storage>,
    factory: EngineFactory,
    commands: Sender<Command>,
    status: Arc<RwLock<SchedulerStatus>>,
    /// The tick driver's completed count as of the last poll.
    completed: u64,
    epoch: u64,
    clock: Clock,
    reported: HashSet<String>,
}

impl SchedulerTask {
    pub fn new(
        storage: Arc<dyn Storage>,
        factory: EngineFactory,
        commands: Sender<Command>,
        status: Arc<RwLock<SchedulerStatus>>,
        epoch: u64,
        clock: Clock,
    ) -> SchedulerTask {
        let completed = status.read().completed;
        SchedulerTask {
            scheduler: Scheduler::new(),
            storage,
            factory,
            commands,
            status,
            completed,
            epoch,
            clock,
            reported: HashSet::new(),
        }
    }

    /// Evaluates the schedules once. Returns false once the tick driver has gone away.
    pub fn poll(&mut self) -> bool {
        let schedules = match self.storage.load_schedules() {
            Ok(schedules) => schedules,
            Err(e) => {
                self.report(e);
                return true;
            }
        };

        let (schedules, errors) = validate(schedules);
        for e in errors {
            self.report(e);
        }

        let completed = self.status.read().completed;
        if completed != self.completed {
            // The scheduled playlist ran out. Issue it again if its schedule still holds.
            self.completed = completed;
            self.scheduler.forget();
        }

        let now = (self.clock)();
        let engine = match self.scheduler.evaluate(&schedules, now) {
            None => return true,
            Some(Decision::Stop) => {
                info!("No schedule is active, stopping the playlist.");
                None
            }
            Some(Decision::Switch { schedule, playlist }) => {
                match self.factory.build(playlist) {
                    Ok(engine) => {
                        info!(
                            schedule = schedule,
                            playlist = engine.name(),
                            "Schedule became active, switching playlists."
                        );
                        Some(Box::new(engine))
                    }
                    Err(e) => {
                        // Whatever was playing keeps playing. The build is tried
                        // again on the next poll.
                        self.report(e);
                        self.scheduler.forget();
                        return true;
                    }
                }
            }
        };

        self.commands
            .send(Command::Scheduled {
                epoch: self.epoch,
                engine,
            })
            .is_ok()
    }

    /// Logs a configuration problem once per distinct problem.
    fn report(&mut self, e: EngineError) {
        let message = e.to_string();
        if self.reported.insert(message.clone()) {
            warn!(err = message, "Schedule problem.");
        }
    }

    /// Polls at the given cadence until the tick driver goes away or the task is aborted.
    pub async fn run(self, poll: Duration) {
        let span = span!(Level::INFO, "scheduler", epoch = self.epoch);
        self.poll_loop(poll).instrument(span).await
    }

    async fn poll_loop(mut self, poll: Duration) {
        info!(poll = format!("{:?}", poll), "Scheduler started.");

        let mut interval = tokio::time::interval(poll);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;

            // Storage and sequence files are blocking reads.
            match tokio::task::spawn_blocking(move || {
                let keep_going = self.poll();
                (self, keep_going)
            })
            .await
            {
                Ok((task, true)) => self = task,
                Ok((_, false)) => {
                    info!("Tick driver has stopped, scheduler exiting.");
                    return;
                }
                Err(e) => {
                    error!(err = e.to_string(), "Scheduler poll failed.");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use chrono::{NaiveDate, NaiveDateTime};
    use parking_lot::{Mutex, RwLock};

    use crate::{
        config::{Playlist, PlaylistEntry},
        error::EngineError,
        player::{Command, SchedulerStatus},
        playlist::{EngineFactory, EngineOptions},
        sequences::SequenceStore,
        testutil::{fseq_bytes, schedule, MemoryStorage},
    };

    use super::{select, validate, Clock, Decision, Scheduler, SchedulerTask};

    /// 2026-11-02 is a Monday.
    fn monday(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 11, 2)
            .and_then(|date| date.and_hms_opt(h, m, 0))
            .expect("valid time")
    }

    #[test]
    fn test_later_start_wins() {
        let mut early = schedule(1, 10, "09:00", "10:00");
        early.tuesday = false;
        let late = schedule(2, 20, "09:30", "10:00");
        let schedules = vec![early, late];

        assert_eq!(Some(10), select(&schedules, monday(9, 15)).map(|s| s.playlist_id));
        assert_eq!(Some(20), select(&schedules, monday(9, 45)).map(|s| s.playlist_id));
        assert_eq!(None, select(&schedules, monday(10, 0)));
    }

    #[test]
    fn test_tie_goes_to_lowest_id() {
        let schedules = vec![
            schedule(7, 70, "09:00", "10:00"),
            schedule(3, 30, "09:00", "11:00"),
        ];
        assert_eq!(Some(30), select(&schedules, monday(9, 30)).map(|s| s.playlist_id));
    }

    #[test]
    fn test_validate() {
        let (valid, errors) = validate(vec![
            schedule(1, 1, "09:00", "10:00"),
            schedule(2, 1, "23:00", "01:00"),
            schedule(1, 2, "12:00", "13:00"),
        ]);

        assert_eq!(vec![1], valid.iter().map(|s| s.id).collect::<Vec<_>>());
        assert_eq!(2, errors.len());
        assert!(matches!(errors[0], EngineError::InvalidSchedule { .. }));
        assert!(matches!(errors[1], EngineError::ScheduleConflict(_)));
    }

    #[test]
    fn test_transitions() {
        let schedules = vec![
            schedule(1, 10, "09:00", "10:00"),
            schedule(2, 20, "09:30", "10:00"),
        ];
        let mut scheduler = Scheduler::new();

        assert_eq!(None, scheduler.evaluate(&schedules, monday(8, 0)));
        assert_eq!(
            Some(Decision::Switch {
                schedule: 1,
                playlist: 10
            }),
            scheduler.evaluate(&schedules, monday(9, 0))
        );
        assert_eq!(None, scheduler.evaluate(&schedules, monday(9, 10)));
        assert_eq!(
            Some(Decision::Switch {
                schedule: 2,
                playlist: 20
            }),
            scheduler.evaluate(&schedules, monday(9, 30))
        );
        assert_eq!(
            Some(Decision::Stop),
            scheduler.evaluate(&schedules, monday(10, 0))
        );
        assert_eq!(None, scheduler.evaluate(&schedules, monday(10, 1)));

        scheduler.evaluate(&schedules, monday(9, 45));
        scheduler.forget();
        assert!(scheduler.evaluate(&schedules, monday(9, 45)).is_some());
    }

    fn task(
        storage: &MemoryStorage,
        now: Arc<Mutex<NaiveDateTime>>,
    ) -> (SchedulerTask, crossbeam_channel::Receiver<Command>) {
        task_with_status(storage, now, Arc::new(RwLock::new(SchedulerStatus::default())))
    }

    fn task_with_status(
        storage: &MemoryStorage,
        now: Arc<Mutex<NaiveDateTime>>,
        status: Arc<RwLock<SchedulerStatus>>,
    ) -> (SchedulerTask, crossbeam_channel::Receiver<Command>) {
        let storage = Arc::new(storage.clone());
        let factory = EngineFactory::new(
            SequenceStore::new(storage.clone(), 8),
            EngineOptions {
                read_timeout: Duration::from_secs(1),
                ..Default::default()
            },
            Some(0),
        );
        let (sender, receiver) = crossbeam_channel::unbounded();
        let clock: Clock = Arc::new(move || *now.lock());
        (
            SchedulerTask::new(storage, factory, sender, status, 3, clock),
            receiver,
        )
    }

    #[test]
    fn test_poll_sends_commands() {
        let storage = MemoryStorage::new();
        storage.add_sequence("a.fseq", fseq_bytes(3, 25, vec![vec![1, 2, 3]; 4]));
        storage.add_playlist(10, Playlist::new("morning", vec![PlaylistEntry::sequence("a.fseq")]));
        storage.add_schedule(schedule(1, 10, "09:00", "10:00"));

        let now = Arc::new(Mutex::new(monday(8, 59)));
        let (mut task, commands) = task(&storage, now.clone());

        assert!(task.poll());
        assert!(commands.try_recv().is_err());

        *now.lock() = monday(9, 0);
        assert!(task.poll());
        match commands.try_recv() {
            Ok(Command::Scheduled {
                epoch: 3,
                engine: Some(engine),
            }) => assert_eq!("morning", engine.name()),
            _ => panic!("expected a scheduled playlist"),
        }

        // Nothing changes while the schedule stays active.
        assert!(task.poll());
        assert!(commands.try_recv().is_err());

        // Edits to storage are picked up on the next poll.
        storage.remove_schedule(1);
        assert!(task.poll());
        assert!(matches!(
            commands.try_recv(),
            Ok(Command::Scheduled {
                epoch: 3,
                engine: None
            })
        ));
    }

    #[test]
    fn test_missing_playlist_keeps_prior_state() {
        let storage = MemoryStorage::new();
        storage.add_schedule(schedule(1, 99, "09:00", "10:00"));

        let (mut task, commands) = task(&storage, Arc::new(Mutex::new(monday(9, 0))));
        assert!(task.poll());
        assert!(commands.try_recv().is_err());

        // The playlist shows up later and the schedule picks it up.
        storage.add_sequence("a.fseq", fseq_bytes(3, 25, vec![vec![1, 2, 3]; 4]));
        storage.add_playlist(99, Playlist::new("late", vec![PlaylistEntry::sequence("a.fseq")]));
        assert!(task.poll());
        match commands.try_recv() {
            Ok(Command::Scheduled {
                engine: Some(engine),
                ..
            }) => assert_eq!("late", engine.name()),
            _ => panic!("expected the playlist to be retried"),
        }
    }

    #[test]
    fn test_finished_playlist_restarts_inside_window() {
        let storage = MemoryStorage::new();
        storage.add_sequence("a.fseq", fseq_bytes(3, 25, vec![vec![1, 2, 3]; 4]));
        storage.add_playlist(10, Playlist::new("morning", vec![PlaylistEntry::sequence("a.fseq")]));
        storage.add_schedule(schedule(1, 10, "09:00", "10:00"));

        let now = Arc::new(Mutex::new(monday(9, 0)));
        let status = Arc::new(RwLock::new(SchedulerStatus::default()));
        let (mut task, commands) = task_with_status(&storage, now.clone(), status.clone());

        assert!(task.poll());
        assert!(matches!(
            commands.try_recv(),
            Ok(Command::Scheduled { engine: Some(_), .. })
        ));
        assert!(task.poll());
        assert!(commands.try_recv().is_err());

        // The tick driver reports the playlist ran out.
        status.write().completed += 1;
        assert!(task.poll());
        assert!(matches!(
            commands.try_recv(),
            Ok(Command::Scheduled { engine: Some(_), .. })
        ));
        assert!(task.poll());
        assert!(commands.try_recv().is_err());

        // Outside the window a finished playlist stays finished.
        *now.lock() = monday(10, 30);
        assert!(task.poll());
        assert!(matches!(
            commands.try_recv(),
            Ok(Command::Scheduled { engine: None, .. })
        ));
        status.write().completed += 1;
        assert!(task.poll());
        assert!(commands.try_recv().is_err());
    }

    #[test]
    fn test_poll_stops_without_driver() {
        let storage = MemoryStorage::new();
        storage.add_schedule(schedule(1, 10, "09:00", "10:00"));
        let (mut task, commands) = task(&storage, Arc::new(Mutex::new(monday(11, 0))));
        drop(commands);

        // Nothing to send yet, so the missing driver goes unnoticed.
        assert!(task.poll());
        task.scheduler.current = Some((1, 10));
        assert!(!task.poll());
    }
}
