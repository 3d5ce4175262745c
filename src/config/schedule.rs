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
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use super::{boolean, default_true};
use crate::error::EngineError;

/// A rule that runs a playlist on certain days between two times.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Schedule {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    pub playlist_id: u32,
    #[serde(default = "default_true", deserialize_with = "boolean")]
    pub enabled: bool,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(with = "time_of_day")]
    pub start_time: NaiveTime,
    #[serde(with = "time_of_day")]
    pub end_time: NaiveTime,
    #[serde(default, deserialize_with = "boolean")]
    pub monday: bool,
    #[serde(default, deserialize_with = "boolean")]
    pub tuesday: bool,
    #[serde(default, deserialize_with = "boolean")]
    pub wednesday: bool,
    #[serde(default, deserialize_with = "boolean")]
    pub thursday: bool,
    #[serde(default, deserialize_with = "boolean")]
    pub friday: bool,
    #[serde(default, deserialize_with = "boolean")]
    pub saturday: bool,
    #[serde(default, deserialize_with = "boolean")]
    pub sunday: bool,
}

impl Schedule {
    /// Checks the schedule for windows that can never be evaluated consistently.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.end_time <= self.start_time {
            return Err(EngineError::InvalidSchedule {
                name: self.name.clone(),
                reason: format!(
                    "end time {} is not after start time {}",
                    self.end_time, self.start_time
                ),
            });
        }

        if self.end_date < self.start_date {
            return Err(EngineError::InvalidSchedule {
                name: self.name.clone(),
                reason: format!(
                    "end date {} is before start date {}",
                    self.end_date, self.start_date
                ),
            });
        }

        Ok(())
    }

    /// Whether the schedule runs on the given weekday.
    pub fn runs_on(&self, weekday: Weekday) -> bool {
        match weekday {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }

    /// Whether the schedule is active at the given local time.
    pub fn matches(&self, now: NaiveDateTime) -> bool {
        let date = now.date();
        let time = now.time();

        self.enabled
            && date >= self.start_date
            && date <= self.end_date
            && self.runs_on(date.weekday())
            && time >= self.start_time
            && time < self.end_time
    }
}

/// Times of day are stored as `HH:MM`, optionally with seconds.
mod time_of_day {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&raw, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(&raw, "%H:%M"))
            .map_err(|e| serde::de::Error::custom(format!("invalid time {}: {}", raw, e)))
    }
}
