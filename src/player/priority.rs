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

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

const ENV: &str = "LEDSHOW_THREAD_PRIORITY";

/// Default priority for the tick driver when LEDSHOW_THREAD_PRIORITY is unset.
const DEFAULT_TICK_THREAD_PRIORITY: u8 = 70;

/// Parses the priority setting: unset gives the default, `off` disables raising,
/// and 0-99 picks a level. Anything else falls back to the default.
fn level(raw: Option<&str>) -> Option<u8> {
    let Some(raw) = raw.map(str::trim) else {
        return Some(DEFAULT_TICK_THREAD_PRIORITY);
    };
    if raw.eq_ignore_ascii_case("off") || raw.eq_ignore_ascii_case("none") {
        return None;
    }

    match raw.parse::<u8>() {
        Ok(n) if n < 100 => Some(n),
        _ => {
            warn!(value = raw, "Invalid {}, using the default.", ENV);
            Some(DEFAULT_TICK_THREAD_PRIORITY)
        }
    }
}

/// Raises the priority of the calling thread so ticks aren't delayed by the rest of
/// the system. Failure is logged and otherwise ignored.
pub fn raise_current_thread() {
    let raw = std::env::var(ENV).ok();
    let Some(level) = level(raw.as_deref()) else {
        info!("Thread priority changes disabled.");
        return;
    };

    let value = match ThreadPriorityValue::try_from(level) {
        Ok(value) => value,
        Err(e) => {
            warn!(level, err = e.to_string(), "Invalid thread priority.");
            return;
        }
    };

    match set_current_thread_priority(ThreadPriority::Crossplatform(value)) {
        Ok(()) => info!(level, "Raised tick thread priority."),
        Err(e) => warn!(
            level,
            err = format!("{:?}", e),
            "Unable to raise tick thread priority."
        ),
    }
}
