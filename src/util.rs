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

use std::path::Path;
use std::time::Duration;

/// The file name of a path for log output.
pub fn filename_display(path: &Path) -> &str {
    path.file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unreadable file name")
}

/// Formats a duration as minutes, seconds and tenths, e.g. `2:05.3`. Sequence
/// lengths rarely land on whole seconds.
pub fn duration_display(duration: Duration) -> String {
    let tenths = duration.as_millis() / 100;
    let minutes = tenths / 600;
    let seconds = (tenths / 10) % 60;
    format!("{}:{:02}.{}", minutes, seconds, tenths % 10)
}
