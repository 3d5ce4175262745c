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
pub mod config;
pub mod controller;
pub mod error;
pub mod fseq;
pub mod output;
pub mod patterns;
pub mod player;
pub mod playlist;
pub mod playsync;
pub mod scheduler;
pub mod sequences;
pub mod storage;
pub mod tester;
#[cfg(test)]
mod testutil;
pub mod util;
