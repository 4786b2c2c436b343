// Copyright 2020-2021 The pubg-archive Authors.
// This file is part of pubg-archive.

// pubg-archive is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// pubg-archive is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
// You should have received a copy of the GNU General Public License
// along with pubg-archive.  If not, see <http://www.gnu.org/licenses/>.

use std::{env, fmt, io, num};
use thiserror::Error;

pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;

/// PUBG Archive Error Enum
#[derive(Debug, Error)]
pub enum ArchiveError {
	// Rust std io error
	#[error(transparent)]
	Io(#[from] io::Error),
	#[error(transparent)]
	Env(#[from] env::VarError),
	#[error(transparent)]
	Conversion(#[from] num::TryFromIntError),

	// encoding error
	#[error(transparent)]
	Serialization(#[from] serde_json::Error),
	#[error(transparent)]
	Fmt(#[from] fmt::Error),

	// database error
	#[error("sqlx error: {0}")]
	Sql(#[from] sqlx::Error),
	#[error("migration error: {0}")]
	Migration(#[from] sqlx::migrate::MigrateError),

	// work queue error
	#[error("Queue error {0}")]
	Queue(#[from] pa_work_queue::Error),
	#[error("Failed publishing message {0}")]
	Enqueue(#[from] pa_work_queue::EnqueueError),
	#[error("amqp error: {0}")]
	Amqp(#[from] lapin::Error),

	// upstream API error
	#[error("http error: {0}")]
	Http(String),
	#[error("rate limited by the upstream API")]
	RateLimited,
	#[error("not found: {0}")]
	NotFound(String),
	#[error("upstream returned status {0}")]
	UpstreamStatus(u16),
	#[error("request timed out")]
	Timeout,

	// configuration error
	#[error("configuration: {0}")]
	Config(String),

	// channel error
	#[error("Sending on a disconnected channel")]
	Channel,

	#[error("{0}")]
	Msg(String),
}

impl From<surf::Error> for ArchiveError {
	fn from(e: surf::Error) -> Self {
		Self::Http(e.to_string())
	}
}

impl<T> From<flume::SendError<T>> for ArchiveError {
	fn from(_: flume::SendError<T>) -> Self {
		Self::Channel
	}
}

impl From<String> for ArchiveError {
	fn from(s: String) -> Self {
		Self::Msg(s)
	}
}
