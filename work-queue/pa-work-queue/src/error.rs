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

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
	/// Error publishing a message for later consumption
	#[error(transparent)]
	Enqueue(#[from] EnqueueError),
	/// Error performing a message handler
	#[error(transparent)]
	Perform(#[from] PerformError),
	/// Error fetching a message for execution on the threadpool
	#[error(transparent)]
	Fetch(#[from] FetchError),
	#[error(transparent)]
	Mq(#[from] lapin::Error),
	#[error(transparent)]
	Env(#[from] std::env::VarError),
	#[error(transparent)]
	Json(#[from] serde_json::Error),
	/// Broker never confirmed a publish
	#[error("publish was not confirmed by the broker")]
	Unconfirmed,
	#[error("{0}")]
	Msg(String),
}

#[derive(Debug, Error)]
pub enum FetchError {
	#[error("Got no response from worker")]
	NoMessage,
	#[error("Timeout reached while waiting for worker to finish")]
	Timeout,
	#[error("Couldn't load message from queue {0}")]
	FailedLoadingJob(#[from] lapin::Error),
	#[error("Failed to decode message {0}")]
	FailedDecode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum EnqueueError {
	#[error("Error publishing message {0}")]
	Mq(#[from] lapin::Error),
	/// Error encoding the message payload
	#[error("Error encoding message for publishing {0}")]
	Encode(#[from] serde_json::Error),
}

/// Catch-all error for message handlers
pub type PerformError = Box<dyn std::error::Error + Send + Sync>;

impl From<String> for Error {
	fn from(err: String) -> Error {
		Error::Msg(err)
	}
}
