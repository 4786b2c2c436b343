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

use serde::{de::DeserializeOwned, Serialize};

use crate::{error::EnqueueError, registry::Envelope, runner::QueueHandle};

/// A message consumed from a durable queue.
///
/// The payload is the struct implementing this trait; `ROUTING_KEY` names
/// the topic-exchange binding the message is published under. Handlers run
/// synchronously on the consuming role's threadpool.
#[async_trait::async_trait]
pub trait Job: Serialize + DeserializeOwned {
	/// The environment this handler runs with.
	/// This is a struct you define, which should encapsulate things like
	/// database connection pools, API clients, any configuration, and any
	/// other static data or shared resources.
	type Environment: 'static + Send + Sync;

	/// Identifies the message type inside the envelope.
	/// Typically the name of your struct in `snake_case`.
	const JOB_TYPE: &'static str;

	/// Topic-exchange routing key this message is published under.
	const ROUTING_KEY: &'static str;

	/// Publish the message on the exchange; the broker confirms receipt
	/// before this returns.
	async fn enqueue(self, handle: &QueueHandle) -> Result<(), EnqueueError> {
		let envelope = Envelope { job_type: Self::JOB_TYPE.to_string(), data: serde_json::to_value(&self)? };
		handle.publish(Self::ROUTING_KEY, serde_json::to_vec(&envelope)?).await?;
		Ok(())
	}

	/// Handler body. Returning `Err` dead-letters the message.
	fn perform(self, env: &Self::Environment) -> Result<(), crate::PerformError>;
}

/// Decode an envelope and run the typed handler.
/// Monomorphized per job type so the registry can hold a plain fn pointer.
pub(crate) fn perform_job<T: Job>(data: serde_json::Value, env: &T::Environment) -> Result<(), crate::PerformError> {
	let job: T = serde_json::from_value(data)?;
	job.perform(env)
}

pub(crate) use crate::registry::Registry;
