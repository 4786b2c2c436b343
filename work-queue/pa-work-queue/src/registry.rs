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

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{error::PerformError, job::Job};

/// Wire format of a queued message: the job type plus its raw payload.
#[derive(Serialize, Deserialize, Debug)]
pub struct Envelope {
	/// Name of the message type (`Job::JOB_TYPE`)
	pub job_type: String,
	/// Raw payload data
	pub data: serde_json::Value,
}

/// Maps `job_type` strings to their typed handler functions.
/// Populated explicitly through [`crate::Builder::register_job`].
pub struct Registry<Env> {
	jobs: HashMap<&'static str, PerformJob<Env>>,
}

impl<Env: 'static> Registry<Env> {
	pub fn new() -> Self {
		Self { jobs: HashMap::new() }
	}

	pub fn register_job<T: Job<Environment = Env> + 'static + Send>(&mut self) {
		self.jobs.insert(T::JOB_TYPE, PerformJob { perform: crate::job::perform_job::<T> });
	}

	/// Look up the handler for a message type, if one was registered.
	pub fn get(&self, job_type: &str) -> Option<&PerformJob<Env>> {
		self.jobs.get(job_type)
	}
}

impl<Env: 'static> Default for Registry<Env> {
	fn default() -> Self {
		Self::new()
	}
}

pub struct PerformJob<Env> {
	perform: fn(serde_json::Value, &Env) -> Result<(), PerformError>,
}

impl<Env> PerformJob<Env> {
	pub fn perform(&self, data: serde_json::Value, env: &Env) -> Result<(), PerformError> {
		(self.perform)(data, env)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde::{Deserialize, Serialize};

	#[derive(Serialize, Deserialize)]
	struct DummyJob {
		id: String,
	}

	impl Job for DummyJob {
		type Environment = ();
		const JOB_TYPE: &'static str = "dummy_job";
		const ROUTING_KEY: &'static str = "dummy.key";

		fn perform(self, _: &()) -> Result<(), PerformError> {
			if self.id == "boom" {
				return Err("boom".into());
			}
			Ok(())
		}
	}

	#[test]
	fn registered_jobs_are_dispatched_by_type() {
		let mut registry: Registry<()> = Registry::new();
		registry.register_job::<DummyJob>();

		let data = serde_json::json!({ "id": "1" });
		assert!(registry.get("dummy_job").unwrap().perform(data, &()).is_ok());
		assert!(registry.get("unknown_job").is_none());
	}

	#[test]
	fn handler_errors_propagate() {
		let mut registry: Registry<()> = Registry::new();
		registry.register_job::<DummyJob>();

		let data = serde_json::json!({ "id": "boom" });
		assert!(registry.get("dummy_job").unwrap().perform(data, &()).is_err());
	}

	#[test]
	fn envelope_round_trips() {
		let envelope = Envelope { job_type: "dummy_job".into(), data: serde_json::json!({ "id": "42" }) };
		let bytes = serde_json::to_vec(&envelope).unwrap();
		let back: Envelope = serde_json::from_slice(&bytes).unwrap();
		assert_eq!(back.job_type, "dummy_job");
		assert_eq!(back.data["id"], "42");
	}
}
