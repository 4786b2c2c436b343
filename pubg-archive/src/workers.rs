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

//! Worker roles of the pipeline. Queue-driven roles are `Job` handlers
//! running on a `pa-work-queue` runner; discovery, aggregation and the
//! backfill orchestrator are loops owning their handles directly.

pub mod aggregate;
pub mod backfill;
pub mod discovery;
pub mod download;
pub mod process;
pub mod ranked;
pub mod summary;

use std::{panic::AssertUnwindSafe, path::PathBuf, sync::Arc, time::Duration};

use pa_work_queue::{QueueHandle, Runner};

use crate::{
	api::PubgClient,
	config::ArchiveConfig,
	database::Database,
	error::Result,
	types::{queues, routing, MatchDiscovered, SummaryComplete, TelemetryDownloaded},
};

/// The environment every queue handler runs with: owned handles built in
/// main and shared by reference, nothing global.
pub struct Environment {
	pub db: Database,
	pub api: Arc<PubgClient>,
	pub publisher: QueueHandle,
	pub telemetry_root: PathBuf,
	// the publisher channel lives on this connection
	_connection: pa_work_queue::Connection,
}

/// Queue handlers run under `catch_unwind`; the pool and client handles
/// are safe to observe after a handler panic.
pub type Env = AssertUnwindSafe<Environment>;

impl Environment {
	/// Connect the store, the upstream client and the broker, and verify
	/// broker reachability with a healthcheck publish.
	pub async fn new(config: &ArchiveConfig) -> Result<Self> {
		let db = Database::new(&config.database.url()).await?;
		let api = Arc::new(PubgClient::new(&config.api));
		let connection = pa_work_queue::connect(&config.broker.addr())?;
		let publisher = QueueHandle::publisher(&connection, &config.broker.exchange)?;
		publisher.healthcheck().await?;
		Ok(Self { db, api, publisher, telemetry_root: config.telemetry_root.clone(), _connection: connection })
	}
}

/// Runner for the match-summary role (consumes `match.discovered`).
pub fn summary_runner(env: Environment, config: &ArchiveConfig) -> Result<Runner<Env>> {
	runner(env, config, queues::MATCH_SUMMARY, routing::MATCH_DISCOVERED, |builder| {
		builder.register_job::<MatchDiscovered>()
	})
}

/// Runner for the telemetry-download role (consumes `match.summary_complete`).
pub fn download_runner(env: Environment, config: &ArchiveConfig) -> Result<Runner<Env>> {
	runner(env, config, queues::TELEMETRY_DOWNLOAD, routing::SUMMARY_COMPLETE, |builder| {
		builder.register_job::<SummaryComplete>()
	})
}

/// Runner for the telemetry-processing role (consumes
/// `match.telemetry_downloaded`).
pub fn process_runner(env: Environment, config: &ArchiveConfig) -> Result<Runner<Env>> {
	runner(env, config, queues::TELEMETRY_PROCESSING, routing::TELEMETRY_DOWNLOADED, |builder| {
		builder.register_job::<TelemetryDownloaded>()
	})
}

fn runner(
	env: Environment,
	config: &ArchiveConfig,
	queue: &str,
	routing_key: &str,
	register: impl FnOnce(pa_work_queue::Builder<Env>) -> pa_work_queue::Builder<Env>,
) -> Result<Runner<Env>> {
	let builder = Runner::builder(AssertUnwindSafe(env), &config.broker.addr(), &config.broker.exchange)
		.queue_name(queue)
		.routing_key(routing_key)
		.num_threads(config.control.task_workers)
		.timeout(Duration::from_secs(config.control.task_timeout))
		.prefetch(1);
	Ok(register(builder).build()?)
}
