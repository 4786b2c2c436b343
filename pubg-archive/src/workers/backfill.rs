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

//! Backfill orchestrator: drains the queue rows the player-tracking
//! trigger seeded and drives the extractors against each historical
//! match. Fact inserts are conflict-keyed, so re-running a step over a
//! match another queue row already covered is a no-op.

use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::{
	database::models::{BackfillItem, BackfillStep},
	database::queries,
	error::{ArchiveError, Result},
	metrics,
	telemetry::{self, fights, processors},
	types::{telemetry_path, MatchMeta},
	workers::Environment,
};

/// Retries before a queue row stops being re-eligible.
const RETRY_CAP: i32 = 3;
/// Queue rows driven concurrently per poll.
const ROW_CONCURRENCY: usize = 4;

pub struct BackfillOrchestrator {
	env: Environment,
	batch: i64,
	interval: Duration,
}

impl BackfillOrchestrator {
	pub fn new(env: Environment, batch: i64, interval: Duration) -> Self {
		Self { env, batch, interval }
	}

	pub async fn run(&self, running: &std::sync::atomic::AtomicBool) -> Result<()> {
		while running.load(std::sync::atomic::Ordering::SeqCst) {
			match self.run_once().await {
				Ok(0) => async_std::task::sleep(self.interval).await,
				Ok(done) => log::info!("backfilled {} queue rows", done),
				Err(e) => {
					metrics::WORKER_ERRORS.with_label_values(&["backfill"]).inc();
					log::error!("backfill pass failed: {}", e);
					async_std::task::sleep(self.interval).await;
				}
			}
		}
		Ok(())
	}

	/// Claim a batch of rows and drive each to a terminal or retryable
	/// state. Returns how many rows were claimed.
	pub async fn run_once(&self) -> Result<usize> {
		let mut conn = self.env.db.conn().await?;
		let items = queries::claim_backfill_items(&mut conn, self.batch, RETRY_CAP).await?;
		drop(conn);

		let claimed = items.len();
		let outcomes: Vec<(BackfillItem, Result<()>)> = stream::iter(items)
			.map(|item| async move {
				let outcome = self.process_item(&item).await;
				(item, outcome)
			})
			.buffer_unordered(ROW_CONCURRENCY)
			.collect()
			.await;

		for (item, outcome) in outcomes {
			if let Err(e) = outcome {
				log::warn!("backfill of {} for {} failed: {}", item.match_id, item.player_name, e);
				let mut conn = self.env.db.conn().await?;
				queries::fail_backfill_item(&mut conn, item.id, &e.to_string()).await?;
			}
		}
		Ok(claimed)
	}

	async fn process_item(&self, item: &BackfillItem) -> Result<()> {
		let path = telemetry_path(&self.env.telemetry_root, &item.match_id);
		if !path.exists() {
			let mut conn = self.env.db.conn().await?;
			queries::skip_backfill_item(&mut conn, item.id, "telemetry blob missing on disk").await?;
			return Ok(());
		}

		let mut conn = self.env.db.conn().await?;
		let row = queries::match_row(&mut conn, &item.match_id)
			.await?
			.ok_or_else(|| ArchiveError::NotFound(format!("match {} not in store", item.match_id)))?;
		drop(conn);

		let trace = telemetry::load_trace(&path)?;
		let meta = MatchMeta {
			match_id: row.match_id.clone(),
			map_name: row.map_name.clone(),
			game_type: row.game_type.clone(),
		};

		for step in BackfillStep::ALL.iter() {
			if step.is_done(item) {
				continue;
			}
			self.run_step(*step, &meta, &trace.events).await?;
			let mut conn = self.env.db.conn().await?;
			queries::set_backfill_step(&mut conn, item.id, *step).await?;
		}

		let mut conn = self.env.db.conn().await?;
		queries::complete_backfill_item(&mut conn, item.id).await?;
		Ok(())
	}

	/// Re-run one extractor family over the historical match. The inserts
	/// are keyed, so overlap with live processing cannot duplicate rows.
	async fn run_step(&self, step: BackfillStep, meta: &MatchMeta, events: &[telemetry::TelemetryEvent]) -> Result<()> {
		match step {
			BackfillStep::Kills => {
				let (kills, finishing) = processors::kills::extract(meta, events);
				self.env.db.insert(kills).await?;
				self.env.db.insert(finishing).await?;
			}
			BackfillStep::Damage => {
				self.env.db.insert(processors::damage::extract(meta, events)).await?;
				self.env.db.insert(processors::knocks::extract(meta, events)).await?;
			}
			BackfillStep::Weapons => {
				self.env.db.insert(processors::weapons::extract(meta, events)).await?;
			}
			BackfillStep::Fights => {
				let fights = fights::track_fights(meta, events);
				let mut conn = self.env.db.conn().await?;
				for fight in &fights {
					queries::insert_fight(&mut conn, fight).await?;
				}
			}
		}
		Ok(())
	}
}
