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

//! Aggregation loop: polls for matches whose facts are extracted but not
//! yet rolled up, and folds them into the per-player career tables.

use std::time::Duration;

use crate::{database::queries, database::Database, error::Result, metrics};

const BATCH: i64 = 50;

pub struct AggregationService {
	db: Database,
	interval: Duration,
}

impl AggregationService {
	pub fn new(db: Database, interval: Duration) -> Self {
		Self { db, interval }
	}

	pub async fn run(&self, running: &std::sync::atomic::AtomicBool) -> Result<()> {
		while running.load(std::sync::atomic::Ordering::SeqCst) {
			match self.run_once().await {
				Ok(0) => {}
				Ok(aggregated) => log::info!("aggregated {} matches", aggregated),
				Err(e) => {
					metrics::WORKER_ERRORS.with_label_values(&["aggregate"]).inc();
					log::error!("aggregation pass failed: {}", e);
				}
			}
			async_std::task::sleep(self.interval).await;
		}
		Ok(())
	}

	/// One polling pass. Returns how many matches were rolled up.
	pub async fn run_once(&self) -> Result<usize> {
		let mut conn = self.db.conn().await?;
		let batch = queries::matches_awaiting_aggregation(&mut conn, BATCH).await?;
		let mut aggregated = 0;
		for row in &batch {
			queries::aggregate_match_stats(&mut conn, row).await?;
			queries::try_complete_match(&mut conn, &row.match_id).await?;
			aggregated += 1;
		}
		Ok(aggregated)
	}
}
