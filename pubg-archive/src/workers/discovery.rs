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

//! Match discovery: sweep the tracked-player population, subtract the
//! matches the store already knows, fetch and persist the remainder, and
//! publish a work item per new match.
//!
//! Errors inside a sweep are counted and skipped; only a failed pre-flight
//! aborts the sweep. Matches seen under several tracked players are
//! fetched exactly once.

use std::time::{Duration, Instant};

use hashbrown::HashSet;

use crate::{
	api::{chunk_names, models::PlayerMatches},
	database::models::MatchModel,
	database::queries,
	error::Result,
	metrics,
	types::{routing, MatchDiscovered},
	workers::Environment,
};
use pa_work_queue::Job as _;

/// Standard sweeps track the regular roster; tournament sweeps tag their
/// matches so downstream queues can reorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
	Standard,
	Tournament,
}

impl DiscoveryMode {
	fn discovered_by(&self) -> &'static str {
		match self {
			DiscoveryMode::Standard => "discovery",
			DiscoveryMode::Tournament => "tournament",
		}
	}

	fn priority(&self) -> i32 {
		match self {
			DiscoveryMode::Standard => 0,
			DiscoveryMode::Tournament => 10,
		}
	}
}

/// Counters reported at the end of every sweep.
#[derive(Debug, Default)]
pub struct SweepSummary {
	pub players_scanned: usize,
	pub matches_discovered: usize,
	pub failures: usize,
	pub elapsed: Duration,
}

pub struct DiscoveryService {
	env: Environment,
	mode: DiscoveryMode,
	interval: Duration,
}

impl DiscoveryService {
	pub fn new(env: Environment, mode: DiscoveryMode, interval: Duration) -> Self {
		Self { env, mode, interval }
	}

	/// Sweep forever, sleeping `interval` between sweeps.
	pub async fn run(&self, running: &std::sync::atomic::AtomicBool) -> Result<()> {
		while running.load(std::sync::atomic::Ordering::SeqCst) {
			match self.sweep().await {
				Ok(summary) => log::info!(
					"sweep done: {} players scanned, {} matches discovered, {} failures in {:?}",
					summary.players_scanned,
					summary.matches_discovered,
					summary.failures,
					summary.elapsed,
				),
				Err(e) => log::error!("sweep aborted: {}", e),
			}
			async_std::task::sleep(self.interval).await;
		}
		Ok(())
	}

	/// One discovery sweep. Pre-flight failures abort with no side effects.
	pub async fn sweep(&self) -> Result<SweepSummary> {
		let started = Instant::now();
		self.env.db.ping().await?;
		self.env.publisher.healthcheck().await.map_err(pa_work_queue::Error::from)?;

		let mut conn = self.env.db.conn().await?;
		let players = queries::tracked_players(&mut conn, None).await?;
		let known = queries::known_match_ids(&mut conn).await?;
		drop(conn);

		let names: Vec<String> = players.into_iter().map(|p| p.name).collect();
		let mut summary = SweepSummary { players_scanned: names.len(), ..Default::default() };
		let mut seen_this_sweep: HashSet<String> = HashSet::new();

		for chunk in chunk_names(&names) {
			let lookups = match self.env.api.players(chunk).await {
				Ok(lookups) => lookups,
				Err(e) => {
					log::warn!("player lookup failed for chunk of {}: {}", chunk.len(), e);
					summary.failures += 1;
					continue;
				}
			};

			// sequential per chunk: a match observed under several players
			// is fetched once
			for match_id in new_match_ids(&lookups, &known, &mut seen_this_sweep) {
				match self.ingest_match(&match_id).await {
					Ok(()) => summary.matches_discovered += 1,
					Err(e) => {
						log::warn!("failed to ingest match {}: {}", match_id, e);
						summary.failures += 1;
					}
				}
			}
		}

		summary.elapsed = started.elapsed();
		if summary.failures > 0 {
			metrics::WORKER_ERRORS.with_label_values(&["discovery"]).inc_by(summary.failures as u64);
		}
		Ok(summary)
	}

	/// Fetch one new match, persist it as `discovered` and publish the
	/// work item.
	async fn ingest_match(&self, match_id: &str) -> Result<()> {
		let detail = self.env.api.match_detail(match_id).await?;
		let model = MatchModel {
			match_id: detail.match_id.clone(),
			map_name: detail.map_name.clone(),
			game_mode: detail.game_mode.clone(),
			game_type: detail.game_type.clone(),
			telemetry_url: detail.telemetry_url.clone(),
			created_at: detail.created_at,
			discovered_by: Some(self.mode.discovered_by().to_string()),
			discovery_priority: Some(self.mode.priority()),
			is_tournament_match: self.mode == DiscoveryMode::Tournament,
		};
		self.env.db.insert(model).await?;

		MatchDiscovered {
			match_id: detail.match_id,
			map_name: detail.map_name,
			game_mode: detail.game_mode,
			game_type: detail.game_type,
			telemetry_url: detail.telemetry_url.unwrap_or_default(),
			created_at: detail.created_at,
		}
		.enqueue(&self.env.publisher)
		.await?;
		log::debug!("published {} for new match", routing::MATCH_DISCOVERED);
		Ok(())
	}
}

/// The ids from a chunk of lookups that are neither in the store nor
/// already seen in this sweep, in observation order.
fn new_match_ids(
	lookups: &[PlayerMatches],
	known: &HashSet<String>,
	seen_this_sweep: &mut HashSet<String>,
) -> Vec<String> {
	let mut fresh = Vec::new();
	for lookup in lookups {
		for match_id in &lookup.match_ids {
			if known.contains(match_id) {
				continue;
			}
			if seen_this_sweep.insert(match_id.clone()) {
				fresh.push(match_id.clone());
			}
		}
	}
	fresh
}

#[cfg(test)]
mod tests {
	use super::*;

	fn lookup(name: &str, ids: &[&str]) -> PlayerMatches {
		PlayerMatches {
			name: name.into(),
			account_id: format!("account.{}", name),
			match_ids: ids.iter().map(|s| s.to_string()).collect(),
		}
	}

	#[test]
	fn overlapping_rosters_yield_each_match_once() {
		let lookups = vec![lookup("P1", &["m1", "m2"]), lookup("P2", &["m2", "m3"])];
		let known = HashSet::new();
		let mut seen = HashSet::new();
		let fresh = new_match_ids(&lookups, &known, &mut seen);
		assert_eq!(fresh, vec!["m1", "m2", "m3"]);
	}

	#[test]
	fn known_matches_are_subtracted() {
		let lookups = vec![lookup("P1", &["m1", "m2"])];
		let known: HashSet<String> = ["m1".to_string()].iter().cloned().collect();
		let mut seen = HashSet::new();
		assert_eq!(new_match_ids(&lookups, &known, &mut seen), vec!["m2"]);
	}

	#[test]
	fn a_second_sweep_with_everything_known_discovers_nothing() {
		let lookups = vec![lookup("P1", &["m1", "m2"]), lookup("P2", &["m2", "m3"])];
		let known: HashSet<String> =
			["m1", "m2", "m3"].iter().map(|s| s.to_string()).collect();
		let mut seen = HashSet::new();
		assert!(new_match_ids(&lookups, &known, &mut seen).is_empty());
	}
}
