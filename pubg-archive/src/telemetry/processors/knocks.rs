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

//! Knock facts with the victim-support snapshot: how far away the victim's
//! live teammates stood at the moment of the knock.

use chrono::Duration;

use crate::database::models::KnockEventModel;
use crate::telemetry::events::CM_PER_METER;
use crate::telemetry::TelemetryEvent;
use crate::types::MatchMeta;

use super::{death_times, PositionIndex};

/// Teammate positions are matched against the closest sample within this
/// window around the knock.
const SUPPORT_WINDOW_SECS: i64 = 5;

pub fn extract(meta: &MatchMeta, events: &[TelemetryEvent]) -> Vec<KnockEventModel> {
	let index = PositionIndex::build(events);
	let deaths = death_times(events);
	let window = Duration::seconds(SUPPORT_WINDOW_SECS);

	let mut rows = Vec::new();
	for (event_id, event) in events.iter().enumerate() {
		let groggy = match event {
			TelemetryEvent::PlayerMakeGroggy(groggy) => groggy,
			_ => continue,
		};
		if groggy.victim.is_npc() {
			continue;
		}
		let attacker = groggy.attacker.as_ref().filter(|a| !a.is_npc());

		// live teammates of the victim at knock time
		let mut distances: Vec<f64> = Vec::new();
		let mut teammates_alive = 0;
		for teammate in index.members_of(groggy.victim.team_id) {
			if teammate == groggy.victim.name {
				continue;
			}
			let alive = deaths.get(teammate).map(|died| *died > groggy.timestamp).unwrap_or(true);
			if !alive {
				continue;
			}
			teammates_alive += 1;
			if let Some((_, location)) = index.closest_sample(teammate, groggy.timestamp, window) {
				distances.push(location.distance(&groggy.victim.location) / CM_PER_METER);
			}
		}

		let nearest = distances.iter().cloned().fold(None, |acc: Option<f64>, d| match acc {
			Some(best) if best <= d => Some(best),
			_ => Some(d),
		});
		let avg = if distances.is_empty() {
			None
		} else {
			Some(distances.iter().sum::<f64>() / distances.len() as f64)
		};
		let variance = avg.map(|mean| {
			distances.iter().map(|d| (d - mean) * (d - mean)).sum::<f64>() / distances.len() as f64
		});

		rows.push(KnockEventModel {
			match_id: meta.match_id.clone(),
			event_id: event_id as i32,
			dbno_id: groggy.dbno_id,
			event_time: groggy.timestamp,
			attacker_name: attacker.map(|a| a.name.clone()),
			attacker_team: attacker.map(|a| a.team_id),
			victim_name: groggy.victim.name.clone(),
			victim_team: groggy.victim.team_id,
			weapon: groggy.damage_causer_name.clone(),
			distance: groggy.distance / CM_PER_METER,
			nearest_teammate_distance: nearest,
			avg_teammate_distance: avg,
			teammates_within_50m: distances.iter().filter(|d| **d <= 50.0).count() as i32,
			teammates_within_100m: distances.iter().filter(|d| **d <= 100.0).count() as i32,
			teammates_within_200m: distances.iter().filter(|d| **d <= 200.0).count() as i32,
			teammate_spread_variance: variance,
			teammates_alive,
		});
	}
	rows
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::telemetry::processors::test_util::*;

	#[test]
	fn support_snapshot_measures_live_teammates() {
		let events = vec![
			// victim team 2: Bob (victim), Ben at 30m, Bill at 150m
			position(98, player("Ben", 2, 3_000.0, 0.0), 98),
			position(99, player("Bill", 2, 15_000.0, 0.0), 99),
			groggy(100, player("Alice", 1, 0.0, 0.0), player("Bob", 2, 0.0, 0.0), 1),
		];
		let rows = extract(&meta(), &events);
		assert_eq!(rows.len(), 1);
		let row = &rows[0];
		assert_eq!(row.teammates_alive, 2);
		assert_eq!(row.teammates_within_50m, 1);
		assert_eq!(row.teammates_within_200m, 2);
		assert!((row.nearest_teammate_distance.unwrap() - 30.0).abs() < 0.001);
		assert!((row.avg_teammate_distance.unwrap() - 90.0).abs() < 0.001);
	}

	#[test]
	fn dead_teammates_are_not_support() {
		let events = vec![
			position(50, player("Ben", 2, 3_000.0, 0.0), 50),
			kill(60, Some(player("Alice", 1, 0.0, 0.0)), player("Ben", 2, 3_000.0, 0.0), "WeapHK416_C", "TorsoShot"),
			groggy(100, player("Alice", 1, 0.0, 0.0), player("Bob", 2, 0.0, 0.0), 1),
		];
		let rows = extract(&meta(), &events);
		assert_eq!(rows[0].teammates_alive, 0);
		assert!(rows[0].nearest_teammate_distance.is_none());
	}

	#[test]
	fn teammates_without_nearby_samples_still_count_as_alive() {
		let events = vec![
			// Ben's only sample is 4 minutes before the knock
			position(0, player("Ben", 2, 3_000.0, 0.0), 0),
			position(230, player("Carol", 3, 0.0, 0.0), 230),
			groggy(240, player("Alice", 1, 0.0, 0.0), player("Bob", 2, 0.0, 0.0), 1),
		];
		let rows = extract(&meta(), &events);
		assert_eq!(rows[0].teammates_alive, 1);
		assert!(rows[0].nearest_teammate_distance.is_none());
		assert_eq!(rows[0].teammates_within_200m, 0);
	}
}
