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

//! Parachute landings: one row per live player.

use hashbrown::HashSet;

use crate::database::models::LandingModel;
use crate::telemetry::events::CM_PER_METER;
use crate::telemetry::TelemetryEvent;
use crate::types::MatchMeta;

use super::trace_start;

pub fn extract(meta: &MatchMeta, events: &[TelemetryEvent]) -> Vec<LandingModel> {
	let start = match trace_start(events) {
		Some(start) => start,
		None => return Vec::new(),
	};

	let mut seen: HashSet<String> = HashSet::new();
	let mut rows = Vec::new();
	for event in events {
		if let TelemetryEvent::ParachuteLanding(landing) = event {
			let character = &landing.character;
			if character.is_npc() || character.name.is_empty() {
				continue;
			}
			// players can land more than once after redeploys; the drop
			// landing is the first
			if !seen.insert(character.name.clone()) {
				continue;
			}
			rows.push(LandingModel {
				match_id: meta.match_id.clone(),
				player_name: character.name.clone(),
				team_id: character.team_id,
				x: character.location.x / CM_PER_METER,
				y: character.location.y / CM_PER_METER,
				z: character.location.z / CM_PER_METER,
				elapsed_time: (landing.timestamp - start).num_milliseconds() as f64 / 1_000.0,
			});
		}
	}
	rows
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::telemetry::events::*;
	use crate::telemetry::processors::test_util::*;

	fn landing(secs: i64, character: Character) -> TelemetryEvent {
		TelemetryEvent::ParachuteLanding(ParachuteLanding { timestamp: at(secs), character, distance: 120.0 })
	}

	#[test]
	fn one_row_per_player_first_landing_wins() {
		let events = vec![
			landing(10, player("Alice", 1, 100_000.0, 200_000.0)),
			landing(12, player("Bob", 2, 110_000.0, 210_000.0)),
			landing(300, player("Alice", 1, 500_000.0, 500_000.0)),
		];
		let rows = extract(&meta(), &events);
		assert_eq!(rows.len(), 2);
		let alice = rows.iter().find(|r| r.player_name == "Alice").unwrap();
		assert!((alice.x - 1_000.0).abs() < f64::EPSILON);
		assert!((alice.elapsed_time - 0.0).abs() < f64::EPSILON);
	}

	#[test]
	fn npc_landings_are_ignored() {
		let events = vec![landing(10, player("SkySoldier", 90, 0.0, 0.0))];
		assert!(extract(&meta(), &events).is_empty());
	}
}
