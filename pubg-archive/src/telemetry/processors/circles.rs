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

//! Safe-zone position samples, stored only for tracked players: each
//! periodic game state joined with the player's position at that moment.

use hashbrown::{HashMap, HashSet};

use crate::database::models::CirclePositionModel;
use crate::telemetry::events::{GameState, CM_PER_METER};
use crate::telemetry::TelemetryEvent;
use crate::types::MatchMeta;

pub fn extract(meta: &MatchMeta, events: &[TelemetryEvent], tracked: &HashSet<String>) -> Vec<CirclePositionModel> {
	// periodic zone states in trace order
	let states: Vec<(chrono::DateTime<chrono::Utc>, &GameState)> = events
		.iter()
		.filter_map(|e| match e {
			TelemetryEvent::GameStatePeriodic(g) => Some((g.timestamp, &g.game_state)),
			_ => None,
		})
		.collect();
	if states.is_empty() {
		return Vec::new();
	}

	let mut seen: HashMap<(String, i32), ()> = HashMap::new();
	let mut rows = Vec::new();
	for event in events {
		let sample = match event {
			TelemetryEvent::PlayerPosition(sample) => sample,
			_ => continue,
		};
		let character = &sample.character;
		if character.is_npc() || !tracked.contains(&character.name) {
			continue;
		}
		// the zone state in force when the sample was taken
		let split = states.partition_point(|(t, _)| *t <= sample.timestamp);
		let state = match split.checked_sub(1) {
			Some(i) => states[i].1,
			None => continue,
		};
		if seen.insert((character.name.clone(), state.elapsed_time), ()).is_some() {
			continue;
		}

		let distance_from_center =
			character.location.distance_2d(&state.safety_zone_position) / CM_PER_METER;
		let radius = state.safety_zone_radius / CM_PER_METER;
		rows.push(CirclePositionModel {
			match_id: meta.match_id.clone(),
			player_name: character.name.clone(),
			elapsed_time: state.elapsed_time,
			center_x: state.safety_zone_position.x / CM_PER_METER,
			center_y: state.safety_zone_position.y / CM_PER_METER,
			radius,
			player_x: character.location.x / CM_PER_METER,
			player_y: character.location.y / CM_PER_METER,
			distance_from_center,
			distance_from_edge: radius - distance_from_center,
			in_zone: distance_from_center <= radius,
		});
	}
	rows
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::telemetry::events::*;
	use crate::telemetry::processors::test_util::*;

	fn game_state(secs: i64, elapsed: i32, center_x: f64, radius: f64) -> TelemetryEvent {
		TelemetryEvent::GameStatePeriodic(GameStatePeriodic {
			timestamp: at(secs),
			game_state: GameState {
				elapsed_time: elapsed,
				num_alive_players: 40,
				safety_zone_position: Location { x: center_x, y: 0.0, z: 0.0 },
				safety_zone_radius: radius,
				..Default::default()
			},
		})
	}

	fn tracked(names: &[&str]) -> HashSet<String> {
		names.iter().map(|n| n.to_string()).collect()
	}

	#[test]
	fn samples_join_the_zone_state_in_force() {
		let events = vec![
			game_state(0, 60, 0.0, 200_000.0),
			position(10, player("Alice", 1, 100_000.0, 0.0), 70),
			game_state(120, 180, 0.0, 100_000.0),
			position(130, player("Alice", 1, 150_000.0, 0.0), 190),
		];
		let rows = extract(&meta(), &events, &tracked(&["Alice"]));
		assert_eq!(rows.len(), 2);
		// inside the 2000m circle at 1000m out
		assert!(rows[0].in_zone);
		assert!((rows[0].distance_from_center - 1_000.0).abs() < 0.001);
		assert!((rows[0].distance_from_edge - 1_000.0).abs() < 0.001);
		// outside the shrunk 1000m circle at 1500m out
		assert!(!rows[1].in_zone);
		assert!(rows[1].distance_from_edge < 0.0);
	}

	#[test]
	fn untracked_players_are_not_stored() {
		let events = vec![game_state(0, 60, 0.0, 200_000.0), position(10, player("Bob", 2, 0.0, 0.0), 70)];
		assert!(extract(&meta(), &events, &tracked(&["Alice"])).is_empty());
	}

	#[test]
	fn one_row_per_player_per_zone_state() {
		let events = vec![
			game_state(0, 60, 0.0, 200_000.0),
			position(10, player("Alice", 1, 0.0, 0.0), 70),
			position(20, player("Alice", 1, 5_000.0, 0.0), 80),
		];
		let rows = extract(&meta(), &events, &tracked(&["Alice"]));
		assert_eq!(rows.len(), 1);
	}
}
