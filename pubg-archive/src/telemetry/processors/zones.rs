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

//! Time spent outside the safe zone, derived from blue-zone damage ticks
//! rather than geometric tests so it matches the game's own boundary. The
//! zone ticks players once per second while they stand in the blue.

use hashbrown::HashMap;

use crate::database::models::ZoneTimeModel;
use crate::telemetry::TelemetryEvent;
use crate::types::MatchMeta;

pub fn extract(meta: &MatchMeta, events: &[TelemetryEvent]) -> Vec<ZoneTimeModel> {
	let mut totals: HashMap<String, ZoneTimeModel> = HashMap::new();
	for event in events {
		let damage = match event {
			TelemetryEvent::PlayerTakeDamage(damage) => damage,
			_ => continue,
		};
		if !damage.is_bluezone_tick() || damage.victim.is_npc() || damage.victim.name.is_empty() {
			continue;
		}
		let entry = totals.entry(damage.victim.name.clone()).or_insert_with(|| ZoneTimeModel {
			match_id: meta.match_id.clone(),
			player_name: damage.victim.name.clone(),
			bluezone_ticks: 0,
			bluezone_damage: 0.0,
			time_outside_zone: 0.0,
		});
		entry.bluezone_ticks += 1;
		entry.bluezone_damage += damage.damage;
		entry.time_outside_zone = entry.bluezone_ticks as f64;
	}

	let mut rows: Vec<ZoneTimeModel> = totals.into_iter().map(|(_, v)| v).collect();
	rows.sort_by(|a, b| a.player_name.cmp(&b.player_name));
	rows
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::telemetry::events::*;
	use crate::telemetry::processors::test_util::*;

	fn bluezone_tick(secs: i64, victim: Character, amount: f64) -> TelemetryEvent {
		TelemetryEvent::PlayerTakeDamage(PlayerTakeDamage {
			timestamp: at(secs),
			attack_id: 0,
			attacker: None,
			victim,
			damage_type_category: "Damage_BlueZone".into(),
			damage_reason: "NonSpecific".into(),
			damage: amount,
			damage_causer_name: "BlueZone".into(),
		})
	}

	#[test]
	fn zone_time_counts_ticks_not_geometry() {
		let events = vec![
			bluezone_tick(10, player("Alice", 1, 0.0, 0.0), 0.4),
			bluezone_tick(11, player("Alice", 1, 0.0, 0.0), 0.4),
			bluezone_tick(12, player("Alice", 1, 0.0, 0.0), 0.4),
			// gun damage is not zone time
			damage(13, Some(player("Bob", 2, 0.0, 0.0)), player("Alice", 1, 0.0, 0.0), 20.0, "WeapHK416_C"),
		];
		let rows = extract(&meta(), &events);
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].bluezone_ticks, 3);
		assert!((rows[0].time_outside_zone - 3.0).abs() < f64::EPSILON);
		assert!((rows[0].bluezone_damage - 1.2).abs() < 1e-9);
	}
}
