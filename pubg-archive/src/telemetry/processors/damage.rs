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

//! Damage facts. Self- and team-damage are flagged rather than dropped.

use crate::database::models::DamageEventModel;
use crate::telemetry::TelemetryEvent;
use crate::types::MatchMeta;

pub fn extract(meta: &MatchMeta, events: &[TelemetryEvent]) -> Vec<DamageEventModel> {
	let mut rows = Vec::new();
	for (index, event) in events.iter().enumerate() {
		let damage = match event {
			TelemetryEvent::PlayerTakeDamage(damage) => damage,
			_ => continue,
		};
		if damage.victim.is_npc() || damage.victim.name.is_empty() {
			continue;
		}
		let attacker = damage.attacker.as_ref().filter(|a| !a.name.is_empty());
		let is_self_damage = attacker.map(|a| a.name == damage.victim.name).unwrap_or(false);
		let is_team_damage =
			attacker.map(|a| a.team_id == damage.victim.team_id && a.name != damage.victim.name).unwrap_or(false);
		rows.push(DamageEventModel {
			match_id: meta.match_id.clone(),
			event_id: index as i32,
			event_time: damage.timestamp,
			attacker_name: attacker.map(|a| a.name.clone()),
			attacker_team: attacker.map(|a| a.team_id),
			victim_name: damage.victim.name.clone(),
			victim_team: damage.victim.team_id,
			weapon: damage.damage_causer_name.clone(),
			damage_type: damage.damage_type_category.clone(),
			damage_reason: damage.damage_reason.clone(),
			damage: damage.damage,
			is_self_damage,
			is_team_damage,
		});
	}
	rows
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::telemetry::processors::test_util::*;

	#[test]
	fn self_and_team_damage_are_flagged() {
		let events = vec![
			damage(10, Some(player("Alice", 1, 0.0, 0.0)), player("Alice", 1, 0.0, 0.0), 10.0, "WeapMolotov_C"),
			damage(11, Some(player("Alice", 1, 0.0, 0.0)), player("Adam", 1, 0.0, 0.0), 5.0, "WeapHK416_C"),
			damage(12, Some(player("Alice", 1, 0.0, 0.0)), player("Bob", 2, 0.0, 0.0), 30.0, "WeapHK416_C"),
		];
		let rows = extract(&meta(), &events);
		assert_eq!(rows.len(), 3);
		assert!(rows[0].is_self_damage && !rows[0].is_team_damage);
		assert!(!rows[1].is_self_damage && rows[1].is_team_damage);
		assert!(!rows[2].is_self_damage && !rows[2].is_team_damage);
	}

	#[test]
	fn environment_damage_has_null_attacker() {
		let events = vec![damage(10, None, player("Bob", 2, 0.0, 0.0), 0.4, "BlueZone")];
		let rows = extract(&meta(), &events);
		assert!(rows[0].attacker_name.is_none());
	}

	#[test]
	fn event_ids_are_stable_across_reruns() {
		let events = vec![
			damage(10, Some(player("Alice", 1, 0.0, 0.0)), player("Bob", 2, 0.0, 0.0), 30.0, "WeapHK416_C"),
			damage(11, Some(player("Alice", 1, 0.0, 0.0)), player("Bob", 2, 0.0, 0.0), 25.0, "WeapHK416_C"),
		];
		let first = extract(&meta(), &events);
		let second = extract(&meta(), &events);
		let ids: Vec<i32> = first.iter().map(|r| r.event_id).collect();
		assert_eq!(ids, second.iter().map(|r| r.event_id).collect::<Vec<_>>());
	}
}
