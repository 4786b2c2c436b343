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

//! Kill facts plus the per-player finishing summary (kills, kill-steals,
//! knock conversions).

use chrono::Duration;
use hashbrown::{HashMap, HashSet};

use crate::database::models::{FinishingSummaryModel, KillEventModel};
use crate::telemetry::events::CM_PER_METER;
use crate::telemetry::TelemetryEvent;
use crate::types::MatchMeta;

use super::weapons::category_for_causer;

/// A damager within this window of the death who did not land the finishing
/// blow is credited a kill-steal.
const KILL_STEAL_WINDOW_SECS: i64 = 10;

pub fn extract(meta: &MatchMeta, events: &[TelemetryEvent]) -> (Vec<KillEventModel>, Vec<FinishingSummaryModel>) {
	let window = Duration::seconds(KILL_STEAL_WINDOW_SECS);

	// dbno id -> knocking attacker, for conversion credit
	let mut knockers: HashMap<i64, String> = HashMap::new();
	let mut summaries: HashMap<String, FinishingSummaryModel> = HashMap::new();

	for event in events {
		if let TelemetryEvent::PlayerMakeGroggy(groggy) = event {
			if let Some(attacker) = &groggy.attacker {
				if !attacker.is_npc() && !groggy.victim.is_npc() {
					if groggy.dbno_id != 0 {
						knockers.insert(groggy.dbno_id, attacker.name.clone());
					}
					summary(&mut summaries, meta, &attacker.name).knocks += 1;
				}
			}
		}
	}

	let mut rows = Vec::new();
	for (index, event) in events.iter().enumerate() {
		let kill = match event {
			TelemetryEvent::PlayerKill(kill) => kill,
			_ => continue,
		};
		if kill.victim.is_npc() {
			continue;
		}

		let info = kill.damage_info();
		let killer = kill.killer.as_ref().filter(|k| !k.is_npc());
		rows.push(KillEventModel {
			match_id: meta.match_id.clone(),
			event_id: index as i32,
			event_time: kill.timestamp,
			killer_name: killer.map(|k| k.name.clone()),
			killer_team: killer.map(|k| k.team_id),
			victim_name: kill.victim.name.clone(),
			victim_team: kill.victim.team_id,
			weapon: info.damage_causer_name.clone(),
			weapon_category: category_for_causer(&info.damage_causer_name).to_string(),
			distance: info.distance / CM_PER_METER,
			is_headshot: kill.is_headshot(),
			is_suicide: kill.is_suicide,
			is_bluezone: kill.is_bluezone(),
		});

		if let Some(killer) = killer {
			let entry = summary(&mut summaries, meta, &killer.name);
			entry.kills += 1;
			if kill.dbno_id != 0 && knockers.get(&kill.dbno_id).map(String::as_str) == Some(killer.name.as_str()) {
				entry.knocks_converted += 1;
			}
		}

		// Damagers shortly before the death who did not finish the victim.
		let killer_name = killer.map(|k| k.name.as_str());
		let mut credited: HashSet<&str> = HashSet::new();
		for other in events {
			let damage = match other {
				TelemetryEvent::PlayerTakeDamage(damage) => damage,
				_ => continue,
			};
			if damage.victim.name != kill.victim.name {
				continue;
			}
			if damage.timestamp >= kill.timestamp || kill.timestamp - damage.timestamp > window {
				continue;
			}
			let attacker = match &damage.attacker {
				Some(attacker) if !attacker.is_npc() => attacker,
				_ => continue,
			};
			if Some(attacker.name.as_str()) == killer_name || attacker.team_id == kill.victim.team_id {
				continue;
			}
			if credited.insert(attacker.name.as_str()) {
				summary(&mut summaries, meta, &attacker.name).killsteals += 1;
			}
		}
	}

	let mut summaries: Vec<FinishingSummaryModel> = summaries.into_iter().map(|(_, v)| v).collect();
	summaries.sort_by(|a, b| a.player_name.cmp(&b.player_name));
	(rows, summaries)
}

fn summary<'a>(
	summaries: &'a mut HashMap<String, FinishingSummaryModel>,
	meta: &MatchMeta,
	player: &str,
) -> &'a mut FinishingSummaryModel {
	summaries.entry(player.to_string()).or_insert_with(|| FinishingSummaryModel {
		match_id: meta.match_id.clone(),
		player_name: player.to_string(),
		kills: 0,
		killsteals: 0,
		knocks: 0,
		knocks_converted: 0,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::telemetry::processors::test_util::*;

	#[test]
	fn suicides_and_zone_deaths_have_null_killer() {
		let events = vec![kill(100, None, player("Bob", 2, 0.0, 0.0), "", "")];
		let (rows, _) = extract(&meta(), &events);
		assert_eq!(rows.len(), 1);
		assert!(rows[0].killer_name.is_none());
		assert!(rows[0].is_bluezone);
	}

	#[test]
	fn kill_rows_carry_weapon_and_distance_in_meters() {
		let events =
			vec![kill(100, Some(player("Alice", 1, 0.0, 0.0)), player("Bob", 2, 0.0, 0.0), "WeapHK416_C", "HeadShot")];
		let (rows, summaries) = extract(&meta(), &events);
		assert_eq!(rows[0].weapon_category, "AR");
		assert!(rows[0].is_headshot);
		assert!((rows[0].distance - 150.0).abs() < f64::EPSILON);
		assert_eq!(summaries.len(), 1);
		assert_eq!(summaries[0].kills, 1);
	}

	#[test]
	fn damager_inside_window_without_finishing_blow_is_a_killsteal() {
		let victim = || player("Bob", 2, 0.0, 0.0);
		let events = vec![
			// Carol softens the victim 8s before the death
			damage(92, Some(player("Carol", 3, 0.0, 0.0)), victim(), 80.0, "WeapSCAR-L_C"),
			kill(100, Some(player("Alice", 1, 0.0, 0.0)), victim(), "WeapHK416_C", "TorsoShot"),
		];
		let (_, summaries) = extract(&meta(), &events);
		let carol = summaries.iter().find(|s| s.player_name == "Carol").unwrap();
		assert_eq!(carol.killsteals, 1);
		assert_eq!(carol.kills, 0);
		let alice = summaries.iter().find(|s| s.player_name == "Alice").unwrap();
		assert_eq!(alice.killsteals, 0);
		assert_eq!(alice.kills, 1);
	}

	#[test]
	fn damage_outside_window_earns_no_killsteal() {
		let victim = || player("Bob", 2, 0.0, 0.0);
		let events = vec![
			damage(80, Some(player("Carol", 3, 0.0, 0.0)), victim(), 80.0, "WeapSCAR-L_C"),
			kill(100, Some(player("Alice", 1, 0.0, 0.0)), victim(), "WeapHK416_C", "TorsoShot"),
		];
		let (_, summaries) = extract(&meta(), &events);
		assert!(summaries.iter().find(|s| s.player_name == "Carol").is_none());
	}
}
