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

//! Per-(player, weapon-category) sums of damage, kills and knocks.

use hashbrown::HashMap;

use crate::database::models::WeaponDistributionModel;
use crate::telemetry::TelemetryEvent;
use crate::types::MatchMeta;

/// The closed category set.
pub const CATEGORIES: [&str; 10] =
	["AR", "DMR", "SR", "SMG", "Shotgun", "LMG", "Pistol", "Melee", "Throwable", "Other"];

/// Map an upstream damage-causer name onto its category.
pub fn category_for_causer(causer: &str) -> &'static str {
	match causer {
		"WeapHK416_C" | "WeapAK47_C" | "WeapSCAR-L_C" | "WeapM16A4_C" | "WeapG36C_C" | "WeapQBZ95_C"
		| "WeapBerylM762_C" | "WeapMk47Mutant_C" | "WeapAUG_C" | "WeapGroza_C" | "WeapACE32_C" | "WeapK2_C" => "AR",
		"WeapSKS_C" | "WeapMini14_C" | "WeapMk14_C" | "WeapSLR_C" | "WeapQBU88_C" | "WeapVSS_C" | "WeapMk12_C"
		| "WeapDragunov_C" => "DMR",
		"WeapKar98k_C" | "WeapM24_C" | "WeapAWM_C" | "WeapWin94_C" | "WeapMosinNagant_C" | "WeapL6_C" => "SR",
		"WeapUMP_C" | "WeapUMP45_C" | "WeapVector_C" | "WeapUZI_C" | "WeapThompson_C" | "WeapBizonPP19_C"
		| "WeapMP5K_C" | "WeapP90_C" => "SMG",
		"WeapSaiga12_C" | "WeapBerreta686_C" | "WeapWinchester_C" | "WeapDP12_C" | "WeapSawnoff_C"
		| "WeapM1014_C" => "Shotgun",
		"WeapDP28_C" | "WeapM249_C" | "WeapMG3_C" | "WeapL86A2_C" => "LMG",
		"WeapM1911_C" | "WeapM9_C" | "WeapNagantM1895_C" | "WeapRhino_C" | "WeapG18_C" | "WeapDesertEagle_C"
		| "WeapSkorpion_C" => "Pistol",
		"WeapPan_C" | "WeapMachete_C" | "WeapCowbar_C" | "WeapSickle_C" => "Melee",
		"ProjGrenade_C" | "ProjMolotov_C" | "ProjFlashBang_C" | "ProjSmokeBomb_C" | "ProjStickyGrenade_C"
		| "ProjC4_C" | "ProjBluezoneGrenade_C" | "WeapMolotov_C" | "WeapGrenade_C" => "Throwable",
		other => {
			// punches report the pawn as the causer
			if other.contains("PlayerMale") || other.contains("PlayerFemale") {
				"Melee"
			} else if other.starts_with("Proj") {
				"Throwable"
			} else {
				"Other"
			}
		}
	}
}

pub fn extract(meta: &MatchMeta, events: &[TelemetryEvent]) -> Vec<WeaponDistributionModel> {
	let mut totals: HashMap<(String, &'static str), WeaponDistributionModel> = HashMap::new();

	for event in events {
		match event {
			TelemetryEvent::PlayerTakeDamage(e) => {
				if let Some(attacker) = e.attacker.as_ref().filter(|a| !a.is_npc() && !a.name.is_empty()) {
					if attacker.team_id != e.victim.team_id && !e.victim.is_npc() {
						let category = category_for_causer(&e.damage_causer_name);
						slot(&mut totals, meta, &attacker.name, category).damage += e.damage;
					}
				}
			}
			TelemetryEvent::PlayerKill(e) => {
				if let Some(killer) = e.killer.as_ref().filter(|k| !k.is_npc()) {
					if !e.victim.is_npc() {
						let category = category_for_causer(&e.damage_info().damage_causer_name);
						slot(&mut totals, meta, &killer.name, category).kills += 1;
					}
				}
			}
			TelemetryEvent::PlayerMakeGroggy(e) => {
				if let Some(attacker) = e.attacker.as_ref().filter(|a| !a.is_npc()) {
					if !e.victim.is_npc() {
						let category = category_for_causer(&e.damage_causer_name);
						slot(&mut totals, meta, &attacker.name, category).knocks += 1;
					}
				}
			}
			_ => {}
		}
	}

	let mut rows: Vec<WeaponDistributionModel> = totals.into_iter().map(|(_, v)| v).collect();
	rows.sort_by(|a, b| (&a.player_name, &a.weapon_category).cmp(&(&b.player_name, &b.weapon_category)));
	rows
}

fn slot<'a>(
	totals: &'a mut HashMap<(String, &'static str), WeaponDistributionModel>,
	meta: &MatchMeta,
	player: &str,
	category: &'static str,
) -> &'a mut WeaponDistributionModel {
	totals.entry((player.to_string(), category)).or_insert_with(|| WeaponDistributionModel {
		match_id: meta.match_id.clone(),
		player_name: player.to_string(),
		weapon_category: category.to_string(),
		damage: 0.0,
		kills: 0,
		knocks: 0,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::telemetry::processors::test_util::*;

	#[test]
	fn causer_names_map_to_the_closed_set() {
		assert_eq!(category_for_causer("WeapHK416_C"), "AR");
		assert_eq!(category_for_causer("WeapKar98k_C"), "SR");
		assert_eq!(category_for_causer("WeapUMP45_C"), "SMG");
		assert_eq!(category_for_causer("ProjGrenade_C"), "Throwable");
		assert_eq!(category_for_causer("PlayerMale_A_C"), "Melee");
		assert_eq!(category_for_causer("BP_PickupTruck_A_01_C"), "Other");
		assert!(CATEGORIES.contains(&category_for_causer("anything")));
	}

	#[test]
	fn damage_kills_and_knocks_roll_up_per_category() {
		let alice = || player("Alice", 1, 0.0, 0.0);
		let bob = || player("Bob", 2, 0.0, 0.0);
		let events = vec![
			damage(10, Some(alice()), bob(), 30.0, "WeapHK416_C"),
			damage(11, Some(alice()), bob(), 25.0, "WeapAK47_C"),
			groggy(12, alice(), bob(), 1),
			kill(13, Some(alice()), bob(), "WeapHK416_C", "TorsoShot"),
		];
		let rows = extract(&meta(), &events);
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].weapon_category, "AR");
		assert!((rows[0].damage - 55.0).abs() < f64::EPSILON);
		assert_eq!(rows[0].kills, 1);
		assert_eq!(rows[0].knocks, 1);
	}

	#[test]
	fn team_damage_does_not_count_toward_distribution() {
		let events = vec![damage(10, Some(player("Alice", 1, 0.0, 0.0)), player("Adam", 1, 0.0, 0.0), 30.0, "WeapHK416_C")];
		assert!(extract(&meta(), &events).is_empty());
	}
}
