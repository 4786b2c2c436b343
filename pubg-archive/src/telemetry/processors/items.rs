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

//! Per-(match, player) item usage: heals, boosts and throwables.
//! Novelty throwables are excluded; flashbangs count as throwables but
//! never as smokes.

use hashbrown::HashMap;

use crate::database::models::ItemUsageModel;
use crate::telemetry::TelemetryEvent;
use crate::types::MatchMeta;

const HEAL_ITEMS: [&str; 3] = ["Item_Heal_FirstAid_C", "Item_Heal_MedKit_C", "Item_Heal_Bandage_C"];
const BOOST_ITEMS: [&str; 3] =
	["Item_Boost_EnergyDrink_C", "Item_Boost_PainKiller_C", "Item_Boost_AdrenalineSyringe_C"];
const THROWABLE_ITEMS: [&str; 6] = [
	"Item_Weapon_Grenade_C",
	"Item_Weapon_Molotov_C",
	"Item_Weapon_FlashBang_C",
	"Item_Weapon_SmokeBomb_C",
	"Item_Weapon_StickyGrenade_C",
	"Item_Weapon_C4_C",
];
const SMOKE_ITEM: &str = "Item_Weapon_SmokeBomb_C";

pub fn extract(meta: &MatchMeta, events: &[TelemetryEvent]) -> Vec<ItemUsageModel> {
	let mut usage: HashMap<String, ItemUsageModel> = HashMap::new();

	for event in events {
		match event {
			TelemetryEvent::ItemUse(e) => {
				if e.character.is_npc() || e.character.name.is_empty() {
					continue;
				}
				let item_id = e.item.item_id.as_str();
				if HEAL_ITEMS.contains(&item_id) {
					slot(&mut usage, meta, &e.character.name).heals += 1;
				} else if BOOST_ITEMS.contains(&item_id) {
					slot(&mut usage, meta, &e.character.name).boosts += 1;
				}
			}
			TelemetryEvent::PlayerAttack(e) => {
				if e.attacker.is_npc() || e.attack_type != "Weapon" {
					continue;
				}
				let item_id = e.weapon.item_id.as_str();
				if THROWABLE_ITEMS.contains(&item_id) {
					let entry = slot(&mut usage, meta, &e.attacker.name);
					entry.throwables_thrown += 1;
					if item_id == SMOKE_ITEM {
						entry.smokes_thrown += 1;
					}
				}
			}
			_ => {}
		}
	}

	let mut rows: Vec<ItemUsageModel> = usage.into_iter().map(|(_, v)| v).collect();
	rows.sort_by(|a, b| a.player_name.cmp(&b.player_name));
	rows
}

fn slot<'a>(usage: &'a mut HashMap<String, ItemUsageModel>, meta: &MatchMeta, player: &str) -> &'a mut ItemUsageModel {
	usage.entry(player.to_string()).or_insert_with(|| ItemUsageModel {
		match_id: meta.match_id.clone(),
		player_name: player.to_string(),
		heals: 0,
		boosts: 0,
		throwables_thrown: 0,
		smokes_thrown: 0,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::telemetry::events::*;
	use crate::telemetry::processors::test_util::*;

	fn item_use(secs: i64, character: Character, item_id: &str) -> TelemetryEvent {
		TelemetryEvent::ItemUse(ItemUse {
			timestamp: at(secs),
			character,
			item: Item { item_id: item_id.into(), stack_count: 1, category: "Use".into(), sub_category: "".into() },
		})
	}

	fn attack(secs: i64, attacker: Character, item_id: &str) -> TelemetryEvent {
		TelemetryEvent::PlayerAttack(PlayerAttack {
			timestamp: at(secs),
			attack_id: secs,
			attacker,
			attack_type: "Weapon".into(),
			weapon: Item { item_id: item_id.into(), ..Default::default() },
		})
	}

	#[test]
	fn heals_boosts_and_throwables_are_counted() {
		let alice = || player("Alice", 1, 0.0, 0.0);
		let events = vec![
			item_use(10, alice(), "Item_Heal_FirstAid_C"),
			item_use(20, alice(), "Item_Boost_EnergyDrink_C"),
			item_use(25, alice(), "Item_Armor_C_01_Lv3_C"),
			attack(30, alice(), "Item_Weapon_Grenade_C"),
			attack(40, alice(), "Item_Weapon_SmokeBomb_C"),
		];
		let rows = extract(&meta(), &events);
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].heals, 1);
		assert_eq!(rows[0].boosts, 1);
		assert_eq!(rows[0].throwables_thrown, 2);
		assert_eq!(rows[0].smokes_thrown, 1);
	}

	#[test]
	fn flashbangs_are_throwables_but_not_smokes() {
		let events = vec![attack(30, player("Alice", 1, 0.0, 0.0), "Item_Weapon_FlashBang_C")];
		let rows = extract(&meta(), &events);
		assert_eq!(rows[0].throwables_thrown, 1);
		assert_eq!(rows[0].smokes_thrown, 0);
	}

	#[test]
	fn novelty_throwables_are_excluded() {
		let events = vec![
			attack(30, player("Alice", 1, 0.0, 0.0), "Item_Weapon_Snowball_C"),
			attack(31, player("Alice", 1, 0.0, 0.0), "Item_Weapon_Apple_C"),
		];
		assert!(extract(&meta(), &events).is_empty());
	}
}
