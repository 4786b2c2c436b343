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

//! Typed telemetry events. The upstream emits a few dozen event kinds as
//! loosely structured objects discriminated by `_T`; only the kinds the
//! processors consume are modeled, everything else collapses to
//! [`TelemetryEvent::Other`].

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Positions are reported in centimeters.
pub const CM_PER_METER: f64 = 100.0;

#[derive(Debug, Clone)]
pub enum TelemetryEvent {
	ParachuteLanding(ParachuteLanding),
	PlayerKill(PlayerKill),
	PlayerTakeDamage(PlayerTakeDamage),
	PlayerMakeGroggy(PlayerMakeGroggy),
	GameStatePeriodic(GameStatePeriodic),
	PlayerPosition(PlayerPosition),
	ItemUse(ItemUse),
	PlayerAttack(PlayerAttack),
	/// Any kind the pipeline does not consume; the tag is retained for
	/// diagnostics.
	Other(String),
}

impl TelemetryEvent {
	/// Parse one raw element. Unknown kinds succeed as `Other`; known kinds
	/// with malformed bodies are an error the caller counts and skips.
	pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
		let kind = value.get("_T").and_then(serde_json::Value::as_str).unwrap_or_default();
		match kind {
			"LogParachuteLanding" => Ok(Self::ParachuteLanding(serde_json::from_value(value)?)),
			"LogPlayerKillV2" => Ok(Self::PlayerKill(serde_json::from_value(value)?)),
			"LogPlayerTakeDamage" => Ok(Self::PlayerTakeDamage(serde_json::from_value(value)?)),
			"LogPlayerMakeGroggy" => Ok(Self::PlayerMakeGroggy(serde_json::from_value(value)?)),
			"LogGameStatePeriodic" => Ok(Self::GameStatePeriodic(serde_json::from_value(value)?)),
			"LogPlayerPosition" => Ok(Self::PlayerPosition(serde_json::from_value(value)?)),
			"LogItemUse" => Ok(Self::ItemUse(serde_json::from_value(value)?)),
			"LogPlayerAttack" => Ok(Self::PlayerAttack(serde_json::from_value(value)?)),
			other => Ok(Self::Other(other.to_string())),
		}
	}

	pub fn timestamp(&self) -> Option<DateTime<Utc>> {
		match self {
			Self::ParachuteLanding(e) => Some(e.timestamp),
			Self::PlayerKill(e) => Some(e.timestamp),
			Self::PlayerTakeDamage(e) => Some(e.timestamp),
			Self::PlayerMakeGroggy(e) => Some(e.timestamp),
			Self::GameStatePeriodic(e) => Some(e.timestamp),
			Self::PlayerPosition(e) => Some(e.timestamp),
			Self::ItemUse(e) => Some(e.timestamp),
			Self::PlayerAttack(e) => Some(e.timestamp),
			Self::Other(_) => None,
		}
	}
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
pub struct Location {
	#[serde(default)]
	pub x: f64,
	#[serde(default)]
	pub y: f64,
	#[serde(default)]
	pub z: f64,
}

impl Location {
	pub fn distance(&self, other: &Location) -> f64 {
		let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
		(dx * dx + dy * dy + dz * dz).sqrt()
	}

	pub fn distance_2d(&self, other: &Location) -> f64 {
		let (dx, dy) = (self.x - other.x, self.y - other.y);
		(dx * dx + dy * dy).sqrt()
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Character {
	pub name: String,
	pub team_id: i32,
	pub health: f64,
	pub ranking: i32,
	pub account_id: String,
	pub location: Location,
}

impl Character {
	/// Known scripted non-player actors plus the `ai_` identifier prefix.
	pub fn is_npc(&self) -> bool {
		const NPC_NAMES: [&str; 7] =
			["Commander", "Guard", "Pillar", "SkySoldier", "Soldier", "PillarSoldier", "ZombieSoldier"];
		NPC_NAMES.contains(&self.name.as_str()) || self.account_id.starts_with("ai_") || self.name.starts_with("ai_")
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Item {
	pub item_id: String,
	pub stack_count: i32,
	pub category: String,
	pub sub_category: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DamageInfo {
	pub damage_causer_name: String,
	pub damage_reason: String,
	pub distance: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParachuteLanding {
	#[serde(rename = "_D")]
	pub timestamp: DateTime<Utc>,
	pub character: Character,
	#[serde(default)]
	pub distance: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerKill {
	#[serde(rename = "_D")]
	pub timestamp: DateTime<Utc>,
	#[serde(default)]
	pub attack_id: i64,
	#[serde(rename = "dBNOId", default)]
	pub dbno_id: i64,
	pub victim: Character,
	#[serde(default)]
	pub killer: Option<Character>,
	#[serde(default)]
	pub finisher: Option<Character>,
	#[serde(default)]
	pub killer_damage_info: Option<DamageInfo>,
	#[serde(default)]
	pub is_suicide: bool,
}

impl PlayerKill {
	pub fn damage_info(&self) -> DamageInfo {
		self.killer_damage_info.clone().unwrap_or_default()
	}

	pub fn is_headshot(&self) -> bool {
		self.damage_info().damage_reason == "HeadShot"
	}

	/// Deaths with no killer and no suicide flag are zone or environment
	/// deaths.
	pub fn is_bluezone(&self) -> bool {
		self.killer.is_none() && !self.is_suicide
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerTakeDamage {
	#[serde(rename = "_D")]
	pub timestamp: DateTime<Utc>,
	#[serde(default)]
	pub attack_id: i64,
	#[serde(default)]
	pub attacker: Option<Character>,
	pub victim: Character,
	#[serde(default)]
	pub damage_type_category: String,
	#[serde(default)]
	pub damage_reason: String,
	#[serde(default)]
	pub damage: f64,
	#[serde(default)]
	pub damage_causer_name: String,
}

impl PlayerTakeDamage {
	pub fn is_bluezone_tick(&self) -> bool {
		self.damage_type_category == "Damage_BlueZone"
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMakeGroggy {
	#[serde(rename = "_D")]
	pub timestamp: DateTime<Utc>,
	#[serde(default)]
	pub attack_id: i64,
	#[serde(rename = "dBNOId", default)]
	pub dbno_id: i64,
	#[serde(default)]
	pub attacker: Option<Character>,
	pub victim: Character,
	#[serde(default)]
	pub damage_reason: String,
	#[serde(default)]
	pub damage_type_category: String,
	#[serde(default)]
	pub damage_causer_name: String,
	#[serde(default)]
	pub distance: f64,
	#[serde(default)]
	pub is_attacker_in_vehicle: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatePeriodic {
	#[serde(rename = "_D")]
	pub timestamp: DateTime<Utc>,
	pub game_state: GameState,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameState {
	pub elapsed_time: i32,
	pub num_alive_players: i32,
	pub safety_zone_position: Location,
	pub safety_zone_radius: f64,
	pub poison_gas_warning_position: Location,
	pub poison_gas_warning_radius: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPosition {
	#[serde(rename = "_D")]
	pub timestamp: DateTime<Utc>,
	pub character: Character,
	#[serde(default)]
	pub elapsed_time: i32,
	#[serde(default)]
	pub num_alive_players: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUse {
	#[serde(rename = "_D")]
	pub timestamp: DateTime<Utc>,
	pub character: Character,
	pub item: Item,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAttack {
	#[serde(rename = "_D")]
	pub timestamp: DateTime<Utc>,
	#[serde(default)]
	pub attack_id: i64,
	pub attacker: Character,
	#[serde(default)]
	pub attack_type: String,
	#[serde(default)]
	pub weapon: Item,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn npc_names_are_filtered() {
		let npc = Character { name: "SkySoldier".into(), ..Default::default() };
		assert!(npc.is_npc());
		let bot = Character { name: "ai_172".into(), ..Default::default() };
		assert!(bot.is_npc());
		let player = Character { name: "Shroud".into(), ..Default::default() };
		assert!(!player.is_npc());
	}

	#[test]
	fn kill_event_parses_with_null_killer() {
		let raw = r#"{
			"_T": "LogPlayerKillV2",
			"_D": "2021-03-01T12:10:00.000Z",
			"attackId": 101,
			"dBNOId": 7,
			"victim": { "name": "Bob", "teamId": 2, "location": { "x": 100.0, "y": 200.0, "z": 0.0 } },
			"killer": null,
			"killerDamageInfo": null,
			"isSuicide": false
		}"#;
		let event: PlayerKill = serde_json::from_str(raw).unwrap();
		assert!(event.killer.is_none());
		assert!(event.is_bluezone());
		assert!(!event.is_headshot());
	}

	#[test]
	fn headshots_come_from_the_damage_reason() {
		let raw = r#"{
			"_T": "LogPlayerKillV2",
			"_D": "2021-03-01T12:10:00.000Z",
			"victim": { "name": "Bob", "teamId": 2 },
			"killer": { "name": "Alice", "teamId": 1 },
			"killerDamageInfo": { "damageCauserName": "WeapHK416_C", "damageReason": "HeadShot", "distance": 21750.0 }
		}"#;
		let event: PlayerKill = serde_json::from_str(raw).unwrap();
		assert!(event.is_headshot());
		assert_eq!(event.damage_info().damage_causer_name, "WeapHK416_C");
	}

	#[test]
	fn bluezone_damage_ticks_are_recognized() {
		let raw = r#"{
			"_T": "LogPlayerTakeDamage",
			"_D": "2021-03-01T12:11:00.000Z",
			"attacker": null,
			"victim": { "name": "Bob", "teamId": 2 },
			"damageTypeCategory": "Damage_BlueZone",
			"damage": 0.4
		}"#;
		let event: PlayerTakeDamage = serde_json::from_str(raw).unwrap();
		assert!(event.is_bluezone_tick());
	}

	#[test]
	fn locations_measure_distance() {
		let a = Location { x: 0.0, y: 0.0, z: 0.0 };
		let b = Location { x: 300.0, y: 400.0, z: 0.0 };
		assert!((a.distance(&b) - 500.0).abs() < f64::EPSILON);
		assert!((a.distance_2d(&b) - 500.0).abs() < f64::EPSILON);
	}
}
