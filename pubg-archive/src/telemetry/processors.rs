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

//! Event-stream processors. Each extractor is a pure function
//! `(match_meta, &[TelemetryEvent]) -> rows` targeting exactly one fact
//! table; all of them borrow the one parsed event slice.
//!
//! Positions and distances leave the processors in meters; the raw feed
//! reports centimeters.

pub mod circles;
pub mod damage;
pub mod items;
pub mod kills;
pub mod knocks;
pub mod landings;
pub mod weapons;
pub mod zones;

use chrono::{DateTime, Duration, Utc};
use hashbrown::HashMap;

use super::events::{Location, TelemetryEvent};

/// Timestamp of the earliest event; per-match elapsed times are measured
/// from here.
pub(crate) fn trace_start(events: &[TelemetryEvent]) -> Option<DateTime<Utc>> {
	events.iter().filter_map(TelemetryEvent::timestamp).min()
}

/// Time-ordered position samples per player, with the team each player was
/// observed on. Fed by `LogPlayerPosition` plus the actor locations carried
/// on combat events.
#[derive(Default)]
pub(crate) struct PositionIndex {
	samples: HashMap<String, Vec<(DateTime<Utc>, Location)>>,
	teams: HashMap<String, i32>,
}

impl PositionIndex {
	pub(crate) fn build(events: &[TelemetryEvent]) -> Self {
		let mut index = PositionIndex::default();
		for event in events {
			match event {
				TelemetryEvent::PlayerPosition(e) => index.push(e.timestamp, &e.character),
				TelemetryEvent::PlayerTakeDamage(e) => {
					if let Some(attacker) = &e.attacker {
						index.push(e.timestamp, attacker);
					}
					index.push(e.timestamp, &e.victim);
				}
				TelemetryEvent::PlayerMakeGroggy(e) => {
					if let Some(attacker) = &e.attacker {
						index.push(e.timestamp, attacker);
					}
					index.push(e.timestamp, &e.victim);
				}
				TelemetryEvent::PlayerAttack(e) => index.push(e.timestamp, &e.attacker),
				TelemetryEvent::PlayerKill(e) => {
					if let Some(killer) = &e.killer {
						index.push(e.timestamp, killer);
					}
					index.push(e.timestamp, &e.victim);
				}
				_ => {}
			}
		}
		// event arrays are timestamp-ordered upstream, but samples merged
		// from several kinds can interleave slightly
		for samples in index.samples.values_mut() {
			samples.sort_by_key(|(t, _)| *t);
		}
		index
	}

	fn push(&mut self, timestamp: DateTime<Utc>, character: &super::events::Character) {
		if character.is_npc() || character.name.is_empty() {
			return;
		}
		self.samples.entry(character.name.clone()).or_default().push((timestamp, character.location));
		self.teams.insert(character.name.clone(), character.team_id);
	}

	pub(crate) fn team_of(&self, name: &str) -> Option<i32> {
		self.teams.get(name).copied()
	}

	/// Every player observed on `team_id`.
	pub(crate) fn members_of(&self, team_id: i32) -> Vec<&str> {
		self.teams.iter().filter(|(_, t)| **t == team_id).map(|(name, _)| name.as_str()).collect()
	}

	/// All samples for `name` inside `[start, end]`, in time order.
	pub(crate) fn samples_between(
		&self,
		name: &str,
		start: DateTime<Utc>,
		end: DateTime<Utc>,
	) -> Vec<(DateTime<Utc>, Location)> {
		match self.samples.get(name) {
			Some(samples) => samples.iter().filter(|(t, _)| *t >= start && *t <= end).copied().collect(),
			None => Vec::new(),
		}
	}

	/// The sample closest in time to `at`, if one lies within `window`.
	pub(crate) fn closest_sample(
		&self,
		name: &str,
		at: DateTime<Utc>,
		window: Duration,
	) -> Option<(DateTime<Utc>, Location)> {
		let samples = self.samples.get(name)?;
		let split = samples.partition_point(|(t, _)| *t < at);
		let before = split.checked_sub(1).and_then(|i| samples.get(i));
		let after = samples.get(split);
		let best = match (before, after) {
			(Some(b), Some(a)) => {
				if at - b.0 <= a.0 - at {
					Some(*b)
				} else {
					Some(*a)
				}
			}
			(Some(b), None) => Some(*b),
			(None, Some(a)) => Some(*a),
			(None, None) => None,
		}?;
		let gap = if best.0 > at { best.0 - at } else { at - best.0 };
		if gap <= window {
			Some(best)
		} else {
			None
		}
	}
}

/// When each player died, from the kill stream.
pub(crate) fn death_times(events: &[TelemetryEvent]) -> HashMap<String, DateTime<Utc>> {
	let mut deaths = HashMap::new();
	for event in events {
		if let TelemetryEvent::PlayerKill(kill) = event {
			deaths.entry(kill.victim.name.clone()).or_insert(kill.timestamp);
		}
	}
	deaths
}

#[cfg(test)]
pub(crate) mod test_util {
	//! Builders for synthetic traces used across processor tests.

	use chrono::{DateTime, TimeZone, Utc};

	use crate::telemetry::events::*;
	use crate::telemetry::TelemetryEvent;
	use crate::types::MatchMeta;

	pub fn meta() -> MatchMeta {
		MatchMeta { match_id: "m-1".into(), map_name: "Desert_Main".into(), game_type: "official".into() }
	}

	pub fn at(secs: i64) -> DateTime<Utc> {
		Utc.timestamp(1_614_600_000 + secs, 0)
	}

	pub fn player(name: &str, team: i32, x: f64, y: f64) -> Character {
		Character {
			name: name.into(),
			team_id: team,
			health: 100.0,
			location: Location { x, y, z: 0.0 },
			..Default::default()
		}
	}

	pub fn kill(secs: i64, killer: Option<Character>, victim: Character, causer: &str, reason: &str) -> TelemetryEvent {
		TelemetryEvent::PlayerKill(PlayerKill {
			timestamp: at(secs),
			attack_id: secs,
			dbno_id: 0,
			victim,
			killer,
			finisher: None,
			killer_damage_info: Some(DamageInfo {
				damage_causer_name: causer.into(),
				damage_reason: reason.into(),
				distance: 15_000.0,
			}),
			is_suicide: false,
		})
	}

	pub fn damage(secs: i64, attacker: Option<Character>, victim: Character, amount: f64, causer: &str) -> TelemetryEvent {
		TelemetryEvent::PlayerTakeDamage(PlayerTakeDamage {
			timestamp: at(secs),
			attack_id: secs,
			attacker,
			victim,
			damage_type_category: "Damage_Gun".into(),
			damage_reason: "TorsoShot".into(),
			damage: amount,
			damage_causer_name: causer.into(),
		})
	}

	pub fn groggy(secs: i64, attacker: Character, victim: Character, dbno_id: i64) -> TelemetryEvent {
		TelemetryEvent::PlayerMakeGroggy(PlayerMakeGroggy {
			timestamp: at(secs),
			attack_id: secs,
			dbno_id,
			attacker: Some(attacker),
			victim,
			damage_reason: "TorsoShot".into(),
			damage_type_category: "Damage_Gun".into(),
			damage_causer_name: "WeapHK416_C".into(),
			distance: 5_000.0,
			is_attacker_in_vehicle: false,
		})
	}

	pub fn position(secs: i64, character: Character, elapsed: i32) -> TelemetryEvent {
		TelemetryEvent::PlayerPosition(PlayerPosition {
			timestamp: at(secs),
			character,
			elapsed_time: elapsed,
			num_alive_players: 50,
		})
	}
}
