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

//! Reconstructs discrete multi-team engagements from the combat stream.
//!
//! Combat events are clustered by team overlap, distance from the
//! engagement's fixed center and a rolling idle timeout; closed clusters
//! are qualified (an execution is not a fight), classified and attributed
//! per participant.

pub mod classify;
pub mod mobility;

use chrono::{DateTime, Duration, Utc};
use hashbrown::{HashMap, HashSet};

use super::events::{Character, Location, TelemetryEvent, CM_PER_METER};
use super::processors::PositionIndex;
use crate::types::MatchMeta;

/// Rolling idle timeout since the last combat event inside an engagement.
pub const ENGAGEMENT_WINDOW_SECS: i64 = 45;
/// Spatial radius from the engagement's initial center within which new
/// participants may be admitted.
pub const MAX_ENGAGEMENT_DISTANCE_M: f64 = 300.0;
/// Absolute cap; combat past this point opens a new engagement.
pub const MAX_FIGHT_DURATION_SECS: i64 = 240;
/// A step larger than this counts as a significant relocation.
pub const SIGNIFICANT_RELOCATION_M: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FightOutcome {
	DecisiveWin,
	MarginalWin,
	Draw,
	ThirdParty,
}

impl FightOutcome {
	pub fn as_str(&self) -> &'static str {
		match self {
			FightOutcome::DecisiveWin => "DECISIVE_WIN",
			FightOutcome::MarginalWin => "MARGINAL_WIN",
			FightOutcome::Draw => "DRAW",
			FightOutcome::ThirdParty => "THIRD_PARTY",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamOutcome {
	Won,
	Lost,
	Draw,
}

impl TeamOutcome {
	pub fn as_str(&self) -> &'static str {
		match self {
			TeamOutcome::Won => "WON",
			TeamOutcome::Lost => "LOST",
			TeamOutcome::Draw => "DRAW",
		}
	}
}

/// A classified engagement ready for persistence.
#[derive(Debug)]
pub struct Fight {
	pub match_id: String,
	pub started_at: DateTime<Utc>,
	pub ended_at: DateTime<Utc>,
	pub duration_seconds: f64,
	pub team_ids: Vec<i32>,
	/// Initial engagement point, meters.
	pub center_x: f64,
	pub center_y: f64,
	pub fight_radius: f64,
	pub total_knocks: i32,
	pub total_kills: i32,
	pub total_damage: f64,
	pub outcome: FightOutcome,
	pub winner_team: Option<i32>,
	pub loser_team: Option<i32>,
	pub team_outcomes: std::collections::HashMap<i32, TeamOutcome>,
	pub classification_reason: String,
	pub participants: Vec<FightParticipant>,
}

#[derive(Debug)]
pub struct FightParticipant {
	pub player_name: String,
	pub team_id: i32,
	pub damage_dealt: f64,
	pub damage_taken: f64,
	pub knocks: i32,
	pub kills: i32,
	pub attacks: i32,
	pub total_movement_distance: f64,
	pub position_variance: f64,
	pub significant_relocations: i32,
	pub mobility_rate: f64,
	pub fight_radius: f64,
	pub survived: bool,
	pub was_knocked: bool,
	pub was_killed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CombatKind {
	Knock,
	Kill,
	Damage,
	Attack,
}

/// One normalized combat event fed to the clusterer.
struct CombatEvent {
	timestamp: DateTime<Utc>,
	kind: CombatKind,
	attacker: Option<Actor>,
	victim: Option<Actor>,
	damage: f64,
}

#[derive(Clone)]
struct Actor {
	name: String,
	team_id: i32,
	location: Location,
}

impl CombatEvent {
	/// Teams touched by this event.
	fn teams(&self) -> Vec<i32> {
		let mut teams = Vec::new();
		if let Some(a) = &self.attacker {
			teams.push(a.team_id);
		}
		if let Some(v) = &self.victim {
			if !teams.contains(&v.team_id) {
				teams.push(v.team_id);
			}
		}
		teams
	}

	/// Anchor position: the victim where there is one, else the attacker.
	fn location(&self) -> Location {
		self.victim.as_ref().or(self.attacker.as_ref()).map(|a| a.location).unwrap_or_default()
	}
}

#[derive(Default)]
struct Tally {
	team_id: i32,
	damage_dealt: f64,
	damage_taken: f64,
	knocks: i32,
	kills: i32,
	attacks: i32,
	was_knocked: bool,
	was_killed: bool,
}

struct Engagement {
	center: Location,
	started_at: DateTime<Utc>,
	last_event_at: DateTime<Utc>,
	teams: HashSet<i32>,
	knocks: i32,
	kills: i32,
	total_damage: f64,
	team_damage: HashMap<i32, f64>,
	team_deaths: HashMap<i32, i32>,
	team_kills: HashMap<i32, i32>,
	team_knocks: HashMap<i32, i32>,
	participants: HashMap<String, Tally>,
}

impl Engagement {
	fn open(event: &CombatEvent) -> Self {
		let mut engagement = Engagement {
			center: event.location(),
			started_at: event.timestamp,
			last_event_at: event.timestamp,
			teams: HashSet::new(),
			knocks: 0,
			kills: 0,
			total_damage: 0.0,
			team_damage: HashMap::new(),
			team_deaths: HashMap::new(),
			team_kills: HashMap::new(),
			team_knocks: HashMap::new(),
			participants: HashMap::new(),
		};
		engagement.admit(event);
		engagement
	}

	/// An event may join when its teams overlap ours, it happened near the
	/// fixed center, the idle window has not elapsed and the duration cap
	/// has not been hit.
	fn accepts(&self, event: &CombatEvent) -> bool {
		let overlap = event.teams().iter().any(|t| self.teams.contains(t));
		let near = event.location().distance(&self.center) / CM_PER_METER <= MAX_ENGAGEMENT_DISTANCE_M;
		let fresh = event.timestamp - self.last_event_at <= Duration::seconds(ENGAGEMENT_WINDOW_SECS);
		let capped = event.timestamp - self.started_at >= Duration::seconds(MAX_FIGHT_DURATION_SECS);
		overlap && near && fresh && !capped
	}

	fn admit(&mut self, event: &CombatEvent) {
		self.last_event_at = event.timestamp;
		for team in event.teams() {
			self.teams.insert(team);
		}

		if let Some(attacker) = &event.attacker {
			let tally = self.tally(attacker);
			match event.kind {
				CombatKind::Knock => tally.knocks += 1,
				CombatKind::Kill => tally.kills += 1,
				CombatKind::Damage => tally.damage_dealt += event.damage,
				CombatKind::Attack => tally.attacks += 1,
			}
		}
		if let Some(victim) = &event.victim {
			let tally = self.tally(victim);
			match event.kind {
				CombatKind::Knock => tally.was_knocked = true,
				CombatKind::Kill => tally.was_killed = true,
				CombatKind::Damage => tally.damage_taken += event.damage,
				CombatKind::Attack => {}
			}
		}

		match event.kind {
			CombatKind::Knock => {
				self.knocks += 1;
				if let Some(a) = &event.attacker {
					*self.team_knocks.entry(a.team_id).or_insert(0) += 1;
				}
			}
			CombatKind::Kill => {
				self.kills += 1;
				if let Some(a) = &event.attacker {
					*self.team_kills.entry(a.team_id).or_insert(0) += 1;
				}
				if let Some(v) = &event.victim {
					*self.team_deaths.entry(v.team_id).or_insert(0) += 1;
				}
			}
			CombatKind::Damage => {
				self.total_damage += event.damage;
				if let Some(a) = &event.attacker {
					*self.team_damage.entry(a.team_id).or_insert(0.0) += event.damage;
				}
			}
			CombatKind::Attack => {}
		}
	}

	fn tally(&mut self, actor: &Actor) -> &mut Tally {
		let tally = self.participants.entry(actor.name.clone()).or_insert_with(Tally::default);
		tally.team_id = actor.team_id;
		tally
	}

	/// Participants per team, for imbalance thresholds and wipe detection.
	fn team_sizes(&self) -> HashMap<i32, i32> {
		let mut sizes = HashMap::new();
		for tally in self.participants.values() {
			*sizes.entry(tally.team_id).or_insert(0) += 1;
		}
		sizes
	}
}

/// Cluster the combat stream of one match into classified fights.
pub fn track_fights(meta: &MatchMeta, events: &[TelemetryEvent]) -> Vec<Fight> {
	let combat = combat_stream(events);
	let index = PositionIndex::build(events);

	let mut open: Vec<Engagement> = Vec::new();
	let mut closed: Vec<Engagement> = Vec::new();

	for event in &combat {
		// retire engagements whose idle window has lapsed
		let mut i = 0;
		while i < open.len() {
			if event.timestamp - open[i].last_event_at > Duration::seconds(ENGAGEMENT_WINDOW_SECS) {
				closed.push(open.swap_remove(i));
			} else {
				i += 1;
			}
		}

		match open.iter_mut().find(|e| e.accepts(event)) {
			Some(engagement) => engagement.admit(event),
			None => open.push(Engagement::open(event)),
		}
	}
	closed.extend(open);

	let mut fights: Vec<Fight> =
		closed.into_iter().filter_map(|engagement| seal(meta, engagement, &index)).collect();
	fights.sort_by_key(|f| f.started_at);
	fights
}

/// Qualify and classify a closed engagement; executions and stray damage
/// produce no fight.
fn seal(meta: &MatchMeta, engagement: Engagement, index: &PositionIndex) -> Option<Fight> {
	let reason = classify::qualifies(&engagement)?;

	// Recompute the team list from the participants actually present; raw
	// damage events can name teams that never engaged.
	let sizes = engagement.team_sizes();
	let mut team_ids: Vec<i32> = sizes.keys().copied().collect();
	team_ids.sort_unstable();

	let (outcome, winner_team, loser_team, team_outcomes) = classify::outcome(&engagement, &sizes, &team_ids);

	let started_at = engagement.started_at;
	let ended_at = engagement.last_event_at;
	let duration_seconds = (ended_at - started_at).num_milliseconds() as f64 / 1_000.0;

	let mut participants: Vec<FightParticipant> = engagement
		.participants
		.iter()
		.map(|(name, tally)| {
			let movement = mobility::attribute(index, name, started_at, ended_at, duration_seconds);
			FightParticipant {
				player_name: name.clone(),
				team_id: tally.team_id,
				damage_dealt: tally.damage_dealt,
				damage_taken: tally.damage_taken,
				knocks: tally.knocks,
				kills: tally.kills,
				attacks: tally.attacks,
				total_movement_distance: movement.total_movement_distance,
				position_variance: movement.position_variance,
				significant_relocations: movement.significant_relocations,
				mobility_rate: movement.mobility_rate,
				fight_radius: movement.fight_radius,
				survived: !tally.was_killed,
				was_knocked: tally.was_knocked,
				was_killed: tally.was_killed,
			}
		})
		.collect();
	participants.sort_by(|a, b| a.player_name.cmp(&b.player_name));

	let fight_radius = participants.iter().map(|p| p.fight_radius).fold(0.0, f64::max);

	Some(Fight {
		match_id: meta.match_id.clone(),
		started_at,
		ended_at,
		duration_seconds,
		team_ids,
		center_x: engagement.center.x / CM_PER_METER,
		center_y: engagement.center.y / CM_PER_METER,
		fight_radius,
		total_knocks: engagement.knocks,
		total_kills: engagement.kills,
		total_damage: engagement.total_damage,
		outcome,
		winner_team,
		loser_team,
		team_outcomes,
		classification_reason: reason,
		participants,
	})
}

/// Normalize knocks, kills, inter-team damage and attacks into one
/// timestamp-ordered stream. NPCs never enter the stream.
fn combat_stream(events: &[TelemetryEvent]) -> Vec<CombatEvent> {
	let mut combat = Vec::new();
	for event in events {
		match event {
			TelemetryEvent::PlayerMakeGroggy(e) => {
				if let (Some(attacker), victim) = (actor(e.attacker.as_ref()), actor(Some(&e.victim))) {
					combat.push(CombatEvent {
						timestamp: e.timestamp,
						kind: CombatKind::Knock,
						attacker: Some(attacker),
						victim,
						damage: 0.0,
					});
				}
			}
			TelemetryEvent::PlayerKill(e) => {
				if let Some(victim) = actor(Some(&e.victim)) {
					let attacker = actor(e.killer.as_ref());
					// environment deaths carry no combat information
					if attacker.is_some() {
						combat.push(CombatEvent {
							timestamp: e.timestamp,
							kind: CombatKind::Kill,
							attacker,
							victim: Some(victim),
							damage: 0.0,
						});
					}
				}
			}
			TelemetryEvent::PlayerTakeDamage(e) => {
				let attacker = match actor(e.attacker.as_ref()) {
					Some(attacker) => attacker,
					None => continue,
				};
				let victim = match actor(Some(&e.victim)) {
					Some(victim) => victim,
					None => continue,
				};
				// only inter-team damage is combat
				if attacker.team_id == victim.team_id {
					continue;
				}
				combat.push(CombatEvent {
					timestamp: e.timestamp,
					kind: CombatKind::Damage,
					attacker: Some(attacker),
					victim: Some(victim),
					damage: e.damage,
				});
			}
			TelemetryEvent::PlayerAttack(e) => {
				if let Some(attacker) = actor(Some(&e.attacker)) {
					combat.push(CombatEvent {
						timestamp: e.timestamp,
						kind: CombatKind::Attack,
						attacker: Some(attacker),
						victim: None,
						damage: 0.0,
					});
				}
			}
			_ => {}
		}
	}
	combat.sort_by_key(|e| e.timestamp);
	combat
}

fn actor(character: Option<&Character>) -> Option<Actor> {
	let character = character?;
	if character.is_npc() || character.name.is_empty() {
		return None;
	}
	Some(Actor { name: character.name.clone(), team_id: character.team_id, location: character.location })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::telemetry::processors::test_util::*;

	#[test]
	fn zero_casualties_zero_fights() {
		let events = vec![
			damage(10, Some(player("Alice", 1, 0.0, 0.0)), player("Bob", 2, 100.0, 0.0), 20.0, "WeapHK416_C"),
		];
		assert!(track_fights(&meta(), &events).is_empty());
	}

	#[test]
	fn two_knocks_always_qualify() {
		let events = vec![
			groggy(10, player("Alice", 1, 0.0, 0.0), player("Bob", 2, 1_000.0, 0.0), 1),
			groggy(20, player("Alice", 1, 0.0, 0.0), player("Ben", 2, 1_200.0, 0.0), 2),
		];
		let fights = track_fights(&meta(), &events);
		assert_eq!(fights.len(), 1);
		assert_eq!(fights[0].total_knocks, 2);
		assert_eq!(fights[0].team_ids, vec![1, 2]);
	}

	#[test]
	fn third_party_scenario_classifies_per_team() {
		// T1 knocks one of T2, T2 knocks one of T1, then T3 kills two of T1,
		// all within the engagement window and radius.
		let events = vec![
			groggy(10, player("A1", 1, 0.0, 0.0), player("B1", 2, 1_000.0, 0.0), 1),
			groggy(20, player("B2", 2, 1_500.0, 0.0), player("A2", 1, 500.0, 0.0), 2),
			kill(30, Some(player("C1", 3, 2_000.0, 0.0)), player("A1", 1, 0.0, 0.0), "WeapKar98k_C", "HeadShot"),
			kill(40, Some(player("C1", 3, 2_000.0, 0.0)), player("A2", 1, 500.0, 0.0), "WeapKar98k_C", "TorsoShot"),
		];
		let fights = track_fights(&meta(), &events);
		assert_eq!(fights.len(), 1);
		let fight = &fights[0];
		assert_eq!(fight.outcome, FightOutcome::ThirdParty);
		assert_eq!(fight.loser_team, Some(1));
		assert_eq!(fight.winner_team, Some(3));
		assert_eq!(fight.team_outcomes[&1], TeamOutcome::Lost);
		assert_eq!(fight.team_outcomes[&3], TeamOutcome::Won);
		assert_eq!(fight.team_outcomes[&2], TeamOutcome::Draw);
	}

	#[test]
	fn execution_without_resistance_is_not_a_fight() {
		// 4v1 pick: four attackers, victim dealt no damage
		let victim = || player("Solo", 2, 0.0, 0.0);
		let events = vec![
			damage(10, Some(player("A1", 1, 100.0, 0.0)), victim(), 30.0, "WeapHK416_C"),
			damage(11, Some(player("A2", 1, 200.0, 0.0)), victim(), 30.0, "WeapHK416_C"),
			damage(12, Some(player("A3", 1, 300.0, 0.0)), victim(), 30.0, "WeapHK416_C"),
			damage(13, Some(player("A4", 1, 400.0, 0.0)), victim(), 9.0, "WeapHK416_C"),
			kill(14, Some(player("A1", 1, 100.0, 0.0)), victim(), "WeapHK416_C", "TorsoShot"),
		];
		assert!(track_fights(&meta(), &events).is_empty());
	}

	#[test]
	fn lone_kill_with_resistance_qualifies() {
		// even 1v1: victim fought back for 30 HP before dying
		let events = vec![
			damage(8, Some(player("Bob", 2, 1_000.0, 0.0)), player("Alice", 1, 0.0, 0.0), 30.0, "WeapAK47_C"),
			damage(10, Some(player("Alice", 1, 0.0, 0.0)), player("Bob", 2, 1_000.0, 0.0), 40.0, "WeapHK416_C"),
			kill(12, Some(player("Alice", 1, 0.0, 0.0)), player("Bob", 2, 1_000.0, 0.0), "WeapHK416_C", "TorsoShot"),
		];
		let fights = track_fights(&meta(), &events);
		assert_eq!(fights.len(), 1);
		assert_eq!(fights[0].outcome, FightOutcome::DecisiveWin);
		assert_eq!(fights[0].winner_team, Some(1));
	}

	#[test]
	fn duration_cap_seals_the_engagement() {
		// knocks every 40s keep the window alive; the cap splits the brawl
		let mut events = Vec::new();
		let mut dbno = 0;
		for t in (0..=280).step_by(40) {
			dbno += 1;
			let (attacker, victim) = if dbno % 2 == 0 {
				(player("Alice", 1, 0.0, 0.0), player("Bob", 2, 1_000.0, 0.0))
			} else {
				(player("Bob", 2, 1_000.0, 0.0), player("Alice", 1, 0.0, 0.0))
			};
			events.push(groggy(t as i64, attacker, victim, dbno));
		}
		let fights = track_fights(&meta(), &events);
		assert_eq!(fights.len(), 2);
		assert!(fights[0].duration_seconds <= MAX_FIGHT_DURATION_SECS as f64);
	}

	#[test]
	fn distant_combat_opens_a_separate_engagement() {
		// the same teams clash again 400m away from the first center
		let events = vec![
			groggy(10, player("A1", 1, 0.0, 0.0), player("B1", 2, 0.0, 0.0), 1),
			groggy(15, player("B1", 2, 0.0, 0.0), player("A1", 1, 0.0, 0.0), 2),
			groggy(20, player("A1", 1, 40_000.0, 0.0), player("B1", 2, 40_000.0, 0.0), 3),
			groggy(25, player("B1", 2, 40_000.0, 0.0), player("A1", 1, 40_000.0, 0.0), 4),
		];
		let fights = track_fights(&meta(), &events);
		assert_eq!(fights.len(), 2);
	}

	#[test]
	fn npcs_never_appear_in_participants() {
		let events = vec![
			groggy(10, player("Alice", 1, 0.0, 0.0), player("Bob", 2, 1_000.0, 0.0), 1),
			groggy(12, player("ai_7", 99, 0.0, 0.0), player("Alice", 1, 0.0, 0.0), 2),
			kill(20, Some(player("Alice", 1, 0.0, 0.0)), player("Bob", 2, 1_000.0, 0.0), "WeapHK416_C", "TorsoShot"),
		];
		let fights = track_fights(&meta(), &events);
		assert_eq!(fights.len(), 1);
		assert!(fights[0].participants.iter().all(|p| p.player_name != "ai_7"));
		assert!(fights[0].team_ids.len() <= fights[0].participants.len());
	}
}
