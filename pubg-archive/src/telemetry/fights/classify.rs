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

//! Qualification and outcome rules. First matching qualification rule
//! wins; everything that fails all four is an execution or stray damage,
//! not a fight.

use hashbrown::HashMap;

use super::{Engagement, FightOutcome, TeamOutcome};

/// Rule 3: combined damage across the engagement.
const RECIPROCAL_DAMAGE_TOTAL: f64 = 150.0;
/// Rule 3: minimum share of the total each team must have contributed.
const RECIPROCAL_DAMAGE_SHARE: f64 = 0.20;
/// Rule 4: damage every team must have dealt around a lone knock.
const RETURN_FIRE_DAMAGE: f64 = 75.0;

/// Decide whether a closed engagement is a fight. Returns the reason used
/// for the fight record.
pub(super) fn qualifies(engagement: &Engagement) -> Option<String> {
	let casualties = engagement.knocks + engagement.kills;
	if casualties >= 2 {
		return Some(format!("{} knocks/kills", casualties));
	}

	if engagement.kills == 1 && engagement.knocks == 0 {
		if let Some(reason) = lone_kill_with_resistance(engagement) {
			return Some(reason);
		}
	}

	if engagement.total_damage >= RECIPROCAL_DAMAGE_TOTAL {
		let every_team_contributed = engagement.teams.iter().all(|team| {
			engagement.team_damage.get(team).copied().unwrap_or(0.0)
				>= engagement.total_damage * RECIPROCAL_DAMAGE_SHARE
		});
		if every_team_contributed {
			return Some(format!("sustained reciprocal damage ({:.0} HP)", engagement.total_damage));
		}
	}

	if engagement.knocks == 1 && engagement.kills == 0 {
		let every_team_returned_fire = engagement
			.teams
			.iter()
			.all(|team| engagement.team_damage.get(team).copied().unwrap_or(0.0) >= RETURN_FIRE_DAMAGE);
		if every_team_returned_fire {
			return Some("single knock with return fire".to_string());
		}
	}

	None
}

/// Rule 2: a single instant kill only counts when the victim resisted in
/// proportion to how badly outnumbered they were.
fn lone_kill_with_resistance(engagement: &Engagement) -> Option<String> {
	let victim = engagement.participants.values().find(|t| t.was_killed)?;
	let sizes = engagement.team_sizes();
	let victim_team_size = sizes.get(&victim.team_id).copied().unwrap_or(1).max(1);
	let largest_opponent =
		sizes.iter().filter(|(team, _)| **team != victim.team_id).map(|(_, n)| *n).max().unwrap_or(1);

	let ratio = largest_opponent as f64 / victim_team_size as f64;
	let threshold = if ratio >= 4.0 {
		75.0
	} else if ratio >= 2.0 {
		50.0
	} else {
		25.0
	};

	if victim.damage_dealt >= threshold {
		Some(format!("single kill, victim resisted {:.0} HP (threshold {:.0})", victim.damage_dealt, threshold))
	} else {
		None
	}
}

/// Classify the outcome of a qualified engagement.
pub(super) fn outcome(
	engagement: &Engagement,
	sizes: &HashMap<i32, i32>,
	team_ids: &[i32],
) -> (FightOutcome, Option<i32>, Option<i32>, std::collections::HashMap<i32, TeamOutcome>) {
	let deaths = |team: i32| engagement.team_deaths.get(&team).copied().unwrap_or(0);
	let kills = |team: i32| engagement.team_kills.get(&team).copied().unwrap_or(0);
	let knocks = |team: i32| engagement.team_knocks.get(&team).copied().unwrap_or(0);
	let damage = |team: i32| engagement.team_damage.get(&team).copied().unwrap_or(0.0);

	let mut outcomes = std::collections::HashMap::new();

	if team_ids.len() >= 3 {
		// third party: single out the biggest loser and the opportunist
		let loser = team_ids.iter().copied().max_by_key(|t| deaths(*t)).filter(|t| deaths(*t) > 0);
		let winner = team_ids
			.iter()
			.copied()
			.filter(|t| Some(*t) != loser)
			.max_by(|a, b| {
				(kills(*a), knocks(*a))
					.cmp(&(kills(*b), knocks(*b)))
					.then(damage(*a).partial_cmp(&damage(*b)).unwrap_or(std::cmp::Ordering::Equal))
			});
		for team in team_ids {
			let outcome = if Some(*team) == winner {
				TeamOutcome::Won
			} else if Some(*team) == loser {
				TeamOutcome::Lost
			} else {
				TeamOutcome::Draw
			};
			outcomes.insert(*team, outcome);
		}
		return (FightOutcome::ThirdParty, winner, loser, outcomes);
	}

	// two-team case
	if let [a, b] = *team_ids {
		let (deaths_a, deaths_b) = (deaths(a), deaths(b));
		let wiped_a = deaths_a >= sizes.get(&a).copied().unwrap_or(i32::MAX);
		let wiped_b = deaths_b >= sizes.get(&b).copied().unwrap_or(i32::MAX);
		let diff = (deaths_a - deaths_b).abs();
		let total = deaths_a + deaths_b;

		let decision = if wiped_a != wiped_b {
			Some((if wiped_a { b } else { a }, FightOutcome::DecisiveWin))
		} else if diff >= 2 {
			Some((if deaths_a > deaths_b { b } else { a }, FightOutcome::DecisiveWin))
		} else if diff == 1 && total >= 2 {
			Some((if deaths_a > deaths_b { b } else { a }, FightOutcome::MarginalWin))
		} else {
			None
		};

		return match decision {
			Some((winner, fight_outcome)) => {
				let loser = if winner == a { b } else { a };
				outcomes.insert(winner, TeamOutcome::Won);
				outcomes.insert(loser, TeamOutcome::Lost);
				(fight_outcome, Some(winner), Some(loser), outcomes)
			}
			None => {
				outcomes.insert(a, TeamOutcome::Draw);
				outcomes.insert(b, TeamOutcome::Draw);
				(FightOutcome::Draw, None, None, outcomes)
			}
		};
	}

	// degenerate single-team engagement (team damage filtered elsewhere)
	for team in team_ids {
		outcomes.insert(*team, TeamOutcome::Draw);
	}
	(FightOutcome::Draw, None, None, outcomes)
}

#[cfg(test)]
mod tests {
	use super::super::{combat_stream, Engagement};
	use super::*;
	use crate::telemetry::processors::test_util::*;

	fn engagement_of(events: Vec<crate::telemetry::TelemetryEvent>) -> Engagement {
		let combat = combat_stream(&events);
		let mut iter = combat.iter();
		let mut engagement = Engagement::open(iter.next().expect("at least one combat event"));
		for event in iter {
			engagement.admit(event);
		}
		engagement
	}

	#[test]
	fn reciprocal_damage_requires_every_team_to_contribute() {
		// 200 HP total but one-sided: no fight
		let one_sided = engagement_of(vec![
			damage(10, Some(player("Alice", 1, 0.0, 0.0)), player("Bob", 2, 0.0, 0.0), 100.0, "WeapHK416_C"),
			damage(11, Some(player("Alice", 1, 0.0, 0.0)), player("Bob", 2, 0.0, 0.0), 100.0, "WeapHK416_C"),
		]);
		assert!(qualifies(&one_sided).is_none());

		let reciprocal = engagement_of(vec![
			damage(10, Some(player("Alice", 1, 0.0, 0.0)), player("Bob", 2, 0.0, 0.0), 110.0, "WeapHK416_C"),
			damage(11, Some(player("Bob", 2, 0.0, 0.0)), player("Alice", 1, 0.0, 0.0), 50.0, "WeapAK47_C"),
		]);
		assert!(qualifies(&reciprocal).is_some());
	}

	#[test]
	fn single_knock_needs_return_fire_from_every_team() {
		let quiet = engagement_of(vec![groggy(10, player("Alice", 1, 0.0, 0.0), player("Bob", 2, 0.0, 0.0), 1)]);
		assert!(qualifies(&quiet).is_none());

		let contested = engagement_of(vec![
			damage(8, Some(player("Alice", 1, 0.0, 0.0)), player("Bob", 2, 0.0, 0.0), 80.0, "WeapHK416_C"),
			damage(9, Some(player("Bob", 2, 0.0, 0.0)), player("Alice", 1, 0.0, 0.0), 90.0, "WeapAK47_C"),
			groggy(10, player("Alice", 1, 0.0, 0.0), player("Bob", 2, 0.0, 0.0), 1),
		]);
		assert!(qualifies(&contested).is_some());
	}

	#[test]
	fn death_diff_of_two_is_decisive() {
		let engagement = engagement_of(vec![
			kill(10, Some(player("Alice", 1, 0.0, 0.0)), player("Bob", 2, 0.0, 0.0), "WeapHK416_C", "TorsoShot"),
			kill(20, Some(player("Alice", 1, 0.0, 0.0)), player("Ben", 2, 0.0, 0.0), "WeapHK416_C", "TorsoShot"),
			kill(30, Some(player("Bob2", 2, 0.0, 0.0)), player("Adam", 1, 0.0, 0.0), "WeapAK47_C", "TorsoShot"),
			kill(40, Some(player("Alice", 1, 0.0, 0.0)), player("Bob2", 2, 0.0, 0.0), "WeapHK416_C", "TorsoShot"),
		]);
		let sizes = engagement.team_sizes();
		let mut team_ids: Vec<i32> = sizes.keys().copied().collect();
		team_ids.sort_unstable();
		let (outcome, winner, loser, map) = super::outcome(&engagement, &sizes, &team_ids);
		assert_eq!(outcome, FightOutcome::DecisiveWin);
		assert_eq!(winner, Some(1));
		assert_eq!(loser, Some(2));
		assert_eq!(map[&1], TeamOutcome::Won);
	}

	#[test]
	fn one_death_each_is_a_draw() {
		let engagement = engagement_of(vec![
			kill(10, Some(player("Alice", 1, 0.0, 0.0)), player("Bob", 2, 0.0, 0.0), "WeapHK416_C", "TorsoShot"),
			kill(20, Some(player("Ben", 2, 0.0, 0.0)), player("Adam", 1, 0.0, 0.0), "WeapAK47_C", "TorsoShot"),
		]);
		let sizes = engagement.team_sizes();
		let mut team_ids: Vec<i32> = sizes.keys().copied().collect();
		team_ids.sort_unstable();
		let (outcome, winner, _, map) = super::outcome(&engagement, &sizes, &team_ids);
		// both teams lost one but neither was wiped out entirely
		assert_eq!(outcome, FightOutcome::Draw);
		assert!(winner.is_none());
		assert_eq!(map[&1], TeamOutcome::Draw);
	}
}
