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

//! Row models for the archive store. Fact rows are append-only and keyed
//! so that re-processing a match is a no-op.

use chrono::{DateTime, Utc};

/// A tracked player as read from `players`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrackedPlayer {
	pub name: String,
	pub account_id: Option<String>,
}

/// A match row at discovery time. Flags all start false.
#[derive(Debug, Clone)]
pub struct MatchModel {
	pub match_id: String,
	pub map_name: String,
	pub game_mode: String,
	pub game_type: String,
	pub telemetry_url: Option<String>,
	pub created_at: DateTime<Utc>,
	pub discovered_by: Option<String>,
	pub discovery_priority: Option<i32>,
	pub is_tournament_match: bool,
}

/// Per-stage flags plus identity, read back for reprocessing decisions.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MatchRow {
	pub match_id: String,
	pub map_name: String,
	pub game_mode: String,
	pub game_type: String,
	pub telemetry_url: Option<String>,
	pub summary: bool,
	pub telemetry_downloaded: bool,
	pub telemetry_processed: bool,
	pub fights_processed: bool,
	pub stats_aggregated: bool,
	pub is_tournament_match: bool,
}

/// One participant's summary row, upserted on `(match_id, participant_id)`.
#[derive(Debug, Clone)]
pub struct SummaryModel {
	pub match_id: String,
	pub participant_id: String,
	pub name: String,
	pub account_id: Option<String>,
	pub team_id: i32,
	pub placement: i32,
	pub kills: i32,
	pub assists: i32,
	pub damage_dealt: f64,
	pub survival_time: f64,
	pub heals: i32,
	pub boosts: i32,
	pub revives: i32,
	pub headshot_kills: i32,
	pub longest_kill: f64,
	pub walk_distance: f64,
	pub ride_distance: f64,
	pub swim_distance: f64,
	pub team_kills: i32,
	pub vehicle_destroys: i32,
	pub weapons_acquired: i32,
	pub dbnos: i32,
	pub death_type: String,
}

#[derive(Debug, Clone)]
pub struct KillEventModel {
	pub match_id: String,
	pub event_id: i32,
	pub event_time: DateTime<Utc>,
	/// None for suicides and blue-zone deaths.
	pub killer_name: Option<String>,
	pub killer_team: Option<i32>,
	pub victim_name: String,
	pub victim_team: i32,
	pub weapon: String,
	pub weapon_category: String,
	pub distance: f64,
	pub is_headshot: bool,
	pub is_suicide: bool,
	pub is_bluezone: bool,
}

#[derive(Debug, Clone)]
pub struct DamageEventModel {
	pub match_id: String,
	pub event_id: i32,
	pub event_time: DateTime<Utc>,
	pub attacker_name: Option<String>,
	pub attacker_team: Option<i32>,
	pub victim_name: String,
	pub victim_team: i32,
	pub weapon: String,
	/// Damage cause category (gun, blue zone, fall, ...).
	pub damage_type: String,
	/// Body part for gun damage.
	pub damage_reason: String,
	pub damage: f64,
	pub is_self_damage: bool,
	pub is_team_damage: bool,
}

#[derive(Debug, Clone)]
pub struct KnockEventModel {
	pub match_id: String,
	pub event_id: i32,
	pub dbno_id: i64,
	pub event_time: DateTime<Utc>,
	pub attacker_name: Option<String>,
	pub attacker_team: Option<i32>,
	pub victim_name: String,
	pub victim_team: i32,
	pub weapon: String,
	pub distance: f64,
	// victim-support snapshot at knock time
	pub nearest_teammate_distance: Option<f64>,
	pub avg_teammate_distance: Option<f64>,
	pub teammates_within_50m: i32,
	pub teammates_within_100m: i32,
	pub teammates_within_200m: i32,
	pub teammate_spread_variance: Option<f64>,
	pub teammates_alive: i32,
}

#[derive(Debug, Clone)]
pub struct LandingModel {
	pub match_id: String,
	pub player_name: String,
	pub team_id: i32,
	pub x: f64,
	pub y: f64,
	pub z: f64,
	pub elapsed_time: f64,
}

#[derive(Debug, Clone)]
pub struct WeaponDistributionModel {
	pub match_id: String,
	pub player_name: String,
	pub weapon_category: String,
	pub damage: f64,
	pub kills: i32,
	pub knocks: i32,
}

#[derive(Debug, Clone)]
pub struct CirclePositionModel {
	pub match_id: String,
	pub player_name: String,
	pub elapsed_time: i32,
	pub center_x: f64,
	pub center_y: f64,
	pub radius: f64,
	pub player_x: f64,
	pub player_y: f64,
	pub distance_from_center: f64,
	pub distance_from_edge: f64,
	pub in_zone: bool,
}

/// Per-(match, player) item usage rollup.
#[derive(Debug, Clone)]
pub struct ItemUsageModel {
	pub match_id: String,
	pub player_name: String,
	pub heals: i32,
	pub boosts: i32,
	pub throwables_thrown: i32,
	pub smokes_thrown: i32,
}

/// Seconds spent in the blue per (match, player), from damage ticks.
#[derive(Debug, Clone)]
pub struct ZoneTimeModel {
	pub match_id: String,
	pub player_name: String,
	pub bluezone_ticks: i32,
	pub bluezone_damage: f64,
	pub time_outside_zone: f64,
}

/// Kill/kill-steal rollup per (match, player).
#[derive(Debug, Clone)]
pub struct FinishingSummaryModel {
	pub match_id: String,
	pub player_name: String,
	pub kills: i32,
	pub killsteals: i32,
	pub knocks: i32,
	pub knocks_converted: i32,
}

#[derive(Debug, Clone)]
pub struct SeasonModel {
	pub id: String,
	pub is_current: bool,
	pub is_offseason: bool,
}

#[derive(Debug, Clone)]
pub struct RankedStatsModel {
	pub account_id: String,
	pub season_id: String,
	pub game_mode: String,
	pub current_tier: String,
	pub current_sub_tier: String,
	pub current_rank_point: i32,
	pub best_tier: String,
	pub best_rank_point: i32,
	pub rounds_played: i32,
	pub wins: i32,
	pub kills: i32,
	pub deaths: i32,
	pub assists: i32,
	pub kda: f64,
	pub damage_dealt: f64,
	pub top10_ratio: f64,
	pub win_ratio: f64,
	pub avg_rank: f64,
}

/// One backfill queue row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BackfillItem {
	pub id: i64,
	pub player_name: String,
	pub match_id: String,
	pub status: String,
	pub kills_processed: bool,
	pub damage_processed: bool,
	pub weapons_processed: bool,
	pub fights_processed: bool,
	pub retry_count: i32,
}

/// Per-processor backfill flags, matched to queue columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillStep {
	Kills,
	Damage,
	Weapons,
	Fights,
}

impl BackfillStep {
	pub const ALL: [BackfillStep; 4] =
		[BackfillStep::Kills, BackfillStep::Damage, BackfillStep::Weapons, BackfillStep::Fights];

	pub fn column(&self) -> &'static str {
		match self {
			BackfillStep::Kills => "kills_processed",
			BackfillStep::Damage => "damage_processed",
			BackfillStep::Weapons => "weapons_processed",
			BackfillStep::Fights => "fights_processed",
		}
	}

	pub fn is_done(&self, item: &BackfillItem) -> bool {
		match self {
			BackfillStep::Kills => item.kills_processed,
			BackfillStep::Damage => item.damage_processed,
			BackfillStep::Weapons => item.weapons_processed,
			BackfillStep::Fights => item.fights_processed,
		}
	}
}
