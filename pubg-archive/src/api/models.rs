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

//! Records of the upstream JSON:API envelopes. Unknown fields are ignored,
//! and partially populated resources (null stats, absent relationships)
//! materialize as zero/absent rather than failing the parse.

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use serde::Deserialize;

/// `{ "data": ... }` envelope with the side-loaded `included` resources.
#[derive(Debug, Deserialize)]
pub struct Document<T> {
	pub data: T,
	#[serde(default)]
	pub included: Vec<Included>,
}

/// Reference to another resource: `{ "type": ..., "id": ... }`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceRef {
	#[serde(rename = "type")]
	pub kind: String,
	pub id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResourceRefList {
	#[serde(default)]
	pub data: Vec<ResourceRef>,
}

// ---- players ----

#[derive(Debug, Deserialize)]
pub struct PlayerResource {
	pub id: String,
	pub attributes: PlayerAttributes,
	#[serde(default)]
	pub relationships: PlayerRelationships,
}

#[derive(Debug, Deserialize)]
pub struct PlayerAttributes {
	pub name: String,
	#[serde(rename = "shardId", default)]
	pub shard_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlayerRelationships {
	#[serde(default)]
	pub matches: ResourceRefList,
}

/// Flattened result of a batch player lookup.
#[derive(Debug, Clone)]
pub struct PlayerMatches {
	pub name: String,
	pub account_id: String,
	pub match_ids: Vec<String>,
}

impl From<PlayerResource> for PlayerMatches {
	fn from(resource: PlayerResource) -> Self {
		let match_ids = resource.relationships.matches.data.into_iter().map(|r| r.id).collect();
		PlayerMatches { name: resource.attributes.name, account_id: resource.id, match_ids }
	}
}

// ---- matches ----

#[derive(Debug, Deserialize)]
pub struct MatchResource {
	pub id: String,
	pub attributes: MatchAttributes,
	#[serde(default)]
	pub relationships: MatchRelationships,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchAttributes {
	pub created_at: DateTime<Utc>,
	#[serde(default)]
	pub duration: i64,
	pub game_mode: String,
	pub map_name: String,
	#[serde(default)]
	pub match_type: String,
	#[serde(default)]
	pub is_custom_match: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct MatchRelationships {
	#[serde(default)]
	pub rosters: ResourceRefList,
	#[serde(default)]
	pub assets: ResourceRefList,
}

/// Side-loaded resources of a match document, discriminated by `type`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Included {
	Participant(ParticipantResource),
	Roster(RosterResource),
	Asset(AssetResource),
	#[serde(other)]
	Unknown,
}

#[derive(Debug, Deserialize)]
pub struct ParticipantResource {
	pub id: String,
	pub attributes: ParticipantAttributes,
}

#[derive(Debug, Deserialize)]
pub struct ParticipantAttributes {
	/// Explicitly nullable upstream; absent stats become zeroes.
	#[serde(default)]
	pub stats: Option<ParticipantStats>,
}

/// Per-participant stats as reported by the match summary payload.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParticipantStats {
	#[serde(rename = "DBNOs")]
	pub dbnos: i32,
	pub assists: i32,
	pub boosts: i32,
	pub damage_dealt: f64,
	pub death_type: String,
	pub headshot_kills: i32,
	pub heals: i32,
	pub kill_place: i32,
	pub kills: i32,
	pub longest_kill: f64,
	pub name: String,
	pub player_id: String,
	pub revives: i32,
	pub ride_distance: f64,
	pub road_kills: i32,
	pub swim_distance: f64,
	pub team_kills: i32,
	pub time_survived: f64,
	pub vehicle_destroys: i32,
	pub walk_distance: f64,
	pub weapons_acquired: i32,
	pub win_place: i32,
}

#[derive(Debug, Deserialize)]
pub struct RosterResource {
	pub id: String,
	pub attributes: RosterAttributes,
	#[serde(default)]
	pub relationships: RosterRelationships,
}

#[derive(Debug, Deserialize)]
pub struct RosterAttributes {
	#[serde(default)]
	pub stats: RosterStats,
	#[serde(default)]
	pub won: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RosterStats {
	pub rank: i32,
	pub team_id: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct RosterRelationships {
	#[serde(default)]
	pub participants: ResourceRefList,
}

#[derive(Debug, Deserialize)]
pub struct AssetResource {
	pub id: String,
	pub attributes: AssetAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAttributes {
	#[serde(rename = "URL")]
	pub url: String,
	#[serde(default)]
	pub name: String,
}

/// One rostered participant with team context resolved from the envelope.
#[derive(Debug, Clone)]
pub struct MatchParticipant {
	pub participant_id: String,
	pub team_id: i32,
	pub placement: i32,
	pub stats: ParticipantStats,
}

/// A match document flattened into the fields the pipeline consumes.
#[derive(Debug)]
pub struct MatchDetail {
	pub match_id: String,
	pub map_name: String,
	pub game_mode: String,
	pub game_type: String,
	pub is_custom_match: bool,
	pub created_at: DateTime<Utc>,
	pub duration: i64,
	pub telemetry_url: Option<String>,
	pub participants: Vec<MatchParticipant>,
}

impl MatchDetail {
	/// Resolve participants against their rosters and pull the telemetry
	/// asset out of the `included` set.
	pub fn from_document(document: Document<MatchResource>) -> Self {
		let mut participants: HashMap<String, ParticipantResource> = HashMap::new();
		let mut rosters: Vec<RosterResource> = Vec::new();
		let mut telemetry_url = None;

		for included in document.included {
			match included {
				Included::Participant(p) => {
					participants.insert(p.id.clone(), p);
				}
				Included::Roster(r) => rosters.push(r),
				Included::Asset(a) => {
					if telemetry_url.is_none() {
						telemetry_url = Some(a.attributes.url);
					}
				}
				Included::Unknown => {}
			}
		}

		let mut resolved = Vec::with_capacity(participants.len());
		for roster in rosters {
			for reference in &roster.relationships.participants.data {
				if let Some(participant) = participants.remove(&reference.id) {
					resolved.push(MatchParticipant {
						participant_id: participant.id,
						team_id: roster.attributes.stats.team_id,
						placement: roster.attributes.stats.rank,
						stats: participant.attributes.stats.unwrap_or_default(),
					});
				}
			}
		}

		let attributes = document.data.attributes;
		MatchDetail {
			match_id: document.data.id,
			map_name: attributes.map_name,
			game_mode: attributes.game_mode,
			game_type: attributes.match_type,
			is_custom_match: attributes.is_custom_match,
			created_at: attributes.created_at,
			duration: attributes.duration,
			telemetry_url,
			participants: resolved,
		}
	}
}

// ---- seasons ----

#[derive(Debug, Deserialize)]
pub struct SeasonResource {
	pub id: String,
	pub attributes: SeasonAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeasonAttributes {
	#[serde(default)]
	pub is_current_season: bool,
	#[serde(default)]
	pub is_offseason: bool,
}

// ---- ranked ----

#[derive(Debug, Deserialize)]
pub struct RankedStatsResource {
	pub attributes: RankedStatsAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStatsAttributes {
	#[serde(default)]
	pub ranked_game_mode_stats: HashMap<String, RankedGameModeStats>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RankedGameModeStats {
	pub current_tier: Tier,
	pub current_rank_point: i32,
	pub best_tier: Tier,
	pub best_rank_point: i32,
	pub rounds_played: i32,
	pub wins: i32,
	pub kills: i32,
	pub deaths: i32,
	pub assists: i32,
	#[serde(rename = "kda")]
	pub kda: f64,
	pub damage_dealt: f64,
	pub top10_ratio: f64,
	pub win_ratio: f64,
	pub avg_rank: f64,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tier {
	pub tier: String,
	pub sub_tier: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn player_lookup_envelope_parses() {
		let raw = r#"{
			"data": [{
				"type": "player",
				"id": "account.abc",
				"attributes": { "name": "Shroud", "shardId": "steam", "patchVersion": "" },
				"relationships": {
					"matches": { "data": [
						{ "type": "match", "id": "m-1" },
						{ "type": "match", "id": "m-2" }
					]}
				}
			}]
		}"#;
		let document: Document<Vec<PlayerResource>> = serde_json::from_str(raw).unwrap();
		let players: Vec<PlayerMatches> = document.data.into_iter().map(Into::into).collect();
		assert_eq!(players.len(), 1);
		assert_eq!(players[0].account_id, "account.abc");
		assert_eq!(players[0].match_ids, vec!["m-1", "m-2"]);
	}

	#[test]
	fn match_envelope_resolves_rosters_and_telemetry() {
		let raw = r#"{
			"data": {
				"type": "match",
				"id": "m-1",
				"attributes": {
					"createdAt": "2021-03-01T12:00:00Z",
					"duration": 1800,
					"gameMode": "squad-fpp",
					"mapName": "Desert_Main",
					"matchType": "official",
					"isCustomMatch": false,
					"titleId": "pubg"
				},
				"relationships": {
					"rosters": { "data": [{ "type": "roster", "id": "r-1" }] },
					"assets": { "data": [{ "type": "asset", "id": "a-1" }] }
				}
			},
			"included": [
				{
					"type": "participant",
					"id": "p-1",
					"attributes": { "stats": { "name": "Shroud", "playerId": "account.abc", "kills": 5, "damageDealt": 540.5, "winPlace": 2, "DBNOs": 3 } }
				},
				{
					"type": "roster",
					"id": "r-1",
					"attributes": { "stats": { "rank": 2, "teamId": 7 }, "won": "false" },
					"relationships": { "participants": { "data": [{ "type": "participant", "id": "p-1" }] } }
				},
				{
					"type": "asset",
					"id": "a-1",
					"attributes": { "URL": "https://telemetry-cdn/m-1.json.gz", "name": "telemetry" }
				}
			]
		}"#;
		let document: Document<MatchResource> = serde_json::from_str(raw).unwrap();
		let detail = MatchDetail::from_document(document);
		assert_eq!(detail.map_name, "Desert_Main");
		assert_eq!(detail.telemetry_url.as_deref(), Some("https://telemetry-cdn/m-1.json.gz"));
		assert_eq!(detail.participants.len(), 1);
		let participant = &detail.participants[0];
		assert_eq!(participant.team_id, 7);
		assert_eq!(participant.placement, 2);
		assert_eq!(participant.stats.kills, 5);
	}

	#[test]
	fn null_stats_materialize_as_defaults() {
		let raw = r#"{
			"id": "p-2",
			"attributes": {}
		}"#;
		let participant: ParticipantResource = serde_json::from_str(raw).unwrap();
		let stats = participant.attributes.stats.unwrap_or_default();
		assert_eq!(stats.kills, 0);
		assert_eq!(stats.damage_dealt, 0.0);
	}

	#[test]
	fn unknown_included_types_are_skipped() {
		let raw = r#"{ "type": "sponsorship", "id": "x", "attributes": {} }"#;
		let included: Included = serde_json::from_str(raw).unwrap();
		assert!(matches!(included, Included::Unknown));
	}
}
