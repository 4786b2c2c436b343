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

//! Match-summary worker: writes the per-participant roster with the
//! enriched in-match stats carried on the summary payload.

use std::time::Instant;

use async_std::task;
use pa_work_queue::{Job, PerformError};

use crate::{
	api::models::MatchDetail,
	database::models::SummaryModel,
	database::queries,
	error::{ArchiveError, Result},
	metrics,
	types::{queues, routing, MatchDiscovered, MatchStatus, Stage, SummaryComplete},
	workers::Env,
};

impl Job for MatchDiscovered {
	type Environment = Env;
	const JOB_TYPE: &'static str = "match_discovered";
	const ROUTING_KEY: &'static str = routing::MATCH_DISCOVERED;

	fn perform(self, env: &Env) -> Result<(), PerformError> {
		let started = Instant::now();
		let outcome = task::block_on(handle(&self, env));
		metrics::HANDLER_DURATION
			.with_label_values(&[queues::MATCH_SUMMARY])
			.observe(started.elapsed().as_secs_f64());
		match outcome {
			Ok(()) => {
				metrics::QUEUE_MESSAGES.with_label_values(&[queues::MATCH_SUMMARY, "ok"]).inc();
				Ok(())
			}
			Err(e) => {
				metrics::QUEUE_MESSAGES.with_label_values(&[queues::MATCH_SUMMARY, "error"]).inc();
				metrics::WORKER_ERRORS.with_label_values(&["summary"]).inc();
				Err(e.into())
			}
		}
	}
}

async fn handle(message: &MatchDiscovered, env: &Env) -> Result<()> {
	let detail = match env.api.match_detail(&message.match_id).await {
		Ok(detail) => detail,
		// a vanished match is terminal: flag it and swallow the message
		Err(ArchiveError::NotFound(_)) => {
			log::warn!("match {} no longer exists upstream, marking failed", message.match_id);
			let mut conn = env.db.conn().await?;
			queries::set_match_status(
				&mut conn,
				&message.match_id,
				MatchStatus::Failed,
				Some("match not found upstream"),
			)
			.await?;
			return Ok(());
		}
		Err(e) => return Err(e),
	};

	let rows = summary_rows(&detail);
	log::debug!("match {}: {} participants", message.match_id, rows.len());
	env.db.insert(rows).await?;

	let mut conn = env.db.conn().await?;
	queries::set_stage_flag(&mut conn, &message.match_id, Stage::Summary).await?;
	queries::set_match_status(&mut conn, &message.match_id, MatchStatus::Processing, None).await?;
	drop(conn);

	let telemetry_url = detail.telemetry_url.unwrap_or_else(|| message.telemetry_url.clone());
	SummaryComplete {
		match_id: message.match_id.clone(),
		map_name: message.map_name.clone(),
		game_type: message.game_type.clone(),
		telemetry_url,
	}
	.enqueue(&env.publisher)
	.await?;
	Ok(())
}

fn summary_rows(detail: &MatchDetail) -> Vec<SummaryModel> {
	detail
		.participants
		.iter()
		.map(|p| {
			let stats = &p.stats;
			SummaryModel {
				match_id: detail.match_id.clone(),
				participant_id: p.participant_id.clone(),
				name: stats.name.clone(),
				account_id: if stats.player_id.is_empty() { None } else { Some(stats.player_id.clone()) },
				team_id: p.team_id,
				placement: p.placement,
				kills: stats.kills,
				assists: stats.assists,
				damage_dealt: stats.damage_dealt,
				survival_time: stats.time_survived,
				heals: stats.heals,
				boosts: stats.boosts,
				revives: stats.revives,
				headshot_kills: stats.headshot_kills,
				longest_kill: stats.longest_kill,
				walk_distance: stats.walk_distance,
				ride_distance: stats.ride_distance,
				swim_distance: stats.swim_distance,
				team_kills: stats.team_kills,
				vehicle_destroys: stats.vehicle_destroys,
				weapons_acquired: stats.weapons_acquired,
				dbnos: stats.dbnos,
				death_type: stats.death_type.clone(),
			}
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::api::models::{MatchParticipant, ParticipantStats};
	use chrono::Utc;

	#[test]
	fn summary_rows_carry_the_enriched_bundle() {
		let detail = MatchDetail {
			match_id: "m-1".into(),
			map_name: "Desert_Main".into(),
			game_mode: "squad-fpp".into(),
			game_type: "official".into(),
			is_custom_match: false,
			created_at: Utc::now(),
			duration: 1800,
			telemetry_url: None,
			participants: vec![MatchParticipant {
				participant_id: "p-1".into(),
				team_id: 3,
				placement: 2,
				stats: ParticipantStats {
					name: "Alice".into(),
					player_id: "account.a".into(),
					kills: 4,
					heals: 6,
					boosts: 3,
					time_survived: 1650.0,
					..Default::default()
				},
			}],
		};
		let rows = summary_rows(&detail);
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].team_id, 3);
		assert_eq!(rows[0].heals, 6);
		assert_eq!(rows[0].account_id.as_deref(), Some("account.a"));
	}
}
