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

//! Season and ranked-stats sync. Seasons are refreshed from the upstream
//! list; ranked records are fetched for every tracked player with a known
//! account id, on the dedicated ranked credential when configured.

use crate::{
	database::models::{RankedStatsModel, SeasonModel},
	database::queries,
	error::Result,
	metrics,
	workers::Environment,
};

pub struct RankedSyncService {
	env: Environment,
}

impl RankedSyncService {
	pub fn new(env: Environment) -> Self {
		Self { env }
	}

	/// Refresh the season table and return the current season id.
	pub async fn sync_seasons(&self) -> Result<String> {
		let seasons = self.env.api.seasons().await?;
		let models: Vec<SeasonModel> = seasons
			.iter()
			.map(|s| SeasonModel {
				id: s.id.clone(),
				is_current: s.attributes.is_current_season,
				is_offseason: s.attributes.is_offseason,
			})
			.collect();
		self.env.db.insert(models).await?;

		let mut conn = self.env.db.conn().await?;
		queries::current_season(&mut conn).await
	}

	/// Pull ranked records for every tracked player into the store.
	pub async fn sync_ranked_stats(&self) -> Result<usize> {
		let season_id = self.sync_seasons().await?;

		let mut conn = self.env.db.conn().await?;
		let players = queries::tracked_players(&mut conn, None).await?;
		drop(conn);

		let mut synced = 0;
		for player in players {
			let account_id = match player.account_id {
				Some(account_id) => account_id,
				None => continue,
			};
			let stats = match self.env.api.ranked_stats(&account_id, &season_id).await {
				Ok(stats) => stats,
				Err(e) => {
					metrics::WORKER_ERRORS.with_label_values(&["ranked"]).inc();
					log::warn!("ranked stats for {} failed: {}", player.name, e);
					continue;
				}
			};

			let rows: Vec<RankedStatsModel> = stats
				.attributes
				.ranked_game_mode_stats
				.iter()
				.map(|(game_mode, record)| RankedStatsModel {
					account_id: account_id.clone(),
					season_id: season_id.clone(),
					game_mode: game_mode.clone(),
					current_tier: record.current_tier.tier.clone(),
					current_sub_tier: record.current_tier.sub_tier.clone(),
					current_rank_point: record.current_rank_point,
					best_tier: record.best_tier.tier.clone(),
					best_rank_point: record.best_rank_point,
					rounds_played: record.rounds_played,
					wins: record.wins,
					kills: record.kills,
					deaths: record.deaths,
					assists: record.assists,
					kda: record.kda,
					damage_dealt: record.damage_dealt,
					top10_ratio: record.top10_ratio,
					win_ratio: record.win_ratio,
					avg_rank: record.avg_rank,
				})
				.collect();
			if !rows.is_empty() {
				self.env.db.insert(rows).await?;
				synced += 1;
			}
		}
		Ok(synced)
	}
}
