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

//! IO for the PostgreSQL store backing the pipeline.
//! Handles inserting of collected data into the database.

mod batch;
pub mod models;
pub mod queries;

use std::time::{Duration, Instant};

use sqlx::{
	pool::PoolConnection,
	postgres::{PgConnection, PgPool, PgPoolOptions, Postgres},
	Connection,
};

use self::batch::Batch;
pub use self::models::*;
use crate::{error::Result, metrics};

/// Run all the migrations.
pub async fn migrate<T: AsRef<str>>(url: T) -> Result<()> {
	let mut conn = PgConnection::connect(url.as_ref()).await?;
	sqlx::migrate!("./src/migrations/").run(&mut conn).await?;
	Ok(())
}

#[derive(Clone)]
pub struct Database {
	/// pool of database connections
	pool: PgPool,
}

impl Database {
	/// Connect to the database
	pub async fn new(url: &str) -> Result<Self> {
		let pool = PgPoolOptions::new()
			.min_connections(2)
			.max_connections(16)
			.idle_timeout(Duration::from_secs(60))
			.connect(url)
			.await?;
		Ok(Self { pool })
	}

	/// Start the database with a pre-defined pool
	pub fn with_pool(pool: PgPool) -> Self {
		Self { pool }
	}

	pub async fn insert(&self, data: impl Insert) -> Result<u64> {
		let started = Instant::now();
		let mut conn = self.pool.acquire().await?;
		let res = data.insert(&mut conn).await?;
		metrics::DB_OP_DURATION.with_label_values(&["insert"]).observe(started.elapsed().as_secs_f64());
		Ok(res)
	}

	pub async fn conn(&self) -> Result<DbConn> {
		self.pool.acquire().await.map_err(Into::into)
	}

	pub fn pool(&self) -> &sqlx::PgPool {
		&self.pool
	}

	/// Cheap reachability probe, used by pre-flight checks.
	pub async fn ping(&self) -> Result<()> {
		let mut conn = self.pool.acquire().await?;
		sqlx::query("SELECT 1").execute(&mut conn).await?;
		Ok(())
	}
}

pub type DbReturn = Result<u64>;
pub type DbConn = PoolConnection<Postgres>;

#[async_trait::async_trait]
pub trait Insert: Send + Sized {
	async fn insert(mut self, conn: &mut DbConn) -> DbReturn;
}

#[async_trait::async_trait]
impl Insert for MatchModel {
	async fn insert(mut self, conn: &mut DbConn) -> DbReturn {
		log::debug!("Inserting discovered match {}", self.match_id);
		sqlx::query(
			r#"
            INSERT INTO matches (
                match_id, map_name, game_mode, game_type, telemetry_url, created_at,
                discovered_by, discovery_priority, is_tournament_match
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT DO NOTHING
        "#,
		)
		.bind(&self.match_id)
		.bind(&self.map_name)
		.bind(&self.game_mode)
		.bind(&self.game_type)
		.bind(&self.telemetry_url)
		.bind(self.created_at)
		.bind(&self.discovered_by)
		.bind(self.discovery_priority)
		.bind(self.is_tournament_match)
		.execute(conn)
		.await
		.map(|d| d.rows_affected())
		.map_err(Into::into)
	}
}

#[async_trait::async_trait]
impl Insert for Vec<SummaryModel> {
	async fn insert(mut self, conn: &mut DbConn) -> DbReturn {
		let mut batch = Batch::new(
			"match_summaries",
			r#"
            INSERT INTO "match_summaries" (
                match_id, participant_id, name, account_id, team_id, placement, kills, assists,
                damage_dealt, survival_time, heals, boosts, revives, headshot_kills, longest_kill,
                walk_distance, ride_distance, swim_distance, team_kills, vehicle_destroys,
                weapons_acquired, dbnos, death_type
            ) VALUES
            "#,
			r#"
            ON CONFLICT (match_id, participant_id) DO NOTHING
            "#,
		);
		for s in self {
			batch.reserve(23)?;
			if batch.current_num_arguments() > 0 {
				batch.append(",");
			}
			batch.append("(");
			batch.bind(s.match_id)?;
			batch.append(",");
			batch.bind(s.participant_id)?;
			batch.append(",");
			batch.bind(s.name)?;
			batch.append(",");
			batch.bind(s.account_id)?;
			batch.append(",");
			batch.bind(s.team_id)?;
			batch.append(",");
			batch.bind(s.placement)?;
			batch.append(",");
			batch.bind(s.kills)?;
			batch.append(",");
			batch.bind(s.assists)?;
			batch.append(",");
			batch.bind(s.damage_dealt)?;
			batch.append(",");
			batch.bind(s.survival_time)?;
			batch.append(",");
			batch.bind(s.heals)?;
			batch.append(",");
			batch.bind(s.boosts)?;
			batch.append(",");
			batch.bind(s.revives)?;
			batch.append(",");
			batch.bind(s.headshot_kills)?;
			batch.append(",");
			batch.bind(s.longest_kill)?;
			batch.append(",");
			batch.bind(s.walk_distance)?;
			batch.append(",");
			batch.bind(s.ride_distance)?;
			batch.append(",");
			batch.bind(s.swim_distance)?;
			batch.append(",");
			batch.bind(s.team_kills)?;
			batch.append(",");
			batch.bind(s.vehicle_destroys)?;
			batch.append(",");
			batch.bind(s.weapons_acquired)?;
			batch.append(",");
			batch.bind(s.dbnos)?;
			batch.append(",");
			batch.bind(s.death_type)?;
			batch.append(")");
		}
		Ok(batch.execute(conn).await?)
	}
}

#[async_trait::async_trait]
impl Insert for Vec<KillEventModel> {
	async fn insert(mut self, conn: &mut DbConn) -> DbReturn {
		let mut batch = Batch::new(
			"player_kill_events",
			r#"
            INSERT INTO "player_kill_events" (
                match_id, event_id, event_time, killer_name, killer_team, victim_name, victim_team,
                weapon, weapon_category, distance, is_headshot, is_suicide, is_bluezone
            ) VALUES
            "#,
			r#"
            ON CONFLICT (match_id, event_id) DO NOTHING
            "#,
		);
		for k in self {
			batch.reserve(13)?;
			if batch.current_num_arguments() > 0 {
				batch.append(",");
			}
			batch.append("(");
			batch.bind(k.match_id)?;
			batch.append(",");
			batch.bind(k.event_id)?;
			batch.append(",");
			batch.bind(k.event_time)?;
			batch.append(",");
			batch.bind(k.killer_name)?;
			batch.append(",");
			batch.bind(k.killer_team)?;
			batch.append(",");
			batch.bind(k.victim_name)?;
			batch.append(",");
			batch.bind(k.victim_team)?;
			batch.append(",");
			batch.bind(k.weapon)?;
			batch.append(",");
			batch.bind(k.weapon_category)?;
			batch.append(",");
			batch.bind(k.distance)?;
			batch.append(",");
			batch.bind(k.is_headshot)?;
			batch.append(",");
			batch.bind(k.is_suicide)?;
			batch.append(",");
			batch.bind(k.is_bluezone)?;
			batch.append(")");
		}
		Ok(batch.execute(conn).await?)
	}
}

#[async_trait::async_trait]
impl Insert for Vec<DamageEventModel> {
	async fn insert(mut self, conn: &mut DbConn) -> DbReturn {
		let mut batch = Batch::new(
			"player_damage_events",
			r#"
            INSERT INTO "player_damage_events" (
                match_id, event_id, event_time, attacker_name, attacker_team, victim_name,
                victim_team, weapon, damage_type, damage_reason, damage, is_self_damage,
                is_team_damage
            ) VALUES
            "#,
			r#"
            ON CONFLICT (match_id, event_id) DO NOTHING
            "#,
		);
		for d in self {
			batch.reserve(13)?;
			if batch.current_num_arguments() > 0 {
				batch.append(",");
			}
			batch.append("(");
			batch.bind(d.match_id)?;
			batch.append(",");
			batch.bind(d.event_id)?;
			batch.append(",");
			batch.bind(d.event_time)?;
			batch.append(",");
			batch.bind(d.attacker_name)?;
			batch.append(",");
			batch.bind(d.attacker_team)?;
			batch.append(",");
			batch.bind(d.victim_name)?;
			batch.append(",");
			batch.bind(d.victim_team)?;
			batch.append(",");
			batch.bind(d.weapon)?;
			batch.append(",");
			batch.bind(d.damage_type)?;
			batch.append(",");
			batch.bind(d.damage_reason)?;
			batch.append(",");
			batch.bind(d.damage)?;
			batch.append(",");
			batch.bind(d.is_self_damage)?;
			batch.append(",");
			batch.bind(d.is_team_damage)?;
			batch.append(")");
		}
		Ok(batch.execute(conn).await?)
	}
}

#[async_trait::async_trait]
impl Insert for Vec<KnockEventModel> {
	async fn insert(mut self, conn: &mut DbConn) -> DbReturn {
		let mut batch = Batch::new(
			"player_knock_events",
			r#"
            INSERT INTO "player_knock_events" (
                match_id, event_id, dbno_id, event_time, attacker_name, attacker_team, victim_name,
                victim_team, weapon, distance, nearest_teammate_distance, avg_teammate_distance,
                teammates_within_50m, teammates_within_100m, teammates_within_200m,
                teammate_spread_variance, teammates_alive
            ) VALUES
            "#,
			r#"
            ON CONFLICT (match_id, event_id) DO NOTHING
            "#,
		);
		for k in self {
			batch.reserve(17)?;
			if batch.current_num_arguments() > 0 {
				batch.append(",");
			}
			batch.append("(");
			batch.bind(k.match_id)?;
			batch.append(",");
			batch.bind(k.event_id)?;
			batch.append(",");
			batch.bind(k.dbno_id)?;
			batch.append(",");
			batch.bind(k.event_time)?;
			batch.append(",");
			batch.bind(k.attacker_name)?;
			batch.append(",");
			batch.bind(k.attacker_team)?;
			batch.append(",");
			batch.bind(k.victim_name)?;
			batch.append(",");
			batch.bind(k.victim_team)?;
			batch.append(",");
			batch.bind(k.weapon)?;
			batch.append(",");
			batch.bind(k.distance)?;
			batch.append(",");
			batch.bind(k.nearest_teammate_distance)?;
			batch.append(",");
			batch.bind(k.avg_teammate_distance)?;
			batch.append(",");
			batch.bind(k.teammates_within_50m)?;
			batch.append(",");
			batch.bind(k.teammates_within_100m)?;
			batch.append(",");
			batch.bind(k.teammates_within_200m)?;
			batch.append(",");
			batch.bind(k.teammate_spread_variance)?;
			batch.append(",");
			batch.bind(k.teammates_alive)?;
			batch.append(")");
		}
		Ok(batch.execute(conn).await?)
	}
}

#[async_trait::async_trait]
impl Insert for Vec<LandingModel> {
	async fn insert(mut self, conn: &mut DbConn) -> DbReturn {
		let mut batch = Batch::new(
			"player_landings",
			r#"
            INSERT INTO "player_landings" (
                match_id, player_name, team_id, x, y, z, elapsed_time
            ) VALUES
            "#,
			r#"
            ON CONFLICT (match_id, player_name) DO NOTHING
            "#,
		);
		for l in self {
			batch.reserve(7)?;
			if batch.current_num_arguments() > 0 {
				batch.append(",");
			}
			batch.append("(");
			batch.bind(l.match_id)?;
			batch.append(",");
			batch.bind(l.player_name)?;
			batch.append(",");
			batch.bind(l.team_id)?;
			batch.append(",");
			batch.bind(l.x)?;
			batch.append(",");
			batch.bind(l.y)?;
			batch.append(",");
			batch.bind(l.z)?;
			batch.append(",");
			batch.bind(l.elapsed_time)?;
			batch.append(")");
		}
		Ok(batch.execute(conn).await?)
	}
}

#[async_trait::async_trait]
impl Insert for Vec<WeaponDistributionModel> {
	async fn insert(mut self, conn: &mut DbConn) -> DbReturn {
		let mut batch = Batch::new(
			"player_match_weapon_distribution",
			r#"
            INSERT INTO "player_match_weapon_distribution" (
                match_id, player_name, weapon_category, damage, kills, knocks
            ) VALUES
            "#,
			r#"
            ON CONFLICT (match_id, player_name, weapon_category) DO NOTHING
            "#,
		);
		for w in self {
			batch.reserve(6)?;
			if batch.current_num_arguments() > 0 {
				batch.append(",");
			}
			batch.append("(");
			batch.bind(w.match_id)?;
			batch.append(",");
			batch.bind(w.player_name)?;
			batch.append(",");
			batch.bind(w.weapon_category)?;
			batch.append(",");
			batch.bind(w.damage)?;
			batch.append(",");
			batch.bind(w.kills)?;
			batch.append(",");
			batch.bind(w.knocks)?;
			batch.append(")");
		}
		Ok(batch.execute(conn).await?)
	}
}

#[async_trait::async_trait]
impl Insert for Vec<CirclePositionModel> {
	async fn insert(mut self, conn: &mut DbConn) -> DbReturn {
		let mut batch = Batch::new(
			"player_circle_positions",
			r#"
            INSERT INTO "player_circle_positions" (
                match_id, player_name, elapsed_time, center_x, center_y, radius, player_x,
                player_y, distance_from_center, distance_from_edge, in_zone
            ) VALUES
            "#,
			r#"
            ON CONFLICT (match_id, player_name, elapsed_time) DO NOTHING
            "#,
		);
		for c in self {
			batch.reserve(11)?;
			if batch.current_num_arguments() > 0 {
				batch.append(",");
			}
			batch.append("(");
			batch.bind(c.match_id)?;
			batch.append(",");
			batch.bind(c.player_name)?;
			batch.append(",");
			batch.bind(c.elapsed_time)?;
			batch.append(",");
			batch.bind(c.center_x)?;
			batch.append(",");
			batch.bind(c.center_y)?;
			batch.append(",");
			batch.bind(c.radius)?;
			batch.append(",");
			batch.bind(c.player_x)?;
			batch.append(",");
			batch.bind(c.player_y)?;
			batch.append(",");
			batch.bind(c.distance_from_center)?;
			batch.append(",");
			batch.bind(c.distance_from_edge)?;
			batch.append(",");
			batch.bind(c.in_zone)?;
			batch.append(")");
		}
		Ok(batch.execute(conn).await?)
	}
}

#[async_trait::async_trait]
impl Insert for Vec<ItemUsageModel> {
	async fn insert(mut self, conn: &mut DbConn) -> DbReturn {
		let mut batch = Batch::new(
			"player_item_usage",
			r#"
            INSERT INTO "player_item_usage" (
                match_id, player_name, heals, boosts, throwables_thrown, smokes_thrown
            ) VALUES
            "#,
			r#"
            ON CONFLICT (match_id, player_name) DO NOTHING
            "#,
		);
		for i in self {
			batch.reserve(6)?;
			if batch.current_num_arguments() > 0 {
				batch.append(",");
			}
			batch.append("(");
			batch.bind(i.match_id)?;
			batch.append(",");
			batch.bind(i.player_name)?;
			batch.append(",");
			batch.bind(i.heals)?;
			batch.append(",");
			batch.bind(i.boosts)?;
			batch.append(",");
			batch.bind(i.throwables_thrown)?;
			batch.append(",");
			batch.bind(i.smokes_thrown)?;
			batch.append(")");
		}
		Ok(batch.execute(conn).await?)
	}
}

#[async_trait::async_trait]
impl Insert for Vec<ZoneTimeModel> {
	async fn insert(mut self, conn: &mut DbConn) -> DbReturn {
		let mut batch = Batch::new(
			"player_zone_times",
			r#"
            INSERT INTO "player_zone_times" (
                match_id, player_name, bluezone_ticks, bluezone_damage, time_outside_zone
            ) VALUES
            "#,
			r#"
            ON CONFLICT (match_id, player_name) DO NOTHING
            "#,
		);
		for z in self {
			batch.reserve(5)?;
			if batch.current_num_arguments() > 0 {
				batch.append(",");
			}
			batch.append("(");
			batch.bind(z.match_id)?;
			batch.append(",");
			batch.bind(z.player_name)?;
			batch.append(",");
			batch.bind(z.bluezone_ticks)?;
			batch.append(",");
			batch.bind(z.bluezone_damage)?;
			batch.append(",");
			batch.bind(z.time_outside_zone)?;
			batch.append(")");
		}
		Ok(batch.execute(conn).await?)
	}
}

#[async_trait::async_trait]
impl Insert for Vec<FinishingSummaryModel> {
	async fn insert(mut self, conn: &mut DbConn) -> DbReturn {
		let mut batch = Batch::new(
			"player_finishing_summary",
			r#"
            INSERT INTO "player_finishing_summary" (
                match_id, player_name, kills, killsteals, knocks, knocks_converted
            ) VALUES
            "#,
			r#"
            ON CONFLICT (match_id, player_name) DO NOTHING
            "#,
		);
		for f in self {
			batch.reserve(6)?;
			if batch.current_num_arguments() > 0 {
				batch.append(",");
			}
			batch.append("(");
			batch.bind(f.match_id)?;
			batch.append(",");
			batch.bind(f.player_name)?;
			batch.append(",");
			batch.bind(f.kills)?;
			batch.append(",");
			batch.bind(f.killsteals)?;
			batch.append(",");
			batch.bind(f.knocks)?;
			batch.append(",");
			batch.bind(f.knocks_converted)?;
			batch.append(")");
		}
		Ok(batch.execute(conn).await?)
	}
}

#[async_trait::async_trait]
impl Insert for Vec<SeasonModel> {
	async fn insert(mut self, conn: &mut DbConn) -> DbReturn {
		let mut batch = Batch::new(
			"seasons",
			r#"
            INSERT INTO "seasons" (id, is_current, is_offseason) VALUES
            "#,
			r#"
            ON CONFLICT (id) DO UPDATE SET
                is_current = EXCLUDED.is_current,
                is_offseason = EXCLUDED.is_offseason,
                fetched_at = NOW()
            "#,
		);
		for s in self {
			batch.reserve(3)?;
			if batch.current_num_arguments() > 0 {
				batch.append(",");
			}
			batch.append("(");
			batch.bind(s.id)?;
			batch.append(",");
			batch.bind(s.is_current)?;
			batch.append(",");
			batch.bind(s.is_offseason)?;
			batch.append(")");
		}
		Ok(batch.execute(conn).await?)
	}
}

#[async_trait::async_trait]
impl Insert for Vec<RankedStatsModel> {
	async fn insert(mut self, conn: &mut DbConn) -> DbReturn {
		let mut batch = Batch::new(
			"ranked_player_stats",
			r#"
            INSERT INTO "ranked_player_stats" (
                account_id, season_id, game_mode, current_tier, current_sub_tier,
                current_rank_point, best_tier, best_rank_point, rounds_played, wins, kills,
                deaths, assists, kda, damage_dealt, top10_ratio, win_ratio, avg_rank
            ) VALUES
            "#,
			r#"
            ON CONFLICT (account_id, season_id, game_mode) DO UPDATE SET
                current_tier = EXCLUDED.current_tier,
                current_sub_tier = EXCLUDED.current_sub_tier,
                current_rank_point = EXCLUDED.current_rank_point,
                best_tier = EXCLUDED.best_tier,
                best_rank_point = EXCLUDED.best_rank_point,
                rounds_played = EXCLUDED.rounds_played,
                wins = EXCLUDED.wins,
                kills = EXCLUDED.kills,
                deaths = EXCLUDED.deaths,
                assists = EXCLUDED.assists,
                kda = EXCLUDED.kda,
                damage_dealt = EXCLUDED.damage_dealt,
                top10_ratio = EXCLUDED.top10_ratio,
                win_ratio = EXCLUDED.win_ratio,
                avg_rank = EXCLUDED.avg_rank,
                updated_at = NOW()
            "#,
		);
		for r in self {
			batch.reserve(18)?;
			if batch.current_num_arguments() > 0 {
				batch.append(",");
			}
			batch.append("(");
			batch.bind(r.account_id)?;
			batch.append(",");
			batch.bind(r.season_id)?;
			batch.append(",");
			batch.bind(r.game_mode)?;
			batch.append(",");
			batch.bind(r.current_tier)?;
			batch.append(",");
			batch.bind(r.current_sub_tier)?;
			batch.append(",");
			batch.bind(r.current_rank_point)?;
			batch.append(",");
			batch.bind(r.best_tier)?;
			batch.append(",");
			batch.bind(r.best_rank_point)?;
			batch.append(",");
			batch.bind(r.rounds_played)?;
			batch.append(",");
			batch.bind(r.wins)?;
			batch.append(",");
			batch.bind(r.kills)?;
			batch.append(",");
			batch.bind(r.deaths)?;
			batch.append(",");
			batch.bind(r.assists)?;
			batch.append(",");
			batch.bind(r.kda)?;
			batch.append(",");
			batch.bind(r.damage_dealt)?;
			batch.append(",");
			batch.bind(r.top10_ratio)?;
			batch.append(",");
			batch.bind(r.win_ratio)?;
			batch.append(",");
			batch.bind(r.avg_rank)?;
			batch.append(")");
		}
		Ok(batch.execute(conn).await?)
	}
}
