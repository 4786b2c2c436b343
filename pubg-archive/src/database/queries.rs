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

//! Common SQL queries on the archive database abstracted into rust functions

use std::time::Instant;

use hashbrown::HashSet;
use sqlx::{Acquire, PgConnection, Row};

use crate::{
	database::models::{BackfillItem, BackfillStep, MatchRow, TrackedPlayer},
	error::{ArchiveError, Result},
	metrics,
	telemetry::fights::Fight,
	types::{MatchStatus, Stage, StatsBucket},
};

/// List tracked display names, optionally limited.
pub async fn tracked_players(conn: &mut PgConnection, limit: Option<i64>) -> Result<Vec<TrackedPlayer>> {
	let limit = limit.unwrap_or(i64::MAX);
	sqlx::query_as::<_, TrackedPlayer>(
		"SELECT name, account_id FROM players WHERE tracking_enabled ORDER BY name LIMIT $1",
	)
	.bind(limit)
	.fetch_all(conn)
	.await
	.map_err(Into::into)
}

/// Register a player for tracking. The store trigger seeds the backfill
/// queue from their recent telemetry-processed matches.
pub async fn insert_tracked_player(
	conn: &mut PgConnection,
	name: &str,
	account_id: Option<&str>,
	platform: &str,
) -> Result<u64> {
	sqlx::query(
		"INSERT INTO players (name, account_id, platform) VALUES ($1, $2, $3) ON CONFLICT (name) DO NOTHING",
	)
	.bind(name)
	.bind(account_id)
	.bind(platform)
	.execute(conn)
	.await
	.map(|d| d.rows_affected())
	.map_err(Into::into)
}

/// The set of match ids the store already knows. Discovery subtracts this
/// from every sweep; membership is all that matters.
pub async fn known_match_ids(conn: &mut PgConnection) -> Result<HashSet<String>> {
	let rows = sqlx::query("SELECT match_id FROM matches").fetch_all(conn).await?;
	Ok(rows.into_iter().map(|r| r.get::<String, _>(0)).collect())
}

pub async fn match_row(conn: &mut PgConnection, match_id: &str) -> Result<Option<MatchRow>> {
	sqlx::query_as::<_, MatchRow>(
		"SELECT match_id, map_name, game_mode, game_type, telemetry_url, summary,
			telemetry_downloaded, telemetry_processed, fights_processed, stats_aggregated,
			is_tournament_match
		FROM matches WHERE match_id = $1",
	)
	.bind(match_id)
	.fetch_optional(conn)
	.await
	.map_err(Into::into)
}

/// Advance one per-stage flag. Flags only ever move false -> true.
pub async fn set_stage_flag(conn: &mut PgConnection, match_id: &str, stage: Stage) -> Result<()> {
	let started = Instant::now();
	// column names come from the Stage enum, not from input
	let query = format!("UPDATE matches SET {} = TRUE, updated_at = NOW() WHERE match_id = $1", stage.column());
	sqlx::query(&query).bind(match_id).execute(conn).await?;
	metrics::DB_OP_DURATION.with_label_values(&["set_stage_flag"]).observe(started.elapsed().as_secs_f64());
	Ok(())
}

pub async fn set_match_status(
	conn: &mut PgConnection,
	match_id: &str,
	status: MatchStatus,
	error_message: Option<&str>,
) -> Result<()> {
	sqlx::query("UPDATE matches SET status = $2, error_message = $3, updated_at = NOW() WHERE match_id = $1")
		.bind(match_id)
		.bind(status.as_str())
		.bind(error_message)
		.execute(conn)
		.await?;
	Ok(())
}

/// Promote the match to `completed` once every stage flag is set.
pub async fn try_complete_match(conn: &mut PgConnection, match_id: &str) -> Result<bool> {
	let done = sqlx::query(
		"UPDATE matches SET status = 'completed', updated_at = NOW()
		WHERE match_id = $1 AND summary AND telemetry_downloaded AND telemetry_processed
			AND fights_processed AND stats_aggregated",
	)
	.bind(match_id)
	.execute(conn)
	.await?;
	Ok(done.rows_affected() > 0)
}

/// Insert a fight and its participants atomically. Returns the fight id.
///
/// The fight insert is `ON CONFLICT DO NOTHING RETURNING id`; when the row
/// already existed (re-processing) the id is re-read by natural key so the
/// participant rows still attach to the original fight.
pub async fn insert_fight(conn: &mut PgConnection, fight: &Fight) -> Result<i64> {
	let started = Instant::now();
	let mut tx = conn.begin().await?;

	let team_outcomes = serde_json::to_value(
		fight
			.team_outcomes
			.iter()
			.map(|(team, outcome)| (team.to_string(), outcome.as_str().to_string()))
			.collect::<std::collections::HashMap<String, String>>(),
	)?;

	let inserted: Option<i64> = sqlx::query(
		r#"
        INSERT INTO team_fights (
            match_id, started_at, ended_at, duration_seconds, team_ids, center_x, center_y,
            fight_radius, total_knocks, total_kills, total_damage, outcome, winner_team,
            loser_team, team_outcomes, classification_reason
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        ON CONFLICT (match_id, started_at) DO NOTHING
        RETURNING id
        "#,
	)
	.bind(&fight.match_id)
	.bind(fight.started_at)
	.bind(fight.ended_at)
	.bind(fight.duration_seconds)
	.bind(&fight.team_ids)
	.bind(fight.center_x)
	.bind(fight.center_y)
	.bind(fight.fight_radius)
	.bind(fight.total_knocks)
	.bind(fight.total_kills)
	.bind(fight.total_damage)
	.bind(fight.outcome.as_str())
	.bind(fight.winner_team)
	.bind(fight.loser_team)
	.bind(sqlx::types::Json(team_outcomes))
	.bind(&fight.classification_reason)
	.fetch_optional(&mut tx)
	.await?
	.map(|row| row.get::<i64, _>(0));

	let fight_id = match inserted {
		Some(id) => id,
		None => sqlx::query("SELECT id FROM team_fights WHERE match_id = $1 AND started_at = $2")
			.bind(&fight.match_id)
			.bind(fight.started_at)
			.fetch_one(&mut tx)
			.await?
			.get::<i64, _>(0),
	};

	for p in &fight.participants {
		sqlx::query(
			r#"
            INSERT INTO fight_participants (
                fight_id, match_id, player_name, team_id, damage_dealt, damage_taken, knocks,
                kills, attacks, total_movement_distance, position_variance,
                significant_relocations, mobility_rate, fight_radius, survived, was_knocked,
                was_killed
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (fight_id, player_name) DO NOTHING
            "#,
		)
		.bind(fight_id)
		.bind(&fight.match_id)
		.bind(&p.player_name)
		.bind(p.team_id)
		.bind(p.damage_dealt)
		.bind(p.damage_taken)
		.bind(p.knocks)
		.bind(p.kills)
		.bind(p.attacks)
		.bind(p.total_movement_distance)
		.bind(p.position_variance)
		.bind(p.significant_relocations)
		.bind(p.mobility_rate)
		.bind(p.fight_radius)
		.bind(p.survived)
		.bind(p.was_knocked)
		.bind(p.was_killed)
		.execute(&mut tx)
		.await?;
	}

	tx.commit().await?;
	metrics::DB_OP_DURATION.with_label_values(&["insert_fight"]).observe(started.elapsed().as_secs_f64());
	Ok(fight_id)
}

/// Matches whose facts are extracted but not yet rolled into the aggregate
/// tables.
pub async fn matches_awaiting_aggregation(conn: &mut PgConnection, limit: i64) -> Result<Vec<MatchRow>> {
	sqlx::query_as::<_, MatchRow>(
		"SELECT match_id, map_name, game_mode, game_type, telemetry_url, summary,
			telemetry_downloaded, telemetry_processed, fights_processed, stats_aggregated,
			is_tournament_match
		FROM matches
		WHERE telemetry_processed AND fights_processed AND NOT stats_aggregated
		ORDER BY created_at ASC
		LIMIT $1",
	)
	.bind(limit)
	.fetch_all(conn)
	.await
	.map_err(Into::into)
}

/// Roll one match's raw facts into the per-player aggregate tables and set
/// `stats_aggregated`, all in one transaction so a re-poll cannot double
/// count.
pub async fn aggregate_match_stats(conn: &mut PgConnection, match_row: &MatchRow) -> Result<()> {
	let started = Instant::now();
	let bucket = StatsBucket::from_game_type(&match_row.game_type, match_row.is_tournament_match);
	let mut tx = conn.begin().await?;

	for bucket in [bucket, StatsBucket::All].iter() {
		let bucket = bucket.as_str();

		sqlx::query(
			r#"
            INSERT INTO player_damage_stats (player_name, weapon, damage_type, match_type, total_damage, hits)
            SELECT attacker_name, weapon, damage_type, $2, SUM(damage), COUNT(*)::INT
            FROM player_damage_events
            WHERE match_id = $1 AND attacker_name IS NOT NULL AND NOT is_self_damage
            GROUP BY attacker_name, weapon, damage_type
            ON CONFLICT (player_name, weapon, damage_type, match_type) DO UPDATE SET
                total_damage = player_damage_stats.total_damage + EXCLUDED.total_damage,
                hits = player_damage_stats.hits + EXCLUDED.hits
            "#,
		)
		.bind(&match_row.match_id)
		.bind(bucket)
		.execute(&mut tx)
		.await?;

		sqlx::query(
			r#"
            INSERT INTO player_weapon_stats (player_name, weapon, match_type, kills, headshot_kills)
            SELECT killer_name, weapon, $2, COUNT(*)::INT, SUM(is_headshot::INT)::INT
            FROM player_kill_events
            WHERE match_id = $1 AND killer_name IS NOT NULL
            GROUP BY killer_name, weapon
            ON CONFLICT (player_name, weapon, match_type) DO UPDATE SET
                kills = player_weapon_stats.kills + EXCLUDED.kills,
                headshot_kills = player_weapon_stats.headshot_kills + EXCLUDED.headshot_kills
            "#,
		)
		.bind(&match_row.match_id)
		.bind(bucket)
		.execute(&mut tx)
		.await?;

		sqlx::query(
			r#"
            INSERT INTO player_weapon_stats (player_name, weapon, match_type, knockdowns)
            SELECT attacker_name, weapon, $2, COUNT(*)::INT
            FROM player_knock_events
            WHERE match_id = $1 AND attacker_name IS NOT NULL
            GROUP BY attacker_name, weapon
            ON CONFLICT (player_name, weapon, match_type) DO UPDATE SET
                knockdowns = player_weapon_stats.knockdowns + EXCLUDED.knockdowns
            "#,
		)
		.bind(&match_row.match_id)
		.bind(bucket)
		.execute(&mut tx)
		.await?;

		sqlx::query(
			r#"
            INSERT INTO player_advanced_career_stats (
                player_name, match_type, matches_played, wins, kills, assists, knocks, revives,
                headshot_kills, damage_dealt, time_survived, heals, boosts, longest_kill
            )
            SELECT name, $2, 1, (placement = 1)::INT, kills, assists, dbnos, revives,
                headshot_kills, damage_dealt, survival_time, heals, boosts, longest_kill
            FROM match_summaries
            WHERE match_id = $1
            ON CONFLICT (player_name, match_type) DO UPDATE SET
                matches_played = player_advanced_career_stats.matches_played + EXCLUDED.matches_played,
                wins = player_advanced_career_stats.wins + EXCLUDED.wins,
                kills = player_advanced_career_stats.kills + EXCLUDED.kills,
                assists = player_advanced_career_stats.assists + EXCLUDED.assists,
                knocks = player_advanced_career_stats.knocks + EXCLUDED.knocks,
                revives = player_advanced_career_stats.revives + EXCLUDED.revives,
                headshot_kills = player_advanced_career_stats.headshot_kills + EXCLUDED.headshot_kills,
                damage_dealt = player_advanced_career_stats.damage_dealt + EXCLUDED.damage_dealt,
                time_survived = player_advanced_career_stats.time_survived + EXCLUDED.time_survived,
                heals = player_advanced_career_stats.heals + EXCLUDED.heals,
                boosts = player_advanced_career_stats.boosts + EXCLUDED.boosts,
                longest_kill = GREATEST(player_advanced_career_stats.longest_kill, EXCLUDED.longest_kill)
            "#,
		)
		.bind(&match_row.match_id)
		.bind(bucket)
		.execute(&mut tx)
		.await?;

		sqlx::query(
			r#"
            INSERT INTO player_advanced_career_stats (player_name, match_type, fights, fight_wins)
            SELECT fp.player_name, $2, COUNT(*)::INT,
                SUM((tf.team_outcomes ->> fp.team_id::TEXT = 'WON')::INT)::INT
            FROM fight_participants fp
            JOIN team_fights tf ON tf.id = fp.fight_id
            WHERE tf.match_id = $1
            GROUP BY fp.player_name
            ON CONFLICT (player_name, match_type) DO UPDATE SET
                fights = player_advanced_career_stats.fights + EXCLUDED.fights,
                fight_wins = player_advanced_career_stats.fight_wins + EXCLUDED.fight_wins
            "#,
		)
		.bind(&match_row.match_id)
		.bind(bucket)
		.execute(&mut tx)
		.await?;
	}

	sqlx::query("UPDATE matches SET stats_aggregated = TRUE, updated_at = NOW() WHERE match_id = $1")
		.bind(&match_row.match_id)
		.execute(&mut tx)
		.await?;

	tx.commit().await?;
	metrics::DB_OP_DURATION.with_label_values(&["aggregate_match"]).observe(started.elapsed().as_secs_f64());
	Ok(())
}

// ---- backfill queue ----

/// Claim up to `limit` queue rows, marking them `processing`. Failed rows
/// with retries left are claimed again; rows past the cap stay failed.
pub async fn claim_backfill_items(conn: &mut PgConnection, limit: i64, retry_cap: i32) -> Result<Vec<BackfillItem>> {
	sqlx::query_as::<_, BackfillItem>(
		r#"
        UPDATE player_backfill_status SET status = 'processing', updated_at = NOW()
        WHERE id IN (
            SELECT id FROM player_backfill_status
            WHERE status = 'pending' OR (status = 'failed' AND retry_count < $2)
            ORDER BY id
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING id, player_name, match_id, status, kills_processed, damage_processed,
            weapons_processed, fights_processed, retry_count
        "#,
	)
	.bind(limit)
	.bind(retry_cap)
	.fetch_all(conn)
	.await
	.map_err(Into::into)
}

pub async fn set_backfill_step(conn: &mut PgConnection, id: i64, step: BackfillStep) -> Result<()> {
	let query =
		format!("UPDATE player_backfill_status SET {} = TRUE, updated_at = NOW() WHERE id = $1", step.column());
	sqlx::query(&query).bind(id).execute(conn).await?;
	Ok(())
}

/// Terminal transition once every per-processor flag is set.
pub async fn complete_backfill_item(conn: &mut PgConnection, id: i64) -> Result<()> {
	sqlx::query(
		"UPDATE player_backfill_status SET status = 'completed', failure_reason = NULL, updated_at = NOW()
		WHERE id = $1",
	)
	.bind(id)
	.execute(conn)
	.await?;
	Ok(())
}

pub async fn skip_backfill_item(conn: &mut PgConnection, id: i64, reason: &str) -> Result<()> {
	sqlx::query(
		"UPDATE player_backfill_status SET status = 'skipped', failure_reason = $2, updated_at = NOW()
		WHERE id = $1",
	)
	.bind(id)
	.bind(reason)
	.execute(conn)
	.await?;
	Ok(())
}

pub async fn fail_backfill_item(conn: &mut PgConnection, id: i64, reason: &str) -> Result<()> {
	sqlx::query(
		"UPDATE player_backfill_status
		SET status = 'failed', retry_count = retry_count + 1, failure_reason = $2, updated_at = NOW()
		WHERE id = $1",
	)
	.bind(id)
	.bind(reason)
	.execute(conn)
	.await?;
	Ok(())
}

// ---- seasons ----

pub async fn current_season(conn: &mut PgConnection) -> Result<String> {
	sqlx::query("SELECT id FROM seasons WHERE is_current LIMIT 1")
		.fetch_optional(conn)
		.await?
		.map(|row| row.get::<String, _>(0))
		.ok_or_else(|| ArchiveError::NotFound("no current season in store".into()))
}
