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

//! Telemetry-processing worker. Loads the event trace exactly once per
//! match, fans the extractors out over a rayon pool, then runs the fight
//! engine. Only stages whose flag is still false are executed, so a match
//! in partial state is safely reprocessable.

use std::time::Instant;

use async_std::task;
use hashbrown::HashSet;
use pa_work_queue::{Job, PerformError};

use crate::{
	database::models::{
		CirclePositionModel, DamageEventModel, FinishingSummaryModel, ItemUsageModel, KillEventModel,
		KnockEventModel, LandingModel, WeaponDistributionModel, ZoneTimeModel,
	},
	database::queries,
	error::{ArchiveError, Result},
	metrics,
	telemetry::{self, fights, processors},
	types::{queues, routing, telemetry_path, MatchMeta, ProcessingComplete, Stage, TelemetryDownloaded},
	workers::Env,
};

impl Job for TelemetryDownloaded {
	type Environment = Env;
	const JOB_TYPE: &'static str = "telemetry_downloaded";
	const ROUTING_KEY: &'static str = routing::TELEMETRY_DOWNLOADED;

	fn perform(self, env: &Env) -> Result<(), PerformError> {
		let started = Instant::now();
		let outcome = task::block_on(handle(&self, env));
		metrics::HANDLER_DURATION
			.with_label_values(&[queues::TELEMETRY_PROCESSING])
			.observe(started.elapsed().as_secs_f64());
		match outcome {
			Ok(()) => {
				metrics::QUEUE_MESSAGES.with_label_values(&[queues::TELEMETRY_PROCESSING, "ok"]).inc();
				Ok(())
			}
			Err(e) => {
				metrics::QUEUE_MESSAGES.with_label_values(&[queues::TELEMETRY_PROCESSING, "error"]).inc();
				metrics::WORKER_ERRORS.with_label_values(&["process"]).inc();
				Err(e.into())
			}
		}
	}
}

impl Job for ProcessingComplete {
	type Environment = Env;
	const JOB_TYPE: &'static str = "processing_complete";
	const ROUTING_KEY: &'static str = routing::PROCESSING_COMPLETE;

	// no core role binds this key; it exists for downstream products
	fn perform(self, _: &Env) -> Result<(), PerformError> {
		Ok(())
	}
}

/// Everything the extractors produce for one match.
#[derive(Default)]
struct Extracted {
	landings: Vec<LandingModel>,
	kills: Vec<KillEventModel>,
	finishing: Vec<FinishingSummaryModel>,
	damage: Vec<DamageEventModel>,
	knocks: Vec<KnockEventModel>,
	circles: Vec<CirclePositionModel>,
	weapons: Vec<WeaponDistributionModel>,
	items: Vec<ItemUsageModel>,
	zones: Vec<ZoneTimeModel>,
}

async fn handle(message: &TelemetryDownloaded, env: &Env) -> Result<()> {
	let mut conn = env.db.conn().await?;
	let row = queries::match_row(&mut conn, &message.match_id)
		.await?
		.ok_or_else(|| ArchiveError::NotFound(format!("match {} not in store", message.match_id)))?;
	if row.telemetry_processed && row.fights_processed {
		log::debug!("match {} already fully processed", message.match_id);
		return Ok(());
	}

	let tracked: HashSet<String> =
		queries::tracked_players(&mut conn, None).await?.into_iter().map(|p| p.name).collect();
	drop(conn);

	let path = telemetry_path(&env.telemetry_root, &message.match_id);
	let trace = telemetry::load_trace(&path)?;
	let meta = MatchMeta {
		match_id: message.match_id.clone(),
		map_name: message.map_name.clone(),
		game_type: message.game_type.clone(),
	};
	log::info!("processing {} events for match {}", trace.events.len(), message.match_id);

	if !row.telemetry_processed {
		let extracted = run_extractors(&meta, &trace.events, &tracked);
		persist_extracted(env, extracted).await?;
		let mut conn = env.db.conn().await?;
		queries::set_stage_flag(&mut conn, &message.match_id, Stage::TelemetryProcessed).await?;
	}

	if !row.fights_processed {
		let fights = fights::track_fights(&meta, &trace.events);
		log::info!("match {}: {} fights", message.match_id, fights.len());
		let mut conn = env.db.conn().await?;
		for fight in &fights {
			queries::insert_fight(&mut conn, fight).await?;
		}
		queries::set_stage_flag(&mut conn, &message.match_id, Stage::FightsProcessed).await?;
	}

	ProcessingComplete { match_id: message.match_id.clone() }.enqueue(&env.publisher).await?;
	Ok(())
}

/// Fan the independent extractors out across the rayon pool; they share
/// only the parsed event slice.
fn run_extractors(
	meta: &MatchMeta,
	events: &[telemetry::TelemetryEvent],
	tracked: &HashSet<String>,
) -> Extracted {
	let mut extracted = Extracted::default();
	let Extracted { landings, kills, finishing, damage, knocks, circles, weapons, items, zones } = &mut extracted;

	rayon::scope(|s| {
		s.spawn(|_| *landings = processors::landings::extract(meta, events));
		s.spawn(|_| {
			let (kill_rows, finishing_rows) = processors::kills::extract(meta, events);
			*kills = kill_rows;
			*finishing = finishing_rows;
		});
		s.spawn(|_| *damage = processors::damage::extract(meta, events));
		s.spawn(|_| *knocks = processors::knocks::extract(meta, events));
		s.spawn(|_| *circles = processors::circles::extract(meta, events, tracked));
		s.spawn(|_| *weapons = processors::weapons::extract(meta, events));
		s.spawn(|_| *items = processors::items::extract(meta, events));
		s.spawn(|_| *zones = processors::zones::extract(meta, events));
	});
	extracted
}

async fn persist_extracted(env: &Env, extracted: Extracted) -> Result<()> {
	env.db.insert(extracted.landings).await?;
	env.db.insert(extracted.kills).await?;
	env.db.insert(extracted.finishing).await?;
	env.db.insert(extracted.damage).await?;
	env.db.insert(extracted.knocks).await?;
	env.db.insert(extracted.circles).await?;
	env.db.insert(extracted.weapons).await?;
	env.db.insert(extracted.items).await?;
	env.db.insert(extracted.zones).await?;
	Ok(())
}
