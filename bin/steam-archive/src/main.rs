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

mod cli_opts;
mod config;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_std::task;

use pubg_archive::pa_work_queue::{FetchError, Runner};
use pubg_archive::workers::{
	aggregate::AggregationService,
	backfill::BackfillOrchestrator,
	discovery::{DiscoveryMode, DiscoveryService},
	download_runner, process_runner,
	ranked::RankedSyncService,
	summary_runner, Env, Environment,
};
use pubg_archive::{database, ArchiveError};

use crate::cli_opts::Role;

fn main() {
	let code = match run() {
		Ok(()) => 0,
		Err(e) => {
			log::error!("{}", e);
			eprintln!("steam-archive: {}", e);
			exit_code(&e)
		}
	};
	std::process::exit(code);
}

fn exit_code(error: &ArchiveError) -> i32 {
	match error {
		ArchiveError::Config(_) | ArchiveError::Env(_) => 2,
		// store or broker unreachable at startup
		ArchiveError::Sql(_) | ArchiveError::Queue(_) | ArchiveError::Enqueue(_) => 3,
		_ => 1,
	}
}

fn run() -> Result<(), ArchiveError> {
	let config = config::Config::new()?;
	pubg_archive::init_logger(config.cli().log_level, log::LevelFilter::Debug)?;

	let running = Arc::new(AtomicBool::new(true));
	let r = running.clone();
	ctrlc::set_handler(move || {
		r.store(false, Ordering::SeqCst);
	})
	.expect("Error setting Ctrl-C handler");

	let archive = config.archive().clone();
	let role = config.cli().role;
	log::info!("steam-archive starting as {:?}", role);

	task::block_on(async move {
		match role {
			Role::Migrate => database::migrate(&archive.database.url()).await,
			Role::Discovery => {
				let env = Environment::new(&archive).await?;
				let mode = if config.cli().tournament { DiscoveryMode::Tournament } else { DiscoveryMode::Standard };
				let interval = Duration::from_secs(archive.control.discovery_interval_secs);
				let service = DiscoveryService::new(env, mode, interval);
				if config.cli().once {
					let summary = service.sweep().await?;
					log::info!(
						"sweep done: {} players scanned, {} matches discovered, {} failures in {:?}",
						summary.players_scanned,
						summary.matches_discovered,
						summary.failures,
						summary.elapsed,
					);
					Ok(())
				} else {
					service.run(&running).await
				}
			}
			Role::Summary => {
				let env = Environment::new(&archive).await?;
				let runner = summary_runner(env, &archive)?;
				worker_loop(&runner, &running);
				Ok(())
			}
			Role::Download => {
				let env = Environment::new(&archive).await?;
				let runner = download_runner(env, &archive)?;
				worker_loop(&runner, &running);
				Ok(())
			}
			Role::Process => {
				let env = Environment::new(&archive).await?;
				let runner = process_runner(env, &archive)?;
				worker_loop(&runner, &running);
				Ok(())
			}
			Role::Aggregate => {
				let db = database::Database::new(&archive.database.url()).await?;
				let interval = Duration::from_secs(archive.control.aggregation_interval_secs);
				AggregationService::new(db, interval).run(&running).await
			}
			Role::Backfill => {
				let env = Environment::new(&archive).await?;
				let orchestrator =
					BackfillOrchestrator::new(env, archive.control.backfill_batch, Duration::from_secs(30));
				orchestrator.run(&running).await
			}
			Role::Ranked => {
				let env = Environment::new(&archive).await?;
				let synced = RankedSyncService::new(env).sync_ranked_stats().await?;
				log::info!("ranked stats synced for {} players", synced);
				Ok(())
			}
		}
	})
}

/// Drain the role's queue until shutdown. In-flight handlers complete; no
/// new messages are consumed once the flag drops.
fn worker_loop(runner: &Runner<Env>, running: &AtomicBool) {
	while running.load(Ordering::SeqCst) {
		match runner.run_pending_tasks() {
			// queue drained; idle before polling again
			Ok(()) => std::thread::sleep(Duration::from_secs(1)),
			Err(FetchError::Timeout) => {}
			Err(e) => {
				log::error!("worker loop error: {}", e);
				std::thread::sleep(Duration::from_secs(5));
			}
		}
	}
	log::info!("shutdown requested, draining stopped");
}
