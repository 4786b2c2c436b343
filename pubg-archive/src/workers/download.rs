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

//! Telemetry-download worker: streams the event-trace blob to
//! `<root>/matchID=<id>/raw.json.gz`. Partial files never survive a
//! failed download.

use std::{
	fs,
	io::{Read, Write},
	path::Path,
	time::Instant,
};

use async_std::task;
use flate2::{read::GzEncoder, Compression};
use pa_work_queue::{Job, PerformError};

use crate::{
	database::queries,
	error::Result,
	metrics,
	types::{queues, routing, telemetry_path, Stage, SummaryComplete, TelemetryDownloaded},
	workers::Env,
};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

impl Job for SummaryComplete {
	type Environment = Env;
	const JOB_TYPE: &'static str = "summary_complete";
	const ROUTING_KEY: &'static str = routing::SUMMARY_COMPLETE;

	fn perform(self, env: &Env) -> Result<(), PerformError> {
		let started = Instant::now();
		let outcome = task::block_on(handle(&self, env));
		metrics::HANDLER_DURATION
			.with_label_values(&[queues::TELEMETRY_DOWNLOAD])
			.observe(started.elapsed().as_secs_f64());
		match outcome {
			Ok(()) => {
				metrics::QUEUE_MESSAGES.with_label_values(&[queues::TELEMETRY_DOWNLOAD, "ok"]).inc();
				Ok(())
			}
			Err(e) => {
				metrics::QUEUE_MESSAGES.with_label_values(&[queues::TELEMETRY_DOWNLOAD, "error"]).inc();
				metrics::WORKER_ERRORS.with_label_values(&["download"]).inc();
				Err(e.into())
			}
		}
	}
}

async fn handle(message: &SummaryComplete, env: &Env) -> Result<()> {
	let path = telemetry_path(&env.telemetry_root, &message.match_id);
	if let Some(parent) = path.parent() {
		crate::util::create_dir(parent)?;
	}

	let partial = path.with_extension("part");
	let result = env.api.download_telemetry(&message.telemetry_url, &partial).await;
	if let Err(e) = result {
		let _ = fs::remove_file(&partial);
		return Err(e);
	}
	finalize_blob(&partial, &path)?;
	log::info!("telemetry for {} stored at {}", message.match_id, path.display());

	let mut conn = env.db.conn().await?;
	queries::set_stage_flag(&mut conn, &message.match_id, Stage::TelemetryDownloaded).await?;
	drop(conn);

	TelemetryDownloaded {
		match_id: message.match_id.clone(),
		map_name: message.map_name.clone(),
		game_type: message.game_type.clone(),
	}
	.enqueue(&env.publisher)
	.await?;
	Ok(())
}

/// Move the downloaded blob into place, compressing it first if the CDN
/// served it already decoded.
fn finalize_blob(partial: &Path, dest: &Path) -> Result<()> {
	let mut magic = [0u8; 2];
	let already_gzip = {
		let mut file = fs::File::open(partial)?;
		file.read_exact(&mut magic).map(|_| magic == GZIP_MAGIC).unwrap_or(false)
	};

	if already_gzip {
		fs::rename(partial, dest)?;
	} else {
		let plain = fs::File::open(partial)?;
		let mut encoder = GzEncoder::new(plain, Compression::default());
		let mut out = fs::File::create(dest)?;
		let mut buffer = [0u8; 64 * 1024];
		loop {
			let read = encoder.read(&mut buffer)?;
			if read == 0 {
				break;
			}
			out.write_all(&buffer[..read])?;
		}
		fs::remove_file(partial)?;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn plain_blobs_are_compressed_into_place() {
		let dir = tempfile::tempdir().unwrap();
		let partial = dir.path().join("raw.part");
		let dest = dir.path().join("raw.json.gz");
		fs::write(&partial, br#"[{"_T":"LogMatchStart"}]"#).unwrap();

		finalize_blob(&partial, &dest).unwrap();
		assert!(!partial.exists());
		let stored = fs::read(&dest).unwrap();
		assert_eq!(&stored[..2], &GZIP_MAGIC);
	}

	#[test]
	fn gzip_blobs_are_moved_untouched() {
		let dir = tempfile::tempdir().unwrap();
		let partial = dir.path().join("raw.part");
		let dest = dir.path().join("raw.json.gz");

		let mut encoder = GzEncoder::new(&br#"[]"#[..], Compression::default());
		let mut bytes = Vec::new();
		encoder.read_to_end(&mut bytes).unwrap();
		fs::write(&partial, &bytes).unwrap();

		finalize_blob(&partial, &dest).unwrap();
		assert_eq!(fs::read(&dest).unwrap(), bytes);
	}
}
