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

//! Types shared across the pipeline: match lifecycle, queue payloads and
//! their routing keys.

use std::{fmt, path::Path, path::PathBuf, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

/// Routing keys on the topic exchange. Each queue binds to exactly one.
pub mod routing {
	pub const MATCH_DISCOVERED: &str = "match.discovered";
	pub const SUMMARY_COMPLETE: &str = "match.summary_complete";
	pub const TELEMETRY_DOWNLOADED: &str = "match.telemetry_downloaded";
	pub const PROCESSING_COMPLETE: &str = "match.processing_complete";
}

/// Durable queue names, one per worker role.
pub mod queues {
	pub const MATCH_SUMMARY: &str = "match_summary";
	pub const TELEMETRY_DOWNLOAD: &str = "telemetry_download";
	pub const TELEMETRY_PROCESSING: &str = "telemetry_processing";
}

/// Shard the upstream API is queried under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
	Steam,
	Kakao,
	Psn,
	Xbox,
}

impl Platform {
	pub fn shard(&self) -> &'static str {
		match self {
			Platform::Steam => "steam",
			Platform::Kakao => "kakao",
			Platform::Psn => "psn",
			Platform::Xbox => "xbox",
		}
	}
}

impl FromStr for Platform {
	type Err = ArchiveError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"steam" => Ok(Platform::Steam),
			"kakao" => Ok(Platform::Kakao),
			"psn" => Ok(Platform::Psn),
			"xbox" => Ok(Platform::Xbox),
			other => Err(ArchiveError::Config(format!("unknown platform `{}`", other))),
		}
	}
}

impl fmt::Display for Platform {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.shard())
	}
}

/// Lifecycle of a match row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
	Discovered,
	Processing,
	Completed,
	Failed,
}

impl MatchStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			MatchStatus::Discovered => "discovered",
			MatchStatus::Processing => "processing",
			MatchStatus::Completed => "completed",
			MatchStatus::Failed => "failed",
		}
	}
}

/// Per-stage completion flags on the match row. Monotonic booleans; a
/// match completes only once every stage the pipeline requires is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
	Summary,
	TelemetryDownloaded,
	TelemetryProcessed,
	FightsProcessed,
	StatsAggregated,
}

impl Stage {
	/// Column holding the flag on `matches`.
	pub fn column(&self) -> &'static str {
		match self {
			Stage::Summary => "summary",
			Stage::TelemetryDownloaded => "telemetry_downloaded",
			Stage::TelemetryProcessed => "telemetry_processed",
			Stage::FightsProcessed => "fights_processed",
			Stage::StatsAggregated => "stats_aggregated",
		}
	}
}

/// Aggregation bucket a match contributes to. Every contribution is also
/// written to `All` so per-player lookups need not union buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatsBucket {
	Ranked,
	Normal,
	Tournament,
	All,
}

impl StatsBucket {
	pub fn as_str(&self) -> &'static str {
		match self {
			StatsBucket::Ranked => "ranked",
			StatsBucket::Normal => "normal",
			StatsBucket::Tournament => "tournament",
			StatsBucket::All => "all",
		}
	}

	/// Map the upstream game type onto a bucket.
	pub fn from_game_type(game_type: &str, is_tournament: bool) -> Self {
		if is_tournament {
			return StatsBucket::Tournament;
		}
		match game_type {
			"competitive" | "ranked" | "esports" => StatsBucket::Ranked,
			_ => StatsBucket::Normal,
		}
	}
}

/// Deterministic on-disk location of a match's raw event trace.
pub fn telemetry_path(root: &Path, match_id: &str) -> PathBuf {
	root.join(format!("matchID={}", match_id)).join("raw.json.gz")
}

/// Published by the discovery service when a match is first seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchDiscovered {
	pub match_id: String,
	pub map_name: String,
	pub game_mode: String,
	pub game_type: String,
	pub telemetry_url: String,
	pub created_at: DateTime<Utc>,
}

/// Published by the summary worker once roster and summary rows exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryComplete {
	pub match_id: String,
	pub map_name: String,
	pub game_type: String,
	pub telemetry_url: String,
}

/// Published by the download worker once the raw trace is on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryDownloaded {
	pub match_id: String,
	pub map_name: String,
	pub game_type: String,
}

/// Published by the processing worker when every processor finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingComplete {
	pub match_id: String,
}

/// Metadata handed to every telemetry processor alongside the event slice.
#[derive(Debug, Clone)]
pub struct MatchMeta {
	pub match_id: String,
	pub map_name: String,
	pub game_type: String,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn game_types_map_to_buckets() {
		assert_eq!(StatsBucket::from_game_type("competitive", false), StatsBucket::Ranked);
		assert_eq!(StatsBucket::from_game_type("ranked", false), StatsBucket::Ranked);
		assert_eq!(StatsBucket::from_game_type("esports", false), StatsBucket::Ranked);
		assert_eq!(StatsBucket::from_game_type("official", false), StatsBucket::Normal);
		assert_eq!(StatsBucket::from_game_type("arcade", false), StatsBucket::Normal);
		assert_eq!(StatsBucket::from_game_type("official", true), StatsBucket::Tournament);
	}

	#[test]
	fn telemetry_paths_are_deterministic() {
		let path = telemetry_path(Path::new("/var/telemetry"), "match-abc");
		assert_eq!(path, PathBuf::from("/var/telemetry/matchID=match-abc/raw.json.gz"));
	}

	#[test]
	fn platform_parses_case_insensitively() {
		assert_eq!("Steam".parse::<Platform>().unwrap(), Platform::Steam);
		assert!("switch".parse::<Platform>().is_err());
	}
}
