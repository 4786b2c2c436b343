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

//! Typed client over the upstream game API.
//!
//! All metered endpoints draw credentials from the [`keypool::KeyPool`],
//! which blocks until an issue respects every budget. Transient failures
//! (network, timeout, 5xx) retry with bounded exponential backoff; a 429
//! sleeps out the remainder of the rate window and retries once before
//! surfacing as [`ArchiveError::RateLimited`].

pub mod keypool;
pub mod models;

use std::{sync::Arc, time::Duration, time::Instant};

use async_std::future::timeout;
use serde::de::DeserializeOwned;
use surf::StatusCode;

use self::keypool::{ApiKey, KeyPool};
use self::models::{
	Document, MatchDetail, MatchResource, PlayerMatches, PlayerResource, RankedStatsResource, SeasonResource,
};
use crate::{
	config::ApiConfig,
	error::{ArchiveError, Result},
	metrics,
	types::Platform,
};

const API_BASE: &str = "https://api.pubg.com";
/// Short timeout for API calls.
const API_TIMEOUT: Duration = Duration::from_secs(10);
/// Event-trace blobs are tens of megabytes; content delivery is slow but
/// unmetered.
const TELEMETRY_TIMEOUT: Duration = Duration::from_secs(300);
/// Backoff schedule for transient failures, in seconds.
const RETRY_BACKOFF: [u64; 3] = [1, 2, 4];
/// The batch player filter accepts at most this many names.
pub const MAX_LOOKUP_NAMES: usize = 10;

pub struct PubgClient {
	client: surf::Client,
	pool: Arc<KeyPool>,
	ranked_pool: Option<Arc<KeyPool>>,
	platform: Platform,
}

impl PubgClient {
	pub fn new(config: &ApiConfig) -> Self {
		let pool = Arc::new(KeyPool::new(&config.keys));
		let ranked_pool = config.ranked_key.as_ref().map(|key| Arc::new(KeyPool::new(std::slice::from_ref(key))));
		Self { client: surf::Client::new(), pool, ranked_pool, platform: config.platform }
	}

	pub fn platform(&self) -> Platform {
		self.platform
	}

	/// Batch lookup of up to [`MAX_LOOKUP_NAMES`] display names, returning
	/// each resolved player with their recent match ids.
	pub async fn players(&self, names: &[String]) -> Result<Vec<PlayerMatches>> {
		if names.is_empty() || names.len() > MAX_LOOKUP_NAMES {
			return Err(ArchiveError::Msg(format!(
				"player lookup takes 1..{} names, got {}",
				MAX_LOOKUP_NAMES,
				names.len()
			)));
		}
		let key = self.pool.acquire().await;
		let url = format!(
			"{}/shards/{}/players?filter[playerNames]={}",
			API_BASE,
			self.platform.shard(),
			names.join(",")
		);
		let document: Document<Vec<PlayerResource>> = self.get_json(&url, &key).await?;
		Ok(document.data.into_iter().map(Into::into).collect())
	}

	/// Fetch a single match document. The matches endpoint class is not
	/// rate limited, so no pacing slot is consumed.
	pub async fn match_detail(&self, match_id: &str) -> Result<MatchDetail> {
		let key = self.pool.unpaced();
		let url = format!("{}/shards/{}/matches/{}", API_BASE, self.platform.shard(), match_id);
		let document: Document<MatchResource> = self.get_json(&url, &key).await?;
		Ok(MatchDetail::from_document(document))
	}

	/// List the seasons known to the upstream.
	pub async fn seasons(&self) -> Result<Vec<SeasonResource>> {
		let key = self.pool.acquire().await;
		let url = format!("{}/shards/{}/seasons", API_BASE, self.platform.shard());
		let document: Document<Vec<SeasonResource>> = self.get_json(&url, &key).await?;
		Ok(document.data)
	}

	/// Per-game-mode ranked records for one account and season. Drawn from
	/// the dedicated ranked credential when one is configured.
	pub async fn ranked_stats(&self, account_id: &str, season_id: &str) -> Result<RankedStatsResource> {
		let key = match &self.ranked_pool {
			Some(pool) => pool.acquire().await,
			None => self.pool.acquire().await,
		};
		let url = format!(
			"{}/shards/{}/players/{}/seasons/{}/ranked",
			API_BASE,
			self.platform.shard(),
			account_id,
			season_id
		);
		let document: Document<RankedStatsResource> = self.get_json(&url, &key).await?;
		Ok(document.data)
	}

	/// Stream the raw event-trace blob to `dest`. Unauthenticated and
	/// unmetered; the written bytes are whatever the CDN served (usually
	/// gzip). Returns the byte count.
	pub async fn download_telemetry(&self, url: &str, dest: &std::path::Path) -> Result<u64> {
		let started = Instant::now();
		let download = async {
			let mut response = self.client.get(url).header("Accept", "application/json").await?;
			let status = response.status();
			metrics::API_REQUESTS.with_label_values(&["telemetry-cdn", status_label(status)]).inc();
			if !status.is_success() {
				return Err(ArchiveError::UpstreamStatus(u16::from(status)));
			}
			let body = response.take_body();
			let mut file = async_std::fs::File::create(dest).await?;
			let written = async_std::io::copy(body, &mut file).await?;
			Ok(written)
		};
		let written = timeout(TELEMETRY_TIMEOUT, download).await.map_err(|_| ArchiveError::Timeout)??;
		metrics::API_REQUEST_DURATION.with_label_values(&["telemetry-cdn"]).observe(started.elapsed().as_secs_f64());
		Ok(written)
	}

	/// One authenticated GET with retry, backoff and rate-limit handling.
	async fn get_json<T: DeserializeOwned>(&self, url: &str, key: &ApiKey) -> Result<T> {
		let mut backoff = RETRY_BACKOFF.iter();
		let mut rate_limit_retried = false;
		loop {
			let started = Instant::now();
			let sent = timeout(
				API_TIMEOUT,
				self.client
					.get(url)
					.header("Authorization", format!("Bearer {}", key.key))
					.header("Accept", "application/vnd.api+json"),
			)
			.await;

			let response = match sent {
				Err(_) => {
					metrics::API_REQUESTS.with_label_values(&[key.label.as_str(), "timeout"]).inc();
					match backoff.next() {
						Some(secs) => {
							log::warn!("request to {} timed out, retrying in {}s", url, secs);
							async_std::task::sleep(Duration::from_secs(*secs)).await;
							continue;
						}
						None => return Err(ArchiveError::Timeout),
					}
				}
				Ok(Err(e)) => {
					metrics::API_REQUESTS.with_label_values(&[key.label.as_str(), "error"]).inc();
					match backoff.next() {
						Some(secs) => {
							log::warn!("request to {} failed ({}), retrying in {}s", url, e, secs);
							async_std::task::sleep(Duration::from_secs(*secs)).await;
							continue;
						}
						None => return Err(e.into()),
					}
				}
				Ok(Ok(response)) => response,
			};
			let mut response = response;
			let status = response.status();
			metrics::API_REQUESTS.with_label_values(&[key.label.as_str(), status_label(status)]).inc();
			metrics::API_REQUEST_DURATION.with_label_values(&[key.label.as_str()]).observe(started.elapsed().as_secs_f64());

			if status.is_success() {
				return Ok(response.body_json().await?);
			}

			match status {
				StatusCode::TooManyRequests => {
					if rate_limit_retried {
						return Err(ArchiveError::RateLimited);
					}
					// Sleep out the rest of the minute window, then retry once.
					log::warn!("rate limited on {}, backing off for the window", key.label);
					rate_limit_retried = true;
					async_std::task::sleep(Duration::from_secs(60)).await;
				}
				StatusCode::NotFound => return Err(ArchiveError::NotFound(url.to_string())),
				status if status.is_server_error() => match backoff.next() {
					Some(secs) => {
						log::warn!("upstream returned {} for {}, retrying in {}s", status, url, secs);
						async_std::task::sleep(Duration::from_secs(*secs)).await;
					}
					None => return Err(ArchiveError::UpstreamStatus(u16::from(status))),
				},
				status => return Err(ArchiveError::UpstreamStatus(u16::from(status))),
			}
		}
	}
}

fn status_label(status: StatusCode) -> &'static str {
	if status.is_success() {
		"2xx"
	} else if u16::from(status) == 429 {
		"429"
	} else if status.is_client_error() {
		"4xx"
	} else if status.is_server_error() {
		"5xx"
	} else {
		"other"
	}
}

/// Split a tracked-player roster into lookup-sized chunks.
pub fn chunk_names(names: &[String]) -> impl Iterator<Item = &[String]> {
	names.chunks(MAX_LOOKUP_NAMES)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn names_are_chunked_at_the_lookup_limit() {
		let names: Vec<String> = (0..23).map(|i| format!("player-{}", i)).collect();
		let chunks: Vec<&[String]> = chunk_names(&names).collect();
		assert_eq!(chunks.len(), 3);
		assert_eq!(chunks[0].len(), 10);
		assert_eq!(chunks[2].len(), 3);

		let exactly_ten: Vec<String> = (0..10).map(|i| format!("player-{}", i)).collect();
		assert_eq!(chunk_names(&exactly_ten).count(), 1);
	}
}
