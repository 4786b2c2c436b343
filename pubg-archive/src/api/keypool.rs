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

//! Credential pool with proactive pacing.
//!
//! Every credential carries a sliding 60 second window of issue
//! timestamps and is never handed out while the window already holds its
//! full budget. On top of the per-credential windows the pool enforces a
//! fleet-wide minimum gap of `60 / Σ budget` seconds between any two
//! issues, so cross-key traffic is evenly spread instead of bursting up
//! to each key's cap in turn. Budgets are per process; replicas must be
//! configured with disjoint credentials.

use std::{
	collections::VecDeque,
	time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::config::ApiKeyConfig;

const WINDOW: Duration = Duration::from_secs(60);

/// A credential handed out by [`KeyPool::acquire`]. The issue was already
/// recorded against the credential's window when this value was returned.
#[derive(Clone, Debug)]
pub struct ApiKey {
	/// Stable label for logs and metrics (`key-0`, `key-1`, ...).
	pub label: String,
	/// The bearer token itself.
	pub key: String,
}

struct Credential {
	label: String,
	key: String,
	budget: usize,
	window: VecDeque<Instant>,
}

impl Credential {
	/// Earliest instant at which this credential's own window permits an
	/// issue.
	fn eligible_at(&mut self, now: Instant) -> Instant {
		while let Some(front) = self.window.front() {
			if now.duration_since(*front) >= WINDOW {
				self.window.pop_front();
			} else {
				break;
			}
		}
		if self.window.len() < self.budget {
			now
		} else {
			// window is full; free once the oldest entry ages out
			*self.window.front().expect("window holds budget > 0 entries; qed") + WINDOW
		}
	}
}

struct PoolState {
	credentials: Vec<Credential>,
	last_issue: Option<Instant>,
}

pub struct KeyPool {
	state: Mutex<PoolState>,
	/// Minimum wall-clock gap between any two issues across the fleet.
	fleet_interval: Duration,
}

impl KeyPool {
	pub fn new(keys: &[ApiKeyConfig]) -> Self {
		assert!(!keys.is_empty(), "KeyPool requires at least one credential");
		let total: u64 = keys.iter().map(|k| u64::from(k.requests_per_minute)).sum();
		let fleet_interval = Duration::from_secs_f64(60.0 / total as f64);
		let credentials = keys
			.iter()
			.enumerate()
			.map(|(i, k)| Credential {
				label: format!("key-{}", i),
				key: k.key.clone(),
				budget: k.requests_per_minute as usize,
				window: VecDeque::new(),
			})
			.collect();
		Self { state: Mutex::new(PoolState { credentials, last_issue: None }), fleet_interval }
	}

	/// Block until a request may be issued, then return the credential to
	/// use. Selects the credential whose window frees up soonest.
	pub async fn acquire(&self) -> ApiKey {
		loop {
			let (ready_at, issued) = {
				let mut state = self.state.lock();
				let now = Instant::now();
				let floor = match state.last_issue {
					Some(last) => std::cmp::max(now, last + self.fleet_interval),
					None => now,
				};

				// (index, eligible instant, window occupancy, budget); ties on
				// the instant break toward the least-loaded window so equal
				// credentials share traffic proportionally
				let candidates: Vec<(usize, Instant, usize, usize)> = state
					.credentials
					.iter_mut()
					.enumerate()
					.map(|(i, c)| (i, std::cmp::max(c.eligible_at(now), floor), c.window.len(), c.budget))
					.collect();
				let (idx, ready_at) = candidates
					.iter()
					.copied()
					.min_by(|a, b| a.1.cmp(&b.1).then_with(|| (a.2 * b.3).cmp(&(b.2 * a.3))))
					.map(|(i, at, _, _)| (i, at))
					.expect("pool holds at least one credential; qed");

				if ready_at <= now {
					let credential = &mut state.credentials[idx];
					credential.window.push_back(now);
					let key = ApiKey { label: credential.label.clone(), key: credential.key.clone() };
					state.last_issue = Some(now);
					(now, Some(key))
				} else {
					(ready_at, None)
				}
			};

			match issued {
				Some(key) => return key,
				None => async_std::task::sleep(ready_at.saturating_duration_since(Instant::now())).await,
			}
		}
	}

	/// Hand out a credential without recording an issue. Used for endpoint
	/// classes the upstream does not meter.
	pub fn unpaced(&self) -> ApiKey {
		let state = self.state.lock();
		let credential = &state.credentials[0];
		ApiKey { label: credential.label.clone(), key: credential.key.clone() }
	}

	#[cfg(test)]
	fn window_len(&self, idx: usize) -> usize {
		self.state.lock().credentials[idx].window.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::ApiKeyConfig;

	fn pool(budgets: &[u32]) -> KeyPool {
		let keys: Vec<ApiKeyConfig> = budgets
			.iter()
			.enumerate()
			.map(|(i, b)| ApiKeyConfig { key: format!("secret-{}", i), requests_per_minute: *b })
			.collect();
		KeyPool::new(&keys)
	}

	#[test]
	fn fleet_interval_is_inverse_of_total_budget() {
		let pool = pool(&[10, 100]);
		let expected = Duration::from_secs_f64(60.0 / 110.0);
		assert_eq!(pool.fleet_interval, expected);
	}

	#[async_std::test]
	async fn issues_are_evenly_paced() {
		crate::initialize();
		// 60 / (1200 + 1200) = 25ms between issues
		let pool = pool(&[1200, 1200]);
		let start = Instant::now();
		for _ in 0..6 {
			let _ = pool.acquire().await;
		}
		// five gaps of 25ms each; allow generous scheduler slop downwards
		assert!(start.elapsed() >= Duration::from_millis(100), "elapsed {:?}", start.elapsed());
	}

	#[async_std::test]
	async fn issues_are_recorded_per_credential() {
		let pool = pool(&[3000, 3000]);
		for _ in 0..4 {
			let _ = pool.acquire().await;
		}
		let issued = pool.window_len(0) + pool.window_len(1);
		assert_eq!(issued, 4);
		// soonest-eligible selection alternates between equal credentials
		assert!(pool.window_len(0) > 0 && pool.window_len(1) > 0);
	}

	#[async_std::test]
	async fn unpaced_keys_do_not_consume_budget() {
		let pool = pool(&[10]);
		for _ in 0..5 {
			let _ = pool.unpaced();
		}
		assert_eq!(pool.window_len(0), 0);
	}
}
