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

//! Per-participant movement statistics over an engagement's time range,
//! derived from the position samples observed inside it.

use chrono::{DateTime, Utc};

use super::SIGNIFICANT_RELOCATION_M;
use crate::telemetry::events::CM_PER_METER;
use crate::telemetry::processors::PositionIndex;

#[derive(Debug, Default)]
pub struct MobilityStats {
	pub total_movement_distance: f64,
	/// Standard deviation of per-sample distance to the centroid.
	pub position_variance: f64,
	pub significant_relocations: i32,
	pub mobility_rate: f64,
	/// Max distance from the centroid.
	pub fight_radius: f64,
}

pub(super) fn attribute(
	index: &PositionIndex,
	name: &str,
	start: DateTime<Utc>,
	end: DateTime<Utc>,
	duration_seconds: f64,
) -> MobilityStats {
	let samples = index.samples_between(name, start, end);
	if samples.len() < 2 {
		return MobilityStats::default();
	}

	let mut total = 0.0;
	let mut relocations = 0;
	for pair in samples.windows(2) {
		let step = pair[0].1.distance(&pair[1].1) / CM_PER_METER;
		total += step;
		if step > SIGNIFICANT_RELOCATION_M {
			relocations += 1;
		}
	}

	let n = samples.len() as f64;
	let centroid_x = samples.iter().map(|(_, l)| l.x).sum::<f64>() / n;
	let centroid_y = samples.iter().map(|(_, l)| l.y).sum::<f64>() / n;
	let centroid_z = samples.iter().map(|(_, l)| l.z).sum::<f64>() / n;

	let spreads: Vec<f64> = samples
		.iter()
		.map(|(_, l)| {
			let (dx, dy, dz) = (l.x - centroid_x, l.y - centroid_y, l.z - centroid_z);
			(dx * dx + dy * dy + dz * dz).sqrt() / CM_PER_METER
		})
		.collect();
	let mean_spread = spreads.iter().sum::<f64>() / n;
	let variance = spreads.iter().map(|s| (s - mean_spread) * (s - mean_spread)).sum::<f64>() / n;

	MobilityStats {
		total_movement_distance: total,
		position_variance: variance.sqrt(),
		significant_relocations: relocations,
		mobility_rate: if duration_seconds > 0.0 { total / duration_seconds } else { 0.0 },
		fight_radius: spreads.iter().cloned().fold(0.0, f64::max),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::telemetry::processors::test_util::*;
	use crate::telemetry::processors::PositionIndex;

	#[test]
	fn movement_sums_steps_and_counts_relocations() {
		// 0m -> 30m -> 40m along x: steps of 30m and 10m
		let events = vec![
			position(0, player("Alice", 1, 0.0, 0.0), 0),
			position(10, player("Alice", 1, 3_000.0, 0.0), 10),
			position(20, player("Alice", 1, 4_000.0, 0.0), 20),
		];
		let index = PositionIndex::build(&events);
		let stats = attribute(&index, "Alice", at(0), at(20), 20.0);
		assert!((stats.total_movement_distance - 40.0).abs() < 0.001);
		assert_eq!(stats.significant_relocations, 1);
		assert!((stats.mobility_rate - 2.0).abs() < 0.001);
		assert!(stats.fight_radius > 0.0);
	}

	#[test]
	fn a_single_sample_yields_no_mobility() {
		let events = vec![position(0, player("Alice", 1, 0.0, 0.0), 0)];
		let index = PositionIndex::build(&events);
		let stats = attribute(&index, "Alice", at(0), at(60), 60.0);
		assert_eq!(stats.total_movement_distance, 0.0);
		assert_eq!(stats.significant_relocations, 0);
	}

	#[test]
	fn samples_outside_the_range_are_ignored() {
		let events = vec![
			position(0, player("Alice", 1, 0.0, 0.0), 0),
			position(500, player("Alice", 1, 100_000.0, 0.0), 500),
		];
		let index = PositionIndex::build(&events);
		let stats = attribute(&index, "Alice", at(0), at(60), 60.0);
		assert_eq!(stats.total_movement_distance, 0.0);
	}
}
