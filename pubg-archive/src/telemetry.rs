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

//! Event-trace loading and the parsed event union.
//!
//! A trace is parsed exactly once per match into `Vec<TelemetryEvent>`;
//! every processor and the fight engine borrow the same slice. A malformed
//! element never aborts the trace: it is skipped and counted.

pub mod events;
pub mod fights;
pub mod processors;

use std::{fs::File, io::Read, path::Path};

use flate2::read::GzDecoder;

pub use self::events::TelemetryEvent;
use crate::error::Result;

/// A fully parsed event trace.
pub struct Trace {
	pub events: Vec<TelemetryEvent>,
	/// Elements that failed to parse as their declared kind.
	pub skipped: usize,
}

/// Read and parse `<root>/matchID=<id>/raw.json.gz`.
pub fn load_trace(path: &Path) -> Result<Trace> {
	let file = File::open(path)?;
	let mut decoder = GzDecoder::new(file);
	let mut bytes = Vec::new();
	decoder.read_to_end(&mut bytes)?;
	parse_trace(&bytes)
}

/// Parse a raw JSON event array into the typed union.
pub fn parse_trace(bytes: &[u8]) -> Result<Trace> {
	let raw: Vec<serde_json::Value> = serde_json::from_slice(bytes)?;
	let mut events = Vec::with_capacity(raw.len());
	let mut skipped = 0;
	for value in raw {
		match TelemetryEvent::from_value(value) {
			Ok(event) => events.push(event),
			Err(e) => {
				log::debug!("skipping malformed telemetry event: {}", e);
				skipped += 1;
			}
		}
	}
	if skipped > 0 {
		log::warn!("trace parsed with {} malformed events skipped", skipped);
	}
	Ok(Trace { events, skipped })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn traces_parse_with_unknown_and_malformed_events() {
		let raw = br#"[
			{ "_T": "LogMatchDefinition", "matchId": "m-1", "pingQuality": "low" },
			{ "_T": "LogPlayerKillV2",
			  "_D": "2021-03-01T12:10:00.000Z",
			  "victim": { "name": "Bob", "teamId": 2, "location": { "x": 1.0, "y": 2.0, "z": 3.0 } },
			  "killer": { "name": "Alice", "teamId": 1, "location": { "x": 0.0, "y": 0.0, "z": 0.0 } }
			},
			{ "_T": "LogPlayerKillV2", "_D": "not a timestamp", "victim": 7 }
		]"#;
		let trace = parse_trace(raw).unwrap();
		assert_eq!(trace.events.len(), 2);
		assert_eq!(trace.skipped, 1);
		assert!(matches!(trace.events[0], TelemetryEvent::Other(_)));
		assert!(matches!(trace.events[1], TelemetryEvent::PlayerKill(_)));
	}
}
