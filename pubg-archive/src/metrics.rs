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

//! Process-level counters and histograms. Registered against the default
//! registry; serving them to a scraper is the deployment's concern.

use lazy_static::lazy_static;
use prometheus::{
	register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
	/// API requests issued, per credential label and response status.
	pub static ref API_REQUESTS: IntCounterVec = register_int_counter_vec!(
		"archive_api_requests_total",
		"Upstream API requests by credential and status",
		&["credential", "status"]
	)
	.unwrap();

	/// Upstream request latency per credential label.
	pub static ref API_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
		"archive_api_request_duration_seconds",
		"Upstream API request duration by credential",
		&["credential"]
	)
	.unwrap();

	/// Messages processed per queue.
	pub static ref QUEUE_MESSAGES: IntCounterVec = register_int_counter_vec!(
		"archive_queue_messages_total",
		"Queue messages processed by queue and outcome",
		&["queue", "outcome"]
	)
	.unwrap();

	/// Handler latency per queue.
	pub static ref HANDLER_DURATION: HistogramVec = register_histogram_vec!(
		"archive_queue_handler_duration_seconds",
		"Message handler duration by queue",
		&["queue"]
	)
	.unwrap();

	/// Errors per worker role.
	pub static ref WORKER_ERRORS: IntCounterVec = register_int_counter_vec!(
		"archive_worker_errors_total",
		"Worker errors by role",
		&["role"]
	)
	.unwrap();

	/// Store operation latency per named operation.
	pub static ref DB_OP_DURATION: HistogramVec = register_histogram_vec!(
		"archive_database_operation_duration_seconds",
		"Database operation duration by operation",
		&["operation"]
	)
	.unwrap();
}

/// Encode every registered series in the Prometheus text format.
pub fn gather() -> String {
	let mut buffer = Vec::new();
	let encoder = TextEncoder::new();
	if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
		log::warn!("failed to encode metrics: {}", e);
	}
	String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn series_register_and_encode() {
		API_REQUESTS.with_label_values(&["key-0", "200"]).inc();
		QUEUE_MESSAGES.with_label_values(&["match_summary", "ok"]).inc();
		WORKER_ERRORS.with_label_values(&["discovery"]).inc();
		let text = gather();
		assert!(text.contains("archive_api_requests_total"));
		assert!(text.contains("archive_worker_errors_total"));
	}
}
