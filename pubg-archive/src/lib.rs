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

#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod database;
mod error;
mod logger;
pub mod metrics;
pub mod telemetry;
pub mod types;
mod util;
pub mod workers;

pub use self::config::{ApiConfig, ArchiveConfig, BrokerConfig, ControlConfig, DatabaseConfig};
pub use self::error::ArchiveError;
pub use self::logger::init as init_logger;
pub use self::util::{archive_dir, create_dir};

pub use self::error::Result;

// Re-export the queue crate so binaries don't pin their own copy.
pub use pa_work_queue;

#[cfg(test)]
mod test {
	use std::sync::Once;

	static INIT: Once = Once::new();
	/// Guard that should be called at the beginning of every test.
	pub fn initialize() {
		INIT.call_once(|| {
			let _ = pretty_env_logger::try_init();
		});
	}
}

#[cfg(test)]
pub(crate) use test::initialize;
