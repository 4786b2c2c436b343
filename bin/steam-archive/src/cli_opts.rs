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

use std::path::PathBuf;
use std::str::FromStr;

use clap::{App, Arg};

/// Which process this invocation runs as. One role per process; scaling
/// out means more replicas of the same role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	Discovery,
	Summary,
	Download,
	Process,
	Aggregate,
	Backfill,
	Ranked,
	Migrate,
}

impl FromStr for Role {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"discovery" => Ok(Role::Discovery),
			"summary" => Ok(Role::Summary),
			"download" => Ok(Role::Download),
			"process" => Ok(Role::Process),
			"aggregate" => Ok(Role::Aggregate),
			"backfill" => Ok(Role::Backfill),
			"ranked" => Ok(Role::Ranked),
			"migrate" => Ok(Role::Migrate),
			other => Err(format!("unknown role `{}`", other)),
		}
	}
}

#[derive(Debug, Clone)]
pub struct CliOpts {
	pub file: Option<PathBuf>,
	pub log_level: log::LevelFilter,
	pub role: Role,
	/// Discovery only: one sweep and exit.
	pub once: bool,
	/// Discovery only: use the tournament roster tagging.
	pub tournament: bool,
}

impl CliOpts {
	pub fn parse() -> Result<Self, String> {
		let matches = App::new("steam-archive")
			.about("PUBG data-collection pipeline, steam shard")
			.arg(Arg::with_name("config").short("c").long("config").takes_value(true).help("TOML configuration file; falls back to the environment"))
			.arg(Arg::with_name("role").short("r").long("role").takes_value(true).required(true).help("discovery | summary | download | process | aggregate | backfill | ranked | migrate"))
			.arg(Arg::with_name("once").long("once").help("run a single discovery sweep and exit"))
			.arg(Arg::with_name("tournament").long("tournament").help("discover with the tournament tagging"))
			.arg(Arg::with_name("verbose").short("v").multiple(true).help("increase log verbosity"))
			.get_matches();

		let log_level = match matches.occurrences_of("verbose") {
			0 | 1 | 2 => log::LevelFilter::Info,
			3 => log::LevelFilter::Debug,
			_ => log::LevelFilter::Trace,
		};
		let role = matches.value_of("role").expect("role is required by clap; qed").parse::<Role>()?;

		Ok(CliOpts {
			file: matches.value_of("config").map(PathBuf::from),
			log_level,
			role,
			once: matches.is_present("once"),
			tournament: matches.is_present("tournament"),
		})
	}
}
