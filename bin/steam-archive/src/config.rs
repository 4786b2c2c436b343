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

use std::path::Path;

use pubg_archive::{ArchiveConfig, ArchiveError};

use crate::cli_opts::CliOpts;

#[derive(Debug, Clone)]
pub struct Config {
	cli: CliOpts,
	archive: ArchiveConfig,
}

impl Config {
	/// CLI options plus the archive configuration, from the TOML file when
	/// one was given and the environment otherwise.
	pub fn new() -> Result<Self, ArchiveError> {
		let cli = CliOpts::parse().map_err(ArchiveError::Config)?;
		let archive = match &cli.file {
			Some(file) => Self::parse_file(file)?,
			None => ArchiveConfig::from_env()?,
		};
		Ok(Self { cli, archive })
	}

	fn parse_file(path: &Path) -> Result<ArchiveConfig, ArchiveError> {
		let toml_str = std::fs::read_to_string(path)?;
		toml::from_str(toml_str.as_str()).map_err(|e| ArchiveError::Config(format!("{}: {}", path.display(), e)))
	}

	pub fn cli(&self) -> &CliOpts {
		&self.cli
	}

	pub fn archive(&self) -> &ArchiveConfig {
		&self.archive
	}
}
