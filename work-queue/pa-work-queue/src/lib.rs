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

//! Work queue over a RabbitMQ topic exchange.
//!
//! Every worker role owns one durable queue bound to exactly one routing
//! key. Messages are consumed with `prefetch = 1` and acknowledged manually
//! once the handler returns; failed handlers negative-acknowledge without
//! requeue so the message lands on the role's dead-letter queue.

#[doc(hidden)]
pub extern crate async_trait;
#[doc(hidden)]
pub extern crate serde;
#[doc(hidden)]
pub use serde::{de::DeserializeOwned, Deserialize, Serialize};

mod error;
mod job;
mod registry;
mod runner;
mod threadpool;

pub use crate::error::*;
pub use crate::job::*;
pub use crate::registry::Envelope;
pub use crate::runner::{connect, Builder, Event, QueueHandle, Runner};

pub use lapin::Connection;

/// Routing key used to verify broker reachability on startup.
pub const HEALTHCHECK_KEY: &str = "healthcheck";
