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

use std::{
	any::Any,
	panic::{catch_unwind, PanicInfo, RefUnwindSafe, UnwindSafe},
	sync::Arc,
	time::Duration,
};

use async_amqp::*;
use lapin::{
	options::{ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
	types::{AMQPValue, FieldTable},
	Channel, Connection, ConnectionProperties, ExchangeKind, Queue,
};

use crate::{
	error::*,
	job::{Job, Registry},
	registry::Envelope,
	threadpool::ThreadPoolMq,
};

/// Suffix appended to the exchange name to form the dead-letter exchange.
const DEAD_LETTER_SUFFIX: &str = ".dead-letter";

/// Open a broker connection on the async-std reactor.
pub fn connect(addr: &str) -> Result<Connection, Error> {
	Ok(Connection::connect(addr, ConnectionProperties::default().with_async_std()).wait()?)
}

/// Builder pattern struct for the Runner
pub struct Builder<Env> {
	environment: Env,
	num_threads: usize,
	addr: String,
	exchange: String,
	registry: Registry<Env>,
	queue_name: String,
	routing_key: String,
	prefetch: u16,
	/// Amount of time to wait until a handler is deemed a failure
	timeout: Option<Duration>,
}

impl<Env: 'static> Builder<Env> {
	/// Instantiate a new instance of the Builder
	pub fn new<S: AsRef<str>>(environment: Env, addr: S, exchange: S) -> Self {
		Self {
			environment,
			addr: addr.as_ref().into(),
			exchange: exchange.as_ref().into(),
			num_threads: num_cpus::get(),
			registry: Registry::new(),
			queue_name: String::new(),
			routing_key: String::new(),
			timeout: None,
			prefetch: 1,
		}
	}

	/// Register a message type this runner consumes.
	/// Messages whose `job_type` has no registered handler are dead-lettered.
	pub fn register_job<T: Job<Environment = Env> + 'static + Send>(mut self) -> Self {
		self.registry.register_job::<T>();
		self
	}

	/// specify the amount of threads to run the threadpool with
	pub fn num_threads(mut self, threads: usize) -> Self {
		self.num_threads = threads;
		self
	}

	/// Set a timeout.
	/// This timeout is the maximum amount of time the runner will wait for a
	/// handler to begin before returning an error.
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);
		self
	}

	/// Set the name of the durable queue this role consumes.
	pub fn queue_name<S: AsRef<str>>(mut self, name: S) -> Self {
		self.queue_name = name.as_ref().to_string();
		self
	}

	/// Set the routing key the queue binds to. Exactly one per queue.
	pub fn routing_key<S: AsRef<str>>(mut self, key: S) -> Self {
		self.routing_key = key.as_ref().to_string();
		self
	}

	pub fn prefetch(mut self, prefetch: u16) -> Self {
		self.prefetch = prefetch;
		self
	}

	/// Build the runner, declaring the exchange, queue, binding and
	/// dead-letter topology on the broker.
	pub fn build(self) -> Result<Runner<Env>, Error> {
		let timeout = self.timeout.unwrap_or_else(|| Duration::from_secs(5));
		let conn = Connection::connect(&self.addr, ConnectionProperties::default().with_async_std()).wait()?;
		let handle = QueueHandle::new(&conn, &self.exchange, &self.queue_name, &self.routing_key)?;
		let threadpool = ThreadPoolMq::builder()
			.name("pa-queue-worker")
			.addr(&self.addr)
			.queue_name(&self.queue_name)
			.threads(self.num_threads)
			.prefetch(self.prefetch)
			.build()?;

		Ok(Runner {
			threadpool,
			conn,
			handle,
			environment: Arc::new(self.environment),
			registry: Arc::new(self.registry),
			exchange: self.exchange,
			queue_name: self.queue_name,
			timeout,
		})
	}
}

/// Runner for queued messages.
/// Handlers are run synchronously in a threadpool.
pub struct Runner<Env> {
	threadpool: ThreadPoolMq,
	conn: Connection,
	handle: QueueHandle,
	environment: Arc<Env>,
	registry: Arc<Registry<Env>>,
	exchange: String,
	queue_name: String,
	timeout: Duration,
}

#[derive(Debug)]
pub enum Event {
	/// Queues are currently working
	Working,
	/// No more messages available in the queue
	NoJobAvailable,
	/// An error occurred loading the message from the broker
	ErrorLoadingJob(FetchError),
}

/// Thin wrapper over a `Channel` bound to one exchange.
/// Consumer roles also hold their declared queue; pure publishers do not.
#[derive(Clone)]
pub struct QueueHandle {
	channel: Channel,
	exchange: String,
	queue: Option<Queue>,
}

impl QueueHandle {
	/// Create a handle for a consuming role: declares the topic exchange,
	/// the dead-letter exchange, the role's durable queue (dead-lettering
	/// into `<exchange>.dead-letter`), a `<queue>.dead` holding queue, and
	/// the routing-key binding.
	pub fn new(connection: &Connection, exchange: &str, queue: &str, routing_key: &str) -> Result<Self, Error> {
		let channel = Self::open_channel(connection, exchange)?;

		let dead_letter_exchange = format!("{}{}", exchange, DEAD_LETTER_SUFFIX);
		let mut table = FieldTable::default();
		table.insert("x-queue-mode".into(), AMQPValue::LongString("lazy".into()));
		table.insert("x-dead-letter-exchange".into(), AMQPValue::LongString(dead_letter_exchange.as_str().into()));
		let queue = channel
			.queue_declare(queue, QueueDeclareOptions { durable: true, ..Default::default() }, table)
			.wait()?;
		channel
			.queue_bind(
				queue.name().as_str(),
				exchange,
				routing_key,
				QueueBindOptions::default(),
				FieldTable::default(),
			)
			.wait()?;

		let dead_queue = format!("{}.dead", queue.name().as_str());
		channel
			.queue_declare(&dead_queue, QueueDeclareOptions { durable: true, ..Default::default() }, FieldTable::default())
			.wait()?;
		channel
			.queue_bind(&dead_queue, &dead_letter_exchange, "#", QueueBindOptions::default(), FieldTable::default())
			.wait()?;

		Ok(Self { channel, exchange: exchange.to_string(), queue: Some(queue) })
	}

	/// Create a publish-only handle: declares the exchanges but no queue.
	pub fn publisher(connection: &Connection, exchange: &str) -> Result<Self, Error> {
		let channel = Self::open_channel(connection, exchange)?;
		Ok(Self { channel, exchange: exchange.to_string(), queue: None })
	}

	fn open_channel(connection: &Connection, exchange: &str) -> Result<Channel, Error> {
		let channel = connection.create_channel().wait()?;
		channel.confirm_select(ConfirmSelectOptions::default()).wait()?;
		channel
			.exchange_declare(
				exchange,
				ExchangeKind::Topic,
				ExchangeDeclareOptions { durable: true, ..Default::default() },
				FieldTable::default(),
			)
			.wait()?;
		channel
			.exchange_declare(
				&format!("{}{}", exchange, DEAD_LETTER_SUFFIX),
				ExchangeKind::Topic,
				ExchangeDeclareOptions { durable: true, ..Default::default() },
				FieldTable::default(),
			)
			.wait()?;
		Ok(channel)
	}

	/// Publish on the exchange under `routing_key` and wait for the
	/// broker's confirm.
	pub(crate) async fn publish(&self, routing_key: &str, payload: Vec<u8>) -> Result<(), lapin::Error> {
		let confirm = self
			.channel
			.basic_publish(&self.exchange, routing_key, Default::default(), payload, Default::default())
			.await?;
		confirm.await?;
		Ok(())
	}

	/// No-op publish verifying the broker is reachable and confirming.
	/// Nothing binds the healthcheck key, so the message is dropped.
	pub async fn healthcheck(&self) -> Result<(), lapin::Error> {
		self.publish(crate::HEALTHCHECK_KEY, b"{}".to_vec()).await
	}

	/// Name of the queue this handle holds, if it is a consumer handle.
	pub fn queue_name(&self) -> Option<&str> {
		self.queue.as_ref().map(|q| q.name().as_str())
	}

	/// Name of the dead-letter queue paired with this handle's queue.
	pub fn dead_queue_name(&self) -> Option<String> {
		self.queue.as_ref().map(|q| format!("{}.dead", q.name().as_str()))
	}

	pub fn channel(&self) -> &Channel {
		&self.channel
	}

	fn message_count(&self) -> u32 {
		self.queue.as_ref().map(|q| q.message_count()).unwrap_or(0)
	}
}

// Methods which don't require `RefUnwindSafe`
impl<Env: 'static> Runner<Env> {
	/// Build the builder for `Runner`
	pub fn builder(env: Env, addr: &str, exchange: &str) -> Builder<Env> {
		Builder::new(env, addr, exchange)
	}

	/// Get the RabbitMQ connection the runner is using.
	pub fn connection(&self) -> &Connection {
		&self.conn
	}

	/// Get a reference to the handle held by `Runner`
	pub fn handle(&self) -> &QueueHandle {
		&self.handle
	}

	/// Create a new handle, using the same connection as `Runner`, but on a
	/// unique channel.
	pub fn unique_handle(&self) -> Result<QueueHandle, Error> {
		QueueHandle::publisher(&self.conn, &self.exchange)
	}

	pub fn queue_name(&self) -> &str {
		&self.queue_name
	}

	pub fn queued_job_count(&self) -> usize {
		self.threadpool.queued_count()
	}

	pub fn job_count(&self) -> usize {
		self.handle.message_count() as usize
	}

	pub fn max_jobs(&self) -> usize {
		self.threadpool.max_count()
	}
}

impl<Env: Send + Sync + RefUnwindSafe + 'static> Runner<Env> {
	/// Runs all the pending messages in a loop, returning once the queue
	/// reports empty.
	pub fn run_pending_tasks(&self) -> Result<(), FetchError> {
		let max_threads = self.threadpool.max_count();
		log::debug!("Max Threads: {}", max_threads);

		let mut pending_messages = 0;
		loop {
			let available_threads = max_threads - self.threadpool.active_count();
			log::debug!(
				"pending_messages={}, available_threads={}, queue_messages={}, threadpool_queued={}, threadpool_active={}",
				&pending_messages,
				&available_threads,
				self.handle.message_count(),
				self.threadpool.queued_count(),
				self.threadpool.active_count(),
			);

			let jobs_to_queue =
				if pending_messages == 0 { std::cmp::max(available_threads, 1) } else { available_threads };

			for _ in 0..jobs_to_queue {
				self.run_single_sync_job()
			}

			pending_messages += jobs_to_queue;
			match self.threadpool.events().recv_timeout(self.timeout) {
				Ok(Event::Working) => pending_messages -= 1,
				Ok(Event::NoJobAvailable) => return Ok(()),
				Ok(Event::ErrorLoadingJob(e)) => return Err(e),
				Err(flume::RecvTimeoutError::Timeout) => return Err(FetchError::Timeout),
				Err(flume::RecvTimeoutError::Disconnected) => {
					log::warn!("Job sender disconnected!");
					return Err(FetchError::Timeout);
				}
			}
		}
	}

	fn run_single_sync_job(&self) {
		let env = Arc::clone(&self.environment);
		let registry = Arc::clone(&self.registry);

		self.get_single_job(move |envelope| {
			let perform_fn = registry
				.get(&envelope.job_type)
				.ok_or_else(|| PerformError::from(format!("Unknown message type {}", envelope.job_type)))?;
			perform_fn.perform(envelope.data, &env)
		});
	}

	fn get_single_job<F>(&self, fun: F)
	where
		F: FnOnce(Envelope) -> Result<(), PerformError> + Send + UnwindSafe + 'static,
	{
		self.threadpool
			.execute(move |job| catch_unwind(|| fun(job)).map_err(|e| try_to_extract_panic_info(&e)).and_then(|r| r))
	}
}

fn try_to_extract_panic_info(info: &(dyn Any + Send + 'static)) -> PerformError {
	if let Some(x) = info.downcast_ref::<PanicInfo>() {
		format!("handler panicked: {}", x).into()
	} else if let Some(x) = info.downcast_ref::<&'static str>() {
		format!("handler panicked: {}", x).into()
	} else if let Some(x) = info.downcast_ref::<String>() {
		format!("handler panicked: {}", x).into()
	} else {
		"handler panicked".into()
	}
}

#[cfg(any(test, feature = "test_components"))]
impl<Env: Send + Sync + RefUnwindSafe + 'static> Runner<Env> {
	/// Wait for handlers to finish based on timeout.
	/// This is mostly used for internal tests.
	pub fn wait_for_all_tasks(&self) -> Result<(), String> {
		self.threadpool.join();
		let panic_count = self.threadpool.panic_count();
		if panic_count == 0 {
			Ok(())
		} else {
			Err(format!("{} threads panicked", panic_count))
		}
	}
}
