//! The routing data source handed to the persistence layer

use crate::error::RoutingResult;
use crate::registry::DataSourceRegistry;
use crate::route::{RouteKey, RouteKeyContext};
use crate::transaction::{TransactionEvent, TransactionListener};
use crate::unit_of_work::UnitOfWork;
use routedb_pool::{Connection, DataSource};
use std::fmt;
use std::sync::Arc;

/// Picks a pool per connection request from the caller's route-key context
///
/// Cloning is cheap; every clone shares the same registry and listeners.
///
/// # Examples
///
/// ```
/// use routedb_core::{DataSourceRegistry, RouteKeyContext, RoutingDataSource};
/// use routedb_pool::{AnyDataSource, PoolConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = DataSourceRegistry::builder()
///     .register("master", AnyDataSource::connect("sqlite::memory:", PoolConfig::default()).await?)
///     .register("slave1", AnyDataSource::connect("sqlite::memory:", PoolConfig::default()).await?)
///     .default_key("master")
///     .build()?;
/// let router = RoutingDataSource::new(registry);
///
/// let mut routes = RouteKeyContext::new();
/// assert_eq!(router.resolve(&routes)?.0.as_str(), "master");
///
/// routes.push("slave1");
/// assert_eq!(router.resolve(&routes)?.0.as_str(), "slave1");
/// # Ok(())
/// # }
/// # tokio::runtime::Runtime::new().unwrap().block_on(example()).unwrap();
/// ```
#[derive(Clone)]
pub struct RoutingDataSource {
	registry: Arc<DataSourceRegistry>,
	listeners: Arc<Vec<Arc<dyn TransactionListener>>>,
}

impl RoutingDataSource {
	pub fn new(registry: DataSourceRegistry) -> Self {
		Self::from_shared(Arc::new(registry))
	}

	pub fn from_shared(registry: Arc<DataSourceRegistry>) -> Self {
		Self {
			registry,
			listeners: Arc::new(Vec::new()),
		}
	}

	/// Add a listener for transaction lifecycle events
	pub fn with_listener(mut self, listener: Arc<dyn TransactionListener>) -> Self {
		Arc::make_mut(&mut self.listeners).push(listener);
		self
	}

	pub fn registry(&self) -> &DataSourceRegistry {
		&self.registry
	}

	/// Start a fresh unit of work with an empty route-key stack
	pub fn unit_of_work(&self) -> UnitOfWork {
		UnitOfWork::new(self.clone())
	}

	/// The key and pool the next acquisition from `routes` would use
	pub fn resolve(&self, routes: &RouteKeyContext) -> RoutingResult<(RouteKey, Arc<dyn DataSource>)> {
		let key = match routes.current() {
			Some(key) => key.clone(),
			None => self.registry.default_key().clone(),
		};
		let source = self.registry.resolve(&key)?;
		tracing::debug!(route_key = %key, explicit = routes.current().is_some(), "Data source resolved");
		Ok((key, source))
	}

	/// Lease a connection from the pool selected by `routes`
	///
	/// Unknown keys and pool errors, including exhaustion, are returned
	/// unchanged and never retried.
	pub async fn acquire(&self, routes: &RouteKeyContext) -> RoutingResult<Box<dyn Connection>> {
		let (_, source) = self.resolve(routes)?;
		Ok(source.acquire().await?)
	}

	/// Close every pool. Intended for shutdown.
	pub async fn close(&self) {
		self.registry.close().await;
	}

	pub(crate) fn emit(&self, event: TransactionEvent) {
		tracing::trace!(kind = event.kind(), transaction_id = %event.transaction_id(), "Transaction event");
		for listener in self.listeners.iter() {
			listener.on_event(&event);
		}
	}
}

impl fmt::Debug for RoutingDataSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RoutingDataSource")
			.field("registry", &self.registry)
			.field("listeners", &self.listeners.len())
			.finish()
	}
}
