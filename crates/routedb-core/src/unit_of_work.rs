//! Per-task routing and transaction state

use crate::error::{RoutingError, RoutingResult};
use crate::route::{RouteKey, RouteKeyContext};
use crate::router::RoutingDataSource;
use crate::transaction::TransactionStatus;
use crate::transaction::active::ActiveTransaction;
use futures::future::BoxFuture;
use routedb_pool::Connection;
use std::ops::{Deref, DerefMut};

/// The routing state of one logical task
///
/// Holds the route-key stack, the transaction currently active (with its
/// bound connection) and a handle to the shared router. A unit of work is
/// never shared between tasks; boundaries and mappers receive it as
/// `&mut UnitOfWork`.
pub struct UnitOfWork {
	router: RoutingDataSource,
	routes: RouteKeyContext,
	current: Option<ActiveTransaction>,
}

impl UnitOfWork {
	pub(crate) fn new(router: RoutingDataSource) -> Self {
		Self {
			router,
			routes: RouteKeyContext::new(),
			current: None,
		}
	}

	pub fn router(&self) -> &RoutingDataSource {
		&self.router
	}

	pub fn route_keys(&self) -> &RouteKeyContext {
		&self.routes
	}

	pub fn route_keys_mut(&mut self) -> &mut RouteKeyContext {
		&mut self.routes
	}

	pub fn in_transaction(&self) -> bool {
		self.current.is_some()
	}

	pub fn transaction_status(&self) -> Option<TransactionStatus> {
		self.current.as_ref().map(ActiveTransaction::status)
	}

	/// Force the active transaction to roll back when its owner completes
	pub fn set_rollback_only(&mut self) -> RoutingResult<()> {
		let tx = self.current.as_mut().ok_or(RoutingError::NoActiveTransaction)?;
		tx.set_rollback_only();
		Ok(())
	}

	/// A connection for the next statement
	///
	/// Inside a transaction this is always the transaction's own connection,
	/// whatever key has been pushed since it began. Outside one, a connection
	/// is leased through the router and returned to its pool when the handle
	/// drops.
	pub async fn connection(&mut self) -> RoutingResult<ConnectionHandle<'_>> {
		if let Some(tx) = self.current.as_mut() {
			if let Some(key) = self.routes.current()
				&& key != tx.route_key()
			{
				tracing::debug!(
					requested = %key,
					bound = %tx.route_key(),
					"Route key ignored inside transaction"
				);
			}
			return Ok(ConnectionHandle::Transactional(tx.connection()));
		}

		let connection = self.router.acquire(&self.routes).await?;
		Ok(ConnectionHandle::Leased(connection))
	}

	/// Run `op` with `key` selected, popping it again however `op` ends
	///
	/// ```
	/// use routedb_core::{DataSourceRegistry, RoutingDataSource, RoutingError};
	/// use routedb_pool::{AnyDataSource, PoolConfig};
	///
	/// # async fn example() -> Result<(), RoutingError> {
	/// # let registry = DataSourceRegistry::builder()
	/// #     .register("master", AnyDataSource::connect("sqlite::memory:", PoolConfig::default()).await?)
	/// #     .register("slave1", AnyDataSource::connect("sqlite::memory:", PoolConfig::default()).await?)
	/// #     .default_key("master")
	/// #     .build()?;
	/// let router = RoutingDataSource::new(registry);
	/// let mut uow = router.unit_of_work();
	///
	/// let key = uow
	///     .with_route_key("slave1", |uow| {
	///         Box::pin(async move {
	///             Ok::<_, RoutingError>(uow.route_keys().current().cloned())
	///         })
	///     })
	///     .await?;
	///
	/// assert_eq!(key.unwrap().as_str(), "slave1");
	/// assert!(uow.route_keys().is_empty());
	/// # Ok(())
	/// # }
	/// # tokio::runtime::Runtime::new().unwrap().block_on(example()).unwrap();
	/// ```
	pub async fn with_route_key<F, T, E>(&mut self, key: impl Into<RouteKey>, op: F) -> Result<T, E>
	where
		F: for<'c> FnOnce(&'c mut UnitOfWork) -> BoxFuture<'c, Result<T, E>>,
		E: From<RoutingError>,
	{
		let key = key.into();
		self.router.registry().resolve(&key)?;

		let base = self.routes.depth();
		self.routes.push(key);
		let result = op(&mut *self).await;
		self.unwind_routes(base, true);
		result
	}

	pub(crate) fn router_handle(&self) -> RoutingDataSource {
		self.router.clone()
	}

	pub(crate) fn routes_mut(&mut self) -> &mut RouteKeyContext {
		&mut self.routes
	}

	pub(crate) fn current(&self) -> Option<&ActiveTransaction> {
		self.current.as_ref()
	}

	pub(crate) fn current_mut(&mut self) -> Option<&mut ActiveTransaction> {
		self.current.as_mut()
	}

	pub(crate) fn take_transaction(&mut self) -> Option<ActiveTransaction> {
		self.current.take()
	}

	pub(crate) fn install_transaction(&mut self, tx: ActiveTransaction) {
		if let Some(previous) = self.current.replace(tx) {
			tracing::warn!(
				transaction_id = %previous.id(),
				"Active transaction replaced without being suspended"
			);
		}
	}

	/// Restore the stack to `base`, plus the scope's own key when `owned`,
	/// then pop that key. Keys pushed and never popped by inner code are
	/// dropped with a warning.
	pub(crate) fn unwind_routes(&mut self, base: usize, owned: bool) {
		let expected = base + usize::from(owned);
		let depth = self.routes.depth();

		if depth < expected {
			tracing::warn!(depth, expected, "Route key stack popped below its scope");
			self.routes.truncate(base);
			return;
		}

		let leaked = self.routes.truncate(expected);
		if !leaked.is_empty() {
			tracing::warn!(
				leaked = ?leaked.iter().map(RouteKey::as_str).collect::<Vec<_>>(),
				"Route keys left on the stack by an inner scope"
			);
		}
		if owned && let Err(error) = self.routes.pop() {
			tracing::warn!(%error, "Route key scope lost its own key");
		}
	}
}

/// A connection borrowed from the active transaction or leased for a single
/// use
pub enum ConnectionHandle<'a> {
	Transactional(&'a mut Box<dyn Connection>),
	Leased(Box<dyn Connection>),
}

impl ConnectionHandle<'_> {
	pub fn is_transactional(&self) -> bool {
		matches!(self, ConnectionHandle::Transactional(_))
	}
}

impl Deref for ConnectionHandle<'_> {
	type Target = dyn Connection;

	fn deref(&self) -> &Self::Target {
		match self {
			ConnectionHandle::Transactional(conn) => conn.as_ref(),
			ConnectionHandle::Leased(conn) => conn.as_ref(),
		}
	}
}

impl DerefMut for ConnectionHandle<'_> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		match self {
			ConnectionHandle::Transactional(conn) => conn.as_mut(),
			ConnectionHandle::Leased(conn) => conn.as_mut(),
		}
	}
}
