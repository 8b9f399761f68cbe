//! Routing errors

use crate::route::RouteKey;
use crate::transaction::Propagation;
use routedb_conf::SettingsError;
use routedb_pool::PoolError;
use uuid::Uuid;

/// Errors raised while routing connections and running transaction
/// boundaries
///
/// Nothing here is retried. Pool errors pass through unchanged, so pool
/// exhaustion stays distinguishable from routing failures:
///
/// ```
/// use routedb_core::RoutingError;
/// use routedb_pool::PoolError;
///
/// let err = RoutingError::from(PoolError::from(sqlx::Error::PoolTimedOut));
/// assert!(err.is_pool_exhausted());
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
	#[error("Unknown route key: {0}")]
	UnknownRouteKey(RouteKey),

	#[error("No default data source configured")]
	NoDefaultConfigured,

	#[error("Propagation {propagation} requires an active transaction")]
	TransactionRequired { propagation: Propagation },

	#[error("Propagation {propagation} cannot run inside an active transaction")]
	UnexpectedTransaction { propagation: Propagation },

	#[error(transparent)]
	Pool(#[from] PoolError),

	#[error("Route key stack underflow: pop on an empty stack")]
	RouteStackUnderflow,

	#[error("Transaction {transaction_id} was marked rollback-only and has been rolled back")]
	UnexpectedRollback { transaction_id: Uuid },

	#[error("Data source '{key}' does not support savepoints")]
	SavepointsUnsupported { key: RouteKey },

	#[error("Invalid routing settings: {0}")]
	Settings(#[from] SettingsError),

	#[error("No active transaction to complete")]
	NoActiveTransaction,
}

impl RoutingError {
	/// Whether the underlying pool timed out waiting for a free connection
	pub fn is_pool_exhausted(&self) -> bool {
		matches!(self, RoutingError::Pool(err) if err.is_exhausted())
	}
}

pub type RoutingResult<T> = Result<T, RoutingError>;
