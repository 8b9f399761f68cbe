//! Data source and connection seams
//!
//! A [`DataSource`] is a long-lived connection pool registered under one
//! route key. A [`Connection`] is a connection leased from it; dropping the
//! connection returns it to its pool.

use super::error::PoolResult;
use super::types::{DatabaseType, QueryValue, Row};
use async_trait::async_trait;

/// A physical connection pool
#[async_trait]
pub trait DataSource: Send + Sync {
	/// Dialect spoken by connections from this pool
	fn database_type(&self) -> DatabaseType;

	/// Whether connections from this pool can open savepoints
	fn supports_savepoints(&self) -> bool {
		self.database_type().supports_savepoints()
	}

	/// Lease a connection. Pool exhaustion surfaces as
	/// [`PoolError::Exhausted`](super::PoolError::Exhausted).
	async fn acquire(&self) -> PoolResult<Box<dyn Connection>>;

	/// Close the pool, waiting for leased connections to be returned
	async fn close(&self);
}

/// A connection leased from a [`DataSource`]
#[async_trait]
pub trait Connection: Send {
	fn database_type(&self) -> DatabaseType;

	/// Execute a statement and return the number of affected rows
	async fn execute(&mut self, sql: &str, params: Vec<QueryValue>) -> PoolResult<u64>;

	/// Fetch at most one row
	async fn fetch_optional(&mut self, sql: &str, params: Vec<QueryValue>)
	-> PoolResult<Option<Row>>;

	/// Fetch all rows in result order
	async fn fetch_all(&mut self, sql: &str, params: Vec<QueryValue>) -> PoolResult<Vec<Row>>;

	/// Execute unprepared SQL, used for transaction control statements
	async fn execute_raw(&mut self, sql: &str) -> PoolResult<()>;

	/// Discard this connection when dropped instead of returning it to the
	/// pool. Used when a transaction could not be completed on it.
	fn close_on_drop(&mut self);
}
