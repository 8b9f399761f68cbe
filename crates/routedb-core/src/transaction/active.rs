//! The underlying transaction owned by a boundary

use crate::route::RouteKey;
use routedb_pool::{Connection, DataSource, DatabaseType, IsolationLevel, PoolResult, Savepoint};
use uuid::Uuid;

/// Snapshot of the transaction active in a unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionStatus {
	pub transaction_id: Uuid,
	pub route_key: RouteKey,
	pub savepoint_depth: usize,
	pub rollback_only: bool,
}

struct SavepointEntry {
	savepoint: Savepoint,
	rollback_only: bool,
}

/// A transaction begun on a connection leased from the pool of `route_key`
///
/// It holds its connection until completed. Dropping it unfinished (a
/// cancelled boundary) discards the connection instead of handing it back to
/// the pool mid-transaction.
pub(crate) struct ActiveTransaction {
	id: Uuid,
	route_key: RouteKey,
	connection: Box<dyn Connection>,
	database_type: DatabaseType,
	savepoints: Vec<SavepointEntry>,
	/// Index of this transaction's own entry in the route-key stack
	stack_index: Option<usize>,
	rollback_only: bool,
	finished: bool,
}

impl ActiveTransaction {
	pub(crate) async fn begin(
		route_key: RouteKey,
		source: &dyn DataSource,
		isolation: Option<IsolationLevel>,
	) -> PoolResult<Self> {
		let mut connection = source.acquire().await?;
		let database_type = connection.database_type();
		connection
			.execute_raw(&database_type.begin_sql(isolation))
			.await?;

		let id = Uuid::new_v4();
		tracing::debug!(transaction_id = %id, route_key = %route_key, ?isolation, "Transaction started");

		Ok(Self {
			id,
			route_key,
			connection,
			database_type,
			savepoints: Vec::new(),
			stack_index: None,
			rollback_only: false,
			finished: false,
		})
	}

	pub(crate) fn id(&self) -> Uuid {
		self.id
	}

	pub(crate) fn route_key(&self) -> &RouteKey {
		&self.route_key
	}

	pub(crate) fn stack_index(&self) -> Option<usize> {
		self.stack_index
	}

	pub(crate) fn bind_stack_index(&mut self, index: usize) {
		self.stack_index = Some(index);
	}

	pub(crate) fn connection(&mut self) -> &mut Box<dyn Connection> {
		&mut self.connection
	}

	pub(crate) fn is_rollback_only(&self) -> bool {
		self.rollback_only
	}

	pub(crate) fn set_rollback_only(&mut self) {
		if !self.rollback_only {
			tracing::debug!(transaction_id = %self.id, "Transaction marked rollback-only");
		}
		self.rollback_only = true;
	}

	pub(crate) fn status(&self) -> TransactionStatus {
		TransactionStatus {
			transaction_id: self.id,
			route_key: self.route_key.clone(),
			savepoint_depth: self.savepoints.len(),
			rollback_only: self.rollback_only,
		}
	}

	/// Commit, falling back to a best-effort rollback when the commit fails
	pub(crate) async fn commit(mut self) -> PoolResult<()> {
		let commit = self
			.connection
			.execute_raw(self.database_type.commit_sql())
			.await;

		if let Err(error) = commit {
			tracing::warn!(transaction_id = %self.id, %error, "Commit failed; rolling back");
			self.rollback_quietly().await;
			return Err(error);
		}

		tracing::debug!(transaction_id = %self.id, route_key = %self.route_key, "Transaction committed");
		self.finished = true;
		Ok(())
	}

	pub(crate) async fn rollback(mut self) -> PoolResult<()> {
		let rollback = self
			.connection
			.execute_raw(self.database_type.rollback_sql())
			.await;

		match rollback {
			Ok(()) => {
				tracing::debug!(transaction_id = %self.id, route_key = %self.route_key, "Transaction rolled back");
				self.finished = true;
				Ok(())
			}
			Err(error) => {
				self.discard();
				Err(error)
			}
		}
	}

	async fn rollback_quietly(&mut self) {
		let rollback = self
			.connection
			.execute_raw(self.database_type.rollback_sql())
			.await;

		match rollback {
			Ok(()) => self.finished = true,
			Err(error) => {
				tracing::warn!(transaction_id = %self.id, %error, "Rollback after failed commit also failed");
				self.discard();
			}
		}
	}

	// The connection state is unknown, so it must not go back to the pool
	fn discard(&mut self) {
		self.connection.close_on_drop();
		self.finished = true;
	}

	/// Open the next savepoint, named after its nesting depth
	pub(crate) async fn create_savepoint(&mut self) -> PoolResult<Savepoint> {
		let savepoint = Savepoint::for_depth(self.savepoints.len() + 1);
		self.connection
			.execute_raw(&savepoint.to_sql(self.database_type))
			.await?;

		tracing::trace!(transaction_id = %self.id, savepoint = savepoint.name(), "Savepoint created");
		self.savepoints.push(SavepointEntry {
			savepoint: savepoint.clone(),
			rollback_only: self.rollback_only,
		});
		Ok(savepoint)
	}

	/// Release the innermost savepoint, keeping its work
	pub(crate) async fn release_savepoint(&mut self) -> PoolResult<Option<Savepoint>> {
		let Some(entry) = self.savepoints.pop() else {
			return Ok(None);
		};
		self.connection
			.execute_raw(&entry.savepoint.release_sql(self.database_type))
			.await?;

		tracing::trace!(transaction_id = %self.id, savepoint = entry.savepoint.name(), "Savepoint released");
		Ok(Some(entry.savepoint))
	}

	/// Undo the work done since the innermost savepoint and release it
	///
	/// The rollback-only flag returns to what it was when the savepoint was
	/// opened.
	pub(crate) async fn rollback_to_savepoint(&mut self) -> PoolResult<Option<Savepoint>> {
		let Some(entry) = self.savepoints.pop() else {
			return Ok(None);
		};
		self.connection
			.execute_raw(&entry.savepoint.rollback_sql(self.database_type))
			.await?;
		self.connection
			.execute_raw(&entry.savepoint.release_sql(self.database_type))
			.await?;

		tracing::trace!(transaction_id = %self.id, savepoint = entry.savepoint.name(), "Rolled back to savepoint");
		self.rollback_only = entry.rollback_only;
		Ok(Some(entry.savepoint))
	}
}

impl Drop for ActiveTransaction {
	fn drop(&mut self) {
		if !self.finished {
			tracing::warn!(
				transaction_id = %self.id,
				route_key = %self.route_key,
				"Transaction dropped without commit or rollback; discarding its connection"
			);
			self.connection.close_on_drop();
		}
	}
}
