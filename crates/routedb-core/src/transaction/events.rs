//! Transaction lifecycle events
//!
//! Listeners registered on a [`RoutingDataSource`](crate::RoutingDataSource)
//! are told when transactions begin, commit, roll back, open or close
//! savepoints, and when a transaction is parked and resumed around a
//! `REQUIRES_NEW` or `NOT_SUPPORTED` boundary.
//!
//! # Examples
//!
//! ```
//! use routedb_core::transaction::{EventLog, TransactionEvent, TransactionListener};
//! use routedb_core::RouteKey;
//! use uuid::Uuid;
//!
//! let log = EventLog::new();
//! log.on_event(&TransactionEvent::Begin {
//!     transaction_id: Uuid::new_v4(),
//!     route_key: RouteKey::from("master"),
//! });
//!
//! assert_eq!(log.kinds(), vec!["begin"]);
//! ```

use crate::route::RouteKey;
use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionEvent {
	Begin {
		transaction_id: Uuid,
		route_key: RouteKey,
	},
	Commit {
		transaction_id: Uuid,
		route_key: RouteKey,
	},
	Rollback {
		transaction_id: Uuid,
		route_key: RouteKey,
	},
	SavepointCreated {
		transaction_id: Uuid,
		route_key: RouteKey,
		savepoint: String,
	},
	SavepointReleased {
		transaction_id: Uuid,
		route_key: RouteKey,
		savepoint: String,
	},
	SavepointRolledBack {
		transaction_id: Uuid,
		route_key: RouteKey,
		savepoint: String,
	},
	/// The transaction was parked so an inner boundary could run outside it
	Suspended {
		transaction_id: Uuid,
		route_key: RouteKey,
	},
	Resumed {
		transaction_id: Uuid,
		route_key: RouteKey,
	},
}

impl TransactionEvent {
	pub fn transaction_id(&self) -> Uuid {
		match self {
			TransactionEvent::Begin { transaction_id, .. }
			| TransactionEvent::Commit { transaction_id, .. }
			| TransactionEvent::Rollback { transaction_id, .. }
			| TransactionEvent::SavepointCreated { transaction_id, .. }
			| TransactionEvent::SavepointReleased { transaction_id, .. }
			| TransactionEvent::SavepointRolledBack { transaction_id, .. }
			| TransactionEvent::Suspended { transaction_id, .. }
			| TransactionEvent::Resumed { transaction_id, .. } => *transaction_id,
		}
	}

	pub fn route_key(&self) -> &RouteKey {
		match self {
			TransactionEvent::Begin { route_key, .. }
			| TransactionEvent::Commit { route_key, .. }
			| TransactionEvent::Rollback { route_key, .. }
			| TransactionEvent::SavepointCreated { route_key, .. }
			| TransactionEvent::SavepointReleased { route_key, .. }
			| TransactionEvent::SavepointRolledBack { route_key, .. }
			| TransactionEvent::Suspended { route_key, .. }
			| TransactionEvent::Resumed { route_key, .. } => route_key,
		}
	}

	/// Short name of the event, e.g. `"savepoint_released"`
	pub fn kind(&self) -> &'static str {
		match self {
			TransactionEvent::Begin { .. } => "begin",
			TransactionEvent::Commit { .. } => "commit",
			TransactionEvent::Rollback { .. } => "rollback",
			TransactionEvent::SavepointCreated { .. } => "savepoint_created",
			TransactionEvent::SavepointReleased { .. } => "savepoint_released",
			TransactionEvent::SavepointRolledBack { .. } => "savepoint_rolled_back",
			TransactionEvent::Suspended { .. } => "suspended",
			TransactionEvent::Resumed { .. } => "resumed",
		}
	}
}

/// Receiver of [`TransactionEvent`]s
///
/// Called synchronously from the boundary that produced the event, so
/// implementations should return quickly.
pub trait TransactionListener: Send + Sync {
	fn on_event(&self, event: &TransactionEvent);
}

/// Listener that keeps every event in memory
#[derive(Debug, Default)]
pub struct EventLog {
	events: Mutex<Vec<TransactionEvent>>,
}

impl EventLog {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn events(&self) -> Vec<TransactionEvent> {
		self.events.lock().clone()
	}

	pub fn kinds(&self) -> Vec<&'static str> {
		self.events.lock().iter().map(TransactionEvent::kind).collect()
	}

	pub fn clear(&self) {
		self.events.lock().clear();
	}
}

impl TransactionListener for EventLog {
	fn on_event(&self, event: &TransactionEvent) {
		self.events.lock().push(event.clone());
	}
}
