//! # routedb core
//!
//! Transaction-aware routing of database connections.
//!
//! - [`RouteKey`] / [`RouteKeyContext`]: which logical data source a scope
//!   wants
//! - [`DataSourceRegistry`]: the startup-time map from key to pool
//! - [`RoutingDataSource`]: hands out connections from the pool selected by
//!   the caller's context
//! - [`UnitOfWork`]: the per-task context carrying route keys and the active
//!   transaction
//! - [`TransactionBoundary`]: propagation-aware transaction demarcation
//!
//! Once a transaction starts, every statement in it runs on the connection
//! it began on, even if nested scopes ask for another data source.

pub mod error;
pub mod registry;
pub mod route;
pub mod router;
pub mod transaction;
pub mod unit_of_work;


pub use error::{RoutingError, RoutingResult};
pub use registry::{DataSourceRegistry, DataSourceRegistryBuilder};
pub use route::{RouteKey, RouteKeyContext};
pub use router::RoutingDataSource;
pub use transaction::{
	BoundaryState, EventLog, Propagation, TransactionBoundary, TransactionEvent,
	TransactionListener, TransactionStatus, atomic,
};
pub use unit_of_work::{ConnectionHandle, UnitOfWork};
