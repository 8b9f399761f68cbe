//! # Transaction boundaries
//!
//! Declarative transaction demarcation over a [`UnitOfWork`]:
//!
//! - [`TransactionBoundary`]: wraps an operation with a [`Propagation`] mode,
//!   an optional route key and an optional isolation level
//! - [`atomic()`]: the `REQUIRED` shorthand
//! - [`TransactionListener`]: lifecycle events for begin, commit, rollback,
//!   savepoints, suspension and resumption
//!
//! Operations are closures returning a boxed future borrowing the unit of
//! work, the same shape as `sqlx`'s transaction closures. Data the operation
//! needs must be moved into it.
//!
//! ## Example
//!
//! ```
//! use routedb_core::transaction::atomic;
//! use routedb_core::{DataSourceRegistry, RoutingDataSource, RoutingError};
//! use routedb_pool::{AnyDataSource, PoolConfig};
//!
//! # async fn example() -> Result<(), RoutingError> {
//! # let registry = DataSourceRegistry::builder()
//! #     .register("master", AnyDataSource::connect("sqlite::memory:", PoolConfig::default()).await?)
//! #     .default_key("master")
//! #     .build()?;
//! let router = RoutingDataSource::new(registry);
//! let mut uow = router.unit_of_work();
//!
//! let rows = atomic(&mut uow, |uow| {
//!     Box::pin(async move {
//!         let mut conn = uow.connection().await?;
//!         let rows = conn.execute("CREATE TABLE t (id INTEGER)", vec![]).await?;
//!         Ok::<_, RoutingError>(rows)
//!     })
//! })
//! .await?;
//!
//! assert_eq!(rows, 0);
//! # Ok(())
//! # }
//! # tokio::runtime::Runtime::new().unwrap().block_on(example()).unwrap();
//! ```

pub(crate) mod active;
pub mod boundary;
pub mod events;
pub mod propagation;

pub use active::TransactionStatus;
pub use boundary::{BoundaryState, TransactionBoundary};
pub use events::{EventLog, TransactionEvent, TransactionListener};
pub use propagation::{ParsePropagationError, Propagation};

use crate::error::RoutingError;
use crate::unit_of_work::UnitOfWork;
use futures::future::BoxFuture;

/// Run `op` in the active transaction, or in a new one on the current route
/// key
pub async fn atomic<F, T, E>(uow: &mut UnitOfWork, op: F) -> Result<T, E>
where
	F: for<'c> FnOnce(&'c mut UnitOfWork) -> BoxFuture<'c, Result<T, E>>,
	E: From<RoutingError>,
{
	TransactionBoundary::required().run(uow, op).await
}
