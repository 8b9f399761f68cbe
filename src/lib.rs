//! # routedb
//!
//! Transaction-aware dynamic data-source routing for master/replica and
//! sharded databases.
//!
//! Each database call is routed to the physical pool selected by the
//! caller's route key, falling back to a configured default. Transaction
//! boundaries with declarative propagation modes keep every statement of a
//! transaction on the connection it started on, park and resume outer
//! transactions around `REQUIRES_NEW` and `NOT_SUPPORTED`, and open
//! savepoints for `NESTED`.
//!
//! ## Crates
//!
//! - [`conf`]: routing settings loaded from TOML
//! - [`pool`]: the connection-pool seam and its sqlx implementation
//! - [`core`]: route keys, the registry, the router, units of work and
//!   transaction boundaries
//!
//! ## Quick Start
//!
//! ```
//! use routedb::prelude::*;
//!
//! # async fn example() -> Result<(), RoutingError> {
//! let settings = RoutingSettings::from_toml_str(
//!     r#"
//!     default = "master"
//!
//!     [datasources.master]
//!     url = "sqlite::memory:"
//!
//!     [datasources.slave1]
//!     url = "sqlite::memory:"
//!     "#,
//! )?;
//!
//! let router = RoutingDataSource::new(DataSourceRegistry::from_settings(&settings).await?);
//! let mut uow = router.unit_of_work();
//!
//! let key = TransactionBoundary::new(Propagation::Required)
//!     .with_route_key("slave1")
//!     .run(&mut uow, |uow| {
//!         Box::pin(async move {
//!             uow.connection().await?.execute("CREATE TABLE t (id INTEGER)", vec![]).await?;
//!             Ok::<_, RoutingError>(uow.transaction_status().map(|status| status.route_key))
//!         })
//!     })
//!     .await?;
//!
//! assert_eq!(key.unwrap().as_str(), "slave1");
//! router.close().await;
//! # Ok(())
//! # }
//! # tokio::runtime::Runtime::new().unwrap().block_on(example()).unwrap();
//! ```

pub use routedb_conf as conf;
pub use routedb_core as core;
pub use routedb_pool as pool;

pub use routedb_conf::{DataSourceSettings, RoutingSettings, SettingsError};
pub use routedb_core::{
	ConnectionHandle, DataSourceRegistry, Propagation, RouteKey, RouteKeyContext, RoutingDataSource,
	RoutingError, RoutingResult, TransactionBoundary, UnitOfWork, atomic,
};
pub use routedb_pool::{
	AnyDataSource, Connection, DataSource, DatabaseType, IsolationLevel, PoolConfig, PoolError,
	QueryValue, Row,
};

/// Everything a service or mapper usually needs
pub mod prelude {
	pub use routedb_conf::{DataSourceSettings, RoutingSettings};
	pub use routedb_core::transaction::{EventLog, TransactionEvent, TransactionListener};
	pub use routedb_core::{
		ConnectionHandle, DataSourceRegistry, Propagation, RouteKey, RoutingDataSource,
		RoutingError, RoutingResult, TransactionBoundary, UnitOfWork, atomic,
	};
	pub use routedb_pool::{
		AnyDataSource, Connection, DataSource, IsolationLevel, PoolConfig, PoolError, QueryValue,
		Row,
	};
}
