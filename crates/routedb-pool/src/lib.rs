//! # routedb pool
//!
//! The physical side of routing: connection pools and the connections leased
//! from them.
//!
//! - [`DataSource`] / [`Connection`]: the seam the router and the transaction
//!   boundary talk to
//! - [`AnyDataSource`]: a SQLx `AnyPool` implementation for PostgreSQL, MySQL
//!   and SQLite
//! - [`DatabaseType`], [`IsolationLevel`], [`Savepoint`]: dialect-aware
//!   transaction control SQL
//!
//! Pool exhaustion is reported as [`PoolError::Exhausted`] and is never
//! retried here.

pub mod config;
pub mod engine;
pub mod error;
pub mod source;
pub mod types;

pub use config::PoolConfig;
pub use engine::{AnyDataSource, PooledConnection};
pub use error::{PoolError, PoolResult};
pub use source::{Connection, DataSource};
pub use types::{DatabaseType, IsolationLevel, QueryValue, Row, Savepoint};
