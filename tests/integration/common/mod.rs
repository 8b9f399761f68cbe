//! Shared fixtures for the end-to-end tests
//!
//! Every test gets three SQLite files (`master`, `slave1`, `slave2`) in a
//! fresh temporary directory, each with an empty `users` table, and a
//! router defaulting to `master`.

#![allow(dead_code)]

use routedb::prelude::*;
use rstest::*;
use std::sync::Arc;
use tempfile::TempDir;

pub const KEYS: [&str; 3] = ["master", "slave1", "slave2"];

const CREATE_USERS: &str = "CREATE TABLE IF NOT EXISTS users (
	id INTEGER PRIMARY KEY AUTOINCREMENT,
	username TEXT NOT NULL,
	password TEXT,
	age INTEGER
)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
	pub id: Option<i64>,
	pub username: String,
	pub password: Option<String>,
	pub age: Option<i64>,
}

impl User {
	pub fn new(username: &str, age: i64) -> Self {
		Self {
			id: None,
			username: username.to_string(),
			password: None,
			age: Some(age),
		}
	}

	fn from_row(row: &Row) -> Result<Self, PoolError> {
		Ok(Self {
			id: row.get_optional("id")?,
			username: row.get("username")?,
			password: row.get_optional("password")?,
			age: row.get_optional("age")?,
		})
	}
}

/// CRUD over `users`; unaware of which database it talks to
pub struct UserMapper;

impl UserMapper {
	pub async fn save(uow: &mut UnitOfWork, user: &User) -> RoutingResult<u64> {
		let mut conn = uow.connection().await?;
		let rows = conn
			.execute(
				"INSERT INTO users (username, password, age) VALUES (?, ?, ?)",
				vec![
					user.username.as_str().into(),
					user.password.clone().into(),
					user.age.into(),
				],
			)
			.await?;
		Ok(rows)
	}

	pub async fn update(uow: &mut UnitOfWork, user: &User) -> RoutingResult<u64> {
		let mut conn = uow.connection().await?;
		let rows = conn
			.execute(
				"UPDATE users SET username = ?, password = ?, age = ? WHERE id = ?",
				vec![
					user.username.as_str().into(),
					user.password.clone().into(),
					user.age.into(),
					user.id.into(),
				],
			)
			.await?;
		Ok(rows)
	}

	pub async fn delete_by_id(uow: &mut UnitOfWork, id: i64) -> RoutingResult<u64> {
		let mut conn = uow.connection().await?;
		let rows = conn
			.execute("DELETE FROM users WHERE id = ?", vec![id.into()])
			.await?;
		Ok(rows)
	}

	pub async fn select_by_id(uow: &mut UnitOfWork, id: i64) -> RoutingResult<Option<User>> {
		let mut conn = uow.connection().await?;
		let row = conn
			.fetch_optional(
				"SELECT id, username, password, age FROM users WHERE id = ?",
				vec![id.into()],
			)
			.await?;
		Ok(row.as_ref().map(User::from_row).transpose()?)
	}

	pub async fn select_all(uow: &mut UnitOfWork) -> RoutingResult<Vec<User>> {
		let mut conn = uow.connection().await?;
		let rows = conn
			.fetch_all("SELECT id, username, password, age FROM users ORDER BY id", vec![])
			.await?;
		Ok(rows.iter().map(User::from_row).collect::<Result<_, _>>()?)
	}
}

/// Errors raised by the sample services
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error(transparent)]
	Routing(#[from] RoutingError),

	#[error("Business rule violated: {0}")]
	Rule(String),
}

pub struct TestDatabases {
	pub router: RoutingDataSource,
	pub settings: RoutingSettings,
	pub events: Arc<EventLog>,
	_dir: TempDir,
}

impl TestDatabases {
	/// Usernames stored in the database behind `key`, read outside any
	/// transaction
	pub async fn usernames(&self, key: &str) -> Vec<String> {
		let mut uow = self.router.unit_of_work();
		uow.with_route_key(key, |uow| Box::pin(async move { UserMapper::select_all(uow).await }))
			.await
			.expect("Failed to read users")
			.into_iter()
			.map(|user| user.username)
			.collect()
	}
}

pub fn routing_settings(dir: &TempDir, configure: impl Fn(DataSourceSettings) -> DataSourceSettings) -> RoutingSettings {
	KEYS.iter().fold(RoutingSettings::new().with_default("master"), |settings, key| {
		let path = dir.path().join(format!("{}.db", key));
		let datasource = DataSourceSettings::sqlite(path.to_string_lossy())
			.with_max_connections(4)
			.with_acquire_timeout_secs(5);
		settings.with_datasource(*key, configure(datasource))
	})
}

pub async fn setup_databases(configure: impl Fn(DataSourceSettings) -> DataSourceSettings) -> TestDatabases {
	let dir = TempDir::new().expect("Failed to create temp dir");
	let settings = routing_settings(&dir, configure);

	let registry = DataSourceRegistry::from_settings(&settings)
		.await
		.expect("Failed to connect data sources");
	for key in KEYS {
		let source = registry.resolve(&RouteKey::from(key)).unwrap();
		let mut conn = source.acquire().await.unwrap();
		conn.execute(CREATE_USERS, vec![]).await.expect("Failed to create users table");
	}

	let events = Arc::new(EventLog::new());
	let router = RoutingDataSource::new(registry).with_listener(events.clone());

	TestDatabases {
		router,
		settings,
		events,
		_dir: dir,
	}
}

#[fixture]
pub async fn databases() -> TestDatabases {
	setup_databases(|datasource| datasource).await
}
