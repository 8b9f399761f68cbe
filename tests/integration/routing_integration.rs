//! Connection routing by route key against real SQLite databases

mod common;

use common::{TestDatabases, User, UserMapper, databases};
use routedb::prelude::*;
use rstest::*;
use std::io::Write;
use tempfile::NamedTempFile;

/// With no route key the default data source serves the connection; a pushed
/// key overrides it until popped
#[rstest]
#[tokio::test]
async fn test_route_key_selects_database(#[future] databases: TestDatabases) {
	let dbs = databases.await;
	let mut uow = dbs.router.unit_of_work();

	UserMapper::save(&mut uow, &User::new("on_master", 30)).await.unwrap();

	uow.route_keys_mut().push("slave2");
	UserMapper::save(&mut uow, &User::new("on_slave2", 31)).await.unwrap();

	uow.route_keys_mut().pop().unwrap();
	UserMapper::save(&mut uow, &User::new("master_again", 32)).await.unwrap();

	assert_eq!(dbs.usernames("master").await, vec!["on_master", "master_again"]);
	assert!(dbs.usernames("slave1").await.is_empty());
	assert_eq!(dbs.usernames("slave2").await, vec!["on_slave2"]);
	assert!(uow.route_keys().is_empty());
}

/// Full CRUD cycle through the mapper on one replica
#[rstest]
#[tokio::test]
async fn test_mapper_crud_on_selected_key(#[future] databases: TestDatabases) {
	let dbs = databases.await;
	let mut uow = dbs.router.unit_of_work();

	let user = uow
		.with_route_key("slave1", |uow| {
			Box::pin(async move {
				UserMapper::save(uow, &User::new("alice", 20)).await?;
				let mut user = UserMapper::select_all(uow).await?.remove(0);

				user.age = Some(21);
				user.password = Some("secret".to_string());
				assert_eq!(UserMapper::update(uow, &user).await?, 1);

				let id = user.id.expect("saved user has an id");
				let reloaded = UserMapper::select_by_id(uow, id).await?;
				Ok::<_, RoutingError>(reloaded)
			})
		})
		.await
		.unwrap()
		.expect("user should exist");

	assert_eq!(user.username, "alice");
	assert_eq!(user.age, Some(21));
	assert_eq!(user.password.as_deref(), Some("secret"));

	let deleted = uow
		.with_route_key("slave1", move |uow| {
			Box::pin(async move { UserMapper::delete_by_id(uow, user.id.unwrap_or_default()).await })
		})
		.await
		.unwrap();
	assert_eq!(deleted, 1);
	assert!(dbs.usernames("slave1").await.is_empty());
	assert!(dbs.usernames("master").await.is_empty());
}

/// Missing rows come back as `None`, not as an error
#[rstest]
#[tokio::test]
async fn test_select_missing_user(#[future] databases: TestDatabases) {
	let dbs = databases.await;
	let mut uow = dbs.router.unit_of_work();

	let user = UserMapper::select_by_id(&mut uow, 42).await.unwrap();

	assert!(user.is_none());
}

/// An unregistered key fails the acquisition and is not retried elsewhere
#[rstest]
#[tokio::test]
async fn test_unknown_route_key(#[future] databases: TestDatabases) {
	let dbs = databases.await;
	let mut uow = dbs.router.unit_of_work();
	uow.route_keys_mut().push("slave3");

	let result = UserMapper::save(&mut uow, &User::new("lost", 1)).await;

	assert!(matches!(result, Err(RoutingError::UnknownRouteKey(key)) if key.as_str() == "slave3"));
	for key in common::KEYS {
		assert!(dbs.usernames(key).await.is_empty());
	}
}

/// Settings loaded from a TOML file, with an environment-style override
/// switching the default key
#[rstest]
#[tokio::test]
async fn test_registry_from_toml_file(#[future] databases: TestDatabases) {
	let dbs = databases.await;
	let master_url = &dbs.settings.datasources["master"].url;
	let slave_url = &dbs.settings.datasources["slave1"].url;

	let mut file = NamedTempFile::new().unwrap();
	write!(
		file,
		r#"
default = "master"

[datasources.master]
url = "{master_url}"
max_connections = 2

[datasources.slave1]
url = "{slave_url}"
"#
	)
	.unwrap();

	let mut settings = RoutingSettings::from_path(file.path()).unwrap();
	settings.apply_overrides("ROUTEDB_", [("ROUTEDB_DEFAULT".to_string(), "slave1".to_string())]);
	let router = RoutingDataSource::new(DataSourceRegistry::from_settings(&settings).await.unwrap());
	assert_eq!(router.registry().default_key().as_str(), "slave1");

	let mut uow = router.unit_of_work();
	UserMapper::save(&mut uow, &User::new("via_default", 5)).await.unwrap();
	router.close().await;

	assert_eq!(dbs.usernames("slave1").await, vec!["via_default"]);
	assert!(dbs.usernames("master").await.is_empty());
}

/// A settings table whose default names no data source never starts
#[rstest]
#[tokio::test]
async fn test_dangling_default_is_startup_error() {
	let settings = RoutingSettings::new()
		.with_default("primary")
		.with_datasource("master", DataSourceSettings::sqlite(":memory:"));

	let result = DataSourceRegistry::from_settings(&settings).await;

	assert!(matches!(result, Err(RoutingError::Settings(_))));
}
