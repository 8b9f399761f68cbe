//! Transaction propagation against real SQLite databases

mod common;

use common::{ServiceError, TestDatabases, User, UserMapper, databases, setup_databases};
use routedb::prelude::*;
use rstest::*;

/// Saves a user and then fails, as a service whose business rule rejects
/// the write after it was issued
async fn save_then_fail(uow: &mut UnitOfWork, user: User) -> Result<(), ServiceError> {
	UserMapper::save(uow, &user).await?;
	Err(ServiceError::Rule(format!("{} is not allowed", user.username)))
}

#[rstest]
#[tokio::test]
async fn test_required_commits_on_success(#[future] databases: TestDatabases) {
	let dbs = databases.await;
	let mut uow = dbs.router.unit_of_work();

	atomic(&mut uow, |uow| {
		Box::pin(async move {
			UserMapper::save(uow, &User::new("alice", 30)).await?;
			UserMapper::save(uow, &User::new("bob", 40)).await?;
			Ok::<_, RoutingError>(())
		})
	})
	.await
	.unwrap();

	assert_eq!(dbs.usernames("master").await, vec!["alice", "bob"]);
	assert_eq!(dbs.events.kinds(), vec!["begin", "commit"]);
}

#[rstest]
#[tokio::test]
async fn test_required_rolls_back_on_failure(#[future] databases: TestDatabases) {
	let dbs = databases.await;
	let mut uow = dbs.router.unit_of_work();

	let result = TransactionBoundary::required()
		.with_route_key("slave1")
		.run(&mut uow, |uow| Box::pin(save_then_fail(uow, User::new("mallory", 1))))
		.await;

	assert!(matches!(result, Err(ServiceError::Rule(reason)) if reason == "mallory is not allowed"));
	assert!(dbs.usernames("slave1").await.is_empty());
	assert!(uow.route_keys().is_empty());
	assert_eq!(dbs.events.kinds(), vec!["begin", "rollback"]);
}

/// An inner `REQUIRED` asking for another key still writes through the outer
/// transaction's connection
#[rstest]
#[tokio::test]
async fn test_required_inside_required_stays_on_outer_key(#[future] databases: TestDatabases) {
	let dbs = databases.await;
	let mut uow = dbs.router.unit_of_work();

	TransactionBoundary::required()
		.with_route_key("slave2")
		.run(&mut uow, |uow| {
			Box::pin(async move {
				TransactionBoundary::required()
					.with_route_key("slave1")
					.run(uow, |uow| {
						Box::pin(async move { UserMapper::save(uow, &User::new("inner", 2)).await })
					})
					.await?;
				UserMapper::save(uow, &User::new("outer", 3)).await
			})
		})
		.await
		.unwrap();

	assert_eq!(dbs.usernames("slave2").await, vec!["inner", "outer"]);
	assert!(dbs.usernames("slave1").await.is_empty());
	assert_eq!(dbs.events.kinds(), vec!["begin", "commit"]);
}

/// A failing `REQUIRES_NEW` on `slave1` rolls back alone; the outer
/// transaction on `master` keeps its key and commits its later write
#[rstest]
#[tokio::test]
async fn test_requires_new_failure_is_isolated(#[future] databases: TestDatabases) {
	let dbs = databases.await;
	let mut uow = dbs.router.unit_of_work();

	atomic(&mut uow, |uow| {
		Box::pin(async move {
			UserMapper::save(uow, &User::new("before", 1)).await?;

			let inner = TransactionBoundary::requires_new()
				.with_route_key("slave1")
				.run(uow, |uow| {
					Box::pin(async move {
						assert_eq!(uow.route_keys().current().unwrap().as_str(), "slave1");
						save_then_fail(uow, User::new("rejected", 2)).await
					})
				})
				.await;
			assert!(matches!(inner, Err(ServiceError::Rule(_))));

			assert_eq!(uow.route_keys().current().unwrap().as_str(), "master");
			UserMapper::save(uow, &User::new("after", 3)).await?;
			Ok::<_, ServiceError>(())
		})
	})
	.await
	.unwrap();

	assert_eq!(dbs.usernames("master").await, vec!["before", "after"]);
	assert!(dbs.usernames("slave1").await.is_empty());
	assert_eq!(
		dbs.events.kinds(),
		vec!["begin", "suspended", "begin", "rollback", "resumed", "commit"]
	);
}

/// A committed `REQUIRES_NEW` survives the rollback of its caller
#[rstest]
#[tokio::test]
async fn test_requires_new_commit_survives_outer_rollback(#[future] databases: TestDatabases) {
	let dbs = databases.await;
	let mut uow = dbs.router.unit_of_work();

	let result = atomic(&mut uow, |uow| {
		Box::pin(async move {
			TransactionBoundary::requires_new()
				.with_route_key("slave2")
				.run(uow, |uow| {
					Box::pin(async move { UserMapper::save(uow, &User::new("audit", 1)).await })
				})
				.await?;
			save_then_fail(uow, User::new("order", 2)).await
		})
	})
	.await;

	assert!(result.is_err());
	assert_eq!(dbs.usernames("slave2").await, vec!["audit"]);
	assert!(dbs.usernames("master").await.is_empty());
}

/// `NOT_SUPPORTED` writes auto-commit on their own key even when the
/// surrounding transaction rolls back
#[rstest]
#[tokio::test]
async fn test_not_supported_runs_outside_transaction(#[future] databases: TestDatabases) {
	let dbs = databases.await;
	let mut uow = dbs.router.unit_of_work();

	let result = atomic(&mut uow, |uow| {
		Box::pin(async move {
			let depth = uow.route_keys().depth();
			TransactionBoundary::not_supported()
				.with_route_key("slave1")
				.run(uow, |uow| {
					Box::pin(async move {
						assert!(!uow.in_transaction());
						UserMapper::save(uow, &User::new("log_entry", 1)).await
					})
				})
				.await?;
			assert_eq!(uow.route_keys().depth(), depth);
			assert!(uow.in_transaction());

			save_then_fail(uow, User::new("order", 2)).await
		})
	})
	.await;

	assert!(result.is_err());
	assert_eq!(dbs.usernames("slave1").await, vec!["log_entry"]);
	assert!(dbs.usernames("master").await.is_empty());
}

/// A data source selected inside a transaction takes effect through
/// `NOT_SUPPORTED`: the write auto-commits on the selected key while the
/// outer transaction rolls back
#[rstest]
#[tokio::test]
async fn test_not_supported_writes_to_selected_key(#[future] databases: TestDatabases) {
	let dbs = databases.await;
	let mut uow = dbs.router.unit_of_work();

	let result = atomic(&mut uow, |uow| {
		Box::pin(async move {
			UserMapper::save(uow, &User::new("order", 1)).await?;
			uow.with_route_key("slave2", |uow| {
				Box::pin(async move {
					TransactionBoundary::not_supported()
						.run(uow, |uow| {
							Box::pin(async move { UserMapper::save(uow, &User::new("log_entry", 2)).await })
						})
						.await
				})
			})
			.await?;
			assert_eq!(uow.route_keys().depth(), 1);
			Err::<(), _>(ServiceError::Rule("order rejected".to_string()))
		})
	})
	.await;

	assert!(matches!(result, Err(ServiceError::Rule(_))));
	assert_eq!(dbs.usernames("slave2").await, vec!["log_entry"]);
	assert!(dbs.usernames("master").await.is_empty());
	assert!(uow.route_keys().is_empty());
}

/// A data source selected inside a transaction takes effect through
/// `REQUIRES_NEW`: the inner transaction begins and commits on the selected
/// key, the outer one keeps writing to its own
#[rstest]
#[tokio::test]
async fn test_requires_new_begins_on_selected_key(#[future] databases: TestDatabases) {
	let dbs = databases.await;
	let mut uow = dbs.router.unit_of_work();

	atomic(&mut uow, |uow| {
		Box::pin(async move {
			uow.with_route_key("slave1", |uow| {
				Box::pin(async move {
					TransactionBoundary::requires_new()
						.run(uow, |uow| {
							Box::pin(async move { UserMapper::save(uow, &User::new("audit", 1)).await })
						})
						.await?;
					UserMapper::save(uow, &User::new("outer", 2)).await
				})
			})
			.await?;
			Ok::<_, RoutingError>(())
		})
	})
	.await
	.unwrap();

	assert_eq!(dbs.usernames("slave1").await, vec!["audit"]);
	assert_eq!(dbs.usernames("master").await, vec!["outer"]);
	assert_eq!(
		dbs.events.kinds(),
		vec!["begin", "suspended", "begin", "commit", "resumed", "commit"]
	);
}

/// A failed `NESTED` scope rolls back to its savepoint; the outer work commits
#[rstest]
#[tokio::test]
async fn test_nested_rolls_back_to_savepoint(#[future] databases: TestDatabases) {
	let dbs = databases.await;
	let mut uow = dbs.router.unit_of_work();

	TransactionBoundary::required()
		.with_route_key("slave1")
		.run(&mut uow, |uow| {
			Box::pin(async move {
				UserMapper::save(uow, &User::new("kept", 1)).await?;

				let nested = TransactionBoundary::nested()
					.run(uow, |uow| Box::pin(save_then_fail(uow, User::new("discarded", 2))))
					.await;
				assert!(nested.is_err());

				TransactionBoundary::nested()
					.run(uow, |uow| {
						Box::pin(async move { UserMapper::save(uow, &User::new("released", 3)).await })
					})
					.await?;
				Ok::<_, ServiceError>(())
			})
		})
		.await
		.unwrap();

	assert_eq!(dbs.usernames("slave1").await, vec!["kept", "released"]);
	assert_eq!(
		dbs.events.kinds(),
		vec![
			"begin",
			"savepoint_created",
			"savepoint_rolled_back",
			"savepoint_created",
			"savepoint_released",
			"commit",
		]
	);
}

#[rstest]
#[tokio::test]
async fn test_mandatory_requires_transaction(#[future] databases: TestDatabases) {
	let dbs = databases.await;
	let mut uow = dbs.router.unit_of_work();
	uow.route_keys_mut().push("slave1");

	let result = TransactionBoundary::mandatory()
		.run(&mut uow, |uow| {
			Box::pin(async move { UserMapper::save(uow, &User::new("never_written", 1)).await })
		})
		.await;

	assert!(matches!(result, Err(RoutingError::TransactionRequired { .. })));
	assert_eq!(uow.route_keys().depth(), 1);
	assert!(dbs.usernames("slave1").await.is_empty());
}

#[rstest]
#[tokio::test]
async fn test_never_rejects_active_transaction(#[future] databases: TestDatabases) {
	let dbs = databases.await;
	let mut uow = dbs.router.unit_of_work();

	let result = atomic(&mut uow, |uow| {
		Box::pin(async move {
			TransactionBoundary::never()
				.run(uow, |uow| {
					Box::pin(async move { UserMapper::save(uow, &User::new("never_written", 1)).await })
				})
				.await?;
			Ok::<_, RoutingError>(())
		})
	})
	.await;

	assert!(matches!(result, Err(RoutingError::UnexpectedTransaction { .. })));
	assert!(dbs.usernames("master").await.is_empty());
}

/// A joined scope that failed poisons the transaction even when the caller
/// swallows the error
#[rstest]
#[tokio::test]
async fn test_swallowed_failure_rolls_back_outer(#[future] databases: TestDatabases) {
	let dbs = databases.await;
	let mut uow = dbs.router.unit_of_work();

	let result = atomic(&mut uow, |uow| {
		Box::pin(async move {
			UserMapper::save(uow, &User::new("first", 1)).await?;
			let _ = atomic(uow, |uow| Box::pin(save_then_fail(uow, User::new("second", 2)))).await;
			Ok::<_, ServiceError>(())
		})
	})
	.await;

	assert!(matches!(
		result,
		Err(ServiceError::Routing(RoutingError::UnexpectedRollback { .. }))
	));
	assert!(dbs.usernames("master").await.is_empty());
}

/// Serializable isolation maps to `BEGIN EXCLUSIVE` on SQLite
#[rstest]
#[tokio::test]
async fn test_isolation_level_on_started_transaction(#[future] databases: TestDatabases) {
	let dbs = databases.await;
	let mut uow = dbs.router.unit_of_work();

	TransactionBoundary::required()
		.with_isolation(IsolationLevel::Serializable)
		.run(&mut uow, |uow| {
			Box::pin(async move { UserMapper::save(uow, &User::new("exclusive", 1)).await })
		})
		.await
		.unwrap();

	assert_eq!(dbs.usernames("master").await, vec!["exclusive"]);
}

/// With a single master connection held by the outer transaction, an inner
/// `REQUIRES_NEW` on the same key times out; the outer transaction is
/// restored and still commits
#[rstest]
#[tokio::test]
async fn test_pool_exhaustion_in_requires_new() {
	let dbs = setup_databases(|datasource| {
		datasource
			.with_max_connections(1)
			.with_acquire_timeout_secs(1)
	})
	.await;
	let mut uow = dbs.router.unit_of_work();

	atomic(&mut uow, |uow| {
		Box::pin(async move {
			let outer = uow.transaction_status().unwrap();

			let inner = TransactionBoundary::requires_new()
				.run(uow, |uow| {
					Box::pin(async move { UserMapper::save(uow, &User::new("unreachable", 1)).await })
				})
				.await;

			let err = inner.unwrap_err();
			assert!(err.is_pool_exhausted());
			assert!(matches!(err, RoutingError::Pool(PoolError::Exhausted(_))));
			assert_eq!(uow.transaction_status().unwrap(), outer);
			assert_eq!(uow.route_keys().current().unwrap().as_str(), "master");

			UserMapper::save(uow, &User::new("outer", 2)).await
		})
	})
	.await
	.unwrap();

	assert_eq!(dbs.usernames("master").await, vec!["outer"]);
}
