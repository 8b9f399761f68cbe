//! Transaction boundaries
//!
//! A [`TransactionBoundary`] wraps one service-level operation. On entry it
//! decides from its [`Propagation`] mode whether to join the active
//! transaction, park it, start a new one, open a savepoint or run without a
//! transaction. On exit it completes exactly what it started and puts the
//! unit of work back the way it found it: same route-key stack, same active
//! transaction.

use super::Propagation;
use super::active::ActiveTransaction;
use super::events::TransactionEvent;
use crate::error::{RoutingError, RoutingResult};
use crate::route::RouteKey;
use crate::unit_of_work::UnitOfWork;
use futures::future::BoxFuture;
use routedb_pool::{IsolationLevel, Savepoint};
use std::fmt;

/// Where a boundary invocation is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryState {
	NotStarted,
	Deciding,
	Joined,
	Started,
	/// The ambient transaction is parked; the frame moves on to `Started`
	/// or `NonTransactional`
	Suspended,
	NonTransactional,
	Rejected,
	Completing,
	Done,
}

impl fmt::Display for BoundaryState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			BoundaryState::NotStarted => "not_started",
			BoundaryState::Deciding => "deciding",
			BoundaryState::Joined => "joined",
			BoundaryState::Started => "started",
			BoundaryState::Suspended => "suspended",
			BoundaryState::NonTransactional => "non_transactional",
			BoundaryState::Rejected => "rejected",
			BoundaryState::Completing => "completing",
			BoundaryState::Done => "done",
		};
		f.write_str(name)
	}
}

/// What a boundary does on entry, given its mode and the unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decision {
	Join,
	Savepoint,
	Start { suspend: bool },
	NonTransactional { suspend: bool, push_key: bool },
	RejectMissing,
	RejectExisting,
}

impl Decision {
	pub(crate) fn of(propagation: Propagation, ambient: bool, savepoints: bool) -> Self {
		match (propagation, ambient) {
			(Propagation::Required | Propagation::Supports | Propagation::Mandatory, true) => {
				Decision::Join
			}
			(Propagation::Nested, true) if savepoints => Decision::Savepoint,
			(Propagation::Nested, true) => Decision::Join,
			(Propagation::Required | Propagation::Nested, false) => {
				Decision::Start { suspend: false }
			}
			(Propagation::RequiresNew, ambient) => Decision::Start { suspend: ambient },
			(Propagation::NotSupported, ambient) => Decision::NonTransactional {
				suspend: ambient,
				push_key: true,
			},
			(Propagation::Supports, false) => Decision::NonTransactional {
				suspend: false,
				push_key: false,
			},
			(Propagation::Never, false) => Decision::NonTransactional {
				suspend: false,
				push_key: true,
			},
			(Propagation::Mandatory, false) => Decision::RejectMissing,
			(Propagation::Never, true) => Decision::RejectExisting,
		}
	}

	/// The state the frame settles in once the decision is carried out
	pub(crate) fn settled_state(&self) -> BoundaryState {
		match self {
			Decision::Join | Decision::Savepoint => BoundaryState::Joined,
			Decision::Start { .. } => BoundaryState::Started,
			Decision::NonTransactional { .. } => BoundaryState::NonTransactional,
			Decision::RejectMissing | Decision::RejectExisting => BoundaryState::Rejected,
		}
	}
}

enum FrameKind {
	Joined,
	Started,
	Savepoint(Savepoint),
	NonTransactional,
}

/// A transaction parked by a `REQUIRES_NEW` or `NOT_SUPPORTED` frame,
/// together with its route-key stack entry (index and key) taken out when
/// it was parked
struct Parked {
	transaction: ActiveTransaction,
	route_entry: Option<(usize, RouteKey)>,
}

struct TransactionFrame {
	propagation: Propagation,
	state: BoundaryState,
	entry_key: Option<RouteKey>,
	entry_depth: usize,
	/// Stack depth once any parked key has been taken out
	base_depth: usize,
	pushed_key: bool,
	kind: FrameKind,
	parked: Option<Parked>,
}

impl TransactionFrame {
	fn new(propagation: Propagation, uow: &UnitOfWork) -> Self {
		let depth = uow.route_keys().depth();
		Self {
			propagation,
			state: BoundaryState::NotStarted,
			entry_key: uow.route_keys().current().cloned(),
			entry_depth: depth,
			base_depth: depth,
			pushed_key: false,
			kind: FrameKind::NonTransactional,
			parked: None,
		}
	}

	fn transition(&mut self, next: BoundaryState) {
		tracing::trace!(
			propagation = %self.propagation,
			from = %self.state,
			to = %next,
			"Boundary state changed"
		);
		self.state = next;
	}
}

/// The key selected by the caller's scope, if any
///
/// With a parked transaction only keys pushed after it began count; keys
/// below its own entry were already in force when it started.
fn scoped_route_key(uow: &UnitOfWork, frame: &TransactionFrame) -> Option<RouteKey> {
	let routes = uow.route_keys();
	match frame.parked.as_ref().and_then(|parked| parked.route_entry.as_ref()) {
		Some((index, _)) if routes.depth() <= *index => None,
		_ => routes.current().cloned(),
	}
}

/// Declarative transaction boundary around one operation
///
/// # Examples
///
/// ```
/// use routedb_core::{DataSourceRegistry, Propagation, RoutingDataSource, RoutingError, TransactionBoundary};
/// use routedb_pool::{AnyDataSource, PoolConfig};
///
/// # async fn example() -> Result<(), RoutingError> {
/// # let registry = DataSourceRegistry::builder()
/// #     .register("master", AnyDataSource::connect("sqlite::memory:", PoolConfig::default()).await?)
/// #     .register("slave1", AnyDataSource::connect("sqlite::memory:", PoolConfig::default()).await?)
/// #     .default_key("master")
/// #     .build()?;
/// let router = RoutingDataSource::new(registry);
/// let mut uow = router.unit_of_work();
///
/// let boundary = TransactionBoundary::new(Propagation::RequiresNew).with_route_key("slave1");
/// let key = boundary
///     .run(&mut uow, |uow| {
///         Box::pin(async move {
///             let status = uow.transaction_status().expect("inside a transaction");
///             Ok::<_, RoutingError>(status.route_key)
///         })
///     })
///     .await?;
///
/// assert_eq!(key.as_str(), "slave1");
/// assert!(!uow.in_transaction());
/// assert!(uow.route_keys().is_empty());
/// # Ok(())
/// # }
/// # tokio::runtime::Runtime::new().unwrap().block_on(example()).unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionBoundary {
	propagation: Propagation,
	route_key: Option<RouteKey>,
	isolation: Option<IsolationLevel>,
}

impl TransactionBoundary {
	pub fn new(propagation: Propagation) -> Self {
		Self {
			propagation,
			route_key: None,
			isolation: None,
		}
	}

	pub fn required() -> Self {
		Self::new(Propagation::Required)
	}

	pub fn requires_new() -> Self {
		Self::new(Propagation::RequiresNew)
	}

	pub fn supports() -> Self {
		Self::new(Propagation::Supports)
	}

	pub fn not_supported() -> Self {
		Self::new(Propagation::NotSupported)
	}

	pub fn mandatory() -> Self {
		Self::new(Propagation::Mandatory)
	}

	pub fn never() -> Self {
		Self::new(Propagation::Never)
	}

	pub fn nested() -> Self {
		Self::new(Propagation::Nested)
	}

	/// Data source wanted by the wrapped operation
	///
	/// Honoured when the boundary starts a transaction or runs outside one.
	/// A joined transaction stays on the data source it began on.
	pub fn with_route_key(mut self, key: impl Into<RouteKey>) -> Self {
		self.route_key = Some(key.into());
		self
	}

	/// Isolation level for transactions this boundary starts
	pub fn with_isolation(mut self, level: IsolationLevel) -> Self {
		self.isolation = Some(level);
		self
	}

	pub fn propagation(&self) -> Propagation {
		self.propagation
	}

	pub fn route_key(&self) -> Option<&RouteKey> {
		self.route_key.as_ref()
	}

	pub fn isolation(&self) -> Option<IsolationLevel> {
		self.isolation
	}

	/// Run `op` inside this boundary
	///
	/// An error from `op` is returned as is, after any transaction this
	/// boundary owns has been rolled back. The route-key stack and the
	/// active transaction are restored on every path.
	pub async fn run<F, T, E>(&self, uow: &mut UnitOfWork, op: F) -> Result<T, E>
	where
		F: for<'c> FnOnce(&'c mut UnitOfWork) -> BoxFuture<'c, Result<T, E>>,
		E: From<RoutingError>,
	{
		let frame = self.enter(uow).await?;
		let result = op(&mut *uow).await;
		self.exit(uow, frame, result).await
	}

	async fn enter(&self, uow: &mut UnitOfWork) -> RoutingResult<TransactionFrame> {
		let mut frame = TransactionFrame::new(self.propagation, uow);
		frame.transition(BoundaryState::Deciding);

		if let Some(key) = &self.route_key {
			uow.router().registry().resolve(key)?;
		}

		let savepoints = match uow.current() {
			Some(tx) => uow
				.router()
				.registry()
				.resolve(tx.route_key())?
				.supports_savepoints(),
			None => false,
		};
		let decision = Decision::of(self.propagation, uow.in_transaction(), savepoints);
		tracing::debug!(
			propagation = %self.propagation,
			?decision,
			entry_key = ?frame.entry_key.as_ref().map(RouteKey::as_str),
			"Boundary entered"
		);

		match decision {
			Decision::RejectMissing => {
				frame.transition(BoundaryState::Rejected);
				return Err(RoutingError::TransactionRequired {
					propagation: self.propagation,
				});
			}
			Decision::RejectExisting => {
				frame.transition(BoundaryState::Rejected);
				return Err(RoutingError::UnexpectedTransaction {
					propagation: self.propagation,
				});
			}
			Decision::Join => {
				if self.propagation == Propagation::Nested {
					tracing::warn!(
						route_key = ?uow.current().map(|tx| tx.route_key().as_str()),
						"Data source cannot open savepoints; NESTED joins the outer transaction"
					);
				}
				self.ignore_route_key(uow);
				frame.kind = FrameKind::Joined;
			}
			Decision::Savepoint => {
				self.ignore_route_key(uow);
				let router = uow.router_handle();
				let Some(tx) = uow.current_mut() else {
					return Err(RoutingError::NoActiveTransaction);
				};
				let savepoint = tx.create_savepoint().await?;
				router.emit(TransactionEvent::SavepointCreated {
					transaction_id: tx.id(),
					route_key: tx.route_key().clone(),
					savepoint: savepoint.name().to_string(),
				});
				frame.kind = FrameKind::Savepoint(savepoint);
			}
			Decision::Start { suspend } => {
				if suspend {
					self.suspend(uow, &mut frame);
				}
				if let Err(error) = self.start(uow, &mut frame).await {
					self.resume(uow, &mut frame);
					return Err(error);
				}
				frame.kind = FrameKind::Started;
			}
			Decision::NonTransactional { suspend, push_key } => {
				if suspend {
					self.suspend(uow, &mut frame);
				}
				if push_key && let Some(key) = &self.route_key {
					uow.routes_mut().push(key.clone());
					frame.pushed_key = true;
				}
				frame.kind = FrameKind::NonTransactional;
			}
		}

		frame.transition(decision.settled_state());
		Ok(frame)
	}

	fn ignore_route_key(&self, uow: &UnitOfWork) {
		if let Some(key) = &self.route_key
			&& let Some(tx) = uow.current()
			&& key != tx.route_key()
		{
			tracing::debug!(
				requested = %key,
				bound = %tx.route_key(),
				"Route key ignored; transaction already bound"
			);
		}
	}

	fn suspend(&self, uow: &mut UnitOfWork, frame: &mut TransactionFrame) {
		let Some(transaction) = uow.take_transaction() else {
			return;
		};
		let route_entry = transaction.stack_index().and_then(|index| {
			uow.routes_mut()
				.remove_at(index, transaction.route_key())
				.map(|key| (index, key))
		});
		if route_entry.is_none() {
			tracing::warn!(
				transaction_id = %transaction.id(),
				route_key = %transaction.route_key(),
				"Suspended transaction's route key is no longer on the stack"
			);
		}
		frame.base_depth = uow.route_keys().depth();

		uow.router().emit(TransactionEvent::Suspended {
			transaction_id: transaction.id(),
			route_key: transaction.route_key().clone(),
		});
		frame.transition(BoundaryState::Suspended);
		frame.parked = Some(Parked {
			transaction,
			route_entry,
		});
	}

	fn resume(&self, uow: &mut UnitOfWork, frame: &mut TransactionFrame) {
		let Some(parked) = frame.parked.take() else {
			return;
		};
		if let Some((index, key)) = parked.route_entry {
			uow.routes_mut().insert_at(index, key);
		}

		uow.router().emit(TransactionEvent::Resumed {
			transaction_id: parked.transaction.id(),
			route_key: parked.transaction.route_key().clone(),
		});
		uow.install_transaction(parked.transaction);
	}

	async fn start(&self, uow: &mut UnitOfWork, frame: &mut TransactionFrame) -> RoutingResult<()> {
		let key = self
			.route_key
			.clone()
			.or_else(|| scoped_route_key(uow, frame))
			.or_else(|| {
				frame
					.parked
					.as_ref()
					.map(|parked| parked.transaction.route_key().clone())
			})
			.unwrap_or_else(|| uow.router().registry().default_key().clone());

		let source = uow.router().registry().resolve(&key)?;
		let mut tx = ActiveTransaction::begin(key.clone(), source.as_ref(), self.isolation).await?;

		uow.router().emit(TransactionEvent::Begin {
			transaction_id: tx.id(),
			route_key: key.clone(),
		});
		tx.bind_stack_index(uow.route_keys().depth());
		uow.routes_mut().push(key);
		frame.pushed_key = true;
		uow.install_transaction(tx);
		Ok(())
	}

	async fn exit<T, E>(
		&self,
		uow: &mut UnitOfWork,
		mut frame: TransactionFrame,
		result: Result<T, E>,
	) -> Result<T, E>
	where
		E: From<RoutingError>,
	{
		frame.transition(BoundaryState::Completing);
		let kind = std::mem::replace(&mut frame.kind, FrameKind::NonTransactional);

		let outcome = match kind {
			FrameKind::Joined => {
				if result.is_err()
					&& let Some(tx) = uow.current_mut()
				{
					tx.set_rollback_only();
				}
				result
			}
			FrameKind::Savepoint(savepoint) => self.complete_savepoint(uow, savepoint, result).await,
			FrameKind::Started => self.complete_transaction(uow, result).await,
			FrameKind::NonTransactional => result,
		};

		uow.unwind_routes(frame.base_depth, frame.pushed_key);
		self.resume(uow, &mut frame);
		frame.transition(BoundaryState::Done);

		if uow.route_keys().depth() != frame.entry_depth {
			tracing::warn!(
				entry_depth = frame.entry_depth,
				depth = uow.route_keys().depth(),
				"Route key stack not restored to its entry depth"
			);
		}
		outcome
	}

	async fn complete_savepoint<T, E>(
		&self,
		uow: &mut UnitOfWork,
		savepoint: Savepoint,
		result: Result<T, E>,
	) -> Result<T, E>
	where
		E: From<RoutingError>,
	{
		let router = uow.router_handle();
		let Some(tx) = uow.current_mut() else {
			return result.and(Err(RoutingError::NoActiveTransaction.into()));
		};
		let transaction_id = tx.id();
		let route_key = tx.route_key().clone();
		let name = savepoint.name().to_string();

		match result {
			Ok(value) => {
				tx.release_savepoint().await.map_err(RoutingError::from)?;
				router.emit(TransactionEvent::SavepointReleased {
					transaction_id,
					route_key,
					savepoint: name,
				});
				Ok(value)
			}
			Err(error) => {
				match tx.rollback_to_savepoint().await {
					Ok(_) => router.emit(TransactionEvent::SavepointRolledBack {
						transaction_id,
						route_key,
						savepoint: name,
					}),
					Err(rollback_error) => {
						tracing::warn!(
							%transaction_id,
							savepoint = %name,
							error = %rollback_error,
							"Rollback to savepoint failed; marking transaction rollback-only"
						);
						tx.set_rollback_only();
					}
				}
				Err(error)
			}
		}
	}

	async fn complete_transaction<T, E>(&self, uow: &mut UnitOfWork, result: Result<T, E>) -> Result<T, E>
	where
		E: From<RoutingError>,
	{
		let Some(tx) = uow.take_transaction() else {
			tracing::warn!(propagation = %self.propagation, "Started transaction vanished before completion");
			return result.and(Err(RoutingError::NoActiveTransaction.into()));
		};
		let router = uow.router_handle();
		let transaction_id = tx.id();
		let route_key = tx.route_key().clone();
		let rollback_event = || TransactionEvent::Rollback {
			transaction_id,
			route_key: route_key.clone(),
		};

		match result {
			Ok(_) if tx.is_rollback_only() => {
				match tx.rollback().await {
					Ok(()) => router.emit(rollback_event()),
					Err(error) => {
						tracing::warn!(%transaction_id, %error, "Rollback of rollback-only transaction failed");
					}
				}
				Err(RoutingError::UnexpectedRollback { transaction_id }.into())
			}
			Ok(value) => match tx.commit().await {
				Ok(()) => {
					router.emit(TransactionEvent::Commit {
						transaction_id,
						route_key: route_key.clone(),
					});
					Ok(value)
				}
				Err(error) => {
					router.emit(rollback_event());
					Err(RoutingError::from(error).into())
				}
			},
			Err(error) => {
				match tx.rollback().await {
					Ok(()) => router.emit(rollback_event()),
					Err(rollback_error) => {
						tracing::warn!(
							%transaction_id,
							error = %rollback_error,
							"Rollback failed; returning the original error"
						);
					}
				}
				Err(error)
			}
		}
	}
}
