//! Transactional groups: one unit of work, committed or rolled back.

use super::{AggregateError, BoxError, Cancellation};
use async_trait::async_trait;
use tracing::warn;

/// A transactional handle. Exposes the same member operations as the
/// receiver it was begun from.
///
/// If the aggregate future is dropped mid-group the handle is dropped
/// without [`commit`](UnitOfWork::commit) or
/// [`rollback`](UnitOfWork::rollback). Implementations must discard
/// uncommitted work in `Drop`, as database transaction guards do.
#[async_trait]
pub trait UnitOfWork: Send + Sized {
    async fn commit(self) -> Result<(), BoxError>;
    async fn rollback(self) -> Result<(), BoxError>;
}

/// A receiver that can open a unit of work.
#[async_trait]
pub trait Transactional: Sync {
    type Tx: UnitOfWork;

    async fn begin(&self, cx: &Cancellation) -> Result<Self::Tx, BoxError>;
}

/// Open a unit of work, racing the call against cancellation.
pub async fn begin<R>(receiver: &R, cx: &Cancellation) -> Result<R::Tx, AggregateError>
where
    R: Transactional + ?Sized,
{
    tokio::select! {
        biased;
        _ = cx.cancelled() => Err(AggregateError::Cancelled { operation: "begin" }),
        tx = receiver.begin(cx) => tx.map_err(AggregateError::Begin),
    }
}

/// Commit after full success, roll back otherwise. The unit of work is
/// consumed on every path.
///
/// A rollback failure is logged; the member failure that caused it is
/// what the caller sees.
pub async fn settle_transaction<U, T>(
    tx: U,
    outcome: Result<T, AggregateError>,
) -> Result<T, AggregateError>
where
    U: UnitOfWork,
{
    match outcome {
        Ok(value) => {
            tx.commit().await.map_err(AggregateError::Commit)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(error = %rollback, cause = %err, "rollback failed");
            }
            Err(err)
        }
    }
}
