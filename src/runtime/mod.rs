//! QG-011: Runtime support for generated aggregate operations.
//!
//! Generated code is thin: it calls [`guarded`] for every member, runs
//! concurrent groups through [`CompletionOrder::spawn`] and [`join_group!`],
//! and settles transactional groups with [`settle_transaction`].
//!
//! Receivers used with concurrent groups must be `Clone + Send + Sync +
//! 'static`, and every member argument must be `Clone`.
//!
//! Member tasks are owned by the aggregate future: dropping it (a timeout,
//! a `select!` losing branch) aborts every task that has not finished.

pub mod transaction;

pub use tokio_util::sync::CancellationToken as Cancellation;
pub use transaction::{begin, settle_transaction, Transactional, UnitOfWork};

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinError;
use tokio_util::task::AbortOnDropHandle;

/// Crates the exported macros expand to.
#[doc(hidden)]
pub mod reexport {
    pub use tokio;
}

/// Boxed member error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure of one aggregate invocation.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// A member operation returned an error.
    #[error("{operation} failed: {source}")]
    Member {
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },

    /// A concurrent member's task panicked or was aborted.
    #[error("{operation} task aborted: {reason}")]
    TaskAborted {
        operation: &'static str,
        reason: String,
    },

    #[error("cannot begin transaction: {0}")]
    Begin(#[source] BoxError),

    #[error("cannot commit transaction: {0}")]
    Commit(#[source] BoxError),
}

/// Run one member call, racing it against cancellation.
pub async fn guarded<T, E, F>(
    cx: &Cancellation,
    operation: &'static str,
    call: F,
) -> Result<T, AggregateError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    tokio::select! {
        biased;
        _ = cx.cancelled() => Err(AggregateError::Cancelled { operation }),
        result = call => result.map_err(|e| AggregateError::Member {
            operation,
            source: e.into(),
        }),
    }
}

/// A task outcome stamped with its completion sequence number.
#[derive(Debug)]
pub struct Tracked<T> {
    pub seq: u64,
    pub result: Result<T, AggregateError>,
}

/// Completion counter shared by the tasks of one concurrent group.
#[derive(Debug, Clone, Default)]
pub struct CompletionOrder {
    next: Arc<AtomicU64>,
}

impl CompletionOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a member task whose outcome records when it finished. The task
    /// is aborted if the returned handle is dropped before it completes.
    pub fn spawn<T, F>(&self, fut: F) -> AbortOnDropHandle<Tracked<T>>
    where
        F: Future<Output = Result<T, AggregateError>> + Send + 'static,
        T: Send + 'static,
    {
        let next = Arc::clone(&self.next);
        AbortOnDropHandle::new(tokio::spawn(async move {
            let result = fut.await;
            let seq = next.fetch_add(1, Ordering::SeqCst);
            Tracked { seq, result }
        }))
    }
}

/// Picks the group failure once every task has been joined.
///
/// The failure that completed first wins. Tasks that never completed
/// (panicked, aborted) rank after all completed ones; ties go to the
/// member declared first.
#[derive(Debug, Default)]
pub struct Settle {
    index: usize,
    first: Option<((u8, u64, usize), AggregateError)>,
}

impl Settle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take one joined outcome in declaration order.
    pub fn take<T>(
        &mut self,
        operation: &'static str,
        joined: Result<Tracked<T>, JoinError>,
    ) -> Option<T> {
        let index = self.index;
        self.index += 1;

        let (key, err) = match joined {
            Ok(Tracked { result: Ok(value), .. }) => return Some(value),
            Ok(Tracked { seq, result: Err(e) }) => ((0, seq, index), e),
            Err(join) => (
                (1, 0, index),
                AggregateError::TaskAborted {
                    operation,
                    reason: join.to_string(),
                },
            ),
        };
        if self.first.as_ref().is_none_or(|(k, _)| key < *k) {
            self.first = Some((key, err));
        }
        None
    }

    /// The reported failure, if any member failed.
    pub fn into_error(self) -> Option<AggregateError> {
        self.first.map(|(_, err)| err)
    }
}

/// Join every task of a concurrent group, then settle.
///
/// Expands to `Result<(T0, T1, ...), AggregateError>`. Successful results of
/// a failed group are dropped.
///
/// ```ignore
/// let order = CompletionOrder::new();
/// let task_0 = order.spawn(async { Ok::<_, AggregateError>(1) });
/// let task_1 = order.spawn(async { Ok::<_, AggregateError>("two") });
/// let (one, two) = querygen::join_group!("One" => task_0, "Two" => task_1)?;
/// ```
#[macro_export]
macro_rules! join_group {
    ($($operation:literal => $task:ident),+ $(,)?) => {{
        let ($($task,)+) = $crate::runtime::reexport::tokio::join!($($task),+);
        let mut settle = $crate::runtime::Settle::new();
        $( let $task = settle.take($operation, $task); )+
        match settle.into_error() {
            ::core::option::Option::Some(err) => ::core::result::Result::Err(err),
            ::core::option::Option::None => match ($($task,)+) {
                ($(::core::option::Option::Some($task),)+) => ::core::result::Result::Ok(($($task,)+)),
                _ => ::core::unreachable!("a settled group has every result"),
            },
        }
    }};
}
