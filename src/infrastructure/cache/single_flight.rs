//! Coalescing of concurrent misses on the same digest

use std::any::Any;
use std::fmt;
use std::future::Future;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::debug;

use crate::domain::cache::CacheDigest;

type SharedOutcome<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

/// Registry of in-flight computations keyed by digest
///
/// The first caller for a digest registers a shared future; callers arriving
/// while it is pending await the same future instead of starting their own.
/// Whichever caller is polling drives the work, so a cancelled first caller
/// does not strand the others.
#[derive(Default)]
pub(crate) struct SingleFlight {
    pending: DashMap<CacheDigest, Box<dyn Any + Send + Sync>>,
}

impl fmt::Debug for SingleFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl SingleFlight {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Runs `work` unless a computation for `digest` is already pending
    ///
    /// Returns the outcome and whether this caller joined an existing flight.
    pub(crate) async fn run<T, E, W, Fut>(&self, digest: &CacheDigest, work: W) -> (Result<T, E>, bool)
    where
        T: Clone + Send + Sync + 'static,
        E: Clone + Send + Sync + 'static,
        W: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (shared, joined) = match self.pending.entry(digest.clone()) {
            Entry::Occupied(occupied) => {
                let existing = occupied
                    .get()
                    .downcast_ref::<SharedOutcome<T, E>>()
                    .cloned();
                drop(occupied);

                match existing {
                    Some(shared) => {
                        debug!(digest = %digest, "Joining in-flight computation");
                        (shared, true)
                    }
                    // Same digest requested with a different value type
                    None => return (work().await, false),
                }
            }
            Entry::Vacant(vacant) => {
                let shared = work().boxed().shared();
                vacant.insert(Box::new(shared.clone()));
                (shared, false)
            }
        };

        let outcome = shared.clone().await;

        self.pending.remove_if(digest, |_, registered| {
            registered
                .downcast_ref::<SharedOutcome<T, E>>()
                .is_some_and(|current| current.ptr_eq(&shared))
        });

        (outcome, joined)
    }

    /// Number of computations currently pending
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
