//! Request coalescing ("easing").
//!
//! Concurrent callers asking for the same key share one execution: the first
//! caller registers a shared future, later callers await it. The entry is
//! removed as soon as the execution finishes, so nothing is cached here; a
//! caller arriving after completion starts a fresh execution.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use crate::lock::mutex_lock;

const SOURCE: &str = "rowcache::easer";

/// Outcome of one shared execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flight<T> {
    /// The executor produced a value.
    Landed(T),
    /// The executor panicked; carries the panic message.
    Aborted(String),
}

impl<T> Flight<T> {
    /// Convert into a `Result`, turning an abort into its message.
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Self::Landed(value) => Ok(value),
            Self::Aborted(message) => Err(message),
        }
    }
}

/// What a caller of [`Easer::coalesce`] got back.
#[derive(Debug)]
pub enum Coalesced<T, F> {
    /// This caller started the execution.
    Led(Flight<T>),
    /// This caller joined an execution already in flight. Its own executor
    /// was never called and is handed back.
    Joined(Flight<T>, F),
}

impl<T, F> Coalesced<T, F> {
    pub fn is_leader(&self) -> bool {
        matches!(self, Self::Led(_))
    }

    pub fn flight(&self) -> &Flight<T> {
        match self {
            Self::Led(flight) | Self::Joined(flight, _) => flight,
        }
    }

    pub fn into_flight(self) -> Flight<T> {
        match self {
            Self::Led(flight) | Self::Joined(flight, _) => flight,
        }
    }
}

type SharedFlight<T> = Shared<BoxFuture<'static, Flight<T>>>;
type Registry<T> = Arc<Mutex<HashMap<String, SharedFlight<T>>>>;

/// Registry of in-flight executions keyed by cache key.
pub struct Easer<T> {
    in_flight: Registry<T>,
}

impl<T> Default for Easer<T> {
    fn default() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> Easer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of executions currently registered.
    pub fn in_flight(&self) -> usize {
        mutex_lock(&self.in_flight, SOURCE, "in_flight").len()
    }

    /// Check whether `key` has an execution in flight.
    pub fn is_in_flight(&self, key: &str) -> bool {
        mutex_lock(&self.in_flight, SOURCE, "is_in_flight").contains_key(key)
    }

    /// Run `executor` for `key`, or join the execution already running for it.
    ///
    /// The leader's execution is also spawned onto the current tokio runtime
    /// so it runs to completion even if every caller is dropped. `executor`
    /// should only build the future; it is called while the registry is
    /// locked.
    pub async fn coalesce<F, Fut>(&self, key: &str, executor: F) -> Coalesced<T, F>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (flight, spare) = {
            let mut registry = mutex_lock(&self.in_flight, SOURCE, "coalesce");
            match registry.get(key) {
                Some(flight) => (flight.clone(), Some(executor)),
                None => {
                    let fut = executor();
                    let guard = Deregister {
                        registry: Arc::clone(&self.in_flight),
                        key: key.to_string(),
                    };
                    let flight = AssertUnwindSafe(async move {
                        let _guard = guard;
                        fut.await
                    })
                    .catch_unwind()
                    .map(|outcome| match outcome {
                        Ok(value) => Flight::Landed(value),
                        Err(panic) => Flight::Aborted(panic_message(panic.as_ref())),
                    })
                    .boxed()
                    .shared();
                    registry.insert(key.to_string(), flight.clone());
                    (flight, None)
                }
            }
        };

        match spare {
            Some(executor) => {
                debug!(key, "Joining in-flight execution");
                Coalesced::Joined(flight.await, executor)
            }
            None => {
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(flight.clone());
                }
                let outcome = flight.await;
                if let Flight::Aborted(message) = &outcome {
                    warn!(key, panic = %message, "In-flight execution aborted");
                }
                Coalesced::Led(outcome)
            }
        }
    }
}

/// Removes a key from the registry when its execution ends, panics included.
struct Deregister<T> {
    registry: Registry<T>,
    key: String,
}

impl<T> Drop for Deregister<T> {
    fn drop(&mut self) {
        let removed = {
            let mut registry = mutex_lock(&self.registry, SOURCE, "deregister");
            registry.remove(&self.key)
        };
        drop(removed);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "executor panicked".to_string()
    }
}
