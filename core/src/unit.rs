//! Units of work accepted by a job group.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Boxed async unit body.
pub type UnitFut<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'static>>;

type BlockingFn<T, E> = Box<dyn FnOnce() -> Result<T, E> + Send + 'static>;

/// One independently schedulable computation.
///
/// A unit takes no arguments: anything it needs must be moved into the
/// closure or future before submission. Units that only report failure use
/// `Unit<(), E>`.
pub enum Unit<T, E> {
    /// Synchronous body, executed on a blocking worker thread.
    Blocking(BlockingFn<T, E>),
    /// Async body, executed as its own task.
    Async(UnitFut<T, E>),
}

impl<T, E> Unit<T, E> {
    pub fn blocking<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        Self::Blocking(Box::new(f))
    }

    pub fn future<Fut>(fut: Fut) -> Self
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::Async(Box::pin(fut))
    }
}

impl<T, E> fmt::Debug for Unit<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocking(_) => f.write_str("Unit::Blocking(..)"),
            Self::Async(_) => f.write_str("Unit::Async(..)"),
        }
    }
}
