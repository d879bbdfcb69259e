//! Core traits for the source/sink system.
//!
//! A pipeline moves items from a [`Source`] to a [`Sink`] through a bounded
//! queue. Both sides are blocking: the producer thread drives the source and
//! the consumer thread drives the sink, so neither trait is async.

use crate::core::error::Result;

/// A source yields items one at a time until it is exhausted.
///
/// A source may fail part way through. The producer stops at the first error
/// and still signals end-of-stream downstream.
///
/// # Examples
///
/// ```rust
/// use blockpipe::core::{Result, Source};
///
/// struct CounterSource {
///     current: u64,
///     max: u64,
/// }
///
/// impl Source for CounterSource {
///     type Item = u64;
///
///     fn next(&mut self) -> Result<Option<Self::Item>> {
///         if self.current <= self.max {
///             let item = self.current;
///             self.current += 1;
///             Ok(Some(item))
///         } else {
///             Ok(None) // Source exhausted
///         }
///     }
/// }
/// ```
pub trait Source {
    /// The type of items this source generates
    type Item: Send;

    /// Produce the next item, `Ok(None)` once exhausted, or the error that
    /// stopped the source.
    fn next(&mut self) -> Result<Option<Self::Item>>;
}

/// A sink receives every item of a pipeline run, in order.
///
/// # Examples
///
/// ```rust
/// use blockpipe::core::{Result, Sink};
///
/// struct LogSink;
///
/// impl Sink for LogSink {
///     type Item = String;
///
///     fn write(&mut self, item: Self::Item) -> Result<()> {
///         println!("Logged: {}", item);
///         Ok(())
///     }
/// }
/// ```
pub trait Sink {
    /// The type of items this sink accepts
    type Item: Send;

    /// Accept a single item.
    fn write(&mut self, item: Self::Item) -> Result<()>;

    /// Called once the end-of-stream marker has been received.
    ///
    /// This allows sinks to perform cleanup or flush any buffered state.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: Source + ?Sized> Source for Box<S> {
    type Item = S::Item;

    fn next(&mut self) -> Result<Option<Self::Item>> {
        (**self).next()
    }
}

impl<K: Sink + ?Sized> Sink for Box<K> {
    type Item = K::Item;

    fn write(&mut self, item: Self::Item) -> Result<()> {
        (**self).write(item)
    }

    fn finish(&mut self) -> Result<()> {
        (**self).finish()
    }
}
