//! Sink implementations for the blockpipe library.
//!
//! The consumer thread owns its sink for the duration of a run and hands it
//! back when the run completes, so sinks here hold their state directly.

use std::fmt;
use std::marker::PhantomData;

use crate::core::{Result, Sink};

/// A sink that collects items into a vector, in arrival order.
pub struct VecSink<T> {
    items: Vec<T>,
}

impl<T> VecSink<T> {
    /// Create a new, empty collecting sink
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Create a collecting sink that appends to an existing vector
    pub fn with_items(items: Vec<T>) -> Self {
        Self { items }
    }

    /// Items collected so far
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Take the collected items
    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T: Send> Sink for VecSink<T> {
    type Item = T;

    fn write(&mut self, item: Self::Item) -> Result<()> {
        self.items.push(item);
        Ok(())
    }
}

impl<T> Default for VecSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for VecSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VecSink").field("items", &self.items).finish()
    }
}

/// A sink that only counts items
pub struct CountSink<T> {
    count: usize,
    finished: bool,
    _phantom: PhantomData<fn(T)>,
}

impl<T> CountSink<T> {
    /// Create a new count sink
    pub fn new() -> Self {
        Self {
            count: 0,
            finished: false,
            _phantom: PhantomData,
        }
    }

    /// Get the current count
    pub fn count(&self) -> usize {
        self.count
    }

    /// Whether the end-of-stream marker was received
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl<T: Send> Sink for CountSink<T> {
    type Item = T;

    fn write(&mut self, _item: Self::Item) -> Result<()> {
        self.count += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

impl<T> Default for CountSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for CountSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountSink")
            .field("count", &self.count)
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_sink_preserves_order() {
        let mut sink = VecSink::new();
        for item in ["a", "b", "c"] {
            sink.write(item).unwrap();
        }
        sink.finish().unwrap();
        assert_eq!(sink.items(), &["a", "b", "c"]);
        assert_eq!(sink.into_items(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_vec_sink_appends_to_existing() {
        let mut sink = VecSink::with_items(vec![1]);
        sink.write(2).unwrap();
        assert_eq!(sink.into_items(), vec![1, 2]);
    }

    #[test]
    fn test_count_sink() {
        let mut sink = CountSink::<u64>::new();
        for i in 0..10 {
            sink.write(i).unwrap();
        }
        assert_eq!(sink.count(), 10);
        assert!(!sink.is_finished());
        sink.finish().unwrap();
        assert!(sink.is_finished());
    }
}
