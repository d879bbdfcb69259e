//! Source implementations for the blockpipe library.
//!
//! This module provides concrete sources that feed a pipeline from ordinary
//! iterators, infallible or not.

use std::fmt;

use crate::core::{Error, Result, Source};

/// A source that yields every item of an iterator.
pub struct IterSource<I> {
    iter: I,
}

impl<I: Iterator> IterSource<I> {
    /// Create a new source from anything iterable
    pub fn new<T>(items: T) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        Self {
            iter: items.into_iter(),
        }
    }
}

impl<I> Source for IterSource<I>
where
    I: Iterator,
    I::Item: Send,
{
    type Item = I::Item;

    fn next(&mut self) -> Result<Option<Self::Item>> {
        Ok(self.iter.next())
    }
}

/// A source over an iterator of `Result`s.
///
/// The first `Err` ends the source: it is reported as [`Error::Source`] and
/// the underlying iterator is never polled again.
pub struct FallibleSource<I> {
    iter: I,
    failed: bool,
}

impl<I: Iterator> FallibleSource<I> {
    /// Create a new source from an iterable of results
    pub fn new<T>(items: T) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        Self {
            iter: items.into_iter(),
            failed: false,
        }
    }
}

impl<I, T, E> Source for FallibleSource<I>
where
    I: Iterator<Item = std::result::Result<T, E>>,
    T: Send,
    E: std::error::Error + Send + Sync + 'static,
{
    type Item = T;

    fn next(&mut self) -> Result<Option<Self::Item>> {
        if self.failed {
            return Ok(None);
        }
        match self.iter.next() {
            Some(Ok(item)) => Ok(Some(item)),
            Some(Err(e)) => {
                self.failed = true;
                Err(Error::source(e))
            }
            None => Ok(None),
        }
    }
}

impl<I> fmt::Debug for IterSource<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterSource").finish_non_exhaustive()
    }
}

impl<I> fmt::Debug for FallibleSource<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FallibleSource")
            .field("failed", &self.failed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn drain<S: Source>(source: &mut S) -> (Vec<S::Item>, Option<Error>) {
        let mut items = Vec::new();
        loop {
            match source.next() {
                Ok(Some(item)) => items.push(item),
                Ok(None) => return (items, None),
                Err(e) => return (items, Some(e)),
            }
        }
    }

    #[test]
    fn test_iter_source() {
        let mut source = IterSource::new(vec![1, 2, 3]);
        let (items, err) = drain(&mut source);
        assert_eq!(items, vec![1, 2, 3]);
        assert!(err.is_none());
        assert_eq!(source.next().unwrap(), None);
    }

    #[test]
    fn test_iter_source_over_range() {
        let mut source = IterSource::new(0..4);
        let (items, _) = drain(&mut source);
        assert_eq!(items, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_fallible_source_stops_at_first_error() {
        let items: Vec<std::result::Result<i32, io::Error>> = vec![
            Ok(1),
            Ok(2),
            Err(io::Error::new(io::ErrorKind::Other, "Test error")),
            Ok(4),
        ];
        let mut source = FallibleSource::new(items);

        let (items, err) = drain(&mut source);
        assert_eq!(items, vec![1, 2]);
        assert!(matches!(err, Some(Error::Source(_))));

        // Nothing is read past the failure
        assert_eq!(source.next().unwrap(), None);
    }
}
