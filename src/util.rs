//! Utility functions and helper types.

use std::any::Any;
use std::fmt;

use crate::core::{Result, Sink, Source};

/// Helper function to create a simple source from a function
///
/// The function is called once per item; returning `Ok(None)` ends the
/// source.
pub fn from_fn<F, T>(f: F) -> FnSource<F>
where
    F: FnMut() -> Result<Option<T>>,
    T: Send,
{
    FnSource { f }
}

/// A source created from a function
pub struct FnSource<F> {
    f: F,
}

impl<F, T> Source for FnSource<F>
where
    F: FnMut() -> Result<Option<T>>,
    T: Send,
{
    type Item = T;

    fn next(&mut self) -> Result<Option<Self::Item>> {
        (self.f)()
    }
}

/// Helper function to create a simple sink from a function
pub fn sink_from_fn<F, T>(f: F) -> FnSink<F, T>
where
    F: FnMut(T) -> Result<()>,
    T: Send,
{
    FnSink {
        f,
        _phantom: std::marker::PhantomData,
    }
}

/// A sink created from a function
pub struct FnSink<F, T> {
    f: F,
    _phantom: std::marker::PhantomData<fn(T)>,
}

impl<F, T> Sink for FnSink<F, T>
where
    F: FnMut(T) -> Result<()>,
    T: Send,
{
    type Item = T;

    fn write(&mut self, item: Self::Item) -> Result<()> {
        (self.f)(item)
    }
}

impl<F> fmt::Debug for FnSource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSource").finish_non_exhaustive()
    }
}

impl<F, T> fmt::Debug for FnSink<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSink").finish_non_exhaustive()
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;

    #[test]
    fn test_from_fn_source() {
        let mut n = 0;
        let mut source = from_fn(|| {
            n += 1;
            Ok(if n <= 3 { Some(n) } else { None })
        });

        assert_eq!(source.next().unwrap(), Some(1));
        assert_eq!(source.next().unwrap(), Some(2));
        assert_eq!(source.next().unwrap(), Some(3));
        assert_eq!(source.next().unwrap(), None);
    }

    #[test]
    fn test_sink_from_fn() {
        let mut seen = Vec::new();
        {
            let mut sink = sink_from_fn(|item: i32| {
                if item < 0 {
                    return Err(Error::custom("negative"));
                }
                seen.push(item);
                Ok(())
            });
            sink.write(1).unwrap();
            assert!(sink.write(-1).is_err());
        }
        assert_eq!(seen, vec![1]);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(5u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
