//! The producer and consumer units of a pipeline run.
//!
//! Both units are plain functions meant to run on their own thread. They share
//! nothing but the queue. End of stream travels through the queue as
//! [`Message::Done`], which the producer emits exactly once on every exit path
//! and the consumer never hands to its sink.
//!
//! Whenever a unit gives up for a reason its peer cannot observe through the
//! stream itself (a sink error, a timeout, a panic) it closes the queue, so
//! the peer is woken from any blocking wait instead of hanging forever.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::{Error, Result, Sink, Source};
use crate::queue::BoundedQueue;

/// An element travelling through the pipeline queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<T> {
    /// A payload item
    Item(T),
    /// End of stream. Never a payload.
    Done,
}

impl<T> Message<T> {
    /// Whether this is the end-of-stream marker
    pub fn is_done(&self) -> bool {
        matches!(self, Message::Done)
    }

    /// The payload, if any
    pub fn into_item(self) -> Option<T> {
        match self {
            Message::Item(item) => Some(item),
            Message::Done => None,
        }
    }
}

/// How a producer finished when the queue itself did not fail.
#[derive(Debug, Clone)]
pub enum ProducerExit {
    /// The source ran dry; `Done` was enqueued after the last item.
    Exhausted(usize),
    /// The source failed after `produced` items; `Done` was still enqueued.
    SourceFailed { produced: usize, error: Error },
}

impl ProducerExit {
    /// Number of items enqueued before `Done`
    pub fn produced(&self) -> usize {
        match self {
            ProducerExit::Exhausted(produced) => *produced,
            ProducerExit::SourceFailed { produced, .. } => *produced,
        }
    }
}

/// Pull every item from `source` into `queue`, then enqueue [`Message::Done`].
///
/// Items keep source order. `Done` is enqueued exactly once, whether the
/// source is exhausted, fails, or panics. A source error ends production
/// early and is reported through [`ProducerExit::SourceFailed`].
///
/// Returns `Err` only when the queue rejects a put (closed, or timed out when
/// `timeout` is set). The queue is closed in that case.
pub fn produce<S>(
    source: &mut S,
    queue: &BoundedQueue<Message<S::Item>>,
    timeout: Option<Duration>,
) -> Result<ProducerExit>
where
    S: Source + ?Sized,
{
    debug!(capacity = queue.capacity(), "producer starting");

    let mut done = DoneGuard {
        queue,
        timeout,
        sent: false,
    };
    let mut produced = 0usize;

    let source_error = loop {
        let item = match source.next() {
            Ok(Some(item)) => item,
            Ok(None) => break None,
            Err(error) => break Some(error),
        };

        if let Err(error) = put(queue, Message::Item(item), timeout) {
            warn!(produced, error = %error, "producer could not enqueue item");
            done.sent = true;
            queue.close();
            return Err(error);
        }
        produced += 1;

        #[cfg(feature = "metrics")]
        metrics::counter!("blockpipe.items_produced").increment(1);
    };

    done.send()?;

    match source_error {
        None => {
            debug!(produced, "producer finished");
            Ok(ProducerExit::Exhausted(produced))
        }
        Some(error) => {
            warn!(produced, error = %error, "source failed, stream truncated");

            #[cfg(feature = "metrics")]
            metrics::counter!("blockpipe.source_errors").increment(1);

            Ok(ProducerExit::SourceFailed { produced, error })
        }
    }
}

/// Move items from `queue` into `sink` until [`Message::Done`] arrives.
///
/// `Done` is not written to the sink; [`Sink::finish`] is called instead.
/// Returns the number of items written.
///
/// On any failure the queue is closed before the error is returned, which
/// releases a producer blocked on a full queue.
pub fn consume<K>(
    queue: &BoundedQueue<Message<K::Item>>,
    sink: &mut K,
    timeout: Option<Duration>,
) -> Result<usize>
where
    K: Sink + ?Sized,
{
    debug!(capacity = queue.capacity(), "consumer starting");

    let _close_on_panic = CloseOnPanic(queue);
    let mut consumed = 0usize;

    let result = loop {
        let message = match get(queue, timeout) {
            Ok(message) => message,
            Err(error) => break Err(error),
        };

        match message {
            Message::Done => break sink.finish(),
            Message::Item(item) => {
                if let Err(error) = sink.write(item) {
                    break Err(error);
                }
                consumed += 1;

                #[cfg(feature = "metrics")]
                metrics::counter!("blockpipe.items_consumed").increment(1);
            }
        }
    };

    match result {
        Ok(()) => {
            debug!(consumed, "consumer finished");
            Ok(consumed)
        }
        Err(error) => {
            warn!(consumed, error = %error, "consumer stopped early");
            queue.close();
            Err(error)
        }
    }
}

fn put<T>(
    queue: &BoundedQueue<Message<T>>,
    message: Message<T>,
    timeout: Option<Duration>,
) -> Result<()> {
    match timeout {
        None => queue.put(message).map_err(|e| e.into_error(0)),
        Some(timeout) => queue
            .put_timeout(message, timeout)
            .map_err(|e| e.into_error(timeout.as_millis() as u64)),
    }
}

fn get<T>(queue: &BoundedQueue<Message<T>>, timeout: Option<Duration>) -> Result<Message<T>> {
    match timeout {
        None => queue.get(),
        Some(timeout) => queue.get_timeout(timeout),
    }
}

/// Enqueues `Done` when production ends, including by unwinding.
struct DoneGuard<'a, T> {
    queue: &'a BoundedQueue<Message<T>>,
    timeout: Option<Duration>,
    sent: bool,
}

impl<T> DoneGuard<'_, T> {
    fn send(&mut self) -> Result<()> {
        self.sent = true;
        put(self.queue, Message::Done, self.timeout).inspect_err(|error| {
            warn!(error = %error, "could not enqueue end of stream");
            self.queue.close();
        })
    }
}

impl<T> Drop for DoneGuard<'_, T> {
    fn drop(&mut self) {
        if !self.sent {
            if thread::panicking() {
                warn!("producer panicked, signalling end of stream");
            }
            let _ = self.send();
        }
    }
}

struct CloseOnPanic<'a, T>(&'a BoundedQueue<T>);

impl<T> Drop for CloseOnPanic<'_, T> {
    fn drop(&mut self) {
        if thread::panicking() {
            warn!("consumer panicked, closing queue");
            self.0.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::VecSink;
    use crate::sources::{FallibleSource, IterSource};
    use crate::util::{from_fn, sink_from_fn};
    use std::io;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::Arc;

    fn drain<T>(queue: &BoundedQueue<Message<T>>) -> Vec<Message<T>> {
        let mut out = Vec::new();
        while !queue.is_empty() {
            out.push(queue.get().unwrap());
        }
        out
    }

    #[test]
    fn test_producer_enqueues_items_and_done() {
        let queue = BoundedQueue::new(5).unwrap();
        let mut source = IterSource::new(vec![1, 2, 3]);

        let exit = produce(&mut source, &queue, None).unwrap();
        assert!(matches!(exit, ProducerExit::Exhausted(3)));

        assert_eq!(
            drain(&queue),
            vec![
                Message::Item(1),
                Message::Item(2),
                Message::Item(3),
                Message::Done
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_producer_sends_done_on_source_error() {
        let queue = BoundedQueue::new(5).unwrap();
        let items: Vec<std::result::Result<i32, io::Error>> = vec![
            Ok(1),
            Ok(2),
            Err(io::Error::new(io::ErrorKind::Other, "Test error")),
            Ok(3),
        ];
        let mut source = FallibleSource::new(items);

        let exit = produce(&mut source, &queue, None).unwrap();
        assert_eq!(exit.produced(), 2);
        assert!(matches!(
            exit,
            ProducerExit::SourceFailed {
                error: Error::Source(_),
                ..
            }
        ));

        // Exactly the items before the failure, then Done, then nothing
        assert_eq!(
            drain(&queue),
            vec![Message::Item(1), Message::Item(2), Message::Done]
        );
    }

    #[test]
    fn test_producer_sends_done_on_panic() {
        let queue = BoundedQueue::new(5).unwrap();
        let mut n = 0;
        let mut source = from_fn(|| {
            n += 1;
            if n > 2 {
                panic!("source blew up");
            }
            Ok(Some(n))
        });

        let result = panic::catch_unwind(AssertUnwindSafe(|| produce(&mut source, &queue, None)));
        assert!(result.is_err());
        assert_eq!(
            drain(&queue),
            vec![Message::Item(1), Message::Item(2), Message::Done]
        );
    }

    #[test]
    fn test_producer_fails_on_closed_queue() {
        let queue = BoundedQueue::new(5).unwrap();
        queue.close();
        let mut source = IterSource::new(vec![1]);

        let err = produce(&mut source, &queue, None).unwrap_err();
        assert!(matches!(err, Error::Closed));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_producer_times_out_and_closes_queue() {
        let queue = BoundedQueue::new(1).unwrap();
        let mut source = IterSource::new(vec![1, 2]);

        let err = produce(&mut source, &queue, Some(Duration::from_millis(50))).unwrap_err();
        assert!(err.is_timeout());
        assert!(queue.is_closed());
        assert_eq!(drain(&queue), vec![Message::Item(1)]);
    }

    #[test]
    fn test_consumer_stops_on_immediate_done() {
        let queue = BoundedQueue::new(10).unwrap();
        queue.put(Message::Done).unwrap();

        let mut sink = VecSink::<i32>::new();
        let consumed = consume(&queue, &mut sink, None).unwrap();

        assert_eq!(consumed, 0);
        assert!(sink.items().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_consumer_collects_until_done() {
        let queue = BoundedQueue::new(5).unwrap();
        queue.put(Message::Item("a")).unwrap();
        queue.put(Message::Item("b")).unwrap();
        queue.put(Message::Done).unwrap();
        queue.put(Message::Item("after")).unwrap();

        let mut sink = VecSink::new();
        assert_eq!(consume(&queue, &mut sink, None).unwrap(), 2);
        assert_eq!(sink.into_items(), vec!["a", "b"]);

        // Nothing past Done is taken
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_consumer_passes_none_payloads_through() {
        let queue = BoundedQueue::new(5).unwrap();
        for item in [Some(1), None, Some(3)] {
            queue.put(Message::Item(item)).unwrap();
        }
        queue.put(Message::Done).unwrap();

        let mut sink = VecSink::new();
        consume(&queue, &mut sink, None).unwrap();
        assert_eq!(sink.into_items(), vec![Some(1), None, Some(3)]);
    }

    #[test]
    fn test_consumer_sink_error_releases_blocked_producer() {
        let queue = Arc::new(BoundedQueue::new(1).unwrap());

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                let mut source = IterSource::new(0..100);
                produce(&mut source, &queue, None)
            })
        };

        let mut sink = sink_from_fn(|item: i32| {
            if item == 3 {
                Err(Error::custom("sink full"))
            } else {
                Ok(())
            }
        });
        let err = consume(&queue, &mut sink, None).unwrap_err();
        assert!(matches!(err, Error::Custom(_)));

        let producer_result = producer.join().unwrap();
        assert!(matches!(producer_result, Err(Error::Closed)));
    }

    #[test]
    fn test_consumer_times_out_without_done() {
        let queue = BoundedQueue::<Message<i32>>::new(1).unwrap();
        let mut sink = VecSink::new();

        let err = consume(&queue, &mut sink, Some(Duration::from_millis(50))).unwrap_err();
        assert!(err.is_timeout());
        assert!(queue.is_closed());
    }

    #[test]
    fn test_consumer_panic_closes_queue() {
        let queue = BoundedQueue::new(2).unwrap();
        queue.put(Message::Item(1)).unwrap();

        let mut sink = sink_from_fn(|_: i32| -> Result<()> { panic!("sink blew up") });
        let result = panic::catch_unwind(AssertUnwindSafe(|| consume(&queue, &mut sink, None)));

        assert!(result.is_err());
        assert!(queue.is_closed());
    }

    #[test]
    fn test_message_helpers() {
        assert!(Message::<u8>::Done.is_done());
        assert!(!Message::Item(1).is_done());
        assert_eq!(Message::Item(1).into_item(), Some(1));
        assert_eq!(Message::<u8>::Done.into_item(), None);
    }
}
