//! Pipeline orchestration and execution.
//!
//! A pipeline moves every item of a [`Source`] into a [`Sink`] through one
//! [`BoundedQueue`]. The producer and consumer run concurrently on their own
//! threads; the orchestrator only starts them, waits for both, and decides
//! what the run as a whole returns.

pub mod stage;

use std::thread;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::{Error, Result, Sink, Source};
use crate::queue::BoundedQueue;
use crate::sinks::VecSink;
use crate::sources::{FallibleSource, IterSource};
use crate::util::panic_message;

pub use stage::{consume, produce, Message, ProducerExit};

/// Default capacity of the queue between producer and consumer
pub const DEFAULT_QUEUE_SIZE: usize = 10;

/// Configuration for pipeline execution
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineConfig {
    /// Capacity of the queue between producer and consumer
    pub queue_size: usize,
    /// Upper bound for any single put or get; `None` waits indefinitely
    pub operation_timeout: Option<Duration>,
    /// Name of the producer thread
    pub producer_name: String,
    /// Name of the consumer thread
    pub consumer_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            operation_timeout: None,
            producer_name: "producer".to_string(),
            consumer_name: "consumer".to_string(),
        }
    }
}

/// Counters for one pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipelineStats {
    /// Items the producer enqueued
    pub produced: usize,
    /// Items the consumer wrote to the sink
    pub consumed: usize,
}

/// The outcome of a pipeline that ran to its end-of-stream marker.
#[derive(Debug)]
pub struct Drained<K> {
    /// The sink, holding everything the consumer wrote to it
    pub sink: K,
    /// Counters for the run
    pub stats: PipelineStats,
    /// The error that cut the source short, if any
    pub source_error: Option<Error>,
}

impl<K> Drained<K> {
    /// Whether the source was read to exhaustion
    pub fn is_complete(&self) -> bool {
        self.source_error.is_none()
    }

    /// The sink, or the source error if the stream was truncated.
    pub fn into_sink(self) -> Result<K> {
        match self.source_error {
            None => Ok(self.sink),
            Some(error) => Err(error),
        }
    }
}

/// A pipeline connects a source to a sink through a bounded blocking queue.
pub struct Pipeline<S, K> {
    source: S,
    sink: K,
    config: PipelineConfig,
    cancel: Option<CancellationToken>,
}

impl<S, K> Pipeline<S, K>
where
    S: Source + Send,
    K: Sink<Item = S::Item> + Send,
{
    /// Create a new pipeline
    pub fn new(source: S, sink: K) -> Self {
        Self {
            source,
            sink,
            config: PipelineConfig::default(),
            cancel: None,
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the queue capacity
    pub fn queue_size(mut self, size: usize) -> Self {
        self.config.queue_size = size;
        self
    }

    /// Bound every put and get by `timeout`
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.config.operation_timeout = Some(timeout);
        self
    }

    /// Set the producer thread name
    pub fn producer_name(mut self, name: impl Into<String>) -> Self {
        self.config.producer_name = name.into();
        self
    }

    /// Set the consumer thread name
    pub fn consumer_name(mut self, name: impl Into<String>) -> Self {
        self.config.consumer_name = name.into();
        self
    }

    /// Abort the run when `token` is cancelled.
    ///
    /// Cancellation closes the queue, which wakes both units from whatever
    /// wait they are in. The run then fails with [`Error::Shutdown`].
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// The current configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline on two scoped threads, blocking until both finish.
    pub fn run(self) -> Result<Drained<K>> {
        let Pipeline {
            mut source,
            mut sink,
            config,
            cancel,
        } = self;
        let queue = BoundedQueue::new(config.queue_size)?;
        let timeout = config.operation_timeout;
        let finished = cancel.as_ref().map(CancellationToken::child_token);

        debug!(queue_size = config.queue_size, "pipeline starting");

        let units = (&mut source, &mut sink, &queue, &config);
        let watch = cancel.as_ref().zip(finished.as_ref());

        let (producer_result, consumer_result) = thread::scope(move |scope| -> Result<_> {
            let (source, sink, queue, config) = units;

            if let Some((token, finished)) = watch {
                thread::Builder::new()
                    .name(format!("{}-cancel", config.producer_name))
                    .spawn_scoped(scope, move || watch_blocking(token, finished, queue))
                    .map_err(|e| Error::custom(format!("failed to spawn watcher: {}", e)))?;
            }

            let joined = spawn_units(scope, config, queue, source, sink, timeout);

            // Releases the watcher so the scope can end
            if let Some((_, finished)) = watch {
                finished.cancel();
            }
            joined
        })?;

        let cancelled = cancel.as_ref().is_some_and(CancellationToken::is_cancelled);
        settle(sink, producer_result, consumer_result, cancelled)
    }
}

impl<S, K> Pipeline<S, K>
where
    S: Source + Send + 'static,
    S::Item: 'static,
    K: Sink<Item = S::Item> + Send + 'static,
{
    /// Run the pipeline on tokio's blocking pool and await both units.
    ///
    /// Thread names from the configuration are not applied here; the units
    /// run on pooled threads.
    pub async fn run_async(self) -> Result<Drained<K>> {
        let Pipeline {
            source,
            sink,
            config,
            cancel,
        } = self;
        let queue = BoundedQueue::new(config.queue_size)?;
        let timeout = config.operation_timeout;
        let finished = CancellationToken::new();

        debug!(queue_size = config.queue_size, "pipeline starting");

        if let Some(token) = cancel.clone() {
            let queue = queue.clone();
            let finished = finished.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {
                        warn!("pipeline cancelled, closing queue");
                        queue.close();
                    }
                    _ = finished.cancelled() => {}
                }
            });
        }

        let producer_handle = {
            let queue = queue.clone();
            tokio::task::spawn_blocking(move || {
                let mut source = source;
                produce(&mut source, &queue, timeout)
            })
        };
        let consumer_handle = {
            let queue = queue.clone();
            tokio::task::spawn_blocking(move || {
                let mut sink = sink;
                let result = consume(&queue, &mut sink, timeout);
                (sink, result)
            })
        };

        let (producer_result, consumer_result) = tokio::join!(producer_handle, consumer_handle);
        finished.cancel();

        let producer_result = producer_result.unwrap_or_else(|e| Err(Error::from(e)));
        let (sink, consumer_result) = consumer_result?;
        let cancelled = cancel.as_ref().is_some_and(CancellationToken::is_cancelled);
        settle(sink, producer_result, consumer_result, cancelled)
    }
}

/// Move every item of `source` through a queue of `queue_size` slots and
/// return them, in order.
///
/// Fails with [`Error::InvalidCapacity`] if `queue_size` is zero.
///
/// ```
/// let out = blockpipe::run_pipeline(vec![1, 2, 3, 4, 5], 3).unwrap();
/// assert_eq!(out, vec![1, 2, 3, 4, 5]);
/// ```
pub fn run_pipeline<I>(source: I, queue_size: usize) -> Result<Vec<I::Item>>
where
    I: IntoIterator,
    I::IntoIter: Send,
    I::Item: Send,
{
    Pipeline::new(IterSource::new(source), VecSink::new())
        .queue_size(queue_size)
        .run()?
        .into_sink()
        .map(VecSink::into_items)
}

/// Like [`run_pipeline`] for a source that can fail part way through.
///
/// A failure is returned as [`Error::Source`] rather than as a silently
/// shortened result. Use [`Pipeline`] with a [`FallibleSource`] to keep the
/// items delivered before the failure.
pub fn try_run_pipeline<I, T, E>(source: I, queue_size: usize) -> Result<Vec<T>>
where
    I: IntoIterator<Item = std::result::Result<T, E>>,
    I::IntoIter: Send,
    T: Send,
    E: std::error::Error + Send + Sync + 'static,
{
    Pipeline::new(FallibleSource::new(source), VecSink::new())
        .queue_size(queue_size)
        .run()?
        .into_sink()
        .map(VecSink::into_items)
}

type UnitResults = (Result<ProducerExit>, Result<usize>);

fn spawn_units<'scope, 'env, S, K>(
    scope: &'scope thread::Scope<'scope, 'env>,
    config: &PipelineConfig,
    queue: &'scope BoundedQueue<Message<S::Item>>,
    source: &'scope mut S,
    sink: &'scope mut K,
    timeout: Option<Duration>,
) -> Result<UnitResults>
where
    S: Source + Send,
    K: Sink<Item = S::Item> + Send,
{
    let producer = thread::Builder::new()
        .name(config.producer_name.clone())
        .spawn_scoped(scope, move || produce(source, queue, timeout))
        .map_err(|e| Error::custom(format!("failed to spawn producer: {}", e)))?;

    let consumer = match thread::Builder::new()
        .name(config.consumer_name.clone())
        .spawn_scoped(scope, move || consume(queue, sink, timeout))
    {
        Ok(handle) => handle,
        Err(e) => {
            // Without a consumer the producer would block on a full queue
            queue.close();
            return Err(Error::custom(format!("failed to spawn consumer: {}", e)));
        }
    };

    let producer_result = producer
        .join()
        .unwrap_or_else(|payload| Err(Error::Panicked(panic_message(payload.as_ref()))));
    let consumer_result = consumer
        .join()
        .unwrap_or_else(|payload| Err(Error::Panicked(panic_message(payload.as_ref()))));

    Ok((producer_result, consumer_result))
}

fn watch_blocking<T>(
    token: &CancellationToken,
    finished: &CancellationToken,
    queue: &BoundedQueue<T>,
) {
    futures::executor::block_on(finished.cancelled());
    if token.is_cancelled() {
        warn!("pipeline cancelled, closing queue");
        queue.close();
    }
}

/// Decide the result of a run from the results of both units.
fn settle<K>(
    sink: K,
    producer: Result<ProducerExit>,
    consumer: Result<usize>,
    cancelled: bool,
) -> Result<Drained<K>> {
    match (producer, consumer) {
        (Err(e @ Error::Panicked(_)), _) | (_, Err(e @ Error::Panicked(_))) => Err(e),
        (Ok(exit), Ok(consumed)) => {
            let stats = PipelineStats {
                produced: exit.produced(),
                consumed,
            };
            debug!(
                produced = stats.produced,
                consumed = stats.consumed,
                "pipeline drained"
            );
            let source_error = match exit {
                ProducerExit::Exhausted(_) => None,
                ProducerExit::SourceFailed { error, .. } => Some(error),
            };
            Ok(Drained {
                sink,
                stats,
                source_error,
            })
        }
        (Err(_), _) | (_, Err(_)) if cancelled => Err(Error::Shutdown),
        // The consumer only sees a closed queue when the producer gave up
        (Err(producer_error), Err(Error::Closed)) => Err(producer_error),
        (_, Err(consumer_error)) => Err(consumer_error),
        (Err(producer_error), Ok(_)) => Err(producer_error),
    }
}
