//! # Bounded blocking queue and producer/consumer pipeline
//!
//! This crate provides a monitor-style bounded FIFO queue with blocking and
//! timed operations, and a pipeline that moves a stream of values from a
//! source to a sink through that queue on two concurrently running threads.
//!
//! ## Core Concepts
//!
//! - **BoundedQueue**: fixed-capacity FIFO; `put` blocks while full, `get`
//!   blocks while empty, both with optional deadlines
//! - **Source**: yields items until exhausted, possibly failing part way
//! - **Sink**: receives every item, in order
//! - **Pipeline**: runs a producer and a consumer over one queue and signals
//!   end of stream with an out-of-band `Done` message
//!
//! ## Example
//!
//! ```rust
//! use blockpipe::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let drained = Pipeline::new(IterSource::new(1..=100), VecSink::new())
//!         .queue_size(8)
//!         .run()?;
//!
//!     assert_eq!(drained.stats.consumed, 100);
//!     assert_eq!(drained.into_sink()?.into_items().len(), 100);
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod pipeline;
pub mod queue;
pub mod sinks;
pub mod sources;
pub mod util;

// Re-export commonly used items
pub mod prelude {
    pub use crate::core::{Error, IntoError, PutError, Result, Sink, Source};
    pub use crate::pipeline::{
        run_pipeline, try_run_pipeline, Drained, Message, Pipeline, PipelineConfig, PipelineStats,
    };
    pub use crate::queue::BoundedQueue;
    pub use crate::sinks::{CountSink, VecSink};
    pub use crate::sources::{FallibleSource, IterSource};
}

// Re-export main items
pub use crate::core::{Error, Result};
pub use crate::pipeline::{run_pipeline, try_run_pipeline, Pipeline};
pub use crate::queue::BoundedQueue;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
