//! Core traits and types for the blockpipe library.
//!
//! This module contains the error types and the source/sink traits that the
//! pipeline is built from.

pub mod error;
pub mod traits;

// Re-export core items
pub use error::{Error, IntoError, PutError, Result};
pub use traits::{Sink, Source};
